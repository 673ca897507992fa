use async_trait::async_trait;
use navphoto_core::{CloudClient, CloudError, DeleteOutcome, Record, RecordDraft};

use crate::model::{NewRemoteRecord, RemoteRecord};
use crate::stores::{RemoteError, RemoteStore};

impl From<CloudError> for RemoteError {
    fn from(err: CloudError) -> Self {
        if err.is_unavailable() {
            RemoteError::Unavailable(err.to_string())
        } else {
            RemoteError::Store(err.to_string())
        }
    }
}

fn remote_record(record: Record) -> RemoteRecord {
    RemoteRecord {
        remote_id: record.record_id,
        owner_key: record.owner_key,
        file_name: record.file_name,
        created_at: record.created_at,
        image_bytes: record.image,
        back_ref: record.back_ref,
    }
}

#[async_trait]
impl RemoteStore for CloudClient {
    async fn ensure_available(&self) -> Result<(), RemoteError> {
        Ok(self.ensure_account_available().await?)
    }

    async fn put(&self, record: &NewRemoteRecord) -> Result<String, RemoteError> {
        let draft = RecordDraft {
            owner_key: record.owner_key.clone(),
            file_name: record.file_name.clone(),
            created_at: record.created_at,
            image: record.image_bytes.clone(),
            back_ref: record.back_ref,
        };
        Ok(self.create_record(&draft).await?)
    }

    async fn query(&self, owner_key: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        let records = self.list_records_all(Some(owner_key)).await?;
        Ok(records.into_iter().map(remote_record).collect())
    }

    async fn query_all(&self) -> Result<Vec<RemoteRecord>, RemoteError> {
        let records = self.list_records_all(None).await?;
        Ok(records.into_iter().map(remote_record).collect())
    }

    async fn delete(&self, remote_id: &str) -> Result<DeleteOutcome, RemoteError> {
        Ok(self.delete_record(remote_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn put_sends_back_ref_and_returns_record_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/records"))
            .and(body_partial_json(json!({ "owner_key": "NU-1", "back_ref": 4 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "record_id": "rec-9"
            })))
            .mount(&server)
            .await;

        let client = CloudClient::with_base_url(&server.uri(), "test-token").unwrap();
        let id = RemoteStore::put(
            &client,
            &NewRemoteRecord {
                owner_key: "NU-1".into(),
                file_name: "p1.jpg".into(),
                created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
                image_bytes: vec![1, 2, 3],
                back_ref: Some(4),
            },
        )
        .await
        .unwrap();

        assert_eq!(id, "rec-9");
    }

    #[tokio::test]
    async fn query_maps_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/records"))
            .and(query_param("owner_key", "NU-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "limit": 100,
                "offset": 0,
                "total": 1,
                "items": [{
                    "record_id": "rec-1",
                    "owner_key": "NU-1",
                    "file_name": "p2.jpg",
                    "created_at": "2023-11-14T22:13:20Z",
                    "image": "AQID"
                }]
            })))
            .mount(&server)
            .await;

        let client = CloudClient::with_base_url(&server.uri(), "test-token").unwrap();
        let records = client.query("NU-1").await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remote_id, "rec-1");
        assert_eq!(records[0].image_bytes, vec![1, 2, 3]);
        assert_eq!(records[0].back_ref, None);
        assert_eq!(records[0].created_at.unix_timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/account"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = CloudClient::with_base_url(&server.uri(), "bad-token").unwrap();
        let err = client.ensure_available().await.unwrap_err();

        assert!(matches!(err, RemoteError::Unavailable(_)));
    }
}
