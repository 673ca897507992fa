use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("base url cannot carry path segments")]
    InvalidBaseUrl,
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("invalid record timestamp: {0}")]
    Timestamp(#[from] time::error::Parse),
    #[error("failed to format record timestamp: {0}")]
    Format(#[from] time::error::Format),
    #[error("account is not available: {0}")]
    AccountUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Outcome of a record delete. A missing record is not an error at this level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Client for the records API of the remote photo store.
#[derive(Clone)]
pub struct CloudClient {
    http: Client,
    base_url: Url,
    token: String,
    page_size: u32,
}

impl CloudClient {
    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, CloudError> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CloudError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token: token.into(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn get_account(&self) -> Result<AccountInfo, CloudError> {
        let url = self.endpoint("/v1/account")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Fails with [`CloudError::AccountUnavailable`] when the account exists but
    /// cannot be used for storage (signed out, restricted).
    pub async fn ensure_account_available(&self) -> Result<(), CloudError> {
        let account = self.get_account().await?;
        if account.available {
            Ok(())
        } else {
            Err(CloudError::AccountUnavailable(
                account.reason.unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
    }

    pub async fn create_record(&self, draft: &RecordDraft) -> Result<String, CloudError> {
        let url = self.endpoint("/v1/records")?;
        let body = NewRecordBody {
            owner_key: &draft.owner_key,
            file_name: &draft.file_name,
            created_at: draft.created_at.format(&Rfc3339)?,
            image: BASE64.encode(&draft.image),
            back_ref: draft.back_ref,
        };
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&body)
            .send()
            .await?;
        let created: CreatedRecord = Self::handle_response(response).await?;
        Ok(created.record_id)
    }

    pub async fn list_records(
        &self,
        owner_key: Option<&str>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<RecordPage, CloudError> {
        let mut url = self.endpoint("/v1/records")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(owner_key) = owner_key {
                query.append_pair("owner_key", owner_key);
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = offset {
                query.append_pair("offset", &offset.to_string());
            }
        }
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Walks every page for `owner_key` (or the whole store when `None`).
    pub async fn list_records_all(&self, owner_key: Option<&str>) -> Result<Vec<Record>, CloudError> {
        let mut offset = 0u32;
        let mut records = Vec::new();
        loop {
            let page = self
                .list_records(owner_key, Some(self.page_size), Some(offset))
                .await?;
            let fetched = page.items.len() as u32;
            offset = offset.saturating_add(fetched);
            let total = page.total;
            for item in page.items {
                records.push(item.into_record()?);
            }
            if fetched == 0 || offset >= total {
                break;
            }
        }
        Ok(records)
    }

    pub async fn delete_record(&self, record_id: &str) -> Result<DeleteOutcome, CloudError> {
        let mut url = self.endpoint("/v1/records")?;
        url.path_segments_mut()
            .map_err(|_| CloudError::InvalidBaseUrl)?
            .push(record_id);
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(DeleteOutcome::NotFound),
            status if status.is_success() => Ok(DeleteOutcome::Deleted),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CloudError::Api { status, body })
            }
        }
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, CloudError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CloudError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(CloudError::Api { status, body })
        }
    }
}

impl CloudError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            CloudError::Api { status, .. } => Some(classify_api_status(*status)),
            CloudError::AccountUnavailable(_) => Some(ApiErrorClass::Auth),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }

    /// True when the store cannot be reached or refuses the account, as
    /// opposed to rejecting one particular request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            CloudError::Request(err) => err.is_connect() || err.is_timeout(),
            CloudError::Api { status, .. } => matches!(
                classify_api_status(*status),
                ApiErrorClass::Auth
            ) || *status == StatusCode::SERVICE_UNAVAILABLE,
            CloudError::AccountUnavailable(_) => true,
            _ => false,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccountInfo {
    pub available: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A record about to be created; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub owner_key: String,
    pub file_name: String,
    pub created_at: OffsetDateTime,
    pub image: Vec<u8>,
    pub back_ref: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_id: String,
    pub owner_key: String,
    pub file_name: String,
    pub created_at: OffsetDateTime,
    pub image: Vec<u8>,
    pub back_ref: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RecordPage {
    pub items: Vec<RecordItem>,
    pub limit: u32,
    pub offset: u32,
    pub total: u32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RecordItem {
    pub record_id: String,
    pub owner_key: String,
    pub file_name: String,
    pub created_at: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub back_ref: Option<i64>,
}

impl RecordItem {
    pub fn into_record(self) -> Result<Record, CloudError> {
        let created_at = OffsetDateTime::parse(&self.created_at, &Rfc3339)?;
        // An undecodable payload is kept as empty bytes; consumers reject it
        // when they try to read the image.
        let image = BASE64.decode(self.image.as_bytes()).unwrap_or_default();
        Ok(Record {
            record_id: self.record_id,
            owner_key: self.owner_key,
            file_name: self.file_name,
            created_at,
            image,
            back_ref: self.back_ref,
        })
    }
}

#[derive(Debug, Serialize)]
struct NewRecordBody<'a> {
    owner_key: &'a str,
    file_name: &'a str,
    created_at: String,
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    back_ref: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    record_id: String,
}
