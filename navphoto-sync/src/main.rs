use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use navphoto_core::CloudClient;
use navphoto_sync::config::SyncConfig;
use navphoto_sync::model::{LocalId, LocalPhoto};
use navphoto_sync::storage::{FsBlobStore, PhotoStore};
use navphoto_sync::stores::LocalStore;
use navphoto_sync::sync::engine::{PassOutcome, SyncEngine, SyncError, import_photo};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Help,
    SyncAll,
    SyncOwner(String),
    Delete(LocalId),
    Capture { owner_key: String, file: PathBuf },
    List(String),
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let Some(command) = args.next() else {
        return Ok(CliMode::Help);
    };
    let mode = match command.as_str() {
        "--help" | "-h" | "help" => CliMode::Help,
        "sync-all" => CliMode::SyncAll,
        "sync-owner" => CliMode::SyncOwner(required(&mut args, "owner key")?),
        "delete" => {
            let raw = required(&mut args, "photo id")?;
            let id = raw
                .parse::<LocalId>()
                .with_context(|| format!("invalid photo id: {raw}"))?;
            CliMode::Delete(id)
        }
        "capture" => CliMode::Capture {
            owner_key: required(&mut args, "owner key")?,
            file: PathBuf::from(required(&mut args, "image file")?),
        },
        "list" => CliMode::List(required(&mut args, "owner key")?),
        other => anyhow::bail!("unknown command: {other}"),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    Ok(mode)
}

fn required(args: &mut impl Iterator<Item = String>, what: &str) -> anyhow::Result<String> {
    match args.next() {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => anyhow::bail!("missing {what}"),
    }
}

fn print_help() {
    println!("Usage: navphoto-sync <command>");
    println!("  sync-all                 Upload every local photo the remote store lacks");
    println!("  sync-owner <key>         Reconcile photos of one owner in both directions");
    println!("  delete <id>              Delete a photo locally and remotely");
    println!("  capture <key> <file>     Import an image file for an owner");
    println!("  list <key>               Print an owner's photos as JSON");
}

#[derive(Serialize)]
struct PhotoView<'a> {
    id: LocalId,
    owner_key: &'a str,
    file_name: &'a str,
    created_at: String,
    remote_ref: Option<&'a str>,
}

impl<'a> PhotoView<'a> {
    fn new(photo: &'a LocalPhoto) -> anyhow::Result<Self> {
        Ok(Self {
            id: photo.id,
            owner_key: &photo.owner_key,
            file_name: &photo.file_name,
            created_at: photo.created_at.format(&Rfc3339)?,
            remote_ref: photo.remote_ref.as_deref(),
        })
    }
}

async fn open_local(config: &SyncConfig) -> anyhow::Result<(Arc<PhotoStore>, Arc<FsBlobStore>)> {
    let local = PhotoStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open photo database at {:?}", config.db_path))?;
    tokio::fs::create_dir_all(&config.blob_dir)
        .await
        .with_context(|| format!("failed to create blob dir at {:?}", config.blob_dir))?;
    Ok((Arc::new(local), Arc::new(FsBlobStore::new(&config.blob_dir))))
}

async fn build_engine(config: &SyncConfig) -> anyhow::Result<Arc<SyncEngine>> {
    let remote = config.require_remote()?;
    let client = CloudClient::with_timeout(
        &remote.base_url,
        remote.token.clone(),
        config.request_timeout,
    )
    .context("failed to build remote client")?;
    let (local, blobs) = open_local(config).await?;
    Ok(Arc::new(SyncEngine::new(Arc::new(client), local, blobs)))
}

async fn until_interrupted<F>(pass: F) -> anyhow::Result<PassOutcome>
where
    F: Future<Output = Result<PassOutcome, SyncError>>,
{
    tokio::select! {
        outcome = pass => Ok(outcome?),
        _ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
    }
}

fn print_outcome(outcome: PassOutcome) {
    match outcome {
        PassOutcome::Completed(report) => println!(
            "downloaded={} uploaded={} linked={} skipped={} failed={} collapsed={}",
            report.downloaded,
            report.uploaded,
            report.linked,
            report.skipped,
            report.failed,
            report.collapsed
        ),
        PassOutcome::AlreadyRunning => println!("sync already running"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        print_help();
        return Ok(());
    }

    let config = SyncConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    match mode {
        CliMode::Help => {}
        CliMode::SyncAll => {
            let engine = build_engine(&config).await?;
            print_outcome(until_interrupted(engine.sync_all()).await?);
        }
        CliMode::SyncOwner(owner_key) => {
            let engine = build_engine(&config).await?;
            print_outcome(until_interrupted(engine.sync_owner(&owner_key)).await?);
        }
        CliMode::Delete(id) => {
            let engine = build_engine(&config).await?;
            let cleanup = engine.delete_by_local_id(id).await?;
            println!("deleted photo {id} (remote: {cleanup:?})");
        }
        CliMode::Capture { owner_key, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {file:?}"))?;
            let (local, blobs) = open_local(&config).await?;
            let photo = import_photo(
                local.as_ref(),
                blobs.as_ref(),
                &owner_key,
                &bytes,
                OffsetDateTime::now_utc(),
            )
            .await?;
            println!("captured photo {} as {}", photo.id, photo.file_name);
        }
        CliMode::List(owner_key) => {
            let (local, _) = open_local(&config).await?;
            let photos = local.list_by_owner(&owner_key).await?;
            let views = photos
                .iter()
                .map(PhotoView::new)
                .collect::<anyhow::Result<Vec<_>>>()?;
            println!("{}", serde_json::to_string_pretty(&views)?);
        }
    }
    Ok(())
}
