use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

const APP_DIR_NAME: &str = "navphoto";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteSettings {
    pub base_url: String,
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub blob_dir: PathBuf,
    pub db_path: PathBuf,
    pub remote: Option<RemoteSettings>,
    pub request_timeout: Duration,
    pub log_filter: String,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let default_data = dirs::data_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join(APP_DIR_NAME);
        Ok(Self::from_lookup(
            |name| std::env::var(name).ok(),
            &home,
            default_data,
        ))
    }

    fn from_lookup<F>(lookup: F, home: &Path, default_data: PathBuf) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path_var = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| expand_with_home(value.trim(), home))
        };

        let data_dir = path_var("NAVPHOTO_DATA_DIR").unwrap_or(default_data);
        let blob_dir = path_var("NAVPHOTO_BLOB_DIR").unwrap_or_else(|| data_dir.join("photos"));
        let db_path = path_var("NAVPHOTO_DB_PATH").unwrap_or_else(|| data_dir.join("photos.db"));

        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let remote = non_empty("NAVPHOTO_REMOTE_URL").map(|base_url| RemoteSettings {
            base_url: base_url.trim().to_string(),
            token: non_empty("NAVPHOTO_REMOTE_TOKEN").unwrap_or_default(),
        });
        let request_timeout = Duration::from_secs(read_u64(
            lookup("NAVPHOTO_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));
        let log_filter =
            non_empty("NAVPHOTO_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            data_dir,
            blob_dir,
            db_path,
            remote,
            request_timeout,
            log_filter,
        }
    }

    /// Remote endpoint for commands that talk to the network.
    pub fn require_remote(&self) -> anyhow::Result<&RemoteSettings> {
        let remote = self
            .remote
            .as_ref()
            .context("NAVPHOTO_REMOTE_URL is not set")?;
        if remote.token.is_empty() {
            anyhow::bail!("NAVPHOTO_REMOTE_TOKEN is not set");
        }
        Ok(remote)
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
