use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::SettingsError;

const DEFAULT_API_URL: &str = "https://api.notion.com";
const DEFAULT_SCHEMA_FILE: &str = "notion_schema.json";

/// Process settings, read from the environment (and `.env`, loaded by `main`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub notion_token: Option<String>,
    pub database_id: Option<String>,
    pub watch_directory: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_schema_file")]
    pub schema_file: PathBuf,
    #[serde(default = "default_api_url")]
    pub notion_api_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_settle_timeout_secs")]
    pub settle_timeout_secs: u64,
    #[serde(default = "default_settle_poll_ms")]
    pub settle_poll_ms: u64,
    #[serde(default = "default_settle_quiet_ms")]
    pub settle_quiet_ms: u64,
    #[serde(default = "default_page_ready_timeout_secs")]
    pub page_ready_timeout_secs: u64,
}

/// Everything needed to talk to the Notion API.
#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub token: String,
    pub database_id: String,
    pub api_url: String,
    pub timeout: Duration,
}

/// Wait applied to freshly created files before they are read.
#[derive(Debug, Clone, Copy)]
pub struct SettleSettings {
    /// Give up waiting and read the file anyway after this long.
    pub timeout: Duration,
    pub poll: Duration,
    /// How long a non-empty file must keep the same length to count as written.
    pub quiet: Duration,
}

fn default_schema_file() -> PathBuf {
    PathBuf::from(DEFAULT_SCHEMA_FILE)
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_settle_timeout_secs() -> u64 {
    30
}

fn default_settle_poll_ms() -> u64 {
    500
}

fn default_settle_quiet_ms() -> u64 {
    2000
}

fn default_page_ready_timeout_secs() -> u64 {
    5
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        let cfg = Config::builder()
            .add_source(Environment::default())
            .build()?;
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: Config) -> Result<Self, SettingsError> {
        Ok(cfg.try_deserialize()?)
    }

    pub fn notion(&self) -> Result<NotionSettings, SettingsError> {
        match (present(&self.notion_token), present(&self.database_id)) {
            (Some(token), Some(database_id)) => Ok(NotionSettings {
                token: token.to_string(),
                database_id: database_id.to_string(),
                api_url: self.notion_api_url.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(self.http_timeout_secs),
            }),
            (token, database_id) => {
                let mut missing = Vec::new();
                if token.is_none() {
                    missing.push("NOTION_TOKEN");
                }
                if database_id.is_none() {
                    missing.push("DATABASE_ID");
                }
                Err(SettingsError::Missing(missing))
            }
        }
    }

    /// Notion settings plus the directory to watch; `dir` overrides `WATCH_DIRECTORY`.
    pub fn watch(&self, dir: Option<PathBuf>) -> Result<(NotionSettings, PathBuf), SettingsError> {
        let dir = dir.or_else(|| {
            self.watch_directory
                .clone()
                .filter(|d| !d.as_os_str().is_empty())
        });
        match (self.notion(), dir) {
            (Ok(notion), Some(dir)) => Ok((notion, dir)),
            (Ok(_), None) => Err(SettingsError::Missing(vec!["WATCH_DIRECTORY"])),
            (Err(SettingsError::Missing(mut missing)), None) => {
                missing.push("WATCH_DIRECTORY");
                Err(SettingsError::Missing(missing))
            }
            (Err(e), _) => Err(e),
        }
    }

    pub fn settle(&self) -> SettleSettings {
        SettleSettings {
            timeout: Duration::from_secs(self.settle_timeout_secs),
            poll: Duration::from_millis(self.settle_poll_ms),
            quiet: Duration::from_millis(self.settle_quiet_ms),
        }
    }

    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.page_ready_timeout_secs)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
