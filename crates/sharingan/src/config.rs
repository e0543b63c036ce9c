use std::path::PathBuf;

use tracing::{info, warn};

use audit_common::redis::RedisStore;
use audit_common::slot::KvSlot;

use crate::error::AppError;
use crate::history::HISTORY_SLOT_NAME;

/// Where audit history is kept, loaded from environment variables.
///
/// The model client reads its own settings (`GEMINI_*`); this covers the local side only.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL. When set and reachable, history lives under the
    /// `sharingan_history` key instead of on disk.
    pub redis_url: Option<String>,
    /// JSON file holding the history when Redis is not used.
    pub history_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `SHARINGAN_HISTORY_PATH`: history file (default `$HOME/.local/share/sharingan/history.json`)
    /// - `REDIS_URL`: Redis connection string
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let history_path = match non_empty("SHARINGAN_HISTORY_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let home = non_empty("HOME").ok_or_else(|| {
                    AppError::Config(
                        "SHARINGAN_HISTORY_PATH is unset and HOME is unknown".to_string(),
                    )
                })?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("sharingan")
                    .join("history.json")
            }
        };

        Ok(Self {
            redis_url: non_empty("REDIS_URL"),
            history_path,
        })
    }

    /// Pick the history slot: Redis when configured and reachable, the file otherwise.
    pub async fn history_slot(&self) -> KvSlot {
        if let Some(url) = self.redis_url.as_deref() {
            match RedisStore::open(url) {
                Ok(store) => match store.ping().await {
                    Ok(()) => {
                        info!("redis connected, history stored in redis");
                        return KvSlot::redis(store, HISTORY_SLOT_NAME);
                    }
                    Err(e) => warn!(error = %e, "redis unavailable, falling back to the history file"),
                },
                Err(e) => warn!(error = %e, "invalid REDIS_URL, falling back to the history file"),
            }
        }
        KvSlot::file(&self.history_path)
    }
}
