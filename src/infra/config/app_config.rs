use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub feed: FeedConfig,
    pub chat: ChatConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    /// When set, logs go to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatConfig {
    pub history_page_size: usize,
    /// Max distance between a pending echo and the confirmed message that
    /// replaces it.
    pub reconcile_window_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_page_size: 100,
            reconcile_window_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BackendConfig {
    pub seed_file: Option<PathBuf>,
    /// Starts the in-memory backend disconnected, so every call fails.
    pub offline: bool,
}
