use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{AppConfig, BackendConfig, ChatConfig, FeedConfig, LogConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub feed: Option<FileFeedConfig>,
    pub chat: Option<FileChatConfig>,
    pub backend: Option<FileBackendConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(feed) = self.feed {
            feed.merge_into(&mut config.feed);
        }

        if let Some(chat) = self.chat {
            chat.merge_into(&mut config.chat);
        }

        if let Some(backend) = self.backend {
            backend.merge_into(&mut config.backend);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(file) = self.file {
            config.file = Some(file);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileFeedConfig {
    pub page_size: Option<usize>,
}

impl FileFeedConfig {
    fn merge_into(self, config: &mut FeedConfig) {
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileChatConfig {
    pub history_page_size: Option<usize>,
    pub reconcile_window_ms: Option<u64>,
}

impl FileChatConfig {
    fn merge_into(self, config: &mut ChatConfig) {
        if let Some(page_size) = self.history_page_size {
            config.history_page_size = page_size;
        }

        if let Some(window_ms) = self.reconcile_window_ms {
            config.reconcile_window_ms = window_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileBackendConfig {
    pub seed_file: Option<PathBuf>,
    pub offline: Option<bool>,
}

impl FileBackendConfig {
    fn merge_into(self, config: &mut BackendConfig) {
        if let Some(seed_file) = self.seed_file {
            config.seed_file = Some(seed_file);
        }

        if let Some(offline) = self.offline {
            config.offline = offline;
        }
    }
}
