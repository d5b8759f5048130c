use std::path::Path;

use anyhow::Result;

use crate::infra::{config::AppConfig, contracts::ConfigAdapter};

/// Hands out a fixed config without touching the filesystem.
#[derive(Debug, Clone, Default)]
pub struct StubConfigAdapter {
    config: AppConfig,
}

impl StubConfigAdapter {
    pub fn with_config(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn with_seed_file(path: &Path) -> Self {
        let mut config = AppConfig::default();
        config.backend.seed_file = Some(path.to_path_buf());
        Self { config }
    }
}

impl ConfigAdapter for StubConfigAdapter {
    fn load(&self) -> Result<AppConfig> {
        Ok(self.config.clone())
    }
}
