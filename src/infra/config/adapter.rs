use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::infra::{
    config::{load, AppConfig},
    contracts::ConfigAdapter,
};

/// Reads `config.toml` and applies the `--seed` command line override on top.
#[derive(Debug, Clone, Default)]
pub struct FileConfigAdapter {
    path: Option<PathBuf>,
    seed_override: Option<PathBuf>,
}

impl FileConfigAdapter {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            seed_override: None,
        }
    }

    pub fn with_seed_override(mut self, seed: Option<&Path>) -> Self {
        self.seed_override = seed.map(Path::to_path_buf);
        self
    }
}

impl ConfigAdapter for FileConfigAdapter {
    fn load(&self) -> Result<AppConfig> {
        let mut config = load(self.path.as_deref())?;
        if let Some(seed) = &self.seed_override {
            config.backend.seed_file = Some(seed.clone());
        }
        Ok(config)
    }
}
