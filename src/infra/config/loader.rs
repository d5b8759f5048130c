use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::infra::{
    config::{file_config::FileConfig, AppConfig},
    error::AppError,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const APP_DIR_NAME: &str = "agrosync";

pub fn load(path: Option<&Path>) -> Result<AppConfig, AppError> {
    let mut config = AppConfig::default();

    let Some(config_path) = resolve_path(path) else {
        return Ok(config);
    };

    if !config_path.exists() {
        return Ok(config);
    }

    let raw = fs::read_to_string(&config_path).map_err(|source| AppError::ConfigRead {
        path: config_path.clone(),
        source,
    })?;

    let file_config: FileConfig = toml::from_str(&raw).map_err(|source| AppError::ConfigParse {
        path: config_path,
        source,
    })?;

    file_config.merge_into(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Explicit path first, then `./config.toml`, then the per-user config dir.
fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(DEFAULT_CONFIG_PATH);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(DEFAULT_CONFIG_PATH))
}

fn validate(config: &AppConfig) -> Result<(), AppError> {
    if config.feed.page_size == 0 {
        return Err(AppError::ConfigValue {
            key: "feed.page_size",
            details: "must be at least 1".to_owned(),
        });
    }

    if config.chat.history_page_size == 0 {
        return Err(AppError::ConfigValue {
            key: "chat.history_page_size",
            details: "must be at least 1".to_owned(),
        });
    }

    Ok(())
}
