use std::{path::Path, sync::Arc};

use crate::{
    backend::MemoryBackend,
    infra::{self, config::FileConfigAdapter, contracts::ConfigAdapter, error::AppError},
    usecases::context::AppContext,
};

const BACKEND_STARTED_OFFLINE: &str = "BACKEND_STARTED_OFFLINE";

/// Loads config, installs logging and builds the backend. `seed_override`
/// wins over `backend.seed_file` from the config.
pub fn bootstrap(
    config_path: Option<&Path>,
    seed_override: Option<&Path>,
) -> Result<AppContext, AppError> {
    let config_adapter = FileConfigAdapter::new(config_path).with_seed_override(seed_override);
    let context = build_context(&config_adapter)?;
    let guard = infra::logging::init(&context.config.logging)?;

    tracing::info!(
        feed_page_size = context.config.feed.page_size,
        history_page_size = context.config.chat.history_page_size,
        "agrosync started"
    );

    Ok(context.with_log_guard(guard))
}

fn build_context(config_adapter: &dyn ConfigAdapter) -> Result<AppContext, AppError> {
    let config = config_adapter.load().map_err(AppError::Config)?;

    let backend = match config.backend.seed_file.as_deref() {
        Some(path) => infra::seed::load(path)?,
        None => infra::seed::configure(MemoryBackend::new()),
    };
    if config.backend.offline {
        tracing::warn!(code = BACKEND_STARTED_OFFLINE, "backend starts disconnected");
        backend.set_offline(true);
    }

    Ok(AppContext::new(config, Arc::new(backend)))
}
