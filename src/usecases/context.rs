use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;

use crate::{backend::BackendService, infra::config::AppConfig};

pub struct AppContext {
    pub config: AppConfig,
    pub backend: Arc<dyn BackendService>,
    /// Keeps the file log writer flushing until the app exits.
    _log_guard: Option<WorkerGuard>,
}

impl AppContext {
    pub fn new(config: AppConfig, backend: Arc<dyn BackendService>) -> Self {
        Self {
            config,
            backend,
            _log_guard: None,
        }
    }

    pub fn with_log_guard(mut self, guard: Option<WorkerGuard>) -> Self {
        self._log_guard = guard;
        self
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
