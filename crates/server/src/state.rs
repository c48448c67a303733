//! Application state

use std::sync::Arc;

use run_engine::Dispatcher;

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    dispatcher: Dispatcher,
    config: ServerConfig,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner { dispatcher, config }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }
}
