//! Shared state for the proxy's axum handlers.

use std::sync::Arc;

use chopd_core::{ChopinConfig, ContextStore, DispatchQueue, Journal};

/// Everything a handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChopinConfig,
    client: reqwest::Client,
    contexts: ContextStore,
    journal: Journal,
    queue: DispatchQueue,
}

impl AppState {
    /// Builds state around a validated configuration.
    #[must_use]
    pub fn new(config: ChopinConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                client: reqwest::Client::new(),
                contexts: ContextStore::new(),
                journal: Journal::new(),
                queue: DispatchQueue::new(),
            }),
        }
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &ChopinConfig {
        &self.inner.config
    }

    /// Shared upstream HTTP client.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.inner.client
    }

    /// The context store.
    #[must_use]
    pub fn contexts(&self) -> &ContextStore {
        &self.inner.contexts
    }

    /// The request journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// The single-slot dispatch queue.
    #[must_use]
    pub fn queue(&self) -> &DispatchQueue {
        &self.inner.queue
    }

    /// Origin of the target application.
    #[must_use]
    pub fn target_origin(&self) -> String {
        format!("http://localhost:{}", self.inner.config.target_port)
    }
}
