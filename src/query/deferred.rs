//! Deferred query personality
//!
//! Operations return futures. Suspension happens only while waiting on the
//! call channel or on a preparation another caller already started.

use std::sync::Arc;

use super::handle::QueryCore;
use super::language::{Parameters, QueryLanguage};
use super::result_set::{QueryChange, ResultSet};
use crate::errors::ProxyResult;
use crate::resource::{ListenerToken, PrepareState};

/// Query handle whose operations are awaited
#[derive(Debug, Clone)]
pub struct DeferredQuery {
    core: Arc<QueryCore>,
}

impl DeferredQuery {
    pub(crate) fn new(core: QueryCore) -> Self {
        Self {
            core: Arc::new(core),
        }
    }

    /// Compile now instead of on first use
    pub async fn prepare(&self) -> ProxyResult<()> {
        self.core.run_deferred(async { Ok(()) }).await
    }

    /// Replace bound parameters; `None` clears them
    pub async fn set_parameters(&self, parameters: Option<Parameters>) -> ProxyResult<()> {
        self.core
            .run_deferred(self.core.set_parameters(parameters))
            .await
    }

    pub async fn execute(&self) -> ProxyResult<ResultSet> {
        self.core.run_deferred(self.core.execute()).await
    }

    pub async fn explain(&self) -> ProxyResult<String> {
        self.core.run_deferred(self.core.explain()).await
    }

    /// Subscribe to result changes
    ///
    /// `listener` receives the current results before the returned future
    /// completes.
    pub async fn add_change_listener<F>(&self, listener: F) -> ProxyResult<ListenerToken>
    where
        F: Fn(QueryChange) + Send + Sync + 'static,
    {
        self.core
            .run_deferred(self.core.add_change_listener(Arc::new(listener)))
            .await
    }

    /// Unsubscribe; unknown or already-removed tokens are ignored
    pub async fn remove_change_listener(&self, token: &ListenerToken) -> ProxyResult<()> {
        self.core.listeners().remove(token).await
    }

    pub async fn close(&self) -> ProxyResult<()> {
        self.core.lifecycle().close().await
    }

    pub fn definition(&self) -> &str {
        self.core.definition()
    }

    pub fn language(&self) -> QueryLanguage {
        self.core.language()
    }

    pub fn json_representation(&self) -> Option<&str> {
        self.core.json_representation()
    }

    pub fn parameters(&self) -> Option<Parameters> {
        self.core.parameters()
    }

    pub fn prepare_state(&self) -> PrepareState {
        self.core.prepare_state()
    }

    pub fn is_closed(&self) -> bool {
        self.core.lifecycle().is_closed()
    }
}
