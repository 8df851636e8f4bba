//! Blocking query personality
//!
//! Every call completes on the caller's thread before returning.

use std::sync::Arc;

use super::handle::QueryCore;
use super::language::{Parameters, QueryLanguage};
use super::result_set::{QueryChange, ResultSet};
use crate::errors::ProxyResult;
use crate::resource::{resolve_now, ListenerToken, PrepareState};

/// Query handle whose operations resolve immediately
#[derive(Debug, Clone)]
pub struct BlockingQuery {
    core: Arc<QueryCore>,
}

impl BlockingQuery {
    pub(crate) fn new(core: QueryCore) -> Self {
        Self {
            core: Arc::new(core),
        }
    }

    /// Compile now instead of on first use
    pub fn prepare(&self) -> ProxyResult<()> {
        self.core.run_blocking(async { Ok(()) })
    }

    /// Replace bound parameters; `None` clears them
    ///
    /// Never triggers a second compilation.
    pub fn set_parameters(&self, parameters: Option<Parameters>) -> ProxyResult<()> {
        self.core
            .run_blocking(self.core.set_parameters(parameters))
    }

    pub fn execute(&self) -> ProxyResult<ResultSet> {
        self.core.run_blocking(self.core.execute())
    }

    /// Diagnostic text describing how the engine will run this query
    pub fn explain(&self) -> ProxyResult<String> {
        self.core.run_blocking(self.core.explain())
    }

    /// Subscribe to result changes
    ///
    /// `listener` is called once with the current results before this
    /// returns.
    pub fn add_change_listener<F>(&self, listener: F) -> ProxyResult<ListenerToken>
    where
        F: Fn(QueryChange) + Send + Sync + 'static,
    {
        self.core
            .run_blocking(self.core.add_change_listener(Arc::new(listener)))
    }

    /// Unsubscribe; unknown or already-removed tokens are ignored
    pub fn remove_change_listener(&self, token: &ListenerToken) -> ProxyResult<()> {
        resolve_now(self.core.listeners().remove(token))
    }

    /// Release the compiled query and every listener
    pub fn close(&self) -> ProxyResult<()> {
        self.core.lifecycle().close_blocking()
    }

    pub fn definition(&self) -> &str {
        self.core.definition()
    }

    pub fn language(&self) -> QueryLanguage {
        self.core.language()
    }

    /// The JSON text this query was built from, if it was built from JSON
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
