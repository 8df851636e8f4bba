//! # Query Handle
//!
//! A compiled query living in the remote execution context.
//!
//! ## States
//!
//! ```text
//! unprepared → preparing → prepared
//!      └──────────┴───────────┴──→ closed
//! ```
//!
//! Handles are cheap to construct; compilation happens once, on first use
//! or on an explicit `prepare()`. Both personalities share one
//! engine object, so the behavior differs only in how results are returned.

mod blocking;
mod deferred;
mod handle;
mod language;
mod result_set;

pub(crate) use handle::QueryCore;

pub use blocking::BlockingQuery;
pub use deferred::DeferredQuery;
pub use handle::QueryChangeListener;
pub use language::{normalize_definition, Parameters, QueryLanguage};
pub use result_set::{QueryChange, ResultSet};

use crate::resource::PrepareState;

/// A query in either personality
#[derive(Debug, Clone)]
pub enum Query {
    Blocking(BlockingQuery),
    Deferred(DeferredQuery),
}

impl Query {
    pub fn definition(&self) -> &str {
        match self {
            Self::Blocking(q) => q.definition(),
            Self::Deferred(q) => q.definition(),
        }
    }

    pub fn language(&self) -> QueryLanguage {
        match self {
            Self::Blocking(q) => q.language(),
            Self::Deferred(q) => q.language(),
        }
    }

    pub fn json_representation(&self) -> Option<&str> {
        match self {
            Self::Blocking(q) => q.json_representation(),
            Self::Deferred(q) => q.json_representation(),
        }
    }

    pub fn prepare_state(&self) -> PrepareState {
        match self {
            Self::Blocking(q) => q.prepare_state(),
            Self::Deferred(q) => q.prepare_state(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Blocking(q) => q.is_closed(),
            Self::Deferred(q) => q.is_closed(),
        }
    }

    pub fn as_blocking(&self) -> Option<&BlockingQuery> {
        match self {
            Self::Blocking(q) => Some(q),
            Self::Deferred(_) => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&DeferredQuery> {
        match self {
            Self::Blocking(_) => None,
            Self::Deferred(q) => Some(q),
        }
    }
}

impl From<BlockingQuery> for Query {
    fn from(query: BlockingQuery) -> Self {
        Self::Blocking(query)
    }
}

impl From<DeferredQuery> for Query {
    fn from(query: DeferredQuery) -> Self {
        Self::Deferred(query)
    }
}
