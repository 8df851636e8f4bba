//! # Replicator Proxy
//!
//! Handles to replication sessions hosted by the remote engine.
//!
//! - **Config**: validated, immutable session description
//! - **Callbacks**: filter and conflict-resolver adapters the remote side calls by id
//! - **Proxy**: creation, control, listeners and ordered teardown
//!
//! Replicators are only offered by the deferred personality, since every
//! control operation waits on the remote session.

mod callbacks;
mod config;
mod proxy;
mod types;

pub use callbacks::{Conflict, ConflictResolver, DefaultConflictResolver, ReplicationFilter};
pub use config::ReplicatorConfiguration;
pub use proxy::Replicator;
pub use types::{
    Authenticator, DocumentFlags, DocumentReplication, Endpoint, ReplicatedDocument,
    ReplicatorActivityLevel, ReplicatorChange, ReplicatorProgress, ReplicatorStatus,
    ReplicatorType,
};
