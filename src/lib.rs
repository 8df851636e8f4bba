//! relaydb - Proxy handles for a database engine hosted in another
//! execution context
//!
//! Queries and replication sessions live on the remote side of a call
//! channel. This crate gives callers handles that prepare once, operate
//! many times and release every remote registration exactly once on close.

pub mod channel;
pub mod database;
pub mod document;
pub mod errors;
pub mod observability;
pub mod query;
pub mod replicator;
pub mod resource;

pub use channel::{CallChannel, DirectChannel, RemoteContext, RemoteEngine, WorkerChannel};
pub use database::{BlockingDatabase, Database, DeferredDatabase};
pub use document::Document;
pub use errors::{ErrorKind, ProxyError, ProxyResult};
pub use query::{BlockingQuery, DeferredQuery, Parameters, Query, QueryLanguage};
pub use replicator::{Replicator, ReplicatorConfiguration};
pub use resource::ListenerToken;
