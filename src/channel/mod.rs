//! # Call Channel
//!
//! Request/response plus push-event transport between local proxy handles
//! and the remote execution context that hosts the real engine.
//!
//! ## Architecture
//!
//! - **Protocol**: typed requests, responses and callback payloads
//! - **Callbacks**: local registry of adapters the remote side may address
//! - **Direct**: engine answers inline on the caller's thread (never suspends)
//! - **Worker**: engine hosted on a dedicated thread behind a request queue
//!
//! The engine itself is an external collaborator; it plugs in through
//! [`RemoteEngine`].

pub mod callbacks;
pub mod direct;
pub mod errors;
pub mod protocol;
pub mod worker;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use callbacks::{CallbackHandler, CallbackKind, CallbackRegistry};
pub use direct::DirectChannel;
pub use errors::{ChannelError, ChannelResult};
pub use protocol::{
    CallbackId, CallbackPayload, CallbackReply, ConflictResolution, CreateReplicatorRequest,
    DocumentState, EncodedDocument, ObjectId, PropertiesFormat, Request, Response, SnapshotId,
};
pub use worker::{WorkerChannel, WorkerConfig};

/// Boxed future returned across the channel seam
pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = ChannelResult<T>> + Send + 'a>>;

/// Transport to the remote execution context
pub trait CallChannel: Send + Sync {
    /// Send one request and wait for its response
    fn call(&self, request: Request) -> ChannelFuture<'_, Response>;

    /// Local registry the remote side calls back into
    fn callbacks(&self) -> &Arc<CallbackRegistry>;
}

/// The remote side of the channel
///
/// Implementations answer each request synchronously. Events and callback
/// round trips go through the supplied [`RemoteContext`]; implementations
/// must not hold their own locks while calling it, since adapters may
/// re-enter the channel.
pub trait RemoteEngine: Send + Sync + 'static {
    fn handle(&self, request: Request, context: &RemoteContext) -> ChannelResult<Response>;
}

/// Handle the remote side uses to reach local adapters
#[derive(Debug, Clone)]
pub struct RemoteContext {
    callbacks: Arc<CallbackRegistry>,
}

impl RemoteContext {
    /// Create a context dispatching into `callbacks`
    pub fn new(callbacks: Arc<CallbackRegistry>) -> Self {
        Self { callbacks }
    }

    /// Push an event to a listener
    ///
    /// Returns `false` if the listener is no longer registered; the event is
    /// dropped in that case.
    pub fn emit(&self, listener_id: CallbackId, payload: CallbackPayload) -> bool {
        match self.callbacks.invoke(listener_id, payload) {
            Ok(_) => true,
            Err(ChannelError::CallbackNotFound(_)) => false,
            Err(_) => true,
        }
    }

    /// Whether a listener or adapter is still registered on the local side
    pub fn is_registered(&self, callback_id: CallbackId) -> bool {
        self.callbacks.contains(callback_id)
    }

    /// Call a filter or resolver adapter and wait for its reply
    pub fn invoke(&self, callback_id: CallbackId, payload: CallbackPayload) -> ChannelResult<CallbackReply> {
        self.callbacks.invoke(callback_id, payload)
    }
}
