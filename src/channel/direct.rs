//! # Direct Channel
//!
//! Runs the remote engine inline on the caller's thread. Every future this
//! channel returns is ready on first poll, which is what lets the blocking
//! personality drive it without an executor.

use std::fmt;
use std::sync::Arc;

use super::callbacks::CallbackRegistry;
use super::errors::ChannelResult;
use super::protocol::{Request, Response};
use super::{CallChannel, ChannelFuture, RemoteContext, RemoteEngine};

/// Channel whose remote side executes on the calling thread
pub struct DirectChannel {
    engine: Arc<dyn RemoteEngine>,
    callbacks: Arc<CallbackRegistry>,
    context: RemoteContext,
}

impl DirectChannel {
    /// Create a channel over `engine`
    pub fn new(engine: Arc<dyn RemoteEngine>) -> Self {
        let callbacks = Arc::new(CallbackRegistry::new());
        Self {
            engine,
            context: RemoteContext::new(callbacks.clone()),
            callbacks,
        }
    }

    /// Send one request, answered before this returns
    pub fn call_blocking(&self, request: Request) -> ChannelResult<Response> {
        self.engine.handle(request, &self.context)
    }

    /// Context the engine dispatches through
    pub fn remote_context(&self) -> RemoteContext {
        self.context.clone()
    }
}

impl fmt::Debug for DirectChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectChannel")
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl CallChannel for DirectChannel {
    fn call(&self, request: Request) -> ChannelFuture<'_, Response> {
        Box::pin(async move { self.call_blocking(request) })
    }

    fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }
}
