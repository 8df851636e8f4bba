//! # Worker Channel
//!
//! Hosts the remote engine on a dedicated thread. Requests are queued on a
//! bounded `mpsc` channel and answered over a `oneshot`, so callers suspend
//! only while waiting for the worker. Events are dispatched on the worker
//! thread in the order the engine emits them.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use super::callbacks::CallbackRegistry;
use super::errors::{ChannelError, ChannelResult};
use super::protocol::{Request, Response};
use super::{CallChannel, ChannelFuture, RemoteContext, RemoteEngine};
use crate::errors::{ProxyError, ProxyResult};
use crate::observability::{log_event_with_fields, Event};

/// Default request queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Worker thread configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Name given to the worker thread
    pub thread_name: String,
    /// Requests that may wait in the queue before callers are held back
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "relaydb-worker".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.queue_capacity == 0 {
            return Err(ProxyError::InvalidConfiguration(
                "worker queue capacity must be greater than zero".into(),
            ));
        }
        if self.thread_name.trim().is_empty() {
            return Err(ProxyError::InvalidConfiguration(
                "worker thread name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<ChannelResult<Response>>,
}

/// Channel whose remote side runs on a background thread
pub struct WorkerChannel {
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    callbacks: Arc<CallbackRegistry>,
    context: RemoteContext,
}

impl WorkerChannel {
    /// Spawn a worker with the default configuration
    pub fn spawn(engine: Arc<dyn RemoteEngine>) -> ProxyResult<Self> {
        Self::spawn_with_config(engine, WorkerConfig::default())
    }

    /// Spawn a worker thread hosting `engine`
    pub fn spawn_with_config(engine: Arc<dyn RemoteEngine>, config: WorkerConfig) -> ProxyResult<Self> {
        config.validate()?;

        let (tx, mut rx) = mpsc::channel::<Envelope>(config.queue_capacity);
        let callbacks = Arc::new(CallbackRegistry::new());
        let context = RemoteContext::new(callbacks.clone());
        let worker_context = context.clone();
        let thread_name = config.thread_name.clone();

        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                log_event_with_fields(Event::WorkerStarted, &[("thread", &thread_name)]);

                while let Some(envelope) = rx.blocking_recv() {
                    let response = engine.handle(envelope.request, &worker_context);
                    // the caller may have stopped waiting
                    let _ = envelope.reply.send(response);
                }

                log_event_with_fields(Event::WorkerStopped, &[("thread", &thread_name)]);
            })
            .map_err(|e| ProxyError::Internal(format!("Failed to spawn worker thread: {}", e)))?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(handle)),
            callbacks,
            context,
        })
    }

    /// Context the engine dispatches through
    pub fn remote_context(&self) -> RemoteContext {
        self.context.clone()
    }

    /// Check whether the request queue is still open
    pub fn is_running(&self) -> bool {
        self.sender.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Close the request queue and wait for the worker to drain it
    ///
    /// Requests already queued are still answered. Calls made afterwards
    /// fail with [`ChannelError::Disconnected`].
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }

        let handle = self.thread.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            // joining from the worker itself would never return
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

impl fmt::Debug for WorkerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerChannel")
            .field("running", &self.is_running())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl CallChannel for WorkerChannel {
    fn call(&self, request: Request) -> ChannelFuture<'_, Response> {
        Box::pin(async move {
            let sender = {
                let guard = self
                    .sender
                    .lock()
                    .map_err(|_| ChannelError::Internal("Lock poisoned".into()))?;
                guard.clone().ok_or(ChannelError::Disconnected)?
            };

            let (reply_tx, reply_rx) = oneshot::channel();
            sender
                .send(Envelope {
                    request,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| ChannelError::Disconnected)?;

            reply_rx.await.map_err(|_| ChannelError::Disconnected)?
        })
    }

    fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.callbacks
    }
}
