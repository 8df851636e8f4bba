//! Call channel that holds one kind of request until released.
//!
//! Lets a test interleave a close with an operation whose request is still
//! in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relaydb::channel::{CallbackRegistry, ChannelFuture, Request, Response};
use relaydb::CallChannel;
use tokio::sync::watch;

pub struct GatedChannel {
    inner: Arc<dyn CallChannel>,
    gated: &'static str,
    gate: watch::Sender<bool>,
    waiting: AtomicUsize,
}

impl GatedChannel {
    /// Hold every `gated` request until [`GatedChannel::open`] is called.
    pub fn new(inner: Arc<dyn CallChannel>, gated: &'static str) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            inner,
            gated,
            gate,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Number of requests that reached the gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Let every held and future request through.
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Yield until `count` requests are parked at the gate.
    pub async fn wait_for_parked(&self, count: usize) {
        while self.waiting() < count {
            tokio::task::yield_now().await;
        }
    }
}

impl CallChannel for GatedChannel {
    fn call(&self, request: Request) -> ChannelFuture<'_, Response> {
        Box::pin(async move {
            if request.name() == self.gated {
                let mut open = self.gate.subscribe();
                self.waiting.fetch_add(1, Ordering::SeqCst);
                while !*open.borrow_and_update() {
                    if open.changed().await.is_err() {
                        break;
                    }
                }
            }
            self.inner.call(request).await
        })
    }

    fn callbacks(&self) -> &Arc<CallbackRegistry> {
        self.inner.callbacks()
    }
}
