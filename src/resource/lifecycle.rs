//! Resource Lifecycle Controller
//!
//! Gives every resource-backed handle "prepare once, use many, close once"
//! semantics:
//!
//! - `Unattached → Attached → Closed`, with `Closed` reachable from any state
//! - Preparation runs at most once per successful attempt; concurrent
//!   deferred callers wait on the same in-flight preparation
//! - Closing a parent closes every attached child before the parent's own
//!   finalizer runs
//! - The finalizer runs exactly once
//!
//! Lock order is child before parent. A resource never holds its own lock
//! while closing children or running its finalizer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::OnceCell;

use super::resolve_now;
use crate::errors::{ProxyError, ProxyResult};
use crate::observability::{log_event_with_fields, Event};

/// Future returned by [`Lifecycle::close`]
pub type CloseFuture = Pin<Box<dyn Future<Output = ProxyResult<()>> + Send>>;

/// Teardown step run once when the resource closes
pub type Finalizer = Box<dyn FnOnce() -> CloseFuture + Send>;

/// Attachment state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    /// Not yet linked under its parent
    Unattached,
    /// Usable
    Attached,
    /// Terminal
    Closed,
}

/// Preparation progress of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareState {
    NotStarted,
    InProgress,
    Done,
}

struct State {
    status: ResourceStatus,
    parent: Option<Weak<Lifecycle>>,
    children: Vec<Arc<Lifecycle>>,
    finalizer: Option<Finalizer>,
}

/// Lifecycle controller embedded in every proxy handle
pub struct Lifecycle {
    name: String,
    default_parent: Option<Weak<Lifecycle>>,
    state: Mutex<State>,
    prepared: OnceCell<()>,
    preparing: AtomicBool,
    blocking_prepare: Mutex<()>,
}

/// Clears the in-progress flag even if the preparing future is dropped
struct PendingGuard<'a>(&'a AtomicBool);

impl<'a> PendingGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Lifecycle {
    /// Create a resource with no parent
    pub fn root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), None))
    }

    /// Create a resource that attaches under `parent` on first use
    pub fn child_of(name: impl Into<String>, parent: &Arc<Lifecycle>) -> Arc<Self> {
        Arc::new(Self::build(name.into(), Some(Arc::downgrade(parent))))
    }

    fn build(name: String, default_parent: Option<Weak<Lifecycle>>) -> Self {
        Self {
            name,
            default_parent,
            state: Mutex::new(State {
                status: ResourceStatus::Unattached,
                parent: None,
                children: Vec::new(),
                finalizer: None,
            }),
            prepared: OnceCell::new(),
            preparing: AtomicBool::new(false),
            blocking_prepare: Mutex::new(()),
        }
    }

    /// Install the teardown step, replacing any previous one
    pub fn set_finalizer(&self, finalizer: Finalizer) -> ProxyResult<()> {
        let mut state = self.lock_state()?;
        if state.status == ResourceStatus::Closed {
            return Err(ProxyError::closed(&self.name));
        }
        state.finalizer = Some(finalizer);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status; an unattached resource whose parent is closed or
    /// gone reports `Closed`
    pub fn status(&self) -> ResourceStatus {
        let own = self
            .state
            .lock()
            .map(|s| s.status)
            .unwrap_or(ResourceStatus::Closed);

        if own == ResourceStatus::Unattached && self.parent_closed() {
            ResourceStatus::Closed
        } else {
            own
        }
    }

    fn parent_closed(&self) -> bool {
        self.default_parent
            .as_ref()
            .map_or(false, |parent| parent.upgrade().map_or(true, |p| p.is_closed()))
    }

    pub fn is_closed(&self) -> bool {
        self.status() == ResourceStatus::Closed
    }

    pub fn prepare_state(&self) -> PrepareState {
        if self.prepared.initialized() {
            PrepareState::Done
        } else if self.preparing.load(Ordering::SeqCst) {
            PrepareState::InProgress
        } else {
            PrepareState::NotStarted
        }
    }

    /// Number of children currently attached
    pub fn child_count(&self) -> usize {
        self.state.lock().map(|s| s.children.len()).unwrap_or(0)
    }

    /// Fail with `ResourceClosed` if the resource is closed
    pub fn ensure_open(&self) -> ProxyResult<()> {
        if self.status() == ResourceStatus::Closed {
            return Err(ProxyError::closed(&self.name));
        }
        Ok(())
    }

    /// Link this resource under `parent` for cascading close
    ///
    /// A second call after a successful attach is a no-op.
    pub fn attach(self: &Arc<Self>, parent: &Arc<Lifecycle>) -> ProxyResult<()> {
        if Arc::ptr_eq(self, parent) {
            return Err(ProxyError::Internal(format!(
                "{} cannot be attached to itself",
                self.name
            )));
        }

        let mut state = self.lock_state()?;
        match state.status {
            ResourceStatus::Attached => return Ok(()),
            ResourceStatus::Closed => return Err(ProxyError::closed(&self.name)),
            ResourceStatus::Unattached => {}
        }

        {
            let mut parent_state = parent.lock_state()?;
            if parent_state.status == ResourceStatus::Closed {
                return Err(ProxyError::closed(&parent.name));
            }
            parent_state.children.push(self.clone());
        }

        state.parent = Some(Arc::downgrade(parent));
        state.status = ResourceStatus::Attached;
        drop(state);

        log_event_with_fields(
            Event::ResourceAttached,
            &[("parent", &parent.name), ("resource", &self.name)],
        );
        Ok(())
    }

    fn ensure_attached(self: &Arc<Self>) -> ProxyResult<()> {
        match self.status() {
            ResourceStatus::Attached => Ok(()),
            ResourceStatus::Closed => Err(ProxyError::closed(&self.name)),
            ResourceStatus::Unattached => match &self.default_parent {
                Some(parent) => {
                    let parent = parent
                        .upgrade()
                        .ok_or_else(|| ProxyError::closed(format!("Parent of {}", self.name)))?;
                    self.attach(&parent)
                }
                None => {
                    let mut state = self.lock_state()?;
                    if state.status == ResourceStatus::Unattached {
                        state.status = ResourceStatus::Attached;
                    }
                    Ok(())
                }
            },
        }
    }

    /// Run `op` after making sure the resource is attached and prepared
    ///
    /// `prepare` is awaited only by the first caller; concurrent callers wait
    /// for that same attempt. A failed attempt is reported to the caller that
    /// made it and the next caller tries again.
    pub async fn run_deferred<T, P, O>(self: &Arc<Self>, prepare: P, op: O) -> ProxyResult<T>
    where
        P: Future<Output = ProxyResult<()>>,
        O: Future<Output = ProxyResult<T>>,
    {
        self.ensure_attached()?;
        self.ensure_open()?;

        self.prepared
            .get_or_try_init(|| async {
                let _pending = PendingGuard::new(&self.preparing);
                prepare.await
            })
            .await?;

        // closed while we were waiting
        self.ensure_open()?;
        op.await
    }

    /// Blocking counterpart of [`Lifecycle::run_deferred`]
    ///
    /// # Panics
    ///
    /// Panics if a deferred preparation is still in flight, or if `prepare`
    /// or `op` would suspend. Both mean the two personalities were mixed on
    /// one resource.
    pub fn run_blocking<T, P, O>(self: &Arc<Self>, prepare: P, op: O) -> ProxyResult<T>
    where
        P: Future<Output = ProxyResult<()>>,
        O: Future<Output = ProxyResult<T>>,
    {
        self.ensure_attached()?;
        self.ensure_open()?;

        if !self.prepared.initialized() {
            let _serial = self
                .blocking_prepare
                .lock()
                .map_err(|_| ProxyError::Internal("Lock poisoned".into()))?;

            assert!(
                !self.preparing.load(Ordering::SeqCst),
                "{}: blocking call observed a deferred preparation still in flight",
                self.name
            );

            resolve_now(self.prepared.get_or_try_init(|| async {
                let _pending = PendingGuard::new(&self.preparing);
                prepare.await
            }))?;
        }

        self.ensure_open()?;
        resolve_now(op)
    }

    /// Close the resource, its children, then run the finalizer
    ///
    /// Closing more than once is a no-op. All teardown steps run even if one
    /// fails; the first failure is returned.
    pub fn close(self: &Arc<Self>) -> CloseFuture {
        let this = self.clone();
        Box::pin(async move {
            let (children, finalizer, parent) = {
                let mut state = this.lock_state()?;
                if state.status == ResourceStatus::Closed {
                    return Ok(());
                }
                state.status = ResourceStatus::Closed;
                (
                    std::mem::take(&mut state.children),
                    state.finalizer.take(),
                    state.parent.take(),
                )
            };

            let mut first_error: Option<ProxyError> = None;

            for child in children {
                if let Err(err) = child.close().await {
                    first_error.get_or_insert(err);
                }
            }

            if let Some(finalizer) = finalizer {
                if let Err(err) = finalizer().await {
                    first_error.get_or_insert(err);
                }
            }

            if let Some(parent) = parent.and_then(|p| p.upgrade()) {
                parent.detach_child(&this);
            }

            match first_error {
                None => {
                    log_event_with_fields(Event::ResourceClosed, &[("resource", &this.name)]);
                    Ok(())
                }
                Some(err) => {
                    log_event_with_fields(
                        Event::ResourceCloseFailed,
                        &[("error", &err.to_string()), ("resource", &this.name)],
                    );
                    Err(err)
                }
            }
        })
    }

    /// Close without suspending
    ///
    /// # Panics
    ///
    /// Panics if any finalizer in the tree would suspend.
    pub fn close_blocking(self: &Arc<Self>) -> ProxyResult<()> {
        resolve_now(self.close())
    }

    fn detach_child(&self, child: &Arc<Lifecycle>) {
        if let Ok(mut state) = self.state.lock() {
            state.children.retain(|c| !Arc::ptr_eq(c, child));
        }
    }

    fn lock_state(&self) -> ProxyResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ProxyError::Internal("Lock poisoned".into()))
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("prepare_state", &self.prepare_state())
            .finish()
    }
}
