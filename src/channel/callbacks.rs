//! # Callback Registry
//!
//! Local-process registry mapping a [`CallbackId`] to an adapter closure.
//! The id is the only thing that crosses the channel; the remote side calls
//! back by sending a payload addressed to it, and the registry dispatches.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::errors::{ChannelError, ChannelResult};
use super::protocol::{CallbackId, CallbackPayload, CallbackReply};
use crate::observability::{log_event_with_fields, Event};

/// Adapter invoked when the remote side addresses a registered id
pub type CallbackHandler =
    Arc<dyn Fn(CallbackPayload) -> ChannelResult<CallbackReply> + Send + Sync>;

/// What a registered adapter is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Change or document-replication listener
    Listener,
    /// Push or pull replication filter
    ReplicationFilter,
    /// Conflict resolver
    ConflictResolver,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listener => "listener",
            Self::ReplicationFilter => "replication_filter",
            Self::ConflictResolver => "conflict_resolver",
        }
    }
}

struct RegisteredCallback {
    kind: CallbackKind,
    handler: CallbackHandler,
}

/// Registry of adapters reachable from the remote side
pub struct CallbackRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<CallbackId, RegisteredCallback>>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registered", &self.len())
            .finish()
    }
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an adapter and return the id the remote side must use
    pub fn register(&self, kind: CallbackKind, handler: CallbackHandler) -> ChannelResult<CallbackId> {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut handlers = self
                .handlers
                .write()
                .map_err(|_| ChannelError::Internal("Lock poisoned".into()))?;
            handlers.insert(id, RegisteredCallback { kind, handler });
        }

        log_event_with_fields(
            Event::CallbackRegistered,
            &[("callback_id", &id.to_string()), ("kind", kind.as_str())],
        );
        Ok(id)
    }

    /// Register a change listener adapter
    pub fn register_listener(&self, handler: CallbackHandler) -> ChannelResult<CallbackId> {
        self.register(CallbackKind::Listener, handler)
    }

    /// Register a push or pull filter adapter
    pub fn register_replication_filter(&self, handler: CallbackHandler) -> ChannelResult<CallbackId> {
        self.register(CallbackKind::ReplicationFilter, handler)
    }

    /// Register a conflict resolver adapter
    pub fn register_conflict_resolver(&self, handler: CallbackHandler) -> ChannelResult<CallbackId> {
        self.register(CallbackKind::ConflictResolver, handler)
    }

    /// Remove an adapter. Returns `false` if it was not registered.
    pub fn unregister_object(&self, id: CallbackId) -> bool {
        let removed = match self.handlers.write() {
            Ok(mut handlers) => handlers.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };

        match removed {
            Some(entry) => {
                log_event_with_fields(
                    Event::CallbackUnregistered,
                    &[("callback_id", &id.to_string()), ("kind", entry.kind.as_str())],
                );
                true
            }
            None => false,
        }
    }

    /// Dispatch a payload to the adapter registered under `id`
    ///
    /// The handler is cloned out of the lock first, so an adapter may
    /// register or unregister callbacks while it runs.
    pub fn invoke(&self, id: CallbackId, payload: CallbackPayload) -> ChannelResult<CallbackReply> {
        let handler = {
            let handlers = self
                .handlers
                .read()
                .map_err(|_| ChannelError::Internal("Lock poisoned".into()))?;
            handlers
                .get(&id)
                .map(|entry| entry.handler.clone())
                .ok_or(ChannelError::CallbackNotFound(id))?
        };
        handler(payload)
    }

    /// Check whether an id is registered
    pub fn contains(&self, id: CallbackId) -> bool {
        self.handlers
            .read()
            .map(|m| m.contains_key(&id))
            .unwrap_or(false)
    }

    /// Number of registered adapters of one kind
    pub fn count(&self, kind: CallbackKind) -> usize {
        self.handlers
            .read()
            .map(|m| m.values().filter(|entry| entry.kind == kind).count())
            .unwrap_or(0)
    }

    /// Get adapter count
    pub fn len(&self) -> usize {
        self.handlers.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ack_handler(counter: Arc<AtomicUsize>) -> CallbackHandler {
        Arc::new(move |_payload| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(CallbackReply::Ack)
        })
    }

    fn change() -> CallbackPayload {
        CallbackPayload::QueryChange { rows: Vec::new() }
    }

    #[test]
    fn test_register_and_invoke() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let id = registry.register_listener(ack_handler(counter.clone())).unwrap();
        assert!(registry.contains(id));

        let reply = registry.invoke(id, change()).unwrap();
        assert_eq!(reply, CallbackReply::Ack);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let a = registry.register_listener(ack_handler(counter.clone())).unwrap();
        let b = registry.register_listener(ack_handler(counter)).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_twice() {
        let registry = CallbackRegistry::new();
        let id = registry
            .register_replication_filter(Arc::new(|_| Ok(CallbackReply::Filter(true))))
            .unwrap();

        assert!(registry.unregister_object(id));
        assert!(!registry.unregister_object(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invoke_unknown_id() {
        let registry = CallbackRegistry::new();
        let err = registry.invoke(CallbackId(99), change()).unwrap_err();
        assert_eq!(err, ChannelError::CallbackNotFound(CallbackId(99)));
    }

    #[test]
    fn test_count_by_kind() {
        let registry = CallbackRegistry::new();
        registry
            .register_conflict_resolver(Arc::new(|_| Ok(CallbackReply::Ack)))
            .unwrap();
        registry
            .register_replication_filter(Arc::new(|_| Ok(CallbackReply::Filter(false))))
            .unwrap();
        registry
            .register_replication_filter(Arc::new(|_| Ok(CallbackReply::Filter(true))))
            .unwrap();

        assert_eq!(registry.count(CallbackKind::ReplicationFilter), 2);
        assert_eq!(registry.count(CallbackKind::ConflictResolver), 1);
        assert_eq!(registry.count(CallbackKind::Listener), 0);
    }

    #[test]
    fn test_handler_may_unregister_itself() {
        let registry = Arc::new(CallbackRegistry::new());
        let slot: Arc<RwLock<Option<CallbackId>>> = Arc::new(RwLock::new(None));

        let handler: CallbackHandler = {
            let registry = Arc::downgrade(&registry);
            let slot = slot.clone();
            Arc::new(move |_| {
                if let (Some(registry), Some(id)) = (registry.upgrade(), *slot.read().unwrap()) {
                    registry.unregister_object(id);
                }
                Ok(CallbackReply::Ack)
            })
        };

        let id = registry.register_listener(handler).unwrap();
        *slot.write().unwrap() = Some(id);

        registry.invoke(id, change()).unwrap();
        assert!(!registry.contains(id));
    }
}
