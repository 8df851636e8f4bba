//! # Listener Token Registry
//!
//! Tracks the change-listener registrations of one resource so they can be
//! released together when it closes.
//!
//! The registry owns its entries. A [`ListenerToken`] only holds a weak
//! reference back, used to look its entry up again.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use uuid::Uuid;

use crate::channel::{CallChannel, CallbackHandler, CallbackId, ObjectId, Request, Response};
use crate::errors::{ProxyError, ProxyResult};
use crate::observability::{log_event_with_fields, Event};

/// Caller-visible handle to one active listener registration
#[derive(Debug, Clone)]
pub struct ListenerToken {
    id: Uuid,
    callback_id: CallbackId,
    registry: Weak<ListenerRegistry>,
}

impl ListenerToken {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Id the remote side addresses events to
    pub fn callback_id(&self) -> CallbackId {
        self.callback_id
    }

    /// Check whether this registration is still live
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.contains(self))
            .unwrap_or(false)
    }
}

impl PartialEq for ListenerToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ListenerToken {}

#[derive(Debug, Clone, Copy)]
struct TokenEntry {
    callback_id: CallbackId,
    target_id: ObjectId,
}

struct Tokens {
    entries: HashMap<Uuid, TokenEntry>,
    closed: bool,
}

/// Listener registrations scoped to one resource
pub struct ListenerRegistry {
    channel: Arc<dyn CallChannel>,
    tokens: Mutex<Tokens>,
}

impl ListenerRegistry {
    pub fn new(channel: Arc<dyn CallChannel>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            tokens: Mutex::new(Tokens {
                entries: HashMap::new(),
                closed: false,
            }),
        })
    }

    /// Register `handler` locally, then subscribe it on the remote side
    ///
    /// `subscribe` builds the request from the freshly allocated callback
    /// id. The handler is live before the request is sent, so events the
    /// remote side emits while answering are delivered. If the request
    /// fails, the local registration is rolled back. If the registry is
    /// closed before the request completes, the new subscription is removed
    /// again and the call fails with `ResourceClosed`.
    pub async fn add<F>(
        self: &Arc<Self>,
        target_id: ObjectId,
        handler: CallbackHandler,
        subscribe: F,
    ) -> ProxyResult<ListenerToken>
    where
        F: FnOnce(CallbackId) -> Request + Send,
    {
        let callback_id = self.channel.callbacks().register_listener(handler)?;
        let token = ListenerToken {
            id: Uuid::new_v4(),
            callback_id,
            registry: Arc::downgrade(self),
        };

        let inserted = {
            let mut tokens = self.lock_tokens()?;
            if tokens.closed {
                false
            } else {
                tokens.entries.insert(
                    token.id,
                    TokenEntry {
                        callback_id,
                        target_id,
                    },
                );
                true
            }
        };
        if !inserted {
            self.channel.callbacks().unregister_object(callback_id);
            return Err(ProxyError::closed("Listener registry"));
        }

        let subscribed = self
            .channel
            .call(subscribe(callback_id))
            .await
            .and_then(Response::into_ack);

        if let Err(err) = subscribed {
            if let Ok(mut tokens) = self.tokens.lock() {
                tokens.entries.remove(&token.id);
            }
            self.channel.callbacks().unregister_object(callback_id);
            return Err(err.into());
        }

        // remove_all drained the entry while the subscription was in flight,
        // and its unsubscribe may have reached the remote side first
        let drained = self
            .lock_tokens()
            .map(|tokens| tokens.closed && !tokens.entries.contains_key(&token.id))?;
        if drained {
            self.channel.callbacks().unregister_object(callback_id);
            self.channel
                .call(Request::RemoveChangeListener {
                    target_id,
                    listener_id: callback_id,
                })
                .await?
                .into_ack()?;
            return Err(ProxyError::closed("Listener registry"));
        }

        log_event_with_fields(
            Event::ListenerAdded,
            &[
                ("callback_id", &callback_id.to_string()),
                ("target_id", &target_id.to_string()),
            ],
        );
        Ok(token)
    }

    /// Release one registration
    ///
    /// Unknown or already-removed tokens are a no-op. Local dispatch stops
    /// before the remote side is told, so an event already in flight still
    /// completes but no new one is delivered.
    pub async fn remove(&self, token: &ListenerToken) -> ProxyResult<()> {
        let entry = {
            let mut tokens = self.lock_tokens()?;
            tokens.entries.remove(&token.id)
        };

        match entry {
            Some(entry) => self.release(entry).await,
            None => Ok(()),
        }
    }

    /// Release every registration and refuse new ones
    ///
    /// All entries are released even if some fail; the first failure is
    /// returned.
    pub async fn remove_all(&self) -> ProxyResult<()> {
        let entries: Vec<TokenEntry> = {
            let mut tokens = self.lock_tokens()?;
            tokens.closed = true;
            tokens.entries.drain().map(|(_, entry)| entry).collect()
        };

        let mut first_error = None;
        for entry in entries {
            if let Err(err) = self.release(entry).await {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn release(&self, entry: TokenEntry) -> ProxyResult<()> {
        self.channel.callbacks().unregister_object(entry.callback_id);
        self.channel
            .call(Request::RemoveChangeListener {
                target_id: entry.target_id,
                listener_id: entry.callback_id,
            })
            .await?
            .into_ack()?;

        log_event_with_fields(
            Event::ListenerRemoved,
            &[
                ("callback_id", &entry.callback_id.to_string()),
                ("target_id", &entry.target_id.to_string()),
            ],
        );
        Ok(())
    }

    pub fn contains(&self, token: &ListenerToken) -> bool {
        self.tokens
            .lock()
            .map(|t| t.entries.contains_key(&token.id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().map(|t| t.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_tokens(&self) -> ProxyResult<MutexGuard<'_, Tokens>> {
        self.tokens
            .lock()
            .map_err(|_| ProxyError::Internal("Lock poisoned".into()))
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("tokens", &self.len())
            .finish()
    }
}
