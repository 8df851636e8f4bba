//! Replicator Proxy
//!
//! Local handle to a replication session running in the remote execution
//! context.
//!
//! Creation is all-or-nothing: adapters for the push filter, pull filter and
//! conflict resolver are registered first, and if the create request fails
//! every one of them is unregistered before the error is returned.
//!
//! Teardown order is fixed: stop the session, unregister the adapters, drop
//! the listeners, release the remote object. The remote side never calls an
//! adapter that is already gone.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::callbacks::{filter_adapter, resolver_adapter};
use super::config::ReplicatorConfiguration;
use super::types::{DocumentReplication, ReplicatorChange, ReplicatorStatus};
use crate::channel::{
    CallChannel, CallbackHandler, CallbackId, CallbackPayload, CallbackRegistry, CallbackReply,
    ChannelError, ObjectId, Request, Response,
};
use crate::database::DeferredDatabase;
use crate::errors::{ProxyError, ProxyResult};
use crate::observability::{log_event_with_fields, Event};
use crate::resource::{Finalizer, Lifecycle, ListenerRegistry, ListenerToken};

/// Adapter ids registered for one replicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Registrations {
    push_filter: Option<CallbackId>,
    pull_filter: Option<CallbackId>,
    conflict_resolver: Option<CallbackId>,
}

impl Registrations {
    /// Register every adapter the configuration asks for
    ///
    /// On failure the ones already registered are removed again.
    fn register(
        callbacks: &CallbackRegistry,
        config: &ReplicatorConfiguration,
    ) -> ProxyResult<Self> {
        let mut registrations = Self::default();
        if let Err(err) = registrations.register_each(callbacks, config) {
            registrations.release(callbacks);
            return Err(err);
        }
        Ok(registrations)
    }

    fn register_each(
        &mut self,
        callbacks: &CallbackRegistry,
        config: &ReplicatorConfiguration,
    ) -> ProxyResult<()> {
        if let Some(filter) = &config.push_filter {
            self.push_filter =
                Some(callbacks.register_replication_filter(filter_adapter(filter.clone()))?);
        }
        if let Some(filter) = &config.pull_filter {
            self.pull_filter =
                Some(callbacks.register_replication_filter(filter_adapter(filter.clone()))?);
        }
        if let Some(resolver) = &config.conflict_resolver {
            self.conflict_resolver =
                Some(callbacks.register_conflict_resolver(resolver_adapter(resolver.clone()))?);
        }
        Ok(())
    }

    fn release(&self, callbacks: &CallbackRegistry) {
        let ids = [self.push_filter, self.pull_filter, self.conflict_resolver];
        for id in ids.into_iter().flatten() {
            callbacks.unregister_object(id);
        }
    }
}

struct ReplicatorInner {
    lifecycle: Arc<Lifecycle>,
    channel: Arc<dyn CallChannel>,
    replicator_id: ObjectId,
    config: ReplicatorConfiguration,
    listeners: Arc<ListenerRegistry>,
}

/// Handle to a remote replication session
#[derive(Clone)]
pub struct Replicator {
    inner: Arc<ReplicatorInner>,
}

impl Replicator {
    /// Create a replication session for `database`
    ///
    /// The configuration is validated and copied. Nothing is left registered
    /// on either side if creation fails.
    pub async fn create(
        database: &DeferredDatabase,
        config: ReplicatorConfiguration,
    ) -> ProxyResult<Self> {
        config.validate()?;
        database.lifecycle().ensure_open()?;

        let channel = database.channel().clone();
        let registrations = Registrations::register(channel.callbacks(), &config)?;

        let request = config.to_request(
            database.id(),
            database.properties_format(),
            registrations.push_filter,
            registrations.pull_filter,
            registrations.conflict_resolver,
        );

        let created = channel
            .call(Request::CreateReplicator(request))
            .await
            .and_then(Response::into_object_id);

        let replicator_id = match created {
            Ok(id) => id,
            Err(err) => {
                registrations.release(channel.callbacks());
                log_event_with_fields(
                    Event::ReplicatorCreateFailed,
                    &[("database_id", &database.id().to_string()), ("error", &err.to_string())],
                );
                return Err(err.into());
            }
        };

        let lifecycle = Lifecycle::child_of("Replicator", database.lifecycle());
        let listeners = ListenerRegistry::new(channel.clone());
        lifecycle.set_finalizer(teardown(
            channel.clone(),
            replicator_id,
            registrations,
            listeners.clone(),
        ))?;

        // the database may have closed while the create request was in flight
        if let Err(err) = lifecycle.attach(database.lifecycle()) {
            let _ = lifecycle.close().await;
            return Err(err);
        }

        log_event_with_fields(
            Event::ReplicatorCreated,
            &[
                ("database_id", &database.id().to_string()),
                ("replicator_id", &replicator_id.to_string()),
            ],
        );

        Ok(Self {
            inner: Arc::new(ReplicatorInner {
                lifecycle,
                channel,
                replicator_id,
                config,
                listeners,
            }),
        })
    }

    async fn run<T>(&self, op: impl Future<Output = ProxyResult<T>>) -> ProxyResult<T> {
        self.inner
            .lifecycle
            .run_deferred(async { Ok(()) }, op)
            .await
    }

    fn channel(&self) -> &Arc<dyn CallChannel> {
        &self.inner.channel
    }

    /// Remote object id of this session
    pub fn id(&self) -> ObjectId {
        self.inner.replicator_id
    }

    /// Copy of the configuration the session was created with
    pub fn config(&self) -> ReplicatorConfiguration {
        self.inner.config.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    /// Point-in-time status
    pub async fn status(&self) -> ProxyResult<ReplicatorStatus> {
        self.run(async {
            Ok(self
                .channel()
                .call(Request::GetReplicatorStatus {
                    replicator_id: self.id(),
                })
                .await?
                .into_status()?)
        })
        .await
    }

    /// Start replicating; `reset` restarts from the beginning
    pub async fn start(&self, reset: bool) -> ProxyResult<()> {
        self.run(async {
            self.channel()
                .call(Request::StartReplicator {
                    replicator_id: self.id(),
                    reset,
                })
                .await?
                .into_ack()?;

            log_event_with_fields(
                Event::ReplicatorStarted,
                &[("replicator_id", &self.id().to_string()), ("reset", &reset.to_string())],
            );
            Ok(())
        })
        .await
    }

    /// Stop replicating; stopping a stopped session is a no-op
    pub async fn stop(&self) -> ProxyResult<()> {
        self.run(stop_session(self.channel(), self.id())).await
    }

    pub async fn is_document_pending(&self, document_id: &str) -> ProxyResult<bool> {
        self.run(async {
            Ok(self
                .channel()
                .call(Request::ReplicatorIsDocumentPending {
                    replicator_id: self.id(),
                    document_id: document_id.to_string(),
                })
                .await?
                .into_bool()?)
        })
        .await
    }

    /// Ids of local changes not yet pushed
    pub async fn pending_document_ids(&self) -> ProxyResult<HashSet<String>> {
        self.run(async {
            let ids = self
                .channel()
                .call(Request::ReplicatorPendingDocumentIds {
                    replicator_id: self.id(),
                })
                .await?
                .into_document_ids()?;
            Ok(ids.into_iter().collect())
        })
        .await
    }

    /// Subscribe to status transitions
    pub async fn add_change_listener<F>(&self, listener: F) -> ProxyResult<ListenerToken>
    where
        F: Fn(ReplicatorChange) + Send + Sync + 'static,
    {
        let handler: CallbackHandler = Arc::new(move |payload| match payload {
            CallbackPayload::ReplicatorChange { status } => {
                listener(ReplicatorChange { status });
                Ok(CallbackReply::Ack)
            }
            other => Err(ChannelError::UnexpectedPayload(other.kind())),
        });

        let replicator_id = self.id();
        self.run(self.inner.listeners.add(replicator_id, handler, move |listener_id| {
            Request::AddReplicatorChangeListener {
                replicator_id,
                listener_id,
            }
        }))
        .await
    }

    /// Subscribe to per-document push and pull outcomes
    pub async fn add_document_replication_listener<F>(
        &self,
        listener: F,
    ) -> ProxyResult<ListenerToken>
    where
        F: Fn(DocumentReplication) + Send + Sync + 'static,
    {
        let handler: CallbackHandler = Arc::new(move |payload| match payload {
            CallbackPayload::DocumentReplication { is_push, documents } => {
                listener(DocumentReplication { is_push, documents });
                Ok(CallbackReply::Ack)
            }
            other => Err(ChannelError::UnexpectedPayload(other.kind())),
        });

        let replicator_id = self.id();
        self.run(self.inner.listeners.add(replicator_id, handler, move |listener_id| {
            Request::AddDocumentReplicationListener {
                replicator_id,
                listener_id,
            }
        }))
        .await
    }

    /// Unsubscribe either listener kind; unknown tokens are ignored
    pub async fn remove_change_listener(&self, token: &ListenerToken) -> ProxyResult<()> {
        self.inner.listeners.remove(token).await
    }

    /// Stop the session and release everything it registered
    pub async fn close(&self) -> ProxyResult<()> {
        self.inner.lifecycle.close().await
    }
}

impl fmt::Debug for Replicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicator")
            .field("replicator_id", &self.inner.replicator_id)
            .field("target", &self.inner.config.target)
            .field("lifecycle", &self.inner.lifecycle)
            .finish()
    }
}

async fn stop_session(channel: &Arc<dyn CallChannel>, replicator_id: ObjectId) -> ProxyResult<()> {
    channel
        .call(Request::StopReplicator { replicator_id })
        .await?
        .into_ack()?;

    log_event_with_fields(
        Event::ReplicatorStopped,
        &[("replicator_id", &replicator_id.to_string())],
    );
    Ok(())
}

fn teardown(
    channel: Arc<dyn CallChannel>,
    replicator_id: ObjectId,
    registrations: Registrations,
    listeners: Arc<ListenerRegistry>,
) -> Finalizer {
    Box::new(move || {
        Box::pin(async move {
            let mut first_error: Option<ProxyError> = None;
            let mut record = |step: &str, result: ProxyResult<()>| {
                if let Err(err) = result {
                    log_event_with_fields(
                        Event::ReplicatorTeardownFailed,
                        &[
                            ("error", &err.to_string()),
                            ("replicator_id", &replicator_id.to_string()),
                            ("step", step),
                        ],
                    );
                    first_error.get_or_insert(err);
                }
            };

            record("stop", stop_session(&channel, replicator_id).await);

            registrations.release(channel.callbacks());

            record("listeners", listeners.remove_all().await);

            let released = channel
                .call(Request::ReleaseObject {
                    object_id: replicator_id,
                })
                .await
                .and_then(Response::into_ack)
                .map_err(ProxyError::from);
            record("release", released);

            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    })
}
