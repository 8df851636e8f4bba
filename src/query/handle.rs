//! Engine object shared by both query personalities
//!
//! Every operation is written once as a future. The blocking personality
//! resolves those futures in place; the deferred one awaits them.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use super::language::{normalize_definition, Parameters, QueryLanguage};
use super::result_set::{QueryChange, ResultSet};
use crate::channel::{
    CallChannel, CallbackHandler, CallbackPayload, CallbackReply, ChannelError, ObjectId, Request,
    Response,
};
use crate::errors::{ProxyError, ProxyResult};
use crate::observability::{log_event_with_fields, Event};
use crate::resource::{Lifecycle, ListenerRegistry, ListenerToken, PrepareState};

/// Listener invoked with each query change notification
pub type QueryChangeListener = Arc<dyn Fn(QueryChange) + Send + Sync>;

pub(crate) struct QueryCore {
    lifecycle: Arc<Lifecycle>,
    channel: Arc<dyn CallChannel>,
    database_id: ObjectId,
    definition: String,
    language: QueryLanguage,
    parameters: RwLock<Option<Parameters>>,
    remote_id: Arc<OnceLock<ObjectId>>,
    released: Arc<AtomicBool>,
    listeners: Arc<ListenerRegistry>,
}

impl QueryCore {
    /// Build a query handle under `database`
    ///
    /// Nothing is sent to the remote side until first use.
    pub(crate) fn new(
        database: &Arc<Lifecycle>,
        channel: Arc<dyn CallChannel>,
        database_id: ObjectId,
        language: QueryLanguage,
        definition: impl Into<String>,
    ) -> ProxyResult<Self> {
        database.ensure_open()?;

        let lifecycle = Lifecycle::child_of("Query", database);
        let remote_id = Arc::new(OnceLock::new());
        let released = Arc::new(AtomicBool::new(false));
        let listeners = ListenerRegistry::new(channel.clone());

        {
            let channel = channel.clone();
            let remote_id = remote_id.clone();
            let released = released.clone();
            let listeners = listeners.clone();
            lifecycle.set_finalizer(Box::new(move || {
                Box::pin(async move {
                    let mut first_error = listeners.remove_all().await.err();

                    // a compile still in flight releases the id itself
                    if let Some(query_id) = remote_id.get().copied() {
                        if !released.swap(true, Ordering::SeqCst) {
                            if let Err(err) = release_remote(&*channel, query_id).await {
                                first_error.get_or_insert(err);
                            }
                        }
                    }

                    match first_error {
                        Some(err) => Err(err),
                        None => Ok(()),
                    }
                })
            }))?;
        }

        Ok(Self {
            lifecycle,
            channel,
            database_id,
            definition: definition.into(),
            language,
            parameters: RwLock::new(None),
            remote_id,
            released,
            listeners,
        })
    }

    // ==================
    // Accessors
    // ==================

    pub(crate) fn definition(&self) -> &str {
        &self.definition
    }

    pub(crate) fn language(&self) -> QueryLanguage {
        self.language
    }

    pub(crate) fn json_representation(&self) -> Option<&str> {
        match self.language {
            QueryLanguage::Json => Some(&self.definition),
            QueryLanguage::N1ql => None,
        }
    }

    pub(crate) fn parameters(&self) -> Option<Parameters> {
        self.parameters.read().ok().and_then(|p| (*p).clone())
    }

    pub(crate) fn prepare_state(&self) -> PrepareState {
        self.lifecycle.prepare_state()
    }

    pub(crate) fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub(crate) fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    // ==================
    // Personalities
    // ==================

    pub(crate) fn run_blocking<T>(
        &self,
        op: impl Future<Output = ProxyResult<T>>,
    ) -> ProxyResult<T> {
        self.lifecycle.run_blocking(self.compile(), op)
    }

    pub(crate) async fn run_deferred<T>(
        &self,
        op: impl Future<Output = ProxyResult<T>>,
    ) -> ProxyResult<T> {
        self.lifecycle.run_deferred(self.compile(), op).await
    }

    // ==================
    // Operations
    // ==================

    /// One-time compilation on the remote side
    async fn compile(&self) -> ProxyResult<()> {
        let definition = normalize_definition(self.language, &self.definition)?;

        let compiled = self
            .channel
            .call(Request::CreateQuery {
                database_id: self.database_id,
                language: self.language,
                definition,
            })
            .await
            .and_then(Response::into_object_id);

        let query_id = match compiled {
            Ok(id) => id,
            Err(err) => {
                log_event_with_fields(
                    Event::QueryPrepareFailed,
                    &[("error", &err.to_string()), ("language", self.language.as_str())],
                );
                return Err(err.into());
            }
        };

        // single-flight preparation means this is the only writer
        let _ = self.remote_id.set(query_id);

        log_event_with_fields(
            Event::QueryPrepared,
            &[("language", self.language.as_str()), ("query_id", &query_id.to_string())],
        );

        // closed while compiling: the finalizer saw no id to release
        if self.lifecycle.is_closed() && !self.released.swap(true, Ordering::SeqCst) {
            log_event_with_fields(
                Event::QueryReleasedAfterClose,
                &[("query_id", &query_id.to_string())],
            );
            release_remote(&*self.channel, query_id).await?;
        }
        Ok(())
    }

    fn query_id(&self) -> ProxyResult<ObjectId> {
        self.remote_id.get().copied().ok_or(ProxyError::NotPrepared)
    }

    /// Replace the bound parameter snapshot; `None` clears every binding
    pub(crate) async fn set_parameters(&self, parameters: Option<Parameters>) -> ProxyResult<()> {
        let query_id = self.query_id()?;

        self.channel
            .call(Request::SetQueryParameters {
                query_id,
                parameters: parameters.clone(),
            })
            .await?
            .into_ack()?;

        let count = parameters.as_ref().map_or(0, Parameters::len);
        {
            let mut slot = self
                .parameters
                .write()
                .map_err(|_| ProxyError::Internal("Lock poisoned".into()))?;
            *slot = parameters;
        }

        log_event_with_fields(
            Event::QueryParametersSet,
            &[("count", &count.to_string()), ("query_id", &query_id.to_string())],
        );
        Ok(())
    }

    pub(crate) async fn execute(&self) -> ProxyResult<ResultSet> {
        let query_id = self.query_id()?;
        let rows = self
            .channel
            .call(Request::ExecuteQuery { query_id })
            .await?
            .into_rows()?;

        log_event_with_fields(
            Event::QueryExecuted,
            &[("query_id", &query_id.to_string()), ("rows", &rows.len().to_string())],
        );
        Ok(ResultSet::new(rows))
    }

    pub(crate) async fn explain(&self) -> ProxyResult<String> {
        let query_id = self.query_id()?;
        Ok(self
            .channel
            .call(Request::ExplainQuery { query_id })
            .await?
            .into_text()?)
    }

    /// Subscribe a listener; the remote side emits the current rows at once
    pub(crate) async fn add_change_listener(
        &self,
        listener: QueryChangeListener,
    ) -> ProxyResult<ListenerToken> {
        let query_id = self.query_id()?;

        let handler: CallbackHandler = Arc::new(move |payload| match payload {
            CallbackPayload::QueryChange { rows } => {
                listener(QueryChange { rows });
                Ok(CallbackReply::Ack)
            }
            other => Err(ChannelError::UnexpectedPayload(other.kind())),
        });

        self.listeners
            .add(query_id, handler, move |listener_id| {
                Request::AddQueryChangeListener {
                    query_id,
                    listener_id,
                }
            })
            .await
    }
}

async fn release_remote(channel: &dyn CallChannel, query_id: ObjectId) -> ProxyResult<()> {
    channel
        .call(Request::ReleaseObject {
            object_id: query_id,
        })
        .await?
        .into_ack()?;
    Ok(())
}

impl fmt::Debug for QueryCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("language", &self.language)
            .field("definition", &self.definition)
            .field("query_id", &self.remote_id.get())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
