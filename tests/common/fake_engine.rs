//! In-memory fake of the remote engine.
//!
//! Records every request it serves so tests can assert on compile counts,
//! teardown order and registration ids. Documents are plain JSON objects; a
//! query returns the documents whose fields equal every bound parameter.
//!
//! Failure knobs:
//! - query text containing `INVALID` fails to compile
//! - a replicator URL containing `unreachable` fails to create
//! - a `$name` referenced by the query but not bound fails at execution

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use relaydb::channel::{
    CallbackId, CallbackPayload, CallbackReply, ChannelError, ChannelResult, ConflictResolution,
    CreateReplicatorRequest, DocumentState, ObjectId, Request, Response,
};
use relaydb::replicator::{
    DocumentFlags, Endpoint, ReplicatedDocument, ReplicatorActivityLevel, ReplicatorProgress,
    ReplicatorStatus,
};
use relaydb::{Parameters, QueryLanguage, RemoteContext, RemoteEngine};
use serde_json::Value;

/// A compiled query held by the fake.
#[derive(Debug, Clone)]
pub struct FakeQuery {
    pub language: QueryLanguage,
    pub definition: String,
    pub parameters: Option<Parameters>,
    pub listeners: Vec<CallbackId>,
}

/// A replication session held by the fake.
#[derive(Debug, Clone)]
pub struct FakeReplicator {
    pub request: CreateReplicatorRequest,
    pub status: ReplicatorStatus,
    pub change_listeners: Vec<CallbackId>,
    pub document_listeners: Vec<CallbackId>,
}

#[derive(Default)]
struct State {
    requests: Vec<Request>,
    documents: Vec<Value>,
    compiled: Vec<String>,
    queries: HashMap<ObjectId, FakeQuery>,
    replicators: HashMap<ObjectId, FakeReplicator>,
    released: Vec<ObjectId>,
    pending_ids: Vec<String>,
    resolutions: Vec<ConflictResolution>,
    adapters_at_stop: Vec<Vec<(CallbackId, bool)>>,
}

pub struct FakeEngine {
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(100),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn allocate(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Seed a document without notifying anyone.
    pub fn insert(&self, document: Value) {
        self.state().documents.push(document);
    }

    /// Ids returned by `ReplicatorPendingDocumentIds`, duplicates kept.
    pub fn set_pending_ids(&self, ids: &[&str]) {
        self.state().pending_ids = ids.iter().map(|s| s.to_string()).collect();
    }

    // =========================================================================
    // Recorded state
    // =========================================================================

    /// Number of `CreateQuery` requests served.
    pub fn compile_count(&self) -> usize {
        self.state().compiled.len()
    }

    /// Definitions as received for compilation.
    pub fn compiled_definitions(&self) -> Vec<String> {
        self.state().compiled.clone()
    }

    pub fn request_names(&self) -> Vec<&'static str> {
        self.state().requests.iter().map(Request::name).collect()
    }

    pub fn count_requests(&self, name: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.name() == name)
            .count()
    }

    pub fn replicator(&self, id: ObjectId) -> Option<FakeReplicator> {
        self.state().replicators.get(&id).cloned()
    }

    pub fn replicator_count(&self) -> usize {
        self.state().replicators.len()
    }

    pub fn query(&self, id: ObjectId) -> Option<FakeQuery> {
        self.state().queries.get(&id).cloned()
    }

    pub fn live_query_count(&self) -> usize {
        self.state().queries.len()
    }

    pub fn only_query_id(&self) -> ObjectId {
        let state = self.state();
        assert_eq!(state.queries.len(), 1, "expected exactly one live query");
        let id = *state.queries.keys().next().unwrap();
        id
    }

    /// Last `CreateReplicator` request served, successful or not.
    pub fn last_create_request(&self) -> Option<CreateReplicatorRequest> {
        self.state().requests.iter().rev().find_map(|r| match r {
            Request::CreateReplicator(request) => Some(request.clone()),
            _ => None,
        })
    }

    pub fn released(&self) -> Vec<ObjectId> {
        self.state().released.clone()
    }

    pub fn resolutions(&self) -> Vec<ConflictResolution> {
        self.state().resolutions.clone()
    }

    /// For each `StopReplicator` served, the replicator's filter and
    /// resolver ids and whether each was still registered locally.
    pub fn adapters_at_stop(&self) -> Vec<Vec<(CallbackId, bool)>> {
        self.state().adapters_at_stop.clone()
    }

    // =========================================================================
    // Remote-side activity
    // =========================================================================

    /// Add a document and notify every query listener.
    pub fn mutate(&self, context: &RemoteContext, document: Value) {
        let deliveries = {
            let mut state = self.state();
            state.documents.push(document);
            let documents = state.documents.clone();
            let mut deliveries = Vec::new();
            for query in state.queries.values() {
                let rows = select(&documents, query.parameters.as_ref());
                for listener in &query.listeners {
                    deliveries.push((*listener, rows.clone()));
                }
            }
            deliveries
        };

        for (listener, rows) in deliveries {
            context.emit(listener, CallbackPayload::QueryChange { rows });
        }
    }

    /// Push a status transition to the replicator's change listeners.
    pub fn set_status(&self, context: &RemoteContext, id: ObjectId, status: ReplicatorStatus) {
        let listeners = {
            let mut state = self.state();
            let replicator = state.replicators.get_mut(&id).unwrap();
            replicator.status = status.clone();
            replicator.change_listeners.clone()
        };
        for listener in listeners {
            context.emit(
                listener,
                CallbackPayload::ReplicatorChange {
                    status: status.clone(),
                },
            );
        }
    }

    /// Run incoming documents through the pull filter, then report the
    /// accepted ones to document listeners. Returns the filter decisions.
    pub fn simulate_pull(
        &self,
        context: &RemoteContext,
        id: ObjectId,
        documents: Vec<DocumentState>,
    ) -> Vec<bool> {
        let (filter, listeners) = {
            let state = self.state();
            let replicator = &state.replicators[&id];
            (
                replicator.request.pull_filter_id,
                replicator.document_listeners.clone(),
            )
        };

        let mut decisions = Vec::new();
        let mut accepted = Vec::new();
        for document in documents {
            let keep = match filter {
                Some(filter_id) => match context.invoke(
                    filter_id,
                    CallbackPayload::ReplicationFilter {
                        document: document.clone(),
                        flags: DocumentFlags::default(),
                    },
                ) {
                    Ok(CallbackReply::Filter(keep)) => keep,
                    other => panic!("unexpected filter reply: {:?}", other),
                },
                None => true,
            };
            decisions.push(keep);
            if keep {
                accepted.push(ReplicatedDocument {
                    id: document.id.clone(),
                    flags: DocumentFlags::default(),
                    error: None,
                });
            }
        }

        for listener in listeners {
            context.emit(
                listener,
                CallbackPayload::DocumentReplication {
                    is_push: false,
                    documents: accepted.clone(),
                },
            );
        }
        decisions
    }

    /// Ask the replicator's conflict resolver to settle a conflict.
    pub fn simulate_conflict(
        &self,
        context: &RemoteContext,
        id: ObjectId,
        local: Option<DocumentState>,
        remote: Option<DocumentState>,
    ) -> ChannelResult<ConflictResolution> {
        let resolver = self.state().replicators[&id]
            .request
            .conflict_resolver_id
            .ok_or_else(|| ChannelError::remote("NO_RESOLVER", "no resolver registered"))?;

        let document_id = local
            .as_ref()
            .or(remote.as_ref())
            .map(|d| d.id.clone())
            .unwrap_or_default();

        let reply = context.invoke(
            resolver,
            CallbackPayload::ResolveConflict {
                document_id,
                local,
                remote,
            },
        )?;

        match reply {
            CallbackReply::Resolution(resolution) => {
                self.state().resolutions.push(resolution.clone());
                Ok(resolution)
            }
            other => Err(ChannelError::remote(
                "BAD_REPLY",
                format!("unexpected resolver reply: {:?}", other),
            )),
        }
    }

    fn emit_all(context: &RemoteContext, deliveries: Vec<(CallbackId, CallbackPayload)>) {
        for (listener, payload) in deliveries {
            context.emit(listener, payload);
        }
    }
}

impl RemoteEngine for FakeEngine {
    fn handle(&self, request: Request, context: &RemoteContext) -> ChannelResult<Response> {
        // events are collected under the lock and emitted after it is released
        let mut deliveries = Vec::new();

        let response = {
            let mut state = self.state();
            state.requests.push(request.clone());
            if let Request::StopReplicator { replicator_id } = &request {
                let adapters = state
                    .replicators
                    .get(replicator_id)
                    .map(|replicator| adapter_ids(&replicator.request))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|id| (id, context.is_registered(id)))
                    .collect();
                state.adapters_at_stop.push(adapters);
            }
            let response = serve(self, &mut state, request, &mut deliveries);
            response
        };

        Self::emit_all(context, deliveries);
        response
    }
}

pub fn adapter_ids(request: &CreateReplicatorRequest) -> Vec<CallbackId> {
    [
        request.push_filter_id,
        request.pull_filter_id,
        request.conflict_resolver_id,
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn serve(
    engine: &FakeEngine,
    state: &mut State,
    request: Request,
    deliveries: &mut Vec<(CallbackId, CallbackPayload)>,
) -> ChannelResult<Response> {
    match request {
        Request::OpenDatabase { name } => {
            if name.is_empty() {
                return Err(ChannelError::remote("NOT_FOUND", "database name is empty"));
            }
            Ok(Response::ObjectId(engine.allocate()))
        }

        Request::CreateQuery {
            language,
            definition,
            ..
        } => {
            state.compiled.push(definition.clone());
            if definition.contains("INVALID") {
                return Err(ChannelError::remote(
                    "COMPILE",
                    format!("syntax error in: {}", definition),
                ));
            }
            let id = engine.allocate();
            state.queries.insert(
                id,
                FakeQuery {
                    language,
                    definition,
                    parameters: None,
                    listeners: Vec::new(),
                },
            );
            Ok(Response::ObjectId(id))
        }

        Request::SetQueryParameters {
            query_id,
            parameters,
        } => {
            let documents = state.documents.clone();
            let query = lookup_query(state, query_id)?;
            query.parameters = parameters;
            let rows = select(&documents, query.parameters.as_ref());
            for listener in &query.listeners {
                deliveries.push((
                    *listener,
                    CallbackPayload::QueryChange { rows: rows.clone() },
                ));
            }
            Ok(Response::Ack)
        }

        Request::ExecuteQuery { query_id } => {
            let documents = state.documents.clone();
            let query = lookup_query(state, query_id)?;
            check_parameters(query)?;
            Ok(Response::Rows(select(&documents, query.parameters.as_ref())))
        }

        Request::ExplainQuery { query_id } => {
            let query = lookup_query(state, query_id)?;
            let json = match query.language {
                QueryLanguage::Json => query.definition.clone(),
                QueryLanguage::N1ql => format!("{{\"n1ql\": {:?}}}", query.definition),
            };
            Ok(Response::Text(format!(
                "{}\n\n0|0|0|SCAN TABLE kv_default\n\n{}\n",
                query.definition, json
            )))
        }

        Request::AddQueryChangeListener {
            query_id,
            listener_id,
        } => {
            let documents = state.documents.clone();
            let query = lookup_query(state, query_id)?;
            query.listeners.push(listener_id);
            deliveries.push((
                listener_id,
                CallbackPayload::QueryChange {
                    rows: select(&documents, query.parameters.as_ref()),
                },
            ));
            Ok(Response::Ack)
        }

        Request::CreateReplicator(request) => {
            if let Endpoint::Url(url) = &request.target {
                if url.contains("unreachable") {
                    return Err(ChannelError::remote(
                        "CONNECTION_REFUSED",
                        format!("cannot reach {}", url),
                    ));
                }
            }
            let id = engine.allocate();
            state.replicators.insert(
                id,
                FakeReplicator {
                    request,
                    status: ReplicatorStatus {
                        activity: ReplicatorActivityLevel::Stopped,
                        progress: ReplicatorProgress::default(),
                        error: None,
                    },
                    change_listeners: Vec::new(),
                    document_listeners: Vec::new(),
                },
            );
            Ok(Response::ObjectId(id))
        }

        Request::StartReplicator { replicator_id, .. } => {
            let replicator = lookup_replicator(state, replicator_id)?;
            for activity in [
                ReplicatorActivityLevel::Connecting,
                ReplicatorActivityLevel::Idle,
            ] {
                replicator.status.activity = activity;
                for listener in &replicator.change_listeners {
                    deliveries.push((
                        *listener,
                        CallbackPayload::ReplicatorChange {
                            status: replicator.status.clone(),
                        },
                    ));
                }
            }
            Ok(Response::Ack)
        }

        Request::StopReplicator { replicator_id } => {
            let replicator = lookup_replicator(state, replicator_id)?;
            if replicator.status.activity != ReplicatorActivityLevel::Stopped {
                replicator.status.activity = ReplicatorActivityLevel::Stopped;
                for listener in &replicator.change_listeners {
                    deliveries.push((
                        *listener,
                        CallbackPayload::ReplicatorChange {
                            status: replicator.status.clone(),
                        },
                    ));
                }
            }
            Ok(Response::Ack)
        }

        Request::GetReplicatorStatus { replicator_id } => {
            let replicator = lookup_replicator(state, replicator_id)?;
            Ok(Response::Status(replicator.status.clone()))
        }

        Request::AddReplicatorChangeListener {
            replicator_id,
            listener_id,
        } => {
            lookup_replicator(state, replicator_id)?
                .change_listeners
                .push(listener_id);
            Ok(Response::Ack)
        }

        Request::AddDocumentReplicationListener {
            replicator_id,
            listener_id,
        } => {
            lookup_replicator(state, replicator_id)?
                .document_listeners
                .push(listener_id);
            Ok(Response::Ack)
        }

        Request::ReplicatorIsDocumentPending {
            replicator_id,
            document_id,
        } => {
            lookup_replicator(state, replicator_id)?;
            Ok(Response::Bool(state.pending_ids.contains(&document_id)))
        }

        Request::ReplicatorPendingDocumentIds { replicator_id } => {
            lookup_replicator(state, replicator_id)?;
            Ok(Response::DocumentIds(state.pending_ids.clone()))
        }

        Request::RemoveChangeListener {
            target_id,
            listener_id,
        } => {
            if let Some(query) = state.queries.get_mut(&target_id) {
                query.listeners.retain(|l| *l != listener_id);
            }
            if let Some(replicator) = state.replicators.get_mut(&target_id) {
                replicator.change_listeners.retain(|l| *l != listener_id);
                replicator.document_listeners.retain(|l| *l != listener_id);
            }
            Ok(Response::Ack)
        }

        Request::ReleaseObject { object_id } => {
            state.queries.remove(&object_id);
            state.replicators.remove(&object_id);
            state.released.push(object_id);
            Ok(Response::Ack)
        }
    }
}

fn lookup_query(state: &mut State, id: ObjectId) -> ChannelResult<&mut FakeQuery> {
    state
        .queries
        .get_mut(&id)
        .ok_or_else(|| ChannelError::remote("NOT_FOUND", format!("no query {}", id)))
}

fn lookup_replicator(state: &mut State, id: ObjectId) -> ChannelResult<&mut FakeReplicator> {
    state
        .replicators
        .get_mut(&id)
        .ok_or_else(|| ChannelError::remote("NOT_FOUND", format!("no replicator {}", id)))
}

/// Every `$name` the definition references must be bound.
fn check_parameters(query: &FakeQuery) -> ChannelResult<()> {
    for name in referenced_parameters(&query.definition) {
        let bound = query
            .parameters
            .as_ref()
            .map_or(false, |p| p.value(&name).is_some());
        if !bound {
            return Err(ChannelError::remote(
                "MISSING_PARAMETER",
                format!("parameter ${} is not bound", name),
            ));
        }
    }
    Ok(())
}

fn referenced_parameters(definition: &str) -> Vec<String> {
    definition
        .split('$')
        .skip(1)
        .map(|rest| {
            rest.chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

fn select(documents: &[Value], parameters: Option<&Parameters>) -> Vec<Value> {
    documents
        .iter()
        .filter(|doc| {
            parameters.map_or(true, |params| {
                params
                    .as_map()
                    .iter()
                    .all(|(key, value)| doc.get(key) == Some(value))
            })
        })
        .cloned()
        .collect()
}
