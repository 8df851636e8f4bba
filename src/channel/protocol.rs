//! Call Channel Message Types
//!
//! Requests travel local → remote and are answered with exactly one
//! [`Response`]. Callback payloads travel remote → local, addressed by the
//! [`CallbackId`] the local side handed out at registration time.
//!
//! Every message derives serde so a cross-process transport can carry it as
//! tagged JSON; the in-process transports pass the values through untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{ChannelError, ChannelResult};
use crate::query::{Parameters, QueryLanguage};
use crate::replicator::{
    Authenticator, DocumentFlags, Endpoint, ReplicatedDocument, ReplicatorStatus, ReplicatorType,
};

/// Identifier of an object living in the remote execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an adapter in the local callback registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a document revision snapshot held by the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub u64);

/// Encoding the remote side uses for document properties
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertiesFormat {
    /// JSON text
    #[default]
    Json,
    /// Engine-native binary encoding
    Binary,
}

/// Full configuration of a replicator as sent to the remote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReplicatorRequest {
    pub database_id: ObjectId,
    pub properties_format: PropertiesFormat,
    pub target: Endpoint,
    pub replicator_type: ReplicatorType,
    pub continuous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator: Option<Authenticator>,
    #[serde(default, with = "certificate_base64", skip_serializing_if = "Option::is_none")]
    pub pinned_server_certificate: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_filter_id: Option<CallbackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_filter_id: Option<CallbackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolver_id: Option<CallbackId>,
    pub enable_auto_purge: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempt_wait_time_secs: Option<u64>,
}

/// Request from the local side to the remote execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Request {
    OpenDatabase {
        name: String,
    },
    CreateQuery {
        database_id: ObjectId,
        language: QueryLanguage,
        definition: String,
    },
    SetQueryParameters {
        query_id: ObjectId,
        parameters: Option<Parameters>,
    },
    ExecuteQuery {
        query_id: ObjectId,
    },
    ExplainQuery {
        query_id: ObjectId,
    },
    /// Emits the current result set immediately, then one event per change
    AddQueryChangeListener {
        query_id: ObjectId,
        listener_id: CallbackId,
    },
    CreateReplicator(CreateReplicatorRequest),
    StartReplicator {
        replicator_id: ObjectId,
        reset: bool,
    },
    StopReplicator {
        replicator_id: ObjectId,
    },
    GetReplicatorStatus {
        replicator_id: ObjectId,
    },
    AddReplicatorChangeListener {
        replicator_id: ObjectId,
        listener_id: CallbackId,
    },
    AddDocumentReplicationListener {
        replicator_id: ObjectId,
        listener_id: CallbackId,
    },
    ReplicatorIsDocumentPending {
        replicator_id: ObjectId,
        document_id: String,
    },
    ReplicatorPendingDocumentIds {
        replicator_id: ObjectId,
    },
    RemoveChangeListener {
        target_id: ObjectId,
        listener_id: CallbackId,
    },
    ReleaseObject {
        object_id: ObjectId,
    },
}

impl Request {
    /// Message name for logs and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenDatabase { .. } => "OpenDatabase",
            Self::CreateQuery { .. } => "CreateQuery",
            Self::SetQueryParameters { .. } => "SetQueryParameters",
            Self::ExecuteQuery { .. } => "ExecuteQuery",
            Self::ExplainQuery { .. } => "ExplainQuery",
            Self::AddQueryChangeListener { .. } => "AddQueryChangeListener",
            Self::CreateReplicator(_) => "CreateReplicator",
            Self::StartReplicator { .. } => "StartReplicator",
            Self::StopReplicator { .. } => "StopReplicator",
            Self::GetReplicatorStatus { .. } => "GetReplicatorStatus",
            Self::AddReplicatorChangeListener { .. } => "AddReplicatorChangeListener",
            Self::AddDocumentReplicationListener { .. } => "AddDocumentReplicationListener",
            Self::ReplicatorIsDocumentPending { .. } => "ReplicatorIsDocumentPending",
            Self::ReplicatorPendingDocumentIds { .. } => "ReplicatorPendingDocumentIds",
            Self::RemoveChangeListener { .. } => "RemoveChangeListener",
            Self::ReleaseObject { .. } => "ReleaseObject",
        }
    }
}

/// Response from the remote execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Response {
    Ack,
    ObjectId(ObjectId),
    Rows(Vec<Value>),
    Text(String),
    Status(ReplicatorStatus),
    Bool(bool),
    DocumentIds(Vec<String>),
}

impl Response {
    /// Response kind for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ack => "Ack",
            Self::ObjectId(_) => "ObjectId",
            Self::Rows(_) => "Rows",
            Self::Text(_) => "Text",
            Self::Status(_) => "Status",
            Self::Bool(_) => "Bool",
            Self::DocumentIds(_) => "DocumentIds",
        }
    }

    fn unexpected(self, expected: &'static str) -> ChannelError {
        ChannelError::UnexpectedResponse {
            expected,
            actual: self.kind(),
        }
    }

    pub fn into_ack(self) -> ChannelResult<()> {
        match self {
            Self::Ack => Ok(()),
            other => Err(other.unexpected("Ack")),
        }
    }

    pub fn into_object_id(self) -> ChannelResult<ObjectId> {
        match self {
            Self::ObjectId(id) => Ok(id),
            other => Err(other.unexpected("ObjectId")),
        }
    }

    pub fn into_rows(self) -> ChannelResult<Vec<Value>> {
        match self {
            Self::Rows(rows) => Ok(rows),
            other => Err(other.unexpected("Rows")),
        }
    }

    pub fn into_text(self) -> ChannelResult<String> {
        match self {
            Self::Text(text) => Ok(text),
            other => Err(other.unexpected("Text")),
        }
    }

    pub fn into_status(self) -> ChannelResult<ReplicatorStatus> {
        match self {
            Self::Status(status) => Ok(status),
            other => Err(other.unexpected("Status")),
        }
    }

    pub fn into_bool(self) -> ChannelResult<bool> {
        match self {
            Self::Bool(value) => Ok(value),
            other => Err(other.unexpected("Bool")),
        }
    }

    pub fn into_document_ids(self) -> ChannelResult<Vec<String>> {
        match self {
            Self::DocumentIds(ids) => Ok(ids),
            other => Err(other.unexpected("DocumentIds")),
        }
    }
}

/// Wire-level snapshot of one document revision held by the remote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    pub snapshot_id: SnapshotId,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
    pub sequence: u64,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Freshly encoded document state with no remote snapshot behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedDocument {
    pub id: String,
    pub properties: Map<String, Value>,
}

/// Outcome of a conflict resolution, as reported back to the remote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ConflictResolution {
    /// One of the supplied snapshots won unchanged
    Existing(SnapshotId),
    /// The resolver produced new content
    Merged(EncodedDocument),
    /// The conflict resolves as a deletion
    Deleted,
}

/// Payload the remote side pushes to a local adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum CallbackPayload {
    QueryChange {
        rows: Vec<Value>,
    },
    ReplicatorChange {
        status: ReplicatorStatus,
    },
    DocumentReplication {
        is_push: bool,
        documents: Vec<ReplicatedDocument>,
    },
    ReplicationFilter {
        document: DocumentState,
        flags: DocumentFlags,
    },
    ResolveConflict {
        document_id: String,
        local: Option<DocumentState>,
        remote: Option<DocumentState>,
    },
}

impl CallbackPayload {
    /// Payload kind for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueryChange { .. } => "QueryChange",
            Self::ReplicatorChange { .. } => "ReplicatorChange",
            Self::DocumentReplication { .. } => "DocumentReplication",
            Self::ReplicationFilter { .. } => "ReplicationFilter",
            Self::ResolveConflict { .. } => "ResolveConflict",
        }
    }
}

/// Reply a local adapter returns to the remote side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CallbackReply {
    Ack,
    Filter(bool),
    Resolution(ConflictResolution),
}

mod certificate_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_create_request() -> CreateReplicatorRequest {
        CreateReplicatorRequest {
            database_id: ObjectId(1),
            properties_format: PropertiesFormat::Json,
            target: Endpoint::Url("wss://sync.example.com/db".to_string()),
            replicator_type: ReplicatorType::PushAndPull,
            continuous: true,
            authenticator: None,
            pinned_server_certificate: Some(vec![0xde, 0xad, 0xbe, 0xef]),
            headers: None,
            channels: Some(vec!["public".to_string()]),
            document_ids: None,
            push_filter_id: Some(CallbackId(4)),
            pull_filter_id: None,
            conflict_resolver_id: None,
            enable_auto_purge: true,
            heartbeat_secs: Some(300),
            max_attempts: None,
            max_attempt_wait_time_secs: None,
        }
    }

    #[test]
    fn test_request_is_tagged() {
        let request = Request::ExecuteQuery {
            query_id: ObjectId(9),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded, json!({"type": "ExecuteQuery", "queryId": 9}));
    }

    #[test]
    fn test_pinned_certificate_is_base64_on_the_wire() {
        let request = Request::CreateReplicator(sample_create_request());
        let encoded = serde_json::to_value(&request).unwrap();

        assert_eq!(encoded["type"], "CreateReplicator");
        assert_eq!(encoded["pinnedServerCertificate"], "3q2+7w==");
        assert_eq!(encoded["pushFilterId"], 4);
        assert!(encoded.get("pullFilterId").is_none());

        let decoded: Request = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_response_conversions() {
        assert_eq!(Response::Ack.into_ack(), Ok(()));
        assert_eq!(Response::Bool(true).into_bool(), Ok(true));
        assert_eq!(
            Response::ObjectId(ObjectId(5)).into_object_id(),
            Ok(ObjectId(5))
        );
    }

    #[test]
    fn test_response_shape_mismatch() {
        let err = Response::Text("plan".into()).into_rows().unwrap_err();
        assert_eq!(
            err,
            ChannelError::UnexpectedResponse {
                expected: "Rows",
                actual: "Text"
            }
        );
    }

    #[test]
    fn test_conflict_resolution_wire_form() {
        let reply = CallbackReply::Resolution(ConflictResolution::Existing(SnapshotId(12)));
        let encoded = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            encoded,
            json!({"type": "Resolution", "value": {"type": "Existing", "value": 12}})
        );
    }
}
