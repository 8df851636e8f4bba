//! Replication value types shared with the call channel

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::ObjectId;

/// Direction of replication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplicatorType {
    #[default]
    PushAndPull,
    Push,
    Pull,
}

impl ReplicatorType {
    pub fn is_push(&self) -> bool {
        matches!(self, Self::PushAndPull | Self::Push)
    }

    pub fn is_pull(&self) -> bool {
        matches!(self, Self::PushAndPull | Self::Pull)
    }
}

/// Where a replicator sends and receives changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Endpoint {
    /// Remote sync gateway, `ws://` or `wss://`
    Url(String),
    /// Another database in the same remote execution context
    Database(ObjectId),
}

/// Credentials presented to a remote endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Authenticator {
    Basic {
        username: String,
        password: String,
    },
    Session {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cookie_name: Option<String>,
    },
}

impl Authenticator {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self::Session {
            session_id: session_id.into(),
            cookie_name: None,
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Session { cookie_name, .. } => f
                .debug_struct("Session")
                .field("session_id", &"<redacted>")
                .field("cookie_name", cookie_name)
                .finish(),
        }
    }
}

/// Coarse replicator activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplicatorActivityLevel {
    Stopped,
    Offline,
    Connecting,
    Idle,
    Busy,
}

impl ReplicatorActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Offline => "offline",
            Self::Connecting => "connecting",
            Self::Idle => "idle",
            Self::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatorProgress {
    /// Changes transferred so far
    pub completed: u64,
    /// Fraction complete, 0.0 to 1.0
    pub progress: f64,
}

/// Point-in-time replicator state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatorStatus {
    pub activity: ReplicatorActivityLevel,
    pub progress: ReplicatorProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplicatorStatus {
    pub fn stopped() -> Self {
        Self {
            activity: ReplicatorActivityLevel::Stopped,
            progress: ReplicatorProgress::default(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFlags {
    pub deleted: bool,
    pub access_removed: bool,
}

/// Outcome of replicating one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedDocument {
    pub id: String,
    pub flags: DocumentFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status transition delivered to change listeners
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatorChange {
    pub status: ReplicatorStatus,
}

/// Batch of per-document outcomes delivered to document listeners
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReplication {
    pub is_push: bool,
    pub documents: Vec<ReplicatedDocument>,
}
