//! Replicator Configuration
//!
//! Immutable value object describing one replication session. A replicator
//! keeps its own copy; callers only ever get clones back, so changing a
//! configuration never affects a running session.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::callbacks::{ConflictResolver, ReplicationFilter};
use super::types::{Authenticator, DocumentFlags, Endpoint, ReplicatorType};
use crate::channel::{CallbackId, CreateReplicatorRequest, ObjectId, PropertiesFormat};
use crate::document::Document;
use crate::errors::{ProxyError, ProxyResult};

/// Replication session configuration
#[derive(Clone)]
pub struct ReplicatorConfiguration {
    /// Remote endpoint
    pub target: Endpoint,

    /// Push, pull or both
    pub replicator_type: ReplicatorType,

    /// Keep running and replicate changes as they happen
    pub continuous: bool,

    pub authenticator: Option<Authenticator>,

    /// DER certificate the server must present
    pub pinned_server_certificate: Option<Vec<u8>>,

    /// Extra HTTP headers sent with the connection request
    pub headers: BTreeMap<String, String>,

    /// Sync gateway channels to pull from
    pub channels: Option<Vec<String>>,

    /// Restrict replication to these document ids
    pub document_ids: Option<Vec<String>>,

    pub push_filter: Option<ReplicationFilter>,

    pub pull_filter: Option<ReplicationFilter>,

    pub conflict_resolver: Option<Arc<dyn ConflictResolver>>,

    /// Purge documents when access to them is revoked
    pub enable_auto_purge: bool,

    /// Keep-alive interval; engine default when `None`
    pub heartbeat: Option<Duration>,

    /// Retry attempts before giving up; engine default when `None`
    pub max_attempts: Option<u32>,

    /// Upper bound of the retry backoff; engine default when `None`
    pub max_attempt_wait_time: Option<Duration>,
}

impl ReplicatorConfiguration {
    /// Create a push-and-pull, one-shot configuration for `target`
    pub fn new(target: Endpoint) -> Self {
        Self {
            target,
            replicator_type: ReplicatorType::default(),
            continuous: false,
            authenticator: None,
            pinned_server_certificate: None,
            headers: BTreeMap::new(),
            channels: None,
            document_ids: None,
            push_filter: None,
            pull_filter: None,
            conflict_resolver: None,
            enable_auto_purge: true,
            heartbeat: None,
            max_attempts: None,
            max_attempt_wait_time: None,
        }
    }

    /// Configuration targeting a sync gateway URL
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(Endpoint::Url(url.into()))
    }

    /// Configuration targeting another database
    pub fn database(database_id: ObjectId) -> Self {
        Self::new(Endpoint::Database(database_id))
    }

    pub fn with_replicator_type(mut self, replicator_type: ReplicatorType) -> Self {
        self.replicator_type = replicator_type;
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_pinned_server_certificate(mut self, certificate: Vec<u8>) -> Self {
        self.pinned_server_certificate = Some(certificate);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_document_ids(mut self, document_ids: Vec<String>) -> Self {
        self.document_ids = Some(document_ids);
        self
    }

    pub fn with_push_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Document, DocumentFlags) -> bool + Send + Sync + 'static,
    {
        self.push_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_pull_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Document, DocumentFlags) -> bool + Send + Sync + 'static,
    {
        self.pull_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_conflict_resolver<R>(mut self, resolver: R) -> Self
    where
        R: ConflictResolver + 'static,
    {
        self.conflict_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_auto_purge(mut self, enabled: bool) -> Self {
        self.enable_auto_purge = enabled;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_max_attempt_wait_time(mut self, wait: Duration) -> Self {
        self.max_attempt_wait_time = Some(wait);
        self
    }

    /// Validate the configuration.
    ///
    /// - URL targets must use `ws://` or `wss://` and name a host
    /// - Heartbeat and retry wait must be at least one second
    /// - Channel, document id and header names must not be empty
    pub fn validate(&self) -> ProxyResult<()> {
        if let Endpoint::Url(target) = &self.target {
            let parsed = url::Url::parse(target).map_err(|e| {
                ProxyError::InvalidConfiguration(format!("invalid target URL {}: {}", target, e))
            })?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ProxyError::InvalidConfiguration(format!(
                    "target URL must use ws:// or wss://, got {}",
                    target
                )));
            }
            if parsed.host_str().map_or(true, str::is_empty) {
                return Err(ProxyError::InvalidConfiguration(format!(
                    "target URL has no host: {}",
                    target
                )));
            }
        }

        if matches!(self.heartbeat, Some(d) if d.as_secs() == 0) {
            return Err(ProxyError::InvalidConfiguration(
                "heartbeat must be at least one second".into(),
            ));
        }
        if matches!(self.max_attempt_wait_time, Some(d) if d.as_secs() == 0) {
            return Err(ProxyError::InvalidConfiguration(
                "max attempt wait time must be at least one second".into(),
            ));
        }

        if has_empty(self.channels.as_deref()) {
            return Err(ProxyError::InvalidConfiguration(
                "channel names must not be empty".into(),
            ));
        }
        if has_empty(self.document_ids.as_deref()) {
            return Err(ProxyError::InvalidConfiguration(
                "document ids must not be empty".into(),
            ));
        }
        if self.headers.keys().any(|name| name.trim().is_empty()) {
            return Err(ProxyError::InvalidConfiguration(
                "header names must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Build the create request with the ids of the registered adapters
    pub(crate) fn to_request(
        &self,
        database_id: ObjectId,
        properties_format: PropertiesFormat,
        push_filter_id: Option<CallbackId>,
        pull_filter_id: Option<CallbackId>,
        conflict_resolver_id: Option<CallbackId>,
    ) -> CreateReplicatorRequest {
        CreateReplicatorRequest {
            database_id,
            properties_format,
            target: self.target.clone(),
            replicator_type: self.replicator_type,
            continuous: self.continuous,
            authenticator: self.authenticator.clone(),
            pinned_server_certificate: self.pinned_server_certificate.clone(),
            headers: if self.headers.is_empty() {
                None
            } else {
                Some(self.headers.clone())
            },
            channels: self.channels.clone(),
            document_ids: self.document_ids.clone(),
            push_filter_id,
            pull_filter_id,
            conflict_resolver_id,
            enable_auto_purge: self.enable_auto_purge,
            heartbeat_secs: self.heartbeat.map(|d| d.as_secs()),
            max_attempts: self.max_attempts,
            max_attempt_wait_time_secs: self.max_attempt_wait_time.map(|d| d.as_secs()),
        }
    }
}

fn has_empty(values: Option<&[String]>) -> bool {
    values.map_or(false, |values| values.iter().any(|v| v.is_empty()))
}

impl fmt::Debug for ReplicatorConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatorConfiguration")
            .field("target", &self.target)
            .field("replicator_type", &self.replicator_type)
            .field("continuous", &self.continuous)
            .field("authenticator", &self.authenticator)
            .field(
                "pinned_server_certificate",
                &self.pinned_server_certificate.as_ref().map(Vec::len),
            )
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("channels", &self.channels)
            .field("document_ids", &self.document_ids)
            .field("push_filter", &self.push_filter.is_some())
            .field("pull_filter", &self.pull_filter.is_some())
            .field("conflict_resolver", &self.conflict_resolver.is_some())
            .field("enable_auto_purge", &self.enable_auto_purge)
            .field("heartbeat", &self.heartbeat)
            .field("max_attempts", &self.max_attempts)
            .field("max_attempt_wait_time", &self.max_attempt_wait_time)
            .finish()
    }
}
