//! Replication callback marshaling
//!
//! User filters and conflict resolvers never cross the channel. They are
//! wrapped in adapters, registered locally, and the remote side calls them
//! back by id with wire-level document snapshots.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::types::DocumentFlags;
use crate::channel::{
    CallbackHandler, CallbackPayload, CallbackReply, ChannelError, ConflictResolution,
    DocumentState, EncodedDocument,
};
use crate::document::Document;

/// Push or pull filter; returning `false` skips the document
pub type ReplicationFilter = Arc<dyn Fn(&Document, DocumentFlags) -> bool + Send + Sync>;

/// Two conflicting revisions of one document
///
/// A missing side means that side deleted the document.
#[derive(Debug, Clone)]
pub struct Conflict {
    document_id: String,
    local: Option<Arc<Document>>,
    remote: Option<Arc<Document>>,
}

impl Conflict {
    pub fn new(
        document_id: impl Into<String>,
        local: Option<Arc<Document>>,
        remote: Option<Arc<Document>>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            local,
            remote,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn local(&self) -> Option<&Arc<Document>> {
        self.local.as_ref()
    }

    pub fn remote(&self) -> Option<&Arc<Document>> {
        self.remote.as_ref()
    }
}

/// Chooses the winning revision of a conflict
///
/// Return one of the supplied documents (the same `Arc`) to keep it as is,
/// a new document to store merged content, or `None` to resolve the
/// conflict as a deletion.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, conflict: &Conflict) -> Option<Arc<Document>>;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Conflict) -> Option<Arc<Document>> + Send + Sync,
{
    fn resolve(&self, conflict: &Conflict) -> Option<Arc<Document>> {
        self(conflict)
    }
}

/// Built-in resolution rule
///
/// A deletion on either side wins. Otherwise the higher revision generation
/// wins, then the greater revision id, then the remote side.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConflictResolver;

impl ConflictResolver for DefaultConflictResolver {
    fn resolve(&self, conflict: &Conflict) -> Option<Arc<Document>> {
        let (local, remote) = match (conflict.local(), conflict.remote()) {
            (Some(local), Some(remote)) => (local, remote),
            _ => return None,
        };

        let winner = match local.generation().cmp(&remote.generation()) {
            Ordering::Greater => local,
            Ordering::Less => remote,
            Ordering::Equal if local.revision_id() > remote.revision_id() => local,
            Ordering::Equal => remote,
        };
        Some(winner.clone())
    }
}

impl fmt::Debug for dyn ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConflictResolver")
    }
}

/// Wrap a filter so the remote side can call it
pub(crate) fn filter_adapter(filter: ReplicationFilter) -> CallbackHandler {
    Arc::new(move |payload| match payload {
        CallbackPayload::ReplicationFilter { document, flags } => {
            let document = Document::from_state(&document);
            Ok(CallbackReply::Filter(filter(&document, flags)))
        }
        other => Err(ChannelError::UnexpectedPayload(other.kind())),
    })
}

/// Wrap a conflict resolver so the remote side can call it
pub(crate) fn resolver_adapter(resolver: Arc<dyn ConflictResolver>) -> CallbackHandler {
    Arc::new(move |payload| match payload {
        CallbackPayload::ResolveConflict {
            document_id,
            local,
            remote,
        } => {
            let conflict = Conflict::new(
                document_id,
                local.as_ref().map(|s| Arc::new(Document::from_state(s))),
                remote.as_ref().map(|s| Arc::new(Document::from_state(s))),
            );
            let resolution =
                resolve_conflict(resolver.as_ref(), &conflict, local.as_ref(), remote.as_ref());
            Ok(CallbackReply::Resolution(resolution))
        }
        other => Err(ChannelError::UnexpectedPayload(other.kind())),
    })
}

fn resolve_conflict(
    resolver: &dyn ConflictResolver,
    conflict: &Conflict,
    local: Option<&DocumentState>,
    remote: Option<&DocumentState>,
) -> ConflictResolution {
    let winner = match resolver.resolve(conflict) {
        Some(winner) => winner,
        None => return ConflictResolution::Deleted,
    };

    // an unchanged side is referenced by snapshot, not re-encoded
    let sides = [(conflict.local(), local), (conflict.remote(), remote)];
    for (document, state) in sides {
        if let (Some(document), Some(state)) = (document, state) {
            if Arc::ptr_eq(document, &winner) {
                return ConflictResolution::Existing(state.snapshot_id);
            }
        }
    }

    ConflictResolution::Merged(EncodedDocument {
        id: conflict.document_id().to_string(),
        properties: winner.properties().clone(),
    })
}
