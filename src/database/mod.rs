//! # Database Handle
//!
//! Root resource for queries and replicators. Closing a database closes
//! everything attached to it, then releases the remote database object.
//!
//! The personality is picked when the database is opened:
//!
//! - [`BlockingDatabase`] runs over a [`DirectChannel`](crate::channel::DirectChannel),
//!   every call completes before it returns
//! - [`DeferredDatabase`] runs over any [`CallChannel`], every call is awaited
//!
//! [`Database`] is the closed set of both.

mod blocking;
mod deferred;

use std::fmt;
use std::sync::Arc;

pub use blocking::BlockingDatabase;
pub use deferred::DeferredDatabase;

use crate::channel::{CallChannel, ObjectId, PropertiesFormat, Request, Response};
use crate::errors::{ProxyError, ProxyResult};
use crate::observability::{log_event_with_fields, Event};
use crate::query::{Query, QueryLanguage};
use crate::resource::Lifecycle;

/// State shared by both personalities
pub(crate) struct DatabaseCore {
    name: String,
    database_id: ObjectId,
    properties_format: PropertiesFormat,
    lifecycle: Arc<Lifecycle>,
}

impl DatabaseCore {
    /// Wrap a database the remote side has already opened
    pub(crate) fn new(
        channel: Arc<dyn CallChannel>,
        name: String,
        database_id: ObjectId,
        properties_format: PropertiesFormat,
    ) -> ProxyResult<Self> {
        let lifecycle = Lifecycle::root("Database");
        lifecycle.set_finalizer(Box::new(move || {
            Box::pin(async move {
                channel
                    .call(Request::ReleaseObject {
                        object_id: database_id,
                    })
                    .await
                    .and_then(Response::into_ack)
                    .map_err(ProxyError::from)
            })
        }))?;

        log_event_with_fields(
            Event::DatabaseOpened,
            &[("database_id", &database_id.to_string()), ("name", &name)],
        );

        Ok(Self {
            name,
            database_id,
            properties_format,
            lifecycle,
        })
    }

    pub(crate) fn open_request(name: &str) -> Request {
        Request::OpenDatabase {
            name: name.to_string(),
        }
    }

    pub(crate) fn opened(response: Response) -> ProxyResult<ObjectId> {
        Ok(response.into_object_id()?)
    }
}

impl fmt::Debug for DatabaseCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("database_id", &self.database_id)
            .field("properties_format", &self.properties_format)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// A database in either personality
#[derive(Debug, Clone)]
pub enum Database {
    Blocking(BlockingDatabase),
    Deferred(DeferredDatabase),
}

impl Database {
    /// Create a query in this database's personality
    pub fn create_query(
        &self,
        language: QueryLanguage,
        definition: impl Into<String>,
    ) -> ProxyResult<Query> {
        match self {
            Self::Blocking(db) => db.create_query(language, definition).map(Query::from),
            Self::Deferred(db) => db.create_query(language, definition).map(Query::from),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Blocking(db) => db.name(),
            Self::Deferred(db) => db.name(),
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            Self::Blocking(db) => db.id(),
            Self::Deferred(db) => db.id(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Blocking(db) => db.is_closed(),
            Self::Deferred(db) => db.is_closed(),
        }
    }
}

impl From<BlockingDatabase> for Database {
    fn from(db: BlockingDatabase) -> Self {
        Self::Blocking(db)
    }
}

impl From<DeferredDatabase> for Database {
    fn from(db: DeferredDatabase) -> Self {
        Self::Deferred(db)
    }
}
