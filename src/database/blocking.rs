use std::sync::Arc;

use super::DatabaseCore;
use crate::channel::{CallChannel, DirectChannel, ObjectId, PropertiesFormat};
use crate::errors::ProxyResult;
use crate::query::{BlockingQuery, QueryCore, QueryLanguage};

/// Database whose handles never suspend
///
/// Only a [`DirectChannel`] can back it, which is what guarantees every
/// operation is answered before the call returns.
#[derive(Debug, Clone)]
pub struct BlockingDatabase {
    channel: Arc<DirectChannel>,
    core: Arc<DatabaseCore>,
}

impl BlockingDatabase {
    /// Open `name` with JSON document properties
    pub fn open(channel: Arc<DirectChannel>, name: impl Into<String>) -> ProxyResult<Self> {
        Self::open_with_format(channel, name, PropertiesFormat::default())
    }

    pub fn open_with_format(
        channel: Arc<DirectChannel>,
        name: impl Into<String>,
        properties_format: PropertiesFormat,
    ) -> ProxyResult<Self> {
        let name = name.into();
        let response = channel.call_blocking(DatabaseCore::open_request(&name))?;
        let database_id = DatabaseCore::opened(response)?;

        let core = DatabaseCore::new(channel.clone(), name, database_id, properties_format)?;
        Ok(Self {
            channel,
            core: Arc::new(core),
        })
    }

    /// Build a query; nothing is compiled until it is first used
    pub fn create_query(
        &self,
        language: QueryLanguage,
        definition: impl Into<String>,
    ) -> ProxyResult<BlockingQuery> {
        let channel: Arc<dyn CallChannel> = self.channel.clone();
        let core = QueryCore::new(
            &self.core.lifecycle,
            channel,
            self.core.database_id,
            language,
            definition,
        )?;
        Ok(BlockingQuery::new(core))
    }

    pub fn n1ql_query(&self, text: impl Into<String>) -> ProxyResult<BlockingQuery> {
        self.create_query(QueryLanguage::N1ql, text)
    }

    pub fn json_query(&self, json: impl Into<String>) -> ProxyResult<BlockingQuery> {
        self.create_query(QueryLanguage::Json, json)
    }

    /// Close every query, then release the database
    pub fn close(&self) -> ProxyResult<()> {
        self.core.lifecycle.close_blocking()
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn id(&self) -> ObjectId {
        self.core.database_id
    }

    pub fn properties_format(&self) -> PropertiesFormat {
        self.core.properties_format
    }

    pub fn is_closed(&self) -> bool {
        self.core.lifecycle.is_closed()
    }
}
