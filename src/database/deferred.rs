use std::fmt;
use std::sync::Arc;

use super::DatabaseCore;
use crate::channel::{CallChannel, ObjectId, PropertiesFormat};
use crate::errors::ProxyResult;
use crate::query::{DeferredQuery, QueryCore, QueryLanguage};
use crate::replicator::{Replicator, ReplicatorConfiguration};
use crate::resource::Lifecycle;

/// Database whose operations are awaited
#[derive(Clone)]
pub struct DeferredDatabase {
    channel: Arc<dyn CallChannel>,
    core: Arc<DatabaseCore>,
}

impl DeferredDatabase {
    /// Open `name` with JSON document properties
    pub async fn open(channel: Arc<dyn CallChannel>, name: impl Into<String>) -> ProxyResult<Self> {
        Self::open_with_format(channel, name, PropertiesFormat::default()).await
    }

    pub async fn open_with_format(
        channel: Arc<dyn CallChannel>,
        name: impl Into<String>,
        properties_format: PropertiesFormat,
    ) -> ProxyResult<Self> {
        let name = name.into();
        let response = channel.call(DatabaseCore::open_request(&name)).await?;
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
    ) -> ProxyResult<DeferredQuery> {
        let core = QueryCore::new(
            &self.core.lifecycle,
            self.channel.clone(),
            self.core.database_id,
            language,
            definition,
        )?;
        Ok(DeferredQuery::new(core))
    }

    pub fn n1ql_query(&self, text: impl Into<String>) -> ProxyResult<DeferredQuery> {
        self.create_query(QueryLanguage::N1ql, text)
    }

    pub fn json_query(&self, json: impl Into<String>) -> ProxyResult<DeferredQuery> {
        self.create_query(QueryLanguage::Json, json)
    }

    /// Create a replication session on this database
    pub async fn create_replicator(
        &self,
        config: ReplicatorConfiguration,
    ) -> ProxyResult<Replicator> {
        Replicator::create(self, config).await
    }

    /// Close every query and replicator, then release the database
    pub async fn close(&self) -> ProxyResult<()> {
        self.core.lifecycle.close().await
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

    pub(crate) fn channel(&self) -> &Arc<dyn CallChannel> {
        &self.channel
    }

    pub(crate) fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.core.lifecycle
    }
}

impl fmt::Debug for DeferredDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}
