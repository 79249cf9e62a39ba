use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::debug;

use atlas_interface::errors::{AppError, Result};
use atlas_interface::store::model::ConnectionTarget;
use atlas_interface::store::service::{CollectionHandle, DocumentCollection, DocumentStore};

use crate::command_logger::CommandLogger;

/// Session to a MongoDB deployment (Atlas or self-hosted) with one selected
/// database.
///
/// Connecting is lazy: the driver opens sockets on first use, so an
/// unreachable endpoint is only reported by [`DocumentStore::ping`] or the
/// first query. A malformed uri is rejected by `connect` itself.
pub struct AtlasClient {
    client: Client,
    database: Database,
    timeout: Duration,
}

#[async_trait]
impl DocumentStore for AtlasClient {
    async fn connect(target: &ConnectionTarget) -> Result<Self> {
        let mut options = ClientOptions::parse(target.uri.as_str())
            .await
            .map_err(|e| AppError::ConnectionError { msg: e.to_string() })?;

        options.server_selection_timeout = Some(target.timeout);
        options.connect_timeout = Some(target.timeout);
        options.command_event_handler = Some(Arc::new(CommandLogger));

        let client = Client::with_options(options)
            .map_err(|e| AppError::ConnectionError { msg: e.to_string() })?;
        let database = client.database(&target.database_name);

        debug!(
            "client created for database '{}' (timeout {:?})",
            target.database_name, target.timeout
        );

        Ok(Self {
            client,
            database,
            timeout: target.timeout,
        })
    }

    fn database_name(&self) -> &str {
        self.database.name()
    }

    async fn ping(&self) -> Result<()> {
        let admin = self.client.database("admin");
        let command = admin.run_command(doc! {"ping": 1}, None);

        match tokio::time::timeout(self.timeout, command).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::ConnectivityError { msg: e.to_string() }),
            Err(_) => Err(AppError::ConnectivityError {
                msg: format!("no reply to ping within {:?}", self.timeout),
            }),
        }
    }

    fn get_collection(&self, name: &str) -> CollectionHandle {
        Arc::new(AtlasCollection {
            collection: self.database.collection::<Document>(name),
        })
    }
}

pub struct AtlasCollection {
    collection: Collection<Document>,
}

#[async_trait]
impl DocumentCollection for AtlasCollection {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn find_one(&self, filter: Value) -> Result<Option<Value>> {
        let filter = match filter {
            Value::Null => None,
            filter => Some(
                bson::to_document(&filter)
                    .map_err(|e| AppError::BsonError { msg: e.to_string() })?,
            ),
        };

        let document = self
            .collection
            .find_one(filter, None)
            .await
            .map_err(|e| AppError::MongoError { msg: e.to_string() })?;

        Ok(document.map(|d| Bson::Document(d).into_relaxed_extjson()))
    }
}
