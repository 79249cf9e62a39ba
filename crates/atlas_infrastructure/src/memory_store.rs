use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use atlas_interface::errors::{AppError, Result};
use atlas_interface::store::model::ConnectionTarget;
use atlas_interface::store::service::{CollectionHandle, DocumentCollection, DocumentStore};

type Collections = Arc<Mutex<HashMap<String, Vec<Value>>>>;

/// Process-local stand-in for the document database.
///
/// Lets code written against [`DocumentStore`] run without a network
/// endpoint. `set_reachable(false)` makes `ping` fail the way an unreachable
/// server would.
pub struct InMemoryStore {
    database_name: String,
    collections: Collections,
    reachable: AtomicBool,
}

impl InMemoryStore {
    pub fn new(database_name: &str) -> Self {
        Self {
            database_name: database_name.to_string(),
            collections: Arc::default(),
            reachable: AtomicBool::new(true),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn insert(&self, collection: &str, document: Value) {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn connect(target: &ConnectionTarget) -> Result<Self> {
        if target.uri.is_empty() {
            return Err(AppError::ConnectionError {
                msg: "empty connection uri".to_string(),
            });
        }

        Ok(Self::new(&target.database_name))
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    async fn ping(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::ConnectivityError {
                msg: format!("database '{}' is unreachable", self.database_name),
            })
        }
    }

    fn get_collection(&self, name: &str) -> CollectionHandle {
        Arc::new(InMemoryCollection {
            name: name.to_string(),
            collections: self.collections.clone(),
        })
    }
}

pub struct InMemoryCollection {
    name: String,
    collections: Collections,
}

// A document matches when every top-level field of the filter is equal.
fn filter_matches(document: &Value, filter: &Value) -> bool {
    match filter {
        Value::Null => true,
        Value::Object(fields) => fields
            .iter()
            .all(|(key, expected)| document.get(key) == Some(expected)),
        _ => false,
    }
}

#[async_trait]
impl DocumentCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, filter: Value) -> Result<Option<Value>> {
        if !matches!(filter, Value::Null | Value::Object(_)) {
            return Err(AppError::BsonError {
                msg: format!("filter must be a document, got {}", filter),
            });
        }

        let collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        Ok(collections
            .get(&self.name)
            .and_then(|documents| documents.iter().find(|d| filter_matches(d, &filter)))
            .cloned())
    }
}
