use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::store::model::ConnectionTarget;

/// Capabilities the application needs from a document database.
///
/// Storage and query behavior belong to the backing service; implementors
/// only hold the session and hand out collection references.
#[async_trait]
pub trait DocumentStore {
    /// Build a session to `target` and select its database.
    async fn connect(target: &ConnectionTarget) -> Result<Self>
    where
        Self: Sized;

    fn database_name(&self) -> &str;

    /// Liveness check. Fails with `AppError::ConnectivityError`.
    async fn ping(&self) -> Result<()>;

    /// Never fails: collections are created by the store on first write.
    fn get_collection(&self, name: &str) -> CollectionHandle;
}

#[async_trait]
pub trait DocumentCollection {
    fn name(&self) -> &str;

    async fn find_one(&self, filter: Value) -> Result<Option<Value>>;
}

pub type CollectionHandle = Arc<dyn DocumentCollection + Send + Sync>;
