//! Document-store abstraction: MongoDB driver implementation and test mock.
//!
//! The core only needs four operations from the store: connect, list
//! collections, sample documents, and run an aggregation pipeline. All four
//! are fallible and reported through [`StoreError`] without further retries.
//! Rows cross this seam as [`serde_json::Value`] objects so the rest of the
//! crate stays driver-agnostic.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Document, doc};
use mongodb::{Client, Database};
use serde_json::Value;
use thiserror::Error;

/// Errors returned by document-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unreachable or the connection was rejected.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A read or aggregation was rejected by the store.
    #[error("query failed: {0}")]
    Query(String),

    /// A result document could not be converted to JSON.
    #[error("result decode failed: {0}")]
    Decode(String),
}

/// Read-only interface onto a document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List the collection names in the connected database.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Draw up to `limit` documents from a collection. No ordering guarantee
    /// beyond a best-effort representative sample.
    async fn sample(&self, collection: &str, limit: usize) -> Result<Vec<Value>, StoreError>;

    /// Run an aggregation pipeline and collect all result rows.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
    ) -> Result<Vec<Value>, StoreError>;
}

/// Production store backed by the MongoDB driver.
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect to MongoDB and verify the connection with a ping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connect`] if the URI is malformed, the server
    /// is unreachable, or authentication fails.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        let db = client.database(db_name);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        Ok(Self { db })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.db
            .list_collection_names()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn sample(&self, collection: &str, limit: usize) -> Result<Vec<Value>, StoreError> {
        let coll = self.db.collection::<Document>(collection);
        let cursor = coll
            .find(doc! {})
            .limit(limit as i64)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        docs.iter().map(document_to_value).collect()
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
    ) -> Result<Vec<Value>, StoreError> {
        let stages: Vec<Document> = pipeline
            .iter()
            .map(|stage| bson::to_document(stage).map_err(|e| StoreError::Decode(e.to_string())))
            .collect::<Result<_, _>>()?;

        let coll = self.db.collection::<Document>(collection);
        let cursor = coll
            .aggregate(stages)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        docs.iter().map(document_to_value).collect()
    }
}

/// Convert a BSON document into a JSON value via serde.
fn document_to_value(doc: &Document) -> Result<Value, StoreError> {
    serde_json::to_value(doc).map_err(|e| StoreError::Decode(e.to_string()))
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// In-memory store double. Returns canned rows and records every pipeline
/// passed to [`DocumentStore::aggregate`].
#[cfg(test)]
pub struct MockStore {
    pub collections: Vec<String>,
    pub sample_rows: Vec<Value>,
    pub aggregate_rows: Vec<Value>,
    pub fail_aggregate: bool,
    pub executed: std::sync::Mutex<Vec<Vec<Value>>>,
}

#[cfg(test)]
impl MockStore {
    pub fn new(sample_rows: Vec<Value>, aggregate_rows: Vec<Value>) -> Self {
        Self {
            collections: vec!["orders".to_string()],
            sample_rows,
            aggregate_rows,
            fail_aggregate: false,
            executed: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DocumentStore for MockStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.clone())
    }

    async fn sample(&self, _collection: &str, limit: usize) -> Result<Vec<Value>, StoreError> {
        Ok(self.sample_rows.iter().take(limit).cloned().collect())
    }

    async fn aggregate(
        &self,
        _collection: &str,
        pipeline: &[Value],
    ) -> Result<Vec<Value>, StoreError> {
        self.executed.lock().unwrap().push(pipeline.to_vec());
        if self.fail_aggregate {
            return Err(StoreError::Query("aggregation rejected".to_string()));
        }
        Ok(self.aggregate_rows.clone())
    }
}
