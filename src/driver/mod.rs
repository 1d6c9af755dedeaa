//! Driver seam
//!
//! The connection handle and the repositories talk to a document store only
//! through these traits. The wire protocol lives behind them; the crate ships
//! an in-memory implementation in [`crate::storage`].

use crate::connection::ConnectionConfig;
use crate::core::{Document, ObjectId, Result, StoreError};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens clients for a parsed connection string.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Client>>;
}

/// A live connection to a store.
#[async_trait]
pub trait Client: Send + Sync {
    /// Handle scoped to the named database. Does not touch the store.
    fn database(&self, name: &str) -> Arc<dyn Database>;

    /// Release the connection. Operations through handles derived from this
    /// client fail with [`crate::StoreError::Closed`] afterwards.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// Strict lookup: fails with `CollectionNotFound` when absent.
    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>>;

    /// Fails with `CollectionExists` when a collection of that name is present.
    async fn create_collection(&self, name: &str) -> Result<Arc<dyn Collection>>;

    async fn list_collection_names(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Insert a document, generating `_id` when absent. Returns the stored `_id`.
    async fn insert_one(&self, document: Document) -> Result<ObjectId>;

    /// Apply an update document (`$set`, `$unset`) to the first match.
    async fn update_one(
        &self,
        filter: &Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome>;

    /// All matches in store order, after `skip` and `limit`.
    async fn find(&self, filter: &Document, options: FindOptions) -> Result<Vec<Document>>;

    async fn count_documents(&self, filter: &Document) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            skip: None,
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<ObjectId>,
}

/// Longest collection name accepted, in bytes.
pub const MAX_COLLECTION_NAME_LEN: usize = 120;

/// Reject names a document store would refuse.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidCollectionName(
            "Collection name cannot be empty".to_string(),
        ));
    }

    if name.contains('$') || name.contains('\0') {
        return Err(StoreError::InvalidCollectionName(format!(
            "'{}' contains a reserved character",
            name
        )));
    }

    if name.starts_with("system.") {
        return Err(StoreError::InvalidCollectionName(format!(
            "'{}' uses the reserved 'system.' prefix",
            name
        )));
    }

    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(StoreError::InvalidCollectionName(format!(
            "Collection name too long (max {} bytes)",
            MAX_COLLECTION_NAME_LEN
        )));
    }

    Ok(())
}
