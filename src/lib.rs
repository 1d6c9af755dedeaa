// ============================================================================
// docrepo Library
// ============================================================================

pub mod core;
pub mod connection;
pub mod driver;
pub mod storage;
pub mod repository;
pub mod prelude;

// Re-export main types for convenience
pub use self::core::{Bson, Document, ObjectId, Result, StoreError, into_document};

// The document model, for `doc!` and the extended JSON helpers
pub use bson;

// Re-export connection API
pub use connection::{
    ClientPromise,
    ConnectionHandle,
    config::ConnectionConfig,
    deferred::{Deferred, Promise},
};

// Re-export repository API
pub use repository::{
    BsonCodec,
    CollectionBinding,
    DocumentRepository,
    Entity,
    EntityCodec,
    Repository,
};

// Re-export the in-memory store
pub use storage::{MemoryConnector, MemoryServer};

// ============================================================================
// Quick start
// ============================================================================

/// Connect a handle to a fresh in-memory store
///
/// Convenience for tests and embedded use; production code builds a
/// [`ConnectionHandle`] around its own [`driver::Connector`].
///
/// # Examples
///
/// ```
/// use docrepo::bson::doc;
/// use docrepo::{DocumentRepository, Entity};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct User {
///     #[serde(default, skip_serializing_if = "Option::is_none")]
///     id: Option<String>,
///     name: String,
/// }
///
/// impl Entity for User {
///     const COLLECTION: &'static str = "users";
///
///     fn id(&self) -> Option<&str> {
///         self.id.as_deref()
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> docrepo::Result<()> {
/// let handle = docrepo::connect_in_memory("memory://local", "app").await?;
/// let users = DocumentRepository::<User>::new(handle);
///
/// let alice = users.save(User { id: None, name: "Alice".into() }).await?;
/// assert!(alice.id.is_some());
///
/// let found = users.find(&doc! { "name": "Alice" }).await?;
/// assert_eq!(found.len(), 1);
/// # Ok(())
/// # }
/// ```
pub async fn connect_in_memory(uri: &str, db_name: &str) -> Result<std::sync::Arc<ConnectionHandle>> {
    let handle = std::sync::Arc::new(ConnectionHandle::new(std::sync::Arc::new(MemoryConnector::new())));
    handle.connect(uri, Some(db_name)).await?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let handle = connect_in_memory("memory://local", "app").await.unwrap();
        assert!(handle.is_settled());
        assert_eq!(handle.database_name(), Some("app"));
    }

    #[tokio::test]
    async fn test_connect_in_memory_rejects_bad_uri() {
        assert!(connect_in_memory("ftp://local", "app").await.is_err());
    }
}
