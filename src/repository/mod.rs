//! Typed repositories over stored documents.

mod codec;
mod document_repository;

pub use codec::{BsonCodec, EntityCodec};
pub use document_repository::DocumentRepository;

use crate::core::{Document, Result};
use async_trait::async_trait;

/// A domain object persisted in one collection.
///
/// `COLLECTION` is the static binding between the entity type and its
/// storage target. The identifier is absent until the first save.
///
/// ```
/// use docrepo::Entity;
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
/// ```
pub trait Entity: Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> Option<&str>;
}

/// Collection name and entity type a repository is bound to.
///
/// Resolved once when the repository is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionBinding {
    pub collection_name: String,
    pub entity_type: &'static str,
}

impl CollectionBinding {
    pub fn new(collection_name: impl Into<String>, entity_type: &'static str) -> Self {
        Self {
            collection_name: collection_name.into(),
            entity_type,
        }
    }

    /// Binding declared by the entity type itself.
    pub fn of<T: Entity>() -> Self {
        Self::new(T::COLLECTION, std::any::type_name::<T>())
    }
}

/// Persistence port for one entity type.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Insert when `entity` has no id, otherwise update-or-insert by id.
    /// Returns the entity as stored.
    async fn save(&self, entity: T) -> Result<T>;

    async fn find(&self, conditions: &Document) -> Result<Vec<T>>;

    async fn find_one(&self, conditions: &Document) -> Result<Option<T>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    async fn delete_by_id(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Note;

    impl Entity for Note {
        const COLLECTION: &'static str = "notes";

        fn id(&self) -> Option<&str> {
            None
        }
    }

    #[test]
    fn test_binding_from_entity() {
        let binding = CollectionBinding::of::<Note>();
        assert_eq!(binding.collection_name, "notes");
        assert!(binding.entity_type.ends_with("Note"));
    }
}
