use super::{BsonCodec, CollectionBinding, Entity, EntityCodec, Repository};
use crate::connection::ConnectionHandle;
use crate::core::document::{native_id_filter, parse_native_id, to_domain_form, to_storage_form};
use crate::core::{Document, ObjectId, Result, StoreError};
use bson::doc;
use crate::driver::{Collection, FindOptions, UpdateOptions, validate_collection_name};
use async_trait::async_trait;
use log::debug;
use std::marker::PhantomData;
use std::sync::Arc;

/// Repository mapping entities of type `T` to documents of one collection.
///
/// Every operation first waits for the shared connection, then resolves the
/// collection, creating it on first use. Entities never carry the native
/// `_id`; it is swapped for the string `id` on the way in and out.
pub struct DocumentRepository<T, C = BsonCodec> {
    handle: Arc<ConnectionHandle>,
    binding: CollectionBinding,
    codec: C,
    _entity: PhantomData<fn() -> T>,
}

impl<T> DocumentRepository<T, BsonCodec>
where
    T: Entity,
    BsonCodec: EntityCodec<T>,
{
    /// Repository bound to `T::COLLECTION`, using serde for encoding.
    pub fn new(handle: Arc<ConnectionHandle>) -> Self {
        Self::with_binding(handle, CollectionBinding::of::<T>(), BsonCodec)
    }
}

impl<T, C> DocumentRepository<T, C>
where
    T: Entity,
    C: EntityCodec<T>,
{
    pub fn with_binding(handle: Arc<ConnectionHandle>, binding: CollectionBinding, codec: C) -> Self {
        Self {
            handle,
            binding,
            codec,
            _entity: PhantomData,
        }
    }

    pub fn binding(&self) -> &CollectionBinding {
        &self.binding
    }

    pub fn collection_name(&self) -> &str {
        &self.binding.collection_name
    }

    /// Persist `entity` and return it as re-read from the store.
    ///
    /// With an id this is an upsert keyed by the parsed native id; without
    /// one the store generates the id. A re-read that finds nothing is a
    /// [`StoreError::NotFound`].
    pub async fn save(&self, entity: T) -> Result<T> {
        let target = entity.id().map(parse_native_id).transpose()?;
        let body = to_storage_form(self.codec.encode(&entity)?);
        let collection = self.collection().await?;

        let id = match target {
            Some(id) => {
                collection
                    .update_one(&native_id_filter(&id), doc! { "$set": body }, UpdateOptions::upsert())
                    .await
                    .map_err(StoreError::into_write)?;
                id
            }
            None => collection
                .insert_one(body)
                .await
                .map_err(StoreError::into_write)?,
        };

        let stored = collection
            .find(&native_id_filter(&id), FindOptions::limit(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.missing_after_write(&id))?;

        self.materialize(stored)?
            .ok_or_else(|| self.missing_after_write(&id))
    }

    /// All matching entities, in store order.
    pub async fn find(&self, conditions: &Document) -> Result<Vec<T>> {
        let collection = self.collection().await?;
        let documents = collection.find(conditions, FindOptions::default()).await?;

        let mut entities = Vec::with_capacity(documents.len());
        for document in documents {
            if let Some(entity) = self.materialize(document)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// First matching entity, or `None`.
    pub async fn find_one(&self, conditions: &Document) -> Result<Option<T>> {
        let collection = self.collection().await?;
        let document = collection
            .find(conditions, FindOptions::limit(1))
            .await?
            .into_iter()
            .next();

        match document {
            Some(document) => self.materialize(document),
            None => Ok(None),
        }
    }

    /// Entity stored under `id`. An id that is not a valid native
    /// identifier cannot match anything and yields `None`.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        let native = match parse_native_id(id) {
            Ok(native) => native,
            Err(_) => {
                debug!("'{}' is not an object id; nothing to find in '{}'", id, self.collection_name());
                return Ok(None);
            }
        };
        self.find_one(&native_id_filter(&native)).await
    }

    /// Not supported by this repository; always fails without touching the store.
    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        Err(StoreError::NotImplemented(format!(
            "delete_by_id('{}') on collection '{}'",
            id,
            self.collection_name()
        )))
    }

    /// Resolve the bound collection, creating it if it does not exist yet.
    ///
    /// Creation racing with another caller is not an error: when the store
    /// reports the collection as already existing, the existing collection is
    /// looked up again and returned.
    pub async fn collection(&self) -> Result<Arc<dyn Collection>> {
        let name = self.collection_name();
        validate_collection_name(name)?;
        let database = self.handle.database().await?;

        match database.collection(name).await {
            Ok(collection) => return Ok(collection),
            Err(StoreError::CollectionNotFound(_)) => {}
            Err(err) => return Err(err),
        }

        debug!("Creating collection '{}' for {}", name, self.binding.entity_type);
        match database.create_collection(name).await {
            Ok(collection) => Ok(collection),
            Err(StoreError::CollectionExists(_)) => {
                debug!("Collection '{}' was created concurrently; using it", name);
                database.collection(name).await.map_err(|err| StoreError::CollectionCreation {
                    collection: name.to_string(),
                    reason: err.to_string(),
                })
            }
            Err(err @ StoreError::CollectionCreation { .. }) => Err(err),
            Err(err) => Err(StoreError::CollectionCreation {
                collection: name.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn materialize(&self, document: Document) -> Result<Option<T>> {
        match to_domain_form(document) {
            Some(document) => self.codec.decode(document).map(Some),
            None => Ok(None),
        }
    }

    fn missing_after_write(&self, id: &ObjectId) -> StoreError {
        StoreError::NotFound(format!(
            "document {} missing from '{}' after write",
            id,
            self.collection_name()
        ))
    }
}

#[async_trait]
impl<T, C> Repository<T> for DocumentRepository<T, C>
where
    T: Entity,
    C: EntityCodec<T> + 'static,
{
    async fn save(&self, entity: T) -> Result<T> {
        DocumentRepository::save(self, entity).await
    }

    async fn find(&self, conditions: &Document) -> Result<Vec<T>> {
        DocumentRepository::find(self, conditions).await
    }

    async fn find_one(&self, conditions: &Document) -> Result<Option<T>> {
        DocumentRepository::find_one(self, conditions).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        DocumentRepository::find_by_id(self, id).await
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        DocumentRepository::delete_by_id(self, id).await
    }
}
