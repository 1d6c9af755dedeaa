use crate::core::{Document, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Converts entities to plain documents and back.
///
/// Must round-trip every non-identifier field. Identifier fields are handled
/// by the repository and may be present or absent on either side.
pub trait EntityCodec<T>: Send + Sync {
    fn encode(&self, entity: &T) -> Result<Document>;

    fn decode(&self, document: Document) -> Result<T>;
}

/// Codec backed by the entity's serde implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonCodec;

impl<T> EntityCodec<T> for BsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, entity: &T) -> Result<Document> {
        Ok(bson::to_document(entity)?)
    }

    fn decode(&self, document: Document) -> Result<T> {
        Ok(bson::from_document(document)?)
    }
}
