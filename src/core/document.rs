//! Identifier translation between the application-facing `id` field and the
//! store-native `_id` field.

use crate::core::{Bson, Document, ObjectId, Result, StoreError};
use serde_json::Value as JsonValue;

/// Application-facing identifier field.
pub const ID_FIELD: &str = "id";

/// Store-native identifier field.
pub const NATIVE_ID_FIELD: &str = "_id";

/// Convert an extended JSON object into a document.
///
/// `{"$oid": "..."}` becomes an object id, so `json!` literals and `doc!`
/// literals describe the same stored values.
pub fn into_document(value: JsonValue) -> Result<Document> {
    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(StoreError::Encode(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
        Err(err) => Err(StoreError::Encode(err.to_string())),
    }
}

/// Outbound translation: the document body written to the store.
///
/// Both identifier fields are dropped; the native identifier travels in the
/// write filter, never in the body.
pub fn to_storage_form(mut document: Document) -> Document {
    document.remove(ID_FIELD);
    document.remove(NATIVE_ID_FIELD);
    document
}

/// Inbound translation: a stored document as the entity decoder sees it.
///
/// The native identifier is replaced by its string form under `id`. A
/// document already carrying only `id` passes through. Returns `None` when
/// neither identifier is present.
pub fn to_domain_form(mut document: Document) -> Option<Document> {
    match document.remove(NATIVE_ID_FIELD) {
        Some(native) => {
            document.insert(ID_FIELD, native_id_string(&native));
            Some(document)
        }
        None if document.get(ID_FIELD).is_some_and(|id| *id != Bson::Null) => Some(document),
        None => None,
    }
}

/// Parse an application identifier into the store-native one.
pub fn parse_native_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidObjectId(id.to_string()))
}

/// Filter matching exactly one document by native identifier.
pub fn native_id_filter(id: &ObjectId) -> Document {
    let mut filter = Document::new();
    filter.insert(NATIVE_ID_FIELD, *id);
    filter
}

/// String form of a stored `_id` value, whatever its representation.
pub fn native_id_string(value: &Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    const HEX: &str = "507f1f77bcf86cd799439011";

    fn oid() -> ObjectId {
        ObjectId::parse_str(HEX).unwrap()
    }

    #[test]
    fn test_into_document_reads_extended_json() {
        let document = into_document(json!({"_id": {"$oid": HEX}, "n": 1})).unwrap();
        assert_eq!(document, doc! { "_id": oid(), "n": 1 });

        let upper = into_document(json!({"_id": {"$oid": HEX.to_uppercase()}})).unwrap();
        assert_eq!(upper.get_object_id("_id").unwrap(), oid());
    }

    #[test]
    fn test_into_document_rejects_non_objects() {
        assert!(into_document(json!([1, 2])).is_err());
        assert!(into_document(json!("text")).is_err());
        assert!(into_document(json!({"_id": {"$oid": "nope"}})).is_err());
        assert!(into_document(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_storage_form_strips_identifiers() {
        let stored = to_storage_form(doc! { "id": HEX, "_id": oid(), "name": "Alice" });
        assert_eq!(stored, doc! { "name": "Alice" });
    }

    #[test]
    fn test_domain_form_swaps_native_id() {
        let domain = to_domain_form(doc! { "_id": oid(), "name": "Alice" }).unwrap();
        assert_eq!(domain.get_str(ID_FIELD).unwrap(), HEX);
        assert_eq!(domain.get_str("name").unwrap(), "Alice");
        assert!(!domain.contains_key(NATIVE_ID_FIELD));
    }

    #[test]
    fn test_domain_form_native_wins_over_stale_id() {
        let domain = to_domain_form(doc! { "_id": oid(), "id": "stale" }).unwrap();
        assert_eq!(domain.get_str(ID_FIELD).unwrap(), HEX);
    }

    #[test]
    fn test_domain_form_keeps_plain_id() {
        let domain = to_domain_form(doc! { "id": "abc", "n": 1 }).unwrap();
        assert_eq!(domain, doc! { "id": "abc", "n": 1 });
    }

    #[test]
    fn test_domain_form_without_identifier_is_absent() {
        assert!(to_domain_form(doc! { "name": "Alice" }).is_none());
        assert!(to_domain_form(doc! { "id": Bson::Null }).is_none());
    }

    #[test]
    fn test_native_id_string_for_non_oid_values() {
        assert_eq!(native_id_string(&Bson::String("custom".into())), "custom");
        assert_eq!(native_id_string(&Bson::Int32(42)), "42");
    }

    #[test]
    fn test_parse_native_id() {
        assert_eq!(parse_native_id(HEX).unwrap(), oid());
        assert_eq!(parse_native_id(&HEX.to_uppercase()).unwrap(), oid());
        assert_eq!(
            parse_native_id("not-an-object-id"),
            Err(StoreError::InvalidObjectId("not-an-object-id".into()))
        );
        assert!(parse_native_id(&HEX[..23]).is_err());
    }

    #[test]
    fn test_native_id_filter() {
        assert_eq!(native_id_filter(&oid()), doc! { "_id": oid() });
    }
}
