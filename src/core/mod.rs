pub mod document;
pub mod error;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document};
pub use document::{ID_FIELD, NATIVE_ID_FIELD, into_document};
pub use error::{Result, StoreError};
