use thiserror::Error;

/// Every failure the store, the connection handle and the repositories surface.
///
/// Payloads are plain strings so a single settled outcome can be cloned and
/// handed to every task awaiting the shared connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Failed to create collection '{collection}': {reason}")]
    CollectionCreation { collection: String, reason: String },

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    #[error("Invalid object id '{0}'")]
    InvalidObjectId(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Client is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Folds a failure raised by a write call into the `Write` variant.
    /// `Closed` is kept as is.
    pub(crate) fn into_write(self) -> Self {
        match self {
            err @ (StoreError::Write(_) | StoreError::Closed) => err,
            other => StoreError::Write(other.to_string()),
        }
    }
}

impl From<bson::ser::Error> for StoreError {
    fn from(err: bson::ser::Error) -> Self {
        StoreError::Encode(err.to_string())
    }
}

impl From<bson::de::Error> for StoreError {
    fn from(err: bson::de::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}
