//! Recommended imports grouped by abstraction level.
//!
//! `app` is what application code needs to declare entities and use
//! repositories. `driver` is for implementing a store backend.

pub mod app {
    //! Entities, repositories and the shared connection handle.
    pub use crate::{
        Bson, CollectionBinding, ConnectionHandle, Document, DocumentRepository, Entity, ObjectId,
        Repository, Result, StoreError, into_document,
    };
    pub use bson::doc;
}

pub mod driver {
    //! Traits and option types a store backend implements.
    pub use crate::connection::ConnectionConfig;
    pub use crate::driver::{
        Client, Collection, Connector, Database, FindOptions, UpdateOptions, UpdateOutcome,
    };
}
