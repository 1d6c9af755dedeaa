//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use docrepo::driver::{
    Client, Collection, Connector, Database, FindOptions, UpdateOptions, UpdateOutcome,
};
use docrepo::{
    ConnectionConfig, ConnectionHandle, Document, Entity, MemoryServer, ObjectId, Result,
    StoreError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Barrier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl User {
    pub fn named(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            age: None,
            tags: Vec::new(),
        }
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

pub fn handle_for(server: &MemoryServer) -> Arc<ConnectionHandle> {
    Arc::new(ConnectionHandle::new(Arc::new(server.connector())))
}

pub async fn connected(server: &MemoryServer) -> Arc<ConnectionHandle> {
    let handle = handle_for(server);
    handle
        .connect("mongodb://host/db", Some("app"))
        .await
        .expect("in-memory connect");
    handle
}

/// Ways a [`ScriptedConnector`] distorts the store underneath it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Script {
    /// First strict lookup reports the collection missing even if it exists.
    pub hide_existing_once: bool,
    /// Reads through collection handles return nothing.
    pub blind_reads: bool,
    /// A strict lookup that misses waits until a second lookup has missed
    /// too, so two first uses both go on to create the collection.
    pub pair_misses: bool,
}

/// Connector over a [`MemoryServer`] that misbehaves as scripted.
pub struct ScriptedConnector {
    server: MemoryServer,
    script: Script,
    pub lookups: Arc<AtomicUsize>,
    pub creations: Arc<AtomicUsize>,
    misses: Arc<Barrier>,
}

impl ScriptedConnector {
    pub fn new(server: MemoryServer, script: Script) -> Self {
        Self {
            server,
            script,
            lookups: Arc::new(AtomicUsize::new(0)),
            creations: Arc::new(AtomicUsize::new(0)),
            misses: Arc::new(Barrier::new(2)),
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Client>> {
        let inner = self.server.connector().connect(config).await?;
        Ok(Arc::new(ScriptedClient {
            inner,
            script: self.script,
            hidden: Arc::new(AtomicUsize::new(0)),
            lookups: self.lookups.clone(),
            creations: self.creations.clone(),
            misses: self.misses.clone(),
        }))
    }
}

struct ScriptedClient {
    inner: Arc<dyn Client>,
    script: Script,
    hidden: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
    creations: Arc<AtomicUsize>,
    misses: Arc<Barrier>,
}

#[async_trait]
impl Client for ScriptedClient {
    fn database(&self, name: &str) -> Arc<dyn Database> {
        Arc::new(ScriptedDatabase {
            inner: self.inner.database(name),
            script: self.script,
            hidden: self.hidden.clone(),
            lookups: self.lookups.clone(),
            creations: self.creations.clone(),
            misses: self.misses.clone(),
        })
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

struct ScriptedDatabase {
    inner: Arc<dyn Database>,
    script: Script,
    hidden: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
    creations: Arc<AtomicUsize>,
    misses: Arc<Barrier>,
}

#[async_trait]
impl Database for ScriptedDatabase {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.script.hide_existing_once && self.hidden.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        let found = self.inner.collection(name).await;
        if self.script.pair_misses && matches!(found, Err(StoreError::CollectionNotFound(_))) {
            self.misses.wait().await;
        }
        Ok(self.wrap(found?))
    }

    async fn create_collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.create_collection(name).await?;
        Ok(self.wrap(inner))
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        self.inner.list_collection_names().await
    }
}

impl ScriptedDatabase {
    fn wrap(&self, inner: Arc<dyn Collection>) -> Arc<dyn Collection> {
        Arc::new(ScriptedCollection {
            inner,
            script: self.script,
        })
    }
}

struct ScriptedCollection {
    inner: Arc<dyn Collection>,
    script: Script,
}

#[async_trait]
impl Collection for ScriptedCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert_one(&self, document: Document) -> Result<ObjectId> {
        self.inner.insert_one(document).await
    }

    async fn update_one(
        &self,
        filter: &Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome> {
        self.inner.update_one(filter, update, options).await
    }

    async fn find(&self, filter: &Document, options: FindOptions) -> Result<Vec<Document>> {
        if self.script.blind_reads {
            return Ok(Vec::new());
        }
        self.inner.find(filter, options).await
    }

    async fn count_documents(&self, filter: &Document) -> Result<u64> {
        self.inner.count_documents(filter).await
    }
}
