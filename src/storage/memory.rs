use super::filter::{is_operator_expression, matches};
use crate::connection::ConnectionConfig;
use crate::core::{Bson, Document, NATIVE_ID_FIELD, ObjectId, Result, StoreError};
use crate::driver::{
    Client, Collection, Connector, Database, FindOptions, UpdateOptions, UpdateOutcome,
    validate_collection_name,
};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

type CollectionData = Arc<RwLock<Vec<Document>>>;

/// Injected failures, for exercising error paths.
#[derive(Debug, Clone, Default)]
struct Faults {
    refuse_connections: Option<String>,
    reject_writes: Option<String>,
    reject_collection_creation: Option<String>,
    connect_latency: Option<Duration>,
}

#[derive(Default)]
struct ServerState {
    /// database name -> collection name -> documents in insertion order
    databases: RwLock<HashMap<String, HashMap<String, CollectionData>>>,
    faults: Mutex<Faults>,
    connect_attempts: AtomicUsize,
}

/// Shared state of an in-memory document store.
///
/// Cloning yields another handle to the same data, so a test can keep the
/// server while a [`MemoryConnector`] built from it is handed to a
/// connection handle.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<ServerState>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::with_server(self.clone())
    }

    /// Number of `connect` calls received, successful or not.
    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self, reason: impl Into<String>) {
        self.faults().refuse_connections = Some(reason.into());
    }

    pub fn accept_connections(&self) {
        self.faults().refuse_connections = None;
    }

    pub fn reject_writes(&self, reason: impl Into<String>) {
        self.faults().reject_writes = Some(reason.into());
    }

    pub fn accept_writes(&self) {
        self.faults().reject_writes = None;
    }

    pub fn reject_collection_creation(&self, reason: impl Into<String>) {
        self.faults().reject_collection_creation = Some(reason.into());
    }

    pub fn allow_collection_creation(&self) {
        self.faults().reject_collection_creation = None;
    }

    /// Delay applied to every connect before it completes.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.faults().connect_latency = Some(latency);
    }

    pub async fn collection_names(&self, database: &str) -> Vec<String> {
        let databases = self.state.databases.read().await;
        let mut names: Vec<String> = databases
            .get(database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Raw stored documents, `_id` included.
    pub async fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        let data = {
            let databases = self.state.databases.read().await;
            databases
                .get(database)
                .and_then(|collections| collections.get(collection))
                .cloned()
        };
        match data {
            Some(data) => data.read().await.clone(),
            None => Vec::new(),
        }
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.state.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fault_snapshot(&self) -> Faults {
        self.faults().clone()
    }
}

/// [`Connector`] opening clients against a [`MemoryServer`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    server: MemoryServer,
}

impl MemoryConnector {
    /// Connector over a fresh, empty server.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(server: MemoryServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &MemoryServer {
        &self.server
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Client>> {
        self.server.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        config.validate()?;

        let faults = self.server.fault_snapshot();
        if let Some(latency) = faults.connect_latency {
            match config.connect_timeout() {
                Some(limit) if limit < latency => {
                    tokio::time::sleep(limit).await;
                    return Err(StoreError::Connection(format!(
                        "connect timed out after {}ms",
                        limit.as_millis()
                    )));
                }
                _ => tokio::time::sleep(latency).await,
            }
        }

        if let Some(reason) = faults.refuse_connections {
            return Err(StoreError::Connection(reason));
        }

        debug!("In-memory client opened for {}", config.to_url());
        Ok(Arc::new(MemoryClient {
            server: self.server.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

pub struct MemoryClient {
    server: MemoryServer,
    closed: Arc<AtomicBool>,
}

impl MemoryClient {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Client for MemoryClient {
    fn database(&self, name: &str) -> Arc<dyn Database> {
        Arc::new(MemoryDatabase {
            server: self.server.clone(),
            name: name.to_string(),
            closed: self.closed.clone(),
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn ensure_open(closed: &AtomicBool) -> Result<()> {
    if closed.load(Ordering::SeqCst) {
        return Err(StoreError::Closed);
    }
    Ok(())
}

pub struct MemoryDatabase {
    server: MemoryServer,
    name: String,
    closed: Arc<AtomicBool>,
}

impl MemoryDatabase {
    fn handle(&self, name: &str, data: CollectionData) -> Arc<dyn Collection> {
        Arc::new(MemoryCollection {
            server: self.server.clone(),
            name: name.to_string(),
            data,
            closed: self.closed.clone(),
        })
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        ensure_open(&self.closed)?;
        validate_collection_name(name)?;

        let databases = self.server.state.databases.read().await;
        let data = databases
            .get(&self.name)
            .and_then(|collections| collections.get(name))
            .cloned()
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        Ok(self.handle(name, data))
    }

    async fn create_collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        ensure_open(&self.closed)?;
        validate_collection_name(name)?;

        if let Some(reason) = self.server.fault_snapshot().reject_collection_creation {
            return Err(StoreError::CollectionCreation {
                collection: name.to_string(),
                reason,
            });
        }

        let mut databases = self.server.state.databases.write().await;
        let collections = databases.entry(self.name.clone()).or_default();
        if collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }

        let data: CollectionData = Arc::new(RwLock::new(Vec::new()));
        collections.insert(name.to_string(), data.clone());
        debug!("Created collection '{}.{}'", self.name, name);
        Ok(self.handle(name, data))
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        ensure_open(&self.closed)?;
        Ok(self.server.collection_names(&self.name).await)
    }
}

pub struct MemoryCollection {
    server: MemoryServer,
    name: String,
    data: CollectionData,
    closed: Arc<AtomicBool>,
}

impl MemoryCollection {
    fn check_writable(&self) -> Result<()> {
        ensure_open(&self.closed)?;
        if let Some(reason) = self.server.fault_snapshot().reject_writes {
            return Err(StoreError::Write(reason));
        }
        Ok(())
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, mut document: Document) -> Result<ObjectId> {
        self.check_writable()?;
        let id = assign_id(&mut document)?;

        let mut documents = self.data.write().await;
        if documents.iter().any(|existing| stored_id(existing) == Some(id)) {
            return Err(StoreError::Write(format!(
                "duplicate key in '{}': {}",
                self.name, id
            )));
        }
        documents.push(document);
        Ok(id)
    }

    async fn update_one(
        &self,
        filter: &Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome> {
        self.check_writable()?;
        let changes = UpdateSpec::parse(update)?;

        let mut documents = self.data.write().await;
        let mut target = None;
        for (index, document) in documents.iter().enumerate() {
            if matches(document, filter)? {
                target = Some(index);
                break;
            }
        }

        if let Some(index) = target {
            let document = &mut documents[index];
            let before = document.clone();
            changes.apply(document);
            return Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(*document != before),
                upserted_id: None,
            });
        }

        if !options.upsert {
            return Ok(UpdateOutcome::default());
        }

        let mut document = seed_from_filter(filter);
        changes.apply(&mut document);
        let id = assign_id(&mut document)?;
        documents.push(document);

        Ok(UpdateOutcome {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    async fn find(&self, filter: &Document, options: FindOptions) -> Result<Vec<Document>> {
        ensure_open(&self.closed)?;

        let documents = self.data.read().await;
        let mut found = Vec::new();
        for document in documents.iter() {
            if matches(document, filter)? {
                found.push(document);
            }
        }

        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).cloned().collect())
    }

    async fn count_documents(&self, filter: &Document) -> Result<u64> {
        ensure_open(&self.closed)?;

        let documents = self.data.read().await;
        let mut count = 0;
        for document in documents.iter() {
            if matches(document, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn stored_id(document: &Document) -> Option<ObjectId> {
    document.get_object_id(NATIVE_ID_FIELD).ok()
}

/// The document's `_id`, generated and stored when absent.
fn assign_id(document: &mut Document) -> Result<ObjectId> {
    match document.get(NATIVE_ID_FIELD) {
        Some(Bson::ObjectId(id)) => Ok(*id),
        Some(other) => Err(StoreError::Write(format!(
            "'{}' must be an object id, got {:?}",
            NATIVE_ID_FIELD,
            other.element_type()
        ))),
        None => {
            let id = ObjectId::new();
            document.insert(NATIVE_ID_FIELD, id);
            Ok(id)
        }
    }
}

/// Equality fields of a filter become the initial fields of an upserted document.
fn seed_from_filter(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(key, value)| !key.starts_with('$') && !key.contains('.') && !is_operator_expression(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Parsed update document. A document without operators is a `$set`.
struct UpdateSpec {
    set: Document,
    unset: Vec<String>,
}

impl UpdateSpec {
    fn parse(update: Document) -> Result<Self> {
        let has_operators = update.keys().any(|k| k.starts_with('$'));
        if !has_operators {
            return Self::checked(update, Vec::new());
        }

        let mut set = Document::new();
        let mut unset = Vec::new();
        for (op, fields) in update {
            let Bson::Document(fields) = fields else {
                return Err(StoreError::Write(format!("'{}' expects a document", op)));
            };
            match op.as_str() {
                "$set" => {
                    for (field, value) in fields {
                        set.insert(field, value);
                    }
                }
                "$unset" => unset.extend(fields.into_iter().map(|(field, _)| field)),
                other => {
                    return Err(StoreError::Write(format!(
                        "unsupported update operator '{}'",
                        other
                    )));
                }
            }
        }
        Self::checked(set, unset)
    }

    fn checked(set: Document, unset: Vec<String>) -> Result<Self> {
        if set.keys().any(|k| k.starts_with('$')) {
            return Err(StoreError::Write(
                "update mixes operators and plain fields".to_string(),
            ));
        }
        if set.contains_key(NATIVE_ID_FIELD) || unset.iter().any(|f| f == NATIVE_ID_FIELD) {
            return Err(StoreError::Write(format!(
                "'{}' is immutable",
                NATIVE_ID_FIELD
            )));
        }
        Ok(Self { set, unset })
    }

    fn apply(&self, document: &mut Document) {
        for (path, value) in &self.set {
            set_path(document, path, value.clone());
        }
        for path in &self.unset {
            unset_path(document, path);
        }
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(map)) = document.get_mut(head) {
                unset_path(map, rest);
            }
        }
    }
}
