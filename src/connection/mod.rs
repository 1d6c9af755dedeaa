pub mod config;
pub mod deferred;

use crate::core::{Result, StoreError};
use crate::driver::{Client, Connector, Database};
pub use config::ConnectionConfig;
use deferred::{Deferred, Promise};
use log::{debug, info, warn};
use std::sync::{Arc, OnceLock};

/// Future every caller of [`ConnectionHandle::connection`] receives.
pub type ClientPromise = Promise<Arc<dyn Client>>;

/// Connect-once handle to a document store
///
/// Any number of repositories may share one handle and start issuing
/// operations before [`connect`](ConnectionHandle::connect) has finished; each
/// operation suspends on the shared connection future. The future settles
/// once, to a client or to the connect error, and every past and future
/// observer sees that same outcome.
///
/// # Examples
///
/// ```
/// # use docrepo::{ConnectionHandle, MemoryConnector};
/// # use std::sync::Arc;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> docrepo::Result<()> {
/// let handle = Arc::new(ConnectionHandle::new(Arc::new(MemoryConnector::new())));
///
/// let waiting = handle.connection();
/// handle.connect("mongodb://localhost/db", Some("app")).await?;
///
/// let database = handle.database().await?;
/// assert_eq!(database.name(), "app");
/// assert!(waiting.await.is_ok());
/// # Ok(())
/// # }
/// ```
pub struct ConnectionHandle {
    connector: Arc<dyn Connector>,
    /// Target database, fixed by the first `connect` call
    db_name: OnceLock<Option<String>>,
    client: Deferred<Arc<dyn Client>>,
}

impl ConnectionHandle {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            db_name: OnceLock::new(),
            client: Deferred::new(),
        }
    }

    /// Establish the connection and settle the shared future with the outcome.
    ///
    /// The database name used by [`database`](Self::database) is `db_name`
    /// when given, else the database path of `uri`; either is checked by
    /// [`ConnectionConfig::validate`]. The name is taken from the call whose
    /// client settles the shared future. Calling `connect` again still performs
    /// a connect attempt, but the shared future keeps its first outcome; a
    /// client opened by such a redundant call is closed again.
    pub async fn connect(&self, uri: &str, db_name: Option<&str>) -> Result<Arc<dyn Client>> {
        match self.open(uri, db_name).await {
            Ok((client, target)) => {
                let commit_name = || {
                    let _ = self.db_name.set(target);
                };
                if self.client.resolve_with(client.clone(), commit_name) {
                    info!("Connected to document store");
                } else {
                    debug!("Connection already settled; closing redundant client");
                    if let Err(err) = client.close().await {
                        warn!("Failed to close redundant client: {}", err);
                    }
                }
            }
            Err(err) => {
                warn!("Connection attempt failed: {}", err);
                if !self.client.reject(err) {
                    debug!("Connection already settled; ignoring failed attempt");
                }
            }
        }

        self.client.promise().await
    }

    /// The shared connection future. Callable before or after `connect`.
    pub fn connection(&self) -> ClientPromise {
        self.client.promise()
    }

    /// Whether `connect` has settled the shared future.
    pub fn is_settled(&self) -> bool {
        self.client.is_settled()
    }

    /// Database name in effect, once `connect` has succeeded.
    pub fn database_name(&self) -> Option<&str> {
        self.db_name.get().and_then(|name| name.as_deref())
    }

    /// Handle scoped to the configured database.
    ///
    /// Fails with the connection error if the connection failed, or with
    /// [`StoreError::Configuration`] if neither `connect` nor its URI named a
    /// database.
    pub async fn database(&self) -> Result<Arc<dyn Database>> {
        let client = self.connection().await?;
        let name = self.database_name().ok_or_else(|| {
            StoreError::Configuration(
                "no database name given to connect() and none in the connection URI".to_string(),
            )
        })?;
        Ok(client.database(name))
    }

    /// Wait for the connection, then release it.
    pub async fn close(&self) -> Result<()> {
        let client = self.connection().await?;
        client.close().await?;
        info!("Closed document store connection");
        Ok(())
    }

    /// Connect and pick the target database. The name is recorded only if
    /// this attempt settles the shared future.
    async fn open(&self, uri: &str, db_name: Option<&str>) -> Result<(Arc<dyn Client>, Option<String>)> {
        let mut config = ConnectionConfig::from_url(uri)
            .map_err(|err| StoreError::Connection(err.to_string()))?;

        if let Some(name) = db_name {
            config = config.database(name);
            config
                .validate()
                .map_err(|err| StoreError::Connection(err.to_string()))?;
        }
        let target = config.database.clone();

        debug!("Connecting to {}", config.to_url());
        let client = self.connector.connect(&config).await.map_err(|err| match err {
            err @ StoreError::Connection(_) => err,
            other => StoreError::Connection(other.to_string()),
        })?;
        Ok((client, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryConnector;

    fn create_test_handle() -> ConnectionHandle {
        ConnectionHandle::new(Arc::new(MemoryConnector::new()))
    }

    #[tokio::test]
    async fn test_handle_starts_unsettled() {
        let handle = create_test_handle();
        assert!(!handle.is_settled());
        assert!(handle.database_name().is_none());
    }

    #[tokio::test]
    async fn test_explicit_database_name_wins() {
        let handle = create_test_handle();
        handle.connect("mongodb://host/db", Some("app")).await.unwrap();
        assert_eq!(handle.database_name(), Some("app"));
        assert_eq!(handle.database().await.unwrap().name(), "app");
    }

    #[tokio::test]
    async fn test_database_name_falls_back_to_uri() {
        let handle = create_test_handle();
        handle.connect("mongodb://host/db", None).await.unwrap();
        assert_eq!(handle.database().await.unwrap().name(), "db");
    }

    #[tokio::test]
    async fn test_missing_database_name_is_configuration_error() {
        let handle = create_test_handle();
        handle.connect("mongodb://host", None).await.unwrap();
        assert!(matches!(
            handle.database().await,
            Err(StoreError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_explicit_database_name_is_validated() {
        let handle = create_test_handle();
        let err = handle.connect("mongodb://host/db", Some("bad.name$x")).await.err();
        assert!(matches!(err, Some(StoreError::Connection(_))));
        assert!(handle.database_name().is_none());
        assert!(matches!(handle.database().await, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn test_malformed_uri_rejects_connection() {
        let handle = create_test_handle();
        let err = handle.connect("postgres://host/db", Some("app")).await.err();
        assert!(matches!(err, Some(StoreError::Connection(_))));
        assert!(handle.is_settled());
        assert!(matches!(handle.database().await, Err(StoreError::Connection(_))));
    }
}
