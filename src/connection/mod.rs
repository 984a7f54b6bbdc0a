pub mod auth;
pub mod config;

use crate::core::{Result, StoreError};
use crate::facade::Database;
use crate::json::validate_database_name;
use crate::storage::Deployment;
use auth::{Permission, User, enforce_permission};
use config::ConnectionConfig;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Database connection handle
///
/// Represents an authenticated connection to a deployment. Database and
/// collection handles derived from it share its session; once the client is
/// closed (explicitly or by dropping it) every derived handle fails with
/// `ConnectionClosed`.
pub struct Client {
    session: Arc<Session>,
}

/// State shared by a client and the handles derived from it
pub(crate) struct Session {
    id: u64,
    user: User,
    deployment: Arc<Deployment>,
    closed: AtomicBool,
}

impl Session {
    /// Checks the session is usable and the user holds `permission`, then
    /// waits for the command round trip
    pub(crate) async fn command(
        &self,
        permission: Permission,
        namespace: &str,
        action: &str,
    ) -> Result<&Deployment> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionClosed(self.deployment.address().to_string()));
        }
        enforce_permission(&self.user, permission, namespace, action)?;
        self.deployment.round_trip().await;
        Ok(self.deployment.as_ref())
    }

    fn close(&self) -> bool {
        let was_open = !self.closed.swap(true, Ordering::SeqCst);
        if was_open {
            self.deployment.release_connection();
        }
        was_open
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    pub size_on_disk: u64,
    pub empty: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDatabasesResult {
    pub databases: Vec<DatabaseInfo>,
    pub total_size: u64,
    pub ok: u8,
}

impl Client {
    /// Opens a connection
    ///
    /// Resolves the deployment by address, performs the handshake and
    /// authenticates, all within `config.connect_timeout`.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let timeout = config.connect_timeout;
        tokio::time::timeout(timeout, Self::establish(&config))
            .await
            .map_err(|_| StoreError::ServerSelectionTimeout(timeout_millis(timeout)))?
    }

    /// Parses `url` and connects
    pub async fn connect_url(url: &str) -> Result<Self> {
        Self::connect(ConnectionConfig::from_url(url)?).await
    }

    async fn establish(config: &ConnectionConfig) -> Result<Self> {
        let address = config.address();
        let deployment = Deployment::lookup(&address).ok_or(StoreError::HostUnreachable(address))?;

        if let Some(delay) = deployment.handshake_delay() {
            tokio::time::sleep(delay).await;
        }

        let credentials = config
            .username
            .as_deref()
            .map(|user| (user, config.password.as_deref().unwrap_or("")));
        let user = deployment.authenticate(credentials).await?;

        let id = deployment.register_connection();
        Ok(Self {
            session: Arc::new(Session {
                id,
                user,
                deployment,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.session.id
    }

    /// Get authenticated username (empty for anonymous connections)
    pub fn username(&self) -> &str {
        self.session.user.username()
    }

    pub fn is_active(&self) -> bool {
        !self.session.closed.load(Ordering::SeqCst)
    }

    /// Handle on a database; nothing is created until data is written
    pub fn database(&self, name: &str) -> Database {
        Database::new(name.to_string(), Arc::clone(&self.session))
    }

    pub async fn list_databases(&self) -> Result<ListDatabasesResult> {
        let deployment = self.session.command(Permission::Read, "admin", "listDatabases").await?;
        let storage = deployment.storage();

        let mut databases = Vec::new();
        for name in storage.database_names().await {
            let mut size = 0;
            let mut documents = 0;
            for (_, handle) in storage.collections(&name).await {
                let data = handle.read().await;
                size += data.data_size();
                documents += data.len();
            }
            databases.push(DatabaseInfo {
                name,
                size_on_disk: size,
                empty: documents == 0,
            });
        }

        let total_size = databases.iter().map(|db| db.size_on_disk).sum();
        Ok(ListDatabasesResult {
            databases,
            total_size,
            ok: 1,
        })
    }

    pub async fn list_database_names(&self) -> Result<Vec<String>> {
        let deployment = self.session.command(Permission::Read, "admin", "listDatabases").await?;
        Ok(deployment.storage().database_names().await)
    }

    /// Drops a database; returns whether it existed
    pub async fn drop_database(&self, name: &str) -> Result<bool> {
        validate_database_name(name)?;
        let deployment = self.session.command(Permission::Admin, name, "dropDatabase").await?;
        Ok(deployment.storage().drop_database(name).await)
    }

    pub async fn ping(&self) -> Result<Value> {
        self.session.command(Permission::Read, "admin", "ping").await?;
        Ok(json!({"ok": 1}))
    }

    pub async fn server_status(&self) -> Result<Value> {
        let deployment = self.session.command(Permission::Read, "admin", "serverStatus").await?;
        let now = chrono::Utc::now();
        let uptime = now.signed_duration_since(deployment.started_at());

        Ok(json!({
            "host": deployment.address(),
            "version": SERVER_VERSION,
            "uptime": uptime.num_seconds(),
            "uptimeMillis": uptime.num_milliseconds(),
            "localTime": now.to_rfc3339(),
            "connections": {"current": deployment.open_connections()},
            "ok": 1
        }))
    }

    pub async fn build_info(&self) -> Result<Value> {
        self.session.command(Permission::Read, "admin", "buildInfo").await?;
        let parts: Vec<u64> = SERVER_VERSION
            .split('.')
            .filter_map(|part| part.parse().ok())
            .collect();
        Ok(json!({"version": SERVER_VERSION, "versionArray": parts, "ok": 1}))
    }

    /// Close the connection; idempotent
    pub fn close(&self) {
        self.session.close();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Ensure the deployment's connection count is released
        self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.session.id)
            .field("address", &self.session.deployment.address())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Saturates instead of truncating for absurdly long timeouts
fn timeout_millis(timeout: std::time::Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_and_release() {
        let deployment = Deployment::builder("client-test:1").start().unwrap();
        let client = Client::connect_url("docstore://client-test:1").await.unwrap();
        assert!(client.is_active());
        assert_eq!(deployment.open_connections(), 1);

        drop(client);
        assert_eq!(deployment.open_connections(), 0);
        deployment.shutdown();
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let err = Client::connect_url("docstore://nobody-home:9").await.unwrap_err();
        assert_eq!(err, StoreError::HostUnreachable("nobody-home:9".into()));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let deployment = Deployment::builder("client-test:2")
            .handshake_delay(Duration::from_millis(500))
            .start()
            .unwrap();
        let err = Client::connect_url("docstore://client-test:2?connectTimeoutMS=20")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::ServerSelectionTimeout(20));
        assert_eq!(deployment.open_connections(), 0);
        deployment.shutdown();
    }

    #[test]
    fn test_timeout_millis_saturates() {
        assert_eq!(timeout_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(timeout_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_closed_client_rejects_commands() {
        let deployment = Deployment::builder("client-test:3").start().unwrap();
        let client = Client::connect_url("docstore://client-test:3").await.unwrap();
        let db = client.database("shop");

        client.close();
        client.close();
        assert_eq!(deployment.open_connections(), 0);
        assert!(matches!(client.ping().await, Err(StoreError::ConnectionClosed(_))));
        assert!(db.stats().await.is_err());
        deployment.shutdown();
    }

    #[tokio::test]
    async fn test_list_databases() {
        let deployment = Deployment::builder("client-test:4").start().unwrap();
        let client = Client::connect_url("docstore://client-test:4").await.unwrap();
        deployment.storage().create_collection("b", "x").await.unwrap();
        deployment.storage().create_collection("a", "y").await.unwrap();

        let listing = client.list_databases().await.unwrap();
        let names: Vec<_> = listing.databases.iter().map(|db| db.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(listing.databases.iter().all(|db| db.empty));
        assert_eq!(client.list_database_names().await.unwrap(), vec!["a", "b"]);

        assert!(client.drop_database("a").await.unwrap());
        assert!(!client.drop_database("a").await.unwrap());
        deployment.shutdown();
    }
}
