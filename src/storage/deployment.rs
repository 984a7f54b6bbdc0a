use super::memory::DocumentStorage;
use crate::connection::auth::{AuthManager, Permission, User};
use crate::core::{Result, StoreError};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

// Process-wide registry of hosted deployments, keyed by `host:port`
lazy_static! {
    static ref DEPLOYMENTS: RwLock<HashMap<String, Arc<Deployment>>> = RwLock::new(HashMap::new());
}

/// A hosted document-store deployment that drivers connect to by address
pub struct Deployment {
    address: String,
    storage: DocumentStorage,
    auth: AuthManager,
    require_auth: bool,
    command_latency: Option<Duration>,
    handshake_delay: Option<Duration>,
    open_connections: AtomicUsize,
    next_connection_id: AtomicU64,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl Deployment {
    pub fn builder(address: &str) -> DeploymentBuilder {
        DeploymentBuilder {
            address: address.to_ascii_lowercase(),
            users: Vec::new(),
            require_auth: false,
            command_latency: None,
            handshake_delay: None,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Deployment registered at `address`, if any
    pub fn lookup(address: &str) -> Option<Arc<Deployment>> {
        let deployments = DEPLOYMENTS.read().unwrap_or_else(PoisonError::into_inner);
        deployments.get(&address.to_ascii_lowercase()).cloned()
    }

    /// Unregisters the deployment; open connections keep working until closed
    pub fn shutdown(&self) {
        let mut deployments = DEPLOYMENTS.write().unwrap_or_else(PoisonError::into_inner);
        deployments.remove(&self.address);
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn storage(&self) -> &DocumentStorage {
        &self.storage
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    /// Number of driver connections currently open against this deployment
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    pub(crate) fn handshake_delay(&self) -> Option<Duration> {
        self.handshake_delay
    }

    /// Resolves the identity of a new connection
    pub(crate) async fn authenticate(
        &self,
        credentials: Option<(&str, &str)>,
    ) -> Result<User> {
        match credentials {
            Some((username, password)) => self.auth.authenticate(username, password).await,
            None if self.require_auth => Err(StoreError::AuthenticationFailed),
            None => Ok(User::anonymous()),
        }
    }

    pub(crate) fn register_connection(&self) -> u64 {
        self.open_connections.fetch_add(1, Ordering::SeqCst);
        self.next_connection_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn release_connection(&self) {
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }

    /// Simulated round trip for every command
    pub(crate) async fn round_trip(&self) {
        if let Some(latency) = self.command_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

pub struct DeploymentBuilder {
    address: String,
    users: Vec<(String, String, Vec<Permission>)>,
    require_auth: bool,
    command_latency: Option<Duration>,
    handshake_delay: Option<Duration>,
    bcrypt_cost: u32,
}

impl DeploymentBuilder {
    /// Adds a user account
    pub fn user(mut self, username: &str, password: &str, permissions: Vec<Permission>) -> Self {
        self.users
            .push((username.to_string(), password.to_string(), permissions));
        self
    }

    /// Reject connections that do not present credentials
    pub fn require_auth(mut self, require: bool) -> Self {
        self.require_auth = require;
        self
    }

    /// Delay applied to every command round trip
    pub fn command_latency(mut self, latency: Duration) -> Self {
        self.command_latency = Some(latency);
        self
    }

    /// Delay applied while a connection is being established
    pub fn handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = Some(delay);
        self
    }

    /// bcrypt cost used to hash the configured passwords
    pub fn bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Hashes the accounts and registers the deployment at its address
    pub fn start(self) -> Result<Arc<Deployment>> {
        let users = self
            .users
            .iter()
            .map(|(username, password, permissions)| {
                Ok(User::new(
                    username.clone(),
                    AuthManager::hash_password(password, self.bcrypt_cost)?,
                    permissions.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let deployment = Arc::new(Deployment {
            address: self.address.clone(),
            storage: DocumentStorage::new(),
            auth: AuthManager::with_users(users),
            require_auth: self.require_auth,
            command_latency: self.command_latency,
            handshake_delay: self.handshake_delay,
            open_connections: AtomicUsize::new(0),
            next_connection_id: AtomicU64::new(1),
            started_at: chrono::Utc::now(),
        });

        let mut deployments = DEPLOYMENTS.write().unwrap_or_else(PoisonError::into_inner);
        if deployments.contains_key(&self.address) {
            return Err(StoreError::BadValue(format!(
                "address already in use: {}",
                self.address
            )));
        }
        deployments.insert(self.address, Arc::clone(&deployment));

        Ok(deployment)
    }
}
