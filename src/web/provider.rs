use super::connector::{ConnectorRegistry, StoreConnection, StoreConnector};
use super::credentials::Credential;
use super::error::GatewayError;
use crate::core::{Result, StoreError};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_MESSAGE_LEN: usize = 200;

/// Opens one store connection per request
///
/// The connector is built once at startup from the connection string;
/// per-request credentials override whatever userinfo that string carried.
#[derive(Clone)]
pub struct ConnectionProvider {
    connector: Arc<dyn StoreConnector>,
}

/// A connection owned by a single request. Dropping it closes the connection.
pub struct ConnectionLease {
    connection: Box<dyn StoreConnection>,
    request_id: u64,
}

impl ConnectionProvider {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self { connector }
    }

    /// Builds the connector for `uri` with the built-in drivers
    pub fn from_settings(uri: &str, options: &Map<String, Value>) -> Result<Self> {
        Self::with_registry(&ConnectorRegistry::default(), uri, options)
    }

    pub fn with_registry(registry: &ConnectorRegistry, uri: &str, options: &Map<String, Value>) -> Result<Self> {
        Ok(Self::new(registry.open(uri, options)?))
    }

    /// Connection string with secrets masked
    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    pub async fn acquire(
        &self,
        credential: Option<&Credential>,
        request_id: u64,
    ) -> std::result::Result<ConnectionLease, GatewayError> {
        match self.connector.connect(credential).await {
            Ok(connection) => {
                debug!(request_id, connection_id = connection.connection_id(), "connection acquired");
                Ok(ConnectionLease { connection, request_id })
            }
            Err(err) => {
                warn!(request_id, code = err.code(), "connection failed: {}", err);
                Err(connection_failed(&err))
            }
        }
    }
}

impl fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("store", &self.connector.describe())
            .finish()
    }
}

impl ConnectionLease {
    pub fn connection(&self) -> &dyn StoreConnection {
        self.connection.as_ref()
    }
}

impl fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("connection_id", &self.connection.connection_id())
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.connection.close();
        debug!(
            request_id = self.request_id,
            connection_id = self.connection.connection_id(),
            "connection released"
        );
    }
}

fn connection_failed(err: &StoreError) -> GatewayError {
    GatewayError::ConnectionFailed {
        message: connection_message(err),
        code: Some(err.code()),
    }
}

/// Stable message for the driver errors callers can act on
fn connection_message(err: &StoreError) -> String {
    match err {
        StoreError::AuthenticationFailed => "authentication failed".to_string(),
        StoreError::HostUnreachable(address) => format!("host {} is unreachable", address),
        StoreError::ServerSelectionTimeout(millis) => {
            format!("no server available within {} ms", millis)
        }
        other => sanitize_message(&other.to_string()),
    }
}

/// Lower-cased, punctuation stripped, at most 200 characters
fn sanitize_message(message: &str) -> String {
    message
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .flat_map(char::to_lowercase)
        .take(MAX_MESSAGE_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}
