// ============================================================================
// docgate Library
// ============================================================================
//
// - core, json, storage: the in-process document store
// - connection, facade: its driver API (client, database, collection)
// - result, web: the HTTP dispatch engine
// - server: configuration and process-level glue

pub mod connection;
pub mod core;
pub mod facade;
pub mod json;
pub mod result;
pub mod server;
pub mod storage;
pub mod web;

pub use connection::{
    Client,
    auth::{AuthManager, Permission, User},
    config::ConnectionConfig,
};
pub use core::{Document, Result, StoreError};
pub use facade::{Collection, Database};
pub use server::{GatewayConfig, GatewayServer};
pub use storage::{Cursor, Deployment};
pub use web::GatewayError;
