use super::collection::Collection;
use crate::connection::Session;
use crate::connection::auth::Permission;
use crate::core::{Document, Result};
use crate::json::{self, validate_collection_name, validate_database_name};
use crate::storage::Cursor;
use serde_json::{Value, json};
use std::sync::Arc;

/// Database handle
///
/// Cheap to create; validates its name on first use rather than on creation,
/// the way drivers hand out handles before talking to the server.
#[derive(Clone)]
pub struct Database {
    name: String,
    session: Arc<Session>,
}

/// Statistics returned by [`Database::stats`]
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub db: String,
    pub collections: usize,
    pub objects: usize,
    /// Mean document size in bytes; NaN for an empty database
    pub avg_obj_size: f64,
    pub data_size: u64,
    pub indexes: usize,
}

impl Database {
    pub(crate) fn new(name: String, session: Arc<Session>) -> Self {
        Self { name, session }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle on a collection of this database
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.name.clone(), name.to_string(), Arc::clone(&self.session))
    }

    pub async fn stats(&self) -> Result<DatabaseStats> {
        validate_database_name(&self.name)?;
        let deployment = self.session.command(Permission::Read, &self.name, "dbStats").await?;

        let mut stats = DatabaseStats {
            db: self.name.clone(),
            collections: 0,
            objects: 0,
            avg_obj_size: 0.0,
            data_size: 0,
            indexes: 0,
        };
        for (_, handle) in deployment.storage().collections(&self.name).await {
            let data = handle.read().await;
            stats.collections += 1;
            stats.objects += data.len();
            stats.data_size += data.data_size();
            stats.indexes += data.indexes().len();
        }
        stats.avg_obj_size = stats.data_size as f64 / stats.objects as f64;

        Ok(stats)
    }

    /// Cursor over `{name, type, options, info}` entries, optionally filtered
    pub async fn list_collections(&self, filter: Option<Document>) -> Result<Cursor> {
        validate_database_name(&self.name)?;
        let deployment = self.session.command(Permission::Read, &self.name, "listCollections").await?;

        let filter = filter.unwrap_or_default();
        let mut entries = Vec::new();
        for name in deployment.storage().collection_names(&self.name).await {
            let entry = json!({
                "name": name,
                "type": "collection",
                "options": {},
                "info": {"readOnly": false}
            });
            if let Value::Object(entry) = entry {
                if json::matches(&entry, &filter)? {
                    entries.push(entry);
                }
            }
        }

        Ok(Cursor::from_documents(format!("{}.$cmd.listCollections", self.name), entries))
    }

    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        validate_database_name(&self.name)?;
        let deployment = self.session.command(Permission::Read, &self.name, "listCollections").await?;
        Ok(deployment.storage().collection_names(&self.name).await)
    }

    /// Creates a collection explicitly and returns a handle on it
    pub async fn create_collection(&self, name: &str) -> Result<Collection> {
        validate_database_name(&self.name)?;
        validate_collection_name(name)?;
        let deployment = self.session.command(Permission::Write, &self.name, "create").await?;
        deployment.storage().create_collection(&self.name, name).await?;
        Ok(self.collection(name))
    }

    /// Returns whether the collection existed
    pub async fn drop_collection(&self, name: &str) -> Result<bool> {
        validate_database_name(&self.name)?;
        validate_collection_name(name)?;
        let deployment = self.session.command(Permission::Write, &self.name, "drop").await?;
        Ok(deployment.storage().drop_collection(&self.name, name).await)
    }

    pub async fn rename_collection(&self, from: &str, to: &str, drop_target: bool) -> Result<Collection> {
        validate_database_name(&self.name)?;
        validate_collection_name(from)?;
        validate_collection_name(to)?;
        let deployment = self.session.command(Permission::Write, &self.name, "renameCollection").await?;
        deployment
            .storage()
            .rename_collection(&self.name, from, to, drop_target)
            .await?;
        Ok(self.collection(to))
    }

    /// Drops this database; returns whether it existed
    pub async fn drop_database(&self) -> Result<bool> {
        validate_database_name(&self.name)?;
        let deployment = self.session.command(Permission::Admin, &self.name, "dropDatabase").await?;
        Ok(deployment.storage().drop_database(&self.name).await)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("name", &self.name).finish()
    }
}
