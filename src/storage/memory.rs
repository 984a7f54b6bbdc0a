use super::collection::CollectionData;
use crate::core::{Result, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type CollectionHandle = Arc<RwLock<CollectionData>>;

/// Databases of one deployment
///
/// Each collection sits behind its own lock; the outer lock only guards the
/// namespace map, so operations on different collections do not contend.
/// A database exists for as long as it holds at least one collection.
pub struct DocumentStorage {
    databases: RwLock<BTreeMap<String, BTreeMap<String, CollectionHandle>>>,
}

impl DocumentStorage {
    pub fn new() -> Self {
        Self {
            databases: RwLock::new(BTreeMap::new()),
        }
    }

    /// Handle on an existing collection
    pub async fn collection(&self, db: &str, name: &str) -> Option<CollectionHandle> {
        let databases = self.databases.read().await;
        databases.get(db)?.get(name).cloned()
    }

    /// Handle on a collection, creating it (and its database) implicitly
    pub async fn collection_or_create(&self, db: &str, name: &str) -> CollectionHandle {
        if let Some(existing) = self.collection(db, name).await {
            return existing;
        }

        let mut databases = self.databases.write().await;
        databases
            .entry(db.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(CollectionData::new(namespace(db, name)))))
            .clone()
    }

    /// Explicit creation; fails when the collection already exists
    pub async fn create_collection(&self, db: &str, name: &str) -> Result<()> {
        let mut databases = self.databases.write().await;
        let collections = databases.entry(db.to_string()).or_default();

        if collections.contains_key(name) {
            return Err(StoreError::NamespaceExists(namespace(db, name)));
        }

        collections.insert(
            name.to_string(),
            Arc::new(RwLock::new(CollectionData::new(namespace(db, name)))),
        );
        Ok(())
    }

    /// Returns false when the collection did not exist
    pub async fn drop_collection(&self, db: &str, name: &str) -> bool {
        let mut databases = self.databases.write().await;
        let Some(collections) = databases.get_mut(db) else {
            return false;
        };

        let removed = collections.remove(name).is_some();
        if collections.is_empty() {
            databases.remove(db);
        }
        removed
    }

    pub async fn drop_database(&self, db: &str) -> bool {
        self.databases.write().await.remove(db).is_some()
    }

    pub async fn rename_collection(
        &self,
        db: &str,
        from: &str,
        to: &str,
        drop_target: bool,
    ) -> Result<()> {
        let mut databases = self.databases.write().await;
        let collections = databases
            .get_mut(db)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace(db, from)))?;

        if !collections.contains_key(from) {
            return Err(StoreError::NamespaceNotFound(namespace(db, from)));
        }
        if collections.contains_key(to) && !drop_target {
            return Err(StoreError::NamespaceExists(namespace(db, to)));
        }

        if let Some(handle) = collections.remove(from) {
            handle.write().await.set_namespace(namespace(db, to));
            collections.insert(to.to_string(), handle);
        }
        Ok(())
    }

    pub async fn database_names(&self) -> Vec<String> {
        self.databases.read().await.keys().cloned().collect()
    }

    pub async fn collection_names(&self, db: &str) -> Vec<String> {
        self.databases
            .read()
            .await
            .get(db)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Handles of every collection in `db`, sorted by name
    pub async fn collections(&self, db: &str) -> Vec<(String, CollectionHandle)> {
        self.databases
            .read()
            .await
            .get(db)
            .map(|collections| {
                collections
                    .iter()
                    .map(|(name, handle)| (name.clone(), Arc::clone(handle)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for DocumentStorage {
    fn default() -> Self {
        Self::new()
    }
}

pub fn namespace(db: &str, collection: &str) -> String {
    format!("{}.{}", db, collection)
}
