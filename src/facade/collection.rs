use crate::connection::Session;
use crate::connection::auth::Permission;
use crate::core::{Document, Result, StoreError};
use crate::json::{
    self, ID_FIELD, apply_update, compare_by_sort, is_operator_update, replace_document,
    seed_from_filter, validate_collection_name, validate_database_name,
};
use crate::storage::cursor::distinct_values;
use crate::storage::{CollectionData, Cursor, Deployment, FindOptions, IndexSpec, namespace};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Collection handle
#[derive(Clone)]
pub struct Collection {
    db: String,
    name: String,
    session: Arc<Session>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
    pub acknowledged: bool,
    pub inserted_id: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertManyResult {
    pub acknowledged: bool,
    pub inserted_count: usize,
    /// Position in the request -> generated or supplied `_id`
    pub inserted_ids: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: usize,
    pub modified_count: usize,
    pub upserted_count: usize,
    pub upserted_id: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    pub upsert: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindOneAndModifyOptions {
    pub upsert: bool,
    pub return_document: ReturnDocument,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateIndexOptions {
    pub name: Option<String>,
    pub unique: bool,
}

/// Which of the matched documents an update touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Multiplicity {
    One,
    Many,
}

/// How matched documents are rewritten
enum Modification<'a> {
    Operators(&'a Document),
    Replacement(&'a Document),
}

impl Modification<'_> {
    fn apply(&self, doc: &mut Document) -> Result<()> {
        match self {
            Self::Operators(update) => apply_update(doc, update),
            Self::Replacement(replacement) => replace_document(doc, replacement),
        }
    }
}

impl Collection {
    pub(crate) fn new(db: String, name: String, session: Arc<Session>) -> Self {
        Self { db, name, session }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> String {
        namespace(&self.db, &self.name)
    }

    async fn command(&self, permission: Permission, action: &str) -> Result<&Deployment> {
        validate_database_name(&self.db)?;
        validate_collection_name(&self.name)?;
        self.session.command(permission, &self.db, action).await
    }

    async fn snapshot(&self, deployment: &Deployment) -> Vec<Document> {
        match deployment.storage().collection(&self.db, &self.name).await {
            Some(handle) => handle.read().await.snapshot(),
            None => Vec::new(),
        }
    }

    /// Lazy cursor over the matching documents
    pub async fn find(&self, filter: Option<Document>, options: FindOptions) -> Result<Cursor> {
        let deployment = self.command(Permission::Read, "find").await?;
        let snapshot = self.snapshot(deployment).await;
        Ok(Cursor::find(self.namespace(), snapshot, filter.unwrap_or_default(), options))
    }

    pub async fn find_one(&self, filter: Option<Document>, mut options: FindOptions) -> Result<Option<Document>> {
        options.limit = Some(1);
        let mut cursor = self.find(filter, options).await?;
        cursor.next().await.transpose()
    }

    pub async fn insert_one(&self, doc: Document) -> Result<InsertOneResult> {
        let deployment = self.command(Permission::Write, "insert").await?;
        let handle = deployment.storage().collection_or_create(&self.db, &self.name).await;
        let inserted_id = handle.write().await.insert(doc)?;

        Ok(InsertOneResult {
            acknowledged: true,
            inserted_id,
        })
    }

    /// Ordered insert: stops at the first failing document, keeping the
    /// documents inserted before it
    pub async fn insert_many(&self, docs: Vec<Document>) -> Result<InsertManyResult> {
        if docs.is_empty() {
            return Err(StoreError::BadValue("Invalid BulkOperation, Batch cannot be empty".into()));
        }

        let deployment = self.command(Permission::Write, "insert").await?;
        let handle = deployment.storage().collection_or_create(&self.db, &self.name).await;
        let mut data = handle.write().await;

        let mut inserted_ids = Map::new();
        for (position, doc) in docs.into_iter().enumerate() {
            let id = data.insert(doc)?;
            inserted_ids.insert(position.to_string(), id);
        }

        Ok(InsertManyResult {
            acknowledged: true,
            inserted_count: inserted_ids.len(),
            inserted_ids,
        })
    }

    pub async fn update_one(&self, filter: Document, update: Document, options: UpdateOptions) -> Result<UpdateResult> {
        require_operators(&update)?;
        self.modify(filter, Modification::Operators(&update), options.upsert, Multiplicity::One)
            .await
    }

    pub async fn update_many(&self, filter: Document, update: Document, options: UpdateOptions) -> Result<UpdateResult> {
        require_operators(&update)?;
        self.modify(filter, Modification::Operators(&update), options.upsert, Multiplicity::Many)
            .await
    }

    pub async fn replace_one(&self, filter: Document, replacement: Document, options: UpdateOptions) -> Result<UpdateResult> {
        self.modify(filter, Modification::Replacement(&replacement), options.upsert, Multiplicity::One)
            .await
    }

    async fn modify(
        &self,
        filter: Document,
        modification: Modification<'_>,
        upsert: bool,
        multiplicity: Multiplicity,
    ) -> Result<UpdateResult> {
        let deployment = self.command(Permission::Write, "update").await?;
        let storage = deployment.storage();
        let handle = if upsert {
            storage.collection_or_create(&self.db, &self.name).await
        } else {
            match storage.collection(&self.db, &self.name).await {
                Some(handle) => handle,
                None => {
                    return Ok(UpdateResult {
                        acknowledged: true,
                        ..Default::default()
                    });
                }
            }
        };

        let mut data = handle.write().await;
        let limit = (multiplicity == Multiplicity::One).then_some(1);
        let positions = data.find_positions(&filter, limit)?;

        let mut result = UpdateResult {
            acknowledged: true,
            matched_count: positions.len(),
            ..Default::default()
        };

        for position in positions {
            let Some(current) = data.get(position) else {
                continue;
            };
            let mut updated = current.clone();
            modification.apply(&mut updated)?;
            if &updated != current {
                data.store(position, updated)?;
                result.modified_count += 1;
            }
        }

        if result.matched_count == 0 && upsert {
            let mut seed = seed_from_filter(&filter)?;
            modification.apply(&mut seed)?;
            result.upserted_id = Some(data.insert(seed)?);
            result.upserted_count = 1;
        }

        Ok(result)
    }

    pub async fn delete_one(&self, filter: Document) -> Result<DeleteResult> {
        self.delete(filter, Multiplicity::One).await
    }

    pub async fn delete_many(&self, filter: Document) -> Result<DeleteResult> {
        self.delete(filter, Multiplicity::Many).await
    }

    async fn delete(&self, filter: Document, multiplicity: Multiplicity) -> Result<DeleteResult> {
        let deployment = self.command(Permission::Write, "delete").await?;
        let deleted_count = match deployment.storage().collection(&self.db, &self.name).await {
            None => 0,
            Some(handle) => {
                let mut data = handle.write().await;
                let limit = (multiplicity == Multiplicity::One).then_some(1);
                let positions = data.find_positions(&filter, limit)?;
                data.remove_positions(&positions)
            }
        };

        Ok(DeleteResult {
            acknowledged: true,
            deleted_count,
        })
    }

    /// Updates the first matching document (after `sort`) and returns it as
    /// it was before or after the update
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndModifyOptions,
    ) -> Result<Option<Document>> {
        require_operators(&update)?;
        let deployment = self.command(Permission::Write, "findAndModify").await?;
        let storage = deployment.storage();
        let handle = match (options.upsert, storage.collection(&self.db, &self.name).await) {
            (_, Some(handle)) => handle,
            (true, None) => storage.collection_or_create(&self.db, &self.name).await,
            (false, None) => return Ok(None),
        };

        let mut data = handle.write().await;
        let returned = match select_first(&data, &filter, options.sort.as_ref())? {
            Some(position) => {
                let before = data.get(position).cloned().unwrap_or_default();
                let mut after = before.clone();
                apply_update(&mut after, &update)?;
                if after != before {
                    data.store(position, after.clone())?;
                }
                match options.return_document {
                    ReturnDocument::Before => Some(before),
                    ReturnDocument::After => Some(after),
                }
            }
            None if options.upsert => {
                let mut seed = seed_from_filter(&filter)?;
                apply_update(&mut seed, &update)?;
                let id = data.insert(seed)?;
                match options.return_document {
                    ReturnDocument::Before => None,
                    ReturnDocument::After => {
                        let position = data.len().saturating_sub(1);
                        data.get(position)
                            .filter(|doc| doc.get(ID_FIELD) == Some(&id))
                            .cloned()
                    }
                }
            }
            None => None,
        };

        returned
            .map(|doc| project_with(doc, options.projection.as_ref()))
            .transpose()
    }

    pub async fn find_one_and_delete(
        &self,
        filter: Document,
        options: FindOneAndModifyOptions,
    ) -> Result<Option<Document>> {
        let deployment = self.command(Permission::Write, "findAndModify").await?;
        let Some(handle) = deployment.storage().collection(&self.db, &self.name).await else {
            return Ok(None);
        };

        let mut data = handle.write().await;
        let Some(position) = select_first(&data, &filter, options.sort.as_ref())? else {
            return Ok(None);
        };
        let removed = data.get(position).cloned();
        data.remove_positions(&[position]);

        removed
            .map(|doc| project_with(doc, options.projection.as_ref()))
            .transpose()
    }

    pub async fn count_documents(&self, filter: Option<Document>) -> Result<usize> {
        let deployment = self.command(Permission::Read, "count").await?;
        match deployment.storage().collection(&self.db, &self.name).await {
            Some(handle) => Ok(handle
                .read()
                .await
                .find_positions(&filter.unwrap_or_default(), None)?
                .len()),
            None => Ok(0),
        }
    }

    pub async fn estimated_document_count(&self) -> Result<usize> {
        let deployment = self.command(Permission::Read, "count").await?;
        match deployment.storage().collection(&self.db, &self.name).await {
            Some(handle) => Ok(handle.read().await.len()),
            None => Ok(0),
        }
    }

    pub async fn distinct(&self, field: &str, filter: Option<Document>) -> Result<Vec<Value>> {
        if field.is_empty() || field.starts_with('$') {
            return Err(StoreError::BadValue(format!("invalid distinct key: '{}'", field)));
        }

        let deployment = self.command(Permission::Read, "distinct").await?;
        let filter = filter.unwrap_or_default();
        let mut matched = Vec::new();
        for doc in self.snapshot(deployment).await {
            if json::matches(&doc, &filter)? {
                matched.push(doc);
            }
        }
        Ok(distinct_values(&matched, field))
    }

    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Cursor> {
        let deployment = self.command(Permission::Read, "aggregate").await?;
        let snapshot = self.snapshot(deployment).await;
        Ok(Cursor::aggregate(self.namespace(), snapshot, pipeline))
    }

    /// Returns the index name
    pub async fn create_index(&self, keys: Document, options: CreateIndexOptions) -> Result<String> {
        let deployment = self.command(Permission::Write, "createIndexes").await?;
        let handle = deployment.storage().collection_or_create(&self.db, &self.name).await;
        let spec = IndexSpec::new(keys, options.name, options.unique);
        handle.write().await.create_index(spec)
    }

    pub async fn list_indexes(&self) -> Result<Cursor> {
        let deployment = self.command(Permission::Read, "listIndexes").await?;
        let handle = deployment
            .storage()
            .collection(&self.db, &self.name)
            .await
            .ok_or_else(|| StoreError::NamespaceNotFound(self.namespace()))?;

        let indexes = handle
            .read()
            .await
            .indexes()
            .iter()
            .map(|spec| match serde_json::to_value(spec) {
                Ok(Value::Object(doc)) => Ok(doc),
                Ok(_) => Ok(Map::new()),
                Err(err) => Err(StoreError::from(err)),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Cursor::from_documents(self.namespace(), indexes))
    }

    /// Returns whether the collection existed
    pub async fn drop(&self) -> Result<bool> {
        let deployment = self.command(Permission::Write, "drop").await?;
        Ok(deployment.storage().drop_collection(&self.db, &self.name).await)
    }
}

fn require_operators(update: &Document) -> Result<()> {
    if update.is_empty() || !is_operator_update(update) {
        return Err(StoreError::FailedToParse("Update document requires atomic operators".into()));
    }
    Ok(())
}

fn select_first(data: &CollectionData, filter: &Document, sort: Option<&Document>) -> Result<Option<usize>> {
    match sort {
        None => Ok(data.find_positions(filter, Some(1))?.first().copied()),
        Some(sort) => Ok(data
            .find_positions(filter, None)?
            .into_iter()
            .filter_map(|position| data.get(position).map(|doc| (position, doc)))
            .min_by(|(_, a), (_, b)| compare_by_sort(a, b, sort))
            .map(|(position, _)| position)),
    }
}

fn project_with(doc: Document, projection: Option<&Document>) -> Result<Document> {
    match projection {
        Some(projection) => json::project(&doc, projection),
        None => Ok(doc),
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace())
            .finish()
    }
}
