//! Action tables
//!
//! One closed table per level mapping the driver's public method names to
//! calls on the handle. Arguments are taken positionally from the request
//! body; surplus arguments are ignored, a JSON `null` counts as absent.

use crate::connection::Client;
use async_trait::async_trait;
use crate::core::{Document, Result, StoreError};
use crate::facade::{
    Collection, CreateIndexOptions, Database, FindOneAndModifyOptions, UpdateOptions,
};
use crate::result::{HandleKind, RawValue};
use crate::storage::FindOptions;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Positional view over an argument list
struct Args<'a> {
    action: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(action: &'a str, values: &'a [Value]) -> Self {
        Self { action, values }
    }

    fn present(&self, position: usize) -> Option<&'a Value> {
        self.values.get(position).filter(|value| !value.is_null())
    }

    fn required<T: DeserializeOwned>(&self, position: usize, name: &str) -> Result<T> {
        let value = self.present(position).ok_or_else(|| {
            StoreError::BadValue(format!("{}: missing required argument '{}'", self.action, name))
        })?;
        self.decode(value, name)
    }

    fn optional<T: DeserializeOwned>(&self, position: usize, name: &str) -> Result<Option<T>> {
        self.present(position)
            .map(|value| self.decode(value, name))
            .transpose()
    }

    fn options<T: DeserializeOwned + Default>(&self, position: usize) -> Result<T> {
        Ok(self.optional(position, "options")?.unwrap_or_default())
    }

    fn decode<T: DeserializeOwned>(&self, value: &Value, name: &str) -> Result<T> {
        T::deserialize(value).map_err(|err| {
            StoreError::TypeMismatch(format!("{}: argument '{}' {}", self.action, name, err))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RenameOptions {
    drop_target: bool,
}

fn unknown(action: &str) -> StoreError {
    StoreError::CommandNotFound(action.to_string())
}

/// A driver object actions can be invoked on by name
#[async_trait]
pub trait ActionTarget: Send + Sync {
    async fn invoke(&self, action: &str, args: &[Value]) -> Result<RawValue>;
}

#[async_trait]
impl ActionTarget for Client {
    async fn invoke(&self, action: &str, values: &[Value]) -> Result<RawValue> {
        let args = Args::new(action, values);
        match action {
            // descriptors only, without the totals
            "listDatabases" => RawValue::serialize(&self.list_databases().await?.databases),
            "listDatabaseNames" => Ok(self.list_database_names().await?.into()),
            "dropDatabase" => {
                let name: String = args.required(0, "name")?;
                Ok(self.drop_database(&name).await?.into())
            }
            "ping" => Ok(self.ping().await?.into()),
            "serverStatus" => Ok(self.server_status().await?.into()),
            "buildInfo" => Ok(self.build_info().await?.into()),
            "db" => {
                let _: String = args.required(0, "name")?;
                Ok(HandleKind::Database.into())
            }
            _ => Err(unknown(action)),
        }
    }
}

#[async_trait]
impl ActionTarget for Database {
    async fn invoke(&self, action: &str, values: &[Value]) -> Result<RawValue> {
        let args = Args::new(action, values);
        match action {
            "stats" => {
                let stats = self.stats().await?;
                Ok(RawValue::Record(vec![
                    RawValue::field("db", stats.db),
                    RawValue::field("collections", stats.collections),
                    RawValue::field("objects", stats.objects),
                    RawValue::field("avgObjSize", stats.avg_obj_size),
                    RawValue::field("dataSize", stats.data_size),
                    RawValue::field("indexes", stats.indexes),
                    RawValue::field("ok", 1_u64),
                ]))
            }
            "listCollections" => {
                let filter: Option<Document> = args.optional(0, "filter")?;
                Ok(self.list_collections(filter).await?.into())
            }
            "listCollectionNames" => Ok(self.list_collection_names().await?.into()),
            "createCollection" => {
                let name: String = args.required(0, "name")?;
                self.create_collection(&name).await?;
                Ok(HandleKind::Collection.into())
            }
            "dropCollection" => {
                let name: String = args.required(0, "name")?;
                Ok(self.drop_collection(&name).await?.into())
            }
            "renameCollection" => {
                let from: String = args.required(0, "fromCollection")?;
                let to: String = args.required(1, "toCollection")?;
                let options: RenameOptions = args.options(2)?;
                self.rename_collection(&from, &to, options.drop_target).await?;
                Ok(HandleKind::Collection.into())
            }
            "dropDatabase" => Ok(self.drop_database().await?.into()),
            "collection" => {
                let _: String = args.required(0, "name")?;
                Ok(HandleKind::Collection.into())
            }
            _ => Err(unknown(action)),
        }
    }
}

#[async_trait]
impl ActionTarget for Collection {
    async fn invoke(&self, action: &str, values: &[Value]) -> Result<RawValue> {
        let args = Args::new(action, values);
        match action {
            "find" => {
                let filter: Option<Document> = args.optional(0, "filter")?;
                let options: FindOptions = args.options(1)?;
                Ok(self.find(filter, options).await?.into())
            }
            "findOne" => {
                let filter: Option<Document> = args.optional(0, "filter")?;
                let options: FindOptions = args.options(1)?;
                Ok(RawValue::optional_document(self.find_one(filter, options).await?))
            }
            "insertOne" => {
                let doc: Document = args.required(0, "doc")?;
                RawValue::serialize(&self.insert_one(doc).await?)
            }
            "insertMany" => {
                let docs: Vec<Document> = args.required(0, "docs")?;
                RawValue::serialize(&self.insert_many(docs).await?)
            }
            "updateOne" | "updateMany" | "replaceOne" => {
                let filter: Document = args.required(0, "filter")?;
                let update: Document = args.required(1, if action == "replaceOne" { "replacement" } else { "update" })?;
                let options: UpdateOptions = args.options(2)?;
                let result = match action {
                    "updateOne" => self.update_one(filter, update, options).await?,
                    "updateMany" => self.update_many(filter, update, options).await?,
                    _ => self.replace_one(filter, update, options).await?,
                };
                RawValue::serialize(&result)
            }
            "deleteOne" => {
                let filter: Document = args.required(0, "filter")?;
                RawValue::serialize(&self.delete_one(filter).await?)
            }
            "deleteMany" => {
                let filter: Document = args.required(0, "filter")?;
                RawValue::serialize(&self.delete_many(filter).await?)
            }
            "findOneAndUpdate" => {
                let filter: Document = args.required(0, "filter")?;
                let update: Document = args.required(1, "update")?;
                let options: FindOneAndModifyOptions = args.options(2)?;
                Ok(RawValue::optional_document(
                    self.find_one_and_update(filter, update, options).await?,
                ))
            }
            "findOneAndDelete" => {
                let filter: Document = args.required(0, "filter")?;
                let options: FindOneAndModifyOptions = args.options(1)?;
                Ok(RawValue::optional_document(
                    self.find_one_and_delete(filter, options).await?,
                ))
            }
            "countDocuments" => {
                let filter: Option<Document> = args.optional(0, "filter")?;
                Ok(self.count_documents(filter).await?.into())
            }
            "estimatedDocumentCount" => Ok(self.estimated_document_count().await?.into()),
            "distinct" => {
                let field: String = args.required(0, "key")?;
                let filter: Option<Document> = args.optional(1, "filter")?;
                Ok(self.distinct(&field, filter).await?.into())
            }
            "aggregate" => {
                let pipeline: Option<Vec<Document>> = args.optional(0, "pipeline")?;
                Ok(self.aggregate(pipeline.unwrap_or_default()).await?.into())
            }
            "createIndex" => {
                let keys: Document = args.required(0, "indexSpec")?;
                let options: CreateIndexOptions = args.options(1)?;
                Ok(self.create_index(keys, options).await?.into())
            }
            "listIndexes" => Ok(self.list_indexes().await?.into()),
            "drop" => Ok(self.drop().await?.into()),
            _ => Err(unknown(action)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_counts_as_absent() {
        let values = vec![Value::Null, json!({"limit": 2})];
        let args = Args::new("find", &values);
        let filter: Option<Document> = args.optional(0, "filter").unwrap();
        assert!(filter.is_none());
        let options: FindOptions = args.options(1).unwrap();
        assert_eq!(options.limit, Some(2));
    }

    #[test]
    fn test_missing_and_mistyped_arguments() {
        let values = vec![json!(42)];
        let args = Args::new("insertOne", &values);

        let wrong = args.required::<Document>(0, "doc").unwrap_err();
        assert_eq!(wrong.code(), 14);
        assert!(wrong.to_string().contains("insertOne"));

        let missing = args.required::<Document>(1, "other").unwrap_err();
        assert_eq!(missing.code(), 2);
    }

    #[test]
    fn test_surplus_arguments_ignored() {
        let values = vec![json!("users"), json!("extra"), json!({"more": true})];
        let args = Args::new("dropCollection", &values);
        let name: String = args.required(0, "name").unwrap();
        assert_eq!(name, "users");
    }
}
