use crate::core::value::{get_path, values_equal};
use crate::core::{Document, Result, StoreError};
use crate::json::{self, ID_FIELD};
use serde::Serialize;
use serde_json::{Map, Value};

pub const ID_INDEX_NAME: &str = "_id_";

/// Secondary index definition. Only uniqueness is enforced; lookups scan.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSpec {
    pub v: u8,
    pub key: Document,
    pub name: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(key: Document, name: Option<String>, unique: bool) -> Self {
        let name = name.unwrap_or_else(|| default_index_name(&key));
        Self { v: 2, key, name, unique }
    }

    fn key_of(&self, doc: &Document) -> Vec<Value> {
        self.key
            .keys()
            .map(|path| get_path(doc, path).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// `{a: 1, b: -1}` -> `a_1_b_-1`
fn default_index_name(key: &Document) -> String {
    key.iter()
        .map(|(field, direction)| format!("{}_{}", field, direction))
        .collect::<Vec<_>>()
        .join("_")
}

/// Documents and indexes of one collection
#[derive(Debug, Clone)]
pub struct CollectionData {
    namespace: String,
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl CollectionData {
    pub fn new(namespace: String) -> Self {
        let mut id_key = Map::new();
        id_key.insert(ID_FIELD.to_string(), Value::from(1));

        Self {
            namespace,
            documents: Vec::new(),
            indexes: vec![IndexSpec {
                v: 2,
                key: id_key,
                name: ID_INDEX_NAME.to_string(),
                unique: true,
            }],
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set_namespace(&mut self, namespace: String) {
        self.namespace = namespace;
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Approximate data size: serialized length of every document
    pub fn data_size(&self) -> u64 {
        self.documents
            .iter()
            .map(|doc| serde_json::to_vec(doc).map(|bytes| bytes.len() as u64).unwrap_or(0))
            .sum()
    }

    /// Copy of the current documents, used by cursors
    pub fn snapshot(&self) -> Vec<Document> {
        self.documents.clone()
    }

    pub fn get(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    /// Positions of matching documents, in natural order
    pub fn find_positions(&self, filter: &Document, limit: Option<usize>) -> Result<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, doc) in self.documents.iter().enumerate() {
            if limit.is_some_and(|limit| positions.len() >= limit) {
                break;
            }
            if json::matches(doc, filter)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    /// Inserts a document, generating `_id` when absent; returns the `_id`.
    pub fn insert(&mut self, mut doc: Document) -> Result<Value> {
        let id = match doc.get(ID_FIELD) {
            Some(Value::Array(_)) => {
                return Err(StoreError::BadValue("can't use an array for _id".into()));
            }
            Some(id) => id.clone(),
            None => {
                let id = Value::String(uuid::Uuid::new_v4().simple().to_string());
                let mut with_id = Map::with_capacity(doc.len() + 1);
                with_id.insert(ID_FIELD.to_string(), id.clone());
                with_id.append(&mut doc);
                doc = with_id;
                id
            }
        };

        self.check_unique(&doc, None)?;
        self.documents.push(doc);
        Ok(id)
    }

    /// Replaces the document at `position` after checking unique indexes.
    pub fn store(&mut self, position: usize, doc: Document) -> Result<()> {
        self.check_unique(&doc, Some(position))?;
        match self.documents.get_mut(position) {
            Some(slot) => {
                *slot = doc;
                Ok(())
            }
            None => Err(StoreError::BadValue(format!("no document at position {}", position))),
        }
    }

    /// Removes the documents at the given positions
    pub fn remove_positions(&mut self, positions: &[usize]) -> usize {
        let mut position = 0;
        let before = self.documents.len();
        self.documents.retain(|_| {
            let keep = !positions.contains(&position);
            position += 1;
            keep
        });
        before - self.documents.len()
    }

    /// Registers an index, rejecting unique indexes the existing data violates.
    pub fn create_index(&mut self, spec: IndexSpec) -> Result<String> {
        if spec.key.is_empty() {
            return Err(StoreError::BadValue("Index keys cannot be empty".into()));
        }

        if let Some(existing) = self.indexes.iter().find(|index| index.name == spec.name) {
            if existing.key == spec.key && existing.unique == spec.unique {
                return Ok(existing.name.clone());
            }
            return Err(StoreError::BadValue(format!(
                "An existing index has the same name as the requested index: {}",
                spec.name
            )));
        }

        if spec.unique {
            for (position, doc) in self.documents.iter().enumerate() {
                let key = spec.key_of(doc);
                let clash = self.documents[position + 1..]
                    .iter()
                    .any(|other| keys_equal(&spec.key_of(other), &key));
                if clash {
                    return Err(self.duplicate(&spec, &key));
                }
            }
        }

        let name = spec.name.clone();
        self.indexes.push(spec);
        Ok(name)
    }

    fn check_unique(&self, doc: &Document, skip: Option<usize>) -> Result<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let key = index.key_of(doc);
            let clash = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != skip)
                .any(|(_, other)| keys_equal(&index.key_of(other), &key));
            if clash {
                return Err(self.duplicate(index, &key));
            }
        }
        Ok(())
    }

    fn duplicate(&self, index: &IndexSpec, key: &[Value]) -> StoreError {
        let fields = index
            .key
            .keys()
            .zip(key)
            .map(|(field, value)| format!("{}: {}", field, value))
            .collect::<Vec<_>>()
            .join(", ");

        StoreError::DuplicateKey {
            ns: format!("{} index: {}", self.namespace, index.name),
            key: format!("{{ {} }}", fields),
        }
    }
}

fn keys_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_generates_leading_id() {
        let mut data = CollectionData::new("shop.users".into());
        let id = data.insert(doc(json!({"name": "ann"}))).unwrap();
        assert!(id.is_string());

        let stored = data.get(0).unwrap();
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stored.get("name"), Some(&json!("ann")));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut data = CollectionData::new("shop.users".into());
        data.insert(doc(json!({"_id": 1}))).unwrap();
        let err = data.insert(doc(json!({"_id": 1.0}))).unwrap_err();
        assert_eq!(err.code(), 11000);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_unique_index_enforced() {
        let mut data = CollectionData::new("shop.users".into());
        data.insert(doc(json!({"email": "a@x"}))).unwrap();
        data.insert(doc(json!({"email": "a@x"}))).unwrap();

        let spec = IndexSpec::new(doc(json!({"email": 1})), None, true);
        assert!(data.create_index(spec).is_err());

        data.remove_positions(&[1]);
        let name = data
            .create_index(IndexSpec::new(doc(json!({"email": 1})), None, true))
            .unwrap();
        assert_eq!(name, "email_1");
        assert!(data.insert(doc(json!({"email": "a@x"}))).is_err());
        assert_eq!(data.indexes().len(), 2);
    }

    #[test]
    fn test_find_positions_with_limit() {
        let mut data = CollectionData::new("t.c".into());
        for n in 0..5 {
            data.insert(doc(json!({"n": n}))).unwrap();
        }
        let filter = doc(json!({"n": {"$gte": 1}}));
        assert_eq!(data.find_positions(&filter, None).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(data.find_positions(&filter, Some(2)).unwrap(), vec![1, 2]);
    }
}
