//! Lazy query results
//!
//! A [`Cursor`] owns a snapshot of the collection taken when the query was
//! issued and evaluates the query as documents are pulled. Plain filtered
//! scans stream document by document; sorts and aggregation pipelines are
//! deferred until the first pull and then buffered; large snapshots are
//! processed on the blocking pool.

use crate::core::value::compare_values;
use crate::core::{Document, Result, StoreError};
use crate::json::{self, compare_by_sort};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::vec;

/// Documents pulled between two cooperative yields
const BATCH_SIZE: usize = 101;

/// Snapshots at least this large are sorted or aggregated on the blocking pool
const BLOCKING_THRESHOLD: usize = 1_000;

/// Options accepted by `find` / `findOne`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindOptions {
    /// A limit of 0 means "no limit"; negative limits behave like positive ones
    fn effective_limit(&self) -> Option<u64> {
        self.limit.map(i64::unsigned_abs).filter(|limit| *limit > 0)
    }
}

type Deferred = Box<dyn FnOnce() -> Result<Vec<Document>> + Send>;

enum CursorState {
    Scanning {
        source: vec::IntoIter<Document>,
        filter: Document,
        projection: Option<Document>,
        skip: u64,
        remaining: Option<u64>,
    },
    Deferred { work: Deferred, snapshot_len: usize },
    Buffered(vec::IntoIter<Document>),
    Exhausted,
}

pub struct Cursor {
    namespace: String,
    state: CursorState,
    pulled: usize,
}

impl Cursor {
    /// Cursor over a `find` query
    pub fn find(namespace: String, snapshot: Vec<Document>, filter: Document, options: FindOptions) -> Self {
        let snapshot_len = snapshot.len();
        let state = match options.sort.clone() {
            None => CursorState::Scanning {
                source: snapshot.into_iter(),
                filter,
                projection: options.projection.clone(),
                skip: options.skip.unwrap_or(0),
                remaining: options.effective_limit(),
            },
            Some(sort) => CursorState::Deferred {
                snapshot_len,
                work: Box::new(move || {
                    let mut matched = Vec::new();
                    for doc in snapshot {
                        if json::matches(&doc, &filter)? {
                            matched.push(doc);
                        }
                    }
                    matched.sort_by(|a, b| compare_by_sort(a, b, &sort));
                    let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
                    let limit = options
                        .effective_limit()
                        .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
                    matched
                        .into_iter()
                        .skip(skip)
                        .take(limit)
                        .map(|doc| project_optional(&doc, options.projection.as_ref()))
                        .collect()
                }),
            },
        };

        Self {
            namespace,
            state,
            pulled: 0,
        }
    }

    /// Cursor over an aggregation pipeline
    pub fn aggregate(namespace: String, snapshot: Vec<Document>, pipeline: Vec<Document>) -> Self {
        Self {
            namespace,
            state: CursorState::Deferred {
                snapshot_len: snapshot.len(),
                work: Box::new(move || run_pipeline(snapshot, &pipeline)),
            },
            pulled: 0,
        }
    }

    /// Cursor over documents that are already computed (listings)
    pub fn from_documents(namespace: String, documents: Vec<Document>) -> Self {
        Self {
            namespace,
            state: CursorState::Buffered(documents.into_iter()),
            pulled: 0,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Pulls the next document, or `None` once the cursor is exhausted.
    pub async fn next(&mut self) -> Option<Result<Document>> {
        self.pulled += 1;
        if self.pulled % BATCH_SIZE == 0 {
            tokio::task::yield_now().await;
        }

        loop {
            match &mut self.state {
                CursorState::Exhausted => return None,
                CursorState::Buffered(documents) => match documents.next() {
                    Some(doc) => return Some(Ok(doc)),
                    None => self.state = CursorState::Exhausted,
                },
                CursorState::Deferred { .. } => {
                    let CursorState::Deferred { work, snapshot_len } =
                        std::mem::replace(&mut self.state, CursorState::Exhausted)
                    else {
                        continue;
                    };
                    match run_deferred(work, snapshot_len).await {
                        Ok(documents) => self.state = CursorState::Buffered(documents.into_iter()),
                        Err(err) => return Some(Err(err)),
                    }
                }
                CursorState::Scanning {
                    source,
                    filter,
                    projection,
                    skip,
                    remaining,
                } => {
                    if *remaining == Some(0) {
                        self.state = CursorState::Exhausted;
                        continue;
                    }
                    let Some(doc) = source.next() else {
                        self.state = CursorState::Exhausted;
                        continue;
                    };
                    match json::matches(&doc, filter) {
                        Err(err) => {
                            self.state = CursorState::Exhausted;
                            return Some(Err(err));
                        }
                        Ok(false) => continue,
                        Ok(true) if *skip > 0 => {
                            *skip -= 1;
                            continue;
                        }
                        Ok(true) => {
                            if let Some(remaining) = remaining.as_mut() {
                                *remaining -= 1;
                            }
                            let projected = project_optional(&doc, projection.as_ref());
                            if projected.is_err() {
                                self.state = CursorState::Exhausted;
                            }
                            return Some(projected);
                        }
                    }
                }
            }
        }
    }

    /// Turns the cursor into a stream of documents
    pub fn into_stream(self) -> BoxStream<'static, Result<Document>> {
        stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
        .boxed()
    }

    /// Drains the cursor into memory
    pub async fn try_collect(self) -> Result<Vec<Document>> {
        self.into_stream().try_collect().await
    }
}

async fn run_deferred(work: Deferred, snapshot_len: usize) -> Result<Vec<Document>> {
    if snapshot_len < BLOCKING_THRESHOLD {
        return work();
    }
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| StoreError::Internal(format!("query task failed: {}", err)))?
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("namespace", &self.namespace)
            .field("pulled", &self.pulled)
            .finish_non_exhaustive()
    }
}

fn project_optional(doc: &Document, projection: Option<&Document>) -> Result<Document> {
    match projection {
        Some(projection) => json::project(doc, projection),
        None => Ok(doc.clone()),
    }
}

fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((operator, argument)), None) = (entries.next(), entries.next()) else {
            return Err(StoreError::BadValue(
                "A pipeline stage specification object must contain exactly one field.".into(),
            ));
        };

        documents = match operator.as_str() {
            "$match" => {
                let filter = stage_object(operator, argument)?;
                let mut kept = Vec::with_capacity(documents.len());
                for doc in documents {
                    if json::matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => {
                let sort = stage_object(operator, argument)?;
                if sort.is_empty() {
                    return Err(StoreError::BadValue("$sort stage must have at least one sort key".into()));
                }
                documents.sort_by(|a, b| compare_by_sort(a, b, sort));
                documents
            }
            "$skip" => {
                let skip = stage_count(operator, argument)?;
                documents.into_iter().skip(skip).collect()
            }
            "$limit" => {
                let limit = stage_count(operator, argument)?;
                if limit == 0 {
                    return Err(StoreError::BadValue("the limit must be positive".into()));
                }
                documents.into_iter().take(limit).collect()
            }
            "$project" => {
                let projection = stage_object(operator, argument)?;
                documents
                    .iter()
                    .map(|doc| json::project(doc, projection))
                    .collect::<Result<Vec<_>>>()?
            }
            "$count" => {
                let field = argument
                    .as_str()
                    .filter(|f| !f.is_empty() && !f.starts_with('$') && !f.contains('.'))
                    .ok_or_else(|| StoreError::BadValue("the count field must be a non-empty string".into()))?;
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Map::new();
                    counted.insert(field.to_string(), Value::from(documents.len()));
                    vec![counted]
                }
            }
            other => {
                return Err(StoreError::BadValue(format!(
                    "Unrecognized pipeline stage name: '{}'",
                    other
                )));
            }
        };
    }

    Ok(documents)
}

fn stage_object<'a>(operator: &str, argument: &'a Value) -> Result<&'a Document> {
    argument
        .as_object()
        .ok_or_else(|| StoreError::TypeMismatch(format!("the {} stage specification must be an object", operator)))
}

fn stage_count(operator: &str, argument: &Value) -> Result<usize> {
    argument
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| StoreError::BadValue(format!("invalid argument to {} stage: {}", operator, argument)))
}

/// Distinct values of `field` among `documents`, array values flattened
pub fn distinct_values(documents: &[Document], field: &str) -> Vec<Value> {
    let mut values: Vec<Value> = Vec::new();
    let mut push = |value: &Value| {
        if !values.iter().any(|seen| crate::core::value::values_equal(seen, value)) {
            values.push(value.clone());
        }
    };

    for doc in documents {
        match crate::core::value::get_path(doc, field) {
            Some(Value::Array(items)) => items.iter().for_each(&mut push),
            Some(value) => push(value),
            None => {}
        }
    }

    values.sort_by(compare_values);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    fn docs(values: Value) -> Vec<Document> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn people() -> Vec<Document> {
        docs(json!([
            {"_id": 1, "name": "ann", "age": 34},
            {"_id": 2, "name": "bob", "age": 19},
            {"_id": 3, "name": "cid", "age": 52},
            {"_id": 4, "name": "dee", "age": 27}
        ]))
    }

    #[tokio::test]
    async fn test_scan_with_skip_limit_projection() {
        let options = FindOptions {
            projection: Some(doc(json!({"name": 1, "_id": 0}))),
            skip: Some(1),
            limit: Some(2),
            ..Default::default()
        };
        let cursor = Cursor::find("t.people".into(), people(), doc(json!({"age": {"$gt": 21}})), options);
        let found = cursor.try_collect().await.unwrap();
        assert_eq!(found, docs(json!([{"name": "cid"}, {"name": "dee"}])));
    }

    #[tokio::test]
    async fn test_sorted_find_is_deferred_until_pulled() {
        let options = FindOptions {
            sort: Some(doc(json!({"age": -1}))),
            limit: Some(-2),
            ..Default::default()
        };
        let mut cursor = Cursor::find("t.people".into(), people(), Map::new(), options);
        assert_eq!(cursor.next().await.unwrap().unwrap().get("age"), Some(&json!(52)));
        assert_eq!(cursor.next().await.unwrap().unwrap().get("age"), Some(&json!(34)));
        assert!(cursor.next().await.is_none());
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn test_large_sort_leaves_the_worker_free() {
        let snapshot: Vec<Document> = (0..BLOCKING_THRESHOLD * 4)
            .map(|n| doc(json!({"_id": n, "rank": (n * 7919) % 1000})))
            .collect();
        let options = FindOptions {
            sort: Some(doc(json!({"rank": 1, "_id": 1}))),
            limit: Some(3),
            ..Default::default()
        };
        let mut cursor = Cursor::find("t.big".into(), snapshot, Map::new(), options);

        // single-threaded runtime: the ticker only runs if the sort yields the worker
        let ticked = Arc::new(AtomicBool::new(false));
        let ticker = tokio::spawn({
            let ticked = Arc::clone(&ticked);
            async move { ticked.store(true, AtomicOrdering::SeqCst) }
        });

        let first = cursor.next().await.unwrap().unwrap();
        assert!(ticked.load(AtomicOrdering::SeqCst));
        assert_eq!(first.get("rank"), Some(&json!(0)));
        assert_eq!(cursor.try_collect().await.unwrap().len(), 2);
        ticker.await.unwrap();
    }

    #[tokio::test]
    async fn test_large_pipeline_runs_off_the_worker() {
        let snapshot: Vec<Document> = (0..BLOCKING_THRESHOLD * 2).map(|n| doc(json!({"n": n}))).collect();
        let pipeline = docs(json!([{"$match": {"n": {"$gte": 10}}}, {"$count": "total"}]));
        let counted = Cursor::aggregate("t.big".into(), snapshot, pipeline)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(counted, docs(json!([{"total": BLOCKING_THRESHOLD * 2 - 10}])));
    }

    #[tokio::test]
    async fn test_filter_errors_surface_while_pulling() {
        let cursor = Cursor::find(
            "t.people".into(),
            people(),
            doc(json!({"age": {"$bogus": 1}})),
            FindOptions::default(),
        );
        assert!(cursor.try_collect().await.is_err());
    }

    #[tokio::test]
    async fn test_pipeline() {
        let pipeline = docs(json!([
            {"$match": {"age": {"$gte": 20}}},
            {"$sort": {"name": -1}},
            {"$skip": 1},
            {"$project": {"name": 1}}
        ]));
        let result = Cursor::aggregate("t.people".into(), people(), pipeline)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(result, docs(json!([{"_id": 3, "name": "cid"}, {"_id": 1, "name": "ann"}])));

        let counted = Cursor::aggregate("t.people".into(), people(), docs(json!([{"$count": "total"}])))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(counted, docs(json!([{"total": 4}])));
    }

    #[tokio::test]
    async fn test_unknown_stage() {
        let result = Cursor::aggregate("t.p".into(), people(), docs(json!([{"$lookup": {}}])))
            .try_collect()
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_distinct_flattens_arrays() {
        let documents = docs(json!([{"t": ["a", "b"]}, {"t": "b"}, {"t": 1}, {}]));
        assert_eq!(distinct_values(&documents, "t"), vec![json!(1), json!("a"), json!("b")]);
    }
}
