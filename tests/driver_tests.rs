use docgate::facade::{CreateIndexOptions, FindOneAndModifyOptions, ReturnDocument, UpdateOptions};
use docgate::storage::FindOptions;
use docgate::{Client, Collection, Deployment, Document, Permission, StoreError};
use serde_json::{Value, json};
use std::sync::Arc;

fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("object")
}

async fn connect(address: &str) -> (Arc<Deployment>, Client) {
    let deployment = Deployment::builder(address).start().expect("deployment");
    let client = Client::connect_url(&format!("docstore://{address}"))
        .await
        .expect("client");
    (deployment, client)
}

async fn inventory(collection: &Collection) {
    collection
        .insert_many(vec![
            doc(json!({"_id": "a", "item": "journal", "qty": 25, "tags": ["blank", "red"]})),
            doc(json!({"_id": "b", "item": "notebook", "qty": 50, "tags": ["red"]})),
            doc(json!({"_id": "c", "item": "paper", "qty": 100, "tags": ["plain"]})),
            doc(json!({"_id": "d", "item": "planner", "qty": 75, "size": {"h": 22.85}})),
        ])
        .await
        .expect("seed");
}

#[tokio::test]
async fn find_with_operators_and_options() {
    let (deployment, client) = connect("driver-find:1").await;
    let items = client.database("store").collection("inventory");
    inventory(&items).await;

    let red = items
        .find(Some(doc(json!({"tags": "red"}))), FindOptions::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(red.len(), 2);

    let options = FindOptions {
        sort: Some(doc(json!({"qty": -1}))),
        skip: Some(1),
        limit: Some(2),
        projection: Some(doc(json!({"item": 1}))),
    };
    let page = items
        .find(Some(doc(json!({"qty": {"$gte": 25}}))), options)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        page,
        vec![doc(json!({"_id": "d", "item": "planner"})), doc(json!({"_id": "b", "item": "notebook"}))]
    );

    let nested = items
        .find_one(Some(doc(json!({"size.h": {"$lt": 30}}))), FindOptions::default())
        .await
        .unwrap()
        .expect("planner");
    assert_eq!(nested.get("item"), Some(&json!("planner")));

    let regex = items
        .count_documents(Some(doc(json!({"item": {"$regex": "^P", "$options": "i"}}))))
        .await
        .unwrap();
    assert_eq!(regex, 2);
    deployment.shutdown();
}

#[tokio::test]
async fn missing_collection_reads_as_empty() {
    let (deployment, client) = connect("driver-empty:1").await;
    let ghost = client.database("store").collection("ghost");

    assert!(ghost.find(None, FindOptions::default()).await.unwrap().try_collect().await.unwrap().is_empty());
    assert_eq!(ghost.estimated_document_count().await.unwrap(), 0);
    assert!(ghost.find_one(None, FindOptions::default()).await.unwrap().is_none());
    assert!(matches!(ghost.list_indexes().await, Err(StoreError::NamespaceNotFound(_))));
    assert!(!ghost.drop().await.unwrap());
    deployment.shutdown();
}

#[tokio::test]
async fn updates_and_upserts() {
    let (deployment, client) = connect("driver-update:1").await;
    let items = client.database("store").collection("inventory");
    inventory(&items).await;

    let result = items
        .update_many(
            doc(json!({"tags": "red"})),
            doc(json!({"$inc": {"qty": 1}, "$push": {"tags": "sale"}})),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (2, 2));

    // setting a value to itself matches without modifying
    let result = items
        .update_one(doc(json!({"_id": "c"})), doc(json!({"$set": {"qty": 100}})), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 0));

    let result = items
        .update_one(
            doc(json!({"item": "pen"})),
            doc(json!({"$set": {"qty": 5}})),
            UpdateOptions { upsert: true },
        )
        .await
        .unwrap();
    assert_eq!(result.upserted_count, 1);
    let upserted = items
        .find_one(Some(doc(json!({"item": "pen"}))), FindOptions::default())
        .await
        .unwrap()
        .expect("upserted");
    assert_eq!(upserted.get("qty"), Some(&json!(5)));
    assert_eq!(upserted.get("_id"), result.upserted_id.as_ref());

    let err = items
        .update_one(doc(json!({})), doc(json!({"qty": 1})), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), 9);

    let err = items
        .update_one(doc(json!({"_id": "a"})), doc(json!({"$set": {"_id": "z"}})), UpdateOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("_id"));
    deployment.shutdown();
}

#[tokio::test]
async fn replace_keeps_id() {
    let (deployment, client) = connect("driver-replace:1").await;
    let items = client.database("store").collection("inventory");
    inventory(&items).await;

    let result = items
        .replace_one(doc(json!({"_id": "b"})), doc(json!({"item": "sketchbook"})), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(result.modified_count, 1);

    let replaced = items
        .find_one(Some(doc(json!({"_id": "b"}))), FindOptions::default())
        .await
        .unwrap()
        .expect("replaced");
    assert_eq!(replaced, doc(json!({"_id": "b", "item": "sketchbook"})));

    assert!(
        items
            .replace_one(doc(json!({"_id": "b"})), doc(json!({"$set": {"a": 1}})), UpdateOptions::default())
            .await
            .is_err()
    );
    deployment.shutdown();
}

#[tokio::test]
async fn find_and_modify() {
    let (deployment, client) = connect("driver-fam:1").await;
    let items = client.database("store").collection("inventory");
    inventory(&items).await;

    let before = items
        .find_one_and_update(
            doc(json!({"qty": {"$gt": 30}})),
            doc(json!({"$set": {"qty": 0}})),
            FindOneAndModifyOptions {
                sort: Some(doc(json!({"qty": -1}))),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("paper");
    assert_eq!(before.get("qty"), Some(&json!(100)));

    let after = items
        .find_one_and_update(
            doc(json!({"_id": "a"})),
            doc(json!({"$unset": {"tags": ""}})),
            FindOneAndModifyOptions {
                return_document: ReturnDocument::After,
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("journal");
    assert!(after.get("tags").is_none());

    let deleted = items
        .find_one_and_delete(doc(json!({"item": "planner"})), FindOneAndModifyOptions::default())
        .await
        .unwrap()
        .expect("planner");
    assert_eq!(deleted.get("_id"), Some(&json!("d")));
    assert_eq!(items.estimated_document_count().await.unwrap(), 3);

    let nothing = items
        .find_one_and_delete(doc(json!({"item": "planner"})), FindOneAndModifyOptions::default())
        .await
        .unwrap();
    assert!(nothing.is_none());
    deployment.shutdown();
}

#[tokio::test]
async fn deletes() {
    let (deployment, client) = connect("driver-delete:1").await;
    let items = client.database("store").collection("inventory");
    inventory(&items).await;

    assert_eq!(items.delete_one(doc(json!({"tags": "red"}))).await.unwrap().deleted_count, 1);
    assert_eq!(
        items
            .delete_many(doc(json!({"qty": {"$in": [50, 100]}})))
            .await
            .unwrap()
            .deleted_count,
        2
    );
    assert_eq!(items.count_documents(None).await.unwrap(), 1);
    deployment.shutdown();
}

#[tokio::test]
async fn unique_indexes() {
    let (deployment, client) = connect("driver-index:1").await;
    let users = client.database("app").collection("users");

    let name = users
        .create_index(
            doc(json!({"email": 1})),
            CreateIndexOptions {
                unique: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(name, "email_1");

    users.insert_one(doc(json!({"email": "a@x.io"}))).await.unwrap();
    let err = users.insert_one(doc(json!({"email": "a@x.io"}))).await.unwrap_err();
    assert_eq!(err.code(), 11000);

    let indexes = users.list_indexes().await.unwrap().try_collect().await.unwrap();
    let names: Vec<_> = indexes.iter().filter_map(|index| index.get("name")).collect();
    assert_eq!(names, vec![&json!("_id_"), &json!("email_1")]);
    deployment.shutdown();
}

#[tokio::test]
async fn insert_many_is_ordered() {
    let (deployment, client) = connect("driver-ordered:1").await;
    let items = client.database("store").collection("inventory");

    let err = items
        .insert_many(vec![doc(json!({"_id": 1})), doc(json!({"_id": 1})), doc(json!({"_id": 2}))])
        .await
        .unwrap_err();
    assert_eq!(err.code(), 11000);
    assert_eq!(items.count_documents(None).await.unwrap(), 1);

    assert!(items.insert_many(Vec::new()).await.is_err());
    deployment.shutdown();
}

#[tokio::test]
async fn database_level_operations() {
    let (deployment, client) = connect("driver-db:1").await;
    let db = client.database("app");

    db.create_collection("a").await.unwrap();
    assert!(matches!(db.create_collection("a").await, Err(StoreError::NamespaceExists(_))));
    db.collection("b").insert_one(doc(json!({"x": 1}))).await.unwrap();
    assert_eq!(db.list_collection_names().await.unwrap(), vec!["a", "b"]);

    db.rename_collection("b", "c", false).await.unwrap();
    assert_eq!(db.list_collection_names().await.unwrap(), vec!["a", "c"]);
    assert!(db.rename_collection("a", "c", false).await.is_err());
    db.rename_collection("a", "c", true).await.unwrap();
    assert_eq!(db.list_collection_names().await.unwrap(), vec!["c"]);

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.collections, 1);
    assert_eq!(stats.objects, 0);
    assert!(stats.avg_obj_size.is_nan());

    assert!(db.drop_collection("c").await.unwrap());
    assert!(!db.drop_database().await.unwrap());

    let err = client.database("bad.name").stats().await.unwrap_err();
    assert_eq!(err.code(), 73);
    deployment.shutdown();
}

#[tokio::test]
async fn read_only_users_cannot_write() {
    let deployment = Deployment::builder("driver-perm:1")
        .user("viewer", "pw", vec![Permission::Read])
        .require_auth(true)
        .bcrypt_cost(4)
        .start()
        .expect("deployment");
    let client = Client::connect_url("docstore://viewer:pw@driver-perm:1").await.unwrap();
    let items = client.database("store").collection("inventory");

    assert_eq!(items.count_documents(None).await.unwrap(), 0);
    let err = items.insert_one(doc(json!({"a": 1}))).await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized(_)));
    assert!(client.drop_database("store").await.is_err());
    deployment.shutdown();
}
