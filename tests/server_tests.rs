use docgate::{Deployment, GatewayConfig, GatewayServer};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::net::TcpListener;

async fn start(store: &str) -> SocketAddr {
    let config = GatewayConfig {
        connection: format!("docstore://{store}"),
        web_host: "127.0.0.1".into(),
        web_port: 0,
        ..Default::default()
    };
    let server = GatewayServer::new(config).expect("server");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    tokio::spawn(server.serve_on(listener));
    address
}

#[tokio::test]
async fn serves_actions_over_http() {
    let deployment = Deployment::builder("server-live:1").start().expect("deployment");
    let address = start("server-live:1").await;
    let http = reqwest::Client::new();

    let inserted: Value = http
        .post(format!("http://{address}/mydb/users/_insertOne/"))
        .json(&json!([{"name": "ann", "age": 34}]))
        .send()
        .await
        .expect("insert")
        .json()
        .await
        .expect("insert body");
    assert_eq!(inserted["acknowledged"], json!(true));

    let response = http
        .post(format!("http://{address}/mydb/users/_find/"))
        .json(&json!([{"age": {"$gt": 21}}]))
        .send()
        .await
        .expect("find");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let found: Value = response.json().await.expect("find body");
    assert_eq!(found[0]["name"], json!("ann"));
    assert_eq!(found[0]["_id"], inserted["insertedId"]);

    let response = http
        .get(format!("http://{address}/mydb/users/_find/"))
        .send()
        .await
        .expect("get");
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

    let response = http
        .post(format!("http://{address}/_ping/"))
        .basic_auth("someone", Some("secret"))
        .body("[]")
        .send()
        .await
        .expect("ping");
    // the deployment has no accounts, so any presented credential is rejected
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("error body");
    assert_eq!(body["error"]["reason"], json!("connection_failed"));

    assert_eq!(deployment.open_connections(), 0);
    deployment.shutdown();
}

#[tokio::test]
async fn invalid_connection_string_is_fatal() {
    let config = GatewayConfig {
        connection: "postgres://localhost".into(),
        ..Default::default()
    };
    assert!(GatewayServer::new(config).is_err());
}
