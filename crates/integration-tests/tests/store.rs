mod harness;

use std::time::Duration;

use harness::config::ConfigBuilder;
use harness::mock_upstream::MockUpstream;
use harness::server::TestServer;

async fn poll_until_terminal(server: &TestServer, id: &str) -> serde_json::Value {
    for _ in 0..50 {
        let body: serde_json::Value = server
            .client()
            .get(server.url(&format!("/v1/responses/{id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        match body["status"].as_str() {
            Some("queued" | "in_progress") => tokio::time::sleep(Duration::from_millis(50)).await,
            _ => return body,
        }
    }
    panic!("response {id} never reached a terminal status");
}

#[tokio::test]
async fn response_is_created_executed_and_fetchable() {
    let mock = MockUpstream::builder().models(&["m1"]).content("stored answer").start().await.unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .with_provider("mock", &mock.base_url())
        .with_store_path(&store_dir.path().join("db"))
        .build();
    let server = TestServer::start(config).await.unwrap();

    let created: serde_json::Value = server
        .client()
        .post(server.url("/v1/responses"))
        .json(&serde_json::json!({"model": "m1", "input": "say something"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let id = created["id"].as_str().unwrap().to_owned();
    assert!(id.starts_with("resp_"));
    assert_eq!(created["status"], "queued");

    let finished = poll_until_terminal(&server, &id).await;
    assert_eq!(finished["status"], "completed");
    assert_eq!(
        finished["output"][0]["content"][0]["text"].as_str().unwrap(),
        "stored answer"
    );
}

#[tokio::test]
async fn failed_completion_marks_response_failed() {
    let store_dir = tempfile::tempdir().unwrap();
    // Static model keeps routing alive while the upstream is unreachable
    let config = ConfigBuilder::new()
        .with_static_provider("ghost", "http://127.0.0.1:1/v1", &["m-ghost"])
        .with_store_path(&store_dir.path().join("db"))
        .build();
    let server = TestServer::start(config).await.unwrap();

    let created: serde_json::Value = server
        .client()
        .post(server.url("/v1/responses"))
        .json(&serde_json::json!({"model": "m-ghost", "input": "hello"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let id = created["id"].as_str().unwrap().to_owned();
    let finished = poll_until_terminal(&server, &id).await;
    assert_eq!(finished["status"], "failed");
    assert!(finished["error"]["message"].is_string());
}

#[tokio::test]
async fn response_delete_and_missing_lookup() {
    let mock = MockUpstream::builder().models(&["m1"]).start().await.unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .with_provider("mock", &mock.base_url())
        .with_store_path(&store_dir.path().join("db"))
        .build();
    let server = TestServer::start(config).await.unwrap();

    let created: serde_json::Value = server
        .client()
        .post(server.url("/v1/responses"))
        .json(&serde_json::json!({"model": "m1", "input": "x"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_owned();
    poll_until_terminal(&server, &id).await;

    let deleted: serde_json::Value = server
        .client()
        .delete(server.url(&format!("/v1/responses/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], true);

    let missing = server
        .client()
        .get(server.url(&format!("/v1/responses/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn conversation_crud_round_trip() {
    let store_dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .with_store_path(&store_dir.path().join("db"))
        .build();
    let server = TestServer::start(config).await.unwrap();

    let created: serde_json::Value = server
        .client()
        .post(server.url("/v1/conversations"))
        .json(&serde_json::json!({"metadata": {"topic": "testing"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_owned();
    assert!(id.starts_with("conv_"));

    // Append and list items
    let appended: serde_json::Value = server
        .client()
        .post(server.url(&format!("/v1/conversations/{id}/items")))
        .json(&serde_json::json!({"items": [{"role": "user", "content": "hello"}]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(appended["data"].as_array().unwrap().len(), 1);

    let items: serde_json::Value = server
        .client()
        .get(server.url(&format!("/v1/conversations/{id}/items")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(items["data"][0]["content"], "hello");

    // Delete and verify
    let deleted: serde_json::Value = server
        .client()
        .delete(server.url(&format!("/v1/conversations/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["deleted"], true);

    let missing = server
        .client()
        .get(server.url(&format!("/v1/conversations/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
