mod harness;

use harness::config::ConfigBuilder;
use harness::mock_upstream::MockUpstream;
use harness::server::TestServer;

#[tokio::test]
async fn token_is_required_when_configured() {
    let mock = MockUpstream::builder().models(&["m1"]).start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("mock", &mock.base_url())
        .with_token("sekrit")
        .build();
    let server = TestServer::start(config).await.unwrap();

    // No header
    let response = server.client().get(server.url("/v1/models")).send().await.unwrap();
    assert_eq!(response.status(), 401);

    // Wrong scheme
    let response = server
        .client()
        .get(server.url("/v1/models"))
        .header("authorization", "Basic c2Vrcml0")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Wrong token
    let response = server
        .client()
        .get(server.url("/v1/models"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Correct token
    let response = server
        .client()
        .get(server.url("/v1/models"))
        .bearer_auth("sekrit")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn health_stays_open_without_token() {
    let mock = MockUpstream::builder().models(&["m1"]).start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("mock", &mock.base_url())
        .with_token("sekrit")
        .build();
    let server = TestServer::start(config).await.unwrap();

    let response = server.client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider_status"]["mock"]["enabled"], true);
    assert_eq!(body["provider_status"]["mock"]["healthy"], true);
    assert_eq!(body["provider_status"]["mock"]["active"], 0);
}

#[tokio::test]
async fn no_token_configured_means_open_access() {
    let mock = MockUpstream::builder().models(&["m1"]).start().await.unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();
    let server = TestServer::start(config).await.unwrap();

    let response = server.client().get(server.url("/v1/models")).send().await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn unmatched_path_is_404() {
    let config = ConfigBuilder::new().build();
    let server = TestServer::start(config).await.unwrap();

    let response = server
        .client()
        .get(server.url("/v2/definitely/not/here?x=1"))
        .header("user-agent", "curl/8.0")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn root_banner_identifies_the_service() {
    let config = ConfigBuilder::new().build();
    let server = TestServer::start(config).await.unwrap();

    let body: serde_json::Value = server
        .client()
        .get(server.url("/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["service"], "crossbar");
}
