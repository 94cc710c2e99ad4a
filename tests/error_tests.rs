use serde_json::json;
use twitx::{ClientConfig, ConnectionOptions, Credentials, TwitterClient, TwitterError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> TwitterClient {
    let config = ClientConfig::new(Credentials::user("ck", "cs", "token", "token-secret"))
        .with_options(ConnectionOptions::default().with_base_url(&server.uri()));
    TwitterClient::new(config).unwrap()
}

async fn respond_on_verify(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/1.1/account/verify_credentials.json"))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_json_error_list_with_rate_limit() {
    let server = MockServer::start().await;
    respond_on_verify(
        &server,
        ResponseTemplate::new(401)
            .insert_header("x-rate-limit-limit", "75")
            .insert_header("x-rate-limit-remaining", "74")
            .insert_header("x-rate-limit-reset", "1700000900")
            .set_body_json(json!({ "errors": [{ "code": 32, "message": "Could not authenticate you" }] })),
    )
    .await;

    let err = client(&server).verify_credentials().await.unwrap_err();
    let api = err.api_error().unwrap();

    assert_eq!(api.status, 401);
    assert_eq!(api.errors.len(), 1);
    assert_eq!(api.code(), Some(32));
    assert_eq!(api.errors[0].message, "Could not authenticate you");
    assert_eq!(api.rate_limit.map(|r| r.remaining), Some(74));
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn test_rate_limited_response() {
    let server = MockServer::start().await;
    respond_on_verify(
        &server,
        ResponseTemplate::new(429)
            .insert_header("x-rate-limit-limit", "75")
            .insert_header("x-rate-limit-remaining", "0")
            .insert_header("x-rate-limit-reset", "1700000900")
            .set_body_json(json!({ "errors": [{ "code": 88, "message": "Rate limit exceeded" }] })),
    )
    .await;

    let err = client(&server).verify_credentials().await.unwrap_err();

    assert!(err.is_rate_limited());
    assert!(err.is_retryable());
    let rate_limit = err.api_error().and_then(|api| api.rate_limit).unwrap();
    assert!(rate_limit.is_exhausted());
    // exactly one attempt, no automatic retry
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(1));
}

#[tokio::test]
async fn test_partial_rate_limit_headers_ignored() {
    let server = MockServer::start().await;
    respond_on_verify(
        &server,
        ResponseTemplate::new(200)
            .insert_header("x-rate-limit-limit", "75")
            .insert_header("x-rate-limit-remaining", "10")
            .set_body_json(json!({ "id": 5 })),
    )
    .await;

    let response = client(&server).verify_credentials().await.unwrap();
    assert_eq!(response.data.id, 5);
    assert!(response.rate_limit.is_none());
}

#[tokio::test]
async fn test_html_error_page() {
    let server = MockServer::start().await;
    respond_on_verify(
        &server,
        ResponseTemplate::new(503).set_body_raw(
            "<html><h1>Service Unavailable</h1></html>",
            "text/html",
        ),
    )
    .await;

    let err = client(&server).verify_credentials().await.unwrap_err();
    let api = err.api_error().unwrap();
    assert_eq!(api.status, 503);
    assert_eq!(api.errors[0].message, "Service Unavailable");
    assert_eq!(api.body, "<html><h1>Service Unavailable</h1></html>");
}

#[tokio::test]
async fn test_plain_text_error() {
    let server = MockServer::start().await;
    respond_on_verify(&server, ResponseTemplate::new(500).set_body_string("boom")).await;

    let err = client(&server).verify_credentials().await.unwrap_err();
    let api = err.api_error().unwrap();
    assert_eq!(api.errors.len(), 1);
    assert_eq!(api.errors[0].message, "boom");
    assert_eq!(api.errors[0].code, None);
}

#[tokio::test]
async fn test_error_field_split_into_entries() {
    let server = MockServer::start().await;
    respond_on_verify(
        &server,
        ResponseTemplate::new(403).set_body_json(json!({ "error": "Not allowed\nTry later" })),
    )
    .await;

    let err = client(&server).verify_credentials().await.unwrap_err();
    let messages: Vec<String> = err
        .api_error()
        .unwrap()
        .errors
        .iter()
        .map(|e| e.message.clone())
        .collect();
    assert_eq!(messages, vec!["Not allowed", "Try later"]);
}

#[tokio::test]
async fn test_unexpected_success_body_is_parse_error() {
    let server = MockServer::start().await;
    respond_on_verify(&server, ResponseTemplate::new(200).set_body_string("not json")).await;

    let err = client(&server).verify_credentials().await.unwrap_err();
    assert!(matches!(err, TwitterError::Parse(_)));
    assert!(err.api_error().is_none());
}
