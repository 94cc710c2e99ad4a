use base64::engine::general_purpose;
use base64::Engine;
use secrecy::ExposeSecret;
use serde_json::json;
use twitx::oauth::{OAuthFlow, OUT_OF_BAND};
use twitx::ConnectionOptions;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn flow(server: &MockServer) -> OAuthFlow {
    OAuthFlow::new(
        "ck",
        "cs",
        ConnectionOptions::default().with_base_url(&server.uri()),
    )
}

fn authorization_contains(request: &Request, needle: &str) -> bool {
    request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|auth| auth.contains(needle))
}

#[tokio::test]
async fn test_pin_based_authorization() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .and(|request: &Request| {
            authorization_contains(request, "oauth_callback=\"oob\"")
                && !authorization_contains(request, "oauth_token=")
        })
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true",
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .and(|request: &Request| {
            authorization_contains(request, "oauth_verifier=\"1234567\"")
                && authorization_contains(request, "oauth_token=\"req-token\"")
        })
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=user-token&oauth_token_secret=user-secret&user_id=6253282&screen_name=someone",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow(&server);
    let request_token = flow.request_token(OUT_OF_BAND).await.unwrap();
    assert_eq!(request_token.token, "req-token");
    assert!(request_token.callback_confirmed);
    assert_eq!(
        flow.authorize_url(&request_token, false),
        format!("{}/oauth/authorize?oauth_token=req-token", server.uri())
    );

    let access = flow.access_token(&request_token, "1234567").await.unwrap();
    assert_eq!(access.token, "user-token");
    assert_eq!(access.token_secret.expose_secret(), "user-secret");
    assert_eq!(access.user_id.as_deref(), Some("6253282"));
    assert_eq!(access.screen_name.as_deref(), Some("someone"));
}

#[tokio::test]
async fn test_incomplete_token_response_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("oauth_token=only-half"))
        .mount(&server)
        .await;

    let err = flow(&server).request_token(OUT_OF_BAND).await.unwrap_err();
    assert!(matches!(err, twitx::TwitterError::Parse(_)));
}

#[tokio::test]
async fn test_bearer_token_lifecycle() {
    let server = MockServer::start().await;
    let basic = format!("Basic {}", general_purpose::STANDARD.encode("ck:cs"));

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(header("authorization", basic.as_str()))
        .and(body_string("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "bearer",
            "access_token": "AAAA%2FAAA%3DAAAAAAAA"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/invalidate_token"))
        .and(header("authorization", basic.as_str()))
        .and(body_string("access_token=AAAA%252FAAA%253DAAAAAAAA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AAAA%2FAAA%3DAAAAAAAA"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow(&server);
    let token = flow.bearer_token().await.unwrap();
    assert_eq!(token.expose_secret(), "AAAA%2FAAA%3DAAAAAAAA");

    flow.invalidate_bearer_token(token.expose_secret()).await.unwrap();
}

#[tokio::test]
async fn test_rejected_consumer_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errors": [{ "code": 99, "message": "Unable to verify your credentials" }]
        })))
        .mount(&server)
        .await;

    let err = flow(&server).bearer_token().await.unwrap_err();
    assert_eq!(err.api_error().and_then(|api| api.code()), Some(99));
}
