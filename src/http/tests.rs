//! Tests for the HTTP connection module

use super::*;
use crate::auth::{AccessType, AuthConfig, OAuthConfiguration};
use crate::config::ConnectionConfig;
use crate::error::{Error, ErrorCategory};
use crate::proxy::ProxyConfig;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;
use test_case::test_case;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_key_config(server: &MockServer) -> ConnectionConfig {
    ConnectionConfig::builder()
        .base_url(server.uri())
        .auth(AuthConfig::ApiKey {
            api_key: "key".to_string(),
            token_path: None,
        })
        .build()
}

async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/tokens/authenticate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-CSRF-TOKEN", "csrf")
                .set_body_json(json!({ "bearerToken": "bearer" })),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ============================================================================
// URL Building
// ============================================================================

#[test_case("https://hub.example.com", &["a", "b"], "https://hub.example.com/a/b" ; "no trailing slash")]
#[test_case("https://hub.example.com/", &["a", "b"], "https://hub.example.com/a/b" ; "trailing slash")]
#[test_case("https://hub.example.com/hub/", &["api", "projects"], "https://hub.example.com/hub/api/projects" ; "base path")]
#[test_case("https://hub.example.com/api", &[], "https://hub.example.com/api" ; "no segments")]
#[test_case("https://hub.example.com", &["a b"], "https://hub.example.com/a%20b" ; "segment encoding")]
fn test_build_url_segments(base: &str, segments: &[&str], expected: &str) {
    let url = build_url(base, segments, &BTreeMap::new()).unwrap();
    assert_eq!(url.as_str(), expected);
}

#[test]
fn test_build_url_encodes_query() {
    let mut query = BTreeMap::new();
    query.insert("q".to_string(), "x y".to_string());
    query.insert("filter".to_string(), "name:a&b".to_string());

    let url = build_url("https://hub.example.com/base", &["a", "b"], &query).unwrap();
    assert_eq!(url.path(), "/base/a/b");
    assert_eq!(url.query(), Some("filter=name%3Aa%26b&q=x%20y"));
}

#[test]
fn test_build_url_keeps_existing_query() {
    let mut query = BTreeMap::new();
    query.insert("limit".to_string(), "10".to_string());

    let url = build_url("https://hub.example.com/api?x=1", &["items"], &query).unwrap();
    assert_eq!(url.as_str(), "https://hub.example.com/api/items?x=1&limit=10");
}

#[test]
fn test_build_url_invalid_base() {
    let err = build_url("not a url", &["a"], &BTreeMap::new()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);

    let err = build_url("mailto:someone@example.com", &["a"], &BTreeMap::new()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
}

// ============================================================================
// Request Descriptor
// ============================================================================

#[test]
fn test_descriptor_builder() {
    let request = RequestDescriptor::get()
        .segments(["api", "projects"])
        .query("q", "name:hub")
        .query("q", "name:other")
        .header("x-trace", "1")
        .header("X-Trace", "2");

    assert_eq!(request.method, reqwest::Method::GET);
    assert_eq!(request.segments, vec!["api", "projects"]);
    assert_eq!(request.query.get("q").map(String::as_str), Some("name:other"));
    assert_eq!(request.header_value("x-trace"), Some("2"));
    assert_eq!(request.header_value("Accept"), Some("application/json"));
    assert_eq!(request.headers.len(), 2);
}

#[test]
fn test_rebuild_is_pure() {
    let original = RequestDescriptor::post()
        .segment("items")
        .header("Authorization", "Bearer old")
        .json(json!({ "name": "x" }));

    let rebuilt = original.rebuild(&[("authorization".to_string(), "Bearer new".to_string())]);

    assert_eq!(original.header_value("Authorization"), Some("Bearer old"));
    assert_eq!(rebuilt.header_value("Authorization"), Some("Bearer new"));
    assert_eq!(rebuilt.body, original.body);
    assert_eq!(rebuilt.segments, original.segments);
}

#[test]
fn test_merge_headers_later_wins() {
    let common = vec![
        ("Accept".to_string(), "text/plain".to_string()),
        ("X-Client".to_string(), "hub".to_string()),
    ];
    let request = vec![("accept".to_string(), "application/json".to_string())];

    let merged = merge_headers([common.as_slice(), request.as_slice()]);
    assert_eq!(
        merged,
        vec![
            ("X-Client".to_string(), "hub".to_string()),
            ("accept".to_string(), "application/json".to_string()),
        ]
    );
}

// ============================================================================
// Connection Lifecycle
// ============================================================================

#[test]
fn test_connection_rejects_invalid_config() {
    let err = Connection::new(ConnectionConfig::default()).unwrap_err();
    assert!(matches!(err, Error::MissingConfigField { .. }));

    let config = ConnectionConfig::builder()
        .base_url("https://hub.example.com")
        .proxy(ProxyConfig::new("proxy.local", 0))
        .build();
    assert_eq!(
        Connection::new(config).unwrap_err().category(),
        ErrorCategory::Config
    );
}

#[tokio::test]
async fn test_lazy_connect_on_first_request() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .and(header("Authorization", "Bearer bearer"))
        .and(header("X-CSRF-TOKEN", "csrf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(2)
        .mount(&server)
        .await;

    let connection = Connection::new(api_key_config(&server)).unwrap();
    assert_eq!(connection.state().await, ConnectionState::Unconnected);

    let request = RequestDescriptor::get().segments(["api", "projects"]);
    let body: serde_json::Value = connection.get_json(&request).await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(connection.state().await, ConnectionState::Connected);

    // Second request reuses the credentials
    connection.execute(&request).await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_marks_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/tokens/authenticate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let connection = Connection::new(api_key_config(&server)).unwrap();
    let err = connection.connect().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Auth);
    assert_eq!(connection.state().await, ConnectionState::Failed);

    let err = connection
        .execute(&RequestDescriptor::get().segment("api"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed { .. }));
}

#[tokio::test]
async fn test_missing_credentials_fail_connect() {
    let server = MockServer::start().await;
    let config = ConnectionConfig::builder()
        .base_url(server.uri())
        .auth(AuthConfig::Session {
            username: String::new(),
            password: "pw".to_string(),
            login_path: None,
        })
        .build();

    let connection = Connection::new(config).unwrap();
    let err = connection.connect().await.unwrap_err();
    assert!(matches!(err, Error::MissingCredentials { .. }));
    assert_eq!(err.category(), ErrorCategory::Auth);
}

#[tokio::test]
async fn test_transport_error_marks_failed() {
    let config = ConnectionConfig::builder()
        .base_url("http://127.0.0.1:1")
        .timeout(std::time::Duration::from_secs(2))
        .build();
    let connection = Connection::new(config).unwrap();

    let err = connection
        .execute(&RequestDescriptor::get().segment("api"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io);
    assert_eq!(connection.state().await, ConnectionState::Failed);
}

#[tokio::test]
async fn test_connect_recovers_failed_connection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/tokens/authenticate"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_token_endpoint(&server, 1).await;

    let connection = Connection::new(api_key_config(&server)).unwrap();
    assert!(connection.connect().await.is_err());
    assert_eq!(connection.state().await, ConnectionState::Failed);

    connection.connect().await.unwrap();
    assert_eq!(connection.state().await, ConnectionState::Connected);
}

// ============================================================================
// Status Handling
// ============================================================================

#[tokio::test]
async fn test_not_found_is_per_request() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nothing here"))
        .expect(1)
        .mount(&server)
        .await;

    let connection = Connection::new(api_key_config(&server)).unwrap();
    let err = connection
        .execute(&RequestDescriptor::get().segments(["api", "missing"]))
        .await
        .unwrap_err();

    match &err {
        Error::HttpStatus {
            status,
            message,
            method,
            url,
        } => {
            assert_eq!(*status, 404);
            assert_eq!(message, "Not Found");
            assert_eq!(method, "GET");
            assert!(url.ends_with("/api/missing"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.category(), ErrorCategory::Http);
    assert_eq!(connection.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_unauthorized_then_success() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
        .expect(1)
        .mount(&server)
        .await;

    let connection = Connection::new(api_key_config(&server)).unwrap();
    let body = connection
        .get_string(&RequestDescriptor::get().segments(["api", "items"]))
        .await
        .unwrap();
    assert_eq!(body, "fine");
    assert_eq!(connection.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_unauthenticated_401_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/secret"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let config = ConnectionConfig::builder().base_url(server.uri()).build();
    let connection = Connection::new(config).unwrap();
    let err = connection
        .execute(&RequestDescriptor::get().segments(["api", "secret"]))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(connection.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_oauth2_gives_up_after_one_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "t"
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .and(header("Authorization", "Bearer t"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let config = ConnectionConfig::builder()
        .base_url(server.uri())
        .auth(AuthConfig::OAuth2 {
            configuration: OAuthConfiguration {
                token_uri: format!("{}/oauth/token", server.uri()),
                client_id: "hub".to_string(),
                client_secret: None,
                refresh_token: None,
                callback_url: String::new(),
            },
            access_type: AccessType::Client,
        })
        .build();
    let connection = Connection::new(config).unwrap();

    let err = connection
        .execute(&RequestDescriptor::get().segments(["api", "items"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 401, .. }));
    assert_eq!(connection.state().await, ConnectionState::Failed);
}

#[tokio::test]
async fn test_failed_reauthentication_keeps_connection_usable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/tokens/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "bearerToken": "bearer" })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tokens/authenticate"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .and(header("Authorization", "Bearer bearer"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let connection = Connection::new(api_key_config(&server)).unwrap();
    let request = RequestDescriptor::get().segments(["api", "items"]);

    // The token endpoint hiccups, but the replay with the old token succeeds
    let response = connection.execute(&request).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(connection.state().await, ConnectionState::Connected);

    let response = connection.execute(&request).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

// ============================================================================
// Headers and Bodies
// ============================================================================

#[tokio::test]
async fn test_header_precedence() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/items"))
        .and(header("X-Client", "request"))
        .and(header("X-Tenant", "acme"))
        .and(header("Authorization", "Bearer bearer"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = ConnectionConfig::builder()
        .base_url(server.uri())
        .header("X-Client", "common")
        .header("X-Tenant", "acme")
        .auth(AuthConfig::ApiKey {
            api_key: "key".to_string(),
            token_path: None,
        })
        .build();
    let connection = Connection::new(config).unwrap();

    let request = RequestDescriptor::get()
        .segments(["api", "items"])
        .header("X-Client", "request")
        .header("Authorization", "Basic ignored");
    connection.execute(&request).await.unwrap();
}

#[tokio::test]
async fn test_common_header_management() {
    let server = MockServer::start().await;
    let config = ConnectionConfig::builder()
        .base_url(server.uri())
        .header("X-One", "1")
        .build();
    let connection = Connection::new(config).unwrap();

    connection.add_common_header("X-Two", "2").await;
    connection.add_common_header("x-one", "uno").await;
    assert_eq!(
        connection.common_headers().await,
        vec![
            ("X-Two".to_string(), "2".to_string()),
            ("x-one".to_string(), "uno".to_string()),
        ]
    );

    assert_eq!(
        connection.remove_common_header("X-ONE").await,
        Some("uno".to_string())
    );
    assert_eq!(connection.remove_common_header("X-ONE").await, None);
}

#[tokio::test]
async fn test_query_parameters_are_encoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .and(query_param("q", "name:hub rest"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let connection = Connection::new(ConnectionConfig::builder().base_url(server.uri()).build())
        .unwrap();
    let request = RequestDescriptor::get()
        .segments(["api", "projects"])
        .query("q", "name:hub rest");
    connection.execute(&request).await.unwrap();
}

#[tokio::test]
async fn test_override_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/elsewhere/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = ConnectionConfig::builder()
        .base_url(format!("{}/base/", server.uri()))
        .build();
    let connection = Connection::new(config).unwrap();

    let request = RequestDescriptor::get()
        .url(format!("{}/elsewhere", server.uri()))
        .segment("x");
    connection.execute(&request).await.unwrap();
}

#[tokio::test]
async fn test_body_helpers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(header("Content-Type", "application/json"))
        .and(body_string_contains("\"name\":\"x\""))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/form"))
        .and(body_string_contains("a=1&b=two+words"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/text"))
        .and(header("Content-Type", "text/plain"))
        .and(body_string_contains("hello"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/items/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let connection = Connection::new(ConnectionConfig::builder().base_url(server.uri()).build())
        .unwrap();

    let response = connection
        .send_json(
            &RequestDescriptor::post().segments(["api", "items"]),
            json!({ "name": "x" }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    connection
        .send_form(
            &RequestDescriptor::put().segments(["api", "form"]),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two words".to_string()),
            ],
        )
        .await
        .unwrap();

    connection
        .execute(
            &RequestDescriptor::post()
                .segments(["api", "text"])
                .text("text/plain", "hello"),
        )
        .await
        .unwrap();

    connection
        .delete(&RequestDescriptor::get().segments(["api", "items", "7"]))
        .await
        .unwrap();
}

// ============================================================================
// Proxy
// ============================================================================

#[tokio::test]
async fn test_proxy_challenge_answered_once() {
    let proxy = MockServer::start().await;
    let proxy_port = proxy.address().port();

    Mock::given(method("GET"))
        .and(path("/api/items"))
        .and(header("Proxy-Authorization", "Basic YWxpY2U6c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .expect(1)
        .mount(&proxy)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(
            ResponseTemplate::new(407).insert_header("Proxy-Authenticate", "Basic realm=\"corp\""),
        )
        .with_priority(2)
        .expect(1)
        .mount(&proxy)
        .await;

    let config = ConnectionConfig::builder()
        .base_url("http://hub.internal.test")
        .proxy(ProxyConfig::new("127.0.0.1", proxy_port).credentials("alice", "secret"))
        .build();
    let connection = Connection::new(config).unwrap();

    connection
        .execute(&RequestDescriptor::get().segments(["api", "items"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_proxy_challenge_without_credentials_fails() {
    let proxy = MockServer::start().await;
    let proxy_port = proxy.address().port();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(407).insert_header("Proxy-Authenticate", "Basic"))
        .expect(1)
        .mount(&proxy)
        .await;

    let config = ConnectionConfig::builder()
        .base_url("http://hub.internal.test")
        .proxy(ProxyConfig::new("127.0.0.1", proxy_port))
        .build();
    let connection = Connection::new(config).unwrap();

    let err = connection
        .execute(&RequestDescriptor::get().segment("api"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(407));
}
