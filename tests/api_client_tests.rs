//! Directory API client against a mock server.

mod common;

use common::fixtures::{load_json_fixture, test_config};
use common::wiremock_helpers::{mount_delayed, mount_status, SEARCH_PATH, USER_INFO_PATH};
use impersonatorfinder::api::{ApiError, DirectoryClient};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, dir: &TempDir) -> DirectoryClient {
    let config = test_config(&server.uri(), dir.path());
    DirectoryClient::new(&config.api, &config.http).unwrap()
}

// ============ Profile Lookup ============

#[tokio::test]
async fn test_lookup_sends_auth_headers_and_parses_user() {
    let server = MockServer::start().await;
    let body: Value = load_json_fixture("user_info_alice.json");
    Mock::given(method("GET"))
        .and(path(USER_INFO_PATH))
        .and(query_param("unique_id", "@alice"))
        .and(header("X-RapidAPI-Key", "test-key"))
        .and(header("X-RapidAPI-Host", "directory.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let info = client_for(&server, &dir).lookup_profile("alice").await.unwrap();

    let stats = info.stats.clone();
    let profile = info.user.unwrap().into_profile("alice", stats.as_ref());
    assert_eq!(profile.handle, "alice");
    assert_eq!(profile.display_name, "Alice A");
    assert_eq!(profile.bio, "hi");
    assert_eq!(profile.avatar_url, "https://cdn.example.com/alice_720x720.jpeg");
    assert_eq!(profile.avatar_local_name, "alice.jpeg");
    assert_eq!(profile.follower_count, 1520);
}

#[tokio::test]
async fn test_lookup_without_success_marker_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(USER_INFO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "msg": "user not exist",
            "data": null
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = client_for(&server, &dir).lookup_profile("ghost").await.unwrap_err();
    assert!(matches!(err, ApiError::Unsuccessful { ref msg } if msg == "user not exist"));
}

#[tokio::test]
async fn test_lookup_non_200_fails() {
    let server = MockServer::start().await;
    mount_status(&server, USER_INFO_PATH, 429).await;

    let dir = TempDir::new().unwrap();
    let err = client_for(&server, &dir).lookup_profile("alice").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 429 }));
}

#[tokio::test]
async fn test_lookup_success_without_data_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(USER_INFO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "msg": "success" })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = client_for(&server, &dir).lookup_profile("alice").await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
}

#[tokio::test]
async fn test_lookup_invalid_json_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(USER_INFO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = client_for(&server, &dir).lookup_profile("alice").await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    mount_delayed(&server, USER_INFO_PATH, 3_000).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.http.request_timeout_secs = 1;
    let client = DirectoryClient::new(&config.api, &config.http).unwrap();

    let err = client.lookup_profile("alice").await.unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)), "expected timeout, got {:?}", err);
}

// ============ Search ============

#[tokio::test]
async fn test_search_sends_paging_params_and_drops_unusable_entries() {
    let server = MockServer::start().await;
    let body: Value = load_json_fixture("search_alice.json");
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("keywords", "Alice A"))
        .and(query_param("count", "30"))
        .and(query_param("cursor", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = client_for(&server, &dir);
    let profiles = client.search_profiles("Alice A", client.page_size(), 0).await.unwrap();

    let handles: Vec<&str> = profiles.iter().map(|p| p.handle.as_str()).collect();
    assert_eq!(handles, vec!["alice2", "bob"]);
    assert_eq!(profiles[0].avatar_url, "https://cdn.example.com/alice2_100x100.jpeg");
    assert_eq!(profiles[1].bio, "");
}

#[tokio::test]
async fn test_search_without_user_list_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "msg": "success",
            "data": { "cursor": 0 }
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = client_for(&server, &dir).search_profiles("x", 30, 0).await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let dir = TempDir::new().unwrap();
    let config = test_config("http://127.0.0.1:1", dir.path());
    let client = DirectoryClient::new(&config.api, &config.http).unwrap();

    let err = client.search_profiles("alice", 30, 0).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
}
