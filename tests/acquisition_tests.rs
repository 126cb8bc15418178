//! Candidate acquisition against a mock directory.

mod common;

use common::fixtures::test_config;
use common::wiremock_helpers::{mount_search, mount_status, mount_user_info, user_json, SEARCH_PATH};
use impersonatorfinder::acquire::{AcquireError, CandidateAcquirer};
use impersonatorfinder::api::DirectoryClient;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn acquirer_for(server: &MockServer, dir: &TempDir) -> CandidateAcquirer {
    let config = test_config(&server.uri(), dir.path());
    CandidateAcquirer::new(Arc::new(DirectoryClient::new(&config.api, &config.http).unwrap()))
}

#[tokio::test]
async fn test_merges_name_and_handle_searches() {
    let server = MockServer::start().await;
    let alice = user_json(&server, "alice", "Alice A", "hi", "/avatars/alice.png");
    mount_user_info(&server, "alice", Some(alice.clone())).await;
    mount_search(
        &server,
        "Alice A",
        vec![
            alice.clone(),
            user_json(&server, "alice2", "Alice A", "hi", ""),
            user_json(&server, "bob", "Bob B", "yo", ""),
        ],
    )
    .await;
    mount_search(
        &server,
        "alice",
        vec![
            user_json(&server, "alice2", "Alice A (dup)", "", ""),
            user_json(&server, "alice_official", "Alice", "", ""),
        ],
    )
    .await;

    let dir = TempDir::new().unwrap();
    let (profile, candidates) = acquirer_for(&server, &dir).acquire("alice").await.unwrap();

    assert_eq!(profile.handle, "alice");
    assert_eq!(profile.follower_count, 100);

    let handles: Vec<&str> = candidates.iter().map(|c| c.handle.as_str()).collect();
    assert_eq!(handles, vec!["alice2", "bob", "alice_official"]);
    // first occurrence wins
    assert_eq!(candidates[0].display_name, "Alice A");
}

#[tokio::test]
async fn test_failed_name_search_keeps_handle_results() {
    let server = MockServer::start().await;
    mount_user_info(&server, "alice", Some(user_json(&server, "alice", "Alice A", "hi", ""))).await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("keywords", "Alice A"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_search(&server, "alice", vec![user_json(&server, "alice2", "", "", "")]).await;

    let dir = TempDir::new().unwrap();
    let (_, candidates) = acquirer_for(&server, &dir).acquire("alice").await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].handle, "alice2");
}

#[tokio::test]
async fn test_empty_display_name_skips_name_search() {
    let server = MockServer::start().await;
    mount_user_info(&server, "quiet", Some(user_json(&server, "quiet", "", "", ""))).await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("keywords", "quiet"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "msg": "success",
            "data": { "user_list": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (_, candidates) = acquirer_for(&server, &dir).acquire("quiet").await.unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_missing_user_is_profile_not_found() {
    let server = MockServer::start().await;
    mount_user_info(&server, "ghost", None).await;

    let dir = TempDir::new().unwrap();
    let err = acquirer_for(&server, &dir).acquire("ghost").await.unwrap_err();
    assert!(matches!(err, AcquireError::ProfileNotFound { ref handle } if handle == "ghost"));
}

#[tokio::test]
async fn test_lookup_failure_is_reported() {
    let server = MockServer::start().await;
    mount_status(&server, "/user/info", 500).await;

    let dir = TempDir::new().unwrap();
    let err = acquirer_for(&server, &dir).acquire("alice").await.unwrap_err();
    assert!(matches!(err, AcquireError::Lookup { .. }));
}

#[tokio::test]
async fn test_target_without_unique_id_uses_requested_handle() {
    let server = MockServer::start().await;
    mount_user_info(&server, "alice", Some(serde_json::json!({ "nickname": "Alice A" }))).await;
    mount_search(
        &server,
        "Alice A",
        vec![user_json(&server, "alice", "Alice A", "", ""), user_json(&server, "alice2", "", "", "")],
    )
    .await;
    mount_search(&server, "alice", vec![]).await;

    let dir = TempDir::new().unwrap();
    let (profile, candidates) = acquirer_for(&server, &dir).acquire("alice").await.unwrap();
    assert_eq!(profile.handle, "alice");
    assert!(candidates.iter().all(|c| c.handle != "alice"));
    assert_eq!(candidates.len(), 1);
}
