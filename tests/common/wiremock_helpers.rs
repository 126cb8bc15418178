use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USER_INFO_PATH: &str = "/user/info";
pub const SEARCH_PATH: &str = "/user/search";

/// User object in the directory API's shape. An empty `avatar_path` leaves the avatar out.
pub fn user_json(server: &MockServer, handle: &str, nickname: &str, signature: &str, avatar_path: &str) -> Value {
    let mut user = json!({
        "uniqueId": handle,
        "nickname": nickname,
        "signature": signature,
    });
    if !avatar_path.is_empty() {
        user["avatarMedium"] = json!(format!("{}{}", server.uri(), avatar_path));
    }
    user
}

pub fn user_info_body(user: Option<Value>) -> Value {
    match user {
        Some(user) => json!({
            "msg": "success",
            "data": { "user": user, "stats": { "followerCount": 100 } }
        }),
        None => json!({ "msg": "success", "data": {} }),
    }
}

pub fn search_body(users: Vec<Value>) -> Value {
    let list: Vec<Value> = users.into_iter().map(|u| json!({ "user": u })).collect();
    json!({
        "msg": "success",
        "data": { "user_list": list, "cursor": 0, "hasMore": false }
    })
}

/// Profile lookup for `handle`; `None` answers with no user object.
pub async fn mount_user_info(server: &MockServer, handle: &str, user: Option<Value>) {
    Mock::given(method("GET"))
        .and(path(USER_INFO_PATH))
        .and(query_param("unique_id", format!("@{}", handle)))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_info_body(user)))
        .mount(server)
        .await;
}

/// Keyword search returning `users`
pub async fn mount_search(server: &MockServer, keyword: &str, users: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("keywords", keyword))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(users)))
        .mount(server)
        .await;
}

/// Serve raw image bytes at `url_path`
pub async fn mount_avatar(server: &MockServer, url_path: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(bytes)
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
}

/// Answer every GET on `url_path` with `status`
pub async fn mount_status(server: &MockServer, url_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Answer every GET on `url_path` after `delay_ms`
pub async fn mount_delayed(server: &MockServer, url_path: &str, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "msg": "success", "data": {} }))
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}
