//! Tests for the admin HTTP surface: auth, key lifecycle, idempotence.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::*;

const KEY: &str = "SRM-AB12-CD34-EF56-9A8B";

#[tokio::test]
async fn test_admin_requires_token() {
    let app = app(test_state());

    // No token at all.
    let request = Request::builder()
        .method("GET")
        .uri("/admin/keys")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token.
    let request = Request::builder()
        .method("POST")
        .uri("/admin/ban")
        .header("content-type", "application/json")
        .header("x-admin-token", "wrong-token-value")
        .body(Body::from(json!({ "key": KEY }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_key_then_duplicate_conflicts() {
    let app = app(test_state());

    let (status, body) = admin_post(
        &app,
        "/admin/keys/create",
        json!({ "key": KEY, "hwid": "MACHINE1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["key"], KEY);

    let (status, _) = admin_post(
        &app,
        "/admin/keys/create",
        json!({ "key": KEY, "hwid": "MACHINE2" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_key_normalizes_input() {
    let state = test_state();
    let app = app(state.clone());

    let (status, body) = admin_post(
        &app,
        "/admin/keys/create",
        json!({ "key": " srm-ab12-cd34-ef56-9a8b ", "hwid": " machine1 " }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], KEY);

    let record = state.store.get_issued(KEY).unwrap().unwrap();
    assert_eq!(record.hwid, "MACHINE1");
}

#[tokio::test]
async fn test_create_key_missing_fields_is_bad_request() {
    let app = app(test_state());

    let (status, _) =
        admin_post(&app, "/admin/keys/create", json!({ "key": "", "hwid": "X" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        admin_post(&app, "/admin/keys/create", json!({ "key": KEY, "hwid": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ban_twice_keeps_one_record_with_latest_reason() {
    let app = app(test_state());

    admin_post(&app, "/admin/keys/create", json!({ "key": KEY, "hwid": "M1" })).await;
    admin_post(&app, "/admin/ban", json!({ "key": KEY, "reason": "first" })).await;
    let (status, body) =
        admin_post(&app, "/admin/ban", json!({ "key": KEY, "reason": "second" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, dump) = admin_get(&app, "/admin/keys").await;
    let banned = dump["banned"].as_array().unwrap();
    assert_eq!(banned.len(), 1, "re-ban must not duplicate");
    assert_eq!(banned[0]["reason"], "second");
}

#[tokio::test]
async fn test_ban_defaults_reason_when_omitted() {
    let app = app(test_state());

    admin_post(&app, "/admin/ban", json!({ "key": KEY })).await;

    let (_, dump) = admin_get(&app, "/admin/keys").await;
    assert_eq!(dump["banned"][0]["reason"], "no reason given");
}

#[tokio::test]
async fn test_deactivate_then_ban_leaves_only_the_ban() {
    let app = app(test_state());

    admin_post(&app, "/admin/keys/create", json!({ "key": KEY, "hwid": "M1" })).await;
    admin_post(
        &app,
        "/admin/deactivate",
        json!({ "key": KEY, "reason": "lapsed" }),
    )
    .await;
    admin_post(&app, "/admin/ban", json!({ "key": KEY, "reason": "fraud" })).await;

    let (_, dump) = admin_get(&app, "/admin/keys").await;
    assert_eq!(
        dump["deactivated"].as_array().unwrap().len(),
        0,
        "ban supersedes deactivation"
    );
    assert_eq!(dump["banned"].as_array().unwrap().len(), 1);
    assert_eq!(dump["banned"][0]["hwid"], "M1", "ban copies the bound hwid");
}

#[tokio::test]
async fn test_unban_nonbanned_key_is_noop_success() {
    let app = app(test_state());

    let (status, body) = admin_post(&app, "/admin/unban", json!({ "key": KEY })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_reactivate_clears_ban_and_deactivation() {
    let app = app(test_state());

    admin_post(&app, "/admin/keys/create", json!({ "key": KEY, "hwid": "M1" })).await;
    admin_post(&app, "/admin/ban", json!({ "key": KEY, "reason": "fraud" })).await;
    admin_post(
        &app,
        "/admin/deactivate",
        json!({ "key": KEY, "reason": "lapsed" }),
    )
    .await;

    let (status, body) = admin_post(&app, "/admin/reactivate", json!({ "key": KEY })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, dump) = admin_get(&app, "/admin/keys").await;
    assert_eq!(dump["banned"].as_array().unwrap().len(), 0);
    assert_eq!(dump["deactivated"].as_array().unwrap().len(), 0);
    assert_eq!(
        dump["keys"].as_array().unwrap().len(),
        1,
        "reactivate must not remove the issued record"
    );
}

#[tokio::test]
async fn test_delete_never_created_key_is_noop_success() {
    let app = app(test_state());

    let (status, body) = admin_post(&app, "/admin/delete", json!({ "key": KEY })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_delete_purges_key_from_every_set() {
    let app = app(test_state());

    admin_post(&app, "/admin/keys/create", json!({ "key": KEY, "hwid": "M1" })).await;
    admin_post(&app, "/admin/ban", json!({ "key": KEY, "reason": "fraud" })).await;
    admin_post(&app, "/admin/delete", json!({ "key": KEY })).await;

    let (_, dump) = admin_get(&app, "/admin/keys").await;
    assert_eq!(dump["keys"].as_array().unwrap().len(), 0);
    assert_eq!(dump["banned"].as_array().unwrap().len(), 0);
    assert_eq!(dump["deactivated"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_mutation_with_missing_key_is_bad_request() {
    let app = app(test_state());

    for uri in [
        "/admin/ban",
        "/admin/unban",
        "/admin/deactivate",
        "/admin/reactivate",
        "/admin/delete",
    ] {
        let (status, _) = admin_post(&app, uri, json!({ "key": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} should reject empty key", uri);
    }
}

#[tokio::test]
async fn test_list_keys_returns_all_three_sets() {
    let app = app(test_state());

    admin_post(&app, "/admin/keys/create", json!({ "key": KEY, "hwid": "M1" })).await;
    admin_post(
        &app,
        "/admin/keys/create",
        json!({ "key": "SRM-1111-2222-3333-4444", "hwid": "M2" }),
    )
    .await;
    admin_post(
        &app,
        "/admin/deactivate",
        json!({ "key": KEY, "reason": "lapsed" }),
    )
    .await;

    let (status, dump) = admin_get(&app, "/admin/keys").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dump["keys"].as_array().unwrap().len(), 2);
    assert_eq!(dump["banned"].as_array().unwrap().len(), 0);
    assert_eq!(dump["deactivated"].as_array().unwrap().len(), 1);
    assert_eq!(dump["deactivated"][0]["key"], KEY);
}
