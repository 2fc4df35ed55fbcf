//! Session cookie introspection and logout.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use claim_service::services::session::SESSION_COOKIE;
use claim_service::store::Store;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn session_requires_a_cookie() {
    let app = TestApp::spawn();

    let (status, body) = app.get("/session").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No session");
}

#[tokio::test]
async fn garbage_session_token_is_unauthorized() {
    let app = TestApp::spawn();

    let request = Request::builder()
        .uri("/session")
        .header("x-forwarded-for", "10.0.0.1")
        .header(header::COOKIE, format!("{}=not-a-jwt", SESSION_COOKIE))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_session_lists_memberships() {
    let app = TestApp::spawn();
    let user_id = app.seed_user().await;
    let bin_a = app.seed_bin("tok-sess-a").await;
    let bin_b = app.seed_bin("tok-sess-b").await;
    app.store
        .upsert_membership(bin_a, user_id, "owner")
        .await
        .unwrap();
    app.store
        .upsert_membership(bin_b, user_id, "worker")
        .await
        .unwrap();

    let token = app.state.session.mint(user_id).unwrap();
    let request = Request::builder()
        .uri("/session")
        .header("x-forwarded-for", "10.0.0.1")
        .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], user_id.to_string());
    assert_eq!(body["memberships"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let app = TestApp::spawn();

    let response = app
        .post_json_raw("/auth/logout", json!({}), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("removal cookie missing")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with(&format!("{}=", SESSION_COOKIE)));
    assert!(set_cookie.contains("Max-Age=0"));
}
