//! Code redemption: single use, attempt caps, expiry, and scan-search mode.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use claim_service::models::Role;
use claim_service::store::Store;
use common::TestApp;
use serde_json::json;
use uuid::Uuid;

struct StartedClaim {
    verification_id: Uuid,
    code: String,
}

async fn start_claim(app: &TestApp, bin_token: &str, role: &str) -> StartedClaim {
    let (status, body) = app
        .post_json("/claim/start", json!({"binToken": bin_token, "role": role}))
        .await;
    assert_eq!(status, StatusCode::OK);
    StartedClaim {
        verification_id: body["verificationIds"][0]
            .as_str()
            .unwrap()
            .parse()
            .unwrap(),
        code: body["devCode"].as_str().unwrap().to_string(),
    }
}

#[tokio::test]
async fn correct_code_yields_claim_token_once() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-redeem").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    let started = start_claim(&app, "tok-redeem", "owner").await;

    let request = json!({
        "binToken": "tok-redeem",
        "verificationId": started.verification_id,
        "code": started.code,
    });
    let (status, body) = app.post_json("/claim/verify", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let claim_token = body["claimToken"].as_str().unwrap();
    assert!(!claim_token.is_empty());

    // The claim is inspectable until a credential lands.
    let (status, body) = app
        .get(&format!("/claim/status?claimToken={}", claim_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["binToken"], "tok-redeem");
    assert_eq!(body["role"], "owner");
    assert_eq!(body["credentialCount"], 0);

    // A code redeems exactly once.
    let (status, body) = app.post_json("/claim/verify", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Already used");
}

#[tokio::test]
async fn wrong_code_counts_against_attempt_cap() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-cap").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    let started = start_claim(&app, "tok-cap", "owner").await;
    let wrong = if started.code == "000000" { "000001" } else { "000000" };

    for _ in 0..5 {
        let (status, _) = app
            .post_json(
                "/claim/verify",
                json!({
                    "binToken": "tok-cap",
                    "verificationId": started.verification_id,
                    "code": wrong,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // Even the right code is dead once the cap is hit.
    let (status, body) = app
        .post_json(
            "/claim/verify",
            json!({
                "binToken": "tok-cap",
                "verificationId": started.verification_id,
                "code": started.code,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many attempts");
}

#[tokio::test]
async fn expired_verification_is_rejected() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-stale").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    let started = start_claim(&app, "tok-stale", "owner").await;

    app.expire_verification(started.verification_id, Utc::now() - Duration::minutes(1));

    let (status, body) = app
        .post_json(
            "/claim/verify",
            json!({
                "binToken": "tok-stale",
                "verificationId": started.verification_id,
                "code": started.code,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Expired");
}

#[tokio::test]
async fn code_is_digit_stripped_before_comparison() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-strip").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    let started = start_claim(&app, "tok-strip", "owner").await;

    // Formatting noise around the digits is tolerated.
    let decorated = format!(" {} {}-{} ", &started.code[0..2], &started.code[2..4], &started.code[4..6]);
    let (status, _) = app
        .post_json(
            "/claim/verify",
            json!({
                "binToken": "tok-strip",
                "verificationId": started.verification_id,
                "code": decorated,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn too_few_digits_is_invalid_without_burning_an_attempt() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-short").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    let started = start_claim(&app, "tok-short", "owner").await;

    let (status, body) = app
        .post_json(
            "/claim/verify",
            json!({
                "binToken": "tok-short",
                "verificationId": started.verification_id,
                "code": "12a",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid code");

    let v = app
        .store
        .find_verification(started.verification_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(v.attempts, 0);
}

#[tokio::test]
async fn scan_search_redeems_without_verification_id() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-scan").await;
    app.seed_contact(bin_id, Role::Worker, Some("crew@example.dk"), None)
        .await;
    let started = start_claim(&app, "tok-scan", "worker").await;

    let (status, body) = app
        .post_json(
            "/claim/verify",
            json!({"binToken": "tok-scan", "code": started.code}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["claimToken"].is_string());
}

#[tokio::test]
async fn scan_search_miss_does_not_burn_attempts() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-scanmiss").await;
    app.seed_contact(bin_id, Role::Worker, Some("crew@example.dk"), None)
        .await;
    let started = start_claim(&app, "tok-scanmiss", "worker").await;
    let wrong = if started.code == "000000" { "000001" } else { "000000" };

    let (status, _) = app
        .post_json(
            "/claim/verify",
            json!({"binToken": "tok-scanmiss", "code": wrong}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let v = app
        .store
        .find_verification(started.verification_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(v.attempts, 0);
}

#[tokio::test]
async fn verification_is_bound_to_its_bin() {
    let app = TestApp::spawn();
    let bin_a = app.seed_bin("tok-bin-a").await;
    app.seed_bin("tok-bin-b").await;
    app.seed_contact(bin_a, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    let started = start_claim(&app, "tok-bin-a", "owner").await;

    let (status, _) = app
        .post_json(
            "/claim/verify",
            json!({
                "binToken": "tok-bin-b",
                "verificationId": started.verification_id,
                "code": started.code,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn redeeming_again_reuses_the_activated_user() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-sameuser").await;
    let contact_id = app
        .seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    let user_id = app.seed_user().await;
    assert!(app
        .store
        .activate_contact_if_inactive(contact_id, user_id)
        .await
        .unwrap());

    let started = start_claim(&app, "tok-sameuser", "owner").await;
    let (status, _) = app
        .post_json(
            "/claim/verify",
            json!({
                "binToken": "tok-sameuser",
                "verificationId": started.verification_id,
                "code": started.code,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let memberships = app.store.memberships_for_user(user_id).await.unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].bin_id, bin_id);
}
