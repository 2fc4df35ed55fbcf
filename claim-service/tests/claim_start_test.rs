//! Claim-start flow: target resolution, code issuance, and delivery fan-out.

mod common;

use axum::http::StatusCode;
use claim_service::models::Role;
use claim_service::services::delivery::{MockEmailProvider, MockSmsProvider};
use claim_service::store::Store;
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn unknown_bin_is_not_found() {
    let app = TestApp::spawn();

    let (status, body) = app
        .post_json(
            "/claim/start",
            json!({"binToken": "no-such-bin", "role": "owner"}),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Unknown bin");
}

#[tokio::test]
async fn bin_without_contacts_is_forbidden() {
    let app = TestApp::spawn();
    app.seed_bin("tok-empty").await;

    let (status, _) = app
        .post_json(
            "/claim/start",
            json!({"binToken": "tok-empty", "role": "owner"}),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn issues_one_code_across_both_channels() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-both").await;
    app.seed_contact(
        bin_id,
        Role::Owner,
        Some("ejer@example.dk"),
        Some("+4512345678"),
    )
    .await;

    let (status, body) = app
        .post_json(
            "/claim/start",
            json!({"binToken": "tok-both", "role": "owner"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recovery"], false);
    assert_eq!(body["verificationIds"].as_array().unwrap().len(), 2);

    let code = body["devCode"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    let emails = app.email.sent.lock().unwrap();
    let texts = app.sms.sent.lock().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(texts.len(), 1);
    assert_eq!(emails[0].to, "ejer@example.dk");
    assert_eq!(texts[0].to, "+4512345678");
    // Same code on every channel of the contact.
    assert!(emails[0].body.contains(&code));
    assert!(texts[0].body.contains(&code));
    assert!(emails[0].body.contains("tok-both"));
}

#[tokio::test]
async fn restart_reuses_pending_verification_and_code() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-repeat").await;
    app.seed_contact(bin_id, Role::Worker, Some("crew@example.dk"), None)
        .await;

    let request = json!({"binToken": "tok-repeat", "role": "worker"});
    let (status, first) = app.post_json("/claim/start", request.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = app.post_json("/claim/start", request).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(first["verificationIds"], second["verificationIds"]);
    assert_eq!(first["devCode"], second["devCode"]);

    // Delivery happens on every start, against the same pending code.
    assert_eq!(app.email.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn restart_reseeds_a_row_that_predates_seeds() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-legacy").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;

    let request = json!({"binToken": "tok-legacy", "role": "owner"});
    let (status, first) = app.post_json("/claim/start", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let id: uuid::Uuid = first["verificationIds"][0].as_str().unwrap().parse().unwrap();

    // Rows written before seeds existed carry only a hash. A couple of
    // failed attempts should not survive the upgrade either.
    app.store.clear_verification_seed(id).unwrap();
    app.store.increment_verification_attempts(id).await.unwrap();
    app.store.increment_verification_attempts(id).await.unwrap();

    let (status, second) = app.post_json("/claim/start", request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["verificationIds"], second["verificationIds"]);

    let row = app.store.find_verification(id).await.unwrap().unwrap();
    assert!(row.code_seed.is_some());
    assert_eq!(row.attempts, 0);

    // The reseeded row verifies against the freshly issued code.
    let (status, body) = app
        .post_json(
            "/claim/verify",
            json!({
                "binToken": "tok-legacy",
                "verificationId": id,
                "code": second["devCode"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["claimToken"].is_string());
}

#[tokio::test]
async fn channel_filter_narrows_delivery() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-filter").await;
    app.seed_contact(
        bin_id,
        Role::Owner,
        Some("ejer@example.dk"),
        Some("+4512345678"),
    )
    .await;

    let (status, body) = app
        .post_json(
            "/claim/start",
            json!({
                "binToken": "tok-filter",
                "role": "owner",
                "channel": "Ejer@Example.dk"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verificationIds"].as_array().unwrap().len(), 1);
    assert_eq!(app.email.sent.lock().unwrap().len(), 1);
    assert!(app.sms.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn channel_filter_with_no_match_is_forbidden() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-miss").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;

    let (status, _) = app
        .post_json(
            "/claim/start",
            json!({
                "binToken": "tok-miss",
                "role": "owner",
                "channel": "anden@example.dk"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn split_rows_merge_into_one_contact() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-split").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    app.seed_contact(bin_id, Role::Owner, None, Some("+4512345678"))
        .await;

    let (status, body) = app
        .post_json(
            "/claim/start",
            json!({"binToken": "tok-split", "role": "owner"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    // Both channels now hang off a single merged contact.
    assert_eq!(body["verificationIds"].as_array().unwrap().len(), 2);

    let contacts = app
        .store
        .claim_contacts_for_bin_role(bin_id, "owner")
        .await
        .unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].email.as_deref(), Some("ejer@example.dk"));
    assert_eq!(contacts[0].phone.as_deref(), Some("+4512345678"));

    // One code, shared by both channels of the merged contact.
    let code = body["devCode"].as_str().unwrap();
    assert!(app.email.sent.lock().unwrap()[0].body.contains(code));
    assert!(app.sms.sent.lock().unwrap()[0].body.contains(code));
}

#[tokio::test]
async fn fully_activated_contacts_trigger_recovery() {
    let app = TestApp::spawn();
    let bin_id = app.seed_bin("tok-recover").await;
    let contact_id = app
        .seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;
    let user_id = app.seed_user().await;
    assert!(app
        .store
        .activate_contact_if_inactive(contact_id, user_id)
        .await
        .unwrap());

    let (status, body) = app
        .post_json(
            "/claim/start",
            json!({"binToken": "tok-recover", "role": "owner"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recovery"], true);
    assert_eq!(body["verificationIds"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delivery_failure_still_exposes_dev_code_in_dev() {
    let app =
        TestApp::with_providers(MockEmailProvider::failing(), MockSmsProvider::failing());
    let bin_id = app.seed_bin("tok-downlink").await;
    app.seed_contact(bin_id, Role::Owner, Some("ejer@example.dk"), None)
        .await;

    let (status, body) = app
        .post_json(
            "/claim/start",
            json!({"binToken": "tok-downlink", "role": "owner"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["devCode"].is_string());
}
