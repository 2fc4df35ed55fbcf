//! Passkey ceremony handlers.
//!
//! Registration is only reachable through a live claim token; login is the
//! steady-state re-auth path. Challenge state lives in short-lived
//! encrypted cookies, so the handlers stay stateless.

use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, PrivateCookieJar, SameSite};
use serde::{Deserialize, Serialize};
use webauthn_rs::prelude::{
    CreationChallengeResponse, Passkey, PasskeyAuthentication, PasskeyRegistration,
    PublicKeyCredential, RegisterPublicKeyCredential, RequestChallengeResponse,
};

use crate::models::{Role, WebAuthnCredential};
use crate::services::binder;
use crate::services::webauthn::encode_credential_id;
use crate::AppState;
use service_core::error::AppError;

const REGISTRATION_COOKIE: &str = "qrlabel_reg";
const AUTHENTICATION_COOKIE: &str = "qrlabel_auth";
const CHALLENGE_TTL_MINUTES: i64 = 5;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOptionsRequest {
    pub claim_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVerifyRequest {
    pub claim_token: String,
    pub credential: RegisterPublicKeyCredential,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVerifyResponse {
    pub redirect_target: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOptionsRequest {
    pub bin_token: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginVerifyRequest {
    pub bin_token: String,
    pub role: Role,
    pub credential: PublicKeyCredential,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginVerifyResponse {
    pub redirect_target: String,
}

/// Registration challenge state carried in the private cookie.
#[derive(Serialize, Deserialize)]
struct RegistrationState {
    claim_token: String,
    registration: PasskeyRegistration,
}

/// Authentication challenge state carried in the private cookie.
#[derive(Serialize, Deserialize)]
struct AuthenticationState {
    bin_token: String,
    role: String,
    authentication: PasskeyAuthentication,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /webauthn/register/options
#[tracing::instrument(skip_all)]
pub async fn register_options(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(req): Json<RegisterOptionsRequest>,
) -> Result<(PrivateCookieJar, Json<CreationChallengeResponse>), AppError> {
    let claim = binder::ensure_claim_usable(state.store.as_ref(), &req.claim_token).await?;

    let existing = load_passkeys(&state, claim.user_id).await?;
    let user_name = format!("{} ({})", claim.bin_token, claim.role);

    let (challenge, registration) =
        state
            .webauthn
            .start_registration(claim.user_id, &user_name, &existing)?;

    let cookie_state = RegistrationState {
        claim_token: req.claim_token,
        registration,
    };
    let jar = jar.add(challenge_cookie(
        REGISTRATION_COOKIE,
        &cookie_state,
        state.config.session.cookie_secure,
    )?);

    Ok((jar, Json(challenge)))
}

/// POST /webauthn/register/verify
#[tracing::instrument(skip_all)]
pub async fn register_verify(
    State(state): State<AppState>,
    private_jar: PrivateCookieJar,
    session_jar: CookieJar,
    Json(req): Json<RegisterVerifyRequest>,
) -> Result<(PrivateCookieJar, CookieJar, Json<RegisterVerifyResponse>), AppError> {
    let cookie_state: RegistrationState = take_challenge(&private_jar, REGISTRATION_COOKIE)?;

    if cookie_state.claim_token != req.claim_token {
        return Err(AppError::CeremonyFailed(anyhow::anyhow!(
            "Challenge does not match this claim"
        )));
    }

    let claim = binder::ensure_claim_usable(state.store.as_ref(), &req.claim_token).await?;

    let passkey = state
        .webauthn
        .finish_registration(&req.credential, &cookie_state.registration)?;

    let credential = WebAuthnCredential::new(
        claim.user_id,
        encode_credential_id(passkey.cred_id()),
        serde_json::to_value(&passkey)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Passkey encoding: {}", e)))?,
    );

    let redirect_target = binder::finalize_claim(state.store.as_ref(), &claim, credential).await?;

    let session_token = state.session.mint(claim.user_id)?;
    let session_jar = session_jar.add(state.session.cookie(session_token));
    let private_jar = private_jar.remove(Cookie::from(REGISTRATION_COOKIE));

    Ok((
        private_jar,
        session_jar,
        Json(RegisterVerifyResponse { redirect_target }),
    ))
}

/// POST /webauthn/login/options
#[tracing::instrument(skip_all, fields(role = %req.role))]
pub async fn login_options(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(req): Json<LoginOptionsRequest>,
) -> Result<(PrivateCookieJar, Json<RequestChallengeResponse>), AppError> {
    // Unknown bin and bin-without-credentials answer identically, so the
    // endpoint cannot be used to probe which tokens exist.
    let no_credentials = || AppError::Unauthorized(anyhow::anyhow!("No credentials registered"));

    let bin_id = state
        .store
        .bin_id_by_token(&req.bin_token)
        .await?
        .ok_or_else(no_credentials)?;

    let members = state
        .store
        .members_for_bin_role(bin_id, req.role.as_str())
        .await?;
    if members.is_empty() {
        return Err(no_credentials());
    }

    let rows = state.store.credentials_for_users(&members).await?;
    let passkeys: Vec<Passkey> = rows
        .iter()
        .filter_map(|row| serde_json::from_value(row.passkey.clone()).ok())
        .collect();
    if passkeys.is_empty() {
        return Err(no_credentials());
    }

    let (challenge, authentication) = state.webauthn.start_authentication(&passkeys)?;

    let cookie_state = AuthenticationState {
        bin_token: req.bin_token,
        role: req.role.as_str().to_string(),
        authentication,
    };
    let jar = jar.add(challenge_cookie(
        AUTHENTICATION_COOKIE,
        &cookie_state,
        state.config.session.cookie_secure,
    )?);

    Ok((jar, Json(challenge)))
}

/// POST /webauthn/login/verify
#[tracing::instrument(skip_all, fields(role = %req.role))]
pub async fn login_verify(
    State(state): State<AppState>,
    private_jar: PrivateCookieJar,
    session_jar: CookieJar,
    Json(req): Json<LoginVerifyRequest>,
) -> Result<(PrivateCookieJar, CookieJar, Json<LoginVerifyResponse>), AppError> {
    let cookie_state: AuthenticationState = take_challenge(&private_jar, AUTHENTICATION_COOKIE)?;

    if cookie_state.bin_token != req.bin_token || cookie_state.role != req.role.as_str() {
        return Err(AppError::CeremonyFailed(anyhow::anyhow!(
            "Challenge does not match this login"
        )));
    }

    let result = state
        .webauthn
        .finish_authentication(&req.credential, &cookie_state.authentication)?;

    let credential_id = encode_credential_id(result.cred_id());
    let row = state
        .store
        .find_credential_by_cred_id(&credential_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("No credentials registered")))?;

    let bin_id = state
        .store
        .bin_id_by_token(&req.bin_token)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("No credentials registered")))?;

    if !state
        .store
        .membership_exists(bin_id, row.user_id, req.role.as_str())
        .await?
    {
        return Err(AppError::Forbidden(anyhow::anyhow!("Not allowed")));
    }

    if result.needs_update() {
        if let Ok(mut passkey) = serde_json::from_value::<Passkey>(row.passkey.clone()) {
            if passkey.update_credential(&result) == Some(true) {
                let updated = serde_json::to_value(&passkey).map_err(|e| {
                    AppError::InternalError(anyhow::anyhow!("Passkey encoding: {}", e))
                })?;
                state
                    .store
                    .update_credential_passkey(&credential_id, &updated)
                    .await?;
            }
        }
    }

    let session_token = state.session.mint(row.user_id)?;
    let session_jar = session_jar.add(state.session.cookie(session_token));
    let private_jar = private_jar.remove(Cookie::from(AUTHENTICATION_COOKIE));

    tracing::info!(user_id = %row.user_id, "Passkey login completed");

    Ok((
        private_jar,
        session_jar,
        Json(LoginVerifyResponse {
            redirect_target: format!("/k/{}", req.bin_token),
        }),
    ))
}

fn challenge_cookie<T: Serialize>(
    name: &'static str,
    value: &T,
    secure: bool,
) -> Result<Cookie<'static>, AppError> {
    let payload = serde_json::to_string(value)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Challenge encoding: {}", e)))?;

    Ok(Cookie::build((name, payload))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(CHALLENGE_TTL_MINUTES))
        .build())
}

fn take_challenge<T: serde::de::DeserializeOwned>(
    jar: &PrivateCookieJar,
    name: &str,
) -> Result<T, AppError> {
    let cookie = jar
        .get(name)
        .ok_or_else(|| AppError::CeremonyFailed(anyhow::anyhow!("Challenge missing or expired")))?;

    serde_json::from_str(cookie.value())
        .map_err(|_| AppError::CeremonyFailed(anyhow::anyhow!("Challenge state unreadable")))
}

async fn load_passkeys(state: &AppState, user_id: uuid::Uuid) -> Result<Vec<Passkey>, AppError> {
    let rows = state.store.credentials_for_user(user_id).await?;
    Ok(rows
        .iter()
        .filter_map(|row| serde_json::from_value(row.passkey.clone()).ok())
        .collect())
}
