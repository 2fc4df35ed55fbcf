//! Claim flow handlers: start (send codes), verify (redeem a code), and
//! claim-token status polling.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::Role;
use crate::services::{binder, issuer, redeemer, resolver};
use crate::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartClaimRequest {
    #[validate(length(min = 1, max = 128))]
    pub bin_token: String,
    pub role: Role,
    /// Restrict delivery to one channel value (an email or phone the
    /// caller already knows). Absent means fan-out to all contacts.
    #[validate(length(min = 1, max = 320))]
    pub channel: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartClaimResponse {
    pub verification_ids: Vec<Uuid>,
    pub recovery: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyClaimRequest {
    #[validate(length(min = 1, max = 128))]
    pub bin_token: String,
    pub verification_id: Option<Uuid>,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyClaimResponse {
    pub claim_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatusQuery {
    pub claim_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatusResponse {
    pub bin_token: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
    /// Lets the client poll for the passkey landing during registration.
    pub credential_count: i64,
}

// ============================================================================
// Handlers
// ============================================================================

#[tracing::instrument(skip(state, req), fields(role = %req.role))]
pub async fn start_claim_impl(
    state: &AppState,
    req: StartClaimRequest,
    meta: issuer::RequestMeta,
) -> Result<StartClaimResponse, AppError> {
    req.validate()?;

    let bin_id = state
        .store
        .bin_id_by_token(&req.bin_token)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown bin")))?;

    let resolved =
        resolver::resolve_targets(state.store.as_ref(), bin_id, req.role, req.channel.as_deref())
            .await?;

    let outcome = issuer::issue_verifications(
        state.store.as_ref(),
        state.email.as_ref(),
        state.sms.as_ref(),
        &state.config,
        bin_id,
        &req.bin_token,
        req.role,
        &resolved.targets,
        &meta,
    )
    .await?;

    Ok(StartClaimResponse {
        verification_ids: outcome.verification_ids,
        recovery: resolved.recovery,
        dev_code: outcome.dev_code,
    })
}

/// POST /claim/start
pub async fn start_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StartClaimRequest>,
) -> Result<(StatusCode, Json<StartClaimResponse>), AppError> {
    let meta = request_meta(&headers);
    let response = start_claim_impl(&state, req, meta).await?;
    Ok((StatusCode::OK, Json(response)))
}

#[tracing::instrument(skip(state, req))]
pub async fn verify_claim_impl(
    state: &AppState,
    req: VerifyClaimRequest,
) -> Result<VerifyClaimResponse, AppError> {
    req.validate()?;

    let outcome = redeemer::redeem(
        state.store.as_ref(),
        &state.config,
        &req.bin_token,
        req.verification_id,
        &req.code,
    )
    .await?;

    Ok(VerifyClaimResponse {
        claim_token: outcome.claim_token,
    })
}

/// POST /claim/verify
pub async fn verify_claim(
    State(state): State<AppState>,
    Json(req): Json<VerifyClaimRequest>,
) -> Result<(StatusCode, Json<VerifyClaimResponse>), AppError> {
    let response = verify_claim_impl(&state, req).await?;
    Ok((StatusCode::OK, Json(response)))
}

/// GET /claim/status
pub async fn claim_status(
    State(state): State<AppState>,
    Query(query): Query<ClaimStatusQuery>,
) -> Result<Json<ClaimStatusResponse>, AppError> {
    let claim = binder::ensure_claim_usable(state.store.as_ref(), &query.claim_token).await?;
    let credential_count = state.store.count_credentials_for_user(claim.user_id).await?;

    Ok(Json(ClaimStatusResponse {
        bin_token: claim.bin_token,
        role: claim.role,
        expires_at: claim.expires_at,
        credential_count,
    }))
}

fn request_meta(headers: &HeaderMap) -> issuer::RequestMeta {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.chars().take(512).collect::<String>())
    };

    issuer::RequestMeta {
        user_agent: header_str(header::USER_AGENT),
        locale: header_str(header::ACCEPT_LANGUAGE),
    }
}
