//! Admin endpoints: bin registration and claim-contact pre-registration.
//!
//! Guarded by a shared API key header; these are back-office calls, not
//! part of the public claim surface.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use validator::Validate;

use crate::models::{random_token, Bin, ClaimContact, Role};
use crate::AppState;
use service_core::error::AppError;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Bin tokens are 16 random bytes, base64url. Long enough to be
/// unguessable, short enough for a QR label.
const BIN_TOKEN_BYTES: usize = 16;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBinRequest {
    #[validate(length(min = 1, max = 256))]
    pub label: String,
    #[validate(length(max = 512))]
    pub address: Option<String>,
    #[validate(length(max = 128))]
    pub municipality: Option<String>,
    #[validate(length(max = 128))]
    pub waste_stream: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBinResponse {
    pub bin_id: Uuid,
    pub bin_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactRequest {
    #[validate(length(min = 1, max = 128))]
    pub bin_token: String,
    pub role: Role,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 32))]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactResponse {
    pub contact_id: Uuid,
}

// ============================================================================
// Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let expected = state.config.security.admin_api_key.as_bytes();
    if presented.is_empty() || presented.as_bytes().ct_eq(expected).unwrap_u8() != 1 {
        return Err(AppError::Unauthorized(anyhow::anyhow!("Invalid admin key")));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /admin/bins
#[tracing::instrument(skip(state, req), fields(label = %req.label))]
pub async fn create_bin(
    State(state): State<AppState>,
    Json(req): Json<CreateBinRequest>,
) -> Result<(StatusCode, Json<CreateBinResponse>), AppError> {
    req.validate()?;

    let bin = Bin::new(req.label, req.address, req.municipality, req.waste_stream);
    let token = random_token(BIN_TOKEN_BYTES);

    state.store.insert_bin(&bin).await?;
    state.store.insert_bin_token(&token, bin.id).await?;

    tracing::info!(bin_id = %bin.id, "Bin registered");

    Ok((
        StatusCode::CREATED,
        Json(CreateBinResponse {
            bin_id: bin.id,
            bin_token: token,
        }),
    ))
}

/// POST /admin/claim-contacts
#[tracing::instrument(skip(state, req), fields(role = %req.role))]
pub async fn create_claim_contact(
    State(state): State<AppState>,
    Json(req): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<CreateContactResponse>), AppError> {
    req.validate()?;

    if req.email.is_none() && req.phone.is_none() {
        return Err(AppError::InvalidInput(anyhow::anyhow!(
            "Contact needs an email or a phone"
        )));
    }

    let bin_id = state
        .store
        .bin_id_by_token(&req.bin_token)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown bin")))?;

    let contact = ClaimContact::new(bin_id, req.role, req.email, req.phone);
    state.store.insert_claim_contact(&contact).await?;

    tracing::info!(contact_id = %contact.id, bin_id = %bin_id, "Claim contact registered");

    Ok((
        StatusCode::CREATED,
        Json(CreateContactResponse {
            contact_id: contact.id,
        }),
    ))
}
