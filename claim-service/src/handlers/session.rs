//! Session introspection and logout.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use uuid::Uuid;

use crate::services::session::SESSION_COOKIE;
use crate::AppState;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub memberships: Vec<MembershipView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipView {
    pub bin_id: Uuid,
    pub role: String,
}

/// GET /session
pub async fn get_session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SessionResponse>, AppError> {
    let cookie = jar
        .get(SESSION_COOKIE)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("No session")))?;

    let claims = state.session.verify(cookie.value())?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("No session")))?;

    let memberships = state
        .store
        .memberships_for_user(user_id)
        .await?
        .into_iter()
        .map(|m| MembershipView {
            bin_id: m.bin_id,
            role: m.role,
        })
        .collect();

    Ok(Json(SessionResponse {
        user_id,
        memberships,
    }))
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    let jar = jar.add(state.session.removal_cookie());
    (jar, StatusCode::NO_CONTENT)
}
