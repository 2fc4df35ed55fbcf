//! Signed session issuance for authenticated principals.
//!
//! A session is only mintable after a completed passkey ceremony. Code
//! redemption alone yields a claim token, never a session.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use crate::config::SessionConfig;

pub const SESSION_COOKIE: &str = "qrlabel_session";

#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_days: i64,
    cookie_secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Principal id.
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl SessionService {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl_days: config.ttl_days,
            cookie_secure: config.cookie_secure,
        }
    }

    pub fn mint(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            exp: (now + Duration::days(self.ttl_days)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(self.ttl_days))
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::ZERO)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> SessionService {
        SessionService::new(&SessionConfig {
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
            ttl_days: 30,
            cookie_secure: false,
            cookie_key: String::new(),
        })
    }

    #[test]
    fn mint_and_verify_round_trip() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        let token = service.mint(user_id).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_garbage() {
        let service = test_service();
        assert!(service.verify("not-a-jwt").is_err());
    }

    #[test]
    fn verify_rejects_foreign_signature() {
        let service = test_service();
        let other = SessionService::new(&SessionConfig {
            jwt_secret: "a-different-secret-a-different-secret".to_string(),
            ttl_days: 30,
            cookie_secure: false,
            cookie_key: String::new(),
        });

        let token = other.mint(Uuid::new_v4()).unwrap();
        assert!(service.verify(&token).is_err());
    }
}
