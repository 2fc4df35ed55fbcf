//! Passkey ceremony wrapper.
//!
//! Thin layer over `webauthn-rs`: builds the relying party once at startup
//! and maps ceremony failures into the shared error type. Challenge state
//! produced by the `start_*` calls is serialized into a short-lived private
//! cookie by the handlers, never stored server-side.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use service_core::error::AppError;
use uuid::Uuid;
use webauthn_rs::prelude::*;

use crate::config::WebAuthnConfig;

pub struct WebauthnService {
    webauthn: Webauthn,
}

impl WebauthnService {
    pub fn new(config: &WebAuthnConfig) -> Result<Self, AppError> {
        let rp_origin = Url::parse(&config.rp_origin)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid RP origin: {}", e)))?;

        let webauthn = WebauthnBuilder::new(&config.rp_id, &rp_origin)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid RP config: {}", e)))?
            .rp_name(&config.rp_name)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Webauthn init failed: {}", e)))?;

        Ok(Self { webauthn })
    }

    pub fn start_registration(
        &self,
        user_id: Uuid,
        user_name: &str,
        existing: &[Passkey],
    ) -> Result<(CreationChallengeResponse, PasskeyRegistration), AppError> {
        let exclude: Option<Vec<CredentialID>> = if existing.is_empty() {
            None
        } else {
            Some(existing.iter().map(|p| p.cred_id().clone()).collect())
        };

        self.webauthn
            .start_passkey_registration(user_id, user_name, user_name, exclude)
            .map_err(ceremony_error)
    }

    pub fn finish_registration(
        &self,
        response: &RegisterPublicKeyCredential,
        state: &PasskeyRegistration,
    ) -> Result<Passkey, AppError> {
        self.webauthn
            .finish_passkey_registration(response, state)
            .map_err(ceremony_error)
    }

    pub fn start_authentication(
        &self,
        allowed: &[Passkey],
    ) -> Result<(RequestChallengeResponse, PasskeyAuthentication), AppError> {
        self.webauthn
            .start_passkey_authentication(allowed)
            .map_err(ceremony_error)
    }

    pub fn finish_authentication(
        &self,
        response: &PublicKeyCredential,
        state: &PasskeyAuthentication,
    ) -> Result<AuthenticationResult, AppError> {
        self.webauthn
            .finish_passkey_authentication(response, state)
            .map_err(ceremony_error)
    }
}

/// Stable string form of a credential id, used as the lookup key.
pub fn encode_credential_id(cred_id: &CredentialID) -> String {
    URL_SAFE_NO_PAD.encode(cred_id.as_ref())
}

fn ceremony_error(err: WebauthnError) -> AppError {
    AppError::CeremonyFailed(anyhow::anyhow!("{}", err))
}
