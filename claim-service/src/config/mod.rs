use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub app_name: String,
    pub database: DatabaseConfig,
    pub otp: OtpConfig,
    pub session: SessionConfig,
    pub webauthn: WebAuthnConfig,
    pub smtp: SmtpConfig,
    pub twilio: TwilioConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// HMAC secret for deriving verification codes from stored seeds.
    pub secret: String,
    pub code_ttl_hours: i64,
    pub claim_token_ttl_days: i64,
    /// Dev-only: echo the code in claim-start responses.
    pub expose_dev_code: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub jwt_secret: String,
    pub ttl_days: i64,
    pub cookie_secure: bool,
    /// Key material for the private cookie jar carrying ceremony state.
    pub cookie_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebAuthnConfig {
    pub rp_id: String,
    pub rp_origin: String,
    pub rp_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    pub enabled: bool,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub admin_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub claim_start_attempts: u32,
    pub claim_start_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl ClaimConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let smtp_user = get_optional_env("SMTP_USER");
        let twilio_sid = get_optional_env("TWILIO_ACCOUNT_SID");

        let config = ClaimConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("claim-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            app_name: get_env("APP_NAME", Some("QR Label"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
            },
            otp: OtpConfig {
                secret: get_env("OTP_SECRET", None, is_prod)?,
                code_ttl_hours: get_env("OTP_CODE_TTL_HOURS", Some("24"), is_prod)?
                    .parse()
                    .unwrap_or(24),
                claim_token_ttl_days: get_env("CLAIM_TOKEN_TTL_DAYS", Some("7"), is_prod)?
                    .parse()
                    .unwrap_or(7),
                expose_dev_code: !is_prod
                    && get_env("OTP_EXPOSE_DEV_CODE", Some("false"), false)?
                        .parse()
                        .unwrap_or(false),
            },
            session: SessionConfig {
                jwt_secret: get_env("SESSION_JWT_SECRET", None, is_prod)?,
                ttl_days: get_env("SESSION_TTL_DAYS", Some("30"), is_prod)?
                    .parse()
                    .unwrap_or(30),
                cookie_secure: get_env("SESSION_COOKIE_SECURE", Some("false"), is_prod)?
                    .parse()
                    .unwrap_or(is_prod),
                cookie_key: get_env("COOKIE_KEY", None, is_prod)?,
            },
            webauthn: WebAuthnConfig {
                rp_id: get_env("WEBAUTHN_RP_ID", Some("localhost"), is_prod)?,
                rp_origin: get_env("WEBAUTHN_RP_ORIGIN", Some("http://localhost:3000"), is_prod)?,
                rp_name: get_env("WEBAUTHN_RP_NAME", Some("QR Label"), is_prod)?,
            },
            smtp: SmtpConfig {
                enabled: smtp_user.is_some(),
                host: get_env("SMTP_HOST", Some("localhost"), false)?,
                port: get_env("SMTP_PORT", Some("587"), false)?.parse().unwrap_or(587),
                user: smtp_user.unwrap_or_default(),
                password: get_optional_env("SMTP_PASSWORD").unwrap_or_default(),
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@localhost"), false)?,
                from_name: get_env("SMTP_FROM_NAME", Some("QR Label"), false)?,
            },
            twilio: TwilioConfig {
                enabled: twilio_sid.is_some(),
                account_sid: twilio_sid.unwrap_or_default(),
                auth_token: get_optional_env("TWILIO_AUTH_TOKEN").unwrap_or_default(),
                from_number: get_optional_env("TWILIO_FROM_NUMBER").unwrap_or_default(),
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
                admin_api_key: get_env("ADMIN_API_KEY", None, true)?,
            },
            rate_limit: RateLimitConfig {
                claim_start_attempts: get_env("RATE_LIMIT_CLAIM_START_ATTEMPTS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
                claim_start_window_seconds: get_env(
                    "RATE_LIMIT_CLAIM_START_WINDOW_SECONDS",
                    Some("600"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(600),
                global_ip_limit: get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?
                    .parse()
                    .unwrap_or(100),
                global_ip_window_seconds: get_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.otp.code_ttl_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_CODE_TTL_HOURS must be positive"
            )));
        }

        if self.session.ttl_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_TTL_DAYS must be positive"
            )));
        }

        if self.session.cookie_key.len() < 64 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "COOKIE_KEY must be at least 64 bytes"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.webauthn.rp_origin.starts_with("https://") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "WEBAUTHN_RP_ORIGIN must be https in production"
                )));
            }

            if !self.smtp.enabled && !self.twilio.enabled {
                tracing::warn!("No delivery provider configured, verification codes cannot be sent");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
