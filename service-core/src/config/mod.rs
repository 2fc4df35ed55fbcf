//! Shared configuration loading.
//!
//! Each service layers its own typed config on top of this common block.
//! `load` sources `.env`, then merges an optional `configuration` file with
//! `APP__`-prefixed environment variables.

use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Settings every service shares.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let merged = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(merged.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_when_unset() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 8080);
    }
}
