//! Process configuration.
//!
//! Sources, lowest priority first: `config/default`, `config/$WARDEN_ENV`,
//! `config/local`, then `WARDEN__`-prefixed environment variables with
//! `__` separating nested keys (e.g. `WARDEN__AUTH__JWT_ISSUER`).

use serde::Deserialize;
use thiserror::Error;
use warden_auth::{AnomalyConfig, AuthConfig};
use warden_core::store::StoreConfig;
use warden_crypto::FieldEncryptionConfig;
use warden_guard::RateLimitConfig;
use warden_store::{AccountDbConfig, RedisConfig};

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("invalid {section} configuration: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Upper bound on a single event delivery (default: 200 ms).
    pub delivery_timeout_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// How often the status sweep runs (default: 60 seconds).
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub auth: AuthConfig,
    pub anomaly: AnomalyConfig,
    pub rate_limit: RateLimitConfig,
    pub encryption: FieldEncryptionConfig,
    pub store: StoreConfig,
    pub redis: RedisConfig,
    pub account_db: AccountDbConfig,
    pub events: EventsConfig,
    pub maintenance: MaintenanceConfig,
}

fn invalid(section: &'static str) -> impl FnOnce(String) -> ConfigLoadError {
    move |message| ConfigLoadError::Invalid { section, message }
}

impl WardenConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Ok(env) = std::env::var("WARDEN_ENV") {
            builder =
                builder.add_source(config::File::with_name(&format!("config/{env}")).required(false));
        }

        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("WARDEN")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("anomaly.suspicious_ip_ranges")
                    .with_list_parse_key("anomaly.bot_user_agent_patterns")
                    .try_parsing(true),
            );

        let config: WardenConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.auth.validate().map_err(invalid("auth"))?;
        self.anomaly.validate().map_err(invalid("anomaly"))?;
        self.rate_limit.validate().map_err(invalid("rate_limit"))?;
        if self.encryption.master_secret.is_empty() {
            return Err(invalid("encryption")("master_secret must be set".into()));
        }
        if self.store.key_prefix.is_empty() || self.store.operation_timeout_ms == 0 {
            return Err(invalid("store")(
                "key_prefix and operation_timeout_ms must be set".into(),
            ));
        }
        if self.maintenance.interval_secs == 0 {
            return Err(invalid("maintenance")("interval_secs must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> WardenConfig {
        let mut config = WardenConfig::default();
        config.auth.access_token_secret = "a".repeat(32);
        config.auth.refresh_token_secret = "r".repeat(32);
        config.encryption.master_secret = "master".into();
        config
    }

    #[test]
    fn defaults_need_secrets() {
        let err = WardenConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigLoadError::Invalid { section: "auth", .. }));
    }

    #[test]
    fn complete_config_validates() {
        complete().validate().unwrap();
    }

    #[test]
    fn missing_master_secret_is_rejected() {
        let mut config = complete();
        config.encryption.master_secret.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigLoadError::Invalid { section: "encryption", .. }));
    }

    #[test]
    fn nested_sections_deserialize_with_defaults() {
        let config: WardenConfig = serde_json::from_str(
            r#"{ "auth": { "jwt_issuer": "edge" }, "store": { "key_prefix": "edge" } }"#,
        )
        .unwrap();
        assert_eq!(config.auth.jwt_issuer, "edge");
        assert_eq!(config.auth.access_token_lifetime_secs, 900);
        assert_eq!(config.store.key_prefix, "edge");
        assert_eq!(config.rate_limit.limits.auth.max_requests, 10);
    }
}
