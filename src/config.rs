use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATABASE_URL: &str = "sqlite://storefront.db?mode=rwc";
const DEFAULT_YOOKASSA_API_URL: &str = "https://api.yookassa.ru/v3";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_CURRENCY: &str = "RUB";
const DEFAULT_STORE_NAME: &str = "Storefront";
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (SQLite or Postgres)
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Run database migrations on startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    // Database pool tuning
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    #[validate(range(min = 1))]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    #[validate(range(min = 1))]
    pub db_acquire_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    #[validate(range(min = 1))]
    pub db_idle_timeout_secs: u64,

    /// Public base URL of the storefront, used to build payment return URLs
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Static admin token; admin endpoints reject everything when unset
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Restrict admin status changes to the forward fulfillment graph
    #[serde(default)]
    pub admin_strict_transitions: bool,

    // YooKassa redirect provider
    #[serde(default)]
    pub yookassa_shop_id: Option<String>,
    #[serde(default)]
    pub yookassa_secret_key: Option<String>,
    #[serde(default = "default_yookassa_api_url")]
    pub yookassa_api_url: String,

    /// Outbound payment gateway HTTP timeout
    #[serde(default = "default_payment_timeout_secs")]
    #[validate(range(min = 1))]
    pub payment_timeout_secs: u64,

    /// ISO 4217 currency code sent to the gateway
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub payment_currency: String,

    /// Re-query the provider before confirming a webhook
    #[serde(default)]
    pub payment_webhook_verify: bool,

    // Telegram notification sink
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    /// Upper bound on one notification attempt
    #[serde(default = "default_notification_timeout_secs")]
    #[validate(range(min = 1))]
    pub notification_timeout_secs: u64,

    /// Store name shown in payment descriptions
    #[serde(default = "default_store_name")]
    pub store_name: String,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the basics
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: default_true_bool(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            public_base_url: None,
            admin_token: None,
            admin_strict_transitions: false,
            yookassa_shop_id: None,
            yookassa_secret_key: None,
            yookassa_api_url: default_yookassa_api_url(),
            payment_timeout_secs: default_payment_timeout_secs(),
            payment_currency: default_currency(),
            payment_webhook_verify: false,
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_url: default_telegram_api_url(),
            notification_timeout_secs: default_notification_timeout_secs(),
            store_name: default_store_name(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Base URL the payment gateway sends the customer back to.
    pub fn public_base_url(&self) -> String {
        non_empty(&self.public_base_url)
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }

    /// The admin token, if one is configured and non-blank.
    pub fn admin_token(&self) -> Option<&str> {
        non_empty(&self.admin_token)
    }

    /// Shop id and secret key, only when both are present.
    pub fn yookassa_credentials(&self) -> Option<(&str, &str)> {
        non_empty(&self.yookassa_shop_id).zip(non_empty(&self.yookassa_secret_key))
    }

    /// Bot token and chat id, only when both are present.
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        non_empty(&self.telegram_bot_token).zip(non_empty(&self.telegram_chat_id))
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_yookassa_api_url() -> String {
    DEFAULT_YOOKASSA_API_URL.to_string()
}

fn default_payment_timeout_secs() -> u64 {
    15
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_telegram_api_url() -> String {
    DEFAULT_TELEGRAM_API_URL.to_string()
}

fn default_notification_timeout_secs() -> u64 {
    5
}

fn default_store_name() -> String {
    DEFAULT_STORE_NAME.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("payment_currency");
        err.message = Some("Must be a three-letter upper-case ISO 4217 code".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Built-in defaults, before any file or environment layer.
fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("host", DEFAULT_HOST)?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)
}

/// Deserializes and validates an assembled configuration.
pub fn build_app_config(config: Config) -> Result<AppConfig, AppConfigError> {
    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = defaults()?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config = build_app_config(config)?;
    info!(
        environment = %app_config.environment,
        payments = if app_config.yookassa_credentials().is_some() { "yookassa" } else { "stub" },
        "Configuration loaded successfully"
    );
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<AppConfig, AppConfigError> {
        let config = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        build_app_config(config)
    }

    #[test]
    fn defaults_fill_everything_not_provided() {
        let cfg = from_toml("").unwrap();
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.port, 8080);
        assert!(cfg.auto_migrate);
        assert_eq!(cfg.payment_currency, "RUB");
        assert_eq!(cfg.yookassa_api_url, DEFAULT_YOOKASSA_API_URL);
        assert!(cfg.yookassa_credentials().is_none());
        assert!(cfg.admin_token().is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = from_toml(
            r#"
            port = 9000
            admin_token = "s3cret"
            yookassa_shop_id = "123"
            yookassa_secret_key = "live_abc"
            public_base_url = "https://shop.example/"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.admin_token(), Some("s3cret"));
        assert_eq!(cfg.yookassa_credentials(), Some(("123", "live_abc")));
        assert_eq!(cfg.public_base_url(), "https://shop.example");
    }

    #[test]
    fn provider_requires_both_credentials() {
        let cfg = from_toml(r#"yookassa_shop_id = "123""#).unwrap();
        assert!(cfg.yookassa_credentials().is_none());

        let cfg = from_toml(
            r#"
            yookassa_shop_id = "123"
            yookassa_secret_key = "   "
            "#,
        )
        .unwrap();
        assert!(cfg.yookassa_credentials().is_none());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let result = from_toml(
            r#"
            log_level = "loud"
            payment_currency = "rub"
            payment_timeout_secs = 0
            "#,
        );
        match result {
            Err(AppConfigError::Validation(errors)) => {
                let fields = errors.field_errors();
                assert!(fields.contains_key("log_level"));
                assert!(fields.contains_key("payment_currency"));
                assert!(fields.contains_key("payment_timeout_secs"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            from_toml(r#"jwt_secret = "x""#),
            Err(AppConfigError::Load(_))
        ));
    }

    #[test]
    fn base_url_falls_back_to_bind_address() {
        let cfg = AppConfig::new("sqlite::memory:".into(), "127.0.0.1".into(), 3000, "test".into());
        assert_eq!(cfg.public_base_url(), "http://127.0.0.1:3000");
    }
}
