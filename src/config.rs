// Configuration management

use crate::core::errors::GuardrailError;
use secrecy::SecretString;
use std::env;
use std::path::Path;

/// Default firewall endpoint when none is configured
const DEFAULT_FIREWALL_BASE_URL: &str = "https://firewall.palisade.dev";

/// Application configuration loaded from environment variables
///
/// Supports `.env` loading in development and an optional JSON secrets
/// file whose entries are exported into the environment before the
/// variables are read. All configuration is validated on load.
#[derive(Debug, Clone)]
pub struct Config {
    // Target application and API root
    pub application_id: String,
    pub base_url: String,
    pub environment: String,

    // Policy service root
    pub firewall_base_url: String,

    // OIDC client credentials; authenticated mode is enabled when the
    // client secret is present
    pub oidc_token_url: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret: Option<SecretString>,

    // HTTP client configuration
    pub http_timeout_secs: u64,

    // Dedup cache capacities
    pub request_dedup_capacity: u64,
    pub response_dedup_capacity: u64,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` if present, then the JSON secrets file named by
    /// `PALISADE_SECRETS_FILE` (entries that are not already set in the
    /// environment are exported). Validates all fields.
    pub fn from_env() -> Result<Self, GuardrailError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok(); // Ignore errors (file may not exist)
        }

        if let Ok(path) = env::var("PALISADE_SECRETS_FILE") {
            Self::load_secrets_file(Path::new(&path))?;
        }

        let config = Self {
            application_id: Self::get_required_env("PALISADE_APPLICATION_ID")?,
            base_url: Self::get_required_env("PALISADE_BASE_URL")?,
            environment: Self::get_env_or_default("PALISADE_ENVIRONMENT", "development")?,
            firewall_base_url: Self::get_env_or_default(
                "PALISADE_FIREWALL_BASE_URL",
                DEFAULT_FIREWALL_BASE_URL,
            )?,
            oidc_token_url: Self::get_optional_env("PALISADE_OIDC_TOKEN_URL")?,
            oidc_client_id: Self::get_optional_env("PALISADE_OIDC_CLIENT_ID")?,
            oidc_client_secret: Self::get_optional_env("PALISADE_OIDC_CLIENT_SECRET")?
                .map(SecretString::from),
            http_timeout_secs: Self::parse_u64_or_default("PALISADE_HTTP_TIMEOUT_SECS", 10)?,
            request_dedup_capacity: Self::parse_u64_or_default(
                "PALISADE_REQUEST_DEDUP_CAPACITY",
                crate::state::session_binder::DEFAULT_REQUEST_DEDUP_CAPACITY,
            )?,
            response_dedup_capacity: Self::parse_u64_or_default(
                "PALISADE_RESPONSE_DEDUP_CAPACITY",
                crate::state::response_dedup::DEFAULT_CAPACITY,
            )?,
            log_level: Self::get_env_or_default("PALISADE_LOG_LEVEL", "info")?,
            log_format: Self::get_env_or_default("PALISADE_LOG_FORMAT", "json")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Whether authenticated mode is enabled
    pub fn auth_enabled(&self) -> bool {
        self.oidc_client_secret.is_some()
    }

    /// Export entries from a JSON secrets file into the environment.
    /// Values already present in the environment win.
    fn load_secrets_file(path: &Path) -> Result<(), GuardrailError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GuardrailError::Configuration(format!("Cannot read secrets file {:?}: {}", path, e))
        })?;
        let secrets: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
            .map_err(|e| {
                GuardrailError::Configuration(format!("Invalid secrets file {:?}: {}", path, e))
            })?;

        for (key, value) in secrets {
            if env::var(&key).is_ok() {
                continue;
            }
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            env::set_var(key, value);
        }
        Ok(())
    }

    /// Get environment variable or return default value
    fn get_env_or_default(key: &str, default: &str) -> Result<String, GuardrailError> {
        Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
    }

    /// Get optional environment variable
    fn get_optional_env(key: &str) -> Result<Option<String>, GuardrailError> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Get required environment variable
    fn get_required_env(key: &str) -> Result<String, GuardrailError> {
        let value = env::var(key)
            .map_err(|_| GuardrailError::Configuration(format!("{} not set", key)))?;

        if value.is_empty() {
            return Err(GuardrailError::Configuration(format!("{} is empty", key)));
        }

        Ok(value)
    }

    /// Parse u64 from environment variable or return default
    fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, GuardrailError> {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.parse::<u64>().map_err(|e| {
                    GuardrailError::Configuration(format!(
                        "Invalid {} value '{}': {}",
                        key, value, e
                    ))
                })?;

                if parsed == 0 {
                    return Err(GuardrailError::Configuration(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }

                Ok(parsed)
            }
            _ => Ok(default),
        }
    }

    /// Validate all configuration values
    fn validate(&self) -> Result<(), GuardrailError> {
        Self::validate_url(&self.base_url, "Base URL")?;
        Self::validate_url(&self.firewall_base_url, "Firewall base URL")?;
        if let Some(ref url) = self.oidc_token_url {
            Self::validate_url(url, "OIDC token URL")?;
        }

        // Credentials travel together: a secret without an endpoint and
        // client id cannot authenticate anything.
        if self.oidc_client_secret.is_some()
            && (self.oidc_token_url.is_none() || self.oidc_client_id.is_none())
        {
            return Err(GuardrailError::Configuration(
                "PALISADE_OIDC_TOKEN_URL and PALISADE_OIDC_CLIENT_ID must be set when PALISADE_OIDC_CLIENT_SECRET is set".to_string(),
            ));
        }

        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;

        Ok(())
    }

    /// Validate log level
    fn validate_log_level(level: &str) -> Result<(), GuardrailError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(GuardrailError::Configuration(format!(
                "Invalid PALISADE_LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    /// Validate log format
    fn validate_log_format(format: &str) -> Result<(), GuardrailError> {
        if format != "json" && format != "text" {
            return Err(GuardrailError::Configuration(format!(
                "Invalid PALISADE_LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }

    /// Validate URL format
    fn validate_url(url: &str, description: &str) -> Result<(), GuardrailError> {
        url::Url::parse(url).map_err(|e| {
            GuardrailError::Configuration(format!("Invalid {} '{}': {}", description, url, e))
        })?;
        Ok(())
    }
}

impl Config {
    /// Create a test configuration for unit tests
    ///
    /// Bypasses environment variable loading and validation for tests that
    /// don't need real configuration.
    pub fn test_config() -> Self {
        Self {
            application_id: "app-test".to_string(),
            base_url: "http://localhost:9000".to_string(),
            environment: "test".to_string(),
            firewall_base_url: "http://localhost:9001".to_string(),
            oidc_token_url: None,
            oidc_client_id: None,
            oidc_client_secret: None,
            http_timeout_secs: 10,
            request_dedup_capacity: 1024,
            response_dedup_capacity: 1024,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}
