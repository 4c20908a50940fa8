//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::entitlement::cache::DEFAULT_TTL;
use crate::entitlement::plans::PlanCatalog;
use crate::error::ConfigError;
use crate::notify::EmailConfig;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Base URL of the hosted functions (generation, billing, checkout).
    pub functions_url: String,
    /// Project key sent alongside the user's bearer token, if required.
    pub functions_api_key: Option<SecretString>,
    /// Honor the per-user test subscription override slot.
    pub allow_test_override: bool,
    /// How long a cached entitlement snapshot stays fresh.
    pub entitlement_ttl: Duration,
    /// Timeout for calls to the hosted functions.
    pub request_timeout: Duration,
    pub plans: PlanCatalog,
    /// SMTP settings; confirmations are only logged when absent.
    pub email: Option<EmailConfig>,
    /// Directory for daily rolling log files.
    pub log_dir: Option<PathBuf>,
    /// Allowed CORS origin. Any origin when unset.
    pub cors_origin: Option<String>,
    /// Shared secret billing webhooks must present in `x-billing-token`.
    pub billing_events_token: Option<SecretString>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let functions_url = get("RECORDS_FUNCTIONS_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("RECORDS_FUNCTIONS_URL".to_string()))?;
        if !functions_url.starts_with("http://") && !functions_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "RECORDS_FUNCTIONS_URL".to_string(),
                message: format!("expected an http(s) URL, got {functions_url}"),
            });
        }

        Ok(Self {
            port: parse_or(&get, "RECORDS_PORT", 8080)?,
            db_path: get("RECORDS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/records.db")),
            functions_url,
            functions_api_key: get("RECORDS_FUNCTIONS_API_KEY").map(SecretString::from),
            allow_test_override: parse_flag(&get, "RECORDS_ALLOW_TEST_OVERRIDE")?,
            entitlement_ttl: Duration::from_secs(parse_or(
                &get,
                "RECORDS_ENTITLEMENT_TTL_SECS",
                DEFAULT_TTL.as_secs(),
            )?),
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "RECORDS_REQUEST_TIMEOUT_SECS",
                30,
            )?),
            plans: PlanCatalog::from_lookup(&get)?,
            email: EmailConfig::from_lookup(&get),
            log_dir: get("RECORDS_LOG_DIR").map(PathBuf::from),
            cors_origin: get("RECORDS_CORS_ORIGIN"),
            billing_events_token: get("RECORDS_BILLING_EVENTS_TOKEN").map(SecretString::from),
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn parse_flag<F>(get: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::entitlement::plans::PlanTier;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[("RECORDS_FUNCTIONS_URL", "https://fn.example.com")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, PathBuf::from("./data/records.db"));
        assert!(!config.allow_test_override);
        assert_eq!(config.entitlement_ttl, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.functions_api_key.is_none());
        assert!(config.email.is_none());
        assert!(config.log_dir.is_none());
        assert!(config.billing_events_token.is_none());
    }

    #[test]
    fn functions_url_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "RECORDS_FUNCTIONS_URL"));

        let err = config_from(&[("RECORDS_FUNCTIONS_URL", "   ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));

        let err = config_from(&[("RECORDS_FUNCTIONS_URL", "fn.example.com")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("RECORDS_FUNCTIONS_URL", "http://localhost:54321/functions/v1"),
            ("RECORDS_PORT", "9000"),
            ("RECORDS_ALLOW_TEST_OVERRIDE", "TRUE"),
            ("RECORDS_ENTITLEMENT_TTL_SECS", "5"),
            ("RECORDS_PLAN_ENTERPRISE_PRODUCT", "prod_live_ent"),
            ("RECORDS_SMTP_HOST", "smtp.example.com"),
            ("RECORDS_LOG_DIR", "/var/log/records"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.allow_test_override);
        assert_eq!(config.entitlement_ttl, Duration::from_secs(5));
        assert_eq!(
            config.plans.tier_for_product("prod_live_ent"),
            Some(PlanTier::Enterprise)
        );
        assert_eq!(config.email.unwrap().smtp_host, "smtp.example.com");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/records")));
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = config_from(&[
            ("RECORDS_FUNCTIONS_URL", "https://fn.example.com"),
            ("RECORDS_PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RECORDS_PORT"));

        let err = config_from(&[
            ("RECORDS_FUNCTIONS_URL", "https://fn.example.com"),
            ("RECORDS_ALLOW_TEST_OVERRIDE", "maybe"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
