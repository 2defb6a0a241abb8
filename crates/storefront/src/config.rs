//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`). Not needed when `STOREFRONT_STORAGE=memory`.
//!
//! ## Optional
//! - `STOREFRONT_STORAGE` - `postgres` (default) or `memory`
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (default: `http://localhost:3000`)
//! - `STOREFRONT_MUTATION_RETRIES` - Attempts for a conflicting save (default: 3)
//! - `TRACKING_SWEEP_INTERVAL_SECS` - Mock tracking sweep period (default: 600)
//! - `MOCK_DELIVERY_AFTER_SECS` - Mock carrier transit time (default: 120)
//! - `CART_MERGE_POLICY` - `skip` (default) or `report`
//! - `PAYMENT_PROVIDER` - Provider name recorded on payments (default: demo)
//! - `PAYMENT_RECEIPT_BASE_URL` - Prefix for generated receipt URLs
//! - `PAYMENT_WEBHOOK_SECRET` - HMAC secret for webhook signatures
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)
//! - `LOG_FORMAT` - `json` for JSON logs, text otherwise

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_WEBHOOK_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Where carts, orders and the catalog live.
#[derive(Clone)]
pub enum StorageBackend {
    /// `PostgreSQL` at the given URL.
    Postgres(SecretString),
    /// Process memory. Data is lost on restart.
    Memory,
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres(_) => f.write_str("Postgres([REDACTED])"),
            Self::Memory => f.write_str("Memory"),
        }
    }
}

/// How `POST /cart/merge` treats entries it cannot add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Drop invalid entries and return the cart.
    #[default]
    Skip,
    /// Drop invalid entries and list them next to the cart.
    Report,
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "report" => Ok(Self::Report),
            other => Err(format!("expected 'skip' or 'report', got '{other}'")),
        }
    }
}

/// Mock carrier tracking settings.
#[derive(Debug, Clone, Copy)]
pub struct TrackingConfig {
    /// Period of the background sweep.
    pub sweep_interval: Duration,
    /// Time a mock parcel spends in transit before it can be delivered.
    pub delivery_after: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(600),
            delivery_after: Duration::from_secs(120),
        }
    }
}

/// Payment provider settings.
///
/// Implements `Debug` manually to redact the webhook secret.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Provider name recorded on confirmed payments.
    pub provider: String,
    /// Prefix for receipt URLs; the transaction id is appended.
    pub receipt_base_url: Option<String>,
    /// Webhook HMAC secret. Signatures are not checked when unset.
    pub webhook_secret: Option<SecretString>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            provider: "demo".to_string(),
            receipt_base_url: None,
            webhook_secret: None,
        }
    }
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("provider", &self.provider)
            .field("receipt_base_url", &self.receipt_base_url)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Storage backend
    pub storage: StorageBackend,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Attempts for a read-modify-write that hits a version conflict
    pub mutation_retries: u32,
    /// Bulk merge behavior
    pub merge_policy: MergePolicy,
    /// Mock tracking settings
    pub tracking: TrackingConfig,
    /// Payment settings
    pub payments: PaymentConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry transaction sample rate
    pub sentry_traces_sample_rate: f32,
    /// Emit JSON logs
    pub json_logs: bool,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Memory,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            mutation_retries: 3,
            merge_policy: MergePolicy::Skip,
            tracking: TrackingConfig::default(),
            payments: PaymentConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
            json_logs: false,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_source(&EnvSource::Process)
    }

    fn from_source(env: &EnvSource) -> Result<Self, ConfigError> {
        let storage = match env
            .get_or_default("STOREFRONT_STORAGE", "postgres")
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "postgres" => StorageBackend::Postgres(env.database_url("STOREFRONT_DATABASE_URL")?),
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "STOREFRONT_STORAGE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };

        let host = env.parse_or_default("STOREFRONT_HOST", "127.0.0.1")?;
        let port = env.parse_or_default("STOREFRONT_PORT", "3000")?;
        let base_url = env.get_or_default("STOREFRONT_BASE_URL", "http://localhost:3000");
        let mutation_retries: u32 = env.parse_or_default("STOREFRONT_MUTATION_RETRIES", "3")?;
        if mutation_retries == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_MUTATION_RETRIES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let merge_policy = env.parse_or_default("CART_MERGE_POLICY", "skip")?;

        let tracking = TrackingConfig {
            sweep_interval: Duration::from_secs(
                env.parse_or_default("TRACKING_SWEEP_INTERVAL_SECS", "600")?,
            ),
            delivery_after: Duration::from_secs(
                env.parse_or_default("MOCK_DELIVERY_AFTER_SECS", "120")?,
            ),
        };
        if tracking.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "TRACKING_SWEEP_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let webhook_secret = match env.get("PAYMENT_WEBHOOK_SECRET") {
            Some(value) => {
                validate_secret_strength(&value, "PAYMENT_WEBHOOK_SECRET")?;
                let secret = SecretString::from(value);
                validate_secret_length(&secret, "PAYMENT_WEBHOOK_SECRET")?;
                Some(secret)
            }
            None => None,
        };
        let payments = PaymentConfig {
            provider: env.get_or_default("PAYMENT_PROVIDER", "demo"),
            receipt_base_url: env.get("PAYMENT_RECEIPT_BASE_URL"),
            webhook_secret,
        };

        Ok(Self {
            storage,
            host,
            port,
            base_url,
            mutation_retries,
            merge_policy,
            tracking,
            payments,
            sentry_dsn: env.get("SENTRY_DSN"),
            sentry_environment: env.get("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.parse_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: env.parse_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
            json_logs: env
                .get("LOG_FORMAT")
                .is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Source of configuration values.
enum EnvSource {
    Process,
    #[cfg(test)]
    Map(HashMap<String, String>),
}

impl EnvSource {
    /// Get an optional variable. Empty values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        let value = match self {
            Self::Process => std::env::var(key).ok(),
            #[cfg(test)]
            Self::Map(map) => map.get(key).cloned(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to a default.
    fn parse_or_default<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Get database URL with fallback to generic `DATABASE_URL`.
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.get(primary_key)
            .or_else(|| self.get("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }
}

/// Validate that a secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_WEBHOOK_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_WEBHOOK_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
