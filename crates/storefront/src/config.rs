//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `STRIPE_SECRET_KEY` - Payment processor secret key
//! - `STRIPE_PUBLISHABLE_KEY` - Payment processor publishable key (sent to the browser)
//! - `STRIPE_WEBHOOK_SECRET` - Payment webhook signing secret
//! - `SHIPPO_API_KEY` - Shipping aggregator API key
//! - `SHIPPO_WEBHOOK_SECRET` - Shipping webhook signing secret
//! - `STORE_ORIGIN_NAME`, `STORE_ORIGIN_STREET1`, `STORE_ORIGIN_CITY`,
//!   `STORE_ORIGIN_STATE`, `STORE_ORIGIN_ZIP`, `STORE_ORIGIN_PHONE`,
//!   `STORE_ORIGIN_EMAIL` - Ship-from address
//! - `SANITY_PROJECT_ID` - CMS project id
//! - `SANITY_DATASET` - CMS dataset name
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STRIPE_API_BASE` - Payment API base URL (default: <https://api.stripe.com>)
//! - `STORE_CURRENCY` - Store currency (default: usd)
//! - `SHIPPO_API_BASE` - Shipping API base URL (default: <https://api.goshippo.com>)
//! - `STORE_ORIGIN_COUNTRY` - Ship-from country (default: US)
//! - `SANITY_API_VERSION` - CMS API version (default: 2024-01-01)
//! - `SANITY_TOKEN` - CMS read token for private datasets
//! - `CART_SYNC_POLICY` - `replace` (default) or `merge`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `json` for structured log lines (default: human-readable)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use threadline_core::CurrencyCode;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Lowercase fragments that mark a copied-from-docs value.
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-", "your_", "changeme", "replace", "placeholder", "example", "password", "xxx",
    "dummy", "insert", "put-your",
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

/// How a guest cart is reconciled with the stored cart at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CartSyncPolicy {
    /// The stored cart replaces the session cart.
    #[default]
    Replace,
    /// Guest lines are merged into the stored cart (larger quantity wins)
    /// and the result is written back.
    Merge,
}

impl std::str::FromStr for CartSyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            other => Err(format!("expected 'replace' or 'merge', got '{other}'")),
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    pub stripe: StripeConfig,
    pub shippo: ShippoConfig,
    pub sanity: SanityConfig,
    pub cart_sync_policy: CartSyncPolicy,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

/// Payment processor configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    pub api_base: String,
    pub secret_key: SecretString,
    /// Safe to expose in the browser.
    pub publishable_key: String,
    pub webhook_secret: SecretString,
    pub currency: CurrencyCode,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .field("publishable_key", &self.publishable_key)
            .field("webhook_secret", &"[REDACTED]")
            .field("currency", &self.currency)
            .finish()
    }
}

/// Ship-from address sent with every rate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAddress {
    pub name: String,
    pub street1: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
    pub email: String,
}

/// Shipping aggregator configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct ShippoConfig {
    pub api_base: String,
    pub api_key: SecretString,
    pub webhook_secret: SecretString,
    pub origin: OriginAddress,
}

impl std::fmt::Debug for ShippoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippoConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Headless CMS configuration.
#[derive(Clone)]
pub struct SanityConfig {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    pub token: Option<SecretString>,
    /// Overrides `https://{project_id}.api.sanity.io`.
    pub api_base: Option<String>,
}

impl std::fmt::Debug for SanityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanityConfig")
            .field("project_id", &self.project_id)
            .field("dataset", &self.dataset)
            .field("api_version", &self.api_version)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
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
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(ConfigError::InvalidEnvVar(".env".to_owned(), e.to_string()));
        }

        let database_url = database_url("STOREFRONT_DATABASE_URL")?;
        let host = parsed("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parsed("STOREFRONT_PORT", "3000")?;
        let base_url = required("STOREFRONT_BASE_URL")?;
        let session_secret = secret("STOREFRONT_SESSION_SECRET")?;
        check_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            stripe: StripeConfig::from_env()?,
            shippo: ShippoConfig::from_env()?,
            sanity: SanityConfig::from_env()?,
            cart_sync_policy: parsed("CART_SYNC_POLICY", "replace")?,
            sentry_dsn: optional("SENTRY_DSN"),
            sentry_environment: optional("SENTRY_ENVIRONMENT"),
            log_json: or_default("LOG_FORMAT", "pretty").eq_ignore_ascii_case("json"),
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

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_base: or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            secret_key: secret("STRIPE_SECRET_KEY")?,
            publishable_key: required("STRIPE_PUBLISHABLE_KEY")?,
            webhook_secret: secret("STRIPE_WEBHOOK_SECRET")?,
            currency: parsed("STORE_CURRENCY", "usd")?,
        })
    }
}

impl ShippoConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_base: or_default("SHIPPO_API_BASE", "https://api.goshippo.com"),
            api_key: secret("SHIPPO_API_KEY")?,
            webhook_secret: secret("SHIPPO_WEBHOOK_SECRET")?,
            origin: OriginAddress {
                name: required("STORE_ORIGIN_NAME")?,
                street1: required("STORE_ORIGIN_STREET1")?,
                city: required("STORE_ORIGIN_CITY")?,
                state: required("STORE_ORIGIN_STATE")?,
                zip: required("STORE_ORIGIN_ZIP")?,
                country: or_default("STORE_ORIGIN_COUNTRY", "US"),
                phone: required("STORE_ORIGIN_PHONE")?,
                email: required("STORE_ORIGIN_EMAIL")?,
            },
        })
    }
}

impl SanityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            project_id: required("SANITY_PROJECT_ID")?,
            dataset: required("SANITY_DATASET")?,
            api_version: or_default("SANITY_API_VERSION", "2024-01-01"),
            token: optional("SANITY_TOKEN").map(SecretString::from),
            api_base: optional("SANITY_API_BASE"),
        })
    }

    /// Base URL of the query API.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.api_base
            .clone()
            .unwrap_or_else(|| format!("https://{}.api.sanity.io", self.project_id))
    }
}

// =============================================================================
// Environment readers
// =============================================================================

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_owned()))
}

/// Unset and blank values are both `None`.
fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn or_default(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| default.to_owned())
}

fn parsed<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
}

/// `primary`, then the generic `DATABASE_URL` shared with the CLI.
fn database_url(primary: &str) -> Result<SecretString, ConfigError> {
    optional(primary)
        .or_else(|| optional("DATABASE_URL"))
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::MissingEnvVar(primary.to_owned()))
}

// =============================================================================
// Secret validation
// =============================================================================

fn insecure(key: &str, reason: String) -> ConfigError {
    ConfigError::InsecureSecret(key.to_owned(), reason)
}

fn check_session_secret(secret: &SecretString, key: &str) -> Result<(), ConfigError> {
    let len = secret.expose_secret().len();
    if len < MIN_SESSION_SECRET_LENGTH {
        return Err(insecure(
            key,
            format!("must be at least {MIN_SESSION_SECRET_LENGTH} characters (got {len})"),
        ));
    }
    Ok(())
}

/// Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, u32> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
    }
    let total: u32 = counts.values().sum();
    if total == 0 {
        return 0.0;
    }

    let total = f64::from(total);
    counts
        .values()
        .map(|&n| {
            let p = f64::from(n) / total;
            -p * p.log2()
        })
        .sum()
}

/// Reject placeholders and low-entropy values.
///
/// Vendor keys carry fixed prefixes (`sk_live_`, `whsec_`, `shippo_live_`);
/// only the part after the last underscore is scored.
fn check_secret_strength(secret: &str, key: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(insecure(
            key,
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let body = secret.rsplit('_').next().unwrap_or(secret);
    let entropy = shannon_entropy(body);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(insecure(
            key,
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }
    Ok(())
}

fn secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = required(key)?;
    check_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
