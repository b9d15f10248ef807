//! Process configuration, read once from the environment at startup and
//! handed to every component that needs it.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_RATE_PER_SECOND: NonZeroU32 = match NonZeroU32::new(100) {
    Some(n) => n,
    None => unreachable!(),
};
const DEFAULT_RATE_BURST: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(()),
        }
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_level: String,
    pub request_timeout: Duration,
    /// Overrides `https://{Host}` as the base of the proxy's own callback URLs.
    pub public_base_url: Option<String>,
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Connection settings for one WooCommerce-compatible store.
#[derive(Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_base_delay", &self.retry_base_delay)
            .finish()
    }
}

/// Customer-facing pages on the source store.
#[derive(Debug, Clone)]
pub struct ReturnUrls {
    pub success: String,
    pub cancel: String,
    pub error: String,
}

/// Cross-origin rules applied to every route.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// `*` or a list of `http(s)://` origins.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: usize,
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Per-client-IP request budget, enforced in production only.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub per_second: NonZeroU32,
    pub burst: NonZeroU32,
}

#[derive(Clone, Default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub source: StoreConfig,
    pub processing: StoreConfig,
    /// Path of the pay-for-order page on the processing store.
    pub checkout_path: String,
    pub return_urls: ReturnUrls,
    pub webhook: WebhookConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    /// Hosts allowed to send customers to `/redirect`. Blank referrers always pass.
    pub allowed_referrers: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds and validates the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let retry_base_delay = Duration::from_millis(env.parse_or("RETRY_BASE_DELAY_MS", 1000)?);

        let server = ServerConfig {
            host: env.string_or("HOST", "0.0.0.0"),
            port: env.parse_or("PORT", 8080)?,
            environment: env.parse_or("ENVIRONMENT", Environment::Development)?,
            log_level: env.string_or("LOG_LEVEL", "info"),
            request_timeout: Duration::from_secs(env.parse_or("REQUEST_TIMEOUT_SECS", 30)?),
            public_base_url: env.optional("PUBLIC_BASE_URL"),
        };

        let source = env.store("SOURCE", retry_base_delay)?;
        let processing = env.store("PROCESSING", retry_base_delay)?;
        let mut default_referrers: Vec<String> = [&source.base_url, &processing.base_url]
            .into_iter()
            .filter_map(|base| Url::parse(base).ok()?.host_str().map(str::to_string))
            .collect();
        default_referrers.extend(["localhost".to_string(), "127.0.0.1".to_string()]);

        let config = Config {
            source,
            processing,
            checkout_path: env.string_or("PROCESSING_CHECKOUT_PATH", "/checkout"),
            return_urls: ReturnUrls {
                success: env.required("SUCCESS_RETURN_URL")?,
                cancel: env.required("CANCEL_RETURN_URL")?,
                error: env.required("ERROR_RETURN_URL")?,
            },
            webhook: WebhookConfig {
                secret: env.optional("WEBHOOK_SECRET"),
            },
            cors: CorsConfig {
                allowed_origins: env.list_or("CORS_ALLOWED_ORIGINS", &["*"]),
                allowed_methods: env.list_or(
                    "CORS_ALLOWED_METHODS",
                    &["GET", "POST", "PUT", "DELETE", "OPTIONS"],
                ),
                allowed_headers: env.list_or(
                    "CORS_ALLOWED_HEADERS",
                    &["Content-Type", "Authorization", "X-Requested-With"],
                ),
                allow_credentials: env.parse_or("CORS_ALLOW_CREDENTIALS", false)?,
                max_age_secs: env.parse_or("CORS_MAX_AGE", 86_400)?,
            },
            rate_limit: RateLimitConfig {
                per_second: env.parse_or("RATE_LIMIT_PER_SECOND", DEFAULT_RATE_PER_SECOND)?,
                burst: env.parse_or("RATE_LIMIT_BURST", DEFAULT_RATE_BURST)?,
            },
            allowed_referrers: match env.optional("ALLOWED_REFERRER_DOMAINS") {
                Some(_) => env.list_or("ALLOWED_REFERRER_DOMAINS", &[]),
                None => default_referrers,
            },
            server,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for (name, store) in [("SOURCE", &self.source), ("PROCESSING", &self.processing)] {
            if !store.base_url.starts_with("http://") && !store.base_url.starts_with("https://") {
                problems.push(format!("{name}_STORE_URL must be an http(s) URL"));
            }
            if store.retry_attempts == 0 {
                problems.push(format!("{name}_RETRY_ATTEMPTS must be at least 1"));
            }
        }
        if self.server.request_timeout.is_zero() {
            problems.push("REQUEST_TIMEOUT_SECS must be positive".to_string());
        }
        if self.server.is_production() && self.webhook.secret.is_none() {
            problems.push("WEBHOOK_SECRET is required in production".to_string());
        }
        for origin in &self.cors.allowed_origins {
            if origin != "*" && !origin.starts_with("http://") && !origin.starts_with("https://") {
                problems.push(format!("CORS origin '{origin}' must be * or an http(s) URL"));
            }
        }
        if self.cors.allow_credentials && self.cors.allows_any_origin() {
            problems.push("CORS_ALLOW_CREDENTIALS cannot be combined with origin *".to_string());
        }
        let is_token = |v: &str| v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if let Some(bad) = self
            .cors
            .allowed_methods
            .iter()
            .chain(&self.cors.allowed_headers)
            .find(|v| !is_token(v))
        {
            problems.push(format!("CORS method or header '{bad}' is not a valid token"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems.join(", ")))
        }
    }

    /// Origin of the processing store's pay-for-order page.
    pub fn checkout_base(&self) -> String {
        format!(
            "{}/{}",
            self.processing.base_url.trim_end_matches('/'),
            self.checkout_path.trim_matches('/')
        )
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Comma-separated list with blank entries dropped.
    fn list_or(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.optional(key) {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
            None => default.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }

    fn store(
        &self,
        prefix: &'static str,
        retry_base_delay: Duration,
    ) -> Result<StoreConfig, ConfigError> {
        let (url, key, secret, timeout, retries) = match prefix {
            "SOURCE" => (
                "SOURCE_STORE_URL",
                "SOURCE_CONSUMER_KEY",
                "SOURCE_CONSUMER_SECRET",
                "SOURCE_API_TIMEOUT_SECS",
                "SOURCE_RETRY_ATTEMPTS",
            ),
            _ => (
                "PROCESSING_STORE_URL",
                "PROCESSING_CONSUMER_KEY",
                "PROCESSING_CONSUMER_SECRET",
                "PROCESSING_API_TIMEOUT_SECS",
                "PROCESSING_RETRY_ATTEMPTS",
            ),
        };

        Ok(StoreConfig {
            base_url: self.required(url)?.trim_end_matches('/').to_string(),
            consumer_key: self.required(key)?,
            consumer_secret: self.required(secret)?,
            timeout: Duration::from_secs(self.parse_or(timeout, 30)?),
            retry_attempts: self.parse_or(retries, 3)?,
            retry_base_delay,
        })
    }
}
