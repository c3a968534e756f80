//! Client configuration
//!
//! Everything the demos read from the environment is collected here so the
//! executor itself never touches ambient state.

use crate::retry::RetryPolicy;
use crate::types::networks;
use crate::{Result, X402Error};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const ENV_PRIVATE_KEY: &str = "PRIVATE_KEY";
pub const ENV_NETWORK: &str = "X402_NETWORK";
pub const ENV_TIMEOUT_SECS: &str = "X402_TIMEOUT_SECS";
pub const ENV_MAX_ATTEMPTS: &str = "X402_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "X402_RETRY_BASE_MS";
pub const ENV_MAX_PAYMENT: &str = "X402_MAX_PAYMENT";
pub const ENV_RESPONSES_DIR: &str = "RESPONSES_DIR";
pub const ENV_ENTITY_STORE_URL: &str = "SPURO_API_URL";

/// Configuration for the executor and the bundled wallet signer
#[derive(Clone)]
pub struct ClientConfig {
    /// Hex private key, always `0x`-prefixed once loaded
    pub private_key: Option<String>,
    /// Network the wallet pays on
    pub network: String,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    /// Largest single payment the wallet will sign, in atomic units
    pub max_payment: Option<u128>,
    /// Directory for persisted responses
    pub responses_dir: PathBuf,
    /// Base URL of the paid entity store, when results are stored remotely
    pub entity_store_url: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("network", &self.network)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("max_payment", &self.max_payment)
            .field("responses_dir", &self.responses_dir)
            .field("entity_store_url", &self.entity_store_url)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            network: networks::BASE_MAINNET.to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            max_payment: None,
            responses_dir: PathBuf::from("./responses"),
            entity_store_url: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var(ENV_PRIVATE_KEY) {
            config.private_key = Some(normalize_private_key(&key));
        }
        if let Some(network) = var(ENV_NETWORK) {
            config.network = network;
        }
        if let Some(secs) = var(ENV_TIMEOUT_SECS) {
            config.timeout = Duration::from_secs(parse_number(ENV_TIMEOUT_SECS, &secs)?);
        }
        if let Some(attempts) = var(ENV_MAX_ATTEMPTS) {
            config.max_attempts = parse_number(ENV_MAX_ATTEMPTS, &attempts)?;
        }
        if let Some(ms) = var(ENV_RETRY_BASE_MS) {
            config.retry_base_delay = Duration::from_millis(parse_number(ENV_RETRY_BASE_MS, &ms)?);
        }
        if let Some(cap) = var(ENV_MAX_PAYMENT) {
            config.max_payment = Some(parse_number(ENV_MAX_PAYMENT, &cap)?);
        }
        if let Some(dir) = var(ENV_RESPONSES_DIR) {
            config.responses_dir = PathBuf::from(dir);
        }
        if let Some(url) = var(ENV_ENTITY_STORE_URL) {
            config.entity_store_url = Some(url.trim().to_string());
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(X402Error::config("Timeout must be greater than zero"));
        }
        if self.max_attempts == 0 {
            return Err(X402Error::config("At least one attempt is required"));
        }
        if !networks::is_supported(&self.network) {
            return Err(X402Error::config(format!(
                "Unsupported network: {} (expected one of {})",
                self.network,
                networks::all_supported().join(", ")
            )));
        }
        if let Some(url) = &self.entity_store_url {
            match Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => {
                    return Err(X402Error::config(format!(
                        "{} must be an http(s) URL, got {:?}",
                        ENV_ENTITY_STORE_URL, url
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn with_private_key(mut self, private_key: impl AsRef<str>) -> Self {
        self.private_key = Some(normalize_private_key(private_key.as_ref()));
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_max_payment(mut self, max_payment: u128) -> Self {
        self.max_payment = Some(max_payment);
        self
    }

    pub fn with_responses_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.responses_dir = dir.into();
        self
    }

    pub fn with_entity_store_url(mut self, url: impl Into<String>) -> Self {
        self.entity_store_url = Some(url.into());
        self
    }

    /// The entity store URL, required by commands that store remotely
    pub fn require_entity_store_url(&self) -> Result<&str> {
        self.entity_store_url.as_deref().ok_or_else(|| {
            X402Error::config(format!("{} is not set", ENV_ENTITY_STORE_URL))
        })
    }

    /// The retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_base_delay)
    }
}

/// Keys exported without the `0x` prefix are accepted
pub fn normalize_private_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with("0x") {
        key.to_string()
    } else {
        format!("0x{}", key)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| X402Error::config(format!("{} must be a number, got {:?}", name, value)))
}
