//! Configuration management for the hookrelay service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use hookrelay_dispatch::{
    ClientConfig, PoolConfig, ProviderConfig, ProvisioningConfig, RetryPolicy,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Everything except the provider token has a working default.
///
/// # Example
///
/// ```no_run
/// use hookrelay_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Relaying projects {:?} with {} workers", config.projects, config.max_workers);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    // Worker pool
    /// Number of concurrent dispatch workers.
    ///
    /// Environment variable: `MAX_WORKERS`
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Submissions buffered ahead of busy workers.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Seconds to wait for in-flight tasks on shutdown before cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    // Provider
    /// Bearer token for the delivery provider API. Required.
    ///
    /// Environment variable: `PROVIDER_TOKEN`
    #[serde(default)]
    pub provider_token: String,
    /// Delivery provider API base URL.
    ///
    /// Environment variable: `PROVIDER_BASE_URL`
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,
    /// Per-request timeout for provider calls in seconds.
    ///
    /// Environment variable: `PROVIDER_TIMEOUT_SECONDS`
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: u64,

    // Routing
    /// Projects provisioned at startup, one provider application each.
    ///
    /// Environment variable: `PROJECTS` (e.g. `[dev,prod]`)
    #[serde(default = "default_projects")]
    pub projects: Vec<String>,
    /// Prefix of provider application names.
    ///
    /// Environment variable: `APP_NAME_PREFIX`
    #[serde(default = "default_app_name_prefix")]
    pub app_name_prefix: String,
    /// Delivery rate limit of newly created applications, messages per
    /// second.
    ///
    /// Environment variable: `APP_RATE_LIMIT`
    #[serde(default = "default_app_rate_limit")]
    pub app_rate_limit: u16,
    /// Base URL of the registered webhook endpoints.
    ///
    /// Environment variable: `ENDPOINT_BASE_URL`
    #[serde(default = "default_endpoint_base_url")]
    pub endpoint_base_url: String,

    // Retry
    /// Maximum attempts per provider operation.
    ///
    /// Environment variable: `MAX_RETRY_ATTEMPTS`
    #[serde(default = "default_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `RETRY_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor")]
    pub retry_jitter_factor: f64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides, then validate it.
    ///
    /// # Errors
    ///
    /// Fails when a source cannot be parsed or a value is out of range,
    /// including a missing provider token.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter_factor: self.retry_jitter_factor,
        }
    }

    /// Convert to worker pool configuration.
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig { max_workers: self.max_workers, queue_capacity: self.queue_capacity }
    }

    /// Convert to provider connection settings.
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: self.provider_base_url.clone(),
            token: self.provider_token.clone(),
            timeout: Duration::from_secs(self.provider_timeout_seconds),
            ..Default::default()
        }
    }

    /// Convert to delivery client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint_base_url: self.endpoint_base_url.clone(),
            application_rate_limit: Some(self.app_rate_limit),
        }
    }

    /// Convert to provisioning configuration.
    pub fn to_provisioning_config(&self) -> ProvisioningConfig {
        ProvisioningConfig { app_name_prefix: self.app_name_prefix.clone() }
    }

    /// Request timeout for the HTTP server.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Grace period for draining the worker pool on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Fails when host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Provider token with everything but its last four characters masked.
    pub fn provider_token_masked(&self) -> String {
        let chars: Vec<char> = self.provider_token.chars().collect();
        if chars.len() <= 4 {
            return "***".to_string();
        }
        let visible: String = chars[chars.len() - 4..].iter().collect();
        format!("***{visible}")
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.provider_token.trim().is_empty() {
            anyhow::bail!("provider_token is required (set PROVIDER_TOKEN)");
        }

        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.projects.is_empty() || self.projects.iter().any(|p| p.trim().is_empty()) {
            anyhow::bail!("projects must be a non-empty list of non-empty names");
        }

        if self.max_retry_attempts == 0 {
            anyhow::bail!("max_retry_attempts must be greater than 0");
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("retry_base_delay_ms cannot exceed retry_max_delay_ms");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        if !self.provider_base_url.starts_with("http://")
            && !self.provider_base_url.starts_with("https://")
        {
            anyhow::bail!("provider_base_url must be an http(s) URL");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            provider_token: String::new(),
            provider_base_url: default_provider_base_url(),
            provider_timeout_seconds: default_provider_timeout(),
            projects: default_projects(),
            app_name_prefix: default_app_name_prefix(),
            app_rate_limit: default_app_rate_limit(),
            endpoint_base_url: default_endpoint_base_url(),
            max_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_jitter_factor: default_jitter_factor(),
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_workers() -> usize {
    hookrelay_dispatch::DEFAULT_MAX_WORKERS
}

fn default_queue_capacity() -> usize {
    hookrelay_dispatch::DEFAULT_QUEUE_CAPACITY
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_provider_base_url() -> String {
    "https://api.svix.com".to_string()
}

fn default_provider_timeout() -> u64 {
    hookrelay_dispatch::DEFAULT_PROVIDER_TIMEOUT_SECONDS
}

fn default_projects() -> Vec<String> {
    vec!["dev".to_string()]
}

fn default_app_name_prefix() -> String {
    "hookrelay-".to_string()
}

fn default_app_rate_limit() -> u16 {
    1
}

fn default_endpoint_base_url() -> String {
    "https://example.com/webhooks".to_string()
}

fn default_retry_attempts() -> u32 {
    hookrelay_dispatch::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_jitter_factor() -> f64 {
    0.0
}

fn default_log_level() -> String {
    "info".to_string()
}
