//! Configuration types for the IP reputation checker.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::LazyLock;

/// Environment variable holding the AbuseIPDB API key.
pub const API_KEY_ENV: &str = "ABUSEIPDB_KEY";

/// Root configuration, loaded once at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// AbuseIPDB upstream settings.
    #[serde(default)]
    pub abuseipdb: AbuseIPDBConfig,

    /// Per-client request limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

/// AbuseIPDB provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AbuseIPDBConfig {
    /// API key (supports ${ENV_VAR} syntax, falls back to `ABUSEIPDB_KEY`).
    #[serde(default)]
    pub api_key: String,

    /// Check endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Only consider reports from the last N days.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// API request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for AbuseIPDBConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_api_url(),
            max_age_days: default_max_age_days(),
            timeout_ms: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.abuseipdb.com/api/v2/check".to_string()
}

fn default_max_age_days() -> u32 {
    90
}

fn default_timeout() -> u64 {
    8000
}

/// Per-client rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Install the limiter at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests allowed per client within one window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Upper bound on clients tracked at once.
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,

    /// Headers to take the client IP from, in order of preference.
    /// Empty means the TCP peer address is used.
    #[serde(default)]
    pub client_ip_headers: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            max_tracked_clients: default_max_tracked_clients(),
            client_ip_headers: Vec::new(),
        }
    }
}

fn default_max_requests() -> u32 {
    30
}

fn default_window_seconds() -> u64 {
    3600
}

fn default_max_tracked_clients() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let expanded = expand_env_vars(content);
        let mut config: Config = serde_yaml::from_str(&expanded)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with the API key taken from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if self.abuseipdb.api_key.trim().is_empty() {
            self.abuseipdb.api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        }
    }

    /// Validate configuration.
    ///
    /// A missing API key is not an error here: the server still starts and
    /// reports itself as misconfigured on every request.
    pub fn validate(&self) -> anyhow::Result<()> {
        let abuseipdb = &self.abuseipdb;
        if !(1..=365).contains(&abuseipdb.max_age_days) {
            anyhow::bail!(
                "max_age_days ({}) must be between 1 and 365",
                abuseipdb.max_age_days
            );
        }

        if abuseipdb.timeout_ms == 0 {
            anyhow::bail!("timeout_ms must be greater than 0");
        }

        if !abuseipdb.api_url.starts_with("http://") && !abuseipdb.api_url.starts_with("https://")
        {
            anyhow::bail!("api_url must be an http(s) URL: {}", abuseipdb.api_url);
        }

        let rate_limit = &self.rate_limit;
        if rate_limit.enabled {
            if rate_limit.max_requests == 0 {
                anyhow::bail!("rate_limit.max_requests must be greater than 0");
            }
            if rate_limit.window_seconds == 0 {
                anyhow::bail!("rate_limit.window_seconds must be greater than 0");
            }
            if rate_limit.max_tracked_clients == 0 {
                anyhow::bail!("rate_limit.max_tracked_clients must be greater than 0");
            }
        }

        Ok(())
    }

    /// The configured API key, or `None` when it is missing or blank.
    pub fn api_key(&self) -> Option<&str> {
        let key = self.abuseipdb.api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# IP Reputation Checker Configuration

server:
  listen: "127.0.0.1:5000"

# AbuseIPDB upstream
abuseipdb:
  api_key: "${ABUSEIPDB_KEY}"   # Empty or missing: every request returns 503
  api_url: "https://api.abuseipdb.com/api/v2/check"
  max_age_days: 90              # Only consider reports from last 90 days
  timeout_ms: 8000              # Single attempt, no retry

# Per-client rate limiting (optional)
rate_limit:
  enabled: true
  max_requests: 30              # 30 requests...
  window_seconds: 3600          # ...per hour
  max_tracked_clients: 10000
  client_ip_headers: []         # e.g. ["x-forwarded-for"] behind a proxy
"#
        .to_string()
    }
}

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> String {
    ENV_VAR_PATTERN.replace_all(content, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.listen, "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.abuseipdb.max_age_days, 90);
        assert_eq!(config.abuseipdb.timeout_ms, 8000);
        assert_eq!(
            config.abuseipdb.api_url,
            "https://api.abuseipdb.com/api/v2/check"
        );
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.max_requests, 30);
        assert_eq!(config.rate_limit.window_seconds, 3600);
        assert!(config.rate_limit.client_ip_headers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("IPREP_TEST_API_KEY", "secret123");
        let input = "api_key: \"${IPREP_TEST_API_KEY}\"";
        let result = expand_env_vars(input);
        assert_eq!(result, "api_key: \"secret123\"");
        std::env::remove_var("IPREP_TEST_API_KEY");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let input = "api_key: \"${IPREP_NONEXISTENT_VAR}\"";
        let result = expand_env_vars(input);
        assert_eq!(result, "api_key: \"\"");
    }

    #[test]
    fn test_api_key_blank_is_missing() {
        let mut config = Config::default();
        config.abuseipdb.api_key = "   ".to_string();
        assert!(config.api_key().is_none());

        config.abuseipdb.api_key = " abc ".to_string();
        assert_eq!(config.api_key(), Some("abc"));
    }

    #[test]
    fn test_parse_config_yaml() {
        let yaml = r#"
server:
  listen: "0.0.0.0:8080"

abuseipdb:
  api_key: "literal-key"
  timeout_ms: 2000

rate_limit:
  enabled: false
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.api_key(), Some("literal-key"));
        assert_eq!(config.abuseipdb.timeout_ms, 2000);
        assert_eq!(config.abuseipdb.max_age_days, 90);
        assert!(!config.rate_limit.enabled);
    }

    #[test]
    fn test_validate_max_age() {
        let mut config = Config::default();
        config.abuseipdb.max_age_days = 0;
        assert!(config.validate().is_err());

        config.abuseipdb.max_age_days = 366;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_timeout() {
        let mut config = Config::default();
        config.abuseipdb.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_api_url() {
        let mut config = Config::default();
        config.abuseipdb.api_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rate_limit_only_when_enabled() {
        let mut config = Config::default();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "abuseipdb:\n  api_key: from-file\n  max_age_days: 30").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.api_key(), Some("from-file"));
        assert_eq!(config.abuseipdb.max_age_days, 30);
    }

    #[test]
    fn test_example_parses() {
        let config: Config = serde_yaml::from_str(&Config::example()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.max_requests, 30);
    }
}
