use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, error};

use crate::ccsignals::DetectorConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins
    pub cors_origins: Option<String>,

    /// Origins accepted for websocket upgrades in production (comma separated)
    pub allowed_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JWT secret key
    pub auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Redis URL for the shared paste-lock store
    pub redis_url: Option<String>,

    /// Base URL of the generation agent service
    pub agent_url: Option<String>,

    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    // Paste-lock policy
    #[serde(default = "default_paste_delta_threshold")]
    pub paste_delta_threshold: usize,
    #[serde(default = "default_paste_line_threshold")]
    pub paste_line_threshold: usize,
    #[serde(default = "default_unlock_threshold")]
    pub unlock_threshold: f64,
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_simhash_shingle_size")]
    pub simhash_shingle_size: usize,

    /// Outbound frames buffered per connection before sends start failing
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        let config = Self::from_vars(std::env::vars())?;
        info!("✅ Configuration loaded successfully");
        Ok(config)
    }

    /// Parse and validate configuration from `(NAME, value)` pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = match envy::from_iter::<_, Config>(vars) {
            Ok(config) => config,
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                return Err(ConfigError::EnvError(e));
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the paste-lock detector and hub cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.unlock_threshold > 0.0 && self.unlock_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "unlock_threshold must be in (0, 1], got {}",
                self.unlock_threshold
            )));
        }
        if self.lock_ttl_secs == 0 {
            return Err(ConfigError::Invalid("lock_ttl_secs must be positive".to_string()));
        }
        if self.simhash_shingle_size == 0 {
            return Err(ConfigError::Invalid("simhash_shingle_size must be positive".to_string()));
        }
        if self.connection_buffer == 0 {
            return Err(ConfigError::Invalid("connection_buffer must be positive".to_string()));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// Paste-lock policy derived from the configured thresholds
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            paste_delta_threshold: self.paste_delta_threshold,
            paste_line_threshold: self.paste_line_threshold,
            unlock_threshold: self.unlock_threshold,
            lock_ttl: Duration::from_secs(self.lock_ttl_secs),
        }
    }

    /// Parsed `allowed_origins`, trimmed, empty entries dropped
    pub fn allowed_origin_list(&self) -> Vec<String> {
        split_list(self.allowed_origins.as_deref())
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        split_list(self.cors_origins.as_deref())
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            allowed_origins: None,
            auth_jwt_secret: None,
            db_url: None,
            redis_url: None,
            agent_url: None,
            agent_timeout_secs: default_agent_timeout_secs(),
            paste_delta_threshold: default_paste_delta_threshold(),
            paste_line_threshold: default_paste_line_threshold(),
            unlock_threshold: default_unlock_threshold(),
            lock_ttl_secs: default_lock_ttl_secs(),
            simhash_shingle_size: default_simhash_shingle_size(),
            connection_buffer: default_connection_buffer(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_agent_timeout_secs() -> u64 {
    60
}

fn default_paste_delta_threshold() -> usize {
    200
}

fn default_paste_line_threshold() -> usize {
    50
}

fn default_unlock_threshold() -> f64 {
    0.30
}

fn default_lock_ttl_secs() -> u64 {
    60 * 60
}

fn default_simhash_shingle_size() -> usize {
    3
}

fn default_connection_buffer() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.is_development());
        assert!(!config.is_production());
        assert_eq!(config.server_address(), "0.0.0.0:3000");

        let detector = config.detector_config();
        assert_eq!(detector.paste_delta_threshold, 200);
        assert_eq!(detector.paste_line_threshold, 50);
        assert_eq!(detector.lock_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn rejects_out_of_range_unlock_threshold() {
        let config = Config { unlock_threshold: 1.5, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config { unlock_threshold: 0.0, ..Config::default() };
        assert!(config.validate().is_err());
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reads_backends_and_thresholds_from_vars() {
        let config = Config::from_vars(vars(&[
            ("DB_URL", "postgres://localhost/live"),
            ("AUTH_JWT_SECRET", "s3cret"),
            ("UNLOCK_THRESHOLD", "0.5"),
        ]))
        .unwrap();
        assert_eq!(config.db_url.as_deref(), Some("postgres://localhost/live"));
        assert_eq!(config.auth_jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.unlock_threshold, 0.5);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn invalid_value_fails_the_whole_load() {
        let result = Config::from_vars(vars(&[
            ("DB_URL", "postgres://localhost/live"),
            ("UNLOCK_THRESHOLD", "0"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = Config::from_vars(vars(&[("PORT", "not-a-port")]));
        assert!(matches!(result, Err(ConfigError::EnvError(_))));
    }

    #[test]
    fn splits_origin_lists() {
        let config = Config {
            allowed_origins: Some(" https://a.example , ,https://b.example".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.allowed_origin_list(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(config.cors_origin_list().is_empty());
    }
}
