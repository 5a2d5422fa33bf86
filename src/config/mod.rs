//! Configuration management
//!
//! YAML-based configuration with environment variable override for the
//! config path, defaults for every setting, and an environment mode that
//! switches rate-limit ceilings between development and production.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// SMTP transport (if not set, email dispatch is disabled)
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Session and token policy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Bearer token lifetime
    #[serde(default = "default_session_expiry")]
    pub session_expiry_hours: u64,
    /// Refresh token lifetime
    #[serde(default = "default_refresh_expiry")]
    pub refresh_expiry_days: u64,
    /// Password reset token lifetime
    #[serde(default = "default_reset_token_expiry")]
    pub reset_token_expiry_minutes: u64,
    /// Invitation link lifetime
    #[serde(default = "default_invitation_expiry")]
    pub invitation_expiry_days: u64,
    /// Base URL embedded in reset/invite links
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_expiry_hours: default_session_expiry(),
            refresh_expiry_days: default_refresh_expiry(),
            reset_token_expiry_minutes: default_reset_token_expiry(),
            invitation_expiry_days: default_invitation_expiry(),
            frontend_url: default_frontend_url(),
        }
    }
}

/// Ingress policy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Environment mode; production tightens the general rate-limit ceiling
    #[serde(default)]
    pub environment: Environment,
    /// Origins allowed to make browser (CORS) requests
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// If non-empty, only these client addresses are served (default-open)
    #[serde(default)]
    pub allowed_ips: Vec<IpAddr>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            allowed_origins: default_allowed_origins(),
            allowed_ips: Vec::new(),
        }
    }
}

/// Deployment environment mode
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// SMTP transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    pub from_email: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5080
}

fn default_database_url() -> String {
    "sqlite://data/stayspot.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_session_expiry() -> u64 {
    24
}

fn default_refresh_expiry() -> u64 {
    7
}

fn default_reset_token_expiry() -> u64 {
    60
}

fn default_invitation_expiry() -> u64 {
    7
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "https://stayspot.app".to_string(),
    ]
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "StaySpot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_prefix() -> String {
    "stayspot-identity.log".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from the standard locations
    ///
    /// Order: `STAYSPOT_CONFIG` environment variable, `./config.yaml`,
    /// `/etc/stayspot-identity/config.yaml`. Missing file means defaults.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("STAYSPOT_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_norway::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            } else {
                AppConfig::default()
            }
        } else {
            AppConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("/etc/stayspot-identity/config.yaml"),
        ];
        paths.into_iter().find(|p| p.exists())
    }

    fn validate(&self) -> Result<()> {
        if self.auth.session_expiry_hours == 0 {
            anyhow::bail!("auth.session_expiry_hours must be greater than zero");
        }
        if self.auth.refresh_expiry_days == 0 {
            anyhow::bail!("auth.refresh_expiry_days must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.security.environment, Environment::Development);
        assert!(config.security.allowed_ips.is_empty());
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
server:
  host: 0.0.0.0
  port: 8080
security:
  environment: production
  allowed_origins:
    - https://stayspot.app
  allowed_ips:
    - 10.0.0.1
auth:
  session_expiry_hours: 12
"#;
        let config: AppConfig = serde_norway::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.environment, Environment::Production);
        assert_eq!(config.auth.session_expiry_hours, 12);
        assert_eq!(config.security.allowed_ips.len(), 1);
        // Untouched sections fall back to defaults
        assert_eq!(config.auth.refresh_expiry_days, 7);
    }

    #[test]
    fn test_zero_session_expiry_rejected() {
        let mut config = AppConfig::default();
        config.auth.session_expiry_hours = 0;
        assert!(config.validate().is_err());
    }
}
