//! Configuration management.
//!
//! Values come from an optional file layered under `CALLMONITOR__*` environment
//! variables (for example `CALLMONITOR__DATABASE__URL`).

use serde::Deserialize;
use std::time::Duration;

use crate::telemetry::TelemetryConfig;

const ENV_PREFIX: &str = "CALLMONITOR";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Token verification
    pub auth: AuthSettings,

    /// Access resolution
    #[serde(default)]
    pub rbac: RbacConfig,

    /// Logging, metrics and trace export
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
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

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Apply embedded migrations at startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 signing secret for bearer tokens
    pub jwt_secret: String,

    /// Expected `iss` claim
    #[serde(default)]
    pub issuer: Option<String>,

    /// Expected `aud` claim
    #[serde(default)]
    pub audience: Option<String>,

    /// Clock skew tolerance in seconds
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RbacConfig {
    /// Upper bound on each membership or plan lookup
    #[serde(default = "default_lookup_timeout", with = "humantime_serde")]
    pub lookup_timeout: Duration,

    /// Number of recent security events kept in memory
    #[serde(default = "default_security_event_capacity")]
    pub security_event_capacity: usize,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: default_lookup_timeout(),
            security_event_capacity: default_security_event_capacity(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_run_migrations() -> bool { true }
fn default_leeway_secs() -> u64 { 30 }
fn default_lookup_timeout() -> Duration { Duration::from_secs(2) }
fn default_security_event_capacity() -> usize { 256 }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make access checks meaningless.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("database.url must not be empty");
        }
        if self.auth.jwt_secret.len() < 16 {
            anyhow::bail!("auth.jwt_secret must be at least 16 bytes");
        }
        if self.rbac.lookup_timeout.is_zero() {
            anyhow::bail!("rbac.lookup_timeout must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_file_applies_defaults() {
        let file = write_config(
            r#"
            [database]
            url = "postgres://callmonitor@localhost/callmonitor"

            [auth]
            jwt_secret = "0123456789abcdef0123"
            "#,
        );

        let cfg = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.rbac.lookup_timeout, Duration::from_secs(2));
        assert_eq!(cfg.rbac.security_event_capacity, 256);
        assert_eq!(cfg.database.acquire_timeout, Duration::from_secs(5));
        assert!(cfg.database.run_migrations);
    }

    #[test]
    fn test_lookup_timeout_parses_humantime() {
        let file = write_config(
            r#"
            [database]
            url = "postgres://localhost/callmonitor"

            [auth]
            jwt_secret = "0123456789abcdef0123"

            [rbac]
            lookup_timeout = "750ms"
            "#,
        );

        let cfg = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.rbac.lookup_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_short_secret_rejected() {
        let file = write_config(
            r#"
            [database]
            url = "postgres://localhost/callmonitor"

            [auth]
            jwt_secret = "short"
            "#,
        );

        assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
    }
}
