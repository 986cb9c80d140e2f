use crate::scheduling::conflict::RecurringConflictPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub https: Option<HttpsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpsConfig {
    pub enabled: bool,
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Tunables for the broadcast schedule. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Whether occurrences of recurring templates block new entries.
    pub recurring_conflicts: RecurringConflictPolicy,
    pub upcoming_horizon_hours: i64,
    pub upcoming_limit: usize,
    /// Query window used when a request omits `start`/`end`.
    pub default_window_hours_before: i64,
    pub default_window_hours_after: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            recurring_conflicts: RecurringConflictPolicy::Enforce,
            upcoming_horizon_hours: 24,
            upcoming_limit: 10,
            default_window_hours_before: 24,
            default_window_hours_after: 48,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_template() -> &'static str {
        r#"[server]
host = "0.0.0.0"
port = 8080

[server.https]
enabled = false
cert_path = "certs/cert.pem"
key_path = "certs/key.pem"

[database]
# URL for the SQLite database. Ensure the directory exists.
url = "sqlite://radiodesk.db"

[jwt]
secret = "change-me-in-production"
expiration_hours = 24

[logging]
level = "info"

[schedule]
# "enforce" rejects entries that overlap an occurrence of a recurring show,
# "ignore" only checks stored entries.
recurring_conflicts = "enforce"
upcoming_horizon_hours = 24
upcoming_limit = 10
default_window_hours_before = 24
default_window_hours_after = 48
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses() {
        let config: Config = toml::from_str(Config::default_template()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.schedule, ScheduleConfig::default());
    }

    #[test]
    fn schedule_section_is_optional() {
        let config: Config = toml::from_str(
            r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
url = "radiodesk.db"

[jwt]
secret = "s"
expiration_hours = 1

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert!(config.server.https.is_none());
        assert_eq!(config.schedule.upcoming_limit, 10);
        assert_eq!(
            config.schedule.recurring_conflicts,
            RecurringConflictPolicy::Enforce
        );
    }

    #[test]
    fn partial_schedule_section_keeps_defaults() {
        let schedule: ScheduleConfig = toml::from_str(
            r#"
recurring_conflicts = "ignore"
upcoming_limit = 5
"#,
        )
        .unwrap();
        assert_eq!(schedule.recurring_conflicts, RecurringConflictPolicy::Ignore);
        assert_eq!(schedule.upcoming_limit, 5);
        assert_eq!(schedule.upcoming_horizon_hours, 24);
    }
}
