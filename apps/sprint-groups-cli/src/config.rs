//! CLI configuration.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! SPRINT_DATABASE_URL=sqlite:///var/lib/sprint/groups.db  # default: ~/.sprint/groups.db
//! SPRINT_DEFAULT_MAX_PERSONNEL=30                          # must be at least 1
//! ```
//!
//! Command-line flags take precedence over the environment.

use std::env;

use sprint_groups::{GroupPolicy, DEFAULT_MAX_PERSONNEL};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// `None` opens the default database under the home directory.
    pub database_url: Option<String>,
    pub default_max_personnel: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            default_max_personnel: DEFAULT_MAX_PERSONNEL,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid SPRINT_DEFAULT_MAX_PERSONNEL: {0}. Expected a whole number of at least 1")]
    InvalidMaxPersonnel(String),

    #[error("SPRINT_DATABASE_URL is set but empty")]
    EmptyDatabaseUrl,
}

fn parse_max_personnel(raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::InvalidMaxPersonnel(raw.to_string())),
    }
}

impl CliConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = match env::var("SPRINT_DATABASE_URL") {
            Ok(url) if url.trim().is_empty() => return Err(ConfigError::EmptyDatabaseUrl),
            Ok(url) => Some(url),
            Err(_) => None,
        };

        let default_max_personnel = match env::var("SPRINT_DEFAULT_MAX_PERSONNEL") {
            Ok(raw) => parse_max_personnel(&raw)?,
            Err(_) => DEFAULT_MAX_PERSONNEL,
        };

        Ok(Self {
            database_url,
            default_max_personnel,
        })
    }

    /// Apply command-line flags on top of the environment.
    pub fn with_overrides(
        mut self,
        database_url: Option<String>,
        default_max_personnel: Option<u32>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = database_url {
            self.database_url = Some(url);
        }
        if let Some(max) = default_max_personnel {
            if max < 1 {
                return Err(ConfigError::InvalidMaxPersonnel(max.to_string()));
            }
            self.default_max_personnel = max;
        }
        Ok(self)
    }

    pub fn policy(&self) -> GroupPolicy {
        GroupPolicy {
            default_max_personnel: self.default_max_personnel,
        }
    }
}
