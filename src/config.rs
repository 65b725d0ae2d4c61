//! Access-control configuration
//!
//! The slice of the daemon configuration the authorization code consumes.
//! Parsed from YAML with serde, same pattern as the rest of the server
//! configuration: declare the struct, let serde do the parsing, then run a
//! validation pass.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::access::AuthType;

/// Maximum number of system administrator groups.
pub const MAX_SYSTEM_GROUPS: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The server's canonical host name; requests without a governing
    /// location are only admitted from here or from localhost.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Directory holding server state, including `passwd.md5`.
    #[serde(default = "default_server_root")]
    pub server_root: String,

    /// Scheme used when a location demands credentials without naming one.
    #[serde(default = "default_auth_type")]
    pub default_auth_type: AuthType,

    /// Groups whose members are system administrators (`@SYSTEM`).
    #[serde(default = "default_system_groups")]
    pub system_groups: Vec<String>,
}

fn default_server_name() -> String {
    "localhost".to_string()
}

fn default_server_root() -> String {
    "/etc/quill".to_string()
}

fn default_auth_type() -> AuthType {
    AuthType::Basic
}

fn default_system_groups() -> Vec<String> {
    // Same candidates the legacy scheduler probed for, in order.
    vec!["sys".to_string(), "system".to_string(), "root".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            server_root: default_server_root(),
            default_auth_type: default_auth_type(),
            system_groups: default_system_groups(),
        }
    }
}

impl AuthConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: AuthConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML")?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.server_name.is_empty(), "server_name cannot be empty");
        anyhow::ensure!(!self.server_root.is_empty(), "server_root cannot be empty");

        // A location that demands credentials must resolve to a real scheme.
        anyhow::ensure!(
            self.default_auth_type != AuthType::None,
            "default_auth_type cannot be none"
        );

        anyhow::ensure!(
            !self.system_groups.is_empty(),
            "system_groups cannot be empty"
        );
        anyhow::ensure!(
            self.system_groups.len() <= MAX_SYSTEM_GROUPS,
            "Too many system groups: {} (max {})",
            self.system_groups.len(),
            MAX_SYSTEM_GROUPS
        );

        Ok(())
    }
}
