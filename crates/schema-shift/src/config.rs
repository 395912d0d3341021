// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tool configuration.
//!
//! Supports both programmatic and file-based configuration.  Mode and
//! strategy names are kept as text so they can be matched case-insensitively;
//! [`ShiftConfig::validate`] rejects unknown names up front.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::mode::{CompatibilityMode, UnknownModeError};
use crate::planner::{Strategy, UnknownStrategyError};
use crate::registry::BackendKind;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Mode(#[from] UnknownModeError),

    #[error(transparent)]
    Strategy(#[from] UnknownStrategyError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftConfig {
    /// Log level (trace, debug, info, warn, error) or an env-filter directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub migration: MigrationConfig,

    /// Extra registries for the `federation` commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub federation: Vec<FederationMember>,
}

/// Which registry to talk to.
///
/// `memory` works on a file snapshot under `directory`; `confluent`,
/// `karapace` and `redpanda` use the Confluent REST API at `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Root of the file snapshot.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Global mode used when the snapshot records none.
    #[serde(default = "default_mode")]
    pub default_mode: String,

    /// Base URL of a REST registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Per-request timeout for REST registries.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// A named registry in the `[[federation]]` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationMember {
    pub name: String,

    #[serde(flatten)]
    pub registry: RegistryConfig,
}

/// What to migrate to, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_target_mode")]
    pub target_mode: String,

    /// `selective` or `global`.
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Only subjects starting with this prefix; empty means all.
    #[serde(default)]
    pub subject_prefix: String,

    /// Bulk validation worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::Memory
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_directory() -> PathBuf {
    PathBuf::from("registry-data")
}

fn default_mode() -> String {
    CompatibilityMode::Backward.to_string()
}

fn default_target_mode() -> String {
    CompatibilityMode::FullTransitive.to_string()
}

fn default_strategy() -> String {
    Strategy::Selective.to_string()
}

fn default_workers() -> usize {
    4
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            directory: default_directory(),
            default_mode: default_mode(),
            url: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            target_mode: default_target_mode(),
            strategy: default_strategy(),
            subject_prefix: String::new(),
            workers: default_workers(),
        }
    }
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            registry: RegistryConfig::default(),
            migration: MigrationConfig::default(),
            federation: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Snapshot-backed in-memory registry at `directory`.
    pub fn memory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// REST registry of the given kind at `url`.
    pub fn rest(backend: BackendKind, url: impl Into<String>) -> Self {
        Self {
            backend,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// `true` for backends reached over the Confluent REST API.
    pub fn is_rest(&self) -> bool {
        matches!(
            self.backend,
            BackendKind::Confluent | BackendKind::Karapace | BackendKind::Redpanda
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn default_mode(&self) -> Result<CompatibilityMode, ConfigError> {
        Ok(self.default_mode.parse()?)
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        match self.backend {
            BackendKind::Memory => {
                if self.directory.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid(format!("{}.directory is empty", section)));
                }
            }
            _ if self.is_rest() => {
                if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(ConfigError::Invalid(format!(
                        "{}.url is required for the {} backend",
                        section, self.backend
                    )));
                }
                if self.timeout_secs == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "{}.timeout_secs must be at least 1",
                        section
                    )));
                }
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "{}.backend {} is not supported",
                    section, other
                )))
            }
        }
        self.default_mode()?;
        Ok(())
    }
}

impl ShiftConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry.validate("registry")?;
        if self.migration.workers == 0 {
            return Err(ConfigError::Invalid("migration.workers must be at least 1".into()));
        }

        let mut names = BTreeSet::new();
        for member in &self.federation {
            if member.name.trim().is_empty() {
                return Err(ConfigError::Invalid("federation member without a name".into()));
            }
            if !names.insert(member.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate federation member {}",
                    member.name
                )));
            }
            member.registry.validate(&format!("federation.{}", member.name))?;
        }

        self.target_mode()?;
        self.strategy()?;
        Ok(())
    }

    pub fn default_mode(&self) -> Result<CompatibilityMode, ConfigError> {
        self.registry.default_mode()
    }

    pub fn target_mode(&self) -> Result<CompatibilityMode, ConfigError> {
        Ok(self.migration.target_mode.parse()?)
    }

    pub fn strategy(&self) -> Result<Strategy, ConfigError> {
        Ok(self.migration.strategy.parse()?)
    }

    /// Prefix filter for subject listing, `None` when unset.
    pub fn subject_prefix(&self) -> Option<&str> {
        Some(self.migration.subject_prefix.as_str()).filter(|p| !p.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ShiftConfig::default();
        config.validate().unwrap();
        assert_eq!(config.target_mode().unwrap(), CompatibilityMode::FullTransitive);
        assert_eq!(config.strategy().unwrap(), Strategy::Selective);
        assert_eq!(config.subject_prefix(), None);
    }

    #[test]
    fn parse_full_file() {
        let config: ShiftConfig = toml::from_str(
            r#"
            log_level = "debug"

            [registry]
            directory = "/var/lib/registry"
            default_mode = "forward"

            [migration]
            target_mode = "FULL"
            strategy = "Global"
            subject_prefix = "orders-"
            workers = 8
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_mode().unwrap(), CompatibilityMode::Forward);
        assert_eq!(config.strategy().unwrap(), Strategy::Global);
        assert_eq!(config.subject_prefix(), Some("orders-"));
        assert_eq!(config.migration.workers, 8);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: ShiftConfig = toml::from_str("log_level = \"warn\"").unwrap();
        assert_eq!(config.registry.directory, PathBuf::from("registry-data"));
        assert_eq!(config.migration.workers, 4);
    }

    #[test]
    fn rejects_forward_full() {
        let mut config = ShiftConfig::default();
        config.migration.target_mode = "FORWARD_FULL".into();
        assert!(matches!(config.validate(), Err(ConfigError::Mode(_))));
    }

    #[test]
    fn rejects_zero_workers_and_empty_directory() {
        let mut config = ShiftConfig::default();
        config.migration.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ShiftConfig::default();
        config.registry.directory = PathBuf::new();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_strategy() {
        let mut config = ShiftConfig::default();
        config.migration.strategy = "big-bang".into();
        assert!(matches!(config.validate(), Err(ConfigError::Strategy(_))));
    }

    #[test]
    fn rest_backends_need_a_url() {
        let config: ShiftConfig = toml::from_str(
            r#"
            [registry]
            backend = "confluent"
            url = "http://registry:8081"
            username = "svc"
            timeout_secs = 5
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert!(config.registry.is_rest());
        assert_eq!(config.registry.timeout(), Duration::from_secs(5));
        assert_eq!(config.registry.username.as_deref(), Some("svc"));

        let mut config = ShiftConfig::default();
        config.registry.backend = BackendKind::Karapace;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.registry.backend = BackendKind::AwsGlue;
        config.registry.url = Some("https://glue".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("aws_glue"));
    }

    #[test]
    fn federation_members_are_validated() {
        let config: ShiftConfig = toml::from_str(
            r#"
            [[federation]]
            name = "prod"
            backend = "confluent"
            url = "http://prod:8081"

            [[federation]]
            name = "snapshot"
            directory = "/srv/registry"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.federation.len(), 2);
        assert_eq!(config.federation[1].registry.backend, BackendKind::Memory);

        let mut dup = config.clone();
        dup.federation[1].name = "prod".into();
        assert!(matches!(dup.validate(), Err(ConfigError::Invalid(_))));

        let mut missing_url = config;
        missing_url.federation[0].registry.url = None;
        let err = missing_url.validate().unwrap_err();
        assert!(err.to_string().contains("federation.prod.url"));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shift.toml");
        std::fs::write(&path, "[migration]\nworkers = 2\n").unwrap();
        let config = ShiftConfig::from_file(&path).unwrap();
        assert_eq!(config.migration.workers, 2);
    }
}
