// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::mode::CompatibilityMode;
use crate::schema::{SchemaFormat, SchemaParseError, SchemaVersion};

// ---------------------------------------------------------------------------
// BackendKind
// ---------------------------------------------------------------------------

/// Registry products a client can front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process store (tests, file snapshots).
    Memory,
    Confluent,
    UnityCatalog,
    AwsGlue,
    AzurePurview,
    Apicurio,
    Karapace,
    Pulsar,
    Redpanda,
    Snowflake,
    GcpDataCatalog,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Confluent => "confluent",
            BackendKind::UnityCatalog => "unity_catalog",
            BackendKind::AwsGlue => "aws_glue",
            BackendKind::AzurePurview => "azure_purview",
            BackendKind::Apicurio => "apicurio",
            BackendKind::Karapace => "karapace",
            BackendKind::Pulsar => "pulsar",
            BackendKind::Redpanda => "redpanda",
            BackendKind::Snowflake => "snowflake",
            BackendKind::GcpDataCatalog => "gcp_data_catalog",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Errors produced by registry clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("version {version} of subject {subject} not found")]
    VersionNotFound { subject: String, version: u32 },

    #[error("schema content is empty")]
    EmptyContent,

    #[error("identical schema content already registered as {subject} v{version}")]
    DuplicateContent { subject: String, version: u32 },

    #[error("{subject} v{version}: {source}")]
    SchemaParse {
        subject: String,
        version: u32,
        #[source]
        source: SchemaParseError,
    },

    #[error("{backend} backend error: {message}")]
    Backend { backend: BackendKind, message: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// RegistryClient
// ---------------------------------------------------------------------------

/// Narrow capability set every registry backend provides.
///
/// `subject = None` addresses the registry-wide mode.
pub trait RegistryClient: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Subjects with at least one surviving version, sorted.
    fn list_subjects(&self, prefix: Option<&str>) -> Result<Vec<String>, RegistryError>;

    /// Surviving version numbers, ascending.
    fn list_versions(&self, subject: &str) -> Result<Vec<u32>, RegistryError>;

    fn get_schema(&self, subject: &str, version: u32) -> Result<SchemaVersion, RegistryError>;

    /// Mode in effect: the subject override if any, else the global mode.
    fn get_mode(&self, subject: Option<&str>) -> Result<CompatibilityMode, RegistryError>;

    /// Explicit subject override only.
    fn get_mode_override(&self, subject: &str) -> Result<Option<CompatibilityMode>, RegistryError>;

    fn set_mode(&self, subject: Option<&str>, mode: CompatibilityMode) -> Result<(), RegistryError>;

    /// Drop a subject override so the global mode applies again.
    fn clear_mode(&self, subject: &str) -> Result<(), RegistryError>;
}

// ---------------------------------------------------------------------------
// SchemaEntry
// ---------------------------------------------------------------------------

/// One registered schema version, stored as raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub subject: String,
    /// Starts at 1; never reused, even after a soft delete.
    pub version: u32,
    pub format: SchemaFormat,
    pub content: String,
    /// 64-bit hash of `content` for fast duplicate checks; recomputed on load.
    pub hash: u64,
    #[serde(default)]
    pub deleted: bool,
    pub registered_at: SystemTime,
}

impl SchemaEntry {
    /// Parse the stored definition.
    pub fn parse(&self) -> Result<SchemaVersion, RegistryError> {
        SchemaVersion::parse(self.format, self.version, &self.content).map_err(|source| {
            RegistryError::SchemaParse {
                subject: self.subject.clone(),
                version: self.version,
                source,
            }
        })
    }
}

/// Per-subject state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<CompatibilityMode>,
    pub versions: Vec<SchemaEntry>,
}

impl SubjectRecord {
    fn has_surviving(&self) -> bool {
        self.versions.iter().any(|e| !e.deleted)
    }

    fn surviving(&self, version: u32) -> Option<&SchemaEntry> {
        self.versions
            .iter()
            .find(|e| e.version == version && !e.deleted)
    }
}

/// Full registry contents, shared with the persistence layer.
#[derive(Debug, Clone)]
pub(crate) struct RegistryState {
    pub(crate) global_mode: CompatibilityMode,
    pub(crate) subjects: BTreeMap<String, SubjectRecord>,
}

// ---------------------------------------------------------------------------
// InMemoryRegistry
// ---------------------------------------------------------------------------

/// In-process registry backend.
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    /// Empty registry with the conventional `BACKWARD` default.
    pub fn new() -> Self {
        Self::with_default_mode(CompatibilityMode::Backward)
    }

    pub fn with_default_mode(global_mode: CompatibilityMode) -> Self {
        Self::from_state(RegistryState {
            global_mode,
            subjects: BTreeMap::new(),
        })
    }

    /// Adopt externally loaded state. Content hashes are recomputed since
    /// `compute_hash` is only stable within one build.
    pub(crate) fn from_state(mut state: RegistryState) -> Self {
        for entry in state.subjects.values_mut().flat_map(|r| r.versions.iter_mut()) {
            entry.hash = compute_hash(&entry.content);
        }
        InMemoryRegistry {
            state: RwLock::new(state),
        }
    }

    /// Copy of the current contents (used by persistence layer).
    pub(crate) fn snapshot(&self) -> RegistryState {
        self.state.read().clone()
    }

    /// Register a new schema version under `subject`.
    ///
    /// Returns the assigned version number.  Content is stored verbatim and
    /// parsed on read, so definitions the checker cannot understand are still
    /// accepted.
    pub fn register(
        &self,
        subject: &str,
        content: &str,
        format: SchemaFormat,
    ) -> Result<u32, RegistryError> {
        if content.trim().is_empty() {
            return Err(RegistryError::EmptyContent);
        }

        let hash = compute_hash(content);
        let mut state = self.state.write();
        let record = state.subjects.entry(subject.to_string()).or_default();

        if let Some(existing) = record
            .versions
            .iter()
            .find(|e| !e.deleted && e.hash == hash && e.content == content)
        {
            return Err(RegistryError::DuplicateContent {
                subject: subject.to_string(),
                version: existing.version,
            });
        }

        let version = record.versions.iter().map(|e| e.version).max().unwrap_or(0) + 1;
        record.versions.push(SchemaEntry {
            subject: subject.to_string(),
            version,
            format,
            content: content.to_string(),
            hash,
            deleted: false,
            registered_at: SystemTime::now(),
        });
        debug!(subject, version, %format, "schema registered");
        Ok(version)
    }

    /// Soft-delete a version.  Later versions keep their numbers.
    pub fn soft_delete(&self, subject: &str, version: u32) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        let record = state
            .subjects
            .get_mut(subject)
            .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;
        let entry = record
            .versions
            .iter_mut()
            .find(|e| e.version == version && !e.deleted)
            .ok_or_else(|| RegistryError::VersionNotFound {
                subject: subject.to_string(),
                version,
            })?;
        entry.deleted = true;
        info!(subject, version, "schema version soft-deleted");
        Ok(())
    }

    /// Raw entry of a surviving version.
    pub fn entry(&self, subject: &str, version: u32) -> Option<SchemaEntry> {
        self.state
            .read()
            .subjects
            .get(subject)
            .and_then(|r| r.surviving(version))
            .cloned()
    }

    pub fn subject_count(&self) -> usize {
        self.state
            .read()
            .subjects
            .values()
            .filter(|r| r.has_surviving())
            .count()
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient for InMemoryRegistry {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn list_subjects(&self, prefix: Option<&str>) -> Result<Vec<String>, RegistryError> {
        let state = self.state.read();
        Ok(state
            .subjects
            .iter()
            .filter(|(name, record)| {
                record.has_surviving() && prefix.map_or(true, |p| name.starts_with(p))
            })
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn list_versions(&self, subject: &str) -> Result<Vec<u32>, RegistryError> {
        let state = self.state.read();
        let record = state
            .subjects
            .get(subject)
            .filter(|r| r.has_surviving())
            .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;
        let mut versions: Vec<u32> = record
            .versions
            .iter()
            .filter(|e| !e.deleted)
            .map(|e| e.version)
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    fn get_schema(&self, subject: &str, version: u32) -> Result<SchemaVersion, RegistryError> {
        let entry = {
            let state = self.state.read();
            let record = state
                .subjects
                .get(subject)
                .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;
            record
                .surviving(version)
                .cloned()
                .ok_or_else(|| RegistryError::VersionNotFound {
                    subject: subject.to_string(),
                    version,
                })?
        };
        entry.parse()
    }

    fn get_mode(&self, subject: Option<&str>) -> Result<CompatibilityMode, RegistryError> {
        let state = self.state.read();
        Ok(subject
            .and_then(|s| state.subjects.get(s))
            .and_then(|r| r.compatibility)
            .unwrap_or(state.global_mode))
    }

    fn get_mode_override(&self, subject: &str) -> Result<Option<CompatibilityMode>, RegistryError> {
        Ok(self
            .state
            .read()
            .subjects
            .get(subject)
            .and_then(|r| r.compatibility))
    }

    fn set_mode(&self, subject: Option<&str>, mode: CompatibilityMode) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        match subject {
            Some(name) => {
                state.subjects.entry(name.to_string()).or_default().compatibility = Some(mode);
            }
            None => state.global_mode = mode,
        }
        debug!(subject = subject.unwrap_or("<global>"), %mode, "mode set");
        Ok(())
    }

    fn clear_mode(&self, subject: &str) -> Result<(), RegistryError> {
        if let Some(record) = self.state.write().subjects.get_mut(subject) {
            record.compatibility = None;
        }
        debug!(subject, "mode override cleared");
        Ok(())
    }
}

/// Compute a 64-bit hash for the given content.
///
/// `DefaultHasher` may change between Rust releases, so persisted hashes are
/// never trusted; see [`InMemoryRegistry::from_state`].
pub(crate) fn compute_hash(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
