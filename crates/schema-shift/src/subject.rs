// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subjects and their version history.

use serde::{Deserialize, Serialize};

use crate::mode::CompatibilityMode;
use crate::schema::SchemaVersion;

/// Content of one history slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionBody {
    Parsed(SchemaVersion),
    /// The definition exists but could not be parsed.
    Unreadable(String),
}

/// One numbered entry of a subject's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectVersion {
    pub version: u32,
    #[serde(default)]
    pub deleted: bool,
    pub body: VersionBody,
}

impl SubjectVersion {
    pub fn schema(&self) -> Option<&SchemaVersion> {
        match &self.body {
            VersionBody::Parsed(schema) => Some(schema),
            VersionBody::Unreadable(_) => None,
        }
    }
}

/// A named, versioned stream of schema definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    /// Subject-level override; `None` falls back to the registry default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<CompatibilityMode>,
    versions: Vec<SubjectVersion>,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compatibility: None,
            versions: Vec::new(),
        }
    }

    /// Build a subject from already-parsed schemas, numbered by their
    /// `version` field.
    pub fn with_versions(name: impl Into<String>, schemas: Vec<SchemaVersion>) -> Self {
        let mut subject = Self::new(name);
        for schema in schemas {
            subject.insert(schema.version, VersionBody::Parsed(schema));
        }
        subject
    }

    /// Insert (or replace) a version, keeping the history sorted.
    pub fn insert(&mut self, version: u32, body: VersionBody) {
        let entry = SubjectVersion {
            version,
            deleted: false,
            body,
        };
        match self.versions.binary_search_by_key(&version, |v| v.version) {
            Ok(idx) => self.versions[idx] = entry,
            Err(idx) => self.versions.insert(idx, entry),
        }
    }

    pub fn push_schema(&mut self, schema: SchemaVersion) {
        self.insert(schema.version, VersionBody::Parsed(schema));
    }

    pub fn push_unreadable(&mut self, version: u32, reason: impl Into<String>) {
        self.insert(version, VersionBody::Unreadable(reason.into()));
    }

    /// Soft-delete a version; numbering of the others is untouched.
    ///
    /// Returns `false` if the version does not exist.
    pub fn soft_delete(&mut self, version: u32) -> bool {
        match self.versions.iter_mut().find(|v| v.version == version) {
            Some(entry) => {
                entry.deleted = true;
                true
            }
            None => false,
        }
    }

    /// Surviving versions in ascending order.
    pub fn surviving_versions(&self) -> impl Iterator<Item = &SubjectVersion> {
        self.versions.iter().filter(|v| !v.deleted)
    }

    /// Highest surviving version.
    pub fn latest(&self) -> Option<&SubjectVersion> {
        self.surviving_versions().last()
    }

    pub fn version_numbers(&self) -> Vec<u32> {
        self.surviving_versions().map(|v| v.version).collect()
    }

    /// Mode in effect for this subject.
    pub fn effective_mode(&self, registry_default: CompatibilityMode) -> CompatibilityMode {
        self.compatibility.unwrap_or(registry_default)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
