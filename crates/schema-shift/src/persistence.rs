// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::mode::CompatibilityMode;
use crate::registry::{InMemoryRegistry, RegistryError, RegistryState, SchemaEntry, SubjectRecord};

const REGISTRY_FILE: &str = "registry.json";
const SUBJECT_CONFIG_FILE: &str = "config.json";

/// `{directory}/registry.json`
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    default_mode: CompatibilityMode,
}

/// `{directory}/{subject}/config.json`
#[derive(Debug, Serialize, Deserialize)]
struct SubjectConfigFile {
    subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compatibility: Option<CompatibilityMode>,
}

// ---------------------------------------------------------------------------
// FilePersistence
// ---------------------------------------------------------------------------

/// File-based snapshot of an [`InMemoryRegistry`].
///
/// Layout:
///   `{directory}/registry.json`             registry-wide mode
///   `{directory}/{subject}/config.json`     subject name and override
///   `{directory}/{subject}/v{version}.json` one file per version
///
/// Soft-deleted versions are written with their `deleted` flag so numbering
/// survives a round trip.
pub struct FilePersistence {
    directory: PathBuf,
}

impl FilePersistence {
    /// Create a new `FilePersistence` rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let directory = directory.into();
        if !directory.exists() {
            fs::create_dir_all(&directory)
                .map_err(|e| io_error("failed to create directory", &directory, e))?;
        }
        Ok(FilePersistence { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Persist the entire registry.  Existing files are overwritten.
    pub fn save(&self, registry: &InMemoryRegistry) -> Result<(), RegistryError> {
        let state = registry.snapshot();

        write_json(
            &self.directory.join(REGISTRY_FILE),
            &RegistryFile {
                default_mode: state.global_mode,
            },
        )?;

        for (name, record) in &state.subjects {
            let subject_dir = self.directory.join(encode_name(name));
            if !subject_dir.exists() {
                fs::create_dir_all(&subject_dir)
                    .map_err(|e| io_error("failed to create subject dir", &subject_dir, e))?;
            }

            write_json(
                &subject_dir.join(SUBJECT_CONFIG_FILE),
                &SubjectConfigFile {
                    subject: name.clone(),
                    compatibility: record.compatibility,
                },
            )?;

            for entry in &record.versions {
                write_json(&subject_dir.join(format!("v{}.json", entry.version)), entry)?;
            }
        }

        info!(
            directory = %self.directory.display(),
            subjects = state.subjects.len(),
            "registry snapshot saved"
        );
        Ok(())
    }

    /// Load a registry from disk.
    ///
    /// A missing directory or `registry.json` yields an empty registry using
    /// `default_mode`.
    pub fn load(&self, default_mode: CompatibilityMode) -> Result<InMemoryRegistry, RegistryError> {
        let mut state = RegistryState {
            global_mode: default_mode,
            subjects: BTreeMap::new(),
        };

        if !self.directory.exists() {
            return Ok(InMemoryRegistry::from_state(state));
        }

        let registry_file = self.directory.join(REGISTRY_FILE);
        if registry_file.exists() {
            let file: RegistryFile = read_json(&registry_file)?;
            state.global_mode = file.default_mode;
        }

        let entries = fs::read_dir(&self.directory)
            .map_err(|e| io_error("failed to read directory", &self.directory, e))?;

        for dir_entry in entries {
            let path = dir_entry
                .map_err(|e| RegistryError::Io(format!("directory entry error: {}", e)))?
                .path();
            if !path.is_dir() {
                continue;
            }
            if let Some((name, record)) = load_subject_dir(&path)? {
                state.subjects.insert(name, record);
            }
        }

        debug!(subjects = state.subjects.len(), "registry snapshot loaded");
        Ok(InMemoryRegistry::from_state(state))
    }
}

fn load_subject_dir(path: &Path) -> Result<Option<(String, SubjectRecord)>, RegistryError> {
    let mut record = SubjectRecord::default();
    let mut name = None;

    let config_path = path.join(SUBJECT_CONFIG_FILE);
    if config_path.exists() {
        let config: SubjectConfigFile = read_json(&config_path)?;
        record.compatibility = config.compatibility;
        name = Some(config.subject);
    }

    let version_files =
        fs::read_dir(path).map_err(|e| io_error("failed to read subject dir", path, e))?;

    for vf in version_files {
        let vpath = vf
            .map_err(|e| RegistryError::Io(format!("version file entry error: {}", e)))?
            .path();

        let fname = match vpath.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if !fname.starts_with('v') || !fname.ends_with(".json") {
            continue;
        }

        let entry: SchemaEntry = read_json(&vpath)?;
        record.versions.push(entry);
    }

    record.versions.sort_by_key(|e| e.version);

    // The dir name is only an encoding; the files carry the real name.
    let name = match name.or_else(|| record.versions.first().map(|e| e.subject.clone())) {
        Some(name) => name,
        None => return Ok(None),
    };
    Ok(Some((name, record)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RegistryError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| RegistryError::Serialization(format!("{}: {}", path.display(), e)))?;
    fs::write(path, json).map_err(|e| io_error("failed to write", path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, RegistryError> {
    let json = fs::read_to_string(path).map_err(|e| io_error("failed to read", path, e))?;
    serde_json::from_str(&json)
        .map_err(|e| RegistryError::Serialization(format!("failed to deserialize {}: {}", path.display(), e)))
}

fn io_error(what: &str, path: &Path, e: std::io::Error) -> RegistryError {
    RegistryError::Io(format!("{} {}: {}", what, path.display(), e))
}

/// Encode a subject name as a single directory name.
///
/// Path separators, characters reserved on common filesystems, control
/// characters and `%` itself become `%XX`, so distinct subjects never share
/// a directory. `.` and `..` have their dots encoded as well.
fn encode_name(name: &str) -> String {
    let dots_only = name == "." || name == "..";
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => {
                out.push_str(&format!("%{:02X}", c as u32))
            }
            '.' if dots_only => out.push_str("%2E"),
            c if c.is_control() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{:02X}", byte));
                }
            }
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
