// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Several named registries viewed side by side.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::mode::CompatibilityMode;
use crate::planner::ActionTarget;
use crate::registry::{BackendKind, RegistryClient, RegistryError};
use crate::schema::SchemaVersion;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Global mode and explicit overrides of one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeSnapshot {
    pub global: CompatibilityMode,
    pub overrides: BTreeMap<String, CompatibilityMode>,
}

impl ModeSnapshot {
    pub fn effective(&self, subject: &str) -> CompatibilityMode {
        self.overrides.get(subject).copied().unwrap_or(self.global)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MemberModes {
    Modes(ModeSnapshot),
    Error { error: String },
}

/// Output of [`RegistryFederation::compare_modes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeComparison {
    pub registries: BTreeMap<String, MemberModes>,
}

impl ModeComparison {
    fn snapshots(&self) -> impl Iterator<Item = (&String, &ModeSnapshot)> {
        self.registries.iter().filter_map(|(name, m)| match m {
            MemberModes::Modes(snapshot) => Some((name, snapshot)),
            MemberModes::Error { .. } => None,
        })
    }

    /// Every registry answered and all share one global mode.
    pub fn globals_agree(&self) -> bool {
        let globals: HashSet<CompatibilityMode> = self.snapshots().map(|(_, s)| s.global).collect();
        globals.len() <= 1 && self.snapshots().count() == self.registries.len()
    }

    /// Subjects with an override somewhere whose effective mode is not the
    /// same in every registry that answered.
    pub fn divergent_subjects(&self) -> BTreeMap<String, BTreeMap<String, CompatibilityMode>> {
        let subjects: BTreeSet<&String> = self.snapshots().flat_map(|(_, s)| s.overrides.keys()).collect();
        subjects
            .into_iter()
            .filter_map(|subject| {
                let modes: BTreeMap<String, CompatibilityMode> = self
                    .snapshots()
                    .map(|(name, s)| (name.clone(), s.effective(subject)))
                    .collect();
                let distinct: HashSet<&CompatibilityMode> = modes.values().collect();
                (distinct.len() > 1).then(|| (subject.clone(), modes))
            })
            .collect()
    }
}

/// Reachability of one registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub backend: BackendKind,
    pub healthy: bool,
    pub message: String,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<usize>,
}

/// Per-target result of [`RegistryFederation::set_mode_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SetModeStatus {
    Success,
    Failed { error: String },
}

// ---------------------------------------------------------------------------
// RegistryFederation
// ---------------------------------------------------------------------------

/// Named registry clients queried together. Members are kept in name order,
/// so every result map is deterministic.
#[derive(Default)]
pub struct RegistryFederation {
    members: BTreeMap<String, Arc<dyn RegistryClient>>,
}

impl RegistryFederation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a member.
    pub fn add(&mut self, name: impl Into<String>, client: Arc<dyn RegistryClient>) {
        let name = name.into();
        debug!(registry = %name, backend = %client.backend(), "federation member added");
        self.members.insert(name, client);
    }

    pub fn with_member(mut self, name: impl Into<String>, client: Arc<dyn RegistryClient>) -> Self {
        self.add(name, client);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn RegistryClient>> {
        self.members.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RegistryClient>> {
        self.members.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.members.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Global mode and overrides of every member.
    pub fn compare_modes(&self) -> ModeComparison {
        let registries = self
            .members
            .iter()
            .map(|(name, client)| {
                let modes = match mode_snapshot(client.as_ref()) {
                    Ok(snapshot) => MemberModes::Modes(snapshot),
                    Err(e) => {
                        warn!(registry = %name, error = %e, "could not read compatibility modes");
                        MemberModes::Error { error: e.to_string() }
                    }
                };
                (name.clone(), modes)
            })
            .collect();
        ModeComparison { registries }
    }

    /// Latest surviving version of `subject` in each member that has it.
    pub fn find_subject(&self, subject: &str) -> BTreeMap<String, SchemaVersion> {
        self.members
            .iter()
            .filter_map(|(name, client)| match latest_schema(client.as_ref(), subject) {
                Ok(schema) => Some((name.clone(), schema)),
                Err(e) => {
                    debug!(registry = %name, subject, error = %e, "subject not available");
                    None
                }
            })
            .collect()
    }

    /// List subjects on every member and time the call.
    pub fn health_check(&self) -> BTreeMap<String, HealthStatus> {
        self.members
            .iter()
            .map(|(name, client)| {
                let started = Instant::now();
                let result = client.list_subjects(None);
                let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
                let status = match result {
                    Ok(subjects) => HealthStatus {
                        backend: client.backend(),
                        healthy: true,
                        message: format!("{} registry is healthy", client.backend()),
                        response_time_ms,
                        subjects: Some(subjects.len()),
                    },
                    Err(e) => {
                        warn!(registry = %name, error = %e, "health check failed");
                        HealthStatus {
                            backend: client.backend(),
                            healthy: false,
                            message: format!("health check failed: {}", e),
                            response_time_ms,
                            subjects: None,
                        }
                    }
                };
                (name.clone(), status)
            })
            .collect()
    }

    /// Set `mode` on the named members without any history validation.
    ///
    /// With a prefix every matching subject gets an override; without one
    /// the global mode is switched. Unknown member names are skipped.
    pub fn set_mode_all(
        &self,
        registries: &[&str],
        mode: CompatibilityMode,
        prefix: Option<&str>,
    ) -> BTreeMap<String, BTreeMap<String, SetModeStatus>> {
        let mut results = BTreeMap::new();
        for &name in registries {
            let Some(client) = self.members.get(name) else {
                warn!(registry = name, "unknown registry skipped");
                continue;
            };

            let mut statuses = BTreeMap::new();
            match prefix {
                Some(prefix) => match client.list_subjects(Some(prefix)) {
                    Ok(subjects) => {
                        for subject in subjects {
                            let status = status_of(client.set_mode(Some(&subject), mode));
                            statuses.insert(subject, status);
                        }
                    }
                    Err(e) => {
                        statuses.insert(prefix.to_string(), status_of(Err(e)));
                    }
                },
                None => {
                    statuses.insert(
                        ActionTarget::Global.to_string(),
                        status_of(client.set_mode(None, mode)),
                    );
                }
            }
            info!(registry = name, %mode, targets = statuses.len(), "bulk mode switch");
            results.insert(name.to_string(), statuses);
        }
        results
    }
}

fn status_of(result: Result<(), RegistryError>) -> SetModeStatus {
    match result {
        Ok(()) => SetModeStatus::Success,
        Err(e) => SetModeStatus::Failed { error: e.to_string() },
    }
}

fn mode_snapshot(client: &dyn RegistryClient) -> Result<ModeSnapshot, RegistryError> {
    let global = client.get_mode(None)?;
    let mut overrides = BTreeMap::new();
    for subject in client.list_subjects(None)? {
        if let Some(mode) = client.get_mode_override(&subject)? {
            overrides.insert(subject, mode);
        }
    }
    Ok(ModeSnapshot { global, overrides })
}

fn latest_schema(client: &dyn RegistryClient, subject: &str) -> Result<SchemaVersion, RegistryError> {
    let latest = client
        .list_versions(subject)?
        .into_iter()
        .max()
        .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;
    client.get_schema(subject, latest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::schema::SchemaFormat;

    const ORDER: &str = r#"{"type":"record","name":"Order","fields":[{"name":"id","type":"int"}]}"#;
    const ORDER_V2: &str = r#"{"type":"record","name":"Order","fields":[
        {"name":"id","type":"int"},{"name":"note","type":"string","default":""}]}"#;

    /// Backend whose every call fails.
    struct Unreachable;

    impl RegistryClient for Unreachable {
        fn backend(&self) -> BackendKind {
            BackendKind::Confluent
        }
        fn list_subjects(&self, _: Option<&str>) -> Result<Vec<String>, RegistryError> {
            Err(down())
        }
        fn list_versions(&self, _: &str) -> Result<Vec<u32>, RegistryError> {
            Err(down())
        }
        fn get_schema(&self, _: &str, _: u32) -> Result<SchemaVersion, RegistryError> {
            Err(down())
        }
        fn get_mode(&self, _: Option<&str>) -> Result<CompatibilityMode, RegistryError> {
            Err(down())
        }
        fn get_mode_override(&self, _: &str) -> Result<Option<CompatibilityMode>, RegistryError> {
            Err(down())
        }
        fn set_mode(&self, _: Option<&str>, _: CompatibilityMode) -> Result<(), RegistryError> {
            Err(down())
        }
        fn clear_mode(&self, _: &str) -> Result<(), RegistryError> {
            Err(down())
        }
    }

    fn down() -> RegistryError {
        RegistryError::Backend {
            backend: BackendKind::Confluent,
            message: "connection refused".into(),
        }
    }

    fn federation() -> (Arc<InMemoryRegistry>, Arc<InMemoryRegistry>, RegistryFederation) {
        let prod = Arc::new(InMemoryRegistry::with_default_mode(CompatibilityMode::Full));
        prod.register("orders", ORDER, SchemaFormat::Avro).unwrap();
        prod.register("orders", ORDER_V2, SchemaFormat::Avro).unwrap();
        prod.register("users", ORDER, SchemaFormat::Avro).unwrap();

        let staging = Arc::new(InMemoryRegistry::with_default_mode(CompatibilityMode::Full));
        staging.register("orders", ORDER, SchemaFormat::Avro).unwrap();
        staging.set_mode(Some("orders"), CompatibilityMode::None).unwrap();

        let fed = RegistryFederation::new()
            .with_member("prod", prod.clone())
            .with_member("staging", staging.clone());
        (prod, staging, fed)
    }

    #[test]
    fn compare_modes_reports_divergent_overrides() {
        let (_, _, fed) = federation();
        let comparison = fed.compare_modes();

        assert!(comparison.globals_agree());
        let divergent = comparison.divergent_subjects();
        assert_eq!(divergent.len(), 1);
        assert_eq!(divergent["orders"]["prod"], CompatibilityMode::Full);
        assert_eq!(divergent["orders"]["staging"], CompatibilityMode::None);
    }

    #[test]
    fn unreachable_member_is_reported_not_fatal() {
        let (_, _, fed) = federation();
        let fed = fed.with_member("dr", Arc::new(Unreachable));

        let comparison = fed.compare_modes();
        assert!(matches!(comparison.registries["dr"], MemberModes::Error { .. }));
        assert!(!comparison.globals_agree());

        let health = fed.health_check();
        assert!(health["prod"].healthy);
        assert_eq!(health["prod"].subjects, Some(2));
        assert!(!health["dr"].healthy);
        assert!(health["dr"].message.contains("connection refused"));
    }

    #[test]
    fn find_subject_returns_latest_per_registry() {
        let (_, _, fed) = federation();
        let found = fed.find_subject("orders");
        assert_eq!(found.keys().map(String::as_str).collect::<Vec<_>>(), vec!["prod", "staging"]);
        assert_eq!(found["prod"].version, 2);
        assert_eq!(found["staging"].version, 1);
        assert_eq!(fed.find_subject("users").len(), 1);
        assert!(fed.find_subject("missing").is_empty());
    }

    #[test]
    fn set_mode_all_switches_global_or_prefixed_subjects() {
        let (prod, staging, fed) = federation();

        let results = fed.set_mode_all(&["prod", "ghost"], CompatibilityMode::Backward, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results["prod"]["<global>"], SetModeStatus::Success);
        assert_eq!(prod.get_mode(None).unwrap(), CompatibilityMode::Backward);
        assert_eq!(staging.get_mode(None).unwrap(), CompatibilityMode::Full);

        let results = fed.set_mode_all(&["prod", "staging"], CompatibilityMode::FullTransitive, Some("ord"));
        assert_eq!(results["prod"].keys().collect::<Vec<_>>(), vec!["orders"]);
        assert_eq!(
            staging.get_mode_override("orders").unwrap(),
            Some(CompatibilityMode::FullTransitive)
        );
        assert_eq!(prod.get_mode_override("users").unwrap(), None);
    }
}
