// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability over pedantic
#![allow(clippy::too_many_lines)] // Scenario tests

//! End-to-end migration scenarios
//!
//! Drives the public API from registry contents to applied plans.

use std::sync::Arc;

use schema_shift::{
    check_backward, check_forward, classify_transition, required_checks, transition_matrix,
    ActionTarget, BackendKind, BulkValidator, CancelToken, CompatibilityMode, InMemoryRegistry,
    MigrationService, ReasonCode, RegistryClient, RegistryError, RiskLevel, SchemaFormat,
    SchemaVersion, Strategy, SubjectDecision,
};

const ORDERS_V1: &str = r#"{"type":"record","name":"Order","fields":[
    {"name":"id","type":"int"}]}"#;
const ORDERS_V2: &str = r#"{"type":"record","name":"Order","fields":[
    {"name":"id","type":"int"},
    {"name":"amount","type":"double","default":0.0}]}"#;

const LEGACY_V1: &str = r#"{"type":"record","name":"Legacy","fields":[
    {"name":"id","type":"int"},
    {"name":"name","type":"string"}]}"#;
const LEGACY_V2: &str = r#"{"type":"record","name":"Legacy","fields":[
    {"name":"id","type":"int"}]}"#;

const USER_V1: &str = r#"{"type":"record","name":"User","fields":[
    {"name":"username","type":"string"}]}"#;
const USER_V2: &str = r#"{"type":"record","name":"User","fields":[
    {"name":"user_name","type":"string","aliases":["username"]}]}"#;

const EVENT_V1: &str = r#"{"type":"record","name":"Event","fields":[
    {"name":"id","type":"int"},
    {"name":"x","type":"string"}]}"#;
const EVENT_V2: &str = r#"{"type":"record","name":"Event","fields":[
    {"name":"id","type":"int"},
    {"name":"x","type":"string","default":""}]}"#;
const EVENT_V3: &str = r#"{"type":"record","name":"Event","fields":[
    {"name":"id","type":"int"}]}"#;

fn service_with(subjects: Vec<(&str, Vec<&str>)>) -> MigrationService<InMemoryRegistry> {
    let registry = InMemoryRegistry::new();
    for (name, versions) in subjects {
        for content in versions {
            registry.register(name, content, SchemaFormat::Avro).unwrap();
        }
    }
    MigrationService::new(Arc::new(registry), BulkValidator::new(3))
}

fn avro(version: u32, text: &str) -> SchemaVersion {
    SchemaVersion::parse(SchemaFormat::Avro, version, text).unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn added_field_with_default_passes_full_transitive() {
    let svc = service_with(vec![("orders-value", vec![ORDERS_V1, ORDERS_V2])]);
    let verdict = svc.validate_subject("orders-value", CompatibilityMode::FullTransitive);

    assert!(verdict.overall_safe);
    let check = &verdict.per_version[&1];
    assert!(check.backward.as_ref().unwrap().is_compatible);
    assert!(check.forward.as_ref().unwrap().is_compatible);
}

#[test]
fn removed_required_field_fails_forward_only() {
    let svc = service_with(vec![("legacy-value", vec![LEGACY_V1, LEGACY_V2])]);
    let verdict = svc.validate_subject("legacy-value", CompatibilityMode::FullTransitive);

    assert!(!verdict.overall_safe);
    let check = &verdict.per_version[&1];
    assert!(check.backward.as_ref().unwrap().is_compatible);

    let forward = check.forward.as_ref().unwrap();
    assert!(!forward.is_compatible);
    assert_eq!(forward.violations.len(), 1);
    assert_eq!(forward.violations[0].field, "name");
    assert_eq!(
        forward.violations[0].reason,
        ReasonCode::ReaderFieldMissingDefaultValue
    );
    assert_eq!(verdict.violations().count(), 1);
}

#[test]
fn global_blocked_selective_migrates_the_rest() {
    let svc = service_with(vec![
        ("audit-value", vec![ORDERS_V1]),
        ("orders-value", vec![ORDERS_V1, ORDERS_V2]),
        ("payments-value", vec![ORDERS_V1, ORDERS_V2]),
        ("users-value", vec![USER_V1, USER_V2]),
        ("legacy-value", vec![LEGACY_V1, LEGACY_V2]),
    ]);
    let target = CompatibilityMode::FullTransitive;
    let report = svc.validate_all(None, target, &CancelToken::new()).unwrap();
    assert_eq!(report.summary().compatible, 4);
    assert_eq!(report.summary().incompatible, 1);

    let global = svc.build_plan(&report.verdicts, target, Strategy::Global).unwrap();
    assert!(global.actions.is_empty());
    assert_eq!(
        global.blocked.as_ref().unwrap().failing_subjects,
        vec!["legacy-value".to_string()]
    );

    let selective = svc
        .build_plan(&report.verdicts, target, Strategy::Selective)
        .unwrap();
    assert!(!selective.is_blocked());
    let targets: Vec<ActionTarget> = selective.actions.iter().map(|a| a.target.clone()).collect();
    assert_eq!(
        targets,
        ["audit-value", "orders-value", "payments-value", "users-value"]
            .iter()
            .map(|s| ActionTarget::Subject(s.to_string()))
            .collect::<Vec<_>>()
    );
    assert_eq!(
        selective.decision("legacy-value"),
        Some(SubjectDecision::NeedsFix)
    );

    let outcome = svc.apply_plan(&selective);
    assert!(outcome.is_success());
    assert_eq!(
        svc.registry().get_mode(Some("orders-value")).unwrap(),
        CompatibilityMode::FullTransitive
    );
    assert_eq!(svc.registry().get_mode_override("legacy-value").unwrap(), None);
    assert_eq!(
        svc.registry().get_mode(Some("legacy-value")).unwrap(),
        CompatibilityMode::Backward
    );
}

#[test]
fn aliased_rename_is_compatible_both_ways() {
    let svc = service_with(vec![("users-value", vec![USER_V1, USER_V2])]);
    let verdict = svc.validate_subject("users-value", CompatibilityMode::Full);

    assert!(verdict.overall_safe);
    assert_eq!(verdict.violations().count(), 0);
    let check = &verdict.per_version[&1];
    assert!(check.backward.is_some() && check.forward.is_some());
}

// ---------------------------------------------------------------------------
// Lattice properties
// ---------------------------------------------------------------------------

#[test]
fn every_transition_honours_the_lattice() {
    let matrix = transition_matrix();
    assert_eq!(matrix.len(), 49);

    let backward_only = [CompatibilityMode::Backward, CompatibilityMode::BackwardTransitive];
    let forward_only = [CompatibilityMode::Forward, CompatibilityMode::ForwardTransitive];

    for c in &matrix {
        if c.from == c.to {
            assert_eq!(c.risk_level, RiskLevel::Safe, "{} -> {}", c.from, c.to);
            assert!(!c.requires_history_validation, "{} -> {}", c.from, c.to);
        }
        if c.to == CompatibilityMode::None {
            assert_eq!(c.risk_level, RiskLevel::Safe, "{} -> NONE", c.from);
        }
        if required_checks(c.from).is_subset(&required_checks(c.to)) {
            assert_ne!(c.risk_level, RiskLevel::Dangerous, "{} -> {}", c.from, c.to);
        }
        let opposite = (backward_only.contains(&c.from) && forward_only.contains(&c.to))
            || (forward_only.contains(&c.from) && backward_only.contains(&c.to));
        if opposite {
            assert_eq!(c.risk_level, RiskLevel::Dangerous, "{} -> {}", c.from, c.to);
        }
        assert_eq!(*c, classify_transition(c.from, c.to));
    }
}

#[test]
fn identical_schema_reads_itself() {
    for text in [ORDERS_V2, LEGACY_V1, USER_V2] {
        let schema = avro(1, text);
        assert!(check_backward(&schema, &schema).is_compatible);
        assert!(check_forward(&schema, &schema).is_compatible);
    }
}

#[test]
fn add_then_remove_with_default_round_trips() {
    let base = avro(1, ORDERS_V1);
    let added = avro(2, ORDERS_V2);
    let restored = avro(3, ORDERS_V1);

    for (new, old) in [(&added, &base), (&restored, &added), (&restored, &base)] {
        assert!(check_backward(new, old).is_compatible);
        assert!(check_forward(new, old).is_compatible);
    }
}

// ---------------------------------------------------------------------------
// History handling
// ---------------------------------------------------------------------------

#[test]
fn soft_deleted_versions_are_skipped() {
    let svc = service_with(vec![("legacy-value", vec![LEGACY_V1, LEGACY_V2, ORDERS_V1])]);
    svc.registry().soft_delete("legacy-value", 2).unwrap();

    let verdict = svc.validate_subject("legacy-value", CompatibilityMode::Forward);
    assert_eq!(verdict.latest_version, Some(3));
    assert_eq!(verdict.per_version.keys().copied().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn one_unreadable_subject_does_not_stop_the_batch() {
    let svc = service_with(vec![
        ("orders-value", vec![ORDERS_V1, ORDERS_V2]),
        ("users-value", vec![USER_V1, USER_V2]),
    ]);
    svc.registry()
        .register("proto-value", "syntax = \"proto3\"; message P {}", SchemaFormat::Protobuf)
        .unwrap();
    svc.registry()
        .register("proto-value", "syntax = \"proto3\"; message P { int32 a = 1; }", SchemaFormat::Protobuf)
        .unwrap();

    let report = svc
        .validate_all(None, CompatibilityMode::Full, &CancelToken::new())
        .unwrap();
    assert_eq!(report.verdicts.len(), 3);
    assert_eq!(report.summary().errors, 1);

    let proto = report.verdict("proto-value").unwrap();
    assert!(!proto.overall_safe);
    assert!(proto
        .violations()
        .all(|(_, _, v)| v.reason == ReasonCode::SchemaUnreadable));
    assert!(report.verdict("orders-value").unwrap().overall_safe);
}

#[test]
fn planning_twice_gives_identical_plans() {
    let svc = service_with(vec![
        ("b-value", vec![ORDERS_V1, ORDERS_V2]),
        ("a-value", vec![LEGACY_V1, LEGACY_V2]),
        ("c-value", vec![ORDERS_V1]),
    ]);
    let target = CompatibilityMode::Full;
    let report = svc.validate_all(None, target, &CancelToken::new()).unwrap();

    let first = svc.build_plan(&report.verdicts, target, Strategy::Selective).unwrap();
    let second = svc.build_plan(&report.verdicts, target, Strategy::Selective).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Plan execution
// ---------------------------------------------------------------------------

/// Registry whose mode writes fail for one subject.
struct FailingRegistry {
    inner: InMemoryRegistry,
    fail_on: &'static str,
}

impl RegistryClient for FailingRegistry {
    fn backend(&self) -> BackendKind {
        BackendKind::Confluent
    }

    fn list_subjects(&self, prefix: Option<&str>) -> Result<Vec<String>, RegistryError> {
        self.inner.list_subjects(prefix)
    }

    fn list_versions(&self, subject: &str) -> Result<Vec<u32>, RegistryError> {
        self.inner.list_versions(subject)
    }

    fn get_schema(&self, subject: &str, version: u32) -> Result<SchemaVersion, RegistryError> {
        self.inner.get_schema(subject, version)
    }

    fn get_mode(&self, subject: Option<&str>) -> Result<CompatibilityMode, RegistryError> {
        self.inner.get_mode(subject)
    }

    fn get_mode_override(&self, subject: &str) -> Result<Option<CompatibilityMode>, RegistryError> {
        self.inner.get_mode_override(subject)
    }

    fn set_mode(&self, subject: Option<&str>, mode: CompatibilityMode) -> Result<(), RegistryError> {
        if subject == Some(self.fail_on) {
            return Err(RegistryError::Backend {
                backend: self.backend(),
                message: "503 Service Unavailable".into(),
            });
        }
        self.inner.set_mode(subject, mode)
    }

    fn clear_mode(&self, subject: &str) -> Result<(), RegistryError> {
        self.inner.clear_mode(subject)
    }
}

#[test]
fn failed_apply_rolls_back_in_reverse() {
    let inner = InMemoryRegistry::new();
    for name in ["a-value", "b-value", "c-value"] {
        inner.register(name, ORDERS_V1, SchemaFormat::Avro).unwrap();
    }
    inner.set_mode(Some("b-value"), CompatibilityMode::None).unwrap();

    let svc = MigrationService::new(
        Arc::new(FailingRegistry {
            inner,
            fail_on: "c-value",
        }),
        BulkValidator::new(2),
    );
    let target = CompatibilityMode::Full;
    let report = svc.validate_all(None, target, &CancelToken::new()).unwrap();
    let plan = svc.build_plan(&report.verdicts, target, Strategy::Selective).unwrap();
    assert_eq!(plan.actions.len(), 3);

    let outcome = svc.apply_plan(&plan);
    assert!(!outcome.is_success());
    assert!(outcome.applied.is_empty());
    assert!(outcome.rollback_errors.is_empty());
    assert_eq!(
        outcome.failure.as_ref().unwrap().action.target,
        ActionTarget::Subject("c-value".into())
    );
    let reverted: Vec<String> = outcome
        .rolled_back
        .iter()
        .map(|a| a.target.to_string())
        .collect();
    assert_eq!(reverted, vec!["b-value", "a-value"]);

    let registry = svc.registry();
    assert_eq!(registry.get_mode_override("a-value").unwrap(), None);
    assert_eq!(
        registry.get_mode_override("b-value").unwrap(),
        Some(CompatibilityMode::None)
    );
    assert_eq!(registry.get_mode(Some("c-value")).unwrap(), CompatibilityMode::Backward);
}

#[test]
fn blocked_plan_is_never_applied() {
    let svc = service_with(vec![
        ("orders-value", vec![ORDERS_V1, ORDERS_V2]),
        ("legacy-value", vec![LEGACY_V1, LEGACY_V2]),
    ]);
    let target = CompatibilityMode::FullTransitive;
    let report = svc.validate_all(None, target, &CancelToken::new()).unwrap();
    let plan = svc.build_plan(&report.verdicts, target, Strategy::Global).unwrap();

    let outcome = svc.apply_plan(&plan);
    assert!(outcome.is_success());
    assert!(outcome.applied.is_empty());
    assert_eq!(svc.registry().get_mode(None).unwrap(), CompatibilityMode::Backward);
}

#[test]
fn global_switch_over_a_prefix_is_refused() {
    let svc = service_with(vec![
        ("orders-value", vec![ORDERS_V1, ORDERS_V2]),
        ("users-value", vec![LEGACY_V1, LEGACY_V2]),
    ]);
    let cancel = CancelToken::new();

    let report = svc
        .validate_all(Some("orders"), CompatibilityMode::FullTransitive, &cancel)
        .unwrap();
    assert_eq!(report.summary().compatible, 1);

    for plan in [
        svc.build_plan(&report.verdicts, CompatibilityMode::FullTransitive, Strategy::Global)
            .unwrap(),
        svc.build_plan_from_report(&report, Strategy::Global).unwrap(),
    ] {
        let blocked = plan.blocked.as_ref().expect("global plan must be blocked");
        assert_eq!(blocked.unchecked_subjects, vec!["users-value".to_string()]);
        assert!(plan.actions.is_empty());

        let outcome = svc.apply_plan(&plan);
        assert!(outcome.applied.is_empty());
    }
    assert_eq!(
        svc.registry().get_mode(Some("users-value")).unwrap(),
        CompatibilityMode::Backward
    );

    // The same prefix is fine for a selective plan.
    let selective = svc.build_plan_from_report(&report, Strategy::Selective).unwrap();
    assert!(!selective.is_blocked());
    assert_eq!(selective.subjects_with(SubjectDecision::MigrateNow), vec!["orders-value"]);
}

#[test]
fn transitive_modes_catch_drift_the_single_modes_miss() {
    let svc = service_with(vec![("events-value", vec![EVENT_V1, EVENT_V2, EVENT_V3])]);

    assert!(svc.validate_subject("events-value", CompatibilityMode::Forward).overall_safe);
    assert!(svc.validate_subject("events-value", CompatibilityMode::Full).overall_safe);
    assert!(!svc.validate_subject("events-value", CompatibilityMode::ForwardTransitive).overall_safe);
    assert!(!svc.validate_subject("events-value", CompatibilityMode::FullTransitive).overall_safe);

    // Read the other way round the history breaks backward instead.
    let reversed = service_with(vec![("events-value", vec![EVENT_V3, EVENT_V2, EVENT_V1])]);
    assert!(reversed.validate_subject("events-value", CompatibilityMode::Backward).overall_safe);
    assert!(!reversed
        .validate_subject("events-value", CompatibilityMode::BackwardTransitive)
        .overall_safe);
}
