// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::mode::{classify_transition, CompatibilityMode, TransitionClassification, UnknownModeError};
use crate::planner::{self, ActionTarget, MigrationPlan, PlannedAction, PriorModes, Strategy, SubjectDecision};
use crate::registry::{RegistryClient, RegistryError};
use crate::schema::SchemaVersion;
use crate::subject::Subject;
use crate::validator::{validate_subject, BulkReport, BulkValidator, CancelToken, SubjectVerdict};

// ---------------------------------------------------------------------------
// ApplyOutcome
// ---------------------------------------------------------------------------

/// The action that stopped a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyFailure {
    pub action: PlannedAction,
    pub error: String,
}

/// Result of [`MigrationService::apply_plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    /// Actions that took effect and were kept.
    pub applied: Vec<PlannedAction>,
    /// Actions that took effect and were reverted, in revert order.
    pub rolled_back: Vec<PlannedAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ApplyFailure>,
    /// Reverts that failed themselves; the registry needs manual repair.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rollback_errors: Vec<String>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

// ---------------------------------------------------------------------------
// MigrationService
// ---------------------------------------------------------------------------

/// Facade over a registry client exposing transition checks, validation,
/// planning and plan execution.
///
/// CLI mapping:
///   `transition FROM TO` -> `check_transition_str(from, to)`
///   `validate`           -> `validate_all(prefix, mode, cancel)`
///   `plan`               -> `validate_all` + `build_plan`
///   `migrate`            -> `build_plan` + `apply_plan` + `confirm`
pub struct MigrationService<R: RegistryClient + ?Sized> {
    registry: Arc<R>,
    validator: BulkValidator,
}

impl<R: RegistryClient + ?Sized> MigrationService<R> {
    pub fn new(registry: Arc<R>, validator: BulkValidator) -> Self {
        MigrationService {
            registry,
            validator,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn check_transition(&self, from: CompatibilityMode, to: CompatibilityMode) -> TransitionClassification {
        classify_transition(from, to)
    }

    /// Like [`Self::check_transition`], rejecting unknown mode names first.
    pub fn check_transition_str(&self, from: &str, to: &str) -> Result<TransitionClassification, UnknownModeError> {
        let from: CompatibilityMode = from.parse()?;
        let to: CompatibilityMode = to.parse()?;
        Ok(self.check_transition(from, to))
    }

    /// Fetch a subject's surviving history.
    ///
    /// Versions that fail to parse are kept as unreadable entries; any other
    /// registry failure is returned.
    pub fn load_subject(&self, name: &str) -> Result<Subject, RegistryError> {
        let mut subject = Subject::new(name);
        subject.compatibility = self.registry.get_mode_override(name)?;

        for version in self.registry.list_versions(name)? {
            match self.registry.get_schema(name, version) {
                Ok(schema) => subject.push_schema(schema),
                Err(RegistryError::SchemaParse { source, .. }) => {
                    warn!(subject = name, version, error = %source, "schema unreadable");
                    subject.push_unreadable(version, source.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        debug!(subject = name, versions = ?subject.version_numbers(), "subject loaded");
        Ok(subject)
    }

    /// Validate one subject; fetch failures are reported inside the verdict.
    pub fn validate_subject(&self, name: &str, target_mode: CompatibilityMode) -> SubjectVerdict {
        match self.load_subject(name) {
            Ok(subject) => validate_subject(&subject, None, target_mode),
            Err(e) => {
                warn!(subject = name, error = %e, "subject could not be loaded");
                SubjectVerdict::unavailable(name, target_mode, e.to_string())
            }
        }
    }

    /// Check a proposed schema against a subject's full surviving history.
    pub fn check_candidate(
        &self,
        name: &str,
        candidate: &SchemaVersion,
        target_mode: CompatibilityMode,
    ) -> Result<SubjectVerdict, RegistryError> {
        let subject = match self.load_subject(name) {
            Ok(subject) => subject,
            Err(RegistryError::SubjectNotFound(_)) => Subject::new(name),
            Err(e) => return Err(e),
        };
        Ok(validate_subject(&subject, Some(candidate), target_mode))
    }

    /// Validate the named subjects on the worker pool.
    pub fn validate_subjects(
        &self,
        names: &[String],
        target_mode: CompatibilityMode,
        cancel: &CancelToken,
    ) -> BulkReport {
        self.validator
            .run(names, target_mode, cancel, |idx| self.validate_subject(&names[idx], target_mode))
    }

    /// Validate every subject matching `prefix`.
    pub fn validate_all(
        &self,
        prefix: Option<&str>,
        target_mode: CompatibilityMode,
        cancel: &CancelToken,
    ) -> Result<BulkReport, RegistryError> {
        let names = self.registry.list_subjects(prefix)?;
        info!(subjects = names.len(), mode = %target_mode, "validating subjects");
        Ok(self.validate_subjects(&names, target_mode, cancel))
    }

    /// Current global mode plus the explicit overrides of `subjects`.
    pub fn prior_modes<'a, I>(&self, subjects: I) -> Result<PriorModes, RegistryError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut prior = PriorModes::new(self.registry.get_mode(None)?);
        for subject in subjects {
            if let Some(mode) = self.registry.get_mode_override(subject)? {
                prior.overrides.insert(subject.to_string(), mode);
            }
        }
        Ok(prior)
    }

    /// Plan against the modes currently in effect.
    ///
    /// Registry subjects missing from `verdicts` are passed to the planner as
    /// unchecked, so a GLOBAL plan over a filtered or interrupted run is
    /// blocked unless those subjects are pinned by their own override.
    pub fn build_plan(
        &self,
        verdicts: &[SubjectVerdict],
        target_mode: CompatibilityMode,
        strategy: Strategy,
    ) -> Result<MigrationPlan, RegistryError> {
        self.plan_with_unchecked(verdicts, Vec::new(), target_mode, strategy)
    }

    /// [`Self::build_plan`] over a bulk report, carrying over the subjects a
    /// cancelled run never reached.
    pub fn build_plan_from_report(
        &self,
        report: &BulkReport,
        strategy: Strategy,
    ) -> Result<MigrationPlan, RegistryError> {
        if report.cancelled {
            warn!(
                unchecked = report.unchecked.len(),
                "planning over a cancelled validation run"
            );
        }
        self.plan_with_unchecked(
            &report.verdicts,
            report.unchecked.clone(),
            report.target_mode,
            strategy,
        )
    }

    fn plan_with_unchecked(
        &self,
        verdicts: &[SubjectVerdict],
        mut unchecked: Vec<String>,
        target_mode: CompatibilityMode,
        strategy: Strategy,
    ) -> Result<MigrationPlan, RegistryError> {
        let checked: BTreeSet<&str> = verdicts.iter().map(|v| v.subject.as_str()).collect();
        unchecked.extend(
            self.registry
                .list_subjects(None)?
                .into_iter()
                .filter(|name| !checked.contains(name.as_str())),
        );
        unchecked.sort();
        unchecked.dedup();
        unchecked.retain(|name| !checked.contains(name.as_str()));

        let prior = self.prior_modes(
            checked
                .iter()
                .copied()
                .chain(unchecked.iter().map(String::as_str)),
        )?;
        Ok(planner::plan_with_unchecked(
            verdicts,
            &unchecked,
            target_mode,
            strategy,
            &prior,
        ))
    }

    /// Execute a plan's actions in order.
    ///
    /// On the first failure every action already applied is reverted in
    /// reverse order, leaving the registry as it was before the call.
    pub fn apply_plan(&self, plan: &MigrationPlan) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        if let Some(reason) = &plan.blocked {
            warn!(%reason, "refusing to apply blocked plan");
            return outcome;
        }

        for action in &plan.actions {
            match self.registry.set_mode(action.target.subject(), action.new_mode) {
                Ok(()) => {
                    info!(action = %action.target, from = %action.rollback_mode, to = %action.new_mode, "mode switched");
                    outcome.applied.push(action.clone());
                }
                Err(e) => {
                    warn!(action = %action.target, error = %e, "mode switch failed, rolling back");
                    outcome.failure = Some(ApplyFailure {
                        action: action.clone(),
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }

        if outcome.failure.is_some() {
            while let Some(action) = outcome.applied.pop() {
                if let Err(e) = self.revert(&action) {
                    warn!(action = %action.target, error = %e, "rollback failed");
                    outcome
                        .rollback_errors
                        .push(format!("{}: {}", action.target, e));
                }
                outcome.rolled_back.push(action);
            }
        }
        outcome
    }

    fn revert(&self, action: &PlannedAction) -> Result<(), RegistryError> {
        match &action.target {
            ActionTarget::Subject(name) if !action.prior_override => self.registry.clear_mode(name),
            target => self.registry.set_mode(target.subject(), action.rollback_mode),
        }
    }

    /// Re-validate the migrated subjects under the plan's target mode.
    pub fn confirm(&self, plan: &MigrationPlan, cancel: &CancelToken) -> BulkReport {
        let names: Vec<String> = plan
            .subjects_with(SubjectDecision::MigrateNow)
            .into_iter()
            .map(str::to_string)
            .collect();
        self.validate_subjects(&names, plan.target_mode, cancel)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compatibility::ReasonCode;
    use crate::registry::InMemoryRegistry;
    use crate::schema::SchemaFormat;

    const ID_ONLY: &str = r#"{"type":"record","name":"R","fields":[{"name":"id","type":"int"}]}"#;
    const ID_NAME: &str = r#"{"type":"record","name":"R","fields":[
        {"name":"id","type":"int"},{"name":"name","type":"string"}]}"#;

    fn service() -> MigrationService<InMemoryRegistry> {
        let reg = InMemoryRegistry::new();
        reg.register("good", ID_ONLY, SchemaFormat::Avro).unwrap();
        reg.register("bad", ID_ONLY, SchemaFormat::Avro).unwrap();
        reg.register("bad", ID_NAME, SchemaFormat::Avro).unwrap();
        MigrationService::new(Arc::new(reg), BulkValidator::new(2))
    }

    #[test]
    fn transition_strings_fail_fast() {
        let svc = service();
        assert!(svc.check_transition_str("backward", "FULL").is_ok());
        let err = svc.check_transition_str("BACKWARD", "FORWARD_FULL").unwrap_err();
        assert_eq!(err, UnknownModeError("FORWARD_FULL".into()));
    }

    #[test]
    fn missing_subject_is_reported_inline() {
        let svc = service();
        let verdict = svc.validate_subject("nope", CompatibilityMode::Full);
        assert!(!verdict.overall_safe);
        assert!(verdict.error.as_deref().unwrap().contains("nope"));
    }

    #[test]
    fn unreadable_version_becomes_violation() {
        let svc = service();
        svc.registry()
            .register("good", "syntax = \"proto3\";", SchemaFormat::Protobuf)
            .unwrap();
        let verdict = svc.validate_subject("good", CompatibilityMode::Backward);
        let (_, _, violation) = verdict.violations().next().unwrap();
        assert_eq!(violation.reason, ReasonCode::SchemaUnreadable);
    }

    #[test]
    fn validate_all_covers_every_subject() {
        let svc = service();
        let report = svc
            .validate_all(None, CompatibilityMode::Backward, &CancelToken::new())
            .unwrap();
        assert_eq!(report.verdicts.len(), 2);
        assert!(!report.verdict("bad").unwrap().overall_safe);
        assert!(report.verdict("good").unwrap().overall_safe);
    }

    #[test]
    fn candidate_for_new_subject_is_vacuously_safe() {
        let svc = service();
        let candidate = SchemaVersion::parse(SchemaFormat::Avro, 1, ID_NAME).unwrap();
        let verdict = svc
            .check_candidate("fresh", &candidate, CompatibilityMode::FullTransitive)
            .unwrap();
        assert!(verdict.overall_safe);
    }

    #[test]
    fn global_plan_over_a_prefix_is_blocked() {
        let svc = service();
        let report = svc
            .validate_all(Some("go"), CompatibilityMode::Full, &CancelToken::new())
            .unwrap();
        assert_eq!(report.verdicts.len(), 1);

        let plan = svc.build_plan_from_report(&report, Strategy::Global).unwrap();
        assert!(plan.actions.is_empty());
        assert_eq!(plan.unchecked, vec!["bad".to_string()]);
        assert_eq!(
            plan.blocked.as_ref().unwrap().unchecked_subjects,
            vec!["bad".to_string()]
        );
    }

    #[test]
    fn cancelled_report_blocks_global_plan() {
        let svc = service();
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = svc
            .validate_all(None, CompatibilityMode::Full, &cancel)
            .unwrap();
        assert!(report.cancelled);

        let plan = svc.build_plan_from_report(&report, Strategy::Global).unwrap();
        assert!(plan.is_blocked());
        assert_eq!(plan.unchecked, vec!["bad".to_string(), "good".to_string()]);
        assert!(svc.apply_plan(&plan).applied.is_empty());
        assert_eq!(svc.registry().get_mode(None).unwrap(), CompatibilityMode::Backward);
    }

    #[test]
    fn apply_then_confirm() {
        let svc = service();
        let report = svc
            .validate_all(None, CompatibilityMode::Full, &CancelToken::new())
            .unwrap();
        let plan = svc
            .build_plan(&report.verdicts, CompatibilityMode::Full, Strategy::Selective)
            .unwrap();
        let outcome = svc.apply_plan(&plan);
        assert!(outcome.is_success());
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(svc.registry().get_mode(Some("good")).unwrap(), CompatibilityMode::Full);
        assert_eq!(svc.registry().get_mode(Some("bad")).unwrap(), CompatibilityMode::Backward);

        let confirmed = svc.confirm(&plan, &CancelToken::new());
        assert_eq!(confirmed.verdicts.len(), 1);
        assert!(confirmed.verdicts[0].overall_safe);
    }
}
