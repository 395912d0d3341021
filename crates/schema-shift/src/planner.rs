// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Migration planning.
//!
//! The planner is a pure function of its inputs: verdicts are re-keyed by
//! subject name, so the same verdicts always give the same decisions and the
//! same action order, whatever order the validator produced them in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::mode::{classify_transition, CompatibilityMode, TransitionClassification};
use crate::validator::SubjectVerdict;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How a target mode is rolled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Per-subject switches for the subjects that pass.
    Selective,
    /// One registry-wide switch, only if every subject passes.
    Global,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Selective => "selective",
            Strategy::Global => "global",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown migration strategy: {0:?} (expected selective or global)")]
pub struct UnknownStrategyError(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "selective" => Ok(Strategy::Selective),
            "global" => Ok(Strategy::Global),
            _ => Err(UnknownStrategyError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectDecision {
    /// History passes; switch the subject.
    MigrateNow,
    /// History fails; leave the subject on its current mode.
    NeedsFix,
    /// Already on the target mode; nothing to do.
    Skip,
}

impl fmt::Display for SubjectDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubjectDecision::MigrateNow => "MIGRATE_NOW",
            SubjectDecision::NeedsFix => "NEEDS_FIX",
            SubjectDecision::Skip => "SKIP",
        })
    }
}

/// Modes in effect before the plan runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorModes {
    pub global: CompatibilityMode,
    /// Explicit subject overrides only.
    #[serde(default)]
    pub overrides: BTreeMap<String, CompatibilityMode>,
}

impl PriorModes {
    pub fn new(global: CompatibilityMode) -> Self {
        Self {
            global,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, subject: impl Into<String>, mode: CompatibilityMode) -> Self {
        self.overrides.insert(subject.into(), mode);
        self
    }

    pub fn effective(&self, subject: &str) -> CompatibilityMode {
        self.overrides.get(subject).copied().unwrap_or(self.global)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    Global,
    Subject(String),
}

impl ActionTarget {
    pub fn subject(&self) -> Option<&str> {
        match self {
            ActionTarget::Global => None,
            ActionTarget::Subject(name) => Some(name),
        }
    }
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTarget::Global => f.write_str("<global>"),
            ActionTarget::Subject(name) => f.write_str(name),
        }
    }
}

/// One mode switch, with what it takes to undo it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub target: ActionTarget,
    pub new_mode: CompatibilityMode,
    /// Mode in effect for `target` before this action.
    pub rollback_mode: CompatibilityMode,
    /// Whether the subject had its own override before this action.  When it
    /// did not, rollback clears the override instead of pinning
    /// `rollback_mode`.
    pub prior_override: bool,
}

/// A GLOBAL switch refused because some subjects would break or were never
/// checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionBlocked {
    pub strategy: Strategy,
    pub target_mode: CompatibilityMode,
    pub failing_subjects: Vec<String>,
    /// Subjects that follow the global mode but have no verdict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unchecked_subjects: Vec<String>,
}

impl fmt::Display for TransitionBlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} switch to {} refused:", self.strategy, self.target_mode)?;
        if !self.failing_subjects.is_empty() {
            write!(
                f,
                " {} subject(s) need fixes: {}",
                self.failing_subjects.len(),
                self.failing_subjects.join(", ")
            )?;
        }
        if !self.unchecked_subjects.is_empty() {
            if !self.failing_subjects.is_empty() {
                write!(f, ";")?;
            }
            write!(
                f,
                " {} subject(s) were not validated: {}",
                self.unchecked_subjects.len(),
                self.unchecked_subjects.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Output of [`plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub target_mode: CompatibilityMode,
    pub strategy: Strategy,
    pub decisions: BTreeMap<String, SubjectDecision>,
    /// Ordered; apply front to back, roll back back to front.
    pub actions: Vec<PlannedAction>,
    /// Registry-wide mode before the plan.
    pub rollback_mode: CompatibilityMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<TransitionBlocked>,
    /// Registry subjects that were not validated; they get no decision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unchecked: Vec<String>,
    /// Prior global mode -> target.
    pub transition: TransitionClassification,
}

impl MigrationPlan {
    pub fn is_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    /// Subjects with the given decision, in name order.
    pub fn subjects_with(&self, decision: SubjectDecision) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|(_, d)| **d == decision)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn decision(&self, subject: &str) -> Option<SubjectDecision> {
        self.decisions.get(subject).copied()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Turn verdicts computed against `target_mode` into a plan, assuming the
/// verdicts cover every subject of the registry.
pub fn plan(
    verdicts: &[SubjectVerdict],
    target_mode: CompatibilityMode,
    strategy: Strategy,
    prior: &PriorModes,
) -> MigrationPlan {
    plan_with_unchecked(verdicts, &[], target_mode, strategy, prior)
}

/// Like [`plan`], for a partial validation run (prefix filter or
/// cancellation). `unchecked` names registry subjects without a verdict.
///
/// SELECTIVE plans only touch checked subjects. A GLOBAL switch would also
/// move every unchecked subject that has no override of its own, so it is
/// blocked while any such subject exists.
pub fn plan_with_unchecked(
    verdicts: &[SubjectVerdict],
    unchecked: &[String],
    target_mode: CompatibilityMode,
    strategy: Strategy,
    prior: &PriorModes,
) -> MigrationPlan {
    let by_name: BTreeMap<&str, &SubjectVerdict> =
        verdicts.iter().map(|v| (v.subject.as_str(), v)).collect();

    let unchecked: Vec<String> = unchecked
        .iter()
        .filter(|name| !by_name.contains_key(name.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let follows_global: Vec<String> = unchecked
        .iter()
        .filter(|name| !prior.overrides.contains_key(name.as_str()))
        .cloned()
        .collect();

    let decisions: BTreeMap<String, SubjectDecision> = by_name
        .iter()
        .map(|(name, verdict)| {
            let decision = if !verdict.overall_safe {
                SubjectDecision::NeedsFix
            } else if prior.effective(name) == target_mode {
                SubjectDecision::Skip
            } else {
                SubjectDecision::MigrateNow
            };
            (name.to_string(), decision)
        })
        .collect();

    let subject_action = |name: &str| PlannedAction {
        target: ActionTarget::Subject(name.to_string()),
        new_mode: target_mode,
        rollback_mode: prior.effective(name),
        prior_override: prior.overrides.contains_key(name),
    };

    let failing: Vec<String> = decisions
        .iter()
        .filter(|(_, d)| **d == SubjectDecision::NeedsFix)
        .map(|(name, _)| name.clone())
        .collect();

    let mut blocked = None;
    let mut actions = Vec::new();

    match strategy {
        Strategy::Selective => {
            actions.extend(
                decisions
                    .iter()
                    .filter(|(_, d)| **d == SubjectDecision::MigrateNow)
                    .map(|(name, _)| subject_action(name)),
            );
        }
        Strategy::Global if !failing.is_empty() || !follows_global.is_empty() => {
            blocked = Some(TransitionBlocked {
                strategy,
                target_mode,
                failing_subjects: failing.clone(),
                unchecked_subjects: follows_global,
            });
        }
        Strategy::Global => {
            if prior.global != target_mode {
                actions.push(PlannedAction {
                    target: ActionTarget::Global,
                    new_mode: target_mode,
                    rollback_mode: prior.global,
                    prior_override: false,
                });
            }
            // Overrides shadow the global mode, so they are switched too.
            actions.extend(
                decisions
                    .iter()
                    .filter(|(name, d)| {
                        **d == SubjectDecision::MigrateNow && prior.overrides.contains_key(name.as_str())
                    })
                    .map(|(name, _)| subject_action(name)),
            );
        }
    }

    let plan = MigrationPlan {
        target_mode,
        strategy,
        decisions,
        actions,
        rollback_mode: prior.global,
        blocked,
        unchecked,
        transition: classify_transition(prior.global, target_mode),
    };

    match &plan.blocked {
        Some(reason) => warn!(%reason, "migration plan blocked"),
        None => info!(
            mode = %target_mode,
            %strategy,
            actions = plan.actions.len(),
            needs_fix = failing.len(),
            unchecked = plan.unchecked.len(),
            "migration plan built"
        ),
    }
    plan
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::RiskLevel;
    use crate::validator::HistoryState;

    fn verdict(subject: &str, safe: bool) -> SubjectVerdict {
        SubjectVerdict {
            subject: subject.to_string(),
            target_mode: CompatibilityMode::FullTransitive,
            latest_version: Some(2),
            history: HistoryState::Compared,
            per_version: BTreeMap::new(),
            overall_safe: safe,
            error: None,
        }
    }

    fn five_subjects() -> Vec<SubjectVerdict> {
        vec![
            verdict("payments", true),
            verdict("legacy", false),
            verdict("orders", true),
            verdict("users", true),
            verdict("audit", true),
        ]
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("GLOBAL".parse::<Strategy>().unwrap(), Strategy::Global);
        assert_eq!(" selective ".parse::<Strategy>().unwrap(), Strategy::Selective);
        assert!("everything".parse::<Strategy>().is_err());
    }

    #[test]
    fn selective_migrates_passing_subjects_in_name_order() {
        let prior = PriorModes::new(CompatibilityMode::Backward);
        let plan = plan(&five_subjects(), CompatibilityMode::FullTransitive, Strategy::Selective, &prior);

        assert!(!plan.is_blocked());
        let targets: Vec<String> = plan.actions.iter().map(|a| a.target.to_string()).collect();
        assert_eq!(targets, vec!["audit", "orders", "payments", "users"]);
        assert_eq!(plan.decision("legacy"), Some(SubjectDecision::NeedsFix));
        assert!(plan
            .actions
            .iter()
            .all(|a| a.rollback_mode == CompatibilityMode::Backward && !a.prior_override));
    }

    #[test]
    fn global_is_blocked_by_any_failure() {
        let prior = PriorModes::new(CompatibilityMode::Backward);
        let plan = plan(&five_subjects(), CompatibilityMode::FullTransitive, Strategy::Global, &prior);

        assert!(plan.actions.is_empty());
        let blocked = plan.blocked.as_ref().unwrap();
        assert_eq!(blocked.failing_subjects, vec!["legacy".to_string()]);
        assert!(blocked.to_string().contains("legacy"));
        assert_eq!(plan.transition.risk_level, RiskLevel::Risky);
    }

    #[test]
    fn global_switch_also_moves_overridden_subjects() {
        let verdicts = vec![verdict("a", true), verdict("b", true), verdict("c", true)];
        let prior = PriorModes::new(CompatibilityMode::Backward)
            .with_override("b", CompatibilityMode::None)
            .with_override("c", CompatibilityMode::FullTransitive);
        let plan = plan(&verdicts, CompatibilityMode::FullTransitive, Strategy::Global, &prior);

        assert_eq!(plan.actions.len(), 2);
        assert_eq!(plan.actions[0].target, ActionTarget::Global);
        assert_eq!(plan.actions[0].rollback_mode, CompatibilityMode::Backward);
        assert_eq!(plan.actions[1].target, ActionTarget::Subject("b".into()));
        assert_eq!(plan.actions[1].rollback_mode, CompatibilityMode::None);
        assert!(plan.actions[1].prior_override);
        assert_eq!(plan.decision("c"), Some(SubjectDecision::Skip));
    }

    #[test]
    fn subjects_already_on_target_are_skipped() {
        let verdicts = vec![verdict("a", true), verdict("b", true)];
        let prior = PriorModes::new(CompatibilityMode::Full).with_override("b", CompatibilityMode::Backward);
        let plan = plan(&verdicts, CompatibilityMode::Full, Strategy::Selective, &prior);
        assert_eq!(plan.subjects_with(SubjectDecision::Skip), vec!["a"]);
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.transition.risk_level, RiskLevel::Safe);
    }

    #[test]
    fn global_is_blocked_by_unchecked_subjects() {
        let verdicts = vec![verdict("orders", true)];
        let unchecked = vec!["users".to_string(), "orders".to_string()];
        let prior = PriorModes::new(CompatibilityMode::Backward);
        let plan = plan_with_unchecked(
            &verdicts,
            &unchecked,
            CompatibilityMode::FullTransitive,
            Strategy::Global,
            &prior,
        );

        assert!(plan.actions.is_empty());
        assert_eq!(plan.unchecked, vec!["users".to_string()]);
        let blocked = plan.blocked.as_ref().unwrap();
        assert!(blocked.failing_subjects.is_empty());
        assert_eq!(blocked.unchecked_subjects, vec!["users".to_string()]);
        assert!(blocked.to_string().contains("not validated: users"));
    }

    #[test]
    fn unchecked_subjects_with_overrides_do_not_block_global() {
        let verdicts = vec![verdict("orders", true)];
        let unchecked = vec!["pinned".to_string()];
        let prior = PriorModes::new(CompatibilityMode::Backward).with_override("pinned", CompatibilityMode::None);
        let plan = plan_with_unchecked(
            &verdicts,
            &unchecked,
            CompatibilityMode::FullTransitive,
            Strategy::Global,
            &prior,
        );

        assert!(!plan.is_blocked());
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].target, ActionTarget::Global);
        assert_eq!(plan.decision("pinned"), None);
    }

    #[test]
    fn selective_ignores_unchecked_subjects() {
        let verdicts = vec![verdict("orders", true)];
        let unchecked = vec!["users".to_string()];
        let prior = PriorModes::new(CompatibilityMode::Backward);
        let plan = plan_with_unchecked(
            &verdicts,
            &unchecked,
            CompatibilityMode::FullTransitive,
            Strategy::Selective,
            &prior,
        );

        assert!(!plan.is_blocked());
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].target, ActionTarget::Subject("orders".into()));
        assert_eq!(plan.unchecked, vec!["users".to_string()]);
    }

    #[test]
    fn planning_is_deterministic() {
        let prior = PriorModes::new(CompatibilityMode::Backward);
        let mut reversed = five_subjects();
        reversed.reverse();
        let a = plan(&five_subjects(), CompatibilityMode::FullTransitive, Strategy::Selective, &prior);
        let b = plan(&reversed, CompatibilityMode::FullTransitive, Strategy::Selective, &prior);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
