// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subject history validation.
//!
//! A target mode is reduced to its required checks, and each check is run as
//! a plain loop over the surviving history: `*_SINGLE` looks at the version
//! immediately before the candidate, `*_ALL` at every older one.
//!
//! Bulk validation fans subjects out over a scoped worker pool.  Subjects are
//! independent, so workers share nothing but the job queue and a cancel flag;
//! results are re-sorted by subject name before they are returned.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compatibility::{check_backward, check_forward, CompatibilityVerdict, Direction, Violation};
use crate::mode::{required_checks, CheckKind, CompatibilityMode};
use crate::schema::SchemaVersion;
use crate::subject::{Subject, SubjectVersion, VersionBody};

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// How much history a verdict actually covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryState {
    /// No versions at all; `overall_safe` is vacuous.
    Empty,
    /// Only the candidate exists; nothing to compare against.
    Single,
    /// The required pairs were compared.
    Compared,
    /// The subject could not be loaded; see `error`.
    Unavailable,
}

/// Verdicts for one older version against the candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backward: Option<CompatibilityVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<CompatibilityVerdict>,
}

impl VersionCheck {
    pub fn is_compatible(&self) -> bool {
        self.verdicts().all(|v| v.is_compatible)
    }

    pub fn verdicts(&self) -> impl Iterator<Item = &CompatibilityVerdict> {
        self.backward.iter().chain(self.forward.iter())
    }

    fn slot(&mut self, direction: Direction) -> &mut Option<CompatibilityVerdict> {
        match direction {
            Direction::Backward => &mut self.backward,
            Direction::Forward => &mut self.forward,
        }
    }
}

/// Aggregated result for one subject under one target mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectVerdict {
    pub subject: String,
    pub target_mode: CompatibilityMode,
    /// Version treated as the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<u32>,
    pub history: HistoryState,
    /// Older version -> verdicts of the required checks against it.
    pub per_version: BTreeMap<u32, VersionCheck>,
    pub overall_safe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubjectVerdict {
    fn vacuous(subject: &str, target_mode: CompatibilityMode, latest: Option<u32>, history: HistoryState) -> Self {
        Self {
            subject: subject.to_string(),
            target_mode,
            latest_version: latest,
            history,
            per_version: BTreeMap::new(),
            overall_safe: true,
            error: None,
        }
    }

    /// Verdict for a subject whose history could not be fetched at all.
    pub fn unavailable(subject: &str, target_mode: CompatibilityMode, error: impl Into<String>) -> Self {
        Self {
            subject: subject.to_string(),
            target_mode,
            latest_version: None,
            history: HistoryState::Unavailable,
            per_version: BTreeMap::new(),
            overall_safe: false,
            error: Some(error.into()),
        }
    }

    /// `true` when the subject had no versions, so `overall_safe` proves
    /// nothing.
    pub fn no_history(&self) -> bool {
        self.history == HistoryState::Empty
    }

    /// Every violation, tagged with the older version it was found against.
    pub fn violations(&self) -> impl Iterator<Item = (u32, Direction, &Violation)> {
        self.per_version.iter().flat_map(|(version, check)| {
            check
                .verdicts()
                .flat_map(move |v| v.violations.iter().map(move |viol| (*version, v.direction, viol)))
        })
    }

    /// `true` if any schema involved could not be parsed or loaded.
    pub fn has_errors(&self) -> bool {
        self.error.is_some()
            || self
                .violations()
                .any(|(_, _, v)| v.reason == crate::compatibility::ReasonCode::SchemaUnreadable)
    }
}

// ---------------------------------------------------------------------------
// Single-subject validation
// ---------------------------------------------------------------------------

enum Candidate<'a> {
    Schema(&'a SchemaVersion),
    Unreadable(&'a str),
}

fn check_pair(
    direction: Direction,
    candidate: &Candidate<'_>,
    candidate_version: u32,
    prior: &SubjectVersion,
) -> CompatibilityVerdict {
    match (candidate, &prior.body) {
        (Candidate::Unreadable(reason), _) => {
            CompatibilityVerdict::unreadable(direction, candidate_version, reason)
        }
        (_, VersionBody::Unreadable(reason)) => {
            CompatibilityVerdict::unreadable(direction, prior.version, reason)
        }
        (Candidate::Schema(new), VersionBody::Parsed(old)) => match direction {
            Direction::Backward => check_backward(new, old),
            Direction::Forward => check_forward(new, old),
        },
    }
}

/// Older versions a direction must be checked against.
fn targets<'a>(
    checks_all: bool,
    checks_single: bool,
    priors: &'a [&'a SubjectVersion],
) -> &'a [&'a SubjectVersion] {
    if checks_all {
        priors
    } else if checks_single {
        &priors[priors.len().saturating_sub(1)..]
    } else {
        &[]
    }
}

/// Validate a subject's surviving history under `target_mode`.
///
/// Without a `candidate` the latest surviving version is checked against the
/// ones before it; with one, the candidate is checked against every surviving
/// version as if it were about to be registered.
pub fn validate_subject(
    subject: &Subject,
    candidate: Option<&SchemaVersion>,
    target_mode: CompatibilityMode,
) -> SubjectVerdict {
    let surviving: Vec<&SubjectVersion> = subject.surviving_versions().collect();

    let (latest_version, latest, priors): (u32, Candidate<'_>, &[&SubjectVersion]) = match candidate {
        Some(schema) => (schema.version, Candidate::Schema(schema), &surviving[..]),
        None => match surviving.split_last() {
            Some((last, rest)) => {
                let latest = match &last.body {
                    VersionBody::Parsed(schema) => Candidate::Schema(schema),
                    VersionBody::Unreadable(reason) => Candidate::Unreadable(reason),
                };
                (last.version, latest, rest)
            }
            None => {
                debug!(subject = %subject.name, "no surviving versions");
                return SubjectVerdict::vacuous(&subject.name, target_mode, None, HistoryState::Empty);
            }
        },
    };

    if priors.is_empty() {
        return SubjectVerdict::vacuous(
            &subject.name,
            target_mode,
            Some(latest_version),
            HistoryState::Single,
        );
    }

    let checks = required_checks(target_mode);
    let plan = [
        (
            Direction::Backward,
            targets(
                checks.contains(CheckKind::BackwardAll),
                checks.contains(CheckKind::BackwardSingle),
                priors,
            ),
        ),
        (
            Direction::Forward,
            targets(
                checks.contains(CheckKind::ForwardAll),
                checks.contains(CheckKind::ForwardSingle),
                priors,
            ),
        ),
    ];

    let mut per_version: BTreeMap<u32, VersionCheck> = BTreeMap::new();
    for (direction, versions) in plan {
        for prior in versions {
            let verdict = check_pair(direction, &latest, latest_version, prior);
            debug!(
                subject = %subject.name,
                candidate = latest_version,
                against = prior.version,
                %direction,
                compatible = verdict.is_compatible,
                "pair checked"
            );
            *per_version.entry(prior.version).or_default().slot(direction) = Some(verdict);
        }
    }

    let overall_safe = per_version.values().all(VersionCheck::is_compatible);
    if !overall_safe {
        debug!(subject = %subject.name, mode = %target_mode, "subject fails target mode");
    }

    SubjectVerdict {
        subject: subject.name.clone(),
        target_mode,
        latest_version: Some(latest_version),
        history: HistoryState::Compared,
        per_version,
        overall_safe,
        error: None,
    }
}

// ---------------------------------------------------------------------------
// Bulk validation
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared with bulk validation workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop picking up new subjects; in-flight subjects still finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Counters over a bulk run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub total_checked: usize,
    pub compatible: usize,
    pub incompatible: usize,
    pub errors: usize,
}

/// Result of validating many subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub target_mode: CompatibilityMode,
    /// Sorted by subject name.
    pub verdicts: Vec<SubjectVerdict>,
    /// Subjects abandoned after cancellation, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unchecked: Vec<String>,
    pub cancelled: bool,
}

impl BulkReport {
    pub fn summary(&self) -> BulkSummary {
        let mut summary = BulkSummary {
            total_checked: self.verdicts.len(),
            ..Default::default()
        };
        for verdict in &self.verdicts {
            if verdict.overall_safe {
                summary.compatible += 1;
            } else {
                summary.incompatible += 1;
            }
            if verdict.has_errors() {
                summary.errors += 1;
            }
        }
        summary
    }

    pub fn verdict(&self, subject: &str) -> Option<&SubjectVerdict> {
        self.verdicts
            .binary_search_by(|v| v.subject.as_str().cmp(subject))
            .ok()
            .map(|idx| &self.verdicts[idx])
    }
}

/// Runs subject validations on a fixed-size worker pool.
#[derive(Debug, Clone, Copy)]
pub struct BulkValidator {
    workers: usize,
}

impl Default for BulkValidator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl BulkValidator {
    /// `workers` is clamped to at least one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Validate in-memory subjects (latest version as candidate).
    pub fn validate_all(
        &self,
        subjects: &[Subject],
        target_mode: CompatibilityMode,
        cancel: &CancelToken,
    ) -> BulkReport {
        let names: Vec<String> = subjects.iter().map(|s| s.name.clone()).collect();
        self.run(&names, target_mode, cancel, |idx| {
            validate_subject(&subjects[idx], None, target_mode)
        })
    }

    /// Run `job(index)` for every name; `job` must produce the verdict for
    /// `names[index]` and must isolate its own failures.
    pub fn run<F>(
        &self,
        names: &[String],
        target_mode: CompatibilityMode,
        cancel: &CancelToken,
        job: F,
    ) -> BulkReport
    where
        F: Fn(usize) -> SubjectVerdict + Sync,
    {
        let (job_tx, job_rx) = channel::unbounded::<usize>();
        for idx in 0..names.len() {
            // Receiver is alive until the end of this function.
            let _ = job_tx.send(idx);
        }
        drop(job_tx);

        let (done_tx, done_rx) = channel::unbounded::<(usize, SubjectVerdict)>();
        let job = &job;
        let pool = self.workers.min(names.len()).max(1);

        std::thread::scope(|scope| {
            for _ in 0..pool {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for idx in job_rx.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        if done_tx.send((idx, job(idx))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(done_tx);

        let mut done = vec![false; names.len()];
        let mut verdicts: Vec<SubjectVerdict> = done_rx
            .try_iter()
            .map(|(idx, verdict)| {
                done[idx] = true;
                verdict
            })
            .collect();
        verdicts.sort_by(|a, b| a.subject.cmp(&b.subject));

        let mut unchecked: Vec<String> = names
            .iter()
            .zip(&done)
            .filter(|(_, checked)| !**checked)
            .map(|(name, _)| name.clone())
            .collect();
        unchecked.sort();

        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!(
                checked = verdicts.len(),
                abandoned = unchecked.len(),
                "bulk validation cancelled"
            );
        }

        let report = BulkReport {
            target_mode,
            verdicts,
            unchecked,
            cancelled,
        };
        let summary = report.summary();
        info!(
            mode = %target_mode,
            checked = summary.total_checked,
            compatible = summary.compatible,
            incompatible = summary.incompatible,
            errors = summary.errors,
            "bulk validation finished"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
