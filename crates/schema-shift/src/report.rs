// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output shapes for verdicts, plans and the transition matrix.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::federation::{HealthStatus, MemberModes, ModeComparison};
use crate::mode::{classify_transition, CompatibilityMode};
use crate::planner::MigrationPlan;
use crate::service::ApplyOutcome;
use crate::validator::{BulkReport, SubjectVerdict};

pub const CSV_HEADER: &str = "subject,version,latest_version,is_compatible";

/// One line of the historical per-pair CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvRow {
    pub subject: String,
    pub version: u32,
    pub latest_version: u32,
    pub is_compatible: bool,
}

/// One row per checked older version plus the latest self-row.
pub fn csv_rows(verdict: &SubjectVerdict) -> Vec<CsvRow> {
    let latest = match verdict.latest_version {
        Some(latest) => latest,
        None => return Vec::new(),
    };

    let row = |version, is_compatible| CsvRow {
        subject: verdict.subject.clone(),
        version,
        latest_version: latest,
        is_compatible,
    };

    let mut rows: Vec<CsvRow> = verdict
        .per_version
        .iter()
        .map(|(version, check)| row(*version, check.is_compatible()))
        .collect();
    rows.push(row(latest, true));
    rows
}

pub fn to_csv(verdicts: &[SubjectVerdict]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for row in verdicts.iter().flat_map(csv_rows) {
        let _ = writeln!(
            out,
            "{},{},{},{}",
            csv_field(&row.subject),
            row.version,
            row.latest_version,
            row.is_compatible
        );
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// 7x7 risk table, rows = current mode, columns = target mode.
pub fn render_matrix() -> String {
    let width = CompatibilityMode::ALL
        .iter()
        .map(|m| m.as_str().len())
        .max()
        .unwrap_or(0)
        + 2;

    let mut out = format!("{:<width$}", "FROM \\ TO", width = width);
    for to in CompatibilityMode::ALL {
        let _ = write!(out, "{:<width$}", to.as_str(), width = width);
    }
    out.push('\n');

    for from in CompatibilityMode::ALL {
        let _ = write!(out, "{:<width$}", from.as_str(), width = width);
        for to in CompatibilityMode::ALL {
            let risk = classify_transition(from, to).risk_level;
            let _ = write!(out, "{:<width$}", risk.to_string(), width = width);
        }
        out.push('\n');
    }
    out
}

pub fn render_summary(report: &BulkReport) -> String {
    let s = report.summary();
    let mut out = format!(
        "target {}: {} checked, {} compatible, {} incompatible, {} with errors\n",
        report.target_mode, s.total_checked, s.compatible, s.incompatible, s.errors
    );
    for verdict in &report.verdicts {
        let status = match (verdict.overall_safe, verdict.no_history()) {
            (true, true) => "ok (no history)",
            (true, false) => "ok",
            (false, _) => "FAIL",
        };
        let _ = writeln!(out, "  {:<40} {}", verdict.subject, status);
        if let Some(error) = &verdict.error {
            let _ = writeln!(out, "      error: {}", error);
        }
        for (version, direction, violation) in verdict.violations() {
            let field = if violation.field.is_empty() {
                "-"
            } else {
                violation.field.as_str()
            };
            let _ = writeln!(
                out,
                "      v{} {} {} {}: {}",
                version, direction, violation.reason, field, violation.message
            );
        }
    }
    if report.cancelled {
        let _ = writeln!(out, "cancelled; {} subject(s) not checked", report.unchecked.len());
    }
    out
}

pub fn render_plan(plan: &MigrationPlan) -> String {
    let mut out = format!(
        "plan: {} -> {} ({}), {} {}\n",
        plan.rollback_mode, plan.target_mode, plan.strategy, plan.transition.risk_level, plan.transition.rationale
    );
    for (subject, decision) in &plan.decisions {
        let _ = writeln!(out, "  {:<40} {}", subject, decision);
    }
    for subject in &plan.unchecked {
        let _ = writeln!(out, "  {:<40} NOT_CHECKED", subject);
    }
    if let Some(reason) = &plan.blocked {
        let _ = writeln!(out, "blocked: {}", reason);
    }
    for (idx, action) in plan.actions.iter().enumerate() {
        let undo = match action.target.subject() {
            Some(_) if !action.prior_override => " (rollback clears override)",
            _ => "",
        };
        let _ = writeln!(
            out,
            "  {}. {} {} -> {}{}",
            idx + 1,
            action.target,
            action.rollback_mode,
            action.new_mode,
            undo
        );
    }
    out
}

pub fn render_outcome(outcome: &ApplyOutcome) -> String {
    let mut out = String::new();
    match &outcome.failure {
        None => {
            let _ = writeln!(out, "applied {} action(s)", outcome.applied.len());
        }
        Some(failure) => {
            let _ = writeln!(
                out,
                "failed at {}: {}; rolled back {} action(s)",
                failure.action.target,
                failure.error,
                outcome.rolled_back.len()
            );
        }
    }
    for error in &outcome.rollback_errors {
        let _ = writeln!(out, "  rollback error: {}", error);
    }
    out
}

pub fn render_mode_comparison(comparison: &ModeComparison) -> String {
    let mut out = String::new();
    for (name, modes) in &comparison.registries {
        match modes {
            MemberModes::Modes(snapshot) => {
                let _ = writeln!(
                    out,
                    "{:<20} {:<20} {} override(s)",
                    name,
                    snapshot.global,
                    snapshot.overrides.len()
                );
            }
            MemberModes::Error { error } => {
                let _ = writeln!(out, "{:<20} error: {}", name, error);
            }
        }
    }
    if !comparison.globals_agree() {
        let _ = writeln!(out, "global modes differ");
    }
    for (subject, modes) in comparison.divergent_subjects() {
        let cells: Vec<String> = modes
            .iter()
            .map(|(registry, mode)| format!("{}={}", registry, mode))
            .collect();
        let _ = writeln!(out, "  {:<40} {}", subject, cells.join(" "));
    }
    out
}

pub fn render_health(health: &BTreeMap<String, HealthStatus>) -> String {
    let mut out = String::new();
    for (name, status) in health {
        let _ = writeln!(
            out,
            "{:<20} {:<10} {:>8.1} ms  {}",
            name,
            if status.healthy { "healthy" } else { "DOWN" },
            status.response_time_ms,
            status.message
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
