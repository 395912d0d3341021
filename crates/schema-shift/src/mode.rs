// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compatibility mode lattice.
//!
//! Every mode is reduced to the set of checks it requires.  Transition
//! classification is a pure function of the two (implication-closed) check
//! sets, so the 7x7 matrix never needs to be stored or configured.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CompatibilityMode
// ---------------------------------------------------------------------------

/// One of the seven registry compatibility modes.
///
/// Modes carry no ordering of their own; compare them only through
/// [`required_checks`] and [`classify_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityMode {
    None,
    Backward,
    BackwardTransitive,
    Forward,
    ForwardTransitive,
    Full,
    FullTransitive,
}

impl CompatibilityMode {
    /// All modes, in declaration order.
    pub const ALL: [CompatibilityMode; 7] = [
        CompatibilityMode::None,
        CompatibilityMode::Backward,
        CompatibilityMode::BackwardTransitive,
        CompatibilityMode::Forward,
        CompatibilityMode::ForwardTransitive,
        CompatibilityMode::Full,
        CompatibilityMode::FullTransitive,
    ];

    /// Registry wire name (e.g. `FULL_TRANSITIVE`).
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityMode::None => "NONE",
            CompatibilityMode::Backward => "BACKWARD",
            CompatibilityMode::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityMode::Forward => "FORWARD",
            CompatibilityMode::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityMode::Full => "FULL",
            CompatibilityMode::FullTransitive => "FULL_TRANSITIVE",
        }
    }
}

impl fmt::Display for CompatibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mode name outside the seven known modes.
///
/// `FORWARD_FULL` lands here too: it is not mapped to any real mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown compatibility mode: {0:?}")]
pub struct UnknownModeError(pub String);

impl FromStr for CompatibilityMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CompatibilityMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownModeError(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// A single kind of history check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckKind {
    /// Candidate reads data of the immediately preceding version.
    BackwardSingle,
    /// Candidate reads data of every older surviving version.
    BackwardAll,
    /// Immediately preceding version reads candidate data.
    ForwardSingle,
    /// Every older surviving version reads candidate data.
    ForwardAll,
}

impl CheckKind {
    const ALL: [CheckKind; 4] = [
        CheckKind::BackwardSingle,
        CheckKind::BackwardAll,
        CheckKind::ForwardSingle,
        CheckKind::ForwardAll,
    ];

    fn bit(self) -> u8 {
        match self {
            CheckKind::BackwardSingle => 0b0001,
            CheckKind::BackwardAll => 0b0010,
            CheckKind::ForwardSingle => 0b0100,
            CheckKind::ForwardAll => 0b1000,
        }
    }

    /// Direction family of this check.
    pub fn family(self) -> Family {
        match self {
            CheckKind::BackwardSingle | CheckKind::BackwardAll => Family::Backward,
            CheckKind::ForwardSingle | CheckKind::ForwardAll => Family::Forward,
        }
    }

    /// `true` for the `*_ALL` (transitive) checks.
    pub fn is_transitive(self) -> bool {
        matches!(self, CheckKind::BackwardAll | CheckKind::ForwardAll)
    }
}

/// Direction family of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Family {
    Backward,
    Forward,
}

/// Small set of [`CheckKind`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CheckSet(u8);

impl CheckSet {
    pub const EMPTY: CheckSet = CheckSet(0);

    pub fn of(kinds: &[CheckKind]) -> Self {
        CheckSet(kinds.iter().fold(0, |acc, k| acc | k.bit()))
    }

    pub fn contains(&self, kind: CheckKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_subset(&self, other: &CheckSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn difference(&self, other: &CheckSet) -> CheckSet {
        CheckSet(self.0 & !other.0)
    }

    /// Add every check implied by a member: an `*_ALL` check also proves
    /// the matching `*_SINGLE` check.
    pub fn closure(&self) -> CheckSet {
        let mut bits = self.0;
        if self.contains(CheckKind::BackwardAll) {
            bits |= CheckKind::BackwardSingle.bit();
        }
        if self.contains(CheckKind::ForwardAll) {
            bits |= CheckKind::ForwardSingle.bit();
        }
        CheckSet(bits)
    }

    pub fn covers(&self, family: Family) -> bool {
        self.iter().any(|k| k.family() == family)
    }

    pub fn iter(&self) -> impl Iterator<Item = CheckKind> + '_ {
        CheckKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl fmt::Display for CheckSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iter()
            .map(|k| match k {
                CheckKind::BackwardSingle => "BACKWARD_SINGLE",
                CheckKind::BackwardAll => "BACKWARD_ALL",
                CheckKind::ForwardSingle => "FORWARD_SINGLE",
                CheckKind::ForwardAll => "FORWARD_ALL",
            })
            .collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Checks a mode requires of a candidate schema.
pub fn required_checks(mode: CompatibilityMode) -> CheckSet {
    use CheckKind::*;
    match mode {
        CompatibilityMode::None => CheckSet::EMPTY,
        CompatibilityMode::Backward => CheckSet::of(&[BackwardSingle]),
        CompatibilityMode::BackwardTransitive => CheckSet::of(&[BackwardAll]),
        CompatibilityMode::Forward => CheckSet::of(&[ForwardSingle]),
        CompatibilityMode::ForwardTransitive => CheckSet::of(&[ForwardAll]),
        CompatibilityMode::Full => CheckSet::of(&[BackwardSingle, ForwardSingle]),
        CompatibilityMode::FullTransitive => CheckSet::of(&[BackwardAll, ForwardAll]),
    }
}

// ---------------------------------------------------------------------------
// Transition classification
// ---------------------------------------------------------------------------

/// Risk of switching a subject (or registry) between two modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Risky,
    Dangerous,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Risky => "RISKY",
            RiskLevel::Dangerous => "DANGEROUS",
        })
    }
}

/// Machine-checkable reason behind a [`TransitionClassification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionReason {
    /// Same mode on both sides.
    Unchanged,
    /// Target requires nothing beyond what the current mode already proved.
    Relaxing,
    /// Target adds checks on top of everything the current mode required.
    Tightening,
    /// Target trades checks within direction families already covered.
    Reshaping,
    /// Target introduces a direction family the current mode never checked.
    DirectionChange,
}

/// Result of [`classify_transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionClassification {
    pub from: CompatibilityMode,
    pub to: CompatibilityMode,
    pub risk_level: RiskLevel,
    pub reason: TransitionReason,
    pub requires_history_validation: bool,
    pub rationale: String,
}

/// Classify a `from -> to` mode switch.
pub fn classify_transition(
    from: CompatibilityMode,
    to: CompatibilityMode,
) -> TransitionClassification {
    let proven = required_checks(from).closure();
    let wanted = required_checks(to).closure();
    let added = wanted.difference(&proven);

    let (risk_level, reason) = if from == to {
        (RiskLevel::Safe, TransitionReason::Unchanged)
    } else if wanted.is_subset(&proven) {
        (RiskLevel::Safe, TransitionReason::Relaxing)
    } else if proven.is_subset(&wanted) {
        (RiskLevel::Risky, TransitionReason::Tightening)
    } else if added.iter().any(|k| !proven.covers(k.family())) {
        (RiskLevel::Dangerous, TransitionReason::DirectionChange)
    } else {
        (RiskLevel::Risky, TransitionReason::Reshaping)
    };

    let rationale = match reason {
        TransitionReason::Unchanged => format!("{} is already in effect", to),
        TransitionReason::Relaxing => format!(
            "{} requires {} which {} already guaranteed",
            to, wanted, from
        ),
        TransitionReason::Tightening => format!(
            "{} adds {} on top of {}; existing history must be re-checked",
            to, added, from
        ),
        TransitionReason::Reshaping => format!(
            "{} adds {} within directions {} already checked",
            to, added, from
        ),
        TransitionReason::DirectionChange => format!(
            "{} adds {} in a direction {} never checked",
            to, added, from
        ),
    };

    TransitionClassification {
        from,
        to,
        risk_level,
        reason,
        requires_history_validation: !added.is_empty(),
        rationale,
    }
}

/// Classification of every ordered mode pair, row-major over
/// [`CompatibilityMode::ALL`].
pub fn transition_matrix() -> Vec<TransitionClassification> {
    CompatibilityMode::ALL
        .iter()
        .flat_map(|from| {
            CompatibilityMode::ALL
                .iter()
                .map(move |to| classify_transition(*from, *to))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use CompatibilityMode::*;

    fn risk(from: CompatibilityMode, to: CompatibilityMode) -> RiskLevel {
        classify_transition(from, to).risk_level
    }

    #[test]
    fn parses_known_modes_case_insensitively() {
        assert_eq!("FULL_TRANSITIVE".parse::<CompatibilityMode>(), Ok(FullTransitive));
        assert_eq!("backward".parse::<CompatibilityMode>(), Ok(Backward));
        assert_eq!(" NONE ".parse::<CompatibilityMode>(), Ok(None));
    }

    #[test]
    fn forward_full_is_not_a_mode() {
        let err = "FORWARD_FULL".parse::<CompatibilityMode>().unwrap_err();
        assert_eq!(err, UnknownModeError("FORWARD_FULL".into()));
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        for mode in CompatibilityMode::ALL {
            assert_eq!(mode.to_string().parse::<CompatibilityMode>(), Ok(mode));
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&BackwardTransitive).unwrap();
        assert_eq!(json, "\"BACKWARD_TRANSITIVE\"");
    }

    #[test]
    fn required_checks_mapping() {
        assert!(required_checks(None).is_empty());
        assert_eq!(required_checks(Full), CheckSet::of(&[CheckKind::BackwardSingle, CheckKind::ForwardSingle]));
        assert_eq!(required_checks(ForwardTransitive), CheckSet::of(&[CheckKind::ForwardAll]));
    }

    #[test]
    fn closure_adds_single_checks() {
        let closed = required_checks(FullTransitive).closure();
        assert_eq!(closed.iter().count(), 4);
    }

    #[test]
    fn identity_is_safe_without_validation() {
        for mode in CompatibilityMode::ALL {
            let c = classify_transition(mode, mode);
            assert_eq!(c.risk_level, RiskLevel::Safe);
            assert!(!c.requires_history_validation);
        }
    }

    #[test]
    fn opposite_directions_are_dangerous() {
        assert_eq!(risk(Backward, Forward), RiskLevel::Dangerous);
        assert_eq!(risk(ForwardTransitive, BackwardTransitive), RiskLevel::Dangerous);
        assert_eq!(risk(BackwardTransitive, Full), RiskLevel::Dangerous);
    }

    #[test]
    fn tightening_is_risky() {
        assert_eq!(risk(None, FullTransitive), RiskLevel::Risky);
        assert_eq!(risk(Backward, BackwardTransitive), RiskLevel::Risky);
        assert_eq!(risk(Full, FullTransitive), RiskLevel::Risky);
        assert_eq!(risk(Full, ForwardTransitive), RiskLevel::Risky);
    }

    #[test]
    fn relaxing_from_transitive() {
        let c = classify_transition(BackwardTransitive, Backward);
        assert_eq!(c.risk_level, RiskLevel::Safe);
        assert_eq!(c.reason, TransitionReason::Relaxing);
        assert!(!c.requires_history_validation);
    }

    #[test]
    fn matrix_has_every_pair() {
        assert_eq!(transition_matrix().len(), 49);
    }
}
