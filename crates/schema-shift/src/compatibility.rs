// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema evolution checker.
//!
//! Everything is derived from one primitive, [`can_read`]: can a reader
//! schema decode data produced with a writer schema?
//!
//! - BACKWARD: new schema reads old data (`reader = new`, `writer = old`)
//! - FORWARD: old schema reads new data (`reader = old`, `writer = new`)
//!
//! Field matching is alias-aware on both sides, so a rename backed by an
//! alias is one field, not a remove plus an add.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{FieldSpec, FieldType, Primitive, RecordType, SchemaVersion};

// ---------------------------------------------------------------------------
// Verdict types
// ---------------------------------------------------------------------------

/// Direction a verdict was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Backward,
    Forward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Backward => "BACKWARD",
            Direction::Forward => "FORWARD",
        })
    }
}

/// Why a field failed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    ReaderFieldMissingDefaultValue,
    FieldTypeMismatch,
    EnumValueUnknownToReader,
    NameMismatch,
    /// One side of the pair could not be parsed.
    SchemaUnreadable,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReasonCode::ReaderFieldMissingDefaultValue => "READER_FIELD_MISSING_DEFAULT_VALUE",
            ReasonCode::FieldTypeMismatch => "FIELD_TYPE_MISMATCH",
            ReasonCode::EnumValueUnknownToReader => "ENUM_VALUE_UNKNOWN_TO_READER",
            ReasonCode::NameMismatch => "NAME_MISMATCH",
            ReasonCode::SchemaUnreadable => "SCHEMA_UNREADABLE",
        })
    }
}

/// A single resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted path of the field in the reader schema (empty for the root).
    pub field: String,
    pub reason: ReasonCode,
    pub message: String,
}

/// Result of checking one schema pair in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityVerdict {
    pub is_compatible: bool,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl CompatibilityVerdict {
    pub fn from_violations(direction: Direction, violations: Vec<Violation>) -> Self {
        Self {
            is_compatible: violations.is_empty(),
            direction,
            violations,
        }
    }

    /// Verdict for a pair where one side could not be parsed.
    pub fn unreadable(direction: Direction, version: u32, reason: &str) -> Self {
        Self::from_violations(
            direction,
            vec![Violation {
                field: String::new(),
                reason: ReasonCode::SchemaUnreadable,
                message: format!("version {} cannot be parsed: {}", version, reason),
            }],
        )
    }

    /// Relabel a raw [`can_read`] result with the direction it stands for.
    pub fn in_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Decide whether `reader` can decode data written with `writer`.
///
/// Callers swap the arguments to pick the direction; the returned verdict is
/// labelled [`Direction::Backward`] (reader is the newer side) unless
/// relabelled with [`CompatibilityVerdict::in_direction`].
pub fn can_read(reader: &SchemaVersion, writer: &SchemaVersion) -> CompatibilityVerdict {
    let mut violations = Vec::new();
    resolve_record(
        &reader.as_record(),
        &writer.as_record(),
        "",
        &mut violations,
    );
    CompatibilityVerdict::from_violations(Direction::Backward, violations)
}

/// New schema reads data written with the old one.
pub fn check_backward(new: &SchemaVersion, old: &SchemaVersion) -> CompatibilityVerdict {
    can_read(new, old).in_direction(Direction::Backward)
}

/// Old schema reads data written with the new one.
pub fn check_forward(new: &SchemaVersion, old: &SchemaVersion) -> CompatibilityVerdict {
    can_read(old, new).in_direction(Direction::Forward)
}

// ---------------------------------------------------------------------------
// Record resolution
// ---------------------------------------------------------------------------

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Find the writer field a reader field binds to: exact name first, then an
/// alias on either side.  A renamed field keeps its old name as an alias, and
/// that schema may be the reader (backward) or the writer (forward).
fn match_writer_field<'w>(reader_field: &FieldSpec, writer: &'w RecordType) -> Option<&'w FieldSpec> {
    writer
        .fields
        .iter()
        .find(|w| w.name == reader_field.name)
        .or_else(|| writer.fields.iter().find(|w| reader_field.answers_to(&w.name)))
        .or_else(|| writer.fields.iter().find(|w| w.answers_to(&reader_field.name)))
}

fn resolve_record(
    reader: &RecordType,
    writer: &RecordType,
    path: &str,
    violations: &mut Vec<Violation>,
) {
    // Writer-only fields are skipped by the reader and never a violation.
    for reader_field in &reader.fields {
        let field_path = join_path(path, &reader_field.name);
        match match_writer_field(reader_field, writer) {
            Some(writer_field) => resolve_type(
                &reader_field.field_type,
                &writer_field.field_type,
                &field_path,
                violations,
            ),
            None if reader_field.default.is_some() => {}
            None => violations.push(Violation {
                field: field_path,
                reason: ReasonCode::ReaderFieldMissingDefaultValue,
                message: format!(
                    "reader field '{}' is absent from the writer schema and has no default",
                    reader_field.name
                ),
            }),
        }
    }
}

fn names_match(
    reader_name: &str,
    reader_aliases: &[String],
    writer_name: &str,
    writer_aliases: &[String],
) -> bool {
    reader_name == writer_name
        || reader_aliases.iter().any(|a| a == writer_name)
        || writer_aliases.iter().any(|a| a == reader_name)
}

fn type_mismatch(path: &str, reader: &FieldType, writer: &FieldType) -> Violation {
    Violation {
        field: path.to_string(),
        reason: ReasonCode::FieldTypeMismatch,
        message: format!(
            "writer type {} cannot be read as {}",
            writer.describe(),
            reader.describe()
        ),
    }
}

/// Primitive promotions allowed by Avro schema resolution.
fn promotable(writer: Primitive, reader: Primitive) -> bool {
    use Primitive::*;
    writer == reader
        || matches!(
            (writer, reader),
            (Int, Long)
                | (Int, Float)
                | (Int, Double)
                | (Long, Float)
                | (Long, Double)
                | (Float, Double)
                | (String, Bytes)
                | (Bytes, String)
        )
}

/// Non-recording check: does `writer` resolve against `reader` cleanly?
fn resolves(reader: &FieldType, writer: &FieldType) -> bool {
    let mut scratch = Vec::new();
    resolve_type(reader, writer, "", &mut scratch);
    scratch.is_empty()
}

fn resolve_type(reader: &FieldType, writer: &FieldType, path: &str, violations: &mut Vec<Violation>) {
    match (reader, writer) {
        // Every writer branch must land somewhere in the reader.
        (_, FieldType::Union { branches }) => {
            let unreadable: Vec<String> = branches
                .iter()
                .filter(|b| !resolves(reader, b))
                .map(|b| b.describe())
                .collect();
            if !unreadable.is_empty() {
                violations.push(Violation {
                    field: path.to_string(),
                    reason: ReasonCode::FieldTypeMismatch,
                    message: format!(
                        "writer union {} has branches {} that {} cannot read",
                        writer.describe(),
                        unreadable.join(", "),
                        reader.describe()
                    ),
                });
            }
        }

        (FieldType::Union { branches }, _) => {
            // First reader branch that accepts the writer wins; report the
            // nested violations of a same-shaped branch when none does.
            if branches.iter().any(|b| resolves(b, writer)) {
                return;
            }
            match branches.iter().find(|b| same_shape(b, writer)) {
                Some(candidate) => resolve_type(candidate, writer, path, violations),
                None => violations.push(type_mismatch(path, reader, writer)),
            }
        }

        (FieldType::Primitive { primitive: r }, FieldType::Primitive { primitive: w }) => {
            if !promotable(*w, *r) {
                violations.push(type_mismatch(path, reader, writer));
            }
        }

        (FieldType::Record(r), FieldType::Record(w)) => {
            if !names_match(&r.name, &r.aliases, &w.name, &w.aliases) {
                violations.push(name_mismatch(path, &r.name, &w.name));
                return;
            }
            resolve_record(r, w, path, violations);
        }

        (
            FieldType::Enum {
                name: rn,
                aliases: ra,
                symbols: rs,
            },
            FieldType::Enum {
                name: wn,
                aliases: wa,
                symbols: ws,
            },
        ) => {
            if !names_match(rn, ra, wn, wa) {
                violations.push(name_mismatch(path, rn, wn));
                return;
            }
            let unknown: Vec<&str> = ws
                .iter()
                .filter(|s| !rs.contains(s))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                violations.push(Violation {
                    field: path.to_string(),
                    reason: ReasonCode::EnumValueUnknownToReader,
                    message: format!(
                        "writer enum {} has symbols unknown to the reader: {}",
                        wn,
                        unknown.join(", ")
                    ),
                });
            }
        }

        (
            FieldType::Fixed {
                name: rn,
                aliases: ra,
                size: rsize,
            },
            FieldType::Fixed {
                name: wn,
                aliases: wa,
                size: wsize,
            },
        ) => {
            if !names_match(rn, ra, wn, wa) {
                violations.push(name_mismatch(path, rn, wn));
            } else if rsize != wsize {
                violations.push(Violation {
                    field: path.to_string(),
                    reason: ReasonCode::FieldTypeMismatch,
                    message: format!("fixed {} size changed from {} to {}", wn, wsize, rsize),
                });
            }
        }

        (FieldType::Array { items: r }, FieldType::Array { items: w }) => {
            resolve_type(r, w, &join_path(path, "[]"), violations);
        }

        (FieldType::Map { values: r }, FieldType::Map { values: w }) => {
            resolve_type(r, w, &join_path(path, "{}"), violations);
        }

        // Recursive references resolve by name and aliases only.
        (
            FieldType::Ref { name: rn, aliases: ra },
            FieldType::Ref { name: wn, aliases: wa },
        ) if names_match(rn, ra, wn, wa) => {}
        (FieldType::Ref { name: rn, aliases: ra }, FieldType::Record(w))
            if names_match(rn, ra, &w.name, &w.aliases) => {}
        (FieldType::Record(r), FieldType::Ref { name: wn, aliases: wa })
            if names_match(&r.name, &r.aliases, wn, wa) => {}

        _ => violations.push(type_mismatch(path, reader, writer)),
    }
}

fn name_mismatch(path: &str, reader: &str, writer: &str) -> Violation {
    Violation {
        field: path.to_string(),
        reason: ReasonCode::NameMismatch,
        message: format!("writer type {} does not match reader type {}", writer, reader),
    }
}

/// Same structural kind and, for named types, the same name.
fn same_shape(a: &FieldType, b: &FieldType) -> bool {
    match (a, b) {
        (FieldType::Record(x), FieldType::Record(y)) => {
            names_match(&x.name, &x.aliases, &y.name, &y.aliases)
        }
        (
            FieldType::Enum { name: x, aliases: xa, .. },
            FieldType::Enum { name: y, aliases: ya, .. },
        ) => names_match(x, xa, y, ya),
        (FieldType::Array { .. }, FieldType::Array { .. })
        | (FieldType::Map { .. }, FieldType::Map { .. }) => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
