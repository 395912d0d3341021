// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compatibility-mode transitions for schema registries.
//!
//! Answers "what breaks if this registry (or subject) moves from mode X to
//! mode Y?", proves it against the real version history, and turns the
//! answer into a replayable migration plan.
//!
//! # Features
//!
//! - **Mode lattice**: risk of any of the 7x7 mode transitions
//! - **Evolution checker**: Avro-style reader/writer resolution with
//!   field-level violations
//! - **History validation**: SINGLE and transitive checks over surviving
//!   versions, fanned out over a worker pool with cooperative cancellation
//! - **Migration planning**: SELECTIVE or GLOBAL plans with rollback modes
//! - **Registry interface**: one narrow capability trait per backend, an
//!   in-memory backend with file snapshots, and a Confluent REST client
//! - **Federation**: compare modes, locate subjects and check health across
//!   several registries
//!
//! # Architecture
//!
//! ```text
//!   RegistryClient (backend)
//!        |
//!        v
//!   MigrationService --> validator --> compatibility
//!        |                  |
//!        v                  v
//!     planner <------- SubjectVerdict
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! log_level = "info"
//!
//! [registry]
//! backend = "memory"          # or confluent / karapace / redpanda
//! directory = "registry-data"
//! default_mode = "BACKWARD"
//! # url = "http://localhost:8081"
//!
//! [migration]
//! target_mode = "FULL_TRANSITIVE"
//! strategy = "selective"
//! workers = 4
//!
//! [[federation]]
//! name = "prod"
//! backend = "confluent"
//! url = "http://prod-registry:8081"
//! ```

pub mod compatibility;
pub mod config;
pub mod confluent;
pub mod error;
pub mod federation;
pub mod mode;
pub mod persistence;
pub mod planner;
pub mod registry;
pub mod report;
pub mod schema;
pub mod service;
pub mod subject;
pub mod validator;

pub use compatibility::{
    can_read, check_backward, check_forward, CompatibilityVerdict, Direction, ReasonCode, Violation,
};
pub use config::{ConfigError, FederationMember, RegistryConfig, ShiftConfig};
pub use confluent::ConfluentRegistry;
pub use error::ShiftError;
pub use federation::{
    HealthStatus, MemberModes, ModeComparison, ModeSnapshot, RegistryFederation, SetModeStatus,
};
pub use mode::{
    classify_transition, required_checks, transition_matrix, CheckKind, CheckSet, CompatibilityMode,
    RiskLevel, TransitionClassification, TransitionReason, UnknownModeError,
};
pub use persistence::FilePersistence;
pub use planner::{
    plan, plan_with_unchecked, ActionTarget, MigrationPlan, PlannedAction, PriorModes, Strategy,
    SubjectDecision, TransitionBlocked, UnknownStrategyError,
};
pub use registry::{BackendKind, InMemoryRegistry, RegistryClient, RegistryError};
pub use schema::{FieldSpec, FieldType, Primitive, SchemaFormat, SchemaParseError, SchemaVersion};
pub use service::{ApplyFailure, ApplyOutcome, MigrationService};
pub use subject::{Subject, SubjectVersion, VersionBody};
pub use validator::{
    validate_subject, BulkReport, BulkSummary, BulkValidator, CancelToken, HistoryState,
    SubjectVerdict, VersionCheck,
};
