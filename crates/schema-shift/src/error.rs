// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use thiserror::Error;

use crate::config::ConfigError;
use crate::mode::UnknownModeError;
use crate::planner::UnknownStrategyError;
use crate::registry::RegistryError;
use crate::schema::SchemaParseError;

/// Top-level errors.
///
/// A blocked GLOBAL plan is not an error; it is carried by the plan itself.
#[derive(Debug, Error)]
pub enum ShiftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaParseError),

    #[error(transparent)]
    Mode(#[from] UnknownModeError),

    #[error(transparent)]
    Strategy(#[from] UnknownStrategyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = ShiftError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_component_errors() {
        let err: ShiftError = UnknownModeError("FORWARD_FULL".into()).into();
        assert_eq!(err.to_string(), "unknown compatibility mode: \"FORWARD_FULL\"");

        let err: ShiftError = RegistryError::SubjectNotFound("orders".into()).into();
        assert_eq!(err.to_string(), "Registry error: subject not found: orders");
    }
}
