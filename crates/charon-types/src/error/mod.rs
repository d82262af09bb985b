//! Domain-level error kinds shared by every crate in the workspace.
//!
//! These are the parse/validation failures a model can detect on its own,
//! independent of any HTTP framework. The HTTP-facing error taxonomy
//! (`ApiError`, with status-code mapping) lives in `charon-core::error`,
//! which wraps these variants alongside store and data-plane failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid CIDR literal: {0}")]
    InvalidCidr(String),

    #[error("invalid country code: {0}")]
    InvalidCountryCode(String),

    #[error("invalid forward port: {0}")]
    InvalidPort(i32),

    #[error("domain_names must contain at least one entry")]
    EmptyDomainNames,

    #[error("unknown enum value for {field}: {value}")]
    UnknownEnumValue { field: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_serializes_and_displays() {
        let err = DomainError::InvalidCidr("not-a-cidr".into());
        let json: &'static str = Box::leak(serde_json::to_string(&err).unwrap().into_boxed_str());
        let back: DomainError = serde_json::from_str(json).unwrap();
        assert_eq!(err, back);
        assert!(format!("{err}").contains("not-a-cidr"));
    }
}
