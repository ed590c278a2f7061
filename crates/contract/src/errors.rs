//! Error types for the contract suite.

use std::path::PathBuf;

use thiserror::Error;

use crate::suite::VerificationReport;

/// Main error type for contract suite operations.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Invalid matcher at {path}: {reason}")]
    InvalidMatcher { path: String, reason: String },

    #[error("Interaction already registered: '{description}' given '{provider_state}'")]
    DuplicateInteraction { description: String, provider_state: String },

    #[error("Conflicting interactions: '{description}' given '{provider_state}' is recorded with different content")]
    ConflictingInteraction { description: String, provider_state: String },

    #[error("Contract verification failed:\n{0}")]
    Verification(VerificationReport),

    #[error("Mock provider error: {message}")]
    Server { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Pact file error at {}: {source}", .path.display())]
    PactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pact file JSON error: {0}")]
    PactJson(#[from] serde_json::Error),
}

impl ContractError {
    /// Create an invalid matcher error.
    pub fn invalid_matcher(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMatcher {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a duplicate interaction error.
    pub fn duplicate_interaction(description: impl Into<String>, provider_state: impl Into<String>) -> Self {
        Self::DuplicateInteraction {
            description: description.into(),
            provider_state: provider_state.into(),
        }
    }

    /// Create a conflicting interaction error.
    pub fn conflicting_interaction(description: impl Into<String>, provider_state: impl Into<String>) -> Self {
        Self::ConflictingInteraction {
            description: description.into(),
            provider_state: provider_state.into(),
        }
    }

    /// Create a mock provider error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server { message: message.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a pact file IO error.
    pub fn pact_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PactIo { path: path.into(), source }
    }

    /// Verification report carried by a failed verify or finalize.
    pub fn report(&self) -> Option<&VerificationReport> {
        match self {
            Self::Verification(report) => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_creation() {
        let err = ContractError::invalid_matcher("$.body.id", "bad regex");
        assert!(matches!(err, ContractError::InvalidMatcher { .. }));
        assert_eq!(err.to_string(), "Invalid matcher at $.body.id: bad regex");

        let err = ContractError::duplicate_interaction("a request", "state");
        assert!(matches!(err, ContractError::DuplicateInteraction { .. }));

        let err = ContractError::config("PACT_BIND_ADDRESS must be loopback");
        assert!(err.report().is_none());
    }

    #[test]
    fn test_pact_io_error_mentions_path() {
        let err = ContractError::pact_io("/tmp/pacts/a-b.json", std::io::Error::other("denied"));
        assert!(err.to_string().contains("/tmp/pacts/a-b.json"));
    }
}
