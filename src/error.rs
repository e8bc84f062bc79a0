//! Error Handling Infrastructure
//!
//! Every failure surfaced by dbquery is one of five kinds, each naming the stage
//! that failed and carrying the underlying cause's text.
//!
//! # Error Categories
//! - `Configuration`: bad or missing inbound parameter, wrong builder for a family
//! - `Validation`: query shape rejected before anything is executed
//! - `InvalidJson`: a document-store query that is not valid JSON
//! - `Connection`: a session (or a pooled connection) could not be established
//! - `Execution`: the query was accepted but failed while running
//!
//! None of these are retried internally.

use thiserror::Error;

/// Main error type for dbquery operations
#[derive(Error, Debug)]
pub enum DbQueryError {
    /// Bad or missing inbound parameter, or a builder invoked for the wrong family
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Query rejected by the validation gate
    #[error("Validation error: {0}")]
    Validation(String),

    /// Document-store query text is not valid JSON
    #[error("Invalid JSON query: {0}")]
    InvalidJson(String),

    /// Session creation or connection checkout failed
    #[error("Database connection creation exception. {0}")]
    Connection(String),

    /// Query failed during execution or result conversion
    #[error("Database query execution exception. {0}")]
    Execution(String),
}

impl DbQueryError {
    /// Stable error code for machine-readable output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidJson(_) => "INVALID_JSON",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Execution(_) => "EXECUTION_ERROR",
        }
    }

    /// Human-readable message, safe to print verbatim
    ///
    /// Driver messages are passed through as-is; dbquery never formats raw
    /// credentials into an error.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

/// Result type alias for dbquery operations
pub type Result<T> = std::result::Result<T, DbQueryError>;
