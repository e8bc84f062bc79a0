//! dbquery - Read-Only Query Adapter
//!
//! dbquery runs a single read-only query against MySQL, PostgreSQL, Oracle or
//! MongoDB and returns flat records: every value a string, number or boolean.
//!
//! # Core Principles
//! - Read-only: one `SELECT` per call, or one `find` for MongoDB
//! - Validate before connecting; nothing partial is ever returned
//! - Uniform output across families (timestamps, UUIDs, binary, nulls)
//! - Credentials never appear unredacted in logs or errors
//!
//! # Flow
//! [`Credentials`] -> [`ConnectionTarget`] -> [`Session::open`] ->
//! [`Session::execute`] (validate, execute, normalize) -> `Vec<`[`Record`]`>`
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`engine`] - Families, credentials, sessions and the per-family engines
//! - [`target`] - Connection string builder
//! - [`validation`] - Read-only query validation
//! - [`normalize`] - Result value formatting
//! - [`params`] - Inbound parameter checking and one-shot execution
//! - [`output`] - JSON envelopes and table rendering
//! - [`config`] - Named connection profiles

pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod output;
pub mod params;
pub mod target;
pub mod validation;

// Re-export commonly used types for convenience
pub use config::{load_profiles, resolve_profile, save_profile, ConfigLocation, ProfileRegistry, StoredProfile};
pub use engine::{Credentials, CredentialsBuilder, DatabaseEngine, Family, Record, Session};
pub use error::{DbQueryError, Result};
pub use output::{render_table, ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use params::{run_once, ConnectionParams};
pub use target::ConnectionTarget;
pub use validation::{validate, DocumentQuery, SelectStatement, ValidatedQuery};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_exports() {
        let creds = Credentials::builder(Family::MySql, "h").username("u").password("p").build().unwrap();
        let target = ConnectionTarget::build(&creds).unwrap();
        assert_eq!(target.family(), Family::MySql);
        assert!(validate("SELECT 1", Family::MySql).is_ok());
    }
}
