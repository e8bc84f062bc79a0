//! Inbound parameters
//!
//! [`ConnectionParams`] is the flat, string-typed parameter set callers hand to
//! dbquery (a JSON object from a tool call, or the CLI flags). It is checked in a
//! fixed order (family, host, port, username, password, query text, query shape)
//! before any connection is opened.

use serde::Deserialize;
use std::fmt;
use std::time::Instant;

use crate::engine::{Credentials, Family, Record, Session};
use crate::error::{DbQueryError, Result};
use crate::validation::validate;

const DOCUMENT_QUERY_EXAMPLE: &str =
    r#"{"collection": "your_collection", "query": {"field": "value"}, "projection": {"_id": 0, "field1": 1}, "limit": 10}"#;

/// Port given either as a JSON number or as text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortParam {
    Number(u64),
    Text(String),
}

impl PortParam {
    fn into_text(self) -> String {
        match self {
            Self::Number(port) => port.to_string(),
            Self::Text(text) => text,
        }
    }
}

/// Raw connection and query parameters
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Family tag (`mysql`, `postgresql`, `oracle`, `mongodb`), case-insensitive
    pub db_type: String,
    pub db_host: String,
    pub db_port: Option<PortParam>,
    pub db_username: String,
    pub db_password: String,
    pub db_name: Option<String>,
    /// Appended verbatim as the connection target's query string
    pub db_properties: Option<String>,
    /// SQL text, or a JSON document query for `MongoDB`
    pub query_sql: String,
}

impl ConnectionParams {
    /// Parse the family tag and build credentials
    pub fn credentials(&self) -> Result<Credentials> {
        let family: Family = self.db_type.parse()?;

        let mut builder = Credentials::builder(family, self.db_host.clone())
            .username(self.db_username.clone())
            .password(self.db_password.clone());
        if let Some(port) = self.db_port.clone() {
            builder = builder.port(port.into_text());
        }
        if let Some(database) = &self.db_name {
            builder = builder.database(database.clone());
        }
        if let Some(properties) = &self.db_properties {
            builder = builder.properties(properties.clone());
        }
        builder.build()
    }

    /// The query text, required and non-blank
    pub fn query_text(&self, family: Family) -> Result<&str> {
        require_query(&self.query_sql, family)
    }
}

/// Reject blank query text with a family-appropriate example
pub fn require_query(query: &str, family: Family) -> Result<&str> {
    if !query.trim().is_empty() {
        return Ok(query);
    }
    Err(match family {
        Family::MongoDb => DbQueryError::configuration(format!(
            "Please fill in the query, for example: {DOCUMENT_QUERY_EXAMPLE}"
        )),
        Family::MySql | Family::Postgres | Family::Oracle => DbQueryError::configuration(
            "Please fill in the query SQL, for example: select * from tbl_name",
        ),
    })
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("db_type", &self.db_type)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_username", &self.db_username)
            .field("db_password", &"***")
            .field("db_name", &self.db_name)
            .field("db_properties", &self.db_properties)
            .field("query_sql", &self.query_sql)
            .finish()
    }
}

/// Validate, connect, run one query and release the session
///
/// Everything that can be checked without a server is checked first, so a bad
/// query never opens a pool.
pub async fn run_once(params: &ConnectionParams) -> Result<Vec<Record>> {
    let started = Instant::now();
    let credentials = params.credentials()?;
    let family = credentials.family();
    let query = validate(params.query_text(family)?, family)?;

    let session = Session::open(credentials).await?;
    let result = session.execute_validated(&query).await;
    session.close().await;

    tracing::info!(
        %family,
        ok = result.is_ok(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "query finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: serde_json::Value) -> ConnectionParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_port_as_number_or_text() {
        let p = params(serde_json::json!({
            "db_type": "MySQL", "db_host": "h", "db_port": 3307,
            "db_username": "u", "db_password": "p"
        }));
        assert_eq!(p.credentials().unwrap().port(), Some(3307));

        let p = params(serde_json::json!({
            "db_type": "mysql", "db_host": "h", "db_port": "3308",
            "db_username": "u", "db_password": "p"
        }));
        assert_eq!(p.credentials().unwrap().port(), Some(3308));
    }

    #[test]
    fn test_out_of_range_port() {
        let p = params(serde_json::json!({
            "db_type": "postgres", "db_host": "h", "db_port": 70000,
            "db_username": "u", "db_password": "p"
        }));
        assert!(matches!(p.credentials().unwrap_err(), DbQueryError::Configuration(_)));
    }

    #[test]
    fn test_missing_family() {
        let err = params(serde_json::json!({"db_host": "h"})).credentials().unwrap_err();
        assert!(err.message().contains("Please select the database type"));
    }

    #[test]
    fn test_query_text_required() {
        let p = params(serde_json::json!({"query_sql": "  "}));

        let err = p.query_text(Family::Oracle).unwrap_err();
        assert!(err.message().contains("select * from tbl_name"));

        let err = p.query_text(Family::MongoDb).unwrap_err();
        assert!(err.message().contains(r#""collection": "your_collection""#));
    }

    #[test]
    fn test_debug_hides_password() {
        let p = params(serde_json::json!({"db_password": "topsecret"}));
        assert!(!format!("{p:?}").contains("topsecret"));
    }

    #[tokio::test]
    async fn test_bad_query_rejected_before_connecting() {
        let p = params(serde_json::json!({
            "db_type": "postgresql", "db_host": "unreachable.invalid",
            "db_username": "u", "db_password": "p",
            "query_sql": "DELETE FROM t"
        }));
        let err = run_once(&p).await.unwrap_err();
        assert!(matches!(err, DbQueryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_bad_document_query_rejected_before_connecting() {
        let p = params(serde_json::json!({
            "db_type": "mongodb", "db_host": "unreachable.invalid",
            "query_sql": "{not json"
        }));
        let err = run_once(&p).await.unwrap_err();
        assert!(matches!(err, DbQueryError::InvalidJson(_)));
    }
}
