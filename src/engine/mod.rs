//! Database Families, Credentials and Sessions
//!
//! This module defines the closed set of database families dbquery talks to, the
//! credentials used to reach them, and the [`Session`] that owns one family's
//! pooled driver handle.
//!
//! # Family Dispatch
//! Every family-dependent decision (connection grammar, validation dialect, driver,
//! value conversion) is a single exhaustive `match` on [`Family`]. Adding a family
//! is a compile error everywhere it still needs handling.
//!
//! # Engine Isolation
//! Each engine lives in its own module behind its own Cargo feature and only shares
//! the value formatting helpers in [`crate::normalize`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::{DbQueryError, Result};
use crate::normalize;
use crate::validation::{validate, ValidatedQuery};

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "oracle")]
pub mod oracle;

#[cfg(feature = "mongodb")]
pub mod mongodb;

/// Upper bound on pooled connections per session
pub const POOL_MAX_SIZE: u32 = 100;

/// Pooled connections older than this are recycled by the driver
pub const POOL_RECYCLE: Duration = Duration::from_secs(36);

/// One normalized result row or document
///
/// Keys keep the column order reported by the driver. After normalization every
/// value is a string, number or boolean.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Supported database families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// `MySQL` (and `MariaDB`)
    #[serde(rename = "mysql")]
    MySql,
    /// `PostgreSQL`
    #[serde(alias = "postgresql")]
    Postgres,
    /// Oracle Database
    Oracle,
    /// `MongoDB` document store
    #[serde(rename = "mongodb", alias = "mongo")]
    MongoDb,
}

impl Family {
    /// Canonical lowercase tag
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Oracle => "oracle",
            Self::MongoDb => "mongodb",
        }
    }

    /// True for the SQL families
    #[must_use]
    pub const fn is_relational(&self) -> bool {
        !matches!(self, Self::MongoDb)
    }

    /// Canned query used to smoke-test a session without user input
    #[must_use]
    pub const fn probe_query(&self) -> &'static str {
        match self {
            Self::MySql | Self::Postgres => "SELECT 1",
            Self::Oracle => "SELECT 1 FROM DUAL",
            Self::MongoDb => r#"{"collection":"test_collection","query":{},"limit":1}"#,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = DbQueryError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.trim().to_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "oracle" => Ok(Self::Oracle),
            "mongodb" | "mongo" => Ok(Self::MongoDb),
            "" => Err(DbQueryError::configuration("Please select the database type")),
            other => Err(DbQueryError::configuration(format!(
                "Unsupported database type '{other}' (expected mysql, postgresql, oracle or mongodb)"
            ))),
        }
    }
}

/// Everything needed to reach one database
///
/// Built through [`Credentials::builder`], which applies the inbound parameter
/// rules. Immutable afterwards. Blank optional values are stored as `None`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    family: Family,
    username: String,
    password: String,
    host: String,
    port: Option<u16>,
    database: Option<String>,
    properties: Option<String>,
}

impl Credentials {
    /// Start building credentials for `family` at `host`
    pub fn builder(family: Family, host: impl Into<String>) -> CredentialsBuilder {
        CredentialsBuilder {
            family,
            host: host.into(),
            username: String::new(),
            password: String::new(),
            port: None,
            database: None,
            properties: None,
        }
    }

    #[must_use]
    pub const fn family(&self) -> Family {
        self.family
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Raw password. Never log this.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Opaque query-string suffix, appended verbatim to the connection target
    #[must_use]
    pub fn properties(&self) -> Option<&str> {
        self.properties.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("family", &self.family)
            .field("username", &self.username)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Builder for [`Credentials`]
#[derive(Clone)]
pub struct CredentialsBuilder {
    family: Family,
    host: String,
    username: String,
    password: String,
    port: Option<String>,
    database: Option<String>,
    properties: Option<String>,
}

impl CredentialsBuilder {
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Port as text; blank means "use the driver default"
    #[must_use]
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: impl Into<String>) -> Self {
        self.properties = Some(properties.into());
        self
    }

    /// Validate and freeze the credentials
    ///
    /// Host must be non-blank. Username and password are required for the
    /// relational families; `MongoDB` accepts both empty for anonymous access.
    pub fn build(self) -> Result<Credentials> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(DbQueryError::configuration("Please fill in the database host"));
        }

        if self.family.is_relational() {
            if self.username.is_empty() {
                return Err(DbQueryError::configuration("Please fill in the database username"));
            }
            if self.password.is_empty() {
                return Err(DbQueryError::configuration("Please fill in the database password"));
            }
        }

        let port = match non_blank(self.port) {
            Some(text) => Some(text.trim().parse::<u16>().map_err(|_| {
                DbQueryError::configuration(format!("Invalid database port '{}'", text.trim()))
            })?),
            None => None,
        };

        Ok(Credentials {
            family: self.family,
            username: self.username,
            password: self.password,
            host: host.to_string(),
            port,
            database: non_blank(self.database),
            properties: non_blank(self.properties),
        })
    }
}

/// Blank-or-whitespace-only values count as absent
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Common surface of the per-family engines
///
/// `open` configures the pool once; `run` executes an already validated query and
/// returns records whose values are converted but not yet null-filled; `close`
/// releases pooled connections.
pub trait DatabaseEngine: Sized + Send + Sync {
    /// Validated query shape this engine accepts
    type Query: Sync;

    fn open(credentials: &Credentials) -> impl std::future::Future<Output = Result<Self>> + Send;

    fn run(
        &self,
        query: &Self::Query,
    ) -> impl std::future::Future<Output = Result<Vec<Record>>> + Send;

    fn close(self) -> impl std::future::Future<Output = ()> + Send;
}

/// Family-specific pooled handle
enum Engine {
    #[cfg(feature = "mysql")]
    MySql(mysql::MySqlEngine),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresEngine),
    #[cfg(feature = "oracle")]
    Oracle(oracle::OracleEngine),
    #[cfg(feature = "mongodb")]
    MongoDb(mongodb::MongoEngine),
}

/// A live, reusable connection to one database
///
/// Owns its credentials and the driver pool. The family never changes after
/// [`Session::open`]. Release with [`Session::close`]; dropping also releases the
/// pool, just without waiting for it.
pub struct Session {
    credentials: Credentials,
    engine: Engine,
}

impl Session {
    /// Open a session for `credentials`
    ///
    /// Builds the connection target and configures the driver pool with
    /// [`POOL_MAX_SIZE`] and [`POOL_RECYCLE`]. Drivers connect lazily, so an
    /// unreachable server usually surfaces on the first query.
    pub async fn open(credentials: Credentials) -> Result<Self> {
        let family = credentials.family();
        tracing::debug!(%family, host = credentials.host(), "opening session");

        let engine = match family {
            Family::MySql => {
                #[cfg(feature = "mysql")]
                {
                    Engine::MySql(mysql::MySqlEngine::open(&credentials).await?)
                }
                #[cfg(not(feature = "mysql"))]
                {
                    return Err(not_compiled(family));
                }
            }
            Family::Postgres => {
                #[cfg(feature = "postgres")]
                {
                    Engine::Postgres(postgres::PostgresEngine::open(&credentials).await?)
                }
                #[cfg(not(feature = "postgres"))]
                {
                    return Err(not_compiled(family));
                }
            }
            Family::Oracle => {
                #[cfg(feature = "oracle")]
                {
                    Engine::Oracle(oracle::OracleEngine::open(&credentials).await?)
                }
                #[cfg(not(feature = "oracle"))]
                {
                    return Err(not_compiled(family));
                }
            }
            Family::MongoDb => {
                #[cfg(feature = "mongodb")]
                {
                    Engine::MongoDb(mongodb::MongoEngine::open(&credentials).await?)
                }
                #[cfg(not(feature = "mongodb"))]
                {
                    return Err(not_compiled(family));
                }
            }
        };

        Ok(Self { credentials, engine })
    }

    #[must_use]
    pub const fn family(&self) -> Family {
        self.credentials.family()
    }

    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Validate, execute and normalize one query
    pub async fn execute(&self, query: &str) -> Result<Vec<Record>> {
        tracing::debug!(family = %self.family(), "query received");
        let validated = validate(query, self.family())?;
        self.execute_validated(&validated).await
    }

    /// Execute a query that already passed [`validate`]
    pub async fn execute_validated(&self, query: &ValidatedQuery) -> Result<Vec<Record>> {
        if query.family() != self.family() {
            return Err(DbQueryError::configuration(format!(
                "Query was validated for {} but the session is {}",
                query.family(),
                self.family()
            )));
        }
        tracing::debug!(family = %self.family(), "query validated");

        let started = Instant::now();
        let mut records: Vec<Record> = match (&self.engine, query) {
            #[cfg(feature = "mysql")]
            (Engine::MySql(engine), ValidatedQuery::Select(statement)) => {
                engine.run(statement).await?
            }
            #[cfg(feature = "postgres")]
            (Engine::Postgres(engine), ValidatedQuery::Select(statement)) => {
                engine.run(statement).await?
            }
            #[cfg(feature = "oracle")]
            (Engine::Oracle(engine), ValidatedQuery::Select(statement)) => {
                engine.run(statement).await?
            }
            #[cfg(feature = "mongodb")]
            (Engine::MongoDb(engine), ValidatedQuery::Document(document)) => {
                engine.run(document).await?
            }
            #[allow(unreachable_patterns)]
            _ => {
                return Err(DbQueryError::configuration(format!(
                    "Query shape does not match the {} session",
                    self.family()
                )))
            }
        };
        tracing::debug!(
            family = %self.family(),
            rows = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query executed"
        );

        normalize::fill_nulls(&mut records);
        Ok(records)
    }

    /// Run the family's canned probe query
    pub async fn self_test(&self) -> Result<Vec<Record>> {
        self.execute(self.family().probe_query()).await
    }

    /// Release the pooled connections
    pub async fn close(self) {
        match self.engine {
            #[cfg(feature = "mysql")]
            Engine::MySql(engine) => engine.close().await,
            #[cfg(feature = "postgres")]
            Engine::Postgres(engine) => engine.close().await,
            #[cfg(feature = "oracle")]
            Engine::Oracle(engine) => engine.close().await,
            #[cfg(feature = "mongodb")]
            Engine::MongoDb(engine) => engine.close().await,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("credentials", &self.credentials).finish_non_exhaustive()
    }
}

#[allow(dead_code)]
fn not_compiled(family: Family) -> DbQueryError {
    DbQueryError::configuration(format!(
        "Support for {family} was not compiled into this build (enable the '{family}' feature)"
    ))
}
