//! Oracle Database Engine Implementation
//!
//! Implements [`DatabaseEngine`] for Oracle using the `oracle` crate (ODPI-C).
//! Oracle Instant Client libraries must be installed at runtime.
//!
//! # Implementation Notes
//! - The driver is synchronous; pool creation and queries run on
//!   `tokio::task::spawn_blocking`
//! - The `oracle://` connection target is turned back into an Easy Connect
//!   string (`//host[:port]/service[?params]`) plus username and password
//! - NUMBER stays an integer when it fits, else a float, else exact text
//! - DATE and TIMESTAMP are formatted as timestamps (Oracle DATE has a time part)

use oracle::pool::{Pool, PoolBuilder};
use oracle::sql_type::OracleType;
use oracle::Row;
use percent_encoding::percent_decode_str;
use std::sync::Arc;

use crate::engine::{Credentials, DatabaseEngine, Record, POOL_MAX_SIZE, POOL_RECYCLE};
use crate::error::{DbQueryError, Result};
use crate::normalize;
use crate::target::ConnectionTarget;
use crate::validation::SelectStatement;

/// Oracle database engine implementation
pub struct OracleEngine {
    pool: Arc<Pool>,
}

/// Username, password and Easy Connect string recovered from a connection target
#[derive(Debug, PartialEq, Eq)]
struct EasyConnect {
    username: String,
    password: String,
    connect_string: String,
}

impl DatabaseEngine for OracleEngine {
    type Query = SelectStatement;

    async fn open(credentials: &Credentials) -> Result<Self> {
        let target = ConnectionTarget::relational(credentials)?;
        let EasyConnect { username, password, connect_string } = easy_connect(&target)?;

        let pool = tokio::task::spawn_blocking(move || {
            PoolBuilder::new(username, password, connect_string)
                .max_connections(POOL_MAX_SIZE)
                .max_lifetime_connection(POOL_RECYCLE)
                .and_then(|builder| builder.build())
        })
        .await
        .map_err(|e| DbQueryError::connection(format!("Oracle pool worker failed: {e}")))?
        .map_err(|e| DbQueryError::connection(format!("Failed to create Oracle pool: {e}")))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    async fn run(&self, statement: &SelectStatement) -> Result<Vec<Record>> {
        let pool = Arc::clone(&self.pool);
        let sql = statement.as_str().to_string();

        tokio::task::spawn_blocking(move || execute_blocking(&pool, &sql))
            .await
            .map_err(|e| DbQueryError::execution(format!("Oracle query worker failed: {e}")))?
    }

    async fn close(self) {
        let pool = self.pool;
        let closed = tokio::task::spawn_blocking(move || match Arc::try_unwrap(pool) {
            Ok(pool) => pool.close(&oracle::pool::CloseMode::Default),
            Err(_) => Ok(()),
        })
        .await;
        if let Ok(Err(e)) = closed {
            tracing::warn!(error = %e, "Oracle pool did not close cleanly");
        }
    }
}

fn execute_blocking(pool: &Pool, sql: &str) -> Result<Vec<Record>> {
    let conn = pool
        .get()
        .map_err(|e| DbQueryError::connection(format!("Failed to connect to Oracle: {e}")))?;

    let rows = conn
        .query(sql, &[])
        .map_err(|e| DbQueryError::execution(format!("Failed to execute query: {e}")))?;

    let columns: Vec<(String, OracleType)> = rows
        .column_info()
        .iter()
        .map(|info| (info.name().to_string(), info.oracle_type().clone()))
        .collect();

    let mut records = Vec::new();
    for row in rows {
        let row = row.map_err(|e| DbQueryError::execution(format!("Failed to fetch row: {e}")))?;
        let mut record = Record::new();
        for (idx, (name, oracle_type)) in columns.iter().enumerate() {
            record.insert(name.clone(), oracle_value_to_json(&row, idx, oracle_type)?);
        }
        records.push(record);
    }

    Ok(records)
}

fn get<T: oracle::sql_type::FromSql>(row: &Row, idx: usize) -> Result<T> {
    row.get(idx)
        .map_err(|e| DbQueryError::execution(format!("Failed to read column {idx}: {e}")))
}

/// Convert Oracle value to JSON value
fn oracle_value_to_json(row: &Row, idx: usize, oracle_type: &OracleType) -> Result<serde_json::Value> {
    let is_null = row
        .sql_values()
        .get(idx)
        .map_or(Ok(true), oracle::SqlValue::is_null)
        .map_err(|e| DbQueryError::execution(format!("Failed to read column {idx}: {e}")))?;
    if is_null {
        return Ok(serde_json::Value::Null);
    }

    let value = match oracle_type {
        OracleType::Number(_, _) => number_value(&get::<String>(row, idx)?),
        OracleType::Int64 => get::<i64>(row, idx)?.into(),
        OracleType::BinaryFloat | OracleType::BinaryDouble | OracleType::Float(_) => {
            normalize::float(get(row, idx)?)
        }

        OracleType::Date | OracleType::Timestamp(_) => normalize::datetime(&get(row, idx)?),
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => {
            normalize::utc_datetime(&get(row, idx)?)
        }

        OracleType::Raw(_) | OracleType::BLOB => normalize::bytes(&get::<Vec<u8>>(row, idx)?),

        OracleType::Boolean => serde_json::Value::Bool(get(row, idx)?),

        _ => serde_json::Value::String(get(row, idx)?),
    };

    Ok(value)
}

/// Oracle NUMBER text to the narrowest JSON number that holds it exactly
fn number_value(text: &str) -> serde_json::Value {
    if let Ok(int) = text.parse::<i64>() {
        return int.into();
    }
    match text.parse::<f64>() {
        Ok(float) if float.is_finite() && float.to_string() == text => normalize::float(float),
        _ => serde_json::Value::String(text.to_string()),
    }
}

/// Split an `oracle://` target into driver arguments
fn easy_connect(target: &ConnectionTarget) -> Result<EasyConnect> {
    let url = url::Url::parse(target.as_str()).map_err(|e| {
        DbQueryError::configuration(format!("Invalid Oracle connection target {target}: {e}"))
    })?;

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DbQueryError::configuration("Oracle connection target has no host"))?;

    let mut connect_string = format!("//{}", decode(host)?);
    if let Some(port) = url.port() {
        connect_string.push_str(&format!(":{port}"));
    }
    connect_string.push('/');
    connect_string.push_str(&decode(url.path().trim_start_matches('/'))?);
    if let Some(query) = url.query() {
        connect_string.push('?');
        connect_string.push_str(query);
    }

    Ok(EasyConnect {
        username: decode(url.username())?,
        password: decode(url.password().unwrap_or_default())?,
        connect_string,
    })
}

fn decode(component: &str) -> Result<String> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|text| text.into_owned())
        .map_err(|e| DbQueryError::configuration(format!("Connection target is not valid UTF-8: {e}")))
}
