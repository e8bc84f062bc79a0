//! MySQL Database Engine Implementation
//!
//! Implements [`DatabaseEngine`] for MySQL (and MariaDB) on top of a
//! `mysql_async` connection pool.
//!
//! # Implementation Notes
//! - The pool is configured from the `mysql://` connection target
//! - Queries run over the binary protocol so DATE and DATETIME arrive typed
//! - Zero dates (`0000-00-00`) are formatted textually instead of failing
//! - DECIMAL, ENUM, SET and JSON arrive as text and stay text
//! - BLOB data that is not UTF-8 is Base64-encoded

use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, Value};

use crate::engine::{Credentials, DatabaseEngine, Record, POOL_MAX_SIZE, POOL_RECYCLE};
use crate::error::{DbQueryError, Result};
use crate::normalize;
use crate::target::ConnectionTarget;
use crate::validation::SelectStatement;

/// MySQL database engine implementation
pub struct MySqlEngine {
    pool: Pool,
}

impl DatabaseEngine for MySqlEngine {
    type Query = SelectStatement;

    async fn open(credentials: &Credentials) -> Result<Self> {
        let target = ConnectionTarget::relational(credentials)?;
        let opts = Opts::from_url(target.as_str()).map_err(|e| {
            DbQueryError::connection(format!("Invalid MySQL connection target {target}: {e}"))
        })?;

        let constraints = PoolConstraints::new(0, POOL_MAX_SIZE as usize)
            .ok_or_else(|| DbQueryError::configuration("Invalid MySQL pool size"))?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_abs_conn_ttl(Some(POOL_RECYCLE));

        let pool = Pool::new(OptsBuilder::from_opts(opts).pool_opts(pool_opts));
        Ok(Self { pool })
    }

    async fn run(&self, statement: &SelectStatement) -> Result<Vec<Record>> {
        let mut conn = self.pool.get_conn().await.map_err(|e| {
            DbQueryError::connection(format!("Failed to connect to MySQL: {e}"))
        })?;

        let rows: Vec<Row> = conn
            .exec(statement.as_str(), ())
            .await
            .map_err(|e| DbQueryError::execution(format!("Failed to execute query: {e}")))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn close(self) {
        if let Err(e) = self.pool.disconnect().await {
            tracing::warn!(error = %e, "MySQL pool did not disconnect cleanly");
        }
    }
}

/// Convert a MySQL row to a record, keeping column order
fn row_to_record(row: &Row) -> Result<Record> {
    let mut record = Record::new();

    for (idx, column) in row.columns_ref().iter().enumerate() {
        let value = row.as_ref(idx).ok_or_else(|| {
            DbQueryError::execution(format!("Failed to get value at index {idx}"))
        })?;
        record.insert(column.name_str().to_string(), mysql_value_to_json(value, column.column_type()));
    }

    Ok(record)
}

/// Convert a binary-protocol value; `column_type` separates DATE from DATETIME
fn mysql_value_to_json(value: &Value, column_type: ColumnType) -> serde_json::Value {
    match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => normalize::bytes(bytes),

        Value::Int(i) => serde_json::Value::from(*i),

        Value::UInt(u) => serde_json::Value::from(*u),

        Value::Float(f) => normalize::float(f64::from(*f)),

        Value::Double(d) => normalize::float(*d),

        Value::Date(year, month, day, hour, minute, second, _micro) => {
            let text = if is_date_only(column_type) {
                format!("{year:04}-{month:02}-{day:02}")
            } else {
                format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
            };
            serde_json::Value::String(text)
        }

        // TIME is a duration in MySQL and may exceed 24 hours
        Value::Time(is_negative, days, hours, minutes, seconds, _micro) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}"))
        }
    }
}

const fn is_date_only(column_type: ColumnType) -> bool {
    matches!(column_type, ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE)
}
