//! `PostgreSQL` Database Engine Implementation
//!
//! Implements [`DatabaseEngine`] for `PostgreSQL` with `tokio-postgres` clients held
//! in a `bb8` pool.
//!
//! # Implementation Notes
//! - The client config is parsed from the `postgresql://` connection target
//! - Connections are plain TCP (`NoTls`)
//! - NUMERIC is decoded from the wire format into exact decimal text
//! - JSON/JSONB is flattened to compact JSON text
//! - BYTEA that is not UTF-8 is Base64-encoded
//! - Results arrive in binary format, so every type is decoded explicitly:
//!   arrays become JSON text, INTERVAL/INET/CIDR/MACADDR/TIMETZ/MONEY are decoded
//!   from their wire layout into the server's text form
//! - Enums and citext are sent as their text; any other unmapped type is an
//!   execution error naming the type

use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use std::str::FromStr;
use chrono::NaiveTime;
use serde_json::Value;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Config, NoTls, Row};

use crate::engine::{Credentials, DatabaseEngine, Record, POOL_MAX_SIZE, POOL_RECYCLE};
use crate::error::{DbQueryError, Result};
use crate::normalize;
use crate::target::ConnectionTarget;
use crate::validation::SelectStatement;

/// `PostgreSQL` database engine implementation
pub struct PostgresEngine {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl DatabaseEngine for PostgresEngine {
    type Query = SelectStatement;

    async fn open(credentials: &Credentials) -> Result<Self> {
        let target = ConnectionTarget::relational(credentials)?;
        let config = Config::from_str(target.as_str()).map_err(|e| {
            DbQueryError::connection(format!("Invalid PostgreSQL connection target {target}: {e}"))
        })?;

        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(POOL_MAX_SIZE)
            .max_lifetime(Some(POOL_RECYCLE))
            .build(manager)
            .await
            .map_err(|e| DbQueryError::connection(format!("Failed to create PostgreSQL pool: {e}")))?;

        Ok(Self { pool })
    }

    async fn run(&self, statement: &SelectStatement) -> Result<Vec<Record>> {
        let client = self.pool.get().await.map_err(|e| {
            DbQueryError::connection(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        let rows = client
            .query(statement.as_str(), &[])
            .await
            .map_err(|e| DbQueryError::execution(format!("Failed to execute query: {e}")))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn close(self) {
        // bb8 closes idle connections when the last pool handle drops
        drop(self.pool);
    }
}

/// Undecoded column bytes; accepts every type
struct RawValue<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Convert a `PostgreSQL` row to a record, keeping column order
fn row_to_record(row: &Row) -> Result<Record> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), postgres_value_to_json(row, idx)?);
    }
    Ok(record)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<T> {
    row.try_get(idx).map_err(|e| {
        DbQueryError::execution(format!(
            "Failed to read column '{}': {e}",
            row.columns()[idx].name()
        ))
    })
}

/// Convert `PostgreSQL` value to JSON value
fn postgres_value_to_json(row: &Row, idx: usize) -> Result<Value> {
    let Some(raw) = get::<Option<RawValue<'_>>>(row, idx)? else {
        return Ok(Value::Null);
    };
    let column = &row.columns()[idx];
    decode(column.type_(), raw.0).map_err(|e| {
        DbQueryError::execution(format!("Failed to read column '{}': {e}", column.name()))
    })
}

fn from<'a, T: FromSql<'a>>(ty: &Type, raw: &'a [u8]) -> std::result::Result<T, String> {
    T::from_sql(ty, raw).map_err(|e| e.to_string())
}

/// Decode one non-null value from its binary wire form
fn decode(ty: &Type, raw: &[u8]) -> std::result::Result<Value, String> {
    let value = match *ty {
        Type::BOOL => Value::Bool(from(ty, raw)?),

        Type::CHAR => from::<i8>(ty, raw)?.into(),
        Type::INT2 => from::<i16>(ty, raw)?.into(),
        Type::INT4 => from::<i32>(ty, raw)?.into(),
        Type::INT8 => from::<i64>(ty, raw)?.into(),
        Type::OID => from::<u32>(ty, raw)?.into(),

        Type::FLOAT4 => normalize::float(f64::from(from::<f32>(ty, raw)?)),
        Type::FLOAT8 => normalize::float(from(ty, raw)?),

        Type::NUMERIC => Value::String(numeric_text(raw).ok_or("malformed NUMERIC value")?),
        Type::MONEY => Value::String(money_text(from(ty, raw)?)),

        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME | Type::UNKNOWN | Type::XML => {
            Value::String(from(ty, raw)?)
        }

        Type::JSON | Type::JSONB => normalize::nested(from(ty, raw)?),

        Type::BYTEA => normalize::bytes(from(ty, raw)?),

        Type::TIMESTAMP => normalize::datetime(&from(ty, raw)?),
        Type::TIMESTAMPTZ => normalize::utc_datetime(&from(ty, raw)?),
        Type::DATE => normalize::date(&from(ty, raw)?),
        Type::TIME => normalize::time(&from(ty, raw)?),
        Type::TIMETZ => normalize::time(&timetz_utc(raw).ok_or("malformed TIMETZ value")?),
        Type::INTERVAL => Value::String(interval_text(raw).ok_or("malformed INTERVAL value")?),

        Type::UUID => normalize::uuid(&from(ty, raw)?),

        Type::INET | Type::CIDR => Value::String(inet_text(raw).ok_or("malformed INET value")?),
        Type::MACADDR => Value::String(macaddr_text(raw).ok_or("malformed MACADDR value")?),

        _ => match ty.kind() {
            Kind::Array(member) => {
                let elements: Vec<Option<RawValue<'_>>> = from(ty, raw)?;
                let values = elements
                    .into_iter()
                    .map(|element| element.map_or(Ok(Value::Null), |element| decode(member, element.0)))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                normalize::nested(Value::Array(values))
            }
            // Enum labels and citext are sent as plain text
            Kind::Enum(_) => Value::String(from(&Type::TEXT, raw)?),
            _ if ty.name() == "citext" => Value::String(from(&Type::TEXT, raw)?),
            _ => return Err(format!("unsupported column type {}", ty.name())),
        },
    };

    Ok(value)
}

/// MONEY is a 64-bit count of cents; rendered with two decimals, no currency sign
fn money_text(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// INTERVAL layout: microseconds (i64), days (i32), months (i32)
///
/// Rendered like the server's default `postgres` style, e.g.
/// `1 year 2 mons 3 days 04:05:06.5`.
fn interval_text(raw: &[u8]) -> Option<String> {
    let micros = i64::from_be_bytes(raw.get(0..8)?.try_into().ok()?);
    let days = i32::from_be_bytes(raw.get(8..12)?.try_into().ok()?);
    let months = i32::from_be_bytes(raw.get(12..16)?.try_into().ok()?);

    let unit = |value: i32, name: &str| {
        let plural = if value == 1 { "" } else { "s" };
        format!("{value} {name}{plural}")
    };

    let mut parts = Vec::new();
    if months / 12 != 0 {
        parts.push(unit(months / 12, "year"));
    }
    if months % 12 != 0 {
        parts.push(unit(months % 12, "mon"));
    }
    if days != 0 {
        parts.push(unit(days, "day"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let seconds = abs / 1_000_000;
        let mut clock = format!("{sign}{:02}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60);
        let fraction = abs % 1_000_000;
        if fraction != 0 {
            clock.push_str(format!(".{fraction:06}").trim_end_matches('0'));
        }
        parts.push(clock);
    }

    Some(parts.join(" "))
}

/// TIMETZ layout: microseconds since midnight (i64), zone offset in seconds west
/// of UTC (i32). Shifted to UTC like every other zoned value.
fn timetz_utc(raw: &[u8]) -> Option<NaiveTime> {
    const DAY_MICROS: i64 = 86_400_000_000;
    let micros = i64::from_be_bytes(raw.get(0..8)?.try_into().ok()?);
    let zone = i32::from_be_bytes(raw.get(8..12)?.try_into().ok()?);

    let utc = (micros + i64::from(zone) * 1_000_000).rem_euclid(DAY_MICROS);
    NaiveTime::from_num_seconds_from_midnight_opt(
        u32::try_from(utc / 1_000_000).ok()?,
        u32::try_from(utc % 1_000_000 * 1000).ok()?,
    )
}

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// INET/CIDR layout: family, netmask bits, is_cidr, address length, address
///
/// The `/bits` suffix is shown for CIDR values and for INET values that are not
/// a single host, matching the server's text output.
fn inet_text(raw: &[u8]) -> Option<String> {
    let [family, bits, is_cidr, len, address @ ..] = raw else {
        return None;
    };
    let (text, host_bits) = match (*family, *len, address.len()) {
        (PGSQL_AF_INET, 4, 4) => (Ipv4Addr::new(address[0], address[1], address[2], address[3]).to_string(), 32),
        (PGSQL_AF_INET6, 16, 16) => {
            let octets: [u8; 16] = address.try_into().ok()?;
            (Ipv6Addr::from(octets).to_string(), 128)
        }
        _ => return None,
    };

    if *is_cidr != 0 || *bits != host_bits {
        Some(format!("{text}/{bits}"))
    } else {
        Some(text)
    }
}

fn macaddr_text(raw: &[u8]) -> Option<String> {
    if raw.len() != 6 {
        return None;
    }
    Some(raw.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":"))
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decode NUMERIC's binary form into decimal text
///
/// Layout: ndigits, weight, sign, dscale (all 16-bit), then `ndigits` base-10000
/// digits. `weight` is the power of 10000 of the first digit.
fn numeric_text(raw: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<u16> {
        Some(u16::from_be_bytes([*raw.get(i)?, *raw.get(i + 1)?]))
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits).map(|i| word(8 + i * 2)).collect::<Option<Vec<u16>>>()?;
    let digit = |index: i32| -> u16 {
        usize::try_from(index).ok().and_then(|i| digits.get(i).copied()).unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for index in 1..=weight {
            text.push_str(&format!("{:04}", digit(index)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        for k in 1..=dscale.div_ceil(4) {
            fraction.push_str(&format!("{:04}", digit(weight + k as i32)));
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Some(text)
}
