//! Query Validation
//!
//! dbquery is read-only. Nothing reaches a driver until it passes this gate.
//!
//! # Relational families
//! The query is parsed with the family's SQL dialect and must be exactly one
//! statement, and that statement must be a `SELECT` (set operations and CTEs are
//! allowed as long as every branch is a `SELECT`). `SELECT ... INTO` is rejected.
//!
//! Dialect syntax the parser does not know (index hints, Oracle `(+)` joins and
//! `q'[...]'` literals) falls back to a token-level check; see [`lexical`].
//!
//! # Percent signs
//! Statements are executed without bound parameters and no driver performs
//! format-style substitution, so the text reaches the server exactly as the
//! caller wrote it. A literal `%` needs no escaping.
//!
//! # Document store
//! The query is a JSON object naming a collection; see [`DocumentQuery`].

mod document;
mod lexical;

pub use document::DocumentQuery;

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use lexical::Shape;

use crate::engine::Family;
use crate::error::{DbQueryError, Result};

/// A query that passed validation for one family
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedQuery {
    Select(SelectStatement),
    Document(DocumentQuery),
}

impl ValidatedQuery {
    #[must_use]
    pub const fn family(&self) -> Family {
        match self {
            Self::Select(statement) => statement.family(),
            Self::Document(_) => Family::MongoDb,
        }
    }
}

/// A single read-only SQL statement, kept as the caller wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    family: Family,
    sql: String,
}

impl SelectStatement {
    #[must_use]
    pub const fn family(&self) -> Family {
        self.family
    }

    /// Statement text, also the exact text handed to the driver
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

/// Validate `query` for `family`
pub fn validate(query: &str, family: Family) -> Result<ValidatedQuery> {
    match family {
        Family::MySql | Family::Postgres | Family::Oracle => {
            validate_sql(query, family).map(ValidatedQuery::Select)
        }
        Family::MongoDb => DocumentQuery::parse(query).map(ValidatedQuery::Document),
    }
}

/// Validate a relational query
pub fn validate_sql(sql: &str, family: Family) -> Result<SelectStatement> {
    let dialect: Box<dyn Dialect> = match family {
        Family::MySql => Box::new(MySqlDialect {}),
        Family::Postgres => Box::new(PostgreSqlDialect {}),
        Family::Oracle => Box::new(GenericDialect {}),
        Family::MongoDb => {
            return Err(DbQueryError::configuration(
                "mongodb queries are JSON documents, not SQL",
            ))
        }
    };

    let shape = match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => parsed_shape(&statements),
        Err(parse_error) => {
            tracing::debug!(%family, error = %parse_error, "parser rejected query, checking tokens");
            lexical::classify(dialect.as_ref(), sql, family == Family::Oracle).map_err(|_| {
                DbQueryError::validation(format!("query could not be parsed: {parse_error}"))
            })?
        }
    };

    match shape {
        Shape::Select => Ok(SelectStatement {
            family,
            sql: sql.to_string(),
        }),
        Shape::Other => Err(DbQueryError::validation("query must be a SELECT statement")),
        Shape::Statements(count) => Err(DbQueryError::validation(format!(
            "query must be a single statement (found {count})"
        ))),
    }
}

fn parsed_shape(statements: &[Statement]) -> Shape {
    match statements {
        [Statement::Query(query)] if is_select_query(query) => Shape::Select,
        [_] => Shape::Other,
        _ => Shape::Statements(statements.len()),
    }
}

fn is_select_query(query: &Query) -> bool {
    let ctes_read_only = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| is_select_query(&cte.query)));
    ctes_read_only && is_select_body(&query.body)
}

fn is_select_body(body: &SetExpr) -> bool {
    match body {
        // SELECT ... INTO creates a table
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(inner) => is_select_query(inner),
        SetExpr::SetOperation { left, right, .. } => is_select_body(left) && is_select_body(right),
        _ => false,
    }
}
