//! Validation Gate Tests
//!
//! Nothing reaches a driver unless it is a single SELECT (relational) or a JSON
//! object naming a collection (MongoDB). These tests run without a database.

use dbquery::validation::validate_sql;
use dbquery::{validate, DbQueryError, DocumentQuery, Family, ValidatedQuery};

const RELATIONAL: [Family; 3] = [Family::MySql, Family::Postgres, Family::Oracle];

#[test]
fn test_two_statements_are_rejected() {
    for family in RELATIONAL {
        let err = validate("SELECT 1; SELECT 2", family).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(err.message().contains("single statement"), "{family}: {err}");
    }
}

#[test]
fn test_update_is_rejected() {
    for family in RELATIONAL {
        let err = validate("UPDATE t SET x=1", family).unwrap_err();
        assert!(matches!(err, DbQueryError::Validation(_)));
        assert!(err.message().contains("SELECT"), "{family}: {err}");
    }
}

#[test]
fn test_write_hidden_after_select_is_rejected() {
    let err = validate("SELECT 1; DROP TABLE users", Family::MySql).unwrap_err();
    assert!(err.message().contains("single statement"));
}

#[test]
fn test_comments_do_not_hide_statements() {
    assert!(validate("SELECT 1 -- trailing comment", Family::Postgres).is_ok());
    assert!(validate("/* leading */ SELECT 1", Family::MySql).is_ok());
    assert!(validate("SELECT 1 /* ; DELETE FROM t */", Family::Postgres).is_ok());
}

#[test]
fn test_realistic_selects_pass() {
    let queries = [
        "SELECT u.id, COUNT(o.id) AS orders FROM users u LEFT JOIN orders o ON o.user_id = u.id GROUP BY u.id",
        "SELECT * FROM products WHERE name LIKE 'phone%' ORDER BY price DESC LIMIT 10",
        "SELECT id FROM a UNION ALL SELECT id FROM b",
    ];
    for sql in queries {
        assert!(matches!(validate(sql, Family::MySql), Ok(ValidatedQuery::Select(_))), "{sql}");
    }
}

#[test]
fn test_percent_signs_reach_the_driver_unchanged() {
    let queries = [
        "SELECT 10 % 3 AS m",
        "SELECT '100%' AS s",
        "SELECT * FROM t WHERE a LIKE '%x%'",
        "SELECT * FROM t WHERE code = 'a%b'",
    ];
    for family in RELATIONAL {
        for sql in queries {
            let statement = validate_sql(sql, family).unwrap();
            assert_eq!(statement.as_str(), sql, "{family}");
        }
    }
}

#[test]
fn test_dialect_specific_selects_pass() {
    let queries = [
        (Family::Oracle, "SELECT q'[it's]' AS quoted FROM dual"),
        (Family::Oracle, "SELECT e.ename FROM emp e, dept d WHERE e.deptno = d.deptno(+)"),
        (Family::MySql, "SELECT * FROM t USE INDEX (i)"),
    ];
    for (family, sql) in queries {
        assert!(matches!(validate(sql, family), Ok(ValidatedQuery::Select(_))), "{family}: {sql}");
    }
}

#[test]
fn test_dialect_fallback_keeps_single_select_rule() {
    let err = validate("SELECT * FROM t USE INDEX (i); DROP TABLE t", Family::MySql).unwrap_err();
    assert!(err.message().contains("single statement"), "{err}");

    let err = validate("DELETE FROM emp e WHERE e.deptno = d.deptno(+)", Family::Oracle).unwrap_err();
    assert!(err.message().contains("SELECT"), "{err}");
}

#[test]
fn test_document_query_without_collection() {
    let err = validate(r#"{"query":{}}"#, Family::MongoDb).unwrap_err();
    assert!(matches!(err, DbQueryError::Validation(_)));
    assert!(err.message().contains("collection"));
}

#[test]
fn test_document_query_malformed_json() {
    let err = validate("{'collection': 'c'}", Family::MongoDb).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_JSON");
    assert!(err.message().starts_with("Invalid JSON query:"));
}

#[test]
fn test_limit_zero_means_no_limit() {
    // Zero and absent are indistinguishable: both mean "no limit"
    let zero = DocumentQuery::parse(r#"{"collection":"c","limit":0}"#).unwrap();
    let absent = DocumentQuery::parse(r#"{"collection":"c"}"#).unwrap();
    assert_eq!(zero.effective_limit(), None);
    assert_eq!(zero.effective_limit(), absent.effective_limit());

    let positive = DocumentQuery::parse(r#"{"collection":"c","limit":5}"#).unwrap();
    assert_eq!(positive.effective_limit(), Some(5));
}

#[test]
fn test_sql_is_not_a_document_query() {
    let err = validate("SELECT 1", Family::MongoDb).unwrap_err();
    assert!(matches!(err, DbQueryError::InvalidJson(_)));
}
