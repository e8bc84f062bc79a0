//! Document-store query shape

use serde_json::{Map, Value};

use crate::error::{DbQueryError, Result};

/// A parsed `MongoDB` query
///
/// Accepted shape:
///
/// ```json
/// {"collection": "users", "query": {"age": {"$gt": 30}},
///  "projection": {"_id": 0, "name": 1}, "limit": 10, "skip": 0, "sort": {"name": 1}}
/// ```
///
/// Only `collection` is required. `limit` and `skip` are applied only when
/// positive. `sort` may also be given as `[["field", direction], ...]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentQuery {
    pub collection: String,
    pub filter: Map<String, Value>,
    pub projection: Option<Map<String, Value>>,
    pub sort: Option<Map<String, Value>>,
    pub limit: i64,
    pub skip: i64,
}

impl DocumentQuery {
    /// Parse and shape-check query text
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| DbQueryError::invalid_json(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(DbQueryError::validation("document query must be a JSON object"));
        };

        let collection = match object.remove("collection") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            Some(_) => {
                return Err(DbQueryError::validation("'collection' must be a non-empty string"))
            }
            None => return Err(DbQueryError::validation("document query must name a 'collection'")),
        };

        Ok(Self {
            collection,
            filter: object_field(&mut object, "query")?.unwrap_or_default(),
            projection: object_field(&mut object, "projection")?,
            sort: sort_field(&mut object)?,
            limit: integer_field(&mut object, "limit")?,
            skip: integer_field(&mut object, "skip")?,
        })
    }

    /// Limit to apply, if any
    #[must_use]
    pub const fn effective_limit(&self) -> Option<i64> {
        if self.limit > 0 {
            Some(self.limit)
        } else {
            None
        }
    }

    /// Skip to apply, if any
    #[must_use]
    pub const fn effective_skip(&self) -> Option<u64> {
        if self.skip > 0 {
            Some(self.skip as u64)
        } else {
            None
        }
    }

    /// Sort to apply; an empty sort is no sort
    #[must_use]
    pub fn effective_sort(&self) -> Option<&Map<String, Value>> {
        self.sort.as_ref().filter(|sort| !sort.is_empty())
    }
}

fn object_field(object: &mut Map<String, Value>, key: &str) -> Result<Option<Map<String, Value>>> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(DbQueryError::validation(format!("'{key}' must be a JSON object"))),
    }
}

fn integer_field(object: &mut Map<String, Value>, key: &str) -> Result<i64> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| DbQueryError::validation(format!("'{key}' must be an integer"))),
    }
}

fn sort_field(object: &mut Map<String, Value>) -> Result<Option<Map<String, Value>>> {
    match object.remove("sort") {
        Some(Value::Array(pairs)) => {
            let mut sort = Map::new();
            for pair in pairs {
                match pair {
                    Value::Array(items) if items.len() == 2 => {
                        let mut items = items.into_iter();
                        if let (Some(Value::String(field)), Some(direction)) = (items.next(), items.next()) {
                            sort.insert(field, direction);
                            continue;
                        }
                        return Err(sort_pair_error());
                    }
                    _ => return Err(sort_pair_error()),
                }
            }
            Ok(Some(sort))
        }
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(DbQueryError::validation("'sort' must be a JSON object or a list of pairs")),
    }
}

fn sort_pair_error() -> DbQueryError {
    DbQueryError::validation("'sort' pairs must be [\"field\", direction]")
}
