//! `MongoDB` Engine Implementation
//!
//! Implements [`DatabaseEngine`] for `MongoDB` with the official async driver.
//!
//! # Implementation Notes
//! - The client is configured from the `mongodb://` connection target; the
//!   database is chosen per query (credentials' database, else the URI default)
//! - Filter, projection and sort are converted from JSON with extended-JSON
//!   rules, so `{"$oid": ...}` and `{"$date": ...}` work in filters
//! - `_id` is always rendered as a string
//! - Nested documents and arrays are flattened to JSON text

use futures::TryStreamExt;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{Bson, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::Client;
use serde_json::{Map, Value};

use crate::engine::{Credentials, DatabaseEngine, Record, POOL_MAX_SIZE, POOL_RECYCLE};
use crate::error::{DbQueryError, Result};
use crate::normalize;
use crate::target::ConnectionTarget;
use crate::validation::DocumentQuery;

/// `MongoDB` engine implementation
pub struct MongoEngine {
    client: Client,
    database: Option<String>,
}

impl DatabaseEngine for MongoEngine {
    type Query = DocumentQuery;

    async fn open(credentials: &Credentials) -> Result<Self> {
        let target = ConnectionTarget::document(credentials)?;
        let mut options = ClientOptions::parse(target.as_str()).await.map_err(|e| {
            DbQueryError::connection(format!("Invalid MongoDB connection target {target}: {e}"))
        })?;
        options.max_pool_size = Some(POOL_MAX_SIZE);
        options.max_idle_time = Some(POOL_RECYCLE);

        let client = Client::with_options(options)
            .map_err(|e| DbQueryError::connection(format!("Failed to create MongoDB client: {e}")))?;

        Ok(Self {
            client,
            database: credentials.database().map(str::to_string),
        })
    }

    async fn run(&self, query: &DocumentQuery) -> Result<Vec<Record>> {
        let database = match &self.database {
            Some(name) => self.client.database(name),
            None => self.client.default_database().ok_or_else(|| {
                DbQueryError::execution("no default database: give a database name or set one in the connection target")
            })?,
        };
        let collection = database.collection::<Document>(&query.collection);

        let find = collection
            .find(to_document(&query.filter, "query")?)
            .with_options(find_options(query)?);

        let cursor = find
            .await
            .map_err(|e| DbQueryError::execution(format!("Failed to execute find: {e}")))?;
        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| DbQueryError::execution(format!("Failed to read documents: {e}")))?;

        Ok(documents.into_iter().map(document_to_record).collect())
    }

    async fn close(self) {
        self.client.shutdown().await;
    }
}

/// Projection, limit, skip and sort for a `find`
///
/// Limit and skip are set only when positive and sort only when non-empty, so a
/// `limit` of 0 never reaches the server.
fn find_options(query: &DocumentQuery) -> Result<FindOptions> {
    let mut options = FindOptions::default();
    options.projection = query
        .projection
        .as_ref()
        .map(|projection| to_document(projection, "projection"))
        .transpose()?;
    options.limit = query.effective_limit();
    options.skip = query.effective_skip();
    options.sort = query.effective_sort().map(|sort| to_document(sort, "sort")).transpose()?;
    Ok(options)
}

/// JSON object to BSON document, honoring extended JSON
fn to_document(object: &Map<String, Value>, field: &str) -> Result<Document> {
    match Bson::try_from(Value::Object(object.clone())) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(_) => Err(DbQueryError::validation(format!("'{field}' must be a document"))),
        Err(e) => Err(DbQueryError::validation(format!("'{field}' is not valid extended JSON: {e}"))),
    }
}

fn document_to_record(document: Document) -> Record {
    document
        .into_iter()
        .map(|(key, value)| {
            let value = if key == "_id" { id_to_json(value) } else { bson_to_json(value) };
            (key, value)
        })
        .collect()
}

/// `_id` in string form whatever its BSON type
fn id_to_json(id: Bson) -> Value {
    match id {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => match bson_to_json(other) {
            Value::Null => Value::Null,
            Value::String(text) => Value::String(text),
            scalar => Value::String(scalar.to_string()),
        },
    }
}

/// Top-level field: nested structures become JSON text
fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Document(_) | Bson::Array(_) => normalize::nested(nested_to_json(value)),
        scalar => nested_to_json(scalar),
    }
}

/// Recursive conversion with every scalar normalized
fn nested_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => i.into(),
        Bson::Int64(i) => i.into(),
        Bson::Double(f) => normalize::float(f),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
            .map_or(Value::Null, |utc| normalize::utc_datetime(&utc)),
        Bson::Timestamp(ts) => chrono::DateTime::from_timestamp(i64::from(ts.time), 0)
            .map_or(Value::Null, |utc| normalize::utc_datetime(&utc)),
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::Binary(binary) => match binary.subtype {
            BinarySubtype::Uuid => uuid::Uuid::from_slice(&binary.bytes)
                .map_or_else(|_| normalize::bytes(&binary.bytes), |id| normalize::uuid(&id)),
            _ => normalize::bytes(&binary.bytes),
        },
        Bson::Document(document) => Value::Object(
            document.into_iter().map(|(k, v)| (k, nested_to_json(v))).collect(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(nested_to_json).collect()),
        other => Value::String(other.into_relaxed_extjson().to_string()),
    }
}
