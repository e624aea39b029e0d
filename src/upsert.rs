use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::domain::Record;
use crate::error::WranglerError;
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Submission {
    Accepted,
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "message")]
pub enum Rejection {
    Conflict,
    Storage(String),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted)
    }
}

/// Merges one record into `collection`.
///
/// With a declared `key_field` whose value is present and non-empty the record
/// replaces whatever is stored under that key (or is created). Everything else
/// is a plain insertion. Failures never escape: they come back as
/// [`Submission::Rejected`] so a batch can carry on.
pub fn submit<S>(store: &S, record: &Record, collection: &str, key_field: Option<&str>) -> Submission
where
    S: DocumentStore + ?Sized,
{
    let keyed = key_field.filter(|field| record.get(*field).is_some_and(has_value));
    let result = match keyed {
        Some(field) => store.upsert(collection, field, record),
        None => store.insert(collection, key_field, record),
    };
    match result {
        Ok(()) => Submission::Accepted,
        Err(WranglerError::Conflict { .. }) => Submission::Rejected(Rejection::Conflict),
        Err(err) => {
            warn!(collection, error = %err, "document rejected");
            Submission::Rejected(Rejection::Storage(err.to_string()))
        }
    }
}

fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
