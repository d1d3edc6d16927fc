use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::Document;

/// A list predicate understood by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum Query {
    /// Attribute equals any of the values. For array attributes, any element matches.
    Equal(String, Vec<Value>),
    /// Array attribute contains the value.
    Contains(String, Value),
    /// Case-insensitive substring match on a string attribute.
    Search(String, String),
    OrderAsc(String),
    OrderDesc(String),
    Limit(usize),
    /// Only documents after the given id in the sorted result.
    CursorAfter(String),
}

impl Query {
    pub fn equal(field: &str, value: impl Into<Value>) -> Self {
        Self::Equal(field.to_string(), vec![value.into()])
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Self::Contains(field.to_string(), value.into())
    }

    pub fn search(field: &str, term: &str) -> Self {
        Self::Search(field.to_string(), term.to_string())
    }

    pub fn order_asc(field: &str) -> Self {
        Self::OrderAsc(field.to_string())
    }

    pub fn order_desc(field: &str) -> Self {
        Self::OrderDesc(field.to_string())
    }

    pub fn limit(n: usize) -> Self {
        Self::Limit(n)
    }

    pub fn cursor_after(id: &str) -> Self {
        Self::CursorAfter(id.to_string())
    }

    /// Whether a document passes this predicate. Ordering and paging
    /// predicates always pass.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Equal(field, values) => match doc.field(field) {
                Some(v) => match &*v {
                    Value::Array(items) => items.iter().any(|i| values.contains(i)),
                    other => values.contains(other),
                },
                None => false,
            },
            Self::Contains(field, value) => match doc.field(field) {
                Some(v) => match &*v {
                    Value::Array(items) => items.contains(value),
                    Value::String(s) => value.as_str().is_some_and(|needle| s.contains(needle)),
                    _ => false,
                },
                None => false,
            },
            Self::Search(field, term) => doc
                .field(field)
                .and_then(|v| v.as_str().map(|s| s.to_lowercase()))
                .is_some_and(|s| s.contains(&term.to_lowercase())),
            Self::OrderAsc(_) | Self::OrderDesc(_) | Self::Limit(_) | Self::CursorAfter(_) => true,
        }
    }
}

/// The `CursorAfter` document is not part of the result it should page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cursor document {0} not found")]
pub struct UnknownCursor(pub String);

/// Filter, sort and page `docs` the way the backend evaluates a list call.
/// Documents are expected in insertion order; sorting is stable.
pub fn apply_queries(mut docs: Vec<Document>, queries: &[Query]) -> Result<Vec<Document>, UnknownCursor> {
    docs.retain(|d| queries.iter().all(|q| q.matches(d)));

    for q in queries.iter().rev() {
        match q {
            Query::OrderAsc(field) => docs.sort_by(|a, b| compare_field(a, b, field)),
            Query::OrderDesc(field) => docs.sort_by(|a, b| compare_field(b, a, field)),
            _ => {}
        }
    }

    if let Some(cursor) = queries.iter().find_map(|q| match q {
        Query::CursorAfter(id) => Some(id),
        _ => None,
    }) {
        let pos = docs
            .iter()
            .position(|d| &d.id == cursor)
            .ok_or_else(|| UnknownCursor(cursor.clone()))?;
        docs.drain(..=pos);
    }

    if let Some(limit) = queries.iter().find_map(|q| match q {
        Query::Limit(n) => Some(*n),
        _ => None,
    }) {
        docs.truncate(limit);
    }

    Ok(docs)
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    match field {
        "$createdAt" => a.created_at.cmp(&b.created_at),
        "$updatedAt" => a.updated_at.cmp(&b.updated_at),
        _ => compare_values(
            a.field(field).as_deref(),
            b.field(field).as_deref(),
        ),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
