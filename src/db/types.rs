//! Query result types for birdeval.
//!
//! Defines the structures used to represent fetched result sets. Every backend
//! decodes into the same `Value` so result sets from different drivers can be
//! compared with one comparator.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Represents the fully fetched result of one SQL statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Rows of data.
    pub rows: Vec<Row>,

    /// Time taken to execute and fetch.
    pub execution_time: Duration,
}

impl QueryResult {
    /// Creates a query result from fetched rows.
    pub fn new(rows: Vec<Row>, execution_time: Duration) -> Self {
        Self {
            rows,
            execution_time,
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Exact numeric (NUMERIC / DECIMAL columns).
    Decimal(Decimal),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

/// How a textual wire value should be interpreted.
///
/// MySQL's text protocol and PostgreSQL's simple-query protocol deliver every
/// cell as text; the column type decides how that text is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Decimal,
    Text,
    Bytes,
}

impl Value {
    /// Decodes a text-format wire value according to its column kind.
    ///
    /// Values that do not parse as their declared kind are kept as text so
    /// nothing is silently turned into NULL.
    pub fn from_text(text: &str, kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => match text {
                "t" | "true" | "TRUE" | "1" => Value::Bool(true),
                "f" | "false" | "FALSE" | "0" => Value::Bool(false),
                other => Value::String(other.to_string()),
            },
            ValueKind::Int => text
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(text.to_string())),
            ValueKind::Float => text
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::String(text.to_string())),
            ValueKind::Decimal => Decimal::from_str(text)
                .map(Value::Decimal)
                .unwrap_or_else(|_| Value::String(text.to_string())),
            ValueKind::Bytes => Value::Bytes(text.as_bytes().to_vec()),
            ValueKind::Text => Value::String(text.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
