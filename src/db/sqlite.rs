//! SQLite database client implementation.
//!
//! Opens each benchmark database file read-only over a single sqlx
//! connection. Values are decoded by their runtime storage class, which is
//! what SQLite actually returns regardless of the declared column type.

use crate::db::{collect_single_statement, DatabaseClient, QueryResult, Row, Value};
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row as SqlxRow, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// SQLite database client owning one connection.
#[derive(Debug)]
pub struct SqliteClient {
    conn: Option<SqliteConnection>,
    path: PathBuf,
}

impl SqliteClient {
    /// Opens `path` read-only. A missing file is a connection error; it is
    /// never created.
    pub async fn connect(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(EvalError::connection(format!(
                "SQLite database not found: {}",
                path.display()
            )));
        }

        let conn = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false)
            .connect()
            .await
            .map_err(|e| {
                EvalError::connection(format!("Cannot open {}: {e}", path.display()))
            })?;

        debug!("Opened SQLite database {}", path.display());
        Ok(Self {
            conn: Some(conn),
            path: path.to_path_buf(),
        })
    }

    /// Wraps an already open connection.
    ///
    /// This is primarily useful for testing against `sqlite::memory:`.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn: Some(conn),
            path: PathBuf::from(":memory:"),
        }
    }

    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| EvalError::connection("Connection already closed"))
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let stream = sqlx::Executor::fetch_many(self.conn()?, sqlx::raw_sql(sql));
        let rows: Vec<SqliteRow> =
            collect_single_statement(stream, |e| EvalError::query(format_query_error(e))).await?;

        Ok(QueryResult::new(
            rows.iter().map(convert_row).collect(),
            start.elapsed(),
        ))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(|e| {
                EvalError::connection(format!("Failed to close {}: {e}", self.path.display()))
            })?;
        }
        Ok(())
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

/// Converts one cell by its storage class (INTEGER, REAL, TEXT, BLOB, NULL).
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match storage_class.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "REAL" | "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Formats a query error, keeping only the driver's message for database errors.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
