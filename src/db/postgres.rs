//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx. Statements go through the simple-query
//! protocol, so results arrive in text format and are decoded by column type.

use crate::config::ConnectionConfig;
use crate::db::{
    collect_single_statement, DatabaseClient, Dialect, QueryResult, Row, Value, ValueKind,
};
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, ConnectOptions, Connection, Row as SqlxRow, TypeInfo, ValueRef};
use std::time::Instant;
use tracing::debug;

/// PostgreSQL database client owning one connection.
#[derive(Debug)]
pub struct PostgresClient {
    conn: Option<PgConnection>,
}

impl PostgresClient {
    /// Opens a connection described by `config`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut options = PgConnectOptions::new()
            .host(config.host_or_default())
            .port(config.port_or_default(Dialect::Postgres));

        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }

        let conn = options
            .connect()
            .await
            .map_err(|e| map_connection_error(e, config))?;

        debug!(
            "Connected to PostgreSQL {}",
            config.display_string(Dialect::Postgres)
        );
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| EvalError::connection("Connection already closed"))
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let stream = sqlx::Executor::fetch_many(self.conn()?, sqlx::raw_sql(sql));
        let rows: Vec<PgRow> =
            collect_single_statement(stream, |e| EvalError::query(format_query_error(e))).await?;

        Ok(QueryResult::new(
            rows.iter().map(convert_row).collect(),
            start.elapsed(),
        ))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(|e| {
                EvalError::connection(format!("Failed to close PostgreSQL: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single text-format column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    row.try_get_unchecked::<Option<String>, _>(index)
        .ok()
        .flatten()
        .map(|text| Value::from_text(&text, value_kind(type_name)))
        .unwrap_or(Value::Null)
}

/// Maps a PostgreSQL type name to the kind its text is decoded as.
fn value_kind(type_name: &str) -> ValueKind {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => ValueKind::Bool,
        "INT2" | "SMALLINT" | "INT4" | "INT" | "INTEGER" | "INT8" | "BIGINT" | "OID" => {
            ValueKind::Int
        }
        "FLOAT4" | "REAL" | "FLOAT8" | "DOUBLE PRECISION" => ValueKind::Float,
        "NUMERIC" | "DECIMAL" => ValueKind::Decimal,
        // BYTEA arrives hex-encoded in text format; compare it as text
        _ => ValueKind::Text,
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> EvalError {
    let host = config.host_or_default();
    let port = config.port_or_default(Dialect::Postgres);
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        EvalError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        EvalError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        EvalError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        EvalError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        EvalError::connection(error.to_string())
    }
}

/// Formats a query error with detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
