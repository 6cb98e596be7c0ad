//! MySQL database client implementation.
//!
//! Statements run over the text protocol (no prepared statements), so every
//! cell arrives as text and is decoded by column type.

use crate::config::ConnectionConfig;
use crate::db::{
    collect_single_statement, DatabaseClient, Dialect, QueryResult, Row, Value, ValueKind,
};
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row as SqlxRow, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Socket locations tried when neither a socket nor a host is configured.
const DEFAULT_SOCKETS: &[&str] = &["/var/run/mysqld/mysqld.sock", "/tmp/mysql.sock"];

/// MySQL database client owning one connection.
#[derive(Debug)]
pub struct MySqlClient {
    conn: Option<MySqlConnection>,
}

impl MySqlClient {
    /// Connects using the configured socket, the stock socket locations, or
    /// TCP, in that order.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut last_error = None;

        for socket in socket_candidates(config, |p| p.exists()) {
            let options = connect_options(config, socket.as_deref());
            match options.connect().await {
                Ok(conn) => {
                    debug!("Connected to MySQL {}", describe(config, socket.as_deref()));
                    return Ok(Self { conn: Some(conn) });
                }
                Err(e) => {
                    debug!(
                        "MySQL connection via {} failed: {e}",
                        describe(config, socket.as_deref())
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => EvalError::connection("No MySQL connection candidates"),
        })
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| EvalError::connection("Connection already closed"))
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let stream = sqlx::Executor::fetch_many(self.conn()?, sqlx::raw_sql(sql));
        let rows: Vec<MySqlRow> =
            collect_single_statement(stream, |e| EvalError::query(format_query_error(e))).await?;

        Ok(QueryResult::new(
            rows.iter().map(convert_row).collect(),
            start.elapsed(),
        ))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| EvalError::connection(format!("Failed to close MySQL: {e}")))?;
        }
        Ok(())
    }
}

/// Returns the connection routes to try, in order. `None` means TCP.
///
/// An explicit socket is used alone. An explicit host means TCP only.
/// Otherwise existing stock sockets are tried before TCP.
fn socket_candidates(
    config: &ConnectionConfig,
    exists: impl Fn(&Path) -> bool,
) -> Vec<Option<PathBuf>> {
    if let Some(socket) = &config.socket {
        return vec![Some(socket.clone())];
    }
    if config.host.is_some() {
        return vec![None];
    }

    let mut candidates: Vec<Option<PathBuf>> = DEFAULT_SOCKETS
        .iter()
        .map(Path::new)
        .filter(|p| exists(p))
        .map(|p| Some(p.to_path_buf()))
        .collect();
    candidates.push(None);
    candidates
}

fn connect_options(config: &ConnectionConfig, socket: Option<&Path>) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(config.host_or_default())
        .port(config.port_or_default(Dialect::MySql));

    if let Some(socket) = socket {
        options = options.socket(socket);
    }
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    options
}

fn describe(config: &ConnectionConfig, socket: Option<&Path>) -> String {
    match socket {
        Some(socket) => format!("socket {}", socket.display()),
        None => format!(
            "{}:{}",
            config.host_or_default(),
            config.port_or_default(Dialect::MySql)
        ),
    }
}

/// Converts a sqlx MySqlRow to our Row type.
fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single text-protocol cell to our Value type.
fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    let kind = value_kind(type_name);
    if kind == ValueKind::Bytes {
        return row
            .try_get_unchecked::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null);
    }

    row.try_get_unchecked::<Option<String>, _>(index)
        .ok()
        .flatten()
        .map(|text| Value::from_text(&text, kind))
        .unwrap_or(Value::Null)
}

/// Maps a MySQL column type name to the kind its text is decoded as.
fn value_kind(type_name: &str) -> ValueKind {
    let upper = type_name.to_uppercase();
    let base = upper.trim_end_matches(" UNSIGNED");
    match base {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            ValueKind::Int
        }
        "FLOAT" | "DOUBLE" => ValueKind::Float,
        "DECIMAL" => ValueKind::Decimal,
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT" => {
            ValueKind::Bytes
        }
        _ => ValueKind::Text,
    }
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> EvalError {
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("access denied") {
        EvalError::connection(format!(
            "Access denied for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("unknown database") {
        EvalError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("connection refused") {
        EvalError::connection(format!(
            "Cannot connect to {}:{}. Check that the server is running.",
            config.host_or_default(),
            config.port_or_default(Dialect::MySql)
        ))
    } else {
        EvalError::connection(error.to_string())
    }
}

/// Formats a query error, keeping the server error code when present.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => match db_error.code() {
            Some(code) => format!("ERROR {code}: {}", db_error.message()),
            None => db_error.message().to_string(),
        },
        None => error.to_string(),
    }
}
