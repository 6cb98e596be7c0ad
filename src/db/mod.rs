//! Database abstraction layer for birdeval.
//!
//! Provides a trait-based interface over single, task-owned connections so the
//! execution harness can run against SQLite files, MySQL, PostgreSQL, or the
//! in-memory mock interchangeably.

mod mock;
mod mysql;
mod postgres;
mod sqlite;
mod types;

pub use mock::{MockConnector, MockDatabaseClient, MockResponse};
pub use mysql::MySqlClient;
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{QueryResult, Row, Value, ValueKind};

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::error::EvalError;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use sqlx::Either;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    /// Returns the dialect's canonical name, as used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
        }
    }

    /// Parses a dialect name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mysql" => Some(Self::MySql),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Maps a connection URL scheme to its dialect.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "mysql" => Some(Self::MySql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// URL schemes accepted for this dialect.
    pub fn url_schemes(&self) -> &'static [&'static str] {
        match self {
            Self::Sqlite => &[],
            Self::MySql => &["mysql"],
            Self::Postgres => &["postgres", "postgresql"],
        }
    }

    /// Returns the default TCP port, if this dialect talks to a server.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::MySql => Some(3306),
            Self::Postgres => Some(5432),
        }
    }

    /// Returns true if targets of this dialect are database servers.
    pub fn is_server(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("Unsupported SQL dialect: {s}. Expected: SQLite, MySQL, or PostgreSQL")
        })
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a query pair is executed.
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseTarget {
    /// A SQLite database file.
    Sqlite(PathBuf),
    /// A MySQL server.
    MySql(Arc<ConnectionConfig>),
    /// A PostgreSQL server.
    Postgres(Arc<ConnectionConfig>),
}

impl DatabaseTarget {
    /// Returns the dialect of this target.
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Sqlite(_) => Dialect::Sqlite,
            Self::MySql(_) => Dialect::MySql,
            Self::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Returns a display-safe description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Sqlite(path) => path.display().to_string(),
            Self::MySql(config) => config.display_string(Dialect::MySql),
            Self::Postgres(config) => config.display_string(Dialect::Postgres),
        }
    }
}

/// Returns the SQLite file for a database id: `{root}/{db_id}/{db_id}.sqlite`.
pub fn sqlite_database_path(root: &Path, db_id: &str) -> PathBuf {
    root.join(db_id).join(format!("{db_id}.sqlite"))
}

/// Drains a `fetch_many` stream that must hold exactly one statement.
///
/// Anything after the first statement completes, rows or another completion,
/// is a query error.
pub(crate) async fn collect_single_statement<S, D, R>(
    mut stream: S,
    map_err: impl Fn(sqlx::Error) -> EvalError,
) -> Result<Vec<R>>
where
    S: Stream<Item = std::result::Result<Either<D, R>, sqlx::Error>> + Unpin,
{
    let mut rows = Vec::new();
    let mut finished = false;
    while let Some(item) = stream.try_next().await.map_err(&map_err)? {
        if finished {
            return Err(EvalError::query(
                "You can only execute one statement at a time.",
            ));
        }
        match item {
            Either::Left(_) => finished = true,
            Either::Right(row) => rows.push(row),
        }
    }
    Ok(rows)
}

/// Trait defining the interface for a single database connection.
///
/// A client is owned by exactly one task; dropping it closes the underlying
/// connection, so an abandoned task never leaks one.
#[async_trait]
pub trait DatabaseClient: Send {
    /// Executes a SQL statement and fetches the full result set.
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult>;

    /// Closes the connection. Further queries fail.
    async fn close(&mut self) -> Result<()>;
}

/// Opens task-owned connections for database targets.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a fresh connection to `target`.
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn DatabaseClient>>;
}

/// Connector backed by the real sqlx drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn DatabaseClient>> {
        match target {
            DatabaseTarget::Sqlite(path) => Ok(Box::new(SqliteClient::connect(path).await?)),
            DatabaseTarget::MySql(config) => Ok(Box::new(MySqlClient::connect(config).await?)),
            DatabaseTarget::Postgres(config) => {
                Ok(Box::new(PostgresClient::connect(config).await?))
            }
        }
    }
}
