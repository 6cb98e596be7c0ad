//! Error types for birdeval.
//!
//! Defines the main error enum used throughout the harness. Per-task failures
//! never escape the execution harness as errors; the variants here describe
//! failures that abort a run or that the harness converts into a zero score.

use thiserror::Error;

/// Main error type for birdeval operations.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Input files that cannot be read or parsed (predictions, gold SQL, etc.)
    #[error("Load error: {0}")]
    Load(String),

    /// Configuration errors (invalid config file, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection errors (host unreachable, auth failed, missing file, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, unknown tables, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Filesystem errors outside of input loading (log files, split output).
    #[error("I/O error: {0}")]
    Io(String),

    /// The run was interrupted before every task completed.
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Internal invariant violations (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// Creates a load error with the given message.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an I/O error with the given message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Creates an interruption error with the given message.
    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::Interrupted(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Load(_) => "Load Error",
            Self::Config(_) => "Configuration Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Io(_) => "I/O Error",
            Self::Interrupted(_) => "Interrupted",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted(_) => 130,
            _ => 1,
        }
    }
}

/// Result type alias using EvalError.
pub type Result<T> = std::result::Result<T, EvalError>;
