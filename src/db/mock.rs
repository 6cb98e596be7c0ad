//! Mock database client for testing.
//!
//! Provides scripted, in-memory connections so the harness and dispatcher can
//! be exercised without a database. Each client counts itself as live until
//! it is dropped, which lets tests check that no connection outlives its task.

use super::{Connector, DatabaseClient, DatabaseTarget, QueryResult, Row};
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted response for one SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// Return these rows immediately.
    Rows(Vec<Row>),
    /// Fail with a query error carrying this message.
    Error(String),
    /// Sleep, then return these rows.
    Delay(Duration, Vec<Row>),
}

/// A mock database client that replays scripted responses.
#[derive(Debug)]
pub struct MockDatabaseClient {
    responses: Arc<HashMap<String, MockResponse>>,
    live: Arc<AtomicUsize>,
    closed: bool,
}

impl MockDatabaseClient {
    /// Creates a standalone client with the given script.
    pub fn new(responses: HashMap<String, MockResponse>) -> Self {
        Self::with_counter(Arc::new(responses), Arc::new(AtomicUsize::new(0)))
    }

    fn with_counter(responses: Arc<HashMap<String, MockResponse>>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            responses,
            live,
            closed: false,
        }
    }
}

impl Drop for MockDatabaseClient {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        if self.closed {
            return Err(EvalError::connection("Connection already closed"));
        }

        match self.responses.get(sql.trim()) {
            Some(MockResponse::Rows(rows)) => Ok(QueryResult::new(rows.clone(), Duration::ZERO)),
            Some(MockResponse::Error(message)) => Err(EvalError::query(message.clone())),
            Some(MockResponse::Delay(delay, rows)) => {
                tokio::time::sleep(*delay).await;
                Ok(QueryResult::new(rows.clone(), *delay))
            }
            None => Err(EvalError::query(format!("no such table in mock script: {sql}"))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Connector handing out `MockDatabaseClient`s that share one script.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    responses: Arc<HashMap<String, MockResponse>>,
    failing_targets: Arc<HashSet<String>>,
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl MockConnector {
    /// Creates a connector with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts `response` for the statement `sql` (matched after trimming).
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        let sql = sql.into();
        Arc::make_mut(&mut self.responses).insert(sql.trim().to_string(), response);
        self
    }

    /// Shorthand for scripting a row result.
    pub fn with_rows(self, sql: impl Into<String>, rows: Vec<Row>) -> Self {
        self.with_response(sql, MockResponse::Rows(rows))
    }

    /// Makes connecting to the target described as `description` fail.
    pub fn with_failing_target(mut self, description: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failing_targets).insert(description.into());
        self
    }

    /// Number of clients handed out and not yet dropped.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of successful connects so far.
    pub fn opened_connections(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn DatabaseClient>> {
        let description = target.describe();
        if self.failing_targets.contains(&description) {
            return Err(EvalError::connection(format!(
                "Cannot connect to {description}"
            )));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDatabaseClient::with_counter(
            Arc::clone(&self.responses),
            Arc::clone(&self.live),
        )))
    }
}
