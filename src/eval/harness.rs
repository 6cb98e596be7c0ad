//! Execution of a single query pair.

use super::{ExecutionResult, QueryPair};
use crate::db::{Connector, DatabaseClient, QueryResult};
use crate::error::Result;
use crate::eval::Metric;
use std::time::Duration;
use tracing::debug;

/// Runs one pair on a fresh connection and scores it.
///
/// The candidate runs first, then the reference, on the same connection. The
/// connection is closed whether or not the statements succeed.
pub async fn execute_pair(
    pair: &QueryPair,
    connector: &dyn Connector,
    metric: Metric,
) -> Result<f64> {
    let mut client = connector.connect(&pair.target).await?;
    let fetched = fetch_both(client.as_mut(), pair).await;

    if let Err(e) = client.close().await {
        debug!("Closing connection for pair {} failed: {e}", pair.index);
    }

    let (predicted, ground_truth) = fetched?;
    debug!(
        "Pair {}: candidate {} rows in {:?}, reference {} rows in {:?}",
        pair.index,
        predicted.rows.len(),
        predicted.execution_time,
        ground_truth.rows.len(),
        ground_truth.execution_time
    );
    Ok(metric.score(&predicted.rows, &ground_truth.rows))
}

async fn fetch_both(
    client: &mut dyn DatabaseClient,
    pair: &QueryPair,
) -> Result<(QueryResult, QueryResult)> {
    let predicted = client.execute_query(&pair.candidate_sql).await?;
    let ground_truth = client.execute_query(&pair.reference_sql).await?;
    Ok((predicted, ground_truth))
}

/// Runs one pair under a wall-clock budget. Never fails: errors and timeouts
/// become zero-score results.
///
/// On timeout the pending future is dropped, which drops its connection.
pub async fn execute_with_timeout(
    pair: &QueryPair,
    connector: &dyn Connector,
    metric: Metric,
    timeout: Duration,
) -> ExecutionResult {
    match tokio::time::timeout(timeout, execute_pair(pair, connector, metric)).await {
        Ok(Ok(score)) => {
            debug!("Pair {} scored {score}", pair.index);
            ExecutionResult::completed(pair, score)
        }
        Ok(Err(e)) => {
            debug!("Pair {} failed on {}: {e}", pair.index, pair.target.describe());
            ExecutionResult::failed(pair.index, pair.question_id, e.to_string())
        }
        Err(_) => {
            debug!(
                "Pair {} on {} timed out after {:.1}s",
                pair.index,
                pair.target.describe(),
                timeout.as_secs_f64()
            );
            ExecutionResult::timed_out(pair)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseTarget, MockConnector, MockResponse, Value};
    use crate::eval::TaskOutcome;
    use std::path::PathBuf;

    fn pair(candidate: &str, reference: &str) -> QueryPair {
        QueryPair {
            index: 0,
            question_id: 0,
            candidate_sql: candidate.to_string(),
            reference_sql: reference.to_string(),
            db_id: "a".to_string(),
            target: DatabaseTarget::Sqlite(PathBuf::from("/db/a/a.sqlite")),
        }
    }

    fn connector() -> MockConnector {
        MockConnector::new()
            .with_rows("SELECT 1", vec![vec![Value::Int(1)]])
            .with_rows("SELECT 2", vec![vec![Value::Int(2)]])
            .with_response("SELCT 1", MockResponse::Error("syntax error".to_string()))
            .with_response(
                "SELECT slow",
                MockResponse::Delay(Duration::from_secs(5), vec![]),
            )
    }

    #[tokio::test]
    async fn test_matching_pair_scores_one() {
        let connector = connector();
        let result = execute_with_timeout(
            &pair("SELECT 1", "SELECT 1"),
            &connector,
            Metric::Ex,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result.score, 1.0);
        assert_eq!(result.outcome, TaskOutcome::Completed);
        assert_eq!(connector.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_mismatching_pair_scores_zero() {
        let connector = connector();
        let result = execute_with_timeout(
            &pair("SELECT 2", "SELECT 1"),
            &connector,
            Metric::Ex,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result.score, 0.0);
        assert_eq!(result.outcome, TaskOutcome::Completed);
    }

    #[tokio::test]
    async fn test_candidate_error_is_failure() {
        let connector = connector();
        let result = execute_with_timeout(
            &pair("SELCT 1", "SELECT 1"),
            &connector,
            Metric::Ex,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result.score, 0.0);
        assert!(matches!(result.outcome, TaskOutcome::Failed(ref m) if m.contains("syntax error")));
        assert_eq!(connector.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_failure() {
        let connector = connector().with_failing_target("/db/a/a.sqlite");
        let result = execute_with_timeout(
            &pair("SELECT 1", "SELECT 1"),
            &connector,
            Metric::Ex,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result.outcome, TaskOutcome::Failed(_)));
        assert_eq!(connector.opened_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_scores_zero_and_releases_connection() {
        let connector = connector();
        let result = execute_with_timeout(
            &pair("SELECT slow", "SELECT 1"),
            &connector,
            Metric::Ex,
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(result.score, 0.0);
        assert_eq!(result.outcome, TaskOutcome::TimedOut);
        assert_eq!(connector.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_soft_f1_metric() {
        let connector = connector();
        let score = execute_pair(&pair("SELECT 1", "SELECT 1"), &connector, Metric::SoftF1)
            .await
            .unwrap();
        assert_eq!(score, 1.0);
    }
}
