//! Parallel dispatch of query pairs.
//!
//! One tokio task per pair, admitted through a semaphore so at most
//! `num_workers` run at once. Handles are awaited in submission order, so the
//! results come back indexed without any shared collector.

use super::harness::execute_with_timeout;
use super::{ExecutionResult, Metric, QueryPair, TaskOutcome};
use crate::db::Connector;
use crate::error::{EvalError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dispatch parameters.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub num_workers: usize,
    pub timeout: Duration,
    pub metric: Metric,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            num_workers: 1,
            timeout: Duration::from_secs(30),
            metric: Metric::Ex,
        }
    }
}

struct PendingTask {
    index: usize,
    question_id: usize,
    handle: JoinHandle<ExecutionResult>,
}

/// Runs every pair and returns one result per pair.
///
/// Cancelling `cancel` aborts all queued and running tasks, waits for them to
/// unwind (dropping their connections), and returns [`EvalError::Interrupted`].
pub async fn run_pairs_parallel(
    pairs: Vec<QueryPair>,
    connector: Arc<dyn Connector>,
    options: DispatchOptions,
    cancel: CancellationToken,
) -> Result<Vec<ExecutionResult>> {
    let total = pairs.len();
    let semaphore = Arc::new(Semaphore::new(options.num_workers.max(1)));
    let mut pending: Vec<PendingTask> = Vec::with_capacity(total);

    for pair in pairs {
        let permit = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return Err(shutdown(pending, 0, total).await);
            }
            permit = Arc::clone(&semaphore).acquire_owned() => permit
                .map_err(|e| EvalError::internal(format!("Worker pool closed: {e}")))?,
        };

        let connector = Arc::clone(&connector);
        let (index, question_id) = (pair.index, pair.question_id);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            execute_with_timeout(&pair, connector.as_ref(), options.metric, options.timeout).await
        });
        pending.push(PendingTask {
            index,
            question_id,
            handle,
        });
    }

    let mut results = Vec::with_capacity(total);
    let mut remaining = pending.into_iter();
    while let Some(mut task) = remaining.next() {
        let joined = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let mut unfinished = vec![task];
                unfinished.extend(remaining);
                return Err(shutdown(unfinished, results.len(), total).await);
            }
            joined = &mut task.handle => joined,
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                warn!("Task for pair {} did not complete: {e}", task.index);
                ExecutionResult::failed(task.index, task.question_id, format!("join error: {e}"))
            }
        };
        debug!("Collected pair {} ({}/{total})", result.index, results.len() + 1);
        results.push(result);
    }

    log_summary(&results);
    Ok(results)
}

/// Aborts unfinished tasks and waits until each has unwound.
async fn shutdown(tasks: Vec<PendingTask>, completed: usize, total: usize) -> EvalError {
    let unfinished = total - completed;
    for task in &tasks {
        task.handle.abort();
    }
    for task in tasks {
        // cancelled tasks report a JoinError; their results are discarded
        let _ = task.handle.await;
    }
    warn!("Interrupted with {unfinished} of {total} tasks unfinished");
    EvalError::interrupted(format!("{unfinished} of {total} tasks did not finish"))
}

fn log_summary(results: &[ExecutionResult]) {
    let failed = results
        .iter()
        .filter(|r| matches!(r.outcome, TaskOutcome::Failed(_)))
        .count();
    let timed_out = results
        .iter()
        .filter(|r| r.outcome == TaskOutcome::TimedOut)
        .count();
    info!(
        "Executed {} query pairs: {} failed, {} timed out",
        results.len(),
        failed,
        timed_out
    );
}
