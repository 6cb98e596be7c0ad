//! Execution-accuracy evaluation pipeline.
//!
//! Loads prediction and reference files into query pairs, runs every pair on a
//! bounded pool of tasks, then aggregates and reports the scores by
//! difficulty tier.

pub mod aggregate;
pub mod compare;
pub mod dispatcher;
pub mod harness;
pub mod loader;
pub mod report;

pub use aggregate::{compute_acc_by_diff, Difficulty, DifficultyManifest, ScoreReport, TierScore};
pub use compare::Metric;
pub use dispatcher::{run_pairs_parallel, DispatchOptions};

use crate::config::{ConnectionConfig, DEFAULT_DB_ID};
use crate::db::{sqlite_database_path, Connector, DatabaseTarget, Dialect};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One candidate/reference statement pair, resolved at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPair {
    /// Dense position in the evaluated sequence, `0..N`.
    pub index: usize,
    /// Line of the reference file this pair came from.
    pub question_id: usize,
    /// Predicted SQL.
    pub candidate_sql: String,
    /// Gold SQL.
    pub reference_sql: String,
    /// Database id named by the reference line.
    pub db_id: String,
    /// Where both statements are executed.
    pub target: DatabaseTarget,
}

/// How one task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Both statements ran and were compared.
    Completed,
    /// Connecting, executing or fetching failed.
    Failed(String),
    /// The task exceeded its wall-clock budget.
    TimedOut,
}

/// The score of one query pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub index: usize,
    pub question_id: usize,
    /// 0 or 1 for execution accuracy; in `[0, 1]` for soft F1.
    pub score: f64,
    pub outcome: TaskOutcome,
}

impl ExecutionResult {
    pub fn completed(pair: &QueryPair, score: f64) -> Self {
        Self {
            index: pair.index,
            question_id: pair.question_id,
            score,
            outcome: TaskOutcome::Completed,
        }
    }

    pub fn failed(index: usize, question_id: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            question_id,
            score: 0.0,
            outcome: TaskOutcome::Failed(message.into()),
        }
    }

    pub fn timed_out(pair: &QueryPair) -> Self {
        Self {
            index: pair.index,
            question_id: pair.question_id,
            score: 0.0,
            outcome: TaskOutcome::TimedOut,
        }
    }
}

/// Maps database ids to execution targets for one dialect.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    dialect: Dialect,
    db_root: PathBuf,
    server: Option<Arc<ConnectionConfig>>,
}

impl TargetResolver {
    /// Creates a resolver. `server` is used for MySQL and PostgreSQL, which
    /// keep every benchmark database in one server database.
    pub fn new(dialect: Dialect, db_root: &Path, server: Option<ConnectionConfig>) -> Self {
        Self {
            dialect,
            db_root: db_root.to_path_buf(),
            server: server.map(Arc::new),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Resolves the target for `db_id`.
    pub fn resolve(&self, db_id: &str) -> DatabaseTarget {
        let server = || {
            self.server
                .clone()
                .unwrap_or_else(|| Arc::new(default_server(self.dialect)))
        };
        match self.dialect {
            Dialect::Sqlite => DatabaseTarget::Sqlite(sqlite_database_path(&self.db_root, db_id)),
            Dialect::MySql => DatabaseTarget::MySql(server()),
            Dialect::Postgres => DatabaseTarget::Postgres(server()),
        }
    }
}

fn default_server(dialect: Dialect) -> ConnectionConfig {
    let mut config = ConnectionConfig::default();
    config.apply_builtin_defaults(dialect);
    config
}

/// Fully resolved settings for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    pub predicted_sql_path: PathBuf,
    pub ground_truth_path: PathBuf,
    pub db_root_path: PathBuf,
    pub num_workers: usize,
    pub timeout: Duration,
    pub diff_json_path: Option<PathBuf>,
    pub dialect: Dialect,
    pub output_log_path: Option<PathBuf>,
    pub metric: Metric,
    pub default_db_id: String,
    /// Server descriptor for MySQL and PostgreSQL runs.
    pub server: Option<ConnectionConfig>,
}

impl EvaluationSettings {
    /// Settings with the stock defaults for the three required paths.
    pub fn new(
        predicted_sql_path: impl Into<PathBuf>,
        ground_truth_path: impl Into<PathBuf>,
        db_root_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            predicted_sql_path: predicted_sql_path.into(),
            ground_truth_path: ground_truth_path.into(),
            db_root_path: db_root_path.into(),
            num_workers: 1,
            timeout: Duration::from_secs(30),
            diff_json_path: None,
            dialect: Dialect::Sqlite,
            output_log_path: None,
            metric: Metric::Ex,
            default_db_id: DEFAULT_DB_ID.to_string(),
            server: None,
        }
    }
}

/// Runs a complete evaluation: load, dispatch, aggregate, report.
///
/// Per-pair failures only lower the score. Load errors and interrupts abort
/// the run.
pub async fn run_evaluation(
    settings: &EvaluationSettings,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
) -> Result<ScoreReport> {
    let resolver = TargetResolver::new(
        settings.dialect,
        &settings.db_root_path,
        settings.server.clone(),
    );

    let predictions = loader::load_predictions(&settings.predicted_sql_path, &settings.default_db_id)?;
    let references = loader::load_references(&settings.ground_truth_path)?;
    let pairs = loader::package_pairs(predictions, references, &resolver);

    info!(
        "Evaluating {} query pairs on {} with {} worker(s)",
        pairs.len(),
        settings.dialect,
        settings.num_workers
    );

    let options = DispatchOptions {
        num_workers: settings.num_workers,
        timeout: settings.timeout,
        metric: settings.metric,
    };
    let results = run_pairs_parallel(pairs, connector, options, cancel).await?;

    info!("start calculate {}", settings.metric.label());
    let manifest = match &settings.diff_json_path {
        Some(path) => DifficultyManifest::load(path),
        None => {
            info!("No difficulty file given; reporting overall accuracy only");
            None
        }
    };
    let report = compute_acc_by_diff(&results, manifest.as_ref())?;

    report::print_report(
        &report,
        settings.metric,
        settings.dialect,
        settings.output_log_path.as_deref(),
    );

    Ok(report)
}
