//! End-to-end evaluation tests against scratch SQLite databases.

use super::{create_sqlite_db, tabbed, write_file};
use birdeval::db::{DriverConnector, MockConnector, MockResponse, Value};
use birdeval::error::EvalError;
use birdeval::eval::{run_evaluation, EvaluationSettings, Metric};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FINANCIAL_SETUP: &str = "
    CREATE TABLE account (account_id INTEGER PRIMARY KEY, district_id INTEGER, frequency TEXT);
    INSERT INTO account VALUES (1, 18, 'POPLATEK MESICNE');
    INSERT INTO account VALUES (2, 1, 'POPLATEK MESICNE');
    INSERT INTO account VALUES (3, 5, 'POPLATEK TYDNE');
";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        create_sqlite_db(&dir.path().join("dbs"), "financial", FINANCIAL_SETUP).await;
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes predictions as a JSON object keyed by index, plus gold lines.
    fn settings(&self, predictions: &[String], gold: &[&str]) -> EvaluationSettings {
        let object: serde_json::Map<String, serde_json::Value> = predictions
            .iter()
            .enumerate()
            .map(|(i, p)| (i.to_string(), json!(p)))
            .collect();
        let predicted = write_file(
            self.path(),
            "predict_dev.json",
            &serde_json::Value::Object(object).to_string(),
        );
        let gold_text: String = gold.iter().map(|line| format!("{line}\n")).collect();
        let ground_truth = write_file(self.path(), "dev_gold.sql", &gold_text);

        EvaluationSettings::new(predicted, ground_truth, self.path().join("dbs"))
    }

    fn manifest(&self, labels: &[&str]) -> std::path::PathBuf {
        let records: Vec<_> = labels.iter().map(|l| json!({"difficulty": l})).collect();
        write_file(self.path(), "dev.json", &json!(records).to_string())
    }
}

async fn evaluate(settings: &EvaluationSettings) -> birdeval::error::Result<birdeval::eval::ScoreReport> {
    run_evaluation(settings, Arc::new(DriverConnector), CancellationToken::new()).await
}

#[tokio::test]
async fn test_match_mismatch_and_syntax_error() {
    let fixture = Fixture::new().await;
    let mut settings = fixture.settings(
        &[
            tabbed("SELECT 1", "financial"),
            tabbed("SELECT 2", "financial"),
            tabbed("SELCT 1", "financial"),
        ],
        &["SELECT 1\tfinancial", "SELECT 1\tfinancial", "SELECT 1\tfinancial"],
    );
    settings.diff_json_path = Some(fixture.manifest(&["simple", "moderate", "challenging"]));
    settings.num_workers = 2;

    let report = evaluate(&settings).await.unwrap();
    assert_eq!(report.counts(), [1, 1, 1, 3]);
    assert_eq!(report.simple.accuracy, 100.0);
    assert_eq!(report.moderate.accuracy, 0.0);
    assert_eq!(report.challenging.accuracy, 0.0);
    assert!((report.total.accuracy - 100.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_all_simple_all_correct() {
    let fixture = Fixture::new().await;
    let mut settings = fixture.settings(
        &vec![tabbed("SELECT 1", "financial"); 3],
        &["SELECT 1\tfinancial"; 3],
    );
    settings.diff_json_path = Some(fixture.manifest(&["simple", "simple", "simple"]));

    let report = evaluate(&settings).await.unwrap();
    assert_eq!(report.counts(), [3, 0, 0, 3]);
    assert_eq!(report.scores(), [100.0, 0.0, 0.0, 100.0]);
}

#[tokio::test]
async fn test_real_tables_compare_as_sets() {
    let fixture = Fixture::new().await;
    let settings = fixture.settings(
        &[
            tabbed("SELECT account_id FROM account ORDER BY account_id DESC", "financial"),
            tabbed("SELECT frequency FROM account", "financial"),
            tabbed("SELECT COUNT(*) FROM account", "financial"),
        ],
        &[
            "SELECT account_id FROM account\tfinancial",
            "SELECT DISTINCT frequency FROM account\tfinancial",
            "SELECT COUNT(account_id) FROM account WHERE district_id > 100\tfinancial",
        ],
    );

    let report = evaluate(&settings).await.unwrap();
    // order and duplicates do not matter; a different count does
    assert!((report.total.accuracy - 200.0 / 3.0).abs() < 1e-9);
    assert!(!report.stratified);
    assert_eq!(report.counts(), [0, 0, 0, 3]);
}

#[tokio::test]
async fn test_malformed_gold_line_is_skipped() {
    let fixture = Fixture::new().await;
    let settings = fixture.settings(
        &[
            tabbed("SELECT 1", "financial"),
            tabbed("SELECT 'lost'", "financial"),
            tabbed("SELECT COUNT(*) FROM account", "financial"),
        ],
        &[
            "SELECT 1\tfinancial",
            "this line has no database id",
            "SELECT 3\tfinancial",
        ],
    );

    let report = evaluate(&settings).await.unwrap();
    assert_eq!(report.total.count, 2);
    assert_eq!(report.total.accuracy, 100.0);
}

#[tokio::test]
async fn test_missing_database_scores_zero() {
    let fixture = Fixture::new().await;
    let settings = fixture.settings(
        &[tabbed("SELECT 1", "financial"), tabbed("SELECT 1", "nowhere")],
        &["SELECT 1\tfinancial", "SELECT 1\tnowhere"],
    );

    let report = evaluate(&settings).await.unwrap();
    assert_eq!(report.total.count, 2);
    assert_eq!(report.total.accuracy, 50.0);
    assert!(!fixture.path().join("dbs/nowhere/nowhere.sqlite").exists());
}

#[tokio::test]
async fn test_multi_statement_candidate_scores_zero() {
    let fixture = Fixture::new().await;
    let settings = fixture.settings(
        &[
            tabbed("SELECT 1; SELECT 2", "financial"),
            tabbed("SELECT 2 UNION SELECT 1", "financial"),
        ],
        &[
            "SELECT 1 UNION SELECT 2\tfinancial",
            "SELECT 1 UNION SELECT 2\tfinancial",
        ],
    );

    let report = evaluate(&settings).await.unwrap();
    assert_eq!(report.total.count, 2);
    assert_eq!(report.total.accuracy, 50.0);
}

#[tokio::test]
async fn test_empty_prediction_uses_placeholder() {
    let fixture = Fixture::new().await;
    let settings = fixture.settings(
        &[tabbed("", "financial")],
        &["SELECT 'empty' AS result\tfinancial"],
    );

    let report = evaluate(&settings).await.unwrap();
    assert_eq!(report.total.accuracy, 100.0);
}

#[tokio::test]
async fn test_log_file_is_appended() {
    let fixture = Fixture::new().await;
    let mut settings = fixture.settings(
        &[tabbed("SELECT 1", "financial")],
        &["SELECT 1\tfinancial"],
    );
    let log_path = fixture.path().join("eval.log");
    settings.output_log_path = Some(log_path.clone());

    evaluate(&settings).await.unwrap();
    evaluate(&settings).await.unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.matches("start calculate EX").count(), 2);
    assert_eq!(
        log.matches("Finished EX evaluation for SQLite on Mini Dev set").count(),
        2
    );
}

#[tokio::test]
async fn test_soft_f1_run() {
    let fixture = Fixture::new().await;
    let mut settings = fixture.settings(
        &[tabbed(
            "SELECT account_id, district_id FROM account WHERE account_id = 1",
            "financial",
        )],
        &["SELECT account_id, frequency FROM account WHERE account_id = 1\tfinancial"],
    );
    settings.metric = Metric::SoftF1;

    let report = evaluate(&settings).await.unwrap();
    assert!((report.total.accuracy - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_predictions_file_is_load_error() {
    let fixture = Fixture::new().await;
    let mut settings = fixture.settings(&[], &[]);
    settings.predicted_sql_path = fixture.path().join("missing.json");

    let err = evaluate(&settings).await.unwrap_err();
    assert!(matches!(err, EvalError::Load(_)));
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn test_timeouts_with_mock_connector() {
    let fixture = Fixture::new().await;
    let mut settings = fixture.settings(
        &[
            tabbed("SELECT slow", "financial"),
            tabbed("SELECT 1", "financial"),
        ],
        &["SELECT 1\tfinancial", "SELECT 1\tfinancial"],
    );
    settings.timeout = Duration::from_millis(200);
    settings.num_workers = 2;

    let connector = Arc::new(
        MockConnector::new()
            .with_rows("SELECT 1", vec![vec![Value::Int(1)]])
            .with_response(
                "SELECT slow",
                MockResponse::Delay(Duration::from_secs(60), vec![vec![Value::Int(1)]]),
            ),
    );

    let report = run_evaluation(&settings, connector.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.total.accuracy, 50.0);
    assert_eq!(connector.live_connections(), 0);
}
