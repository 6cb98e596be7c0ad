//! Dataset splitting tests.

use super::{create_sqlite_db, tabbed, write_file};
use birdeval::db::DriverConnector;
use birdeval::eval::loader::load_references;
use birdeval::eval::{run_evaluation, EvaluationSettings};
use birdeval::split::{split_dataset, SplitOptions};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const GOLD: &str = "SELECT name FROM drivers LIMIT 0, 1;\tformula_1\n\
SELECT COUNT(*) FROM cards\tcard_games\n\
garbage without tab\n\
SELECT `name` FROM drivers\tformula_1\n";

#[test]
fn test_split_output_is_a_valid_gold_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "dev.sql", GOLD);
    let output = dir.path().join("splits");

    let summary = split_dataset(&SplitOptions {
        input,
        output: output.clone(),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(summary.databases, 2);
    assert_eq!(summary.statements, 3);
    assert_eq!(summary.skipped_lines, 1);

    let references = load_references(&output.join("formula_1").join("dev_formula_1.sql")).unwrap();
    let db_ids: Vec<String> = references
        .into_iter()
        .map(|r| r.unwrap().db_id)
        .collect();
    assert_eq!(db_ids, vec!["formula_1", "formula_1"]);
}

#[test]
fn test_postgres_split_rewrites_statements() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(dir.path(), "dev.sql", GOLD);
    let questions = write_file(
        dir.path(),
        "dev.json",
        &json!([
            {"db_id": "formula_1", "question": "first driver?"},
            {"db_id": "card_games", "question": "how many cards?"},
            {"db_id": "formula_1", "question": "all drivers?"},
        ])
        .to_string(),
    );
    let output = dir.path().join("pg");

    split_dataset(&SplitOptions {
        input,
        output: output.clone(),
        questions: Some(questions),
        tables: None,
        postgres: true,
    })
    .unwrap();

    assert_eq!(
        std::fs::read_to_string(output.join("dev_postgres_formula_1.sql")).unwrap(),
        "SELECT name FROM drivers LIMIT 1 OFFSET 0\tformula_1\n\
         SELECT \"name\" FROM drivers\tformula_1\n"
    );

    let written: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(output.join("dev_postgres_formula_1.json")).unwrap(),
    )
    .unwrap();
    let ids: Vec<u64> = written
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![0, 2]);
}

#[tokio::test]
async fn test_evaluate_one_split_database() {
    let dir = tempfile::tempdir().unwrap();
    let dbs = dir.path().join("dbs");
    create_sqlite_db(
        &dbs,
        "card_games",
        "CREATE TABLE cards (id INTEGER); INSERT INTO cards VALUES (1), (2);",
    )
    .await;

    let input = write_file(dir.path(), "dev.sql", GOLD);
    let output = dir.path().join("splits");
    split_dataset(&SplitOptions {
        input,
        output: output.clone(),
        ..Default::default()
    })
    .unwrap();

    let predicted = write_file(
        dir.path(),
        "predict_card_games.json",
        &json!([tabbed("SELECT COUNT(id) FROM cards", "card_games")]).to_string(),
    );
    let settings = EvaluationSettings::new(
        predicted,
        output.join("card_games").join("dev_card_games.sql"),
        dbs,
    );

    let report = run_evaluation(&settings, Arc::new(DriverConnector), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.total.count, 1);
    assert_eq!(report.total.accuracy, 100.0);
}
