//! Prediction and reference file loading tests.

use super::write_file;
use birdeval::db::Dialect;
use birdeval::error::EvalError;
use birdeval::eval::loader::{
    load_predictions, load_references, package_pairs, Prediction, EMPTY_PLACEHOLDER,
};
use birdeval::eval::TargetResolver;
use pretty_assertions::assert_eq;

fn prediction(sql: &str, db_id: &str) -> Prediction {
    Prediction {
        sql: sql.to_string(),
        db_id: db_id.to_string(),
    }
}

#[test]
fn test_load_object_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "predict.json",
        r#"{
            "0": "SELECT 1\t----- bird -----\tcard_games",
            "1": {"sql": "SELECT 2", "db_id": "toxicology"},
            "2": "SELECT 3",
            "3": null
        }"#,
    );

    let predictions = load_predictions(&path, "financial").unwrap();
    assert_eq!(
        predictions,
        vec![
            prediction("SELECT 1", "card_games"),
            prediction("SELECT 2", "toxicology"),
            prediction("SELECT 3", "financial"),
            prediction(EMPTY_PLACEHOLDER, "financial"),
        ]
    );
}

#[test]
fn test_load_json_lines_with_bom_and_crlf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("predict.jsonl");
    let mut bytes = b"\xEF\xBB\xBF".to_vec();
    bytes.extend_from_slice(b"\"SELECT 1\"\r\n{oops\r\n\"SELECT 2\"\r\n");
    std::fs::write(&path, bytes).unwrap();

    let predictions = load_predictions(&path, "financial").unwrap();
    assert_eq!(
        predictions,
        vec![
            prediction("SELECT 1", "financial"),
            prediction("SELECT 2", "financial"),
        ]
    );
}

#[test]
fn test_load_latin1_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("predict.json");
    std::fs::write(&path, b"[\"SELECT 'caf\xE9'\"]").unwrap();

    let predictions = load_predictions(&path, "financial").unwrap();
    assert_eq!(predictions[0].sql, "SELECT 'caf\u{e9}'");
}

#[test]
fn test_unreadable_predictions_are_load_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "predict.json", "this is not json\nnor is this\n");
    assert!(matches!(
        load_predictions(&path, "financial"),
        Err(EvalError::Load(_))
    ));

    let path = write_file(dir.path(), "scalar.json", "42");
    assert!(matches!(
        load_predictions(&path, "financial"),
        Err(EvalError::Load(_))
    ));
}

#[test]
fn test_references_and_pairing() {
    let dir = tempfile::tempdir().unwrap();
    let gold = write_file(
        dir.path(),
        "gold.sql",
        "SELECT a FROM t\tcard_games\r\nbroken\r\nSELECT c FROM t\tformula_1\r\n",
    );
    let references = load_references(&gold).unwrap();
    assert_eq!(references.len(), 3);
    assert!(references[1].is_none());

    let resolver = TargetResolver::new(Dialect::Sqlite, dir.path(), None);
    let pairs = package_pairs(
        vec![
            prediction("SELECT a", "card_games"),
            prediction("SELECT b", "card_games"),
            prediction("SELECT c", "formula_1"),
            prediction("SELECT d", "formula_1"),
        ],
        references,
        &resolver,
    );

    let summary: Vec<(usize, usize, &str, &str)> = pairs
        .iter()
        .map(|p| {
            (
                p.index,
                p.question_id,
                p.candidate_sql.as_str(),
                p.db_id.as_str(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![(0, 0, "SELECT a", "card_games"), (1, 2, "SELECT c", "formula_1")]
    );
}
