//! Prediction and reference file loading.
//!
//! Predictions are a JSON object keyed by question index or a JSON array (a
//! JSON Lines file is also accepted). References are `sql<TAB>db_id` lines.
//! Both are resolved into aligned [`QueryPair`]s.

use super::{QueryPair, TargetResolver};
use crate::error::{EvalError, Result};
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::{debug, info, warn};

/// Separator between SQL and database id in raw prediction strings.
pub const PREDICTION_SEPARATOR: &str = "\t----- bird -----\t";

/// Statement substituted for empty predictions.
pub const EMPTY_PLACEHOLDER: &str = "SELECT 'empty' AS result";

/// One entry of the predictions file, as written by the generator.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionEntry {
    /// `"<sql>\t----- bird -----\t<db_id>"`
    RawTabbed { sql: String, db_id: String },
    /// A bare SQL string.
    RawPlain(String),
    /// `{"sql": ..., "db_id": ...}`
    Structured { sql: String, db_id: Option<String> },
    /// Anything else; evaluated as an empty prediction.
    Malformed,
}

/// A normalized prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub sql: String,
    pub db_id: String,
}

/// A well-formed reference line.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub sql: String,
    pub db_id: String,
}

impl PredictionEntry {
    /// Classifies one JSON value from the predictions file.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::String(s) => {
                let parts: Vec<&str> = s.split(PREDICTION_SEPARATOR).collect();
                match parts.as_slice() {
                    [sql, db_id] => Self::RawTabbed {
                        sql: sql.to_string(),
                        db_id: db_id.trim().to_string(),
                    },
                    _ => Self::RawPlain(s.clone()),
                }
            }
            JsonValue::Object(map) => match map.get("sql") {
                Some(JsonValue::String(sql)) => Self::Structured {
                    sql: sql.clone(),
                    db_id: map
                        .get("db_id")
                        .and_then(JsonValue::as_str)
                        .map(String::from),
                },
                _ => Self::Malformed,
            },
            _ => Self::Malformed,
        }
    }

    /// Resolves the entry into a prediction, filling defaults.
    pub fn resolve(self, default_db_id: &str) -> Prediction {
        let (sql, db_id) = match self {
            Self::RawTabbed { sql, db_id } => (sql, db_id),
            Self::RawPlain(sql) => (sql, default_db_id.to_string()),
            Self::Structured { sql, db_id } => {
                (sql, db_id.unwrap_or_else(|| default_db_id.to_string()))
            }
            Self::Malformed => (String::new(), default_db_id.to_string()),
        };

        let sql = sql.trim();
        let sql = if sql.chars().count() < 2 {
            EMPTY_PLACEHOLDER.to_string()
        } else {
            sql.to_string()
        };
        Prediction { sql, db_id }
    }
}

/// Decodes file bytes: a UTF-8 BOM is dropped, invalid UTF-8 is read as Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Parses a whole JSON document, falling back to JSON Lines.
///
/// Malformed lines are skipped in JSON Lines mode. Returns `None` when neither
/// form yields anything.
pub fn parse_json_document(text: &str) -> Option<JsonValue> {
    if let Ok(value) = serde_json::from_str::<JsonValue>(text) {
        return Some(value);
    }

    let records: Vec<JsonValue> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    if records.is_empty() {
        None
    } else {
        Some(JsonValue::Array(records))
    }
}

/// Reads and parses a JSON or JSON Lines file.
pub fn load_json_document(path: &Path) -> Result<JsonValue> {
    let bytes = std::fs::read(path)
        .map_err(|e| EvalError::load(format!("Cannot read {}: {e}", path.display())))?;

    parse_json_document(&decode_text(&bytes)).ok_or_else(|| {
        EvalError::load(format!(
            "Failed to load JSON from {}. File may be corrupted or in an unsupported format.",
            path.display()
        ))
    })
}

/// Extracts prediction entries from a parsed predictions document.
///
/// Objects are read in key order as written; arrays in element order.
pub fn parse_predictions(document: &JsonValue) -> Result<Vec<PredictionEntry>> {
    match document {
        JsonValue::Object(map) => Ok(map.values().map(PredictionEntry::from_json).collect()),
        JsonValue::Array(items) => Ok(items.iter().map(PredictionEntry::from_json).collect()),
        other => Err(EvalError::load(format!(
            "Unexpected JSON format in predictions: expected an object or array, found {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Loads and normalizes the predictions file.
pub fn load_predictions(path: &Path, default_db_id: &str) -> Result<Vec<Prediction>> {
    let document = load_json_document(path)?;
    let predictions: Vec<Prediction> = parse_predictions(&document)?
        .into_iter()
        .map(|entry| entry.resolve(default_db_id))
        .collect();

    info!("Successfully processed {} prediction entries", predictions.len());
    Ok(predictions)
}

/// Parses reference lines. Malformed lines yield `None` so positions stay
/// aligned with the predictions.
pub fn parse_references(text: &str) -> Vec<Option<Reference>> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| {
            let parts: Vec<&str> = line.trim().split('\t').collect();
            match parts.as_slice() {
                [sql, db_id] => Some(Reference {
                    sql: sql.to_string(),
                    db_id: db_id.to_string(),
                }),
                _ => {
                    warn!("Malformed ground truth line {idx}: {line}");
                    None
                }
            }
        })
        .collect()
}

/// Loads the reference file.
pub fn load_references(path: &Path) -> Result<Vec<Option<Reference>>> {
    let bytes = std::fs::read(path)
        .map_err(|e| EvalError::load(format!("Cannot read {}: {e}", path.display())))?;
    let references = parse_references(&decode_text(&bytes));

    info!(
        "Successfully processed {} ground truth entries",
        references.iter().flatten().count()
    );
    Ok(references)
}

/// Aligns predictions with references into query pairs.
///
/// The longer sequence is truncated to the shorter one. A malformed reference
/// line drops the prediction at the same position. Every pair executes on the
/// reference's database.
pub fn package_pairs(
    predictions: Vec<Prediction>,
    references: Vec<Option<Reference>>,
    resolver: &TargetResolver,
) -> Vec<QueryPair> {
    if predictions.len() < references.len() {
        warn!(
            "Prediction file contains only {} queries, but ground truth has {}; evaluating only the first {}",
            predictions.len(),
            references.len(),
            predictions.len()
        );
    } else if predictions.len() > references.len() {
        warn!(
            "Prediction file contains {} queries, but ground truth has only {}; ignoring the extra predictions",
            predictions.len(),
            references.len()
        );
    }

    let mut pairs = Vec::with_capacity(predictions.len().min(references.len()));
    for (question_id, (prediction, reference)) in predictions.into_iter().zip(references).enumerate()
    {
        let Some(reference) = reference else {
            warn!("Skipping prediction {question_id}: its ground truth line is malformed");
            continue;
        };

        if prediction.db_id != reference.db_id {
            debug!(
                "Prediction {question_id} names database '{}', ground truth uses '{}'",
                prediction.db_id, reference.db_id
            );
        }

        pairs.push(QueryPair {
            index: pairs.len(),
            question_id,
            candidate_sql: prediction.sql,
            reference_sql: reference.sql,
            target: resolver.resolve(&reference.db_id),
            db_id: reference.db_id,
        });
    }
    pairs
}
