//! Result-set comparison metrics.
//!
//! Cells are compared the way the benchmark's reference scorer compares
//! fetched tuples: numerically equal integers, booleans, integral floats and
//! integral decimals are the same value, and NULL equals NULL.

use crate::db::{Row, Value};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Scoring metric applied to a pair of result sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// Execution accuracy: 1 if the result sets are equal as sets, else 0.
    #[default]
    Ex,
    /// Soft F1 over position-aligned rows.
    SoftF1,
}

impl Metric {
    /// Label used in reports and the log file.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ex => "EX",
            Self::SoftF1 => "F1",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ex" => Some(Self::Ex),
            "f1" | "soft-f1" | "soft_f1" => Some(Self::SoftF1),
            _ => None,
        }
    }

    /// Scores predicted rows against ground-truth rows.
    pub fn score(&self, predicted: &[Row], ground_truth: &[Row]) -> f64 {
        match self {
            Self::Ex => calculate_ex(predicted, ground_truth),
            Self::SoftF1 => calculate_f1(predicted, ground_truth),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown metric: {s}. Expected: ex or f1"))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Hashable, normalized form of a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Null,
    Int(i64),
    Float(u64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
}

impl CellKey {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Int(i64::from(*b)),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => float_key(*f),
            Value::Decimal(d) => decimal_key(*d),
            Value::String(s) => Self::Text(s.clone()),
            Value::Bytes(b) => Self::Bytes(b.clone()),
        }
    }
}

fn float_key(f: f64) -> CellKey {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return CellKey::Int(f as i64);
    }
    if f.is_nan() {
        return CellKey::Float(f64::NAN.to_bits());
    }
    CellKey::Float(f.to_bits())
}

fn decimal_key(d: Decimal) -> CellKey {
    let d = d.normalize();
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return CellKey::Int(i);
        }
    }
    // a decimal that is exactly a binary float equals that float
    match d.to_f64() {
        Some(f) if Decimal::from_f64_retain(f) == Some(d) => float_key(f),
        _ => CellKey::Decimal(d),
    }
}

fn row_key(row: &Row) -> Vec<CellKey> {
    row.iter().map(CellKey::from_value).collect()
}

/// Execution accuracy: order-independent, duplicate-insensitive set equality.
pub fn calculate_ex(predicted: &[Row], ground_truth: &[Row]) -> f64 {
    let predicted: HashSet<Vec<CellKey>> = predicted.iter().map(row_key).collect();
    let ground_truth: HashSet<Vec<CellKey>> = ground_truth.iter().map(row_key).collect();
    if predicted == ground_truth {
        1.0
    } else {
        0.0
    }
}

/// Removes duplicate rows, keeping first occurrences in order.
fn dedup_rows(rows: &[Row]) -> Vec<Vec<CellKey>> {
    let mut seen = HashSet::new();
    rows.iter()
        .map(row_key)
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Per-row (match, predicted-only, truth-only) fractions of the truth row's width.
fn row_match(predicted: &[CellKey], truth: &[CellKey]) -> (f64, f64, f64) {
    if truth.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let width = truth.len() as f64;

    let matches = predicted.iter().filter(|cell| truth.contains(cell)).count();
    let pred_only = predicted.len() - matches;
    let truth_only = truth.iter().filter(|cell| !predicted.contains(cell)).count();

    (
        matches as f64 / width,
        pred_only as f64 / width,
        truth_only as f64 / width,
    )
}

/// Soft F1 between two result sets.
///
/// Rows are de-duplicated and aligned by position. Missing predicted rows
/// count fully against recall, extra predicted rows fully against precision.
/// Two empty result sets score 1.
pub fn calculate_f1(predicted: &[Row], ground_truth: &[Row]) -> f64 {
    if predicted.is_empty() && ground_truth.is_empty() {
        return 1.0;
    }

    let predicted = dedup_rows(predicted);
    let ground_truth = dedup_rows(ground_truth);

    let (mut tp, mut fp, mut fn_) = (0.0, 0.0, 0.0);
    for (i, truth_row) in ground_truth.iter().enumerate() {
        match predicted.get(i) {
            Some(pred_row) => {
                let (matched, pred_only, truth_only) = row_match(pred_row, truth_row);
                tp += matched;
                fp += pred_only;
                fn_ += truth_only;
            }
            None => fn_ += 1.0,
        }
    }
    fp += predicted.len().saturating_sub(ground_truth.len()) as f64;

    let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}
