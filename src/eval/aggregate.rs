//! Score aggregation by difficulty tier.

use super::loader::load_json_document;
use super::ExecutionResult;
use crate::error::{EvalError, Result};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Difficulty tier of a benchmark question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Simple,
    Moderate,
    Challenging,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Challenging => "challenging",
        }
    }

    /// Parses a label exactly as the dataset writes it.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "challenging" => Some(Self::Challenging),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Difficulty labels aligned with question positions.
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyManifest {
    labels: Vec<Difficulty>,
}

impl DifficultyManifest {
    pub fn new(labels: Vec<Difficulty>) -> Self {
        Self { labels }
    }

    /// Loads the manifest. Any failure is logged and yields `None`, which
    /// degrades the report to overall accuracy only.
    pub fn load(path: &Path) -> Option<Self> {
        let manifest = load_json_document(path).and_then(|document| Self::from_json(&document));
        match manifest {
            Ok(manifest) => {
                info!("Successfully loaded diff file with {} entries", manifest.len());
                Some(manifest)
            }
            Err(e) => {
                warn!("Error loading diff file: {e}");
                warn!("Falling back to simple accuracy calculation without difficulty breakdown");
                None
            }
        }
    }

    /// Builds a manifest from a JSON array of records with a `difficulty` field.
    ///
    /// A missing or unknown label is read as moderate.
    pub fn from_json(document: &JsonValue) -> Result<Self> {
        let records = document.as_array().ok_or_else(|| {
            EvalError::load("difficulty file must contain a JSON array of records")
        })?;

        let labels = records
            .iter()
            .enumerate()
            .map(|(i, record)| match record.get("difficulty") {
                Some(JsonValue::String(label)) => Difficulty::parse(label).unwrap_or_else(|| {
                    warn!("Unknown difficulty level '{label}' for question {i}, treating as moderate");
                    Difficulty::Moderate
                }),
                _ => {
                    warn!("Missing difficulty for question {i}, treating as moderate");
                    Difficulty::Moderate
                }
            })
            .collect();
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of the question at `question_id`, if covered.
    pub fn get(&self, question_id: usize) -> Option<Difficulty> {
        self.labels.get(question_id).copied()
    }
}

/// Count and accuracy (percent) of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TierScore {
    pub count: usize,
    pub accuracy: f64,
}

/// Per-tier and overall accuracy of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub simple: TierScore,
    pub moderate: TierScore,
    pub challenging: TierScore,
    pub total: TierScore,
    /// False when no usable manifest was available; tiers then repeat the
    /// overall accuracy and carry zero counts.
    pub stratified: bool,
}

impl ScoreReport {
    /// Accuracies in report order: simple, moderate, challenging, total.
    pub fn scores(&self) -> [f64; 4] {
        [
            self.simple.accuracy,
            self.moderate.accuracy,
            self.challenging.accuracy,
            self.total.accuracy,
        ]
    }

    /// Counts in report order: simple, moderate, challenging, total.
    pub fn counts(&self) -> [usize; 4] {
        [
            self.simple.count,
            self.moderate.count,
            self.challenging.count,
            self.total.count,
        ]
    }
}

#[derive(Default)]
struct Bucket {
    count: usize,
    sum: f64,
}

impl Bucket {
    fn add(&mut self, score: f64) {
        self.count += 1;
        self.sum += score;
    }

    fn tier(&self) -> TierScore {
        let accuracy = if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64 * 100.0
        };
        TierScore {
            count: self.count,
            accuracy,
        }
    }
}

/// Restores index order and checks there is exactly one result per index.
fn ordered(results: &[ExecutionResult]) -> Result<Vec<&ExecutionResult>> {
    let mut sorted: Vec<&ExecutionResult> = results.iter().collect();
    sorted.sort_by_key(|r| r.index);

    for (expected, result) in sorted.iter().enumerate() {
        if result.index != expected {
            return Err(EvalError::internal(format!(
                "expected a result for pair {expected}, found pair {} (duplicate or missing result)",
                result.index
            )));
        }
    }
    Ok(sorted)
}

/// Computes per-tier and overall accuracy.
///
/// Pure: the same inputs always give the same report. Results are matched to
/// manifest labels by question id. Results past the end of the manifest count
/// only toward the total.
pub fn compute_acc_by_diff(
    results: &[ExecutionResult],
    manifest: Option<&DifficultyManifest>,
) -> Result<ScoreReport> {
    let results = ordered(results)?;

    let mut total = Bucket::default();
    for result in &results {
        total.add(result.score);
    }
    let total = total.tier();

    let Some(manifest) = manifest else {
        return Ok(ScoreReport {
            simple: TierScore { count: 0, accuracy: total.accuracy },
            moderate: TierScore { count: 0, accuracy: total.accuracy },
            challenging: TierScore { count: 0, accuracy: total.accuracy },
            total,
            stratified: false,
        });
    };

    if results.len() < manifest.len() {
        info!(
            "Evaluating only {} of {} questions in the difficulty file",
            results.len(),
            manifest.len()
        );
    }

    let (mut simple, mut moderate, mut challenging) =
        (Bucket::default(), Bucket::default(), Bucket::default());
    let mut unlabelled = 0;
    for result in &results {
        match manifest.get(result.question_id) {
            Some(Difficulty::Simple) => simple.add(result.score),
            Some(Difficulty::Moderate) => moderate.add(result.score),
            Some(Difficulty::Challenging) => challenging.add(result.score),
            None => unlabelled += 1,
        }
    }
    if unlabelled > 0 {
        warn!(
            "Difficulty file covers {} questions; {unlabelled} result(s) count toward the total only",
            manifest.len()
        );
    }

    Ok(ScoreReport {
        simple: simple.tier(),
        moderate: moderate.tier(),
        challenging: challenging.tier(),
        total,
        stratified: true,
    })
}
