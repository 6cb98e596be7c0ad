//! Per-database splitting of a gold SQL file.
//!
//! Groups `sql<TAB>db_id` lines by database so a single database can be
//! evaluated on its own, optionally rewriting each statement for PostgreSQL.

use crate::error::{EvalError, Result};
use crate::eval::loader::{decode_text, load_json_document};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What to split and where to write it.
#[derive(Debug, Clone, Default)]
pub struct SplitOptions {
    /// Gold SQL file (`sql<TAB>db_id` per line).
    pub input: PathBuf,
    /// Output directory.
    pub output: PathBuf,
    /// Question file (JSON array of records with `db_id`).
    pub questions: Option<PathBuf>,
    /// Schema file with `table_names_original` / `column_names_original` per database.
    pub tables: Option<PathBuf>,
    /// Rewrite statements for PostgreSQL.
    pub postgres: bool,
}

/// What a split run wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitSummary {
    /// Number of databases with at least one statement.
    pub databases: usize,
    /// Number of statements written.
    pub statements: usize,
    /// Non-blank lines skipped for lacking a tab.
    pub skipped_lines: usize,
    /// Files written, in write order.
    pub files: Vec<PathBuf>,
}

/// Rewrites MySQL/SQLite flavoured statements for PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresRewriter {
    limit: Regex,
}

impl PostgresRewriter {
    pub fn new() -> Result<Self> {
        let limit = Regex::new(r"LIMIT\s+(\d+)\s*,\s*(\d+)")
            .map_err(|e| EvalError::internal(format!("Invalid LIMIT pattern: {e}")))?;
        Ok(Self { limit })
    }

    /// Backticks become double quotes, `LIMIT a, b` becomes
    /// `LIMIT b OFFSET a`, and trailing semicolons are dropped.
    pub fn convert(&self, sql: &str) -> String {
        let quoted = sql.replace('`', "\"");
        let limited = self.limit.replace_all(&quoted, "LIMIT $2 OFFSET $1");
        limited.trim().trim_end_matches(';').to_string()
    }
}

/// A gold line split at its last tab.
struct GoldLine<'a> {
    line: &'a str,
    sql: &'a str,
    db_id: &'a str,
}

fn parse_gold_lines(text: &str) -> (Vec<GoldLine<'_>>, usize) {
    let mut lines = Vec::new();
    let mut skipped = 0;
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        match line.rsplit_once('\t') {
            Some((sql, db_id)) => lines.push(GoldLine {
                line,
                sql,
                db_id: db_id.trim(),
            }),
            None if line.is_empty() => {}
            None => {
                warn!("Skipping line {idx} without a database id: {line}");
                skipped += 1;
            }
        }
    }
    (lines, skipped)
}

/// Groups question records by `db_id`, tagging each with its position as `id`.
fn group_questions(path: &Path) -> Result<BTreeMap<String, Vec<JsonValue>>> {
    let document = load_json_document(path)?;
    let records = document.as_array().ok_or_else(|| {
        EvalError::load(format!("{} must contain a JSON array", path.display()))
    })?;

    let mut grouped: BTreeMap<String, Vec<JsonValue>> = BTreeMap::new();
    for (id, record) in records.iter().enumerate() {
        let Some(object) = record.as_object() else {
            warn!("Skipping question {id}: not a JSON object");
            continue;
        };
        let Some(db_id) = object.get("db_id").and_then(JsonValue::as_str) else {
            warn!("Skipping question {id}: no db_id");
            continue;
        };
        let mut object = object.clone();
        object.insert("id".to_string(), JsonValue::from(id));
        grouped
            .entry(db_id.to_string())
            .or_default()
            .push(JsonValue::Object(object));
    }
    Ok(grouped)
}

/// Loads `table_names_original` / `column_names_original` per database.
fn load_schemas(path: &Path) -> Result<HashMap<String, Map<String, JsonValue>>> {
    let document = load_json_document(path)?;
    let records = document.as_array().ok_or_else(|| {
        EvalError::load(format!("{} must contain a JSON array", path.display()))
    })?;

    Ok(records
        .iter()
        .filter_map(|record| {
            let db_id = record.get("db_id")?.as_str()?;
            let mut schema = Map::new();
            schema.insert(
                "table_names".to_string(),
                record.get("table_names_original")?.clone(),
            );
            schema.insert(
                "column_names".to_string(),
                record.get("column_names_original")?.clone(),
            );
            Some((db_id.to_string(), schema))
        })
        .collect())
}

fn write_file(path: &Path, contents: &str, summary: &mut SplitSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            EvalError::io(format!("Cannot create {}: {e}", parent.display()))
        })?;
    }
    std::fs::write(path, contents)
        .map_err(|e| EvalError::io(format!("Cannot write {}: {e}", path.display())))?;
    summary.files.push(path.to_path_buf());
    Ok(())
}

fn write_json(path: &Path, records: &[JsonValue], summary: &mut SplitSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| EvalError::internal(format!("Cannot serialize questions: {e}")))?;
    write_file(path, &json, summary)
}

/// Splits the gold SQL file (and question file, if given) by database.
pub fn split_dataset(options: &SplitOptions) -> Result<SplitSummary> {
    let bytes = std::fs::read(&options.input).map_err(|e| {
        EvalError::load(format!("Cannot read {}: {e}", options.input.display()))
    })?;
    let text = decode_text(&bytes);
    let (lines, skipped_lines) = parse_gold_lines(&text);

    let questions = options
        .questions
        .as_deref()
        .map(group_questions)
        .transpose()?;

    let mut summary = SplitSummary {
        skipped_lines,
        ..Default::default()
    };

    if options.postgres {
        split_postgres(options, &lines, questions, &mut summary)?;
    } else {
        split_plain(options, &lines, questions, &mut summary)?;
    }

    info!(
        "Split {} statements across {} databases into {}",
        summary.statements,
        summary.databases,
        options.output.display()
    );
    Ok(summary)
}

fn group_lines<'a>(
    lines: &'a [GoldLine<'a>],
    render: impl Fn(&GoldLine<'a>) -> String,
) -> BTreeMap<&'a str, Vec<String>> {
    let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for line in lines {
        grouped.entry(line.db_id).or_default().push(render(line));
    }
    grouped
}

fn to_file_contents(lines: &[String]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}

/// `<out>/<db>/dev_<db>.sql` and `<out>/<db>/dev_<db>.json`.
fn split_plain(
    options: &SplitOptions,
    lines: &[GoldLine<'_>],
    questions: Option<BTreeMap<String, Vec<JsonValue>>>,
    summary: &mut SplitSummary,
) -> Result<()> {
    let grouped = group_lines(lines, |line| line.line.to_string());

    for (db_id, statements) in &grouped {
        let path = options.output.join(db_id).join(format!("dev_{db_id}.sql"));
        write_file(&path, &to_file_contents(statements), summary)?;
        summary.databases += 1;
        summary.statements += statements.len();
    }

    for (db_id, records) in questions.unwrap_or_default() {
        let path = options.output.join(&db_id).join(format!("dev_{db_id}.json"));
        write_json(&path, &records, summary)?;
    }
    Ok(())
}

/// `<out>/dev_postgres_<db>.sql` and `<out>/dev_postgres_<db>.json`.
fn split_postgres(
    options: &SplitOptions,
    lines: &[GoldLine<'_>],
    questions: Option<BTreeMap<String, Vec<JsonValue>>>,
    summary: &mut SplitSummary,
) -> Result<()> {
    let rewriter = PostgresRewriter::new()?;
    let grouped = group_lines(lines, |line| {
        format!("{}\t{}", rewriter.convert(line.sql), line.db_id)
    });

    for (db_id, statements) in &grouped {
        let path = options.output.join(format!("dev_postgres_{db_id}.sql"));
        write_file(&path, &to_file_contents(statements), summary)?;
        info!("Wrote {} queries to {}", statements.len(), path.display());
        summary.databases += 1;
        summary.statements += statements.len();
    }

    let Some(questions) = questions else {
        return Ok(());
    };
    let schemas = options
        .tables
        .as_deref()
        .map(load_schemas)
        .transpose()?
        .unwrap_or_default();

    for (db_id, mut records) in questions {
        match schemas.get(&db_id) {
            Some(schema) => {
                for record in &mut records {
                    if let Some(object) = record.as_object_mut() {
                        object.extend(schema.clone());
                    }
                }
            }
            None if options.tables.is_some() => {
                warn!("No schema for database '{db_id}' in the tables file");
            }
            None => {}
        }
        let path = options.output.join(format!("dev_postgres_{db_id}.json"));
        write_json(&path, &records, summary)?;
    }
    Ok(())
}
