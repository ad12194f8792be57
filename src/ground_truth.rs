//! Ground truth table and the response-id list.

use crate::error::{EvalError, Result};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const QUESTION_COLUMN: &str = "Question";
const ANSWER_COLUMN: &str = "Answers";
const SOURCE_COLUMN: &str = "Source_Name";

/// Expected answer and source for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthEntry {
    pub question: String,
    pub answer: String,
    pub source_name: String,
}

/// Ground truth keyed by trimmed question text.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    entries: HashMap<String, GroundTruthEntry>,
}

impl GroundTruth {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous one with the same question.
    pub fn insert(&mut self, entry: GroundTruthEntry) {
        self.entries.insert(entry.question.clone(), entry);
    }

    /// Exact-match lookup.
    pub fn get(&self, question: &str) -> Option<&GroundTruthEntry> {
        self.entries.get(question)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<GroundTruthEntry> for GroundTruth {
    fn from_iter<I: IntoIterator<Item = GroundTruthEntry>>(iter: I) -> Self {
        let mut table = GroundTruth::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}

/// Column positions resolved from the header row.
struct Columns {
    question: Option<usize>,
    answer: Option<usize>,
    source: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };
        Self {
            question: find(QUESTION_COLUMN),
            answer: find(ANSWER_COLUMN),
            source: find(SOURCE_COLUMN),
        }
    }

    fn field<'r>(record: &'r StringRecord, idx: Option<usize>) -> &'r str {
        idx.and_then(|i| record.get(i)).unwrap_or("").trim()
    }
}

/// Load the ground truth CSV (`Question`, `Answers`, `Source_Name`).
///
/// A missing file yields an empty table. Rows without a question are
/// skipped; a repeated question keeps the last row.
pub fn load_ground_truth(path: &Path) -> Result<GroundTruth> {
    if !path.exists() {
        info!(path = %path.display(), "ground truth file not found");
        return Ok(GroundTruth::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let columns = Columns::from_headers(reader.headers()?);
    let mut table = GroundTruth::new();

    for record in reader.records() {
        let record = record?;
        let question = Columns::field(&record, columns.question);
        if question.is_empty() {
            continue;
        }

        table.insert(GroundTruthEntry {
            question: question.to_string(),
            answer: Columns::field(&record, columns.answer).to_string(),
            source_name: Columns::field(&record, columns.source).to_string(),
        });
    }

    debug!(path = %path.display(), entries = table.len(), "loaded ground truth");
    Ok(table)
}

/// Load the newline-delimited list of response ids.
pub fn load_response_ids(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
