//! Per-turn evaluation rows and the CSV report.

use crate::error::{EvalError, Result};
use crate::judge::JudgeScore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Report columns, in the order they are written.
pub const REPORT_COLUMNS: [&str; 17] = [
    "response_id",
    "conversation_id",
    "turn",
    "question",
    "reference_answer",
    "generated_answer",
    "error",
    "routing_correct",
    "expected_sources",
    "selected_sources",
    "routing_decision",
    "routing_reasoning",
    "routing_model",
    "judge_correctness",
    "judge_relevance",
    "judge_usage_input",
    "judge_usage_output",
];

/// Row error recorded when a question has no ground truth entry.
pub const NO_GROUND_TRUTH: &str = "No ground truth available";

/// One evaluated response turn. Field order is the report column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub response_id: String,
    /// 0-based, in order of appearance.
    pub conversation_id: usize,
    /// 1-based within the conversation.
    pub turn: usize,
    pub question: String,
    pub reference_answer: String,
    pub generated_answer: String,
    pub error: String,
    /// `None` when the expected source is unknown.
    pub routing_correct: Option<bool>,
    pub expected_sources: String,
    /// Comma-joined selected sources.
    pub selected_sources: String,
    pub routing_decision: String,
    pub routing_reasoning: String,
    pub routing_model: String,
    pub judge_correctness: Option<u8>,
    pub judge_relevance: Option<u8>,
    pub judge_usage_input: Option<u32>,
    pub judge_usage_output: Option<u32>,
}

impl EvaluationResult {
    /// Copy a judge verdict into the row.
    pub fn apply_judge(&mut self, score: JudgeScore) {
        self.judge_correctness = score.correctness;
        self.judge_relevance = score.relevance;
        self.judge_usage_input = score.usage_input;
        self.judge_usage_output = score.usage_output;
    }

    /// The judge verdict currently held by the row.
    pub fn judge_score(&self) -> JudgeScore {
        JudgeScore {
            correctness: self.judge_correctness,
            relevance: self.judge_relevance,
            usage_input: self.judge_usage_input,
            usage_output: self.judge_usage_output,
        }
    }
}

/// Path of the report for `date`.
pub fn report_path(report_dir: &Path, date: NaiveDate) -> PathBuf {
    report_dir.join(format!("eval_{}.csv", date.format("%Y-%m-%d")))
}

/// Write `results` as CSV with a header row.
///
/// Nothing is written for an empty slice; the returned path is `None` then.
pub fn write_report(results: &[EvaluationResult], path: &Path) -> Result<Option<PathBuf>> {
    if results.is_empty() {
        info!("no results to write");
        return Ok(None);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush().map_err(|e| EvalError::io(path, e))?;

    info!(path = %path.display(), rows = results.len(), "evaluation report written");
    Ok(Some(path.to_path_buf()))
}

/// Read a report produced by [`write_report`].
pub fn read_report(path: &Path) -> Result<Vec<EvaluationResult>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut results = Vec::new();
    for row in reader.deserialize() {
        results.push(row?);
    }
    Ok(results)
}

/// Aggregate figures for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub conversations: usize,
    pub missing_ground_truth: usize,
    /// Rows with a known expected source.
    pub routing_known: usize,
    pub routing_correct: usize,
    pub judged: usize,
    pub mean_correctness: Option<f64>,
    pub mean_relevance: Option<f64>,
    pub tokens_input: u64,
    pub tokens_output: u64,
}

impl ReportSummary {
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let mut summary = ReportSummary {
            total: results.len(),
            ..Default::default()
        };

        let mut correctness = Vec::new();
        let mut relevance = Vec::new();
        let mut conversation_ids = std::collections::BTreeSet::new();

        for result in results {
            conversation_ids.insert(result.conversation_id);

            if result.error == NO_GROUND_TRUTH {
                summary.missing_ground_truth += 1;
            }

            if let Some(correct) = result.routing_correct {
                summary.routing_known += 1;
                if correct {
                    summary.routing_correct += 1;
                }
            }

            if let Some(c) = result.judge_correctness {
                correctness.push(c as f64);
            }
            if let Some(r) = result.judge_relevance {
                relevance.push(r as f64);
            }
            if result.judge_correctness.is_some() || result.judge_relevance.is_some() {
                summary.judged += 1;
            }

            summary.tokens_input += result.judge_usage_input.unwrap_or(0) as u64;
            summary.tokens_output += result.judge_usage_output.unwrap_or(0) as u64;
        }

        summary.conversations = conversation_ids.len();
        summary.mean_correctness = mean(&correctness);
        summary.mean_relevance = mean(&relevance);
        summary
    }

    /// Share of rows with a known expected source that were routed correctly.
    pub fn routing_accuracy(&self) -> Option<f64> {
        if self.routing_known == 0 {
            None
        } else {
            Some(self.routing_correct as f64 / self.routing_known as f64)
        }
    }

    /// Emit the summary through `tracing`.
    pub fn log(&self) {
        info!(
            total = self.total,
            conversations = self.conversations,
            missing_ground_truth = self.missing_ground_truth,
            routing_accuracy = ?self.routing_accuracy(),
            judged = self.judged,
            mean_correctness = ?self.mean_correctness,
            mean_relevance = ?self.mean_relevance,
            tokens_input = self.tokens_input,
            tokens_output = self.tokens_output,
            "evaluation summary"
        );
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
