//! Daily JSONL logs written by the orchestrator and the response agent.
//!
//! Both files hold one JSON object per line. A missing file means "no data
//! today" and is not an error.

use crate::config::PathsConfig;
use crate::error::{EvalError, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A routing decision logged by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRecord {
    /// Unique key shared with the response log.
    pub orchestrator_request_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    /// Knowledge sources the orchestrator picked, in order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub selected_sources: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub decision: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
}

/// A generated answer logged by the response agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub response_id: String,
    /// Previous turn in the same conversation; absent or empty starts a new one.
    #[serde(default)]
    pub previous_response_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub orchestrator_request_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assistant_response: String,
}

/// Read an explicit `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ResponseRecord {
    /// Whether this response opens a new conversation.
    pub fn starts_conversation(&self) -> bool {
        self.previous_response_id
            .as_deref()
            .is_none_or(|id| id.is_empty())
    }
}

/// A line that could not be parsed, kept by lenient loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineError {
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

impl LineError {
    fn into_error(self) -> EvalError {
        EvalError::MalformedLogLine {
            path: self.path,
            line: self.line,
            message: self.message,
        }
    }
}

/// Records plus the lines that were skipped.
#[derive(Debug)]
pub struct LoadOutcome<T> {
    pub records: Vec<T>,
    pub errors: Vec<LineError>,
}

impl<T> Default for LoadOutcome<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Paths of the two log files for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyLogFiles {
    pub routing: PathBuf,
    pub responses: PathBuf,
}

/// Resolve the routing and response log files for `date`.
pub fn daily_log_files(paths: &PathsConfig, date: NaiveDate) -> DailyLogFiles {
    let stamp = date.format("%Y-%m-%d");
    DailyLogFiles {
        routing: paths
            .logs_dir
            .join(&paths.routing_subdir)
            .join(format!("routing_{}.jsonl", stamp)),
        responses: paths
            .logs_dir
            .join(&paths.responses_subdir)
            .join(format!("responses_{}.jsonl", stamp)),
    }
}

/// Load a JSONL file, aborting on the first line that fails to parse.
pub fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut records = Vec::new();
    if let Some(err) = parse_lines(path, &mut records, true)?.into_iter().next() {
        return Err(err.into_error());
    }
    Ok(records)
}

/// Load a JSONL file, collecting bad lines instead of failing.
pub fn load_jsonl_lenient<T: DeserializeOwned>(path: &Path) -> Result<LoadOutcome<T>> {
    let mut outcome = LoadOutcome::default();
    outcome.errors = parse_lines(path, &mut outcome.records, false)?;
    Ok(outcome)
}

/// Parse every non-blank line of `path` into `out`. With `stop_at_first`
/// the returned error list holds at most one entry and nothing after it
/// is parsed.
fn parse_lines<T: DeserializeOwned>(
    path: &Path,
    out: &mut Vec<T>,
    stop_at_first: bool,
) -> Result<Vec<LineError>> {
    if !path.exists() {
        info!(path = %path.display(), "log file not found");
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    let mut errors = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str(line) {
            Ok(record) => out.push(record),
            Err(e) => {
                errors.push(LineError {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    message: e.to_string(),
                });
                if stop_at_first {
                    break;
                }
            }
        }
    }

    debug!(path = %path.display(), records = out.len(), bad_lines = errors.len(), "loaded log");
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let records: Vec<RoutingRecord> = load_jsonl(&dir.path().join("nope.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "routing.jsonl",
            r#"{"orchestrator_request_id": "r1", "question": "Q1", "selected_sources": ["docA", "docB"]}


{"orchestrator_request_id": "r2", "question": "Q2", "decision": "search", "extra": 1}
"#,
        );

        let records: Vec<RoutingRecord> = load_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].selected_sources, vec!["docA", "docB"]);
        assert_eq!(records[1].decision, "search");
        assert!(records[1].selected_sources.is_empty());
    }

    #[test]
    fn test_strict_load_fails_on_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "responses.jsonl",
            "{\"response_id\": \"a\"}\nnot json\n{\"response_id\": \"b\"}\n",
        );

        let err = load_jsonl::<ResponseRecord>(&path).unwrap_err();
        match err {
            EvalError::MalformedLogLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_routing_record_requires_key() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "routing.jsonl", "{\"question\": \"Q\"}\n");
        assert!(load_jsonl::<RoutingRecord>(&path).is_err());
    }

    #[test]
    fn test_lenient_load_collects_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "responses.jsonl",
            "{\"response_id\": \"a\"}\n{broken\n{\"response_id\": \"b\"}\n[1,2]\n",
        );

        let outcome = load_jsonl_lenient::<ResponseRecord>(&path).unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[1].response_id, "b");
        let lines: Vec<usize> = outcome.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 4]);
    }

    #[test]
    fn test_starts_conversation() {
        let mut resp = ResponseRecord {
            response_id: "a".to_string(),
            previous_response_id: None,
            orchestrator_request_id: "r".to_string(),
            assistant_response: String::new(),
        };
        assert!(resp.starts_conversation());

        resp.previous_response_id = Some(String::new());
        assert!(resp.starts_conversation());

        resp.previous_response_id = Some("prev".to_string());
        assert!(!resp.starts_conversation());
    }

    #[test]
    fn test_null_previous_response_id() {
        let resp: ResponseRecord =
            serde_json::from_str(r#"{"response_id": "a", "previous_response_id": null}"#).unwrap();
        assert!(resp.previous_response_id.is_none());
    }

    #[test]
    fn test_null_fields_read_as_empty() {
        let resp: ResponseRecord = serde_json::from_str(
            r#"{"response_id": "a", "orchestrator_request_id": null, "assistant_response": null}"#,
        )
        .unwrap();
        assert_eq!(resp.assistant_response, "");
        assert_eq!(resp.orchestrator_request_id, "");

        let routing: RoutingRecord = serde_json::from_str(
            r#"{"orchestrator_request_id": "r1", "question": null, "selected_sources": null,
                "decision": null, "reasoning": null, "model": null}"#,
        )
        .unwrap();
        assert_eq!(routing.orchestrator_request_id, "r1");
        assert_eq!(routing.question, "");
        assert!(routing.selected_sources.is_empty());
        assert_eq!(routing.reasoning, "");
        assert_eq!(routing.model, "");
    }

    #[test]
    fn test_strict_load_accepts_null_fields() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "responses.jsonl",
            "{\"response_id\": \"a\", \"assistant_response\": null}\n{\"response_id\": \"b\"}\n",
        );

        let records = load_jsonl::<ResponseRecord>(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].assistant_response.is_empty());
    }

    #[test]
    fn test_routing_key_may_not_be_null() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "routing.jsonl", "{\"orchestrator_request_id\": null}\n");
        assert!(load_jsonl::<RoutingRecord>(&path).is_err());
    }

    #[test]
    fn test_daily_log_files() {
        let paths = PathsConfig {
            logs_dir: PathBuf::from("logs"),
            ..Default::default()
        };
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let files = daily_log_files(&paths, date);
        assert_eq!(
            files.routing,
            PathBuf::from("logs/orchestrator/routing_2025-03-07.jsonl")
        );
        assert_eq!(
            files.responses,
            PathBuf::from("logs/openai_agent/responses_2025-03-07.jsonl")
        );
    }
}
