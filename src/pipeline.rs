//! End-to-end evaluation run: logs → turns → judge → report.

use crate::config::Config;
use crate::correlate::{RowSelection, correlate};
use crate::error::Result;
use crate::ground_truth::{GroundTruth, load_ground_truth, load_response_ids};
use crate::judge::JudgeClient;
use crate::logs::{
    LineError, LoadOutcome, ResponseRecord, RoutingRecord, daily_log_files, load_jsonl,
    load_jsonl_lenient,
};
use crate::report::{EvaluationResult, ReportSummary, report_path, write_report};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything one evaluation needs, already resolved to concrete paths.
#[derive(Debug, Clone)]
pub struct EvalInputs {
    pub routing_file: PathBuf,
    pub response_file: PathBuf,
    pub ground_truth: GroundTruth,
    pub response_ids: Vec<String>,
    pub report_path: PathBuf,
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct EvaluationRun {
    pub results: Vec<EvaluationResult>,
    /// Set when a report file was written.
    pub report_path: Option<PathBuf>,
    /// Skipped log lines (lenient parsing only).
    pub parse_errors: Vec<LineError>,
}

impl EvaluationRun {
    pub fn summary(&self) -> ReportSummary {
        ReportSummary::from_results(&self.results)
    }
}

/// Runs the evaluation pipeline.
///
/// Rows are judged one after another; the judge sits behind [`JudgeClient`]
/// so the correlation and report stages do not depend on how it is called.
#[derive(Clone)]
pub struct Evaluator {
    config: Arc<Config>,
    judge: JudgeClient,
}

impl Evaluator {
    pub fn new(config: Arc<Config>, judge: JudgeClient) -> Self {
        Self { config, judge }
    }

    /// Build an evaluator with the production LLM judge.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let judge = JudgeClient::from_config(&config.judge)?;
        Ok(Self::new(config, judge))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Evaluate today's logs.
    pub async fn run(
        &self,
        response_ids_path: &Path,
        ground_truth_path: &Path,
    ) -> Result<EvaluationRun> {
        let today = chrono::Local::now().date_naive();
        self.run_for_date(response_ids_path, ground_truth_path, today).await
    }

    /// Evaluate the logs of `date`.
    pub async fn run_for_date(
        &self,
        response_ids_path: &Path,
        ground_truth_path: &Path,
        date: NaiveDate,
    ) -> Result<EvaluationRun> {
        let ids_path = response_ids_path.to_path_buf();
        let response_ids = blocking(move || load_response_ids(&ids_path)).await?;
        if response_ids.is_empty() {
            info!(path = %response_ids_path.display(), "no response ids, skipping evaluation");
            return Ok(EvaluationRun::default());
        }

        let gt_path = ground_truth_path.to_path_buf();
        let ground_truth = blocking(move || load_ground_truth(&gt_path)).await?;
        let files = daily_log_files(&self.config.paths, date);

        self.evaluate(EvalInputs {
            routing_file: files.routing,
            response_file: files.responses,
            ground_truth,
            response_ids,
            report_path: report_path(&self.config.paths.report_dir, date),
        })
        .await
    }

    /// Correlate, judge and report on explicitly given inputs.
    pub async fn evaluate(&self, inputs: EvalInputs) -> Result<EvaluationRun> {
        if inputs.response_ids.is_empty() {
            info!("no response ids, skipping evaluation");
            return Ok(EvaluationRun::default());
        }

        let lenient = self.config.pipeline.lenient_log_parsing;
        let routing_file = inputs.routing_file.clone();
        let response_file = inputs.response_file.clone();
        let (routing, responses) = blocking(move || {
            let routing: LoadOutcome<RoutingRecord> = load_log(&routing_file, lenient)?;
            let responses: LoadOutcome<ResponseRecord> = load_log(&response_file, lenient)?;
            Ok((routing, responses))
        })
        .await?;

        let mut parse_errors = routing.errors;
        parse_errors.extend(responses.errors);
        for err in &parse_errors {
            warn!(
                path = %err.path.display(),
                line = err.line,
                error = %err.message,
                "skipped malformed log line"
            );
        }

        let mut results = correlate(
            &routing.records,
            &responses.records,
            &inputs.ground_truth,
            &inputs.response_ids,
            RowSelection::from_filter_flag(self.config.pipeline.filter_rows),
        );

        info!(turns = results.len(), judge_enabled = self.judge.is_enabled(), "scoring turns");
        for result in &mut results {
            let score = self
                .judge
                .score(&result.question, &result.reference_answer, &result.generated_answer)
                .await;
            result.apply_judge(score);
        }

        let target = inputs.report_path;
        let (results, report_path) = blocking(move || {
            let written = write_report(&results, &target)?;
            Ok((results, written))
        })
        .await?;
        let run = EvaluationRun {
            results,
            report_path,
            parse_errors,
        };
        run.summary().log();
        Ok(run)
    }
}

/// Load one log file in the given parsing mode.
fn load_log<T: DeserializeOwned>(path: &Path, lenient: bool) -> Result<LoadOutcome<T>> {
    if lenient {
        load_jsonl_lenient(path)
    } else {
        Ok(LoadOutcome {
            records: load_jsonl(path)?,
            errors: Vec::new(),
        })
    }
}

/// Run file work on the blocking pool so job tasks do not stall the server.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::judge::{JudgeBackend, JudgeScore};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct EchoJudge;

    #[async_trait]
    impl JudgeBackend for EchoJudge {
        async fn judge(&self, _q: &str, reference: &str, generated: &str) -> Result<JudgeScore> {
            let same = reference == generated;
            Ok(JudgeScore {
                correctness: Some(if same { 5 } else { 1 }),
                relevance: Some(4),
                usage_input: Some(50),
                usage_output: Some(8),
            })
        }
    }

    fn evaluator(config: Config) -> Evaluator {
        Evaluator::new(Arc::new(config), JudgeClient::new(Arc::new(EchoJudge), true))
    }

    fn inputs(dir: &TempDir, routing: &str, responses: &str) -> EvalInputs {
        let routing_file = dir.path().join("routing.jsonl");
        let response_file = dir.path().join("responses.jsonl");
        fs::write(&routing_file, routing).unwrap();
        fs::write(&response_file, responses).unwrap();
        EvalInputs {
            routing_file,
            response_file,
            ground_truth: GroundTruth::new(),
            response_ids: vec!["resp1".to_string()],
            report_path: dir.path().join("eval.csv"),
        }
    }

    #[tokio::test]
    async fn test_strict_mode_fails_on_bad_line() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(
            &dir,
            "{\"orchestrator_request_id\": \"r1\"}\n",
            "{\"response_id\": \"resp1\"}\n{oops\n",
        );

        let err = evaluator(Config::default()).evaluate(inputs).await.unwrap_err();
        assert!(matches!(err, EvalError::MalformedLogLine { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_lenient_mode_reports_bad_lines() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(
            &dir,
            "{\"orchestrator_request_id\": \"r1\"}\n",
            "{\"response_id\": \"resp1\", \"orchestrator_request_id\": \"r1\"}\n{oops\n",
        );

        let mut config = Config::default();
        config.pipeline.lenient_log_parsing = true;

        let run = evaluator(config).evaluate(inputs).await.unwrap();
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.parse_errors.len(), 1);
        assert_eq!(run.parse_errors[0].line, 2);
    }

    #[tokio::test]
    async fn test_null_answer_is_not_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(
            &dir,
            "{\"orchestrator_request_id\": \"r1\", \"question\": \"Q1\", \"reasoning\": null}\n",
            "{\"response_id\": \"resp1\", \"orchestrator_request_id\": \"r1\", \"assistant_response\": null}\n",
        );

        let run = evaluator(Config::default()).evaluate(inputs).await.unwrap();
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].generated_answer, "");
        assert_eq!(run.results[0].routing_reasoning, "");
        assert!(run.results[0].judge_score().is_placeholder());
    }

    #[tokio::test]
    async fn test_missing_logs_write_no_report() {
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("eval.csv");
        let run = evaluator(Config::default())
            .evaluate(EvalInputs {
                routing_file: dir.path().join("none_routing.jsonl"),
                response_file: dir.path().join("none_responses.jsonl"),
                ground_truth: GroundTruth::new(),
                response_ids: vec!["resp1".to_string()],
                report_path: report.clone(),
            })
            .await
            .unwrap();

        assert!(run.results.is_empty());
        assert!(run.report_path.is_none());
        assert!(!report.exists());
    }

    #[tokio::test]
    async fn test_run_for_date_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let mut config = Config::default();
        config.paths.logs_dir = dir.path().join("logs");
        config.paths.report_dir = dir.path().join("reports");

        let routing_dir = config.paths.logs_dir.join("orchestrator");
        let response_dir = config.paths.logs_dir.join("openai_agent");
        fs::create_dir_all(&routing_dir).unwrap();
        fs::create_dir_all(&response_dir).unwrap();
        fs::write(
            routing_dir.join("routing_2025-06-01.jsonl"),
            "{\"orchestrator_request_id\": \"r1\", \"question\": \"Q1\", \"selected_sources\": [\"docA\"]}\n",
        )
        .unwrap();
        fs::write(
            response_dir.join("responses_2025-06-01.jsonl"),
            "{\"response_id\": \"resp1\", \"previous_response_id\": null, \"orchestrator_request_id\": \"r1\", \"assistant_response\": \"A1\"}\n",
        )
        .unwrap();

        let ids = dir.path().join("ids.txt");
        fs::write(&ids, "resp1\n").unwrap();
        let gt = dir.path().join("gt.csv");
        fs::write(&gt, "Question,Answers,Source_Name\nQ1,A1,docA\n").unwrap();

        let run = evaluator(config).run_for_date(&ids, &gt, date).await.unwrap();

        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].judge_correctness, Some(5));
        assert_eq!(
            run.report_path,
            Some(dir.path().join("reports").join("eval_2025-06-01.csv"))
        );
    }
}
