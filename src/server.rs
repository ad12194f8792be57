//! HTTP job endpoint.
//!
//! `POST /eval` starts an evaluation in the background and answers right
//! away with a job id. When the job finishes, a summary is posted to the
//! caller's webhook.

use crate::error::{EvalError, Result};
use crate::pipeline::Evaluator;
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Body of `POST /eval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub response_id_path: PathBuf,
    /// Falls back to the configured ground truth table.
    #[serde(default)]
    pub ground_truth_path: Option<PathBuf>,
    pub webhook_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Started,
    Success,
    Failed,
}

/// Immediate answer to a job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

/// Summary posted to the webhook once a job ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub job_id: String,
    pub status: JobStatus,
    pub result_file: Option<String>,
    pub total_items: usize,
    pub duration_sec: f64,
    pub error: Option<String>,
}

/// Shared state for handlers.
pub struct AppState {
    pub evaluator: Evaluator,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(evaluator: Evaluator) -> Result<Self> {
        let timeout = Duration::from_secs(evaluator.config().server.webhook_timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { evaluator, http })
    }
}

/// Build the job router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/eval", post(submit_eval))
        .with_state(state)
}

/// Bind and serve until the process stops.
pub async fn serve(state: Arc<AppState>, bind_addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| EvalError::Config(format!("cannot bind {}: {}", bind_addr, e)))?;
    info!("listening on http://{}", bind_addr);

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| EvalError::Http(e.to_string()))
}

async fn health() -> &'static str {
    "ok"
}

async fn submit_eval(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JobRequest>,
) -> Json<JobAccepted> {
    let job_id = Uuid::new_v4().to_string();

    info!(
        job_id = %job_id,
        response_ids = %request.response_id_path.display(),
        ground_truth = ?request.ground_truth_path,
        webhook = %request.webhook_url,
        "received evaluation job"
    );

    let task_state = state.clone();
    let task_job_id = job_id.clone();
    tokio::spawn(async move {
        let payload = execute_job(&task_state.evaluator, &task_job_id, &request).await;
        send_webhook(&task_state.http, &request.webhook_url, &payload).await;
    });

    Json(JobAccepted {
        job_id,
        status: JobStatus::Started,
        message: "Evaluation job is running in background. Webhook will notify when finished."
            .to_string(),
    })
}

/// Run one job to completion and describe the outcome.
pub async fn execute_job(
    evaluator: &Evaluator,
    job_id: &str,
    request: &JobRequest,
) -> WebhookPayload {
    let start = Instant::now();
    let ground_truth = request
        .ground_truth_path
        .clone()
        .unwrap_or_else(|| evaluator.config().paths.ground_truth.clone());

    let outcome = evaluator.run(&request.response_id_path, &ground_truth).await;
    let duration_sec = (start.elapsed().as_secs_f64() * 100.0).round() / 100.0;

    match outcome {
        Ok(run) => {
            info!(job_id, total_items = run.results.len(), duration_sec, "job finished");
            WebhookPayload {
                job_id: job_id.to_string(),
                status: JobStatus::Success,
                result_file: run.report_path.map(|p| p.display().to_string()),
                total_items: run.results.len(),
                duration_sec,
                error: None,
            }
        }
        Err(e) => {
            error!(job_id, error = %e, "job failed");
            WebhookPayload {
                job_id: job_id.to_string(),
                status: JobStatus::Failed,
                result_file: None,
                total_items: 0,
                duration_sec,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Deliver the payload; failures are only logged.
pub async fn send_webhook(http: &reqwest::Client, url: &str, payload: &WebhookPayload) {
    match http.post(url).json(payload).send().await {
        Ok(resp) => info!(job_id = %payload.job_id, status = %resp.status(), "webhook delivered"),
        Err(e) => warn!(job_id = %payload.job_id, error = %e, "webhook delivery failed"),
    }
}
