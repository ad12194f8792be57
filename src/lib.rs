//! Turn Scorer - scores assistant conversation logs against ground truth.
//!
//! Two daily JSONL logs are joined: routing decisions from the orchestrator
//! and generated answers from the response agent. Each answer becomes one
//! row with its conversation and turn number, whether the expected knowledge
//! source was routed to, and an LLM judge's correctness and relevance scores.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use turn_scorer::{config::Config, pipeline::Evaluator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let evaluator = Evaluator::from_config(Arc::new(config))?;
//!     let run = evaluator
//!         .run(Path::new("response_ids.txt"), Path::new("single_turn.csv"))
//!         .await?;
//!
//!     println!("{} turns evaluated, report: {:?}", run.results.len(), run.report_path);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **logs**: routing/response records and JSONL loading
//! - **ground_truth**: expected answers and sources keyed by question
//! - **correlate**: joins the logs into numbered conversation turns
//! - **judge**: LLM-as-judge scoring behind a narrow trait
//! - **report**: evaluation rows and the CSV report
//! - **pipeline**: runs the stages in order
//! - **server**: background job endpoint with webhook notification

pub mod config;
pub mod correlate;
pub mod error;
pub mod ground_truth;
pub mod judge;
pub mod llm;
pub mod logs;
pub mod pipeline;
pub mod report;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use correlate::{RowSelection, correlate};
pub use error::{EvalError, Result};
pub use ground_truth::{GroundTruth, GroundTruthEntry};
pub use judge::{JudgeBackend, JudgeClient, JudgeScore, LlmJudge};
pub use logs::{ResponseRecord, RoutingRecord};
pub use pipeline::{EvalInputs, EvaluationRun, Evaluator};
pub use report::{EvaluationResult, ReportSummary};
