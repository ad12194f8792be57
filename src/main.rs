//! Turn Scorer CLI
//!
//! Evaluates a day of assistant logs once, or serves the job endpoint.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::EnvFilter;
use turn_scorer::{
    config::Config,
    judge::{JudgeBackend, LlmJudge},
    pipeline::Evaluator,
    server::{self, AppState},
};

/// Turn Scorer - routing and answer-quality evaluation of assistant logs
#[derive(Parser)]
#[command(name = "turn-scorer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one day of logs and write the CSV report
    Run {
        /// File with one response id per line
        #[arg(short, long)]
        response_ids: PathBuf,

        /// Ground truth CSV (Question, Answers, Source_Name)
        #[arg(short, long)]
        ground_truth: Option<PathBuf>,

        /// Day whose logs to evaluate (YYYY-MM-DD, default today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Skip the judge model
        #[arg(long)]
        no_judge: bool,
    },

    /// Serve the background job endpoint
    Serve {
        /// Address to bind (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Send one judge request to check credentials and model
    TestJudge,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            response_ids,
            ground_truth,
            date,
            no_judge,
        } => cmd_run(config, response_ids, ground_truth, date, no_judge).await,
        Commands::Serve { bind } => cmd_serve(config, bind).await,
        Commands::TestJudge => cmd_test_judge(config).await,
    }
}

async fn cmd_run(
    mut config: Config,
    response_ids: PathBuf,
    ground_truth: Option<PathBuf>,
    date: Option<NaiveDate>,
    no_judge: bool,
) -> Result<()> {
    if no_judge {
        config.judge.enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    let ground_truth = ground_truth.unwrap_or_else(|| config.paths.ground_truth.clone());
    let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
    let evaluator = Evaluator::from_config(Arc::new(config)).context("Failed to build judge")?;

    let start = Instant::now();
    let run = evaluator
        .run_for_date(&response_ids, &ground_truth, date)
        .await
        .context("Evaluation failed")?;

    let summary = run.summary();
    println!("Evaluation for {}", date);
    println!("{}", "─".repeat(40));
    println!("  Turns:            {}", summary.total);
    println!("  Conversations:    {}", summary.conversations);
    println!("  No ground truth:  {}", summary.missing_ground_truth);
    if let Some(accuracy) = summary.routing_accuracy() {
        println!(
            "  Routing accuracy: {:.1}% ({}/{})",
            accuracy * 100.0,
            summary.routing_correct,
            summary.routing_known
        );
    }
    if let Some(c) = summary.mean_correctness {
        println!("  Correctness:      {:.2}/5", c);
    }
    if let Some(r) = summary.mean_relevance {
        println!("  Relevance:        {:.2}/5", r);
    }
    if !run.parse_errors.is_empty() {
        println!("  Skipped lines:    {}", run.parse_errors.len());
    }
    match &run.report_path {
        Some(path) => println!("  Report:           {}", path.display()),
        None => println!("  Report:           (nothing written)"),
    }
    println!("  Elapsed:          {:.2?}", start.elapsed());

    Ok(())
}

async fn cmd_serve(config: Config, bind: Option<String>) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let bind = bind.unwrap_or_else(|| config.server.bind_addr.clone());

    let evaluator = Evaluator::from_config(Arc::new(config)).context("Failed to build judge")?;
    let state = Arc::new(AppState::new(evaluator).context("Failed to build HTTP client")?);

    server::serve(state, &bind).await.context("Server stopped")?;
    Ok(())
}

async fn cmd_test_judge(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    println!("Judge configuration:");
    println!("  API Base:  {}", config.judge.api_base);
    println!("  Model:     {}", config.judge.model);
    let key_prefix: String = config.judge.api_key.chars().take(8).collect();
    println!("  API Key:   {}...", key_prefix);
    println!();

    let judge = LlmJudge::from_config(config.judge).context("Failed to build judge")?;
    let score = judge
        .judge(
            "What is the capital of France?",
            "Paris is the capital of France.",
            "The capital of France is Paris.",
        )
        .await
        .context("Judge request failed")?;

    println!("Correctness: {:?}", score.correctness);
    println!("Relevance:   {:?}", score.relevance);
    println!(
        "Tokens:      {:?} in / {:?} out",
        score.usage_input, score.usage_output
    );

    Ok(())
}
