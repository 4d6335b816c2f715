//! agentlog - Command-line adapter over the telemetry engine
//!
//! Thin surface for exercising the engine: emit test entries and a demo
//! trace, query persisted entries by criteria, and print agent-state and
//! active-trace snapshots.

use agentlog::config::TelemetryConfig;
use agentlog::entry::{LogLevel, LogSource};
use agentlog::observability::{init_default_logging, init_logging};
use agentlog::query::QueryCriteria;
use agentlog::trace::TraceEngine;
use agentlog::TelemetryLogger;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

/// Structured logging and distributed tracing for multi-agent workflows
#[derive(Parser)]
#[command(name = "agentlog")]
#[command(about = "Multi-agent logging and distributed-tracing engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit test entries (and optionally a demo trace), then flush
    Emit {
        /// Number of test entries per sample agent
        #[arg(long, default_value_t = 3)]
        count: usize,
        /// Also run a demo trace through its full lifecycle
        #[arg(long)]
        trace: bool,
    },
    /// Query persisted entries by criteria
    Query {
        /// Exact level match (error|warn|info|debug|trace)
        #[arg(long)]
        level: Option<String>,
        /// Substring match on the source
        #[arg(long)]
        source: Option<String>,
        /// Substring match on the message
        #[arg(long)]
        message: Option<String>,
        /// Agent name matched against the source
        #[arg(long)]
        agent: Option<String>,
        /// Inclusive lower bound, RFC 3339
        #[arg(long)]
        since: Option<String>,
        /// Inclusive upper bound, RFC 3339
        #[arg(long)]
        until: Option<String>,
    },
    /// Print agent-state snapshots
    Agents,
    /// Print active traces
    Traces,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = load_configuration(&cli.config);
    match std::env::var("LOG_FORMAT") {
        Ok(_) => init_default_logging(),
        Err(_) => init_logging(tracing::Level::INFO, config.format),
    }

    let result = match cli.command {
        Commands::Emit { count, trace } => run_emit(config, count, trace).await,
        Commands::Query {
            level,
            source,
            message,
            agent,
            since,
            until,
        } => run_query(config, level, source, message, agent, since, until).await,
        Commands::Agents => run_agents(config).await,
        Commands::Traces => run_traces(config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: &Option<PathBuf>) -> TelemetryConfig {
    match config_path {
        Some(path) => match TelemetryConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => {
            let default_paths = ["agentlog.toml", "config/agentlog.toml"];
            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    match TelemetryConfig::load_from_file(&path) {
                        Ok(config) => return config,
                        Err(e) => {
                            eprintln!("Failed to load configuration from {path_str}: {e}");
                            process::exit(1);
                        }
                    }
                }
            }
            TelemetryConfig::default()
        }
    }
}

const SAMPLE_AGENTS: &[&str] = &["frontend-developer", "backend-developer", "qa-engineer"];

async fn run_emit(
    config: TelemetryConfig,
    count: usize,
    with_trace: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let logger = TelemetryLogger::new(config)?;
    let engine = TraceEngine::new(logger.clone());

    info!(session_id = %logger.session_id(), "Emitting test entries");

    for i in 0..count {
        for agent in SAMPLE_AGENTS {
            logger
                .log_agent_action(agent, &format!("test-action-{i}"), json!({"iteration": i}))
                .await;
        }
        logger
            .info(
                LogSource::Coordination,
                &format!("coordination checkpoint {i}"),
                json!({"iteration": i}),
            )
            .await;
    }
    engine
        .communicate(
            "frontend-developer",
            "backend-developer",
            "request",
            json!({"endpoint": "/login"}),
            None,
        )
        .await;

    if with_trace {
        let trace_id = engine
            .start_trace(None, "demo-checkout", json!({"cart_size": 2}))
            .await;
        if let Some(span_id) = engine
            .add_span(trace_id, "validate-cart", "backend-developer", json!({}))
            .await
        {
            engine
                .add_span_event(trace_id, span_id, "validation-started", json!({}))
                .await;
            engine.end_span(trace_id, span_id, json!({"ok": true})).await;
        }
        engine.end_trace(trace_id, json!({"success": true})).await;
    }

    for state in logger.agent_states().await {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }

    engine.shutdown().await;
    logger.shutdown().await;
    info!("Emit complete");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_query(
    config: TelemetryConfig,
    level: Option<String>,
    source: Option<String>,
    message: Option<String>,
    agent: Option<String>,
    since: Option<String>,
    until: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let logger = TelemetryLogger::new(config)?;

    let mut criteria = QueryCriteria::new();
    if let Some(level) = level {
        criteria = criteria.level(LogLevel::parse(&level));
    }
    if let Some(source) = source {
        criteria = criteria.source_contains(source);
    }
    if let Some(message) = message {
        criteria = criteria.message_contains(message);
    }
    if let Some(agent) = agent {
        criteria = criteria.agent_name(agent);
    }
    if let Some(since) = since {
        criteria = criteria.since(parse_timestamp(&since)?);
    }
    if let Some(until) = until {
        criteria = criteria.until(parse_timestamp(&until)?);
    }

    let results = logger.query(&criteria).await;
    for entry in &results {
        println!("{}", serde_json::to_string(entry)?);
    }
    info!(matched = results.len(), "Query complete");
    Ok(())
}

async fn run_agents(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let logger = TelemetryLogger::new(config)?;
    let states = logger.agent_states().await;
    if states.is_empty() {
        println!("No agent state recorded in this session.");
    }
    for state in states {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}

async fn run_traces(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let logger = TelemetryLogger::new(config)?;
    let engine = TraceEngine::new(logger);
    let traces = engine.active_traces().await;
    if traces.is_empty() {
        println!("No active traces in this session.");
    }
    for trace in traces {
        println!("{}", serde_json::to_string_pretty(&trace)?);
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
