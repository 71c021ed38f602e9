//! Courier CLI - operator commands against the daemon's JSON-RPC surface

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Courier transfer engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "COURIER_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job now (queued behind any runs already waiting)
    Run {
        job_id: i64,
    },

    /// Show the recent run handles of a job
    Tasks {
        job_id: i64,
    },

    /// Show run log records of a job, newest first
    Logs {
        job_id: i64,

        /// Only records at or after this time (RFC 3339 or epoch ms)
        #[arg(long, value_parser = parse_time)]
        since: Option<i64>,

        /// Only records before this time (RFC 3339 or epoch ms)
        #[arg(long, value_parser = parse_time)]
        until: Option<i64>,

        #[arg(short = 'n', long, default_value = "50")]
        limit: u32,
    },

    /// Reload schedules from the job store (one job, or all)
    Sync {
        job_id: Option<i64>,
    },

    /// Try connecting with a stored credential
    CheckCredential {
        credential_id: i64,
    },

    /// Show daemon status
    Status,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct RunResult {
    handle_id: String,
    submitted_at: i64,
    status: String,
}

#[derive(Deserialize)]
struct TaskHandle {
    id: String,
    submitted_at: i64,
    status: String,
    trigger: String,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "Handle")]
    id: String,
    #[tabled(rename = "Submitted")]
    submitted: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Deserialize)]
struct LogEntry {
    timestamp: i64,
    status: String,
    message: String,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

fn parse_time(value: &str) -> std::result::Result<i64, String> {
    if let Ok(millis) = value.parse::<i64>() {
        return Ok(millis);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.timestamp_millis())
        .map_err(|e| format!("expected RFC 3339 time or epoch milliseconds: {}", e))
}

fn format_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => millis.to_string(),
    }
}

fn colored_status(status: &str) -> String {
    match status.to_ascii_lowercase().as_str() {
        "success" => status.green().to_string(),
        "failure" => status.red().to_string(),
        "warning" | "skipped" => status.yellow().to_string(),
        _ => status.to_string(),
    }
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0",
        method,
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { job_id } => {
            let result = call_rpc(&cli.rpc_url, "job.run.v1", json!({ "job_id": job_id })).await?;
            let run: RunResult = serde_json::from_value(result)?;

            println!("{}", format!("✓ Job {} submitted", job_id).green().bold());
            println!("  {} {}", "Handle:".bold(), run.handle_id);
            println!("  {} {}", "Submitted:".bold(), format_millis(run.submitted_at));
            println!("  {} {}", "Status:".bold(), run.status);
        }

        Commands::Tasks { job_id } => {
            let result = call_rpc(&cli.rpc_url, "job.tasks.v1", json!({ "job_id": job_id })).await?;
            let tasks: Vec<TaskHandle> = serde_json::from_value(result["tasks"].clone())?;

            if tasks.is_empty() {
                println!("{}", format!("No runs recorded for job {}", job_id).yellow());
                return Ok(());
            }
            let rows: Vec<TaskRow> = tasks
                .into_iter()
                .map(|t| TaskRow {
                    id: t.id,
                    submitted: format_millis(t.submitted_at),
                    trigger: t.trigger,
                    status: colored_status(&t.status),
                })
                .collect();
            println!("{}", Table::new(rows));
        }

        Commands::Logs {
            job_id,
            since,
            until,
            limit,
        } => {
            let params = json!({
                "job_id": job_id,
                "since": since,
                "until": until,
                "limit": limit,
            });
            let result = call_rpc(&cli.rpc_url, "job.logs.v1", params).await?;
            let entries: Vec<LogEntry> = serde_json::from_value(result["entries"].clone())?;

            if entries.is_empty() {
                println!("{}", "No log records in range".yellow());
                return Ok(());
            }
            println!("{}", format!("Logs for job {}:", job_id).cyan().bold());
            let rows: Vec<LogRow> = entries
                .into_iter()
                .map(|e| LogRow {
                    time: format_millis(e.timestamp),
                    status: colored_status(&e.status),
                    message: e.message,
                })
                .collect();
            println!("{}", Table::new(rows));
        }

        Commands::Sync { job_id } => {
            let result = call_rpc(&cli.rpc_url, "schedule.sync.v1", json!({ "job_id": job_id })).await?;
            let scheduled = result["scheduled"].as_bool().unwrap_or(false);

            match job_id {
                Some(id) if scheduled => println!("{}", format!("✓ Job {} scheduled", id).green().bold()),
                Some(id) => println!("{}", format!("○ Job {} has no active schedule", id).yellow()),
                None => println!("{}", "✓ Schedules reloaded".green().bold()),
            }
            println!("  {} {}", "Scheduled jobs:".bold(), result["trigger_count"]);
        }

        Commands::CheckCredential { credential_id } => {
            let result = call_rpc(
                &cli.rpc_url,
                "credential.check.v1",
                json!({ "credential_id": credential_id }),
            )
            .await?;
            let message = result["message"].as_str().unwrap_or_default();

            if result["ok"].as_bool().unwrap_or(false) {
                println!("{} {}", "✓".green().bold(), message);
            } else {
                println!("{} {}", "✗".red().bold(), message);
                std::process::exit(1);
            }
        }

        Commands::Status => {
            println!("{}", "Courier Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.status.v1", json!({})).await {
                Ok(status) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), status["version"]);
                    println!();
                    println!("  {} {}", "Scheduled jobs:".bold(), status["scheduled_jobs"]);
                    let next = status["next_fire"].as_str().unwrap_or("-");
                    println!("  {} {}", "Next trigger:".bold(), next);
                    println!("  {} {}", "Queued runs:".bold(), status["queue_depth"]);
                    println!("  {} {}", "Workers:".bold(), status["workers"]);
                    println!("  {} {} seconds", "Uptime:".bold(), status["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
