use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::domain::TradeRequest;
use crate::error::{LadderError, Result};
use crate::execution::ExecutionEngine;

/// Limit-ladder order execution for USDⓈ-M futures
#[derive(Parser, Debug)]
#[command(name = "ladderfill")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", env = "LADDERFILL_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one trade request and print the outcome as JSON
    Execute {
        /// Inline JSON payload
        #[arg(short, long, conflicts_with = "file")]
        payload: Option<String>,
        /// Read the JSON payload from a file ("-" for stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Show tick size, step size and minimum quantity for a symbol
    Rules {
        /// Defaults to the allowed symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Show the signed position amount for a symbol
    Position {
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Validate configuration and report which credentials are present
    Check,
}

/// Load the trade payload from `--payload`, `--file` or stdin.
pub fn read_payload(payload: Option<&str>, file: Option<&PathBuf>) -> Result<String> {
    if let Some(payload) = payload {
        return Ok(payload.to_string());
    }
    match file {
        Some(path) if path.as_os_str() == "-" => read_stdin(),
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            LadderError::InvalidRequest(format!("cannot read {}: {}", path.display(), e))
        }),
        None => read_stdin(),
    }
}

fn read_stdin() -> Result<String> {
    use std::io::Read;

    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| LadderError::InvalidRequest(format!("cannot read stdin: {}", e)))?;
    Ok(buf)
}

/// `execute` command: read the payload, run it, and render the outcome.
///
/// Unreadable input is reported the same way as any other rejected request.
pub async fn run_execute(
    engine: &ExecutionEngine,
    payload: Option<&str>,
    file: Option<&PathBuf>,
) -> (Value, bool) {
    match read_payload(payload, file) {
        Ok(payload) => execute(engine, &payload).await,
        Err(e) => {
            error!(kind = ?e.kind(), error = %e, "cannot read trade payload");
            (e.report().to_json(), false)
        }
    }
}

/// Run one execution and render either the result or an error report.
///
/// Returns the JSON document and whether execution succeeded.
pub async fn execute(engine: &ExecutionEngine, payload: &str) -> (Value, bool) {
    let outcome = match TradeRequest::from_json(payload) {
        Ok(request) => engine.execute_trade(&request).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(result) => {
            info!(ignored = result.is_ignored(), "execution finished");
            match serde_json::to_value(&result) {
                Ok(value) => (value, true),
                Err(e) => (LadderError::from(e).report().to_json(), false),
            }
        }
        Err(e) => {
            error!(kind = ?e.kind(), error = %e, "execution failed");
            (e.report().to_json(), false)
        }
    }
}

pub async fn show_rules(engine: &ExecutionEngine, symbol: &str) -> Result<Value> {
    let symbol = symbol.trim().to_uppercase();
    let rules = engine.rules().get_rules(&symbol).await?;
    Ok(json!({
        "symbol": symbol,
        "tick_size": rules.tick_size,
        "step_size": rules.step_size,
        "min_qty": rules.min_qty,
    }))
}

pub async fn show_position(engine: &ExecutionEngine, symbol: &str) -> Result<Value> {
    let symbol = symbol.trim().to_uppercase();
    let position = engine.positions().get_position(&symbol).await?;
    Ok(json!({
        "symbol": position.symbol,
        "amount": position.amount,
        "closing_side": position.closing_side(),
    }))
}

/// Summarize effective settings. Credentials are reported by presence only.
pub fn check(config: &AppConfig) -> Value {
    let (key_var, secret_var) = config.exchange.environment.credential_vars();
    let present = |var: &str| std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false);
    let problems = config.validate().err().unwrap_or_default();

    json!({
        "environment": config.exchange.environment.to_string(),
        "base_url": config.exchange.base_url(),
        "allowed_symbol": config.trading.allowed_symbol,
        "trading_enabled": config.trading.enabled,
        "leverage": config.trading.leverage,
        "margin_type": config.trading.margin_type.as_str(),
        "tick_offsets": config.ladder.tick_offsets,
        "wait_per_attempt_ms": config.ladder.wait_per_attempt_ms,
        "credentials": {
            key_var: present(key_var),
            secret_var: present(secret_var),
        },
        "valid": problems.is_empty(),
        "problems": problems,
    })
}
