use anyhow::{bail, Context};
use clap::Parser;
use ladderfill::adapters::FuturesRestClient;
use ladderfill::cli::{self, Cli, Commands};
use ladderfill::config::{AppConfig, LoggingConfig};
use ladderfill::execution::ExecutionEngine;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("failed to load configuration from {}", cli.config_dir.display()))?;
    let _log_guard = init_logging(&config.logging);

    if let Commands::Check = cli.command {
        print_json(&cli::check(&config))?;
        return Ok(ExitCode::SUCCESS);
    }

    if let Err(problems) = config.validate() {
        bail!("invalid configuration: {}", problems.join("; "));
    }

    let client = FuturesRestClient::from_config(&config.exchange)
        .context("failed to build exchange client")?;
    info!(
        environment = %config.exchange.environment,
        base_url = client.base_url(),
        credentials = client.has_credentials(),
        trading_enabled = config.trading.enabled,
        "exchange client ready"
    );
    if !config.trading.enabled {
        warn!("trading disabled: orders are simulated and account settings are left untouched");
    }

    let engine = ExecutionEngine::from_config(Arc::new(client), &config);
    let default_symbol = config.trading.allowed_symbol.clone();

    match cli.command {
        Commands::Execute { payload, file } => {
            let (output, ok) =
                cli::run_execute(&engine, payload.as_deref(), file.as_ref()).await;
            print_json(&output)?;
            if !ok {
                // Return instead of exiting so the log guard flushes on drop.
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Rules { symbol } => {
            let symbol = symbol.unwrap_or(default_symbol);
            print_json(&cli::show_rules(&engine, &symbol).await?)?;
        }
        Commands::Position { symbol } => {
            let symbol = symbol.unwrap_or(default_symbol);
            print_json(&cli::show_position(&engine, &symbol).await?)?;
        }
        Commands::Check => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Console logs go to stderr so stdout carries only the JSON result.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_directive = if config.level.eq_ignore_ascii_case("info") {
        "info,ladderfill=debug".to_string()
    } else {
        config.level.clone()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let (file_layer, guard) = match config.dir.as_deref().and_then(prepare_log_dir) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(&dir, "ladderfill.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
    });
    let console_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init();

    guard
}

/// `tracing_appender::rolling::daily` panics when it cannot create the first
/// file, so check the directory is writable first.
fn prepare_log_dir(dir: &str) -> Option<String> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Warning: could not create log directory {} ({}), file logging disabled", dir, e);
        return None;
    }
    let probe = std::path::Path::new(dir).join(".ladderfill_write_test");
    match std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            Some(dir.to_string())
        }
        Err(e) => {
            eprintln!("Warning: could not write to log directory {} ({}), file logging disabled", dir, e);
            None
        }
    }
}
