use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use vetcal::clock::SystemClock;
use vetcal::command::{self, CommandError};
use vetcal::config::Config;
use vetcal::engine::{Engine, EngineError};
use vetcal::store::WalStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries results, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    vetcal::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(WalStore::open(&config.wal_path())?);
    tokio::spawn(vetcal::compactor::run_compactor(
        store.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));

    let engine = Engine::with_default_duration(store.clone(), Arc::new(SystemClock), config.default_duration_ms);
    info!("vetcal ready");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  appointments: {}", store.len());
    info!("  default_duration: {} min", config.default_duration_ms / 60_000);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let reply = match command::parse_command(trimmed) {
            Ok(cmd) => {
                let label = cmd.label();
                debug!("executing {label}");
                match command::execute(&engine, cmd).await {
                    Ok(output) => json!({ "ok": output }),
                    Err(e) => engine_error_reply(label, &e),
                }
            }
            Err(e) => command_error_reply(&e),
        };

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    if let Err(e) = store.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("vetcal stopped");
    Ok(())
}

fn engine_error_reply(command: &str, e: &EngineError) -> serde_json::Value {
    json!({
        "error": {
            "command": command,
            "kind": e.kind(),
            "message": e.to_string(),
            "retryable": e.is_retryable(),
        }
    })
}

fn command_error_reply(e: &CommandError) -> serde_json::Value {
    json!({
        "error": {
            "kind": "bad_command",
            "message": e.to_string(),
        }
    })
}
