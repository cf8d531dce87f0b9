use anyhow::{Context, Result, bail};
use chrono::Utc;
use offline_store::{
    init_logging, AppConfig, AppError, SqliteStorage, StorageEngine, SyncQueue, SyncQueueItem,
    SyncQueueStats,
};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
struct CliOptions {
    output: Option<PathBuf>,
    pretty: bool,
    limit: Option<u32>,
    max_retry: Option<u32>,
    database_url: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct QueueReport {
    generated_at_ms: i64,
    database_url: String,
    max_retry: u32,
    limit: u32,
    stats: SyncQueueStats,
    total: u64,
    pending_count: usize,
    pending: Vec<SyncQueueItem>,
}

fn usage() -> &'static str {
    "Usage: sync_queue_report [--database-url <url>] [--limit <n>] [--max-retry <n>] [--output <path>] [--pretty]"
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args.into_iter())?;

    init_logging();

    let mut config = AppConfig::from_env();
    if let Some(url) = &options.database_url {
        config.database.url = url.clone();
    }
    if let Some(max_retry) = options.max_retry {
        config.sync.max_retry = max_retry;
    }
    config.validate().map_err(AppError::ConfigurationError)?;

    let rt = Runtime::new().context("Failed to create Tokio runtime")?;
    let report = rt.block_on(async {
        collect_report(&config, options.limit)
            .await
            .with_context(|| format!("Failed to read sync queue from {}", config.database.url))
    })?;

    let payload = to_json(&report, options.pretty)?;
    emit_payload(options.output.as_deref(), &payload)
}

/// Without an explicit limit the report covers one replay batch.
async fn collect_report(config: &AppConfig, limit: Option<u32>) -> Result<QueueReport> {
    let storage = Arc::new(SqliteStorage::from_config(&config.database));
    storage.initialize().await.map_err(AppError::from)?;

    let queue = SyncQueue::from_config(storage.clone(), &config.sync);
    let limit = limit.unwrap_or(queue.batch_size());
    let collected = async {
        let stats = queue.stats().await?;
        let pending = queue.pending(Some(limit)).await?;
        Ok::<_, AppError>((stats, pending))
    }
    .await;
    storage.close().await;
    let (stats, pending) = collected?;

    Ok(build_report(
        config.database.url.clone(),
        queue.max_retry(),
        limit,
        stats,
        pending,
    ))
}

fn build_report(
    database_url: String,
    max_retry: u32,
    limit: u32,
    stats: SyncQueueStats,
    pending: Vec<SyncQueueItem>,
) -> QueueReport {
    QueueReport {
        generated_at_ms: Utc::now().timestamp_millis(),
        database_url,
        max_retry,
        limit,
        total: stats.total(),
        stats,
        pending_count: pending.len(),
        pending,
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn emit_payload(target: Option<&Path>, payload: &str) -> Result<()> {
    if let Some(path) = target {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        fs::write(path, payload).with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Report written to {}", path.display());
    } else {
        println!("{payload}");
    }
    Ok(())
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut output: Option<PathBuf> = None;
    let mut pretty = false;
    let mut limit: Option<u32> = None;
    let mut max_retry: Option<u32> = None;
    let mut database_url: Option<String> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--output requires a path\n{}", usage()))?;
                output = Some(PathBuf::from(path));
            }
            "--pretty" => {
                pretty = true;
            }
            "--limit" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--limit requires a value\n{}", usage()))?;
                limit = Some(parse_positive(&value, "--limit")?);
            }
            "--max-retry" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--max-retry requires a value\n{}", usage()))?;
                max_retry = Some(parse_positive(&value, "--max-retry")?);
            }
            "--database-url" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow::anyhow!("--database-url requires a value\n{}", usage())
                })?;
                database_url = Some(value);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => {
                bail!("Unknown argument: {other}\n{}", usage());
            }
        }
    }

    Ok(CliOptions {
        output,
        pretty,
        limit,
        max_retry,
        database_url,
    })
}

fn parse_positive(value: &str, flag: &str) -> Result<u32> {
    let parsed: u32 = value
        .parse()
        .with_context(|| format!("Invalid {flag} '{value}'. Expected a positive integer."))?;
    if parsed == 0 {
        bail!("{flag} must be greater than 0");
    }
    Ok(parsed)
}
