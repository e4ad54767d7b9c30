//! ferry-cli
//!
//! ローカルファイルを並列・リトライ付きでアップロードするクライアント。
//!
//! ```text
//! ferry-cli <server-url> <file>... [--concurrency N] [--max-attempts N] [--json]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use ferry_core::domain::{SchedulerEvent, TaskId};
use ferry_core::impls::HttpTransport;
use ferry_core::scheduler::{Backoff, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENCY};
use ferry_core::{SchedulerConfig, UploadFile, UploadScheduler};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: ferry-cli <server-url> <file>... [--concurrency N] [--max-attempts N] [--json]";

const CLI_BACKOFF: Backoff = Backoff::Exponential {
    base_ms: 500,
    multiplier: 2.0,
    max_ms: 8_000,
};

#[derive(Debug, PartialEq)]
struct Args {
    server: String,
    files: Vec<PathBuf>,
    concurrency: usize,
    max_attempts: u32,
    json: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Args> {
    let mut positional = Vec::new();
    let mut concurrency = DEFAULT_MAX_CONCURRENCY;
    let mut max_attempts = DEFAULT_MAX_ATTEMPTS;
    let mut json = false;

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--concurrency" | "-c" => {
                let v = it.next().context("--concurrency needs a value")?;
                concurrency = v
                    .parse()
                    .with_context(|| format!("invalid --concurrency: {v}"))?;
            }
            "--max-attempts" => {
                let v = it.next().context("--max-attempts needs a value")?;
                max_attempts = v
                    .parse()
                    .with_context(|| format!("invalid --max-attempts: {v}"))?;
            }
            "--json" => json = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let server = positional.next().context(USAGE)?;
    let files: Vec<PathBuf> = positional.map(PathBuf::from).collect();
    if files.is_empty() {
        bail!("no files given\n{USAGE}");
    }

    Ok(Args {
        server,
        files,
        concurrency,
        max_attempts,
        json,
    })
}

/// Content type by extension. Unknown extensions fall through to
/// `application/octet-stream`, which the server rejects.
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("txt" | "text" | "log") => "text/plain",
        _ => "application/octet-stream",
    }
}

async fn load(path: &Path) -> anyhow::Result<UploadFile> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("cannot stat {}", path.display()))?;
    if !meta.is_file() {
        bail!("{} is not a regular file", path.display());
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadFile::from_path(
        name,
        guess_content_type(path),
        meta.len(),
        path,
    ))
}

fn render(event: &SchedulerEvent, names: &HashMap<TaskId, String>) {
    let name = names
        .get(&event.task_id())
        .map(String::as_str)
        .unwrap_or("?");
    match event {
        SchedulerEvent::Queued { .. } => println!("queued    {name}"),
        SchedulerEvent::Started { attempt, .. } => println!("start     {name} (attempt {attempt})"),
        SchedulerEvent::Progress { percent, .. } => println!("progress  {name} {percent:>3}%"),
        SchedulerEvent::Completed { url, .. } => println!("done      {name} -> {url}"),
        SchedulerEvent::RetryScheduled {
            attempt,
            delay,
            reason,
            ..
        } => println!("retry     {name} after attempt {attempt} in {delay:?}: {reason}"),
        SchedulerEvent::Failed {
            reason,
            retries_left,
            ..
        } => println!("failed    {name} ({retries_left} retries left): {reason}"),
        SchedulerEvent::Removed { .. } => println!("removed   {name}"),
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(load(path).await?);
    }

    let config = SchedulerConfig::default()
        .with_max_concurrency(args.concurrency)
        .with_max_attempts(args.max_attempts)
        .with_backoff(CLI_BACKOFF);
    let transport = HttpTransport::new(&args.server)?;
    let scheduler = UploadScheduler::new(Arc::new(transport), config)?;
    let mut events = scheduler
        .take_events()
        .context("event stream already taken")?;

    scheduler.add(files).context("selection rejected")?;
    let names: HashMap<TaskId, String> = scheduler
        .tasks()
        .into_iter()
        .map(|t| (t.task_id, t.name))
        .collect();
    debug!(tasks = names.len(), server = %args.server, "uploads queued");

    let idle = scheduler.wait_idle();
    tokio::pin!(idle);
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if !args.json {
                    render(&event, &names);
                }
            }
            _ = &mut idle => break,
        }
    }
    while let Ok(event) = events.try_recv() {
        if !args.json {
            render(&event, &names);
        }
    }

    let counts = scheduler.counts();
    if args.json {
        let summary = serde_json::json!({
            "counts": counts,
            "tasks": scheduler.tasks().into_iter().map(|t| serde_json::json!({
                "name": t.name,
                "state": t.state,
                "attempt": t.attempt,
                "url": t.url,
                "error": t.failure().map(|e| e.to_string()),
                "retryable": t.failure().map(|e| e.is_retryable()),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for task in scheduler.tasks() {
            if let Some(err) = task.failure() {
                let hint = if err.is_retryable() { " (transient, gave up)" } else { "" };
                eprintln!("{}: {err}{hint}", task.name);
            }
        }
        println!(
            "{} completed, {} failed of {}",
            counts.completed,
            counts.failed,
            counts.total()
        );
    }
    Ok(counts.failed == 0)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
