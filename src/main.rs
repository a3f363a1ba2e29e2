//! reqscope: request-scoped context demo
//!
//! Runs a batch of simulated requests through the request dispatcher. Each
//! request stores typed values, fills its data view, registers cleanup
//! actions and a temp file, and works until done or its deadline passes.
//! While they run, the live process table is printed as JSON.
//!
//! Usage:
//!   reqscope                              # 8 requests, 250ms deadline
//!   reqscope --requests 32 --timeout-ms 50
//!   reqscope --max-processes 4            # some requests are rejected
//!   reqscope --verbose --log-file         # debug logs to ~/.reqscope/logs

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use reqscope_context::{Context, ContextExt, ContextKey, background, with_timeout};
use reqscope_process::{ManagerConfig, ProcessManager, process_id_from};
use reqscope_request::{RequestContext, RequestFactory};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USER: ContextKey<String> = ContextKey::new("user");
const ATTEMPT: ContextKey<usize> = ContextKey::new("attempt");

#[derive(Parser, Debug)]
#[command(name = "reqscope", about = "Request-scoped context store demo")]
struct Cli {
    /// Number of concurrent requests to simulate
    #[arg(long, default_value = "8")]
    requests: usize,

    /// Per-request deadline in milliseconds
    #[arg(long, default_value = "250")]
    timeout_ms: u64,

    /// Upper bound on concurrently tracked processes
    #[arg(long)]
    max_processes: Option<usize>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.reqscope/logs/reqscope.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

#[derive(Default)]
struct Tally {
    completed: AtomicUsize,
    timed_out: AtomicUsize,
    cleanups: AtomicUsize,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(ref log_file_arg) = cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(());
    };

    let log_path = if log_file_arg == "DEFAULT" {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(&home).join(".reqscope/logs/reqscope.log")
    } else {
        PathBuf::from(log_file_arg)
    };
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    eprintln!("Logging to {}", log_path.display());
    Ok(())
}

/// One simulated request: the work a handler, a logger and a temp-file
/// owner would each attach to the same request.
async fn handle(
    ctx: Arc<RequestContext>,
    index: usize,
    work: Duration,
    tally: Arc<Tally>,
) -> anyhow::Result<()> {
    let store = ctx.store();
    store.set_value(&USER, format!("user-{index}"));
    store.set_value(&ATTEMPT, 1);

    {
        let mut data = store.data();
        data.insert("title", format!("Request #{index}"));
        data.insert("pid", process_id_from(&ctx).map(|p| p.to_string()));
    }

    let mut scratch = tempfile::NamedTempFile::new().context("creating scratch file")?;
    writeln!(scratch, "scratch for request {index}")?;
    store.add_closer(scratch);

    {
        let tally = tally.clone();
        store.add_cleanup(move || {
            tally.cleanups.fetch_add(1, Ordering::Relaxed);
        });
    }

    tokio::select! {
        _ = tokio::time::sleep(work) => {
            tally.completed.fetch_add(1, Ordering::Relaxed);
            info!(
                "Request {} finished for {}",
                index,
                ctx.get(&USER).map(|u| u.to_string()).unwrap_or_default()
            );
        }
        _ = ctx.done() => {
            tally.timed_out.fetch_add(1, Ordering::Relaxed);
            warn!("Request {} ended early: {:?}", index, ctx.err());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let manager = ProcessManager::new(ManagerConfig {
        max_processes: cli.max_processes,
    });
    let factory = RequestFactory::new(Arc::new(manager.clone()));
    let tally = Arc::new(Tally::default());
    let timeout = Duration::from_millis(cli.timeout_ms);

    println!();
    println!("  reqscope demo");
    println!("  Requests:   {}", cli.requests);
    println!("  Deadline:   {}ms", cli.timeout_ms);
    match cli.max_processes {
        Some(max) => println!("  Max procs:  {max}"),
        None => println!("  Max procs:  unbounded"),
    }
    println!();

    let mut tasks = Vec::with_capacity(cli.requests);
    for index in 0..cli.requests {
        let factory = factory.clone();
        let tally = tally.clone();
        // Every third request works past its deadline.
        let work = if index % 3 == 2 { timeout * 2 } else { timeout / 4 };
        tasks.push(tokio::spawn(async move {
            let (parent, _cancel) = with_timeout(background(), timeout);
            let description = format!("demo-request-{index}");
            factory
                .run(parent, &description, |ctx| handle(ctx, index, work, tally))
                .await
        }));
    }

    tokio::time::sleep(timeout / 8).await;
    let table = serde_json::to_string_pretty(&manager.processes())?;
    println!("  Live processes:");
    println!("{table}");
    println!();

    let mut rejected = 0;
    for task in tasks {
        match task.await.context("request task panicked")? {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Request handler failed: {e:#}"),
            Err(e) => {
                rejected += 1;
                warn!("Request rejected: {e}");
            }
        }
    }

    println!("  Completed:  {}", tally.completed.load(Ordering::Relaxed));
    println!("  Timed out:  {}", tally.timed_out.load(Ordering::Relaxed));
    println!("  Rejected:   {rejected}");
    println!("  Cleanups:   {}", tally.cleanups.load(Ordering::Relaxed));
    println!("  Still live: {}", manager.len());
    println!();
    Ok(())
}
