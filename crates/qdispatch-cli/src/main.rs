//! qdispatch - ワーカーを in-process のアダプタで起動する CLI
//!
//! `qdispatch run [CIRCUIT...]` で worker を立ち上げ、引数の回路を投入して
//! 最終状態を JSON で表示する。`--exit-when-done` が無ければシグナルまで待機。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use qdispatch_core::app::wait_for_shutdown_signal;
use qdispatch_core::domain::{Counts, EngineError, TaskId};
use qdispatch_core::impls::{FnEngine, InMemoryBus, InMemoryTaskStore};
use qdispatch_core::ports::TaskStore;
use qdispatch_core::{AppBuilder, Settings};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(name = "qdispatch", version, about = "Quantum circuit task worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a worker; optionally submit circuits and print their results.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// TOML configuration file.
    #[arg(long, env = "QDISPATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override `worker.max_concurrent_tasks`.
    #[arg(long)]
    max_concurrent_tasks: Option<usize>,

    /// Shots for every circuit given on the command line.
    #[arg(long, default_value_t = 1024, allow_negative_numbers = true)]
    shots: i64,

    /// Stop once every submitted circuit reached a final state.
    #[arg(long)]
    exit_when_done: bool,

    /// Keep tasks in Redis at `store.url` instead of in memory.
    #[cfg(feature = "redis")]
    #[arg(long)]
    redis: bool,

    /// Circuits to submit after startup.
    circuits: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Stand-in engine: every shot measures the all-zero state.
fn ground_state(_circuit: &str, shots: u32) -> Result<Counts, EngineError> {
    Ok(Counts::from([("0".to_string(), u64::from(shots))]))
}

fn task_store(args: &RunArgs, settings: &Settings) -> Result<Arc<dyn TaskStore>> {
    #[cfg(feature = "redis")]
    if args.redis {
        let store = qdispatch_core::impls::RedisTaskStore::new(
            &settings.store.url,
            settings.store.key_prefix.clone(),
        )?;
        return Ok(Arc::new(store));
    }
    let _ = (args, settings);
    Ok(Arc::new(InMemoryTaskStore::new()))
}

async fn run(args: RunArgs) -> Result<()> {
    let mut settings = Settings::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(n) = args.max_concurrent_tasks {
        settings.worker.max_concurrent_tasks = n;
    }
    init_tracing(&settings.logging.level);

    let store = task_store(&args, &settings)?;
    let subject = settings.bus.subject.clone();
    let bus = Arc::new(InMemoryBus::with_buffer(settings.bus.subscription_buffer));
    let app = Arc::new(
        AppBuilder::new()
            .settings(settings)
            .store(store)
            .bus(bus.clone())
            .engine(Arc::new(FnEngine::new(ground_state)))
            .build()
            .context("building worker")?,
    );

    let (done_tx, done_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn({
        let app = Arc::clone(&app);
        async move {
            app.run_until(async move {
                tokio::select! {
                    Ok(()) = done_rx => info!("all submitted tasks finished"),
                    result = wait_for_shutdown_signal() => {
                        if let Err(e) = result {
                            error!(error = %e, "signal handling failed; shutting down");
                        }
                    }
                }
            })
            .await
        }
    });

    // in-memory バスは購読者がいないと捨てるので、購読を待ってから投入する
    while bus.subscriber_count(&subject) == 0 && !worker.is_finished() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let submitter = app.submitter();
    let mut submitted: Vec<TaskId> = Vec::new();
    for circuit in &args.circuits {
        match submitter.submit(circuit.clone(), args.shots).await {
            Ok(receipt) => {
                if !receipt.notified {
                    warn!(task_id = %receipt.task_id, "task stored but not announced");
                }
                submitted.push(receipt.task_id);
            }
            Err(e) => error!(circuit = %circuit, error = %e, "submission rejected"),
        }
    }

    let retriever = app.retriever();
    for task_id in submitted {
        loop {
            match retriever.get(&task_id).await? {
                Some(task) if task.status.is_terminal() => {
                    println!("{}", serde_json::to_string_pretty(&task)?);
                    break;
                }
                _ if worker.is_finished() => break,
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    if args.exit_when_done {
        let _ = done_tx.send(());
    } else {
        info!("serving until a termination signal arrives");
    }

    let report = worker.await.context("worker task panicked")??;
    info!(
        drained = report.drained,
        abandoned = report.abandoned.len(),
        "worker stopped"
    );
    Ok(())
}
