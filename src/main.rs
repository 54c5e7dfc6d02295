//! Dealer ingestion and match pipeline — worker binary.
//!
//! Runs the full worker fleet (ingest/match/benchmark/insight pools plus
//! the scheduler) as a long-lived daemon, or triggers a one-off manual
//! ingest for operator use.

mod benchmark;
mod classify;
mod coercion;
mod config;
mod connectors;
mod errors;
mod fetcher;
mod hashing;
mod ingest;
mod insight;
mod matcher;
mod models;
mod notify;
mod queue;
mod retry;
mod scheduler;
mod store;

use crate::benchmark::BenchmarkWorker;
use crate::config::Config;
use crate::connectors::ConnectorRegistry;
use crate::fetcher::TransportRegistry;
use crate::ingest::IngestWorker;
use crate::insight::InsightWorker;
use crate::matcher::MatchWorker;
use crate::notify::LoggingNotificationSink;
use crate::queue::redis_queue::RedisJobQueue;
use crate::queue::{Job, JobQueue};
use crate::scheduler::Scheduler;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dealer-pipeline", about = "Dealer ingestion and match pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker fleet and scheduler (default).
    Serve,
    /// Trigger a one-off ingest for a single feed, bypassing its schedule.
    IngestNow {
        feed_id: String,
        #[arg(long)]
        admin_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.database_path)?);
    let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::connect(&config.queue_redis_url).await?);
    let scheduler = Scheduler::new(store.clone(), queue.clone());

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::IngestNow { feed_id, admin_id } => {
            scheduler.manual_ingest(&feed_id, admin_id).await?;
            info!(feed_id, "manual ingest enqueued");
        }
        Command::Serve => serve(config, store, queue, scheduler).await?,
    }

    Ok(())
}

async fn serve(config: Config, store: Arc<dyn Store>, queue: Arc<dyn JobQueue>, scheduler: Scheduler) -> Result<()> {
    let transports = Arc::new(TransportRegistry::new(Duration::from_secs(config.fetch_timeout_secs)));
    let connectors = Arc::new(ConnectorRegistry::default());
    let notifier = Arc::new(LoggingNotificationSink);

    let ingest_worker = Arc::new(IngestWorker::new(
        store.clone(),
        transports,
        connectors,
        queue.clone(),
        notifier,
    ));
    let match_worker = Arc::new(MatchWorker::new(store.clone(), queue.clone()).await?);
    let benchmark_worker = Arc::new(BenchmarkWorker::new(store.clone(), queue.clone()));
    let insight_worker = Arc::new(InsightWorker::new(store.clone()));

    let scheduler = Arc::new(scheduler);
    let mut tasks = JoinSet::new();

    spawn_pool(&mut tasks, "ingest", queue.clone(), config.ingest_concurrency, move |job| {
        let worker = ingest_worker.clone();
        async move {
            if let Job::Ingest(job) = job {
                worker.run_job(job).await
            } else {
                Ok(())
            }
        }
    });

    spawn_pool(&mut tasks, "match", queue.clone(), config.match_concurrency, move |job| {
        let worker = match_worker.clone();
        async move {
            if let Job::MatchBatch(job) = job {
                worker.run_batch(&job).await
            } else {
                Ok(())
            }
        }
    });

    spawn_pool(&mut tasks, "benchmark", queue.clone(), config.benchmark_concurrency, move |job| {
        let worker = benchmark_worker.clone();
        async move {
            if let Job::Benchmark(job) = job {
                worker.run_batch(&job).await
            } else {
                Ok(())
            }
        }
    });

    spawn_pool(&mut tasks, "insight", queue.clone(), config.insight_concurrency, move |job| {
        let worker = insight_worker.clone();
        async move {
            if let Job::Insight(job) = job {
                worker.run_many(&job.canonical_sku_ids).await
            } else {
                Ok(())
            }
        }
    });

    let scheduler_handle = scheduler.clone();
    tasks.spawn(async move {
        let mut feed_ticker = tokio::time::interval(Duration::from_secs(5 * 60));
        let mut benchmark_ticker = tokio::time::interval(Duration::from_secs(2 * 60 * 60));
        loop {
            tokio::select! {
                _ = feed_ticker.tick() => {
                    if let Err(err) = scheduler_handle.feed_tick().await {
                        error!(error = %err, "scheduler feed tick failed");
                    }
                }
                _ = benchmark_ticker.tick() => {
                    if let Err(err) = scheduler_handle.benchmark_tick().await {
                        error!(error = %err, "scheduler benchmark tick failed");
                    }
                }
                _ = shutdown_signal() => {
                    info!("scheduler shutting down");
                    return Ok(());
                }
            }
        }
    });

    tasks.join_next().await;
    tasks.abort_all();
    Ok(())
}

/// Spawns a worker pool of `concurrency` tasks, each polling `queue_name`
/// for jobs and running `handler` on whatever it dequeues, backing off
/// briefly when the queue is empty.
fn spawn_pool<F, Fut>(
    tasks: &mut JoinSet<Result<()>>,
    queue_name: &'static str,
    queue: Arc<dyn JobQueue>,
    concurrency: usize,
    handler: F,
) where
    F: Fn(Job) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    for worker_id in 0..concurrency {
        let queue = queue.clone();
        let handler = handler.clone();
        tasks.spawn(async move {
            loop {
                match queue.dequeue(queue_name).await {
                    Ok(Some(job)) => {
                        if let Err(err) = handler(job).await {
                            error!(queue_name, worker_id, error = %err, "job failed");
                        }
                    }
                    Ok(None) => tokio::time::sleep(Duration::from_millis(500)).await,
                    Err(err) => {
                        error!(queue_name, worker_id, error = %err, "dequeue failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "dealer_pipeline=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
