//! `crawlplane-scheduler` binary: runs the scheduled-job processor (C8)
//! to completion. Thin by design (§6 "CLI/env surface (thin, not the
//! core)") — all decision logic lives in `crawlplane::scheduled_job_processor`.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlplane::config::Settings;
use crawlplane::queue::AmqpQueue;
use crawlplane::repository::{CrawlJobRepository, DbPool, ScheduledJobRepository, WebsiteRepository};
use crawlplane::scheduled_job_processor::ScheduledJobProcessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawlplane=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let pool = DbPool::new(&settings.database_url, settings.database_pool_size)?;
    let scheduled_jobs = ScheduledJobRepository::new(pool.clone());
    let websites = WebsiteRepository::new(pool.clone());
    let crawl_jobs = CrawlJobRepository::new(pool);

    let queue: Arc<dyn crawlplane::queue::DurableQueue> = Arc::new(
        AmqpQueue::connect(
            &settings.amqp_url,
            &settings.stream_name,
            &settings.consumer_name,
        )
        .await?,
    );

    let processor = ScheduledJobProcessor::new(
        scheduled_jobs,
        websites,
        crawl_jobs,
        queue,
        settings.scheduler_poll_interval,
        settings.scheduler_batch_size,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    processor.run(shutdown_rx).await;
    Ok(())
}

/// §5 "the idiomatic Rust replacement for the Python global `_shutdown`
/// flag + `signal.signal()` pair".
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
