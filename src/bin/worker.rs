//! `crawlplane-worker` binary: runs the worker loop (C10) against the
//! durable job queue to completion. Thin by design (§6) — all decision
//! logic lives in `crawlplane::worker_loop`.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlplane::config::Settings;
use crawlplane::http_fetcher::{HttpFetcher, ReqwestFetcher};
use crawlplane::kv::{KvStore, RedisStore};
use crawlplane::queue::{AmqpQueue, DurableQueue};
use crawlplane::repository::{
    CrawlJobRepository, DbPool, DeadLetterQueueRepository, RetryHistoryRepository,
    RetryPolicyRepository, WebsiteRepository,
};
use crawlplane::worker_loop::WorkerLoop;

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
    let crawl_jobs = CrawlJobRepository::new(pool.clone());
    let websites = WebsiteRepository::new(pool.clone());
    let retry_policies = RetryPolicyRepository::new(pool.clone());
    let retry_history = RetryHistoryRepository::new(pool.clone());
    let dlq = DeadLetterQueueRepository::new(pool);

    retry_policies.seed_defaults().await?;

    let queue: Arc<dyn DurableQueue> = Arc::new(
        AmqpQueue::connect(
            &settings.amqp_url,
            &settings.stream_name,
            &settings.consumer_name,
        )
        .await?,
    );
    let kv: Arc<dyn KvStore> = Arc::new(RedisStore::connect(&settings.redis_url).await?);
    let fetcher: Arc<dyn HttpFetcher> = Arc::new(ReqwestFetcher::new(settings.http_request_timeout)?);

    let worker = WorkerLoop::new(
        queue,
        crawl_jobs,
        websites,
        retry_policies,
        retry_history,
        dlq,
        kv,
        fetcher,
        settings.url_dedup_ttl,
        settings.http_request_timeout,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

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
