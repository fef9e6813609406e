use hydrafrog_crawler::{
    config::Config,
    jobs::{JobQueue, JobRunner},
    storage::CrawlStore,
};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing with RUST_LOG env filter (defaults to "info")
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration from environment variables
    let config =
        Arc::new(Config::from_env().expect("Failed to load configuration from environment"));

    let store = Arc::new(
        CrawlStore::connect(&config.database_url)
            .await
            .expect("Failed to open crawl store"),
    );

    let queue = JobQueue::connect(&config.redis_url, &config.queue_key)
        .await
        .expect("Failed to connect to job queue");

    tracing::info!(
        queue_key = %config.queue_key,
        max_concurrent_runs = config.max_concurrent_runs,
        "Crawler worker starting"
    );

    let runner = JobRunner::new(store, config);
    runner.run_worker(queue).await;
}
