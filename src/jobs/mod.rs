pub mod queue;

pub use queue::{JobQueue, QueueError};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::crawler::{CrawlEngine, EngineError, EngineOutcome};
use crate::models::{CrawlJobPayload, RunStatus};
use crate::postprocess::PostProcessor;
use crate::storage::{CrawlStore, StoreError};

/// How long one BRPOP waits before the loop re-polls.
const POP_TIMEOUT_SECS: f64 = 5.0;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("crawl run {0} not found")]
    RunNotFound(String),
    #[error("project {0} not found")]
    ProjectNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Consumes crawl jobs and drives each run through its lifecycle:
/// wipe children, RUNNING, BFS, post-processing, terminal status.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<CrawlStore>,
    config: Arc<Config>,
}

impl JobRunner {
    pub fn new(store: Arc<CrawlStore>, config: Arc<Config>) -> Self {
        JobRunner { store, config }
    }

    /// Worker loop: pop jobs and execute them, bounded by the configured
    /// run concurrency. Never returns under normal operation.
    pub async fn run_worker(&self, queue: JobQueue) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_runs));

        loop {
            let payload = match queue.pop(POP_TIMEOUT_SECS).await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pop job from queue");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed; treat it as shutdown.
                Err(_) => return,
            };

            let runner = self.clone();
            let retry_queue = queue.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let run_id = payload.crawl_run_id.clone();
                if let Err(e) = runner.execute(&payload).await {
                    tracing::error!(run_id = %run_id, error = %e, "Crawl job failed");
                    runner.requeue(&retry_queue, payload).await;
                }
            });
        }
    }

    /// Execute one job delivery. Errors have already been recorded on the
    /// run when this returns; the caller only decides whether to retry.
    pub async fn execute(&self, payload: &CrawlJobPayload) -> Result<(), JobError> {
        let run_id = &payload.crawl_run_id;
        let run = self
            .store
            .load_run(run_id)
            .await?
            .ok_or_else(|| JobError::RunNotFound(run_id.clone()))?;

        // A run canceled before dispatch, or a redelivery of a finished
        // job, is acknowledged without side effects.
        if run.status.is_terminal() {
            tracing::info!(
                run_id = %run_id,
                status = run.status.as_str(),
                "Skipping job for terminal run"
            );
            return Ok(());
        }

        let project = self
            .store
            .load_project(&run.project_id)
            .await?
            .ok_or_else(|| JobError::ProjectNotFound(run.project_id.clone()))?;

        tracing::info!(
            run_id = %run_id,
            project_id = %project.id,
            start_url = %project.start_url,
            attempt = payload.attempt,
            "Starting crawl job"
        );

        match self.crawl(run_id, &run.settings, &project).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                if let Err(inner) = self.store.set_last_error(run_id, &message).await {
                    tracing::error!(run_id = %run_id, error = %inner, "Failed to record error");
                }
                if let Err(inner) = self.store.finish_run(run_id, RunStatus::Failed).await {
                    tracing::error!(run_id = %run_id, error = %inner, "Failed to mark run failed");
                }
                Err(e)
            }
        }
    }

    async fn crawl(
        &self,
        run_id: &str,
        settings: &crate::models::CrawlSettings,
        project: &crate::models::ProjectRecord,
    ) -> Result<(), JobError> {
        // Wipe-on-start makes at-least-once delivery safe.
        self.store.wipe_children(run_id).await?;
        self.store.mark_running(run_id).await?;

        let engine = CrawlEngine::new(
            self.store.clone(),
            project,
            run_id.to_string(),
            settings.clone(),
        );
        let outcome = engine.run().await?;

        // Re-read the persisted status: a cancellation may have landed
        // during the final pages of the loop.
        let status = self.store.read_run_status(run_id).await?;
        if outcome == EngineOutcome::Canceled || status == Some(RunStatus::Canceled) {
            tracing::info!(run_id = %run_id, "Run canceled, skipping post-processing");
            return Ok(());
        }

        let totals = PostProcessor::new(self.store.clone(), run_id.to_string())
            .run()
            .await?;
        self.store.finish_run(run_id, RunStatus::Done).await?;

        tracing::info!(
            run_id = %run_id,
            pages = totals.pages_count,
            issues = totals.issue_count_total,
            "Crawl job complete"
        );
        Ok(())
    }

    /// Push a failed job back with a bumped attempt counter, up to the
    /// configured limit, after a linear backoff.
    async fn requeue(&self, queue: &JobQueue, mut payload: CrawlJobPayload) {
        payload.attempt += 1;
        if payload.attempt >= self.config.max_job_attempts {
            tracing::error!(
                run_id = %payload.crawl_run_id,
                attempts = payload.attempt,
                "Job exhausted its retries"
            );
            return;
        }

        let backoff = self.config.retry_backoff_secs * payload.attempt as u64;
        tokio::time::sleep(Duration::from_secs(backoff)).await;

        if let Err(e) = queue.push(&payload).await {
            tracing::error!(run_id = %payload.crawl_run_id, error = %e, "Failed to requeue job");
        } else {
            tracing::info!(
                run_id = %payload.crawl_run_id,
                attempt = payload.attempt,
                "Job requeued"
            );
        }
    }
}
