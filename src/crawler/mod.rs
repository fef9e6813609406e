pub mod canonical;
pub mod fetcher;
pub mod frontier;
pub mod parser;
pub mod rules;
pub mod signature;

pub use fetcher::{FetchOutcome, Fetcher};
pub use parser::Parser;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    unix_now, CrawlSettings, IssueDraft, LinkRecord, LinkType, PageRecord, ProjectRecord,
    RunStatus,
};
use crate::storage::{CrawlStore, StoreError};
use frontier::Frontier;

/// How often (in loop iterations) the persisted run status is polled for
/// cancellation.
pub const CANCEL_CHECK_INTERVAL: usize = 20;

/// How the BFS loop ended. Cancellation is not an error: the data crawled
/// so far is kept and the run stays CANCELED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    Completed,
    Canceled,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid start URL: {0}")]
    InvalidStartUrl(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Bounded, cancel-aware breadth-first crawler for a single run.
///
/// Runs cooperatively in one task: fetches are sequential and the throttle
/// sleep sits between iterations. Worker-level parallelism across runs is
/// the job runner's concern.
pub struct CrawlEngine {
    fetcher: Fetcher,
    store: Arc<CrawlStore>,
    run_id: String,
    start_url: String,
    domain: String,
    settings: CrawlSettings,
}

impl CrawlEngine {
    pub fn new(
        store: Arc<CrawlStore>,
        project: &ProjectRecord,
        run_id: String,
        settings: CrawlSettings,
    ) -> Self {
        let fetcher = Fetcher::new(settings.timeout_s, &settings.user_agent);
        CrawlEngine {
            fetcher,
            store,
            run_id,
            start_url: project.start_url.clone(),
            domain: project.domain.clone(),
            settings,
        }
    }

    /// Run the BFS loop to completion, a bound, or cancellation.
    pub async fn run(&self) -> Result<EngineOutcome, EngineError> {
        let start = canonical::normalize(&self.start_url, &self.settings.ignore_params)
            .ok_or_else(|| EngineError::InvalidStartUrl(self.start_url.clone()))?;

        let mut frontier = Frontier::new(self.settings.max_pages, self.settings.max_depth);
        frontier.admit(&start, 0);

        let mut iterations: usize = 0;
        let mut processed: u64 = 0;

        loop {
            if iterations % CANCEL_CHECK_INTERVAL == 0
                && self.store.read_run_status(&self.run_id).await? == Some(RunStatus::Canceled)
            {
                tracing::info!(
                    run_id = %self.run_id,
                    pages_processed = processed,
                    "Run canceled, stopping crawl"
                );
                return Ok(EngineOutcome::Canceled);
            }

            let Some(entry) = frontier.next() else {
                break;
            };
            iterations += 1;

            if entry.depth > self.settings.max_depth {
                continue;
            }

            let fetched = self.fetcher.fetch(&entry.url).await;
            if let Some(error) = &fetched.error {
                tracing::warn!(url = %entry.url, error = %error, "Fetch failed");
            }

            let parsed = fetched.html.as_deref().map(Parser::parse);
            let (page, drafts) = self.build_page(&entry.url, &fetched, parsed.as_ref());

            let page_id = match self.store.persist_page(&page, &drafts).await {
                Ok(id) => {
                    processed += 1;
                    Some(id)
                }
                Err(e) => {
                    tracing::error!(url = %entry.url, error = %e, "Failed to persist page");
                    None
                }
            };

            if let Some(parsed) = &parsed {
                self.handle_links(parsed, &fetched.url, page_id, entry.depth, &mut frontier)
                    .await;
            }

            if self.settings.throttle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.throttle_ms)).await;
            }
        }

        tracing::info!(
            run_id = %self.run_id,
            pages_processed = processed,
            admitted = frontier.admitted_count(),
            "Crawl loop finished"
        );
        Ok(EngineOutcome::Completed)
    }

    fn build_page(
        &self,
        normalized_url: &str,
        fetched: &FetchOutcome,
        parsed: Option<&parser::ParsedPage>,
    ) -> (PageRecord, Vec<IssueDraft>) {
        let computed = fetched.html.as_deref().map(signature::compute);

        let page = PageRecord {
            id: Uuid::new_v4().to_string(),
            crawl_run_id: self.run_id.clone(),
            url: fetched.url.clone(),
            normalized_url: normalized_url.to_string(),
            status_code: fetched.status_code,
            content_type: fetched.content_type.clone(),
            title: parsed.and_then(|p| p.title.clone()),
            meta_description: parsed.and_then(|p| p.meta_description.clone()),
            h1_count: parsed.map(|p| p.h1_count).unwrap_or(0),
            canonical: parsed.and_then(|p| p.canonical.clone()),
            robots_meta: parsed.and_then(|p| p.robots_meta.clone()),
            word_count: parsed.map(|p| p.word_count),
            redirect_chain: fetched.redirect_chain.clone(),
            template_signature_hash: computed.as_ref().map(|c| c.hash.clone()),
            template_signature: computed.as_ref().map(|c| c.json.clone()),
            discovered_at: unix_now(),
        };

        let facts = rules::PageFacts {
            status_code: page.status_code,
            redirect_chain_len: page.redirect_chain.len(),
            is_html: parsed.is_some(),
            title: page.title.as_deref(),
            meta_description: page.meta_description.as_deref(),
            h1_count: page.h1_count,
            canonical: page.canonical.as_deref(),
            robots_meta: page.robots_meta.as_deref(),
            word_count: page.word_count,
            images_missing_alt: parsed.map(|p| p.images_missing_alt).unwrap_or(0),
        };
        let drafts = rules::evaluate(&facts);

        (page, drafts)
    }

    /// Resolve, classify and persist the page's outbound links, admitting
    /// internal ones to the frontier at depth + 1.
    async fn handle_links(
        &self,
        parsed: &parser::ParsedPage,
        base_url: &str,
        from_page_id: Option<String>,
        depth: u32,
        frontier: &mut Frontier,
    ) {
        let mut records = Vec::new();

        for href in &parsed.links {
            let Some(resolved) = canonical::resolve(href, base_url) else {
                continue;
            };
            let Some(normalized) =
                canonical::normalize(resolved.as_str(), &self.settings.ignore_params)
            else {
                continue;
            };

            let link_type = if canonical::is_internal(
                &normalized,
                &self.domain,
                self.settings.include_subdomains,
            ) {
                LinkType::Internal
            } else {
                LinkType::External
            };

            records.push(LinkRecord {
                crawl_run_id: self.run_id.clone(),
                from_page_id: from_page_id.clone(),
                to_url: resolved.to_string(),
                to_normalized_url: Some(normalized.clone()),
                link_type,
            });

            // External links are recorded but never enqueued.
            if link_type == LinkType::Internal {
                frontier.admit(&normalized, depth + 1);
            }
        }

        if from_page_id.is_none() || records.is_empty() {
            // Without a source page row there is nothing to attach the
            // edges to; traversal continues regardless.
            return;
        }

        if let Err(e) = self.store.persist_links(&records).await {
            tracing::error!(base_url = %base_url, error = %e, "Failed to persist links");
        }
    }
}
