//! Post-crawl aggregation: broken-link resolution, run totals, cross-page
//! issues and template clustering.
//!
//! Runs once, strictly after the BFS loop returns, and never for canceled
//! runs.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::crawler::rules;
use crate::models::{ErrorPageEntry, IssueDraft, IssueSeverity, IssueTypeCount, RunTotals};
use crate::storage::{CrawlStore, PageSummary, StoreError};

/// Number of entries kept in the top-error-pages and top-issue-types lists.
const TOP_LIST_LEN: usize = 10;

/// Example URLs carried in duplicate-title evidence.
const DUPLICATE_TITLE_EXAMPLES: usize = 5;

pub struct PostProcessor {
    store: Arc<CrawlStore>,
    run_id: String,
}

impl PostProcessor {
    pub fn new(store: Arc<CrawlStore>, run_id: String) -> Self {
        PostProcessor { store, run_id }
    }

    /// Execute every aggregation pass, persist the totals on the run, and
    /// return them.
    pub async fn run(&self) -> Result<RunTotals, StoreError> {
        let pages = self.store.load_page_summaries(&self.run_id).await?;

        self.resolve_broken_links(&pages).await?;
        self.emit_duplicate_title_issues(&pages).await?;
        self.cluster_templates(&pages).await?;

        let mut totals = self.compute_link_totals(&pages).await?;
        self.merge_issue_summary(&mut totals).await?;

        self.store.update_run_totals(&self.run_id, &totals).await?;

        tracing::info!(
            run_id = %self.run_id,
            pages = totals.pages_count,
            links = totals.links_count,
            issues = totals.issue_count_total,
            "Post-processing complete"
        );
        Ok(totals)
    }

    /// Mark internal links whose crawled target answered with an error
    /// status. Targets that were never visited are left untouched: the
    /// engine reports only what it fetched.
    async fn resolve_broken_links(&self, pages: &[PageSummary]) -> Result<(), StoreError> {
        for page in pages {
            if let Some(status) = page.status_code {
                if status >= 400 {
                    self.store
                        .mark_links_broken(&self.run_id, &page.normalized_url, status)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn compute_link_totals(&self, pages: &[PageSummary]) -> Result<RunTotals, StoreError> {
        let link_counts = self.store.link_counts(&self.run_id).await?;
        let broken = self.store.broken_internal_count(&self.run_id).await?;
        let inlinks = self.store.internal_inlink_counts(&self.run_id).await?;

        let mut distribution: HashMap<String, u64> = HashMap::new();
        for page in pages {
            // Pages that could not be fetched have no status; they count
            // under "0" so the distribution always sums to pagesCount.
            let key = page
                .status_code
                .map(|s| s.to_string())
                .unwrap_or_else(|| "0".to_string());
            *distribution.entry(key).or_insert(0) += 1;
        }

        let mut top_error_pages: Vec<ErrorPageEntry> = pages
            .iter()
            .filter_map(|page| {
                let status = page.status_code?;
                if status < 400 {
                    return None;
                }
                Some(ErrorPageEntry {
                    url: page.normalized_url.clone(),
                    status_code: status,
                    count: inlinks.get(&page.normalized_url).copied().unwrap_or(0),
                })
            })
            .collect();
        top_error_pages.sort_by(|a, b| b.count.cmp(&a.count).then(a.url.cmp(&b.url)));
        top_error_pages.truncate(TOP_LIST_LEN);

        Ok(RunTotals {
            pages_count: pages.len() as u64,
            links_count: link_counts.total,
            internal_links_count: link_counts.internal,
            external_links_count: link_counts.external,
            broken_internal_links_count: broken,
            status_code_distribution: distribution,
            top_error_pages,
            ..RunTotals::default()
        })
    }

    /// Group pages by lowercased, trimmed title and flag every member of a
    /// group of two or more.
    async fn emit_duplicate_title_issues(&self, pages: &[PageSummary]) -> Result<(), StoreError> {
        let mut groups: HashMap<String, Vec<&PageSummary>> = HashMap::new();
        for page in pages {
            let Some(title) = page.title.as_deref() else {
                continue;
            };
            let key = title.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            groups.entry(key).or_default().push(page);
        }

        let mut rows: Vec<(Option<String>, IssueDraft)> = Vec::new();
        let mut keys: Vec<&String> = groups.keys().collect();
        keys.sort();
        for key in keys {
            let members = &groups[key];
            if members.len() < 2 {
                continue;
            }
            let original_title = members[0].title.as_deref().unwrap_or_default().trim();
            let example_urls: Vec<&str> = members
                .iter()
                .take(DUPLICATE_TITLE_EXAMPLES)
                .map(|p| p.url.as_str())
                .collect();
            let evidence = json!({
                "title": original_title,
                "count": members.len(),
                "urls": example_urls,
            });
            for member in members {
                rows.push((
                    Some(member.id.clone()),
                    IssueDraft {
                        issue_type: rules::DUPLICATE_TITLE,
                        severity: IssueSeverity::Medium,
                        title: "Duplicate page title",
                        description: "Multiple pages on the site share the same title.",
                        recommendation: "Give every page a unique, descriptive title.",
                        evidence: evidence.clone(),
                    },
                ));
            }
        }

        self.store.insert_issues(&self.run_id, &rows).await
    }

    /// Upsert one template per distinct signature hash and back-fill
    /// `template_id` on the member pages.
    async fn cluster_templates(&self, pages: &[PageSummary]) -> Result<(), StoreError> {
        let mut clusters: HashMap<&str, Vec<&PageSummary>> = HashMap::new();
        for page in pages {
            if let Some(hash) = page.template_signature_hash.as_deref() {
                clusters.entry(hash).or_default().push(page);
            }
        }

        let mut hashes: Vec<&&str> = clusters.keys().collect();
        hashes.sort();
        for hash in hashes {
            let members = &clusters[*hash];
            let sample = members[0];
            let signature = sample.template_signature.as_deref().unwrap_or("{}");
            let template_id = self
                .store
                .upsert_template(
                    &self.run_id,
                    hash,
                    signature,
                    &sample.id,
                    members.len() as u64,
                )
                .await?;
            self.store
                .assign_template(&self.run_id, hash, &template_id)
                .await?;
        }
        Ok(())
    }

    /// Count issues by type and severity and fold the summary into totals.
    async fn merge_issue_summary(&self, totals: &mut RunTotals) -> Result<(), StoreError> {
        let issues = self.store.load_issues(&self.run_id).await?;

        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut by_severity: HashMap<String, u64> = HashMap::new();
        for issue in &issues {
            *by_type.entry(issue.issue_type.clone()).or_insert(0) += 1;
            *by_severity.entry(issue.severity.clone()).or_insert(0) += 1;
        }

        let mut top_types: Vec<IssueTypeCount> = by_type
            .iter()
            .map(|(issue_type, count)| IssueTypeCount {
                issue_type: issue_type.clone(),
                count: *count,
            })
            .collect();
        top_types.sort_by(|a, b| b.count.cmp(&a.count).then(a.issue_type.cmp(&b.issue_type)));
        top_types.truncate(TOP_LIST_LEN);

        totals.issue_count_total = issues.len() as u64;
        totals.issue_count_by_type = by_type;
        totals.issue_count_by_severity = by_severity;
        totals.top_issue_types = top_types;
        Ok(())
    }
}
