use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

// --- Crawl Settings ---

/// Per-project crawl settings. A run carries an immutable snapshot of these,
/// taken when the run was enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSettings {
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_ignore_params")]
    pub ignore_params: Vec<String>,
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    #[serde(default)]
    pub include_subdomains: bool,
    /// Reserved: read from project settings but not yet consumed by the fetcher.
    #[serde(default = "default_true")]
    pub respect_robots: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> u32 {
    1000
}

fn default_max_depth() -> u32 {
    5
}

fn default_ignore_params() -> Vec<String> {
    [
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_content",
        "utm_term",
        "fbclid",
        "gclid",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_throttle_ms() -> u64 {
    100
}

fn default_user_agent() -> String {
    "HydraFrogBot/1.0".to_string()
}

fn default_timeout_s() -> u64 {
    30
}

impl Default for CrawlSettings {
    fn default() -> Self {
        CrawlSettings {
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            ignore_params: default_ignore_params(),
            throttle_ms: default_throttle_ms(),
            include_subdomains: false,
            respect_robots: true,
            user_agent: default_user_agent(),
            timeout_s: default_timeout_s(),
        }
    }
}

// --- Job Payload ---

/// Payload popped from the job queue. The queue is keyed by `crawlRunId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlJobPayload {
    pub crawl_run_id: String,
    pub project_id: String,
    /// Delivery attempt counter, bumped by the worker on requeue.
    /// Absent on first delivery from the control plane.
    #[serde(default)]
    pub attempt: u32,
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Queued,
    Running,
    Done,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::Running => "RUNNING",
            RunStatus::Done => "DONE",
            RunStatus::Failed => "FAILED",
            RunStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<RunStatus> {
        match s {
            "QUEUED" => Some(RunStatus::Queued),
            "RUNNING" => Some(RunStatus::Running),
            "DONE" => Some(RunStatus::Done),
            "FAILED" => Some(RunStatus::Failed),
            "CANCELED" => Some(RunStatus::Canceled),
            _ => None,
        }
    }

    /// DONE, FAILED and CANCELED are sinks.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Done | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkType {
    Internal,
    External,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Internal => "INTERNAL",
            LinkType::External => "EXTERNAL",
        }
    }

    pub fn parse(s: &str) -> Option<LinkType> {
        match s {
            "INTERNAL" => Some(LinkType::Internal),
            "EXTERNAL" => Some(LinkType::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Low => "LOW",
            IssueSeverity::Medium => "MEDIUM",
            IssueSeverity::High => "HIGH",
            IssueSeverity::Critical => "CRITICAL",
        }
    }
}

// --- Redirect Hop ---

/// One intermediate hop of a redirect chain, recorded in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
}

// --- Records ---

#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub id: String,
    pub start_url: String,
    /// Registered apex of the site, protocol-stripped (e.g. "example.com").
    pub domain: String,
    pub settings: CrawlSettings,
}

#[derive(Debug, Clone)]
pub struct CrawlRunRecord {
    pub id: String,
    pub project_id: String,
    pub status: RunStatus,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub settings: CrawlSettings,
    pub totals: RunTotals,
}

/// A page as persisted during the crawl loop. `template_id` is assigned in
/// post-processing and is not part of this record.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: String,
    pub crawl_run_id: String,
    pub url: String,
    pub normalized_url: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1_count: u32,
    pub canonical: Option<String>,
    pub robots_meta: Option<String>,
    pub word_count: Option<u32>,
    pub redirect_chain: Vec<RedirectHop>,
    pub template_signature_hash: Option<String>,
    pub template_signature: Option<String>,
    pub discovered_at: i64,
}

/// An outbound edge discovered on a page. Inserted unconditionally; the
/// link graph records multiplicities.
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub crawl_run_id: String,
    pub from_page_id: Option<String>,
    pub to_url: String,
    pub to_normalized_url: Option<String>,
    pub link_type: LinkType,
}

/// An issue produced by the rule evaluator or the post-processor, before it
/// is persisted with an id and run scope.
#[derive(Debug, Clone)]
pub struct IssueDraft {
    pub issue_type: &'static str,
    pub severity: IssueSeverity,
    pub title: &'static str,
    pub description: &'static str,
    pub recommendation: &'static str,
    pub evidence: serde_json::Value,
}

// --- Run Totals ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPageEntry {
    pub url: String,
    pub status_code: u16,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTypeCount {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub count: u64,
}

/// Aggregate statistics for a run, persisted as a JSON document on the run
/// row and merged by the post-processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTotals {
    #[serde(default)]
    pub pages_count: u64,
    #[serde(default)]
    pub links_count: u64,
    #[serde(default)]
    pub internal_links_count: u64,
    #[serde(default)]
    pub external_links_count: u64,
    #[serde(default)]
    pub broken_internal_links_count: u64,
    #[serde(default)]
    pub status_code_distribution: HashMap<String, u64>,
    #[serde(default)]
    pub top_error_pages: Vec<ErrorPageEntry>,
    #[serde(default)]
    pub issue_count_total: u64,
    #[serde(default)]
    pub issue_count_by_type: HashMap<String, u64>,
    #[serde(default)]
    pub issue_count_by_severity: HashMap<String, u64>,
    #[serde(default)]
    pub top_issue_types: Vec<IssueTypeCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_from_empty_json() {
        let settings: CrawlSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.max_pages, 1000);
        assert_eq!(settings.max_depth, 5);
        assert_eq!(settings.throttle_ms, 100);
        assert!(!settings.include_subdomains);
        assert!(settings.respect_robots);
        assert_eq!(settings.user_agent, "HydraFrogBot/1.0");
        assert!(settings.ignore_params.contains(&"utm_source".to_string()));
        assert!(settings.ignore_params.contains(&"gclid".to_string()));
    }

    #[test]
    fn test_settings_camel_case_keys() {
        let settings: CrawlSettings =
            serde_json::from_str(r#"{"maxPages": 3, "includeSubdomains": true}"#).unwrap();
        assert_eq!(settings.max_pages, 3);
        assert!(settings.include_subdomains);
    }

    #[test]
    fn test_payload_attempt_defaults_to_zero() {
        let payload: CrawlJobPayload =
            serde_json::from_str(r#"{"crawlRunId": "r1", "projectId": "p1"}"#).unwrap();
        assert_eq!(payload.crawl_run_id, "r1");
        assert_eq!(payload.project_id, "p1");
        assert_eq!(payload.attempt, 0);
    }

    #[test]
    fn test_run_status_round_trip() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Done,
            RunStatus::Failed,
            RunStatus::Canceled,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert!(RunStatus::parse("UNKNOWN").is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_totals_serialization_shape() {
        let mut totals = RunTotals::default();
        totals.pages_count = 2;
        totals.status_code_distribution.insert("200".to_string(), 2);
        let json = serde_json::to_value(&totals).unwrap();
        assert_eq!(json["pagesCount"], 2);
        assert_eq!(json["statusCodeDistribution"]["200"], 2);
        // lastErrorMessage is omitted when absent
        assert!(json.get("lastErrorMessage").is_none());
    }
}
