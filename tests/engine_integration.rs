//! End-to-end crawl scenarios against a stub HTTP server and an in-memory
//! store: seed, traverse, persist, post-process, report.

use std::sync::Arc;

use mockito::{Matcher, ServerGuard};
use url::Url;

use hydrafrog_crawler::config::Config;
use hydrafrog_crawler::crawler::{CrawlEngine, EngineOutcome};
use hydrafrog_crawler::jobs::JobRunner;
use hydrafrog_crawler::models::{
    CrawlJobPayload, CrawlSettings, ProjectRecord, RunStatus,
};
use hydrafrog_crawler::storage::CrawlStore;

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        database_url: "sqlite::memory:".to_string(),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        queue_key: "crawl:jobs".to_string(),
        max_concurrent_runs: 1,
        max_job_attempts: 3,
        retry_backoff_secs: 0,
    })
}

fn fast_settings() -> CrawlSettings {
    CrawlSettings {
        throttle_ms: 0,
        timeout_s: 5,
        ..CrawlSettings::default()
    }
}

/// Enough visible words to stay above the thin-content threshold.
fn filler() -> String {
    "lorem ipsum dolor sit amet ".repeat(40)
}

fn clean_page_html(title: &str, body_extra: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title>
<meta name="description" content="A description">
<link rel="canonical" href="https://a.test/x"></head>
<body><h1>{title}</h1><p>{}</p>{body_extra}</body></html>"#,
        filler()
    )
}

struct Harness {
    store: Arc<CrawlStore>,
    project: ProjectRecord,
    payload: CrawlJobPayload,
    runner: JobRunner,
}

async fn harness(server: &ServerGuard, settings: CrawlSettings) -> Harness {
    let base = Url::parse(&server.url()).unwrap();
    let domain = base.host_str().unwrap().to_string();

    let store = Arc::new(CrawlStore::in_memory().await.unwrap());
    let project = ProjectRecord {
        id: "proj-1".to_string(),
        start_url: format!("{}/", server.url()),
        domain,
        settings: settings.clone(),
    };
    store.create_project(&project).await.unwrap();
    store.create_run("run-1", "proj-1", &settings).await.unwrap();

    let runner = JobRunner::new(store.clone(), test_config());
    Harness {
        store,
        project,
        payload: CrawlJobPayload {
            crawl_run_id: "run-1".to_string(),
            project_id: "proj-1".to_string(),
            attempt: 0,
        },
        runner,
    }
}

#[tokio::test]
async fn test_single_clean_page() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Home sweet home", ""))
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert!(run.started_at.is_some());
    assert!(run.finished_at.is_some());

    let pages = h.store.load_page_summaries("run-1").await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].status_code, Some(200));
    assert_eq!(pages[0].title.as_deref(), Some("Home sweet home"));

    assert!(h.store.load_links("run-1").await.unwrap().is_empty());
    assert!(h.store.load_issues("run-1").await.unwrap().is_empty());

    assert_eq!(run.totals.pages_count, 1);
    assert_eq!(run.totals.links_count, 0);
    assert_eq!(run.totals.issue_count_total, 0);
    assert_eq!(run.totals.status_code_distribution.len(), 1);
    assert_eq!(run.totals.status_code_distribution.get("200"), Some(&1));
}

#[tokio::test]
async fn test_broken_internal_link() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html(
            "Site root page",
            r#"<a href="/missing">gone</a>"#,
        ))
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/missing")
        .with_status(404)
        .with_header("content-type", "text/html")
        .with_body("<html><body>not here</body></html>")
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Done);

    let pages = h.store.load_page_summaries("run-1").await.unwrap();
    assert_eq!(pages.len(), 2);
    let missing = pages
        .iter()
        .find(|p| p.normalized_url.ends_with("/missing"))
        .unwrap();
    assert_eq!(missing.status_code, Some(404));

    let links = h.store.load_links("run-1").await.unwrap();
    assert_eq!(links.len(), 1);
    assert!(links[0].is_broken);
    assert_eq!(links[0].status_code, Some(404));

    let issues = h.store.load_issues("run-1").await.unwrap();
    assert!(issues
        .iter()
        .any(|i| i.issue_type == "STATUS_4XX_5XX" && i.page_id.as_deref() == Some(&missing.id)));

    assert_eq!(run.totals.broken_internal_links_count, 1);
    assert_eq!(run.totals.top_error_pages.len(), 1);
    assert!(run.totals.top_error_pages[0].url.ends_with("/missing"));
    assert_eq!(run.totals.top_error_pages[0].count, 1);
    assert_eq!(run.totals.status_code_distribution.get("404"), Some(&1));
}

#[tokio::test]
async fn test_duplicate_titles_across_pages() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html(
            "Site root page",
            r#"<a href="/a">a</a><a href="/b">b</a>"#,
        ))
        .create_async()
        .await;
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Shared product title", ""))
        .create_async()
        .await;
    let _b = server
        .mock("GET", "/b")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Shared product title", ""))
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.runner.execute(&h.payload).await.unwrap();

    let issues = h.store.load_issues("run-1").await.unwrap();
    let dups: Vec<_> = issues
        .iter()
        .filter(|i| i.issue_type == "DUPLICATE_TITLE")
        .collect();
    assert_eq!(dups.len(), 2);
    assert_eq!(dups[0].evidence["count"], 2);
    assert_eq!(dups[0].evidence["title"], "Shared product title");
    assert_eq!(dups[0].evidence["urls"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_max_pages_caps_admission_in_fifo_order() {
    let mut server = mockito::Server::new_async().await;
    let links: String = (1..=9)
        .map(|i| format!(r#"<a href="/p{i}">p{i}</a>"#))
        .collect();
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Site root page", &links))
        .create_async()
        .await;
    let _p1 = server
        .mock("GET", "/p1")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Page one title", ""))
        .create_async()
        .await;
    let _p2 = server
        .mock("GET", "/p2")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Page two title", ""))
        .create_async()
        .await;

    let settings = CrawlSettings {
        max_pages: 3,
        ..fast_settings()
    };
    let h = harness(&server, settings).await;
    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.totals.pages_count, 3);

    // Insertion order is FIFO admission order: seed first, then the first
    // two links discovered on it.
    let pages = h.store.load_page_summaries("run-1").await.unwrap();
    let urls: Vec<&str> = pages.iter().map(|p| p.normalized_url.as_str()).collect();
    assert_eq!(urls.len(), 3);
    assert!(urls[0].ends_with('/'));
    assert!(urls[1].ends_with("/p1"));
    assert!(urls[2].ends_with("/p2"));
}

#[tokio::test]
async fn test_query_param_variants_collapse_to_one_page() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html(
            "Site root page",
            r#"<a href="/x?b=2&amp;a=1&amp;utm_source=x">one</a><a href="/x?a=1&amp;b=2">two</a>"#,
        ))
        .create_async()
        .await;
    let _x = server
        .mock("GET", "/x")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("The X page title", ""))
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    // Both hrefs collapse to one normalized URL and only one is admitted
    assert_eq!(run.totals.pages_count, 2);
    assert_eq!(run.totals.links_count, 2);

    let pages = h.store.load_page_summaries("run-1").await.unwrap();
    let x = pages
        .iter()
        .find(|p| p.normalized_url.contains("/x?"))
        .unwrap();
    assert!(x.normalized_url.ends_with("/x?a=1&b=2"));

    let links = h.store.load_links("run-1").await.unwrap();
    assert!(links
        .iter()
        .all(|l| l.to_normalized_url.as_deref() == Some(x.normalized_url.as_str())));
}

#[tokio::test]
async fn test_max_depth_zero_visits_only_start_url() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Site root page", r#"<a href="/a">a</a>"#))
        .create_async()
        .await;

    let settings = CrawlSettings {
        max_depth: 0,
        ..fast_settings()
    };
    let h = harness(&server, settings).await;
    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.totals.pages_count, 1);
    // The outbound edge is still recorded even though its target is skipped
    assert_eq!(run.totals.links_count, 1);
}

#[tokio::test]
async fn test_max_pages_zero_produces_empty_done_run() {
    let server = mockito::Server::new_async().await;
    let settings = CrawlSettings {
        max_pages: 0,
        ..fast_settings()
    };
    let h = harness(&server, settings).await;
    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.totals.pages_count, 0);
    assert!(run.totals.status_code_distribution.is_empty());
}

#[tokio::test]
async fn test_self_link_does_not_grow_the_frontier() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Site root page", r#"<a href="/">home</a>"#))
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.totals.pages_count, 1);
    assert_eq!(run.totals.links_count, 1);
    assert_eq!(run.totals.broken_internal_links_count, 0);
}

#[tokio::test]
async fn test_invalid_start_url_fails_the_run() {
    let server = mockito::Server::new_async().await;
    let mut h = harness(&server, fast_settings()).await;
    h.project.start_url = "not a url at all".to_string();

    // The stored project carries the bad URL
    let store = Arc::new(CrawlStore::in_memory().await.unwrap());
    store.create_project(&h.project).await.unwrap();
    store
        .create_run("run-1", "proj-1", &fast_settings())
        .await
        .unwrap();
    let runner = JobRunner::new(store.clone(), test_config());

    let err = runner.execute(&h.payload).await;
    assert!(err.is_err());

    let run = store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run
        .totals
        .last_error_message
        .as_deref()
        .unwrap()
        .contains("invalid start URL"));
}

#[tokio::test]
async fn test_cancel_before_dispatch_leaves_no_children() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Site root page", ""))
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    assert!(h.store.request_cancel("run-1").await.unwrap());

    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Canceled);
    assert_eq!(h.store.page_count("run-1").await.unwrap(), 0);
    // Post-processing never ran: totals are whatever was set at run start
    assert_eq!(run.totals.pages_count, 0);
    assert!(run.totals.status_code_distribution.is_empty());
}

#[tokio::test]
async fn test_engine_observes_cancellation() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Site root page", ""))
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.store.mark_running("run-1").await.unwrap();
    h.store.request_cancel("run-1").await.unwrap();

    let engine = CrawlEngine::new(
        h.store.clone(),
        &h.project,
        "run-1".to_string(),
        fast_settings(),
    );
    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome, EngineOutcome::Canceled);
    assert_eq!(h.store.page_count("run-1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_replaying_a_run_is_idempotent() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html(
            "Site root page",
            r#"<a href="/missing">gone</a>"#,
        ))
        .expect_at_least(2)
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/missing")
        .with_status(404)
        .with_header("content-type", "text/html")
        .with_body("<html><body>not here</body></html>")
        .expect_at_least(2)
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.store.mark_running("run-1").await.unwrap();

    let engine = CrawlEngine::new(
        h.store.clone(),
        &h.project,
        "run-1".to_string(),
        fast_settings(),
    );

    h.store.wipe_children("run-1").await.unwrap();
    engine.run().await.unwrap();
    let first: Vec<String> = h
        .store
        .load_page_summaries("run-1")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.normalized_url)
        .collect();

    // Redelivery: wipe and crawl again
    h.store.wipe_children("run-1").await.unwrap();
    engine.run().await.unwrap();
    let second: Vec<String> = h
        .store
        .load_page_summaries("run-1")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.normalized_url)
        .collect();

    assert_eq!(first, second);
    assert_eq!(
        h.store.load_links("run-1").await.unwrap().len(),
        1,
        "links are not duplicated across replays"
    );
}

#[tokio::test]
async fn test_external_links_recorded_but_not_crawled() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html(
            "Site root page",
            r#"<a href="https://elsewhere.test/page">out</a>"#,
        ))
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.runner.execute(&h.payload).await.unwrap();

    let run = h.store.load_run("run-1").await.unwrap().unwrap();
    assert_eq!(run.totals.pages_count, 1);
    assert_eq!(run.totals.links_count, 1);
    assert_eq!(run.totals.external_links_count, 1);
    assert_eq!(run.totals.internal_links_count, 0);

    let links = h.store.load_links("run-1").await.unwrap();
    assert_eq!(
        links[0].to_normalized_url.as_deref(),
        Some("https://elsewhere.test/page")
    );
}

#[tokio::test]
async fn test_pages_sharing_layout_cluster_into_one_template() {
    let mut server = mockito::Server::new_async().await;
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html(
            "Site root page",
            r#"<a href="/a">a</a><a href="/b">b</a>"#,
        ))
        .create_async()
        .await;
    // Same skeleton, different copy
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Article about frogs", ""))
        .create_async()
        .await;
    let _b = server
        .mock("GET", "/b")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(clean_page_html("Article about ponds", ""))
        .create_async()
        .await;

    let h = harness(&server, fast_settings()).await;
    h.runner.execute(&h.payload).await.unwrap();

    let pages = h.store.load_page_summaries("run-1").await.unwrap();
    let a_hash = pages
        .iter()
        .find(|p| p.normalized_url.ends_with("/a"))
        .and_then(|p| p.template_signature_hash.clone())
        .unwrap();
    let b_hash = pages
        .iter()
        .find(|p| p.normalized_url.ends_with("/b"))
        .and_then(|p| p.template_signature_hash.clone())
        .unwrap();
    assert_eq!(a_hash, b_hash);
}
