//! Persistence adapter for crawl runs and their child rows.
//!
//! All child rows (pages, links, issues, templates) are owned by a run and
//! partitioned by `crawl_run_id`. Writers for different runs do not contend
//! logically; the only cross-run shared resource is the pool itself.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    unix_now, CrawlRunRecord, CrawlSettings, IssueDraft, LinkRecord, LinkType, PageRecord,
    ProjectRecord, RunStatus, RunTotals,
};

/// Rows per bulk INSERT statement.
const BATCH_SIZE: usize = 100;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    start_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    settings TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS crawl_runs (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    status TEXT NOT NULL,
    started_at INTEGER,
    finished_at INTEGER,
    settings TEXT NOT NULL,
    totals TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_project ON crawl_runs(project_id);

CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    crawl_run_id TEXT NOT NULL REFERENCES crawl_runs(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    status_code INTEGER,
    content_type TEXT,
    title TEXT,
    meta_description TEXT,
    h1_count INTEGER NOT NULL DEFAULT 0,
    canonical TEXT,
    robots_meta TEXT,
    word_count INTEGER,
    redirect_chain TEXT NOT NULL DEFAULT '[]',
    template_signature_hash TEXT,
    template_signature TEXT,
    template_id TEXT,
    discovered_at INTEGER NOT NULL,
    UNIQUE (crawl_run_id, normalized_url)
);

CREATE INDEX IF NOT EXISTS idx_pages_run ON pages(crawl_run_id);

CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_run_id TEXT NOT NULL REFERENCES crawl_runs(id) ON DELETE CASCADE,
    from_page_id TEXT,
    to_url TEXT NOT NULL,
    to_normalized_url TEXT,
    link_type TEXT NOT NULL,
    is_broken INTEGER NOT NULL DEFAULT 0,
    status_code INTEGER
);

CREATE INDEX IF NOT EXISTS idx_links_run ON links(crawl_run_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON links(crawl_run_id, to_normalized_url);

CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    crawl_run_id TEXT NOT NULL REFERENCES crawl_runs(id) ON DELETE CASCADE,
    page_id TEXT,
    issue_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    recommendation TEXT NOT NULL,
    evidence TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_issues_run ON issues(crawl_run_id);

CREATE TABLE IF NOT EXISTS templates (
    id TEXT PRIMARY KEY,
    crawl_run_id TEXT NOT NULL REFERENCES crawl_runs(id) ON DELETE CASCADE,
    signature_hash TEXT NOT NULL,
    signature TEXT NOT NULL,
    sample_page_id TEXT,
    page_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE (crawl_run_id, signature_hash)
);

CREATE INDEX IF NOT EXISTS idx_templates_run ON templates(crawl_run_id);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("project {0} already has a queued or running crawl")]
    ActiveRunExists(String),
}

/// Read model for post-processing: the slice of a page row the aggregations
/// need, in insertion order.
#[derive(Debug, Clone)]
pub struct PageSummary {
    pub id: String,
    pub url: String,
    pub normalized_url: String,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    pub template_signature_hash: Option<String>,
    pub template_signature: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LinkRow {
    pub id: i64,
    pub from_page_id: Option<String>,
    pub to_url: String,
    pub to_normalized_url: Option<String>,
    pub link_type: LinkType,
    pub is_broken: bool,
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct IssueRecord {
    pub id: String,
    pub page_id: Option<String>,
    pub issue_type: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub evidence: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkCounts {
    pub total: u64,
    pub internal: u64,
    pub external: u64,
}

/// SQLite-backed store for runs, pages, links, issues and templates.
#[derive(Debug, Clone)]
pub struct CrawlStore {
    pool: SqlitePool,
}

impl CrawlStore {
    /// Open (or create) the database at `database_url` and initialize the
    /// schema. WAL mode keeps reads concurrent with the writer.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::init(pool).await
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        Ok(CrawlStore { pool })
    }

    // --- Projects ---

    pub async fn create_project(&self, project: &ProjectRecord) -> Result<(), StoreError> {
        let settings = serde_json::to_string(&project.settings)?;
        sqlx::query("INSERT INTO projects (id, start_url, domain, settings) VALUES (?1, ?2, ?3, ?4)")
            .bind(&project.id)
            .bind(&project.start_url)
            .bind(&project.domain)
            .bind(settings)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn load_project(&self, project_id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        let row = sqlx::query("SELECT id, start_url, domain, settings FROM projects WHERE id = ?1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let settings: CrawlSettings = serde_json::from_str(row.try_get("settings")?)?;
        Ok(Some(ProjectRecord {
            id: row.try_get("id")?,
            start_url: row.try_get("start_url")?,
            domain: row.try_get("domain")?,
            settings,
        }))
    }

    // --- Runs ---

    /// Create a QUEUED run carrying a snapshot of the project settings.
    /// Refuses while another run of the project is QUEUED or RUNNING.
    pub async fn create_run(
        &self,
        run_id: &str,
        project_id: &str,
        settings: &CrawlSettings,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crawl_runs WHERE project_id = ?1 AND status IN ('QUEUED', 'RUNNING')",
        )
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(StoreError::ActiveRunExists(project_id.to_string()));
        }

        let settings_json = serde_json::to_string(settings)?;
        let totals_json = serde_json::to_string(&RunTotals::default())?;
        sqlx::query(
            "INSERT INTO crawl_runs (id, project_id, status, settings, totals) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(project_id)
        .bind(RunStatus::Queued.as_str())
        .bind(settings_json)
        .bind(totals_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn load_run(&self, run_id: &str) -> Result<Option<CrawlRunRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, project_id, status, started_at, finished_at, settings, totals FROM crawl_runs WHERE id = ?1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        let settings: CrawlSettings = serde_json::from_str(row.try_get("settings")?)?;
        let totals: RunTotals = serde_json::from_str(row.try_get("totals")?)?;
        Ok(Some(CrawlRunRecord {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            settings,
            totals,
        }))
    }

    pub async fn read_run_status(&self, run_id: &str) -> Result<Option<RunStatus>, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM crawl_runs WHERE id = ?1")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.as_deref().and_then(RunStatus::parse))
    }

    /// Transition a non-terminal run to RUNNING and stamp `started_at`.
    pub async fn mark_running(&self, run_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE crawl_runs SET status = 'RUNNING', started_at = ?1 \
             WHERE id = ?2 AND status NOT IN ('DONE', 'FAILED', 'CANCELED')",
        )
        .bind(unix_now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition a non-terminal run to a terminal status and stamp
    /// `finished_at`. Returns false when the run was already terminal.
    pub async fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<bool, StoreError> {
        debug_assert!(status.is_terminal());
        let result = sqlx::query(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2 \
             WHERE id = ?3 AND status NOT IN ('DONE', 'FAILED', 'CANCELED')",
        )
        .bind(status.as_str())
        .bind(unix_now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cooperative cancellation: flip a QUEUED or RUNNING run to CANCELED.
    /// The engine observes the new status at its next poll.
    pub async fn request_cancel(&self, run_id: &str) -> Result<bool, StoreError> {
        self.finish_run(run_id, RunStatus::Canceled).await
    }

    pub async fn update_run_totals(
        &self,
        run_id: &str,
        totals: &RunTotals,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(totals)?;
        sqlx::query("UPDATE crawl_runs SET totals = ?1 WHERE id = ?2")
            .bind(json)
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failure message in the run's totals, keeping whatever else
    /// is already there.
    pub async fn set_last_error(&self, run_id: &str, message: &str) -> Result<(), StoreError> {
        let mut totals = self
            .load_run(run_id)
            .await?
            .map(|r| r.totals)
            .unwrap_or_default();
        totals.last_error_message = Some(message.to_string());
        self.update_run_totals(run_id, &totals).await
    }

    /// Delete every child row of a run. Called before the first fetch of a
    /// job execution so redelivered jobs are idempotent.
    pub async fn wipe_children(&self, run_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for table in ["issues", "links", "templates", "pages"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE crawl_run_id = ?1"))
                .bind(run_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // --- Pages & Issues ---

    /// Persist a page and its issues in one transaction.
    ///
    /// Upsert on (crawl_run_id, normalized_url): a collision is a no-op, the
    /// first writer wins and its row id is returned; the new issues are
    /// dropped with the duplicate page.
    pub async fn persist_page(
        &self,
        page: &PageRecord,
        issues: &[IssueDraft],
    ) -> Result<String, StoreError> {
        let redirect_chain = serde_json::to_string(&page.redirect_chain)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO pages (id, crawl_run_id, url, normalized_url, status_code, content_type, \
             title, meta_description, h1_count, canonical, robots_meta, word_count, redirect_chain, \
             template_signature_hash, template_signature, discovered_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
             ON CONFLICT (crawl_run_id, normalized_url) DO NOTHING",
        )
        .bind(&page.id)
        .bind(&page.crawl_run_id)
        .bind(&page.url)
        .bind(&page.normalized_url)
        .bind(page.status_code.map(|s| s as i64))
        .bind(&page.content_type)
        .bind(&page.title)
        .bind(&page.meta_description)
        .bind(page.h1_count as i64)
        .bind(&page.canonical)
        .bind(&page.robots_meta)
        .bind(page.word_count.map(|w| w as i64))
        .bind(redirect_chain)
        .bind(&page.template_signature_hash)
        .bind(&page.template_signature)
        .bind(page.discovered_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let existing: String = sqlx::query_scalar(
                "SELECT id FROM pages WHERE crawl_run_id = ?1 AND normalized_url = ?2",
            )
            .bind(&page.crawl_run_id)
            .bind(&page.normalized_url)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(existing);
        }

        let rows: Vec<(Option<String>, IssueDraft)> = issues
            .iter()
            .map(|draft| (Some(page.id.clone()), draft.clone()))
            .collect();
        insert_issue_rows(&mut tx, &page.crawl_run_id, &rows).await?;

        tx.commit().await?;
        Ok(page.id.clone())
    }

    /// Persist run-scoped issues (global or page-bound) produced outside the
    /// per-page transaction.
    pub async fn insert_issues(
        &self,
        run_id: &str,
        rows: &[(Option<String>, IssueDraft)],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        insert_issue_rows(&mut tx, run_id, rows).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_issues(&self, run_id: &str) -> Result<Vec<IssueRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, page_id, issue_type, severity, title, description, recommendation, evidence \
             FROM issues WHERE crawl_run_id = ?1 ORDER BY rowid",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let evidence: String = row.try_get("evidence")?;
                Ok(IssueRecord {
                    id: row.try_get("id")?,
                    page_id: row.try_get("page_id")?,
                    issue_type: row.try_get("issue_type")?,
                    severity: row.try_get("severity")?,
                    title: row.try_get("title")?,
                    description: row.try_get("description")?,
                    recommendation: row.try_get("recommendation")?,
                    evidence: serde_json::from_str(&evidence)?,
                })
            })
            .collect()
    }

    pub async fn load_page_summaries(&self, run_id: &str) -> Result<Vec<PageSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, url, normalized_url, status_code, title, template_signature_hash, \
             template_signature FROM pages WHERE crawl_run_id = ?1 ORDER BY rowid",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status: Option<i64> = row.try_get("status_code")?;
                Ok(PageSummary {
                    id: row.try_get("id")?,
                    url: row.try_get("url")?,
                    normalized_url: row.try_get("normalized_url")?,
                    status_code: status.map(|s| s as u16),
                    title: row.try_get("title")?,
                    template_signature_hash: row.try_get("template_signature_hash")?,
                    template_signature: row.try_get("template_signature")?,
                })
            })
            .collect()
    }

    // --- Links ---

    /// Insert link rows unconditionally; the graph records multiplicities.
    pub async fn persist_links(&self, links: &[LinkRecord]) -> Result<(), StoreError> {
        for chunk in links.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO links (crawl_run_id, from_page_id, to_url, to_normalized_url, link_type) ",
            );
            builder.push_values(chunk, |mut b, link| {
                b.push_bind(link.crawl_run_id.clone())
                    .push_bind(link.from_page_id.clone())
                    .push_bind(link.to_url.clone())
                    .push_bind(link.to_normalized_url.clone())
                    .push_bind(link.link_type.as_str());
            });
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn load_links(&self, run_id: &str) -> Result<Vec<LinkRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, from_page_id, to_url, to_normalized_url, link_type, is_broken, status_code \
             FROM links WHERE crawl_run_id = ?1 ORDER BY id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let link_type: String = row.try_get("link_type")?;
                let is_broken: i64 = row.try_get("is_broken")?;
                let status: Option<i64> = row.try_get("status_code")?;
                Ok(LinkRow {
                    id: row.try_get("id")?,
                    from_page_id: row.try_get("from_page_id")?,
                    to_url: row.try_get("to_url")?,
                    to_normalized_url: row.try_get("to_normalized_url")?,
                    link_type: LinkType::parse(&link_type).unwrap_or(LinkType::External),
                    is_broken: is_broken != 0,
                    status_code: status.map(|s| s as u16),
                })
            })
            .collect()
    }

    pub async fn link_counts(&self, run_id: &str) -> Result<LinkCounts, StoreError> {
        let rows = sqlx::query(
            "SELECT link_type, COUNT(*) AS n FROM links WHERE crawl_run_id = ?1 GROUP BY link_type",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = LinkCounts::default();
        for row in rows {
            let link_type: String = row.try_get("link_type")?;
            let n: i64 = row.try_get("n")?;
            counts.total += n as u64;
            match LinkType::parse(&link_type) {
                Some(LinkType::Internal) => counts.internal += n as u64,
                Some(LinkType::External) => counts.external += n as u64,
                None => {}
            }
        }
        Ok(counts)
    }

    pub async fn broken_internal_count(&self, run_id: &str) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM links WHERE crawl_run_id = ?1 AND link_type = 'INTERNAL' AND is_broken = 1",
        )
        .bind(run_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(n as u64)
    }

    /// In-link counts per internal target, keyed by normalized URL.
    pub async fn internal_inlink_counts(
        &self,
        run_id: &str,
    ) -> Result<HashMap<String, u64>, StoreError> {
        let rows = sqlx::query(
            "SELECT to_normalized_url, COUNT(*) AS n FROM links \
             WHERE crawl_run_id = ?1 AND link_type = 'INTERNAL' AND to_normalized_url IS NOT NULL \
             GROUP BY to_normalized_url",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let url: String = row.try_get("to_normalized_url")?;
            let n: i64 = row.try_get("n")?;
            counts.insert(url, n as u64);
        }
        Ok(counts)
    }

    /// Mark every internal link pointing at `target` as broken with the
    /// target's status. Bulk update, used by the post-processor.
    pub async fn mark_links_broken(
        &self,
        run_id: &str,
        target_normalized_url: &str,
        status_code: u16,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE links SET is_broken = 1, status_code = ?1 \
             WHERE crawl_run_id = ?2 AND link_type = 'INTERNAL' AND to_normalized_url = ?3",
        )
        .bind(status_code as i64)
        .bind(run_id)
        .bind(target_normalized_url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // --- Templates ---

    /// Upsert a template cluster and return its id.
    pub async fn upsert_template(
        &self,
        run_id: &str,
        signature_hash: &str,
        signature: &str,
        sample_page_id: &str,
        page_count: u64,
    ) -> Result<String, StoreError> {
        sqlx::query(
            "INSERT INTO templates (id, crawl_run_id, signature_hash, signature, sample_page_id, page_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT (crawl_run_id, signature_hash) DO UPDATE SET \
             page_count = excluded.page_count, sample_page_id = excluded.sample_page_id",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(run_id)
        .bind(signature_hash)
        .bind(signature)
        .bind(sample_page_id)
        .bind(page_count as i64)
        .execute(&self.pool)
        .await?;

        let id: String = sqlx::query_scalar(
            "SELECT id FROM templates WHERE crawl_run_id = ?1 AND signature_hash = ?2",
        )
        .bind(run_id)
        .bind(signature_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Point every page sharing a signature hash at its template.
    pub async fn assign_template(
        &self,
        run_id: &str,
        signature_hash: &str,
        template_id: &str,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE pages SET template_id = ?1 \
             WHERE crawl_run_id = ?2 AND template_signature_hash = ?3",
        )
        .bind(template_id)
        .bind(run_id)
        .bind(signature_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn template_count(&self, run_id: &str) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM templates WHERE crawl_run_id = ?1")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    pub async fn page_count(&self, run_id: &str) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE crawl_run_id = ?1")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}

async fn insert_issue_rows(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    run_id: &str,
    rows: &[(Option<String>, IssueDraft)],
) -> Result<(), StoreError> {
    for chunk in rows.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO issues (id, crawl_run_id, page_id, issue_type, severity, title, \
             description, recommendation, evidence) ",
        );
        builder.push_values(chunk, |mut b, (page_id, draft)| {
            b.push_bind(Uuid::new_v4().to_string())
                .push_bind(run_id.to_string())
                .push_bind(page_id.clone())
                .push_bind(draft.issue_type)
                .push_bind(draft.severity.as_str())
                .push_bind(draft.title)
                .push_bind(draft.description)
                .push_bind(draft.recommendation)
                .push_bind(draft.evidence.to_string());
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}
