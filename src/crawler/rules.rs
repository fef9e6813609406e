use serde_json::json;

use crate::models::{IssueDraft, IssueSeverity};

pub const STATUS_4XX_5XX: &str = "STATUS_4XX_5XX";
pub const STATUS_3XX_REDIRECT: &str = "STATUS_3XX_REDIRECT";
pub const REDIRECT_CHAIN_LONG: &str = "REDIRECT_CHAIN_LONG";
pub const MISSING_TITLE: &str = "MISSING_TITLE";
pub const TITLE_TOO_LONG: &str = "TITLE_TOO_LONG";
pub const TITLE_TOO_SHORT: &str = "TITLE_TOO_SHORT";
pub const MISSING_META_DESCRIPTION: &str = "MISSING_META_DESCRIPTION";
pub const H1_MISSING: &str = "H1_MISSING";
pub const H1_MULTIPLE: &str = "H1_MULTIPLE";
pub const CANONICAL_MISSING: &str = "CANONICAL_MISSING";
pub const ROBOTS_NOINDEX: &str = "ROBOTS_NOINDEX";
pub const THIN_CONTENT: &str = "THIN_CONTENT";
pub const IMAGES_MISSING_ALT: &str = "IMAGES_MISSING_ALT";

/// Emitted by the post-processor, not by the per-page evaluator.
pub const DUPLICATE_TITLE: &str = "DUPLICATE_TITLE";

const MAX_TITLE_LEN: usize = 60;
const MIN_TITLE_LEN: usize = 10;
const MIN_WORD_COUNT: u32 = 150;
const LONG_REDIRECT_CHAIN: usize = 3;

/// The extracted fields a single page is judged on.
#[derive(Debug, Clone, Default)]
pub struct PageFacts<'a> {
    pub status_code: Option<u16>,
    pub redirect_chain_len: usize,
    /// Whether the response body was parsed as HTML. Content rules only
    /// apply to HTML pages; status and redirect rules always apply.
    pub is_html: bool,
    pub title: Option<&'a str>,
    pub meta_description: Option<&'a str>,
    pub h1_count: u32,
    pub canonical: Option<&'a str>,
    pub robots_meta: Option<&'a str>,
    pub word_count: Option<u32>,
    pub images_missing_alt: u32,
}

/// Evaluate every rule against one page. Rules are independent; every
/// applicable rule fires. Output order follows the rule table.
pub fn evaluate(facts: &PageFacts<'_>) -> Vec<IssueDraft> {
    let mut drafts = Vec::new();

    if let Some(status) = facts.status_code {
        if status >= 400 {
            drafts.push(IssueDraft {
                issue_type: STATUS_4XX_5XX,
                severity: IssueSeverity::Critical,
                title: "Page returns an error status",
                description: "The page responded with a 4xx or 5xx status code.",
                recommendation: "Fix the page or remove links pointing to it.",
                evidence: json!({ "statusCode": status }),
            });
        } else if (300..400).contains(&status) {
            drafts.push(IssueDraft {
                issue_type: STATUS_3XX_REDIRECT,
                severity: IssueSeverity::Medium,
                title: "Page is a redirect",
                description: "The page responded with a 3xx redirect status code.",
                recommendation: "Link directly to the final destination URL.",
                evidence: json!({ "statusCode": status }),
            });
        }
    }

    if facts.redirect_chain_len >= LONG_REDIRECT_CHAIN {
        drafts.push(IssueDraft {
            issue_type: REDIRECT_CHAIN_LONG,
            severity: IssueSeverity::High,
            title: "Long redirect chain",
            description: "The page is reached through three or more redirects.",
            recommendation: "Point links at the final URL and collapse intermediate redirects.",
            evidence: json!({ "redirectCount": facts.redirect_chain_len }),
        });
    }

    if facts.is_html {
        let title = facts.title.map(str::trim).unwrap_or("");
        let title_len = title.chars().count();
        if title_len == 0 {
            drafts.push(IssueDraft {
                issue_type: MISSING_TITLE,
                severity: IssueSeverity::High,
                title: "Missing page title",
                description: "The page has no <title> element, or it is empty.",
                recommendation: "Add a unique, descriptive title of 10-60 characters.",
                evidence: json!({}),
            });
        } else if title_len > MAX_TITLE_LEN {
            drafts.push(IssueDraft {
                issue_type: TITLE_TOO_LONG,
                severity: IssueSeverity::Low,
                title: "Title too long",
                description: "The page title exceeds 60 characters and may be truncated in search results.",
                recommendation: "Shorten the title to at most 60 characters.",
                evidence: json!({ "title": title, "length": title_len }),
            });
        } else if title_len < MIN_TITLE_LEN {
            drafts.push(IssueDraft {
                issue_type: TITLE_TOO_SHORT,
                severity: IssueSeverity::Low,
                title: "Title too short",
                description: "The page title is shorter than 10 characters.",
                recommendation: "Use a more descriptive title of 10-60 characters.",
                evidence: json!({ "title": title, "length": title_len }),
            });
        }

        if facts
            .meta_description
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
        {
            drafts.push(IssueDraft {
                issue_type: MISSING_META_DESCRIPTION,
                severity: IssueSeverity::Medium,
                title: "Missing meta description",
                description: "The page has no meta description, or it is empty.",
                recommendation: "Add a meta description summarizing the page content.",
                evidence: json!({}),
            });
        }

        if facts.h1_count == 0 {
            drafts.push(IssueDraft {
                issue_type: H1_MISSING,
                severity: IssueSeverity::High,
                title: "Missing H1 heading",
                description: "The page has no <h1> element.",
                recommendation: "Add exactly one <h1> describing the page topic.",
                evidence: json!({ "h1Count": 0 }),
            });
        } else if facts.h1_count > 1 {
            drafts.push(IssueDraft {
                issue_type: H1_MULTIPLE,
                severity: IssueSeverity::Low,
                title: "Multiple H1 headings",
                description: "The page has more than one <h1> element.",
                recommendation: "Keep a single <h1> and demote the others.",
                evidence: json!({ "h1Count": facts.h1_count }),
            });
        }

        if facts.canonical.map(str::trim).unwrap_or("").is_empty() {
            drafts.push(IssueDraft {
                issue_type: CANONICAL_MISSING,
                severity: IssueSeverity::Low,
                title: "Missing canonical link",
                description: "The page has no rel=canonical link element.",
                recommendation: "Add a canonical link to consolidate duplicate URLs.",
                evidence: json!({}),
            });
        }

        if let Some(robots) = facts.robots_meta {
            if robots.to_lowercase().contains("noindex") {
                drafts.push(IssueDraft {
                    issue_type: ROBOTS_NOINDEX,
                    severity: IssueSeverity::Medium,
                    title: "Page is set to noindex",
                    description: "The robots meta tag excludes this page from search indexes.",
                    recommendation: "Remove the noindex directive if the page should rank.",
                    evidence: json!({ "robotsMeta": robots }),
                });
            }
        }

        if let Some(word_count) = facts.word_count {
            if word_count < MIN_WORD_COUNT {
                drafts.push(IssueDraft {
                    issue_type: THIN_CONTENT,
                    severity: IssueSeverity::Low,
                    title: "Thin content",
                    description: "The page has fewer than 150 words of visible text.",
                    recommendation: "Expand the page content or consolidate it into another page.",
                    evidence: json!({ "wordCount": word_count }),
                });
            }
        }

        if facts.images_missing_alt > 0 {
            drafts.push(IssueDraft {
                issue_type: IMAGES_MISSING_ALT,
                severity: IssueSeverity::Low,
                title: "Images without alt text",
                description: "One or more images on the page have no alt attribute.",
                recommendation: "Add descriptive alt text to every meaningful image.",
                evidence: json!({ "imagesMissingAlt": facts.images_missing_alt }),
            });
        }
    }

    drafts
}
