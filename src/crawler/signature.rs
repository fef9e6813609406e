use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Subtrees removed before any signature field is computed.
const EXCLUDED_TAGS: &[&str] = &["script", "style", "noscript", "svg", "iframe"];

const BODY_CHILD_LIMIT: usize = 30;
const SKELETON_LIMIT: usize = 150;
const CLASS_TOKEN_LIMIT: usize = 15;
const CLASS_TOKEN_MAX_LEN: usize = 20;

/// Structural fingerprint of an HTML document, used to cluster pages that
/// share a layout. All fields are content-independent.
///
/// Field declaration order is load-bearing: the canonical JSON (and therefore
/// the hash) emits keys in this order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSignature {
    pub body_top_level_tags: Vec<String>,
    pub landmark_counts: LandmarkCounts,
    pub form_elements: FormElementCounts,
    pub link_stats: LinkStats,
    pub dom_skeleton_sample: Vec<String>,
    pub class_tokens_sample: Vec<String>,
}

/// Landmark element counts; zero counts are omitted from the JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LandmarkCounts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nav: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<u32>,
}

/// Form control counts; zero counts are omitted from the JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FormElementCounts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub textarea: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStats {
    pub total_links: u32,
}

/// A computed signature: the structured form, its canonical JSON and the
/// sha256 of that JSON (hex).
#[derive(Debug, Clone)]
pub struct ComputedSignature {
    pub hash: String,
    pub json: String,
    pub signature: TemplateSignature,
}

/// Compute the structural signature of an HTML document.
///
/// Byte-stable for a fixed input: traversal is in document order, sampling
/// limits are fixed, and the JSON key order is the struct declaration order.
pub fn compute(html: &str) -> ComputedSignature {
    let document = Html::parse_document(html);
    let body_sel = Selector::parse("body").unwrap();

    let mut state = TraversalState::default();

    if let Some(body) = document.select(&body_sel).next() {
        let mut top_level = Vec::new();
        for child in body.children() {
            let Some(el) = ElementRef::wrap(child) else {
                continue;
            };
            if is_excluded(el.value().name()) {
                continue;
            }
            if top_level.len() < BODY_CHILD_LIMIT {
                top_level.push(el.value().name().to_string());
            }
        }
        state.body_top_level_tags = top_level;

        let mut path = vec!["body".to_string()];
        walk(body, &mut path, &mut state);
    }

    state.class_tokens.sort();

    let signature = TemplateSignature {
        body_top_level_tags: state.body_top_level_tags,
        landmark_counts: LandmarkCounts {
            header: non_zero(state.landmarks[0]),
            nav: non_zero(state.landmarks[1]),
            main: non_zero(state.landmarks[2]),
            footer: non_zero(state.landmarks[3]),
            section: non_zero(state.landmarks[4]),
            article: non_zero(state.landmarks[5]),
            form: non_zero(state.landmarks[6]),
        },
        form_elements: FormElementCounts {
            input: non_zero(state.form_elements[0]),
            button: non_zero(state.form_elements[1]),
            select: non_zero(state.form_elements[2]),
            textarea: non_zero(state.form_elements[3]),
        },
        link_stats: LinkStats {
            total_links: state.total_links,
        },
        dom_skeleton_sample: state.skeleton,
        class_tokens_sample: state.class_tokens,
    };

    let json = serde_json::to_string(&signature).unwrap_or_else(|_| "{}".to_string());
    let hash = hex::encode(Sha256::digest(json.as_bytes()));

    ComputedSignature {
        hash,
        json,
        signature,
    }
}

const LANDMARK_TAGS: &[&str] = &["header", "nav", "main", "footer", "section", "article", "form"];
const FORM_TAGS: &[&str] = &["input", "button", "select", "textarea"];

#[derive(Default)]
struct TraversalState {
    body_top_level_tags: Vec<String>,
    landmarks: [u32; 7],
    form_elements: [u32; 4],
    total_links: u32,
    skeleton: Vec<String>,
    class_tokens: Vec<String>,
}

fn is_excluded(tag: &str) -> bool {
    EXCLUDED_TAGS.contains(&tag)
}

fn non_zero(count: u32) -> Option<u32> {
    if count > 0 {
        Some(count)
    } else {
        None
    }
}

/// Depth-first walk of element descendants in document order, skipping
/// excluded subtrees entirely.
fn walk(el: ElementRef, path: &mut Vec<String>, state: &mut TraversalState) {
    for child in el.children() {
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let tag = child_el.value().name();
        if is_excluded(tag) {
            continue;
        }

        if let Some(idx) = LANDMARK_TAGS.iter().position(|t| *t == tag) {
            state.landmarks[idx] += 1;
        }
        if let Some(idx) = FORM_TAGS.iter().position(|t| *t == tag) {
            state.form_elements[idx] += 1;
        }
        if tag == "a" && child_el.value().attr("href").is_some() {
            state.total_links += 1;
        }

        if state.skeleton.len() < SKELETON_LIMIT {
            state.skeleton.push(format!("{}>{}", path.join(">"), tag));
        }

        if let Some(class_attr) = child_el.value().attr("class") {
            collect_class_tokens(class_attr, &mut state.class_tokens);
        }

        path.push(tag.to_string());
        walk(child_el, path, state);
        path.pop();
    }
}

/// Keep a class token iff, after lowercasing and trimming, it is at least two
/// characters, not purely digits, not a long hex-like string, and not
/// underscore-prefixed. Long tokens are truncated.
fn collect_class_tokens(class_attr: &str, tokens: &mut Vec<String>) {
    let hex_like = Regex::new(r"^[a-f0-9]{8,}$").unwrap();

    for raw in class_attr.split_whitespace() {
        if tokens.len() >= CLASS_TOKEN_LIMIT {
            return;
        }
        let token = raw.trim().to_lowercase();
        if token.len() < 2
            || token.starts_with('_')
            || token.chars().all(|c| c.is_ascii_digit())
            || hex_like.is_match(&token)
        {
            continue;
        }
        let token: String = token.chars().take(CLASS_TOKEN_MAX_LEN).collect();
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<body>
    <header class="site-header">
        <nav><a href="/a">A</a><a href="/b">B</a></nav>
    </header>
    <main class="content MAIN">
        <section>
            <h1>Hello</h1>
            <form><input type="text"><button>Go</button></form>
        </section>
    </main>
    <footer class="site-footer"><a href="/c">C</a></footer>
    <script>var ignored = true;</script>
</body>
</html>"#;

    #[test]
    fn test_body_top_level_tags_exclude_cleaned_subtrees() {
        let sig = compute(PAGE).signature;
        assert_eq!(sig.body_top_level_tags, vec!["header", "main", "footer"]);
    }

    #[test]
    fn test_landmark_and_form_counts_omit_zero() {
        let sig = compute(PAGE).signature;
        assert_eq!(sig.landmark_counts.header, Some(1));
        assert_eq!(sig.landmark_counts.nav, Some(1));
        assert_eq!(sig.landmark_counts.main, Some(1));
        assert_eq!(sig.landmark_counts.footer, Some(1));
        assert_eq!(sig.landmark_counts.section, Some(1));
        assert_eq!(sig.landmark_counts.article, None);
        assert_eq!(sig.landmark_counts.form, Some(1));
        assert_eq!(sig.form_elements.input, Some(1));
        assert_eq!(sig.form_elements.button, Some(1));
        assert_eq!(sig.form_elements.select, None);
    }

    #[test]
    fn test_link_count_and_skeleton_paths() {
        let sig = compute(PAGE).signature;
        assert_eq!(sig.link_stats.total_links, 3);
        assert!(sig
            .dom_skeleton_sample
            .contains(&"body>header".to_string()));
        assert!(sig
            .dom_skeleton_sample
            .contains(&"body>header>nav>a".to_string()));
        assert!(sig
            .dom_skeleton_sample
            .contains(&"body>main>section>form>input".to_string()));
    }

    #[test]
    fn test_class_tokens_filtered_sorted_unique() {
        let html = r#"<body>
            <div class="Card card 12345 _private deadbeef00 ok a"></div>
            <div class="averyveryverylongclassnamethatkeepsgoing"></div>
        </body>"#;
        let sig = compute(html).signature;
        // "Card" and "card" collapse, digits/underscore/hex/single-char dropped,
        // the long token is truncated to 20 chars, and the result is sorted.
        assert_eq!(
            sig.class_tokens_sample,
            vec!["averyveryverylongcla".to_string(), "card".to_string(), "ok".to_string()]
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = compute(PAGE);
        let b = compute(PAGE);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.json, b.json);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_hash_ignores_excluded_subtrees() {
        let with_script = r#"<body><main><p>x</p></main><script>one()</script></body>"#;
        let with_other_script = r#"<body><main><p>y</p></main><script>two()</script></body>"#;
        // Same structure, different script payloads and text content
        assert_eq!(
            compute(with_script).hash,
            compute(with_other_script).hash
        );
    }

    #[test]
    fn test_differing_structure_differs() {
        let one = r#"<body><main><p>x</p></main></body>"#;
        let two = r#"<body><article><p>x</p></article></body>"#;
        assert_ne!(compute(one).hash, compute(two).hash);
    }

    #[test]
    fn test_canonical_json_key_order() {
        let json = compute(PAGE).json;
        let body_idx = json.find("bodyTopLevelTags").unwrap();
        let landmark_idx = json.find("landmarkCounts").unwrap();
        let form_idx = json.find("formElements").unwrap();
        let link_idx = json.find("linkStats").unwrap();
        let skeleton_idx = json.find("domSkeletonSample").unwrap();
        let class_idx = json.find("classTokensSample").unwrap();
        assert!(body_idx < landmark_idx);
        assert!(landmark_idx < form_idx);
        assert!(form_idx < link_idx);
        assert!(link_idx < skeleton_idx);
        assert!(skeleton_idx < class_idx);
    }

    #[test]
    fn test_empty_document() {
        let sig = compute("");
        assert!(sig.signature.body_top_level_tags.is_empty());
        assert_eq!(sig.signature.link_stats.total_links, 0);
        assert_eq!(sig.hash.len(), 64);
    }
}
