use scraper::{Html, Selector};

/// SEO-relevant fields extracted from one HTML document.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1_count: u32,
    pub canonical: Option<String>,
    pub robots_meta: Option<String>,
    pub word_count: u32,
    pub images_missing_alt: u32,
    /// Raw `a[href]` values in document order. Resolution against the page
    /// URL and internal/external classification happen in the engine.
    pub links: Vec<String>,
}

pub struct Parser;

impl Parser {
    /// Parse an HTML document and extract all SEO-relevant data.
    pub fn parse(html_content: &str) -> ParsedPage {
        let document = Html::parse_document(html_content);

        ParsedPage {
            title: Self::extract_title(&document),
            meta_description: Self::extract_meta_description(&document),
            h1_count: Self::count_h1(&document),
            canonical: Self::extract_canonical(&document),
            robots_meta: Self::extract_robots_meta(&document),
            word_count: Self::compute_word_count(&document),
            images_missing_alt: Self::count_images_missing_alt(&document),
            links: Self::extract_hrefs(&document),
        }
    }

    fn extract_title(document: &Html) -> Option<String> {
        let sel = Selector::parse("title").unwrap();
        document
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn extract_meta_description(document: &Html) -> Option<String> {
        let sel = Selector::parse(r#"meta[name="description"]"#).unwrap();
        document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content").map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
    }

    fn count_h1(document: &Html) -> u32 {
        let sel = Selector::parse("h1").unwrap();
        document.select(&sel).count() as u32
    }

    fn extract_canonical(document: &Html) -> Option<String> {
        let sel = Selector::parse(r#"link[rel="canonical"]"#).unwrap();
        document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("href").map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
    }

    fn extract_robots_meta(document: &Html) -> Option<String> {
        let sel = Selector::parse(r#"meta[name="robots"]"#).unwrap();
        document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content").map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
    }

    fn count_images_missing_alt(document: &Html) -> u32 {
        let sel = Selector::parse("img").unwrap();
        document
            .select(&sel)
            .filter(|el| el.value().attr("alt").unwrap_or("").trim().is_empty())
            .count() as u32
    }

    fn extract_hrefs(document: &Html) -> Vec<String> {
        let sel = Selector::parse("a[href]").unwrap();
        document
            .select(&sel)
            .filter_map(|el| el.value().attr("href"))
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty())
            .collect()
    }

    fn compute_word_count(document: &Html) -> u32 {
        let body_sel = Selector::parse("body").unwrap();
        let mut text = String::new();
        if let Some(body) = document.select(&body_sel).next() {
            collect_text_excluding(&body, &mut text);
        }
        text.split_whitespace().count() as u32
    }
}

/// Recursively collect visible text, skipping script/style/template/noscript
/// subtrees.
fn collect_text_excluding(node: &scraper::ElementRef, out: &mut String) {
    for child in node.children() {
        if let Some(text) = child.value().as_text() {
            out.push(' ');
            out.push_str(text);
        } else if let Some(el) = scraper::ElementRef::wrap(child) {
            let tag = el.value().name();
            if tag != "script" && tag != "style" && tag != "template" && tag != "noscript" {
                collect_text_excluding(&el, out);
            }
        }
    }
}
