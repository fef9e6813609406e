use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::models::RedirectHop;

/// Redirects followed before a fetch is abandoned.
pub const MAX_REDIRECTS: usize = 10;

/// The outcome of fetching one URL. Fetch failures are data, not errors:
/// the page row is persisted either way so it shows up in reports.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Final URL, at the end of the redirect chain.
    pub url: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    /// Intermediate hops only; the final URL is not part of the chain.
    pub redirect_chain: Vec<RedirectHop>,
    /// Response body, present only for `text/html` responses.
    pub html: Option<String>,
    pub error: Option<String>,
}

impl FetchOutcome {
    fn failed(url: String, redirect_chain: Vec<RedirectHop>, error: String) -> Self {
        FetchOutcome {
            url,
            status_code: None,
            content_type: None,
            redirect_chain,
            html: None,
            error: Some(error),
        }
    }
}

/// HTTP fetcher that follows redirects by hand so the chain can be recorded.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a fetcher with the run's User-Agent and per-request timeout.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .gzip(true)
            .build()
            .expect("Failed to build HTTP client");

        Fetcher { client }
    }

    /// GET a URL, following up to [`MAX_REDIRECTS`] redirects.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut chain: Vec<RedirectHop> = Vec::new();
        let mut current = url.to_string();

        loop {
            let response = match self.client.get(&current).send().await {
                Ok(resp) => resp,
                Err(e) => return FetchOutcome::failed(current, chain, e.to_string()),
            };

            let status = response.status().as_u16();

            if response.status().is_redirection() {
                if let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    if chain.len() >= MAX_REDIRECTS {
                        return FetchOutcome {
                            url: current,
                            status_code: Some(status),
                            content_type: None,
                            redirect_chain: chain,
                            html: None,
                            error: Some(format!("redirect limit of {MAX_REDIRECTS} exceeded")),
                        };
                    }
                    let next = Url::parse(&current)
                        .ok()
                        .and_then(|base| base.join(location).ok());
                    let next = match next {
                        Some(u) => u.to_string(),
                        None => {
                            return FetchOutcome::failed(
                                current,
                                chain,
                                format!("unresolvable redirect location: {location}"),
                            )
                        }
                    };
                    chain.push(RedirectHop {
                        url: current,
                        status_code: status,
                    });
                    current = next;
                    continue;
                }
                // A 3xx without a Location header is treated as the final response.
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());

            let is_html = content_type
                .as_deref()
                .map(|c| c.contains("text/html"))
                .unwrap_or(false);

            if !is_html {
                return FetchOutcome {
                    url: current,
                    status_code: Some(status),
                    content_type,
                    redirect_chain: chain,
                    html: None,
                    error: None,
                };
            }

            return match response.text().await {
                Ok(body) => FetchOutcome {
                    url: current,
                    status_code: Some(status),
                    content_type,
                    redirect_chain: chain,
                    html: Some(body),
                    error: None,
                },
                Err(e) => FetchOutcome {
                    url: current,
                    status_code: Some(status),
                    content_type,
                    redirect_chain: chain,
                    html: None,
                    error: Some(e.to_string()),
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> Fetcher {
        Fetcher::new(5, "HydraFrogBot/1.0")
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html><head><title>Hi</title></head><body></body></html>")
            .create_async()
            .await;

        let outcome = fetcher().fetch(&format!("{}/", server.url())).await;
        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.html.as_deref().unwrap().contains("<title>Hi</title>"));
        assert!(outcome.redirect_chain.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_non_html_skips_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/feed.xml")
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body("<rss/>")
            .create_async()
            .await;

        let outcome = fetcher().fetch(&format!("{}/feed.xml", server.url())).await;
        assert_eq!(outcome.status_code, Some(200));
        assert!(outcome.html.is_none());
        assert_eq!(outcome.content_type.as_deref(), Some("application/xml"));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_redirect_chain_recorded() {
        let mut server = mockito::Server::new_async().await;
        let _m1 = server
            .mock("GET", "/a")
            .with_status(301)
            .with_header("location", "/b")
            .create_async()
            .await;
        let _m2 = server
            .mock("GET", "/b")
            .with_status(302)
            .with_header("location", "/c")
            .create_async()
            .await;
        let _m3 = server
            .mock("GET", "/c")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body>done</body></html>")
            .create_async()
            .await;

        let outcome = fetcher().fetch(&format!("{}/a", server.url())).await;
        assert_eq!(outcome.status_code, Some(200));
        assert_eq!(outcome.url, format!("{}/c", server.url()));
        assert_eq!(outcome.redirect_chain.len(), 2);
        assert_eq!(outcome.redirect_chain[0].status_code, 301);
        assert!(outcome.redirect_chain[0].url.ends_with("/a"));
        assert_eq!(outcome.redirect_chain[1].status_code, 302);
    }

    #[tokio::test]
    async fn test_redirect_loop_hits_cap() {
        let mut server = mockito::Server::new_async().await;
        let _m1 = server
            .mock("GET", "/ping")
            .with_status(302)
            .with_header("location", "/pong")
            .expect_at_least(1)
            .create_async()
            .await;
        let _m2 = server
            .mock("GET", "/pong")
            .with_status(302)
            .with_header("location", "/ping")
            .expect_at_least(1)
            .create_async()
            .await;

        let outcome = fetcher().fetch(&format!("{}/ping", server.url())).await;
        assert_eq!(outcome.redirect_chain.len(), MAX_REDIRECTS);
        assert_eq!(outcome.status_code, Some(302));
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_connection_error_is_captured() {
        // Nothing listens on this port
        let outcome = fetcher().fetch("http://127.0.0.1:1/").await;
        assert!(outcome.status_code.is_none());
        assert!(outcome.error.is_some());
        assert!(outcome.html.is_none());
    }
}
