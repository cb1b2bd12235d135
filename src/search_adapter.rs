//! Search Adapter (module D). Turns one synthesized `Query` into a list of
//! candidate catalog track URLs: first a direct search against the catalog
//! host itself, falling back to a public search engine restricted to that
//! host when the direct search comes up empty.
//!
//! Grounded on `beatport.py`'s `is_track_url`/`track_urls`/`ddg_track_urls`
//! chain (site-restricted query → quoted variant → broader host-only query)
//! and the bounded-concurrency HTTP idiom of the teacher's
//! `soulseek/search.rs` (`Semaphore` + `futures::future::join_all`, applied
//! here by the Match Engine around calls into this trait rather than inside
//! it, since one query is one adapter call).

use async_trait::async_trait;
use html_parser::{Dom, Node};
use regex::Regex;
use url::Url;

use crate::cache::{NoopCache, ResponseCache};
use crate::config::Settings;
use crate::model::{CandidateUrl, Query};
use std::sync::Arc;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    async fn search(&self, query: &Query) -> Vec<CandidateUrl>;
}

/// A full browser-automation fallback is modeled but never wired to a real
/// driver — spec §4.D calls it "optional, off by default" and it's an
/// explicit non-goal (spec §1: no browser automation).
#[async_trait]
pub trait BrowserFallback: Send + Sync {
    async fn search(&self, _query: &Query) -> Vec<CandidateUrl> {
        Vec::new()
    }
}

pub struct HttpSearchAdapter {
    client: reqwest::Client,
    catalog_host: String,
    max_results: usize,
    cache: Arc<dyn ResponseCache>,
}

impl HttpSearchAdapter {
    pub fn new(client: reqwest::Client, settings: &Settings) -> Self {
        Self::with_cache(client, settings, Arc::new(NoopCache))
    }

    pub fn with_cache(client: reqwest::Client, settings: &Settings, cache: Arc<dyn ResponseCache>) -> Self {
        Self {
            client,
            catalog_host: settings.catalog_host.clone(),
            max_results: 16,
            cache,
        }
    }

    fn track_path_pattern(&self) -> Regex {
        Regex::new(r"(?i)^/track/[^/?#]+/\d+").unwrap()
    }

    /// Parse `url` and check it points at a track page on the configured
    /// catalog host: right host (`www.` optional), path shaped like
    /// `/track/<slug>/<id>`. Parsing with `url::Url` rather than matching
    /// the whole string with one regex so a host embedded elsewhere in the
    /// URL (a query param, a redirect wrapper) can't spoof a match.
    pub fn is_track_url(&self, candidate: &str) -> bool {
        let Ok(parsed) = Url::parse(candidate) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host_matches = host.eq_ignore_ascii_case(&self.catalog_host)
            || host.eq_ignore_ascii_case(&format!("www.{}", self.catalog_host));
        host_matches && self.track_path_pattern().is_match(parsed.path())
    }

    async fn fetch_and_collect_links(&self, url: &str) -> Vec<String> {
        if let Some(cached) = self.cache.get(url) {
            return extract_anchor_hrefs(&cached);
        }
        let body = match self.client.get(url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(text) => text,
                Err(_) => return Vec::new(),
            },
            Err(_) => return Vec::new(),
        };
        self.cache.put(url, &body);
        extract_anchor_hrefs(&body)
    }

    async fn direct_search(&self, query_text: &str) -> Vec<String> {
        let url = format!(
            "https://{}/search?q={}",
            self.catalog_host,
            urlencoding::encode(query_text)
        );
        self.fetch_and_collect_links(&url).await
    }

    async fn search_engine_fallback(&self, query_text: &str) -> Vec<String> {
        let attempts = [
            format!("site:{} {}", self.catalog_host, query_text),
            format!("site:{} \"{}\"", self.catalog_host, query_text),
            format!("{} {}", self.catalog_host, query_text),
        ];

        for attempt in attempts {
            let url = format!(
                "https://duckduckgo.com/html/?q={}",
                urlencoding::encode(&attempt)
            );
            let links = self.fetch_and_collect_links(&url).await;
            let hits: Vec<String> = links.into_iter().filter(|l| self.is_track_url(l)).collect();
            if !hits.is_empty() {
                return hits;
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl SearchAdapter for HttpSearchAdapter {
    async fn search(&self, query: &Query) -> Vec<CandidateUrl> {
        let mut links = self.direct_search(&query.text).await;
        links.retain(|l| self.is_track_url(l));

        if links.is_empty() {
            links = self.search_engine_fallback(&query.text).await;
        }

        let mut seen = std::collections::HashSet::new();
        links
            .into_iter()
            .filter(|l| seen.insert(l.clone()))
            .take(self.max_results)
            .enumerate()
            .map(|(index, url)| CandidateUrl { url, index })
            .collect()
    }
}

fn extract_anchor_hrefs(html: &str) -> Vec<String> {
    let dom = match Dom::parse(html) {
        Ok(dom) => dom,
        Err(_) => return Vec::new(),
    };

    let mut hrefs = Vec::new();
    let mut stack: Vec<&Node> = dom.children.iter().collect();
    while let Some(node) = stack.pop() {
        if let Node::Element(element) = node {
            if element.name.eq_ignore_ascii_case("a") {
                if let Some(Some(href)) = element.attributes.get("href") {
                    hrefs.push(href.clone());
                }
            }
            for child in &element.children {
                stack.push(child);
            }
        }
    }
    hrefs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> HttpSearchAdapter {
        HttpSearchAdapter::new(
            reqwest::Client::new(),
            &Settings {
                catalog_host: "example-catalog.com".to_string(),
                ..Settings::default()
            },
        )
    }

    #[test]
    fn recognizes_track_urls() {
        let a = adapter();
        assert!(a.is_track_url("https://www.example-catalog.com/track/some-song/12345"));
        assert!(a.is_track_url("https://example-catalog.com/track/some-song/12345"));
        assert!(!a.is_track_url("https://example-catalog.com/artist/someone/999"));
        assert!(!a.is_track_url("https://other-site.com/track/some-song/12345"));
    }

    struct FakeCache {
        html: String,
    }

    impl ResponseCache for FakeCache {
        fn get(&self, _key: &str) -> Option<String> {
            Some(self.html.clone())
        }
        fn put(&self, _key: &str, _value: &str) {}
    }

    #[tokio::test]
    async fn cached_response_skips_the_network_fetch() {
        let html = r#"<html><body><a href="https://example-catalog.com/track/cached/1">Hit</a></body></html>"#;
        let a = HttpSearchAdapter::with_cache(
            reqwest::Client::new(),
            &Settings {
                catalog_host: "example-catalog.com".to_string(),
                ..Settings::default()
            },
            Arc::new(FakeCache { html: html.to_string() }),
        );
        let links = a.fetch_and_collect_links("https://example-catalog.com/search?q=anything").await;
        assert!(links.contains(&"https://example-catalog.com/track/cached/1".to_string()));
    }

    #[test]
    fn extracts_anchor_hrefs_from_html() {
        let html = r#"<html><body><a href="https://example-catalog.com/track/foo/1">Foo</a>
            <a href="/relative">rel</a></body></html>"#;
        let hrefs = extract_anchor_hrefs(html);
        assert!(hrefs.contains(&"https://example-catalog.com/track/foo/1".to_string()));
        assert!(hrefs.contains(&"/relative".to_string()));
    }
}
