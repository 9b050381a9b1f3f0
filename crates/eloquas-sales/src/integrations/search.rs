// Web search behind a provider trait. Tavily, Bing and SerpAPI are supported;
// with no key configured every search fails with `NotConfigured`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use eloquas_core::config::{non_empty, Config, SearchProviderKind};

use super::{http_client, read_body, IntegrationError, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, IntegrationError>;
}

/// Build the configured provider. Missing keys or `provider = "none"` yield a
/// disabled provider.
pub fn provider_from_config(config: &Config) -> Arc<dyn SearchProvider> {
    let key = non_empty(&config.credentials.search_api_key);
    let backend = match config.search.provider {
        SearchProviderKind::Tavily => Some(Backend::Tavily),
        SearchProviderKind::Bing => Some(Backend::Bing),
        SearchProviderKind::Serpapi => Some(Backend::SerpApi),
        SearchProviderKind::None => None,
    };
    match (backend, key) {
        (Some(backend), Some(key)) => Arc::new(WebSearchClient::new(backend, key.to_string())),
        _ => Arc::new(DisabledSearch),
    }
}

// ---------------------------------------------------------------------------
// WebSearchClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Tavily,
    Bing,
    SerpApi,
}

impl Backend {
    fn default_endpoint(self) -> &'static str {
        match self {
            Backend::Tavily => "https://api.tavily.com/search",
            Backend::Bing => "https://api.bing.microsoft.com/v7.0/search",
            Backend::SerpApi => "https://serpapi.com/search.json",
        }
    }
}

pub struct WebSearchClient {
    http: reqwest::Client,
    backend: Backend,
    api_key: String,
    endpoint: String,
}

impl WebSearchClient {
    pub fn new(backend: Backend, api_key: String) -> Self {
        Self {
            http: http_client(DEFAULT_TIMEOUT),
            backend,
            api_key,
            endpoint: backend.default_endpoint().to_string(),
        }
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for WebSearchClient {
    fn name(&self) -> &'static str {
        match self.backend {
            Backend::Tavily => "tavily",
            Backend::Bing => "bing",
            Backend::SerpApi => "serpapi",
        }
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, IntegrationError> {
        let count = max_results.clamp(1, 20);
        let count_param = count.to_string();
        debug!(provider = self.name(), query, count, "web search");
        let request = match self.backend {
            Backend::Tavily => self.http.post(&self.endpoint).json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": count,
                "search_depth": "advanced",
            })),
            Backend::Bing => self
                .http
                .get(&self.endpoint)
                .header("Ocp-Apim-Subscription-Key", &self.api_key)
                .query(&[("q", query), ("count", count_param.as_str())]),
            Backend::SerpApi => self.http.get(&self.endpoint).query(&[
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("num", count_param.as_str()),
            ]),
        };

        let body = read_body(self.name(), request.send().await?).await?;
        let parsed = match self.backend {
            Backend::Tavily => parse_tavily(&body),
            Backend::Bing => parse_bing(&body),
            Backend::SerpApi => parse_serpapi(&body),
        }
        .ok_or_else(|| IntegrationError::parse(self.name(), "missing result list"))?;

        let mut results = dedup_by_url(parsed);
        results.truncate(count);
        Ok(results)
    }
}

/// Provider used when search is not configured.
pub struct DisabledSearch;

#[async_trait]
impl SearchProvider for DisabledSearch {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchResult>, IntegrationError> {
        Err(IntegrationError::NotConfigured("web search"))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// `{ "results": [{ "title", "url", "content" }] }`
pub(crate) fn parse_tavily(data: &str) -> Option<Vec<SearchResult>> {
    let v: Value = serde_json::from_str(data).ok()?;
    let items = v.get("results")?.as_array()?;
    Some(collect(items, "title", "url", "content"))
}

/// `{ "webPages": { "value": [{ "name", "url", "snippet" }] } }`. A query
/// with no hits has no `webPages` key at all.
pub(crate) fn parse_bing(data: &str) -> Option<Vec<SearchResult>> {
    let v: Value = serde_json::from_str(data).ok()?;
    if !v.is_object() {
        return None;
    }
    let Some(pages) = v.get("webPages") else {
        return Some(Vec::new());
    };
    let items = pages.get("value")?.as_array()?;
    Some(collect(items, "name", "url", "snippet"))
}

/// `{ "organic_results": [{ "title", "link", "snippet" }] }`
pub(crate) fn parse_serpapi(data: &str) -> Option<Vec<SearchResult>> {
    let v: Value = serde_json::from_str(data).ok()?;
    if let Some(error) = v.get("error").and_then(Value::as_str) {
        debug!("serpapi error body: {error}");
        return None;
    }
    let Some(items) = v.get("organic_results") else {
        return Some(Vec::new());
    };
    Some(collect(items.as_array()?, "title", "link", "snippet"))
}

fn collect(items: &[Value], title: &str, url: &str, snippet: &str) -> Vec<SearchResult> {
    let text = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    };
    items
        .iter()
        .filter_map(|item| {
            let url = text(item, url);
            if url.is_empty() {
                return None;
            }
            Some(SearchResult {
                title: text(item, title),
                url,
                snippet: text(item, snippet),
            })
        })
        .collect()
}

/// Drop repeated URLs, keeping the first occurrence.
pub fn dedup_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.url.trim_end_matches('/').to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::test_server::serve;

    #[test]
    fn tavily_results_parse() {
        let body = r#"{"query":"acme","results":[
            {"title":"Acme hires QA lead","url":"https://news.example/acme","content":"Acme is hiring","score":0.9},
            {"title":"No url","content":"skipped"}
        ]}"#;
        let results = parse_tavily(body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "Acme is hiring");
    }

    #[test]
    fn bing_without_web_pages_is_empty() {
        assert_eq!(parse_bing(r#"{"_type":"SearchResponse"}"#), Some(Vec::new()));
        let body = r#"{"webPages":{"value":[{"name":"Acme","url":"https://acme.example","snippet":"ERP"}]}}"#;
        assert_eq!(parse_bing(body).unwrap()[0].title, "Acme");
        assert_eq!(parse_bing("[]"), None);
    }

    #[test]
    fn serpapi_error_body_is_rejected() {
        assert_eq!(parse_serpapi(r#"{"error":"Invalid API key"}"#), None);
        let body = r#"{"organic_results":[{"title":"Acme","link":"https://acme.example/jobs","snippet":"SAP"}]}"#;
        assert_eq!(parse_serpapi(body).unwrap()[0].url, "https://acme.example/jobs");
    }

    #[test]
    fn dedup_ignores_trailing_slash() {
        let r = |url: &str| SearchResult {
            title: String::new(),
            url: url.to_string(),
            snippet: String::new(),
        };
        let deduped = dedup_by_url(vec![r("https://a.example/"), r("https://a.example"), r("https://b.example")]);
        assert_eq!(deduped.len(), 2);
    }

    #[tokio::test]
    async fn tavily_request_carries_key_and_query() {
        let body = r#"{"results":[{"title":"t","url":"https://x.example","content":"c"}]}"#;
        let (addr, server) = serve(vec![(200, body.to_string())]).await;
        let client = WebSearchClient::new(Backend::Tavily, "tv-key".into())
            .with_endpoint(format!("http://{addr}/search"));

        let results = client.search("acme erp", 5).await.unwrap();
        assert_eq!(results.len(), 1);

        let captured = server.await.unwrap();
        let sent: Value = serde_json::from_str(&captured[0].body).unwrap();
        assert_eq!(sent["api_key"], "tv-key");
        assert_eq!(sent["query"], "acme erp");
        assert_eq!(sent["max_results"], 5);
    }

    #[tokio::test]
    async fn bing_status_error_surfaces() {
        let (addr, server) = serve(vec![(401, r#"{"error":"denied"}"#.to_string())]).await;
        let client = WebSearchClient::new(Backend::Bing, "bing-key".into())
            .with_endpoint(format!("http://{addr}/v7.0/search"));

        let err = client.search("acme", 3).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Status { status: 401, .. }));

        let captured = server.await.unwrap();
        assert_eq!(captured[0].header("ocp-apim-subscription-key"), Some("bing-key"));
        assert!(captured[0].request_line().contains("q=acme"));
    }

    #[tokio::test]
    async fn disabled_provider_reports_not_configured() {
        let err = DisabledSearch.search("anything", 5).await.unwrap_err();
        assert!(matches!(err, IntegrationError::NotConfigured(_)));
    }
}
