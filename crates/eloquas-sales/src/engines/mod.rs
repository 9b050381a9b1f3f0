// Prompt-driven generators. Each engine builds a prompt, asks the model for
// JSON, validates the answer and falls back to a built-in template when the
// model is unavailable or returns something unusable.

pub mod cadence;
pub mod call_assessment;
pub mod hybrid;
pub mod intent;
pub mod linkedin_post;
pub mod platform;
pub mod prompt;
pub mod research;
pub mod scipab;

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use eloquas_llm::{parse_json, ChatProvider, ChatRequest, LlmError};

use crate::integrations::drive::DriveDocument;
use crate::integrations::search::{SearchProvider, SearchResult};
use crate::integrations::IntegrationError;

// ---------------------------------------------------------------------------
// Result wrapper and errors
// ---------------------------------------------------------------------------

/// Output of an engine plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generated<T> {
    pub value: T,
    /// Model that produced `value`; `None` for template output.
    pub model: Option<String>,
    /// `true` when `value` is the built-in fallback rather than model output.
    pub used_fallback: bool,
}

impl<T> Generated<T> {
    pub(crate) fn from_model(value: T, model: String) -> Self {
        Self {
            value,
            model: Some(model),
            used_fallback: false,
        }
    }

    pub(crate) fn fallback(value: T) -> Self {
        Self {
            value,
            model: None,
            used_fallback: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generated<U> {
        Generated {
            value: f(self.value),
            model: self.model,
            used_fallback: self.used_fallback,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("could not parse model output: {0}")]
    Parse(String),

    #[error("insufficient evidence: {0}")]
    InsufficientEvidence(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A parsed model answer and the model that gave it.
#[derive(Debug)]
pub(crate) struct Reply<T> {
    pub value: T,
    pub model: String,
}

/// Send `request` and deserialize the JSON object in the answer.
pub(crate) async fn ask_json<T: DeserializeOwned>(
    llm: &dyn ChatProvider,
    request: &ChatRequest,
) -> Result<Reply<T>, EngineError> {
    let response = llm.complete(request).await?;
    debug!(
        model = %response.model,
        completion_tokens = response.completion_tokens,
        "model answered"
    );
    let value = parse_json(&response.content).map_err(|e| EngineError::Parse(e.to_string()))?;
    Ok(Reply {
        value,
        model: response.model,
    })
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceOrigin {
    Web,
    Drive,
}

/// One source document an engine may cite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub origin: EvidenceOrigin,
}

impl From<SearchResult> for Evidence {
    fn from(r: SearchResult) -> Self {
        Self {
            title: r.title,
            url: r.url,
            snippet: r.snippet,
            origin: EvidenceOrigin::Web,
        }
    }
}

/// Snippet length for internal documents fed into prompts.
const DOCUMENT_SNIPPET_CHARS: usize = 1_500;

impl From<DriveDocument> for Evidence {
    fn from(doc: DriveDocument) -> Self {
        Self {
            url: doc.link(),
            title: doc.name,
            snippet: doc.text.chars().take(DOCUMENT_SNIPPET_CHARS).collect(),
            origin: EvidenceOrigin::Drive,
        }
    }
}

/// Canonical form used when comparing citation URLs with sources.
pub(crate) fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// Normalized URLs of every evidence item.
pub(crate) fn evidence_urls(evidence: &[Evidence]) -> HashSet<String> {
    evidence.iter().map(|e| normalize_url(&e.url)).collect()
}

/// Run each query in order and merge the results, dropping repeated URLs.
/// Fails only when every query fails.
pub(crate) async fn gather_web_evidence(
    search: &dyn SearchProvider,
    queries: &[String],
    max_results: usize,
) -> Result<Vec<Evidence>, IntegrationError> {
    let mut seen = HashSet::new();
    let mut evidence = Vec::new();
    let mut last_error = None;
    let mut any_ok = false;

    for query in queries {
        match search.search(query, max_results).await {
            Ok(results) => {
                any_ok = true;
                for r in results {
                    if seen.insert(normalize_url(&r.url)) {
                        evidence.push(Evidence::from(r));
                    }
                }
            }
            Err(e) => {
                warn!(provider = search.name(), query = %query, "search failed: {e}");
                last_error = Some(e);
            }
        }
    }

    match (any_ok, last_error) {
        (false, Some(e)) => Err(e),
        _ => Ok(evidence),
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// First word of a person's name, or "there" for salutations.
pub(crate) fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or("there")
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Trimmed, non-empty strings only.
pub(crate) fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::integrations::search::{SearchProvider, SearchResult};
    use crate::integrations::IntegrationError;

    /// Search double: canned results per query substring, everything else
    /// empty. Records queries.
    #[derive(Default)]
    pub struct StaticSearch {
        pub results: HashMap<String, Vec<SearchResult>>,
        pub fail: bool,
        pub queries: Mutex<Vec<String>>,
    }

    impl StaticSearch {
        /// Every query returns `results`.
        pub fn always(results: Vec<SearchResult>) -> Self {
            let mut map = HashMap::new();
            map.insert(String::new(), results);
            Self {
                results: map,
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SearchProvider for StaticSearch {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchResult>, IntegrationError> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(IntegrationError::NotConfigured("web search"));
            }
            let mut hits: Vec<SearchResult> = self
                .results
                .iter()
                .filter(|(needle, _)| query.contains(needle.as_str()))
                .flat_map(|(_, r)| r.clone())
                .collect();
            hits.truncate(max);
            Ok(hits)
        }
    }

    pub fn result(url: &str, title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{result, StaticSearch};
    use super::*;
    use eloquas_llm::ScriptedProvider;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Answer {
        ok: bool,
    }

    #[tokio::test]
    async fn ask_json_reports_model_and_parse_errors() {
        let llm = ScriptedProvider::new();
        llm.push_json(&json!({"ok": true})).push_text("no json at all");

        let reply: Reply<Answer> = ask_json(&llm, &ChatRequest::json("s", "u")).await.unwrap();
        assert!(reply.value.ok);
        assert_eq!(reply.model, "scripted-model");

        let err = ask_json::<Answer>(&llm, &ChatRequest::json("s", "u")).await.unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));

        let err = ask_json::<Answer>(&llm, &ChatRequest::json("s", "u")).await.unwrap_err();
        assert!(matches!(err, EngineError::Llm(LlmError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn evidence_merges_queries_without_duplicates() {
        let search = StaticSearch::always(vec![
            result("https://a.example/", "A", "a"),
            result("https://b.example", "B", "b"),
        ]);
        let queries = vec!["one".to_string(), "two".to_string()];
        let evidence = gather_web_evidence(&search, &queries, 10).await.unwrap();
        assert_eq!(evidence.len(), 2);
        assert_eq!(search.query_count(), 2);
        assert!(evidence_urls(&evidence).contains("https://a.example"));
    }

    #[tokio::test]
    async fn evidence_fails_only_when_every_query_fails() {
        let search = StaticSearch::failing();
        let err = gather_web_evidence(&search, &["q".to_string()], 5).await;
        assert!(err.is_err());
    }

    #[test]
    fn helpers() {
        assert_eq!(first_name("  Pat  Doe"), "Pat");
        assert_eq!(first_name(""), "there");
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(round_to(0.456, 2), 0.46);
        assert_eq!(clean_list(vec![" a ".into(), "  ".into()]), vec!["a".to_string()]);
    }
}
