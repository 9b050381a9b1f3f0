// Enterprise platform discovery: which ERP/CRM/ITSM suites a company runs.
// A keyword pass over search results proposes candidates; the model confirms
// them against the evidence.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use eloquas_core::cache::TtlCache;
use eloquas_llm::{ChatProvider, ChatRequest};

use super::{
    ask_json, clamp_unit, evidence_urls, gather_web_evidence, normalize_url, prompt, round_to,
    Evidence, Generated,
};
use crate::integrations::search::SearchProvider;

/// Canonical platform names and the spellings that identify them.
pub const PLATFORMS: &[(&str, &[&str])] = &[
    ("SAP", &["SAP", "S/4HANA", "S4HANA", "SAP ECC", "SuccessFactors"]),
    ("Oracle", &["Oracle", "Oracle EBS", "Oracle Fusion", "JD Edwards", "PeopleSoft"]),
    ("Microsoft Dynamics 365", &["Dynamics 365", "D365", "Dynamics AX", "Dynamics NAV", "Dynamics CRM"]),
    ("Salesforce", &["Salesforce", "SFDC"]),
    ("Workday", &["Workday"]),
    ("NetSuite", &["NetSuite"]),
    ("ServiceNow", &["ServiceNow"]),
];

fn matchers() -> &'static [(&'static str, Regex)] {
    static MATCHERS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        PLATFORMS
            .iter()
            .filter_map(|(name, aliases)| {
                let alternation = aliases
                    .iter()
                    .map(|a| regex::escape(a))
                    .collect::<Vec<_>>()
                    .join("|");
                Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
                    .ok()
                    .map(|re| (*name, re))
            })
            .collect()
    })
}

/// Canonical name for a platform label, matching names and aliases.
pub fn canonical_platform(label: &str) -> Option<&'static str> {
    let label = label.trim();
    matchers()
        .iter()
        .find(|(name, re)| name.eq_ignore_ascii_case(label) || re.is_match(label))
        .map(|(name, _)| *name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedPlatform {
    pub name: String,
    pub confidence: f64,
    /// URLs of the sources mentioning the platform.
    pub evidence: Vec<String>,
    pub mentions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformReport {
    pub company: String,
    pub platforms: Vec<DetectedPlatform>,
    pub sources: Vec<Evidence>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPlatforms {
    #[serde(default)]
    platforms: Vec<RawPlatform>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPlatform {
    #[serde(default)]
    name: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default, alias = "sources", alias = "urls")]
    evidence: Vec<String>,
}

/// Keyword pass: one entry per platform mentioned anywhere in the evidence.
/// Confidence grows with the number of distinct sources mentioning it.
pub fn detect_platforms(evidence: &[Evidence]) -> Vec<DetectedPlatform> {
    let mut detected: Vec<DetectedPlatform> = matchers()
        .iter()
        .filter_map(|(name, re)| {
            let mut urls = Vec::new();
            let mut mentions = 0;
            for e in evidence {
                let hits = re.find_iter(&e.title).count() + re.find_iter(&e.snippet).count();
                if hits > 0 {
                    mentions += hits;
                    urls.push(e.url.clone());
                }
            }
            if urls.is_empty() {
                return None;
            }
            Some(DetectedPlatform {
                name: name.to_string(),
                confidence: round_to((0.3 + 0.2 * urls.len() as f64).min(1.0), 2),
                evidence: urls,
                mentions,
            })
        })
        .collect();
    sort_by_confidence(&mut detected);
    detected
}

fn sort_by_confidence(platforms: &mut [DetectedPlatform]) {
    platforms.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
}

pub struct PlatformDiscoveryEngine<'a> {
    llm: &'a dyn ChatProvider,
    search: &'a dyn SearchProvider,
    cache: &'a TtlCache<String, Generated<PlatformReport>>,
    max_results: usize,
}

impl<'a> PlatformDiscoveryEngine<'a> {
    pub fn new(
        llm: &'a dyn ChatProvider,
        search: &'a dyn SearchProvider,
        cache: &'a TtlCache<String, Generated<PlatformReport>>,
        max_results: usize,
    ) -> Self {
        Self {
            llm,
            search,
            cache,
            max_results,
        }
    }

    pub async fn discover(&self, company: &str) -> Generated<PlatformReport> {
        let key = company.trim().to_lowercase();
        if let Some(hit) = self.cache.get(&key) {
            debug!(company, "platform report served from cache");
            return hit;
        }

        let queries = vec![
            format!("{company} ERP CRM platform SAP Oracle Dynamics Salesforce"),
            format!("{company} jobs Workday NetSuite ServiceNow administrator"),
        ];
        let evidence = gather_web_evidence(self.search, &queries, self.max_results)
            .await
            .unwrap_or_else(|e| {
                warn!(company, "platform search unavailable: {e}");
                Vec::new()
            });
        if evidence.is_empty() {
            return Generated::fallback(PlatformReport {
                company: company.to_string(),
                platforms: Vec::new(),
                sources: Vec::new(),
            });
        }

        let report = self.analyze(company, evidence).await;
        // Heuristic-only answers are retried on the next request.
        if !report.used_fallback {
            self.cache.insert(key, report.clone());
        }
        report
    }

    async fn analyze(&self, company: &str, evidence: Vec<Evidence>) -> Generated<PlatformReport> {
        let heuristic = detect_platforms(&evidence);
        let request = ChatRequest::json(
            prompt::platform_system_prompt(),
            prompt::build_platform_prompt(company, &evidence, &heuristic),
        )
        .with_temperature(0.1);

        match ask_json::<RawPlatforms>(self.llm, &request).await {
            Ok(reply) => {
                let platforms = confirm_platforms(reply.value.platforms, &evidence);
                info!(
                    company,
                    heuristic = heuristic.len(),
                    confirmed = platforms.len(),
                    "platforms discovered"
                );
                Generated::from_model(
                    PlatformReport {
                        company: company.to_string(),
                        platforms,
                        sources: evidence,
                    },
                    reply.model,
                )
            }
            Err(e) => {
                warn!(company, "platform confirmation failed, using keyword matches: {e}");
                Generated::fallback(PlatformReport {
                    company: company.to_string(),
                    platforms: heuristic,
                    sources: evidence,
                })
            }
        }
    }
}

/// Keep known platforms backed by at least one searched source, merging
/// entries the model listed twice under different spellings.
fn confirm_platforms(raw: Vec<RawPlatform>, evidence: &[Evidence]) -> Vec<DetectedPlatform> {
    let known = evidence_urls(evidence);
    let mut seen = HashSet::new();
    let mut confirmed = Vec::new();

    for p in raw {
        let Some(name) = canonical_platform(&p.name) else {
            continue;
        };
        let urls: Vec<String> = p
            .evidence
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| known.contains(&normalize_url(u)))
            .collect();
        if urls.is_empty() || !seen.insert(name) {
            continue;
        }
        confirmed.push(DetectedPlatform {
            name: name.to_string(),
            confidence: round_to(clamp_unit(p.confidence), 2),
            mentions: urls.len(),
            evidence: urls,
        });
    }
    sort_by_confidence(&mut confirmed);
    confirmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::test_support::{result, StaticSearch};
    use crate::engines::EvidenceOrigin;
    use eloquas_llm::ScriptedProvider;
    use serde_json::json;
    use std::time::Duration;

    fn ev(url: &str, snippet: &str) -> Evidence {
        Evidence {
            title: String::new(),
            url: url.into(),
            snippet: snippet.into(),
            origin: EvidenceOrigin::Web,
        }
    }

    #[test]
    fn heuristic_counts_sources_and_respects_word_boundaries() {
        let evidence = vec![
            ev("https://a", "Acme runs SAP S/4HANA and SAP ECC"),
            ev("https://b", "Hiring a D365 developer; sapling is not a platform"),
            ev("https://c", "Our SAP team is growing"),
        ];
        let found = detect_platforms(&evidence);
        assert_eq!(found[0].name, "SAP");
        assert_eq!(found[0].confidence, 0.7);
        assert_eq!(found[0].mentions, 4);
        assert_eq!(found[0].evidence, vec!["https://a".to_string(), "https://c".to_string()]);
        assert_eq!(found[1].name, "Microsoft Dynamics 365");
        assert_eq!(found[1].confidence, 0.5);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn labels_canonicalize() {
        assert_eq!(canonical_platform("dynamics 365"), Some("Microsoft Dynamics 365"));
        assert_eq!(canonical_platform("S/4HANA"), Some("SAP"));
        assert_eq!(canonical_platform("Jira"), None);
    }

    #[tokio::test]
    async fn model_confirmation_requires_known_sources_and_is_cached() {
        let llm = ScriptedProvider::new();
        llm.push_json(&json!({ "platforms": [
            { "name": "SAP", "confidence": 0.9, "evidence": ["https://jobs.acme.com/sap/"] },
            { "name": "S/4HANA", "confidence": 0.8, "evidence": ["https://jobs.acme.com/sap"] },
            { "name": "Workday", "confidence": 0.6, "evidence": ["https://invented.example"] },
            { "name": "Jira", "confidence": 0.9, "evidence": ["https://jobs.acme.com/sap"] }
        ] }));
        let search = StaticSearch::always(vec![result(
            "https://jobs.acme.com/sap",
            "SAP Basis Admin",
            "Acme is hiring for SAP",
        )]);
        let cache = TtlCache::new(Duration::from_secs(60));
        let engine = PlatformDiscoveryEngine::new(&llm, &search, &cache, 5);

        let first = engine.discover("Acme").await;
        assert!(!first.used_fallback);
        assert_eq!(first.value.platforms.len(), 1);
        assert_eq!(first.value.platforms[0].name, "SAP");

        let second = engine.discover("  ACME ").await;
        assert_eq!(second, first);
        assert_eq!(llm.requests().len(), 1);
        assert_eq!(search.query_count(), 2);
    }

    #[tokio::test]
    async fn model_failure_returns_heuristic_without_caching_it() {
        let llm = ScriptedProvider::new();
        llm.push_failure(500);
        let search = StaticSearch::always(vec![result("https://x.example", "NetSuite admin", "")]);
        let cache = TtlCache::new(Duration::from_secs(60));
        let engine = PlatformDiscoveryEngine::new(&llm, &search, &cache, 5);

        let out = engine.discover("Acme").await;
        assert!(out.used_fallback);
        assert_eq!(out.value.platforms[0].name, "NetSuite");
        assert!(cache.is_empty());

        llm.push_json(&json!({ "platforms": [] }));
        let retried = engine.discover("Acme").await;
        assert!(!retried.used_fallback);
        assert!(!cache.is_empty());
        assert_eq!(llm.requests().len(), 2);
    }

    #[tokio::test]
    async fn empty_evidence_is_not_cached() {
        let llm = ScriptedProvider::new();
        let search = StaticSearch::failing();
        let cache = TtlCache::new(Duration::from_secs(60));
        let out = PlatformDiscoveryEngine::new(&llm, &search, &cache, 5).discover("Acme").await;
        assert!(out.value.platforms.is_empty());
        assert!(cache.is_empty());
        assert!(llm.requests().is_empty());
    }
}
