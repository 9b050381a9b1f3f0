// Buying-intent discovery: search the web for a company, let the model pick
// out intent signals, and score them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use eloquas_llm::{ChatProvider, ChatRequest};

use super::{
    ask_json, clamp_unit, evidence_urls, gather_web_evidence, normalize_url, prompt, round_to,
    Evidence, Generated,
};
use crate::integrations::search::SearchProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Hiring,
    TechnologyChange,
    LeadershipChange,
    Funding,
    Expansion,
    News,
}

impl IntentKind {
    pub const ALL: [IntentKind; 6] = [
        IntentKind::Hiring,
        IntentKind::TechnologyChange,
        IntentKind::LeadershipChange,
        IntentKind::Funding,
        IntentKind::Expansion,
        IntentKind::News,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Hiring => "hiring",
            IntentKind::TechnologyChange => "technology_change",
            IntentKind::LeadershipChange => "leadership_change",
            IntentKind::Funding => "funding",
            IntentKind::Expansion => "expansion",
            IntentKind::News => "news",
        }
    }

    /// Contribution of this kind to the intent score. Weights sum to 1.
    pub fn weight(&self) -> f64 {
        match self {
            IntentKind::Hiring => 0.30,
            IntentKind::TechnologyChange => 0.25,
            IntentKind::LeadershipChange => 0.15,
            IntentKind::Funding => 0.15,
            IntentKind::Expansion => 0.10,
            IntentKind::News => 0.05,
        }
    }

    /// Lenient parse of the model's label ("Technology Change", "tech-change").
    pub fn parse(label: &str) -> Option<Self> {
        let key: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        match key.as_str() {
            "hiring" | "job_posting" | "jobs" => Some(IntentKind::Hiring),
            "technology_change" | "tech_change" | "technology" => Some(IntentKind::TechnologyChange),
            "leadership_change" | "leadership" | "executive_change" => Some(IntentKind::LeadershipChange),
            "funding" | "investment" => Some(IntentKind::Funding),
            "expansion" | "growth" => Some(IntentKind::Expansion),
            "news" => Some(IntentKind::News),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentSignal {
    pub kind: IntentKind,
    pub description: String,
    pub confidence: f64,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentReport {
    pub company: String,
    /// 0-100.
    pub intent_score: f64,
    pub signals: Vec<IntentSignal>,
    pub summary: String,
    pub sources: Vec<Evidence>,
    pub insufficient_evidence: bool,
}

impl IntentReport {
    fn insufficient(company: &str, sources: Vec<Evidence>) -> Self {
        Self {
            company: company.to_string(),
            intent_score: 0.0,
            signals: Vec::new(),
            summary: String::new(),
            sources,
            insufficient_evidence: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawReport {
    #[serde(default)]
    signals: Vec<RawSignal>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawSignal {
    #[serde(default, rename = "type", alias = "kind")]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default, alias = "url", alias = "source")]
    source_url: String,
}

pub struct IntentDiscoveryEngine<'a> {
    llm: &'a dyn ChatProvider,
    search: &'a dyn SearchProvider,
    max_results: usize,
}

impl<'a> IntentDiscoveryEngine<'a> {
    pub fn new(llm: &'a dyn ChatProvider, search: &'a dyn SearchProvider, max_results: usize) -> Self {
        Self {
            llm,
            search,
            max_results,
        }
    }

    /// Search the web for `company`, then analyze what came back.
    pub async fn discover(&self, company: &str) -> Generated<IntentReport> {
        let evidence = gather_web_evidence(self.search, &search_queries(company), self.max_results)
            .await
            .unwrap_or_else(|e| {
                warn!(company, "intent search unavailable: {e}");
                Vec::new()
            });
        self.analyze(company, evidence).await
    }

    /// Extract signals from already-gathered evidence. Without evidence, or
    /// when the model fails, the report is empty and flagged.
    pub async fn analyze(&self, company: &str, evidence: Vec<Evidence>) -> Generated<IntentReport> {
        if evidence.is_empty() {
            info!(company, "no evidence for intent discovery");
            return Generated::fallback(IntentReport::insufficient(company, evidence));
        }

        let request = ChatRequest::json(
            prompt::intent_system_prompt(),
            prompt::build_intent_prompt(company, &evidence),
        )
        .with_temperature(0.2);

        match ask_json::<RawReport>(self.llm, &request).await {
            Ok(reply) => {
                let offered = reply.value.signals.len();
                let signals = validate_signals(reply.value.signals, &evidence);
                if offered != signals.len() {
                    info!(company, offered, kept = signals.len(), "dropped uncited intent signals");
                }
                let report = if signals.is_empty() {
                    IntentReport::insufficient(company, evidence)
                } else {
                    IntentReport {
                        company: company.to_string(),
                        intent_score: intent_score(&signals),
                        signals,
                        summary: reply.value.summary.trim().to_string(),
                        sources: evidence,
                        insufficient_evidence: false,
                    }
                };
                Generated::from_model(report, reply.model)
            }
            Err(e) => {
                warn!(company, "intent analysis failed: {e}");
                Generated::fallback(IntentReport::insufficient(company, evidence))
            }
        }
    }
}

pub(crate) fn search_queries(company: &str) -> Vec<String> {
    vec![
        format!("{company} hiring QA test automation jobs"),
        format!("{company} ERP migration OR new CIO OR funding OR expansion news"),
    ]
}

/// Keep signals with a known kind and a URL that is one of the sources.
fn validate_signals(raw: Vec<RawSignal>, evidence: &[Evidence]) -> Vec<IntentSignal> {
    let known = evidence_urls(evidence);
    raw.into_iter()
        .filter_map(|s| {
            let kind = IntentKind::parse(&s.kind)?;
            let url = s.source_url.trim();
            if url.is_empty() || !known.contains(&normalize_url(url)) {
                return None;
            }
            let description = s.description.trim();
            if description.is_empty() {
                return None;
            }
            Some(IntentSignal {
                kind,
                description: description.to_string(),
                confidence: clamp_unit(s.confidence),
                source_url: url.to_string(),
            })
        })
        .collect()
}

/// 100 x weighted mean of the strongest confidence per kind, over the kinds
/// present. One decimal.
pub fn intent_score(signals: &[IntentSignal]) -> f64 {
    let mut best: HashMap<IntentKind, f64> = HashMap::new();
    for s in signals {
        let entry = best.entry(s.kind).or_insert(0.0);
        *entry = entry.max(s.confidence);
    }
    let total_weight: f64 = best.keys().map(IntentKind::weight).sum();
    if total_weight == 0.0 {
        return 0.0;
    }
    let weighted: f64 = best.iter().map(|(kind, conf)| kind.weight() * conf).sum();
    round_to(100.0 * weighted / total_weight, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::test_support::{result, StaticSearch};
    use eloquas_llm::ScriptedProvider;
    use serde_json::json;

    fn sig(kind: IntentKind, confidence: f64) -> IntentSignal {
        IntentSignal {
            kind,
            description: "d".into(),
            confidence,
            source_url: "https://x.example".into(),
        }
    }

    fn search() -> StaticSearch {
        StaticSearch::always(vec![
            result("https://jobs.acme.com/qa-lead", "QA Lead", "Acme is hiring a QA lead"),
            result("https://news.example/acme-sap", "Acme picks SAP", "Acme moves to S/4HANA"),
        ])
    }

    #[test]
    fn score_is_weighted_mean_over_present_kinds() {
        assert_eq!(intent_score(&[]), 0.0);
        assert_eq!(intent_score(&[sig(IntentKind::Hiring, 0.8)]), 80.0);
        // (0.30*1.0 + 0.05*0.5) / 0.35
        assert_eq!(
            intent_score(&[sig(IntentKind::Hiring, 1.0), sig(IntentKind::News, 0.5), sig(IntentKind::Hiring, 0.2)]),
            92.9
        );
    }

    #[test]
    fn kind_labels_parse_leniently() {
        assert_eq!(IntentKind::parse("Technology Change"), Some(IntentKind::TechnologyChange));
        assert_eq!(IntentKind::parse("leadership-change"), Some(IntentKind::LeadershipChange));
        assert_eq!(IntentKind::parse("weather"), None);
        let total: f64 = IntentKind::ALL.iter().map(IntentKind::weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn uncited_signals_are_dropped() {
        let llm = ScriptedProvider::new();
        llm.push_json(&json!({
            "summary": "Acme is investing in QA",
            "signals": [
                { "type": "hiring", "description": "QA lead role", "confidence": 0.9, "source_url": "https://jobs.acme.com/qa-lead/" },
                { "type": "funding", "description": "Made up round", "confidence": 1.0, "source_url": "https://elsewhere.example" },
                { "type": "technology_change", "description": "SAP move", "confidence": 1.4, "source_url": "https://news.example/acme-sap" }
            ]
        }));
        let search = search();
        let engine = IntentDiscoveryEngine::new(&llm, &search, 5);

        let out = engine.discover("Acme").await;
        let report = out.value;
        assert!(!report.insufficient_evidence);
        assert_eq!(report.signals.len(), 2);
        assert_eq!(report.signals[1].confidence, 1.0);
        assert_eq!(report.sources.len(), 2);
        // (0.30*0.9 + 0.25*1.0) / 0.55
        assert_eq!(report.intent_score, 94.5);
        assert_eq!(search.query_count(), 2);
    }

    #[tokio::test]
    async fn no_evidence_skips_the_model() {
        let llm = ScriptedProvider::new();
        let search = StaticSearch::failing();
        let out = IntentDiscoveryEngine::new(&llm, &search, 5).discover("Acme").await;
        assert!(out.value.insufficient_evidence);
        assert!(out.value.signals.is_empty());
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn model_failure_or_all_dropped_is_insufficient() {
        let llm = ScriptedProvider::new();
        llm.push_failure(502).push_json(&json!({
            "signals": [{ "type": "news", "description": "x", "confidence": 0.5, "source_url": "https://unknown.example" }]
        }));
        let search = search();
        let engine = IntentDiscoveryEngine::new(&llm, &search, 5);

        let failed = engine.discover("Acme").await;
        assert!(failed.used_fallback);
        assert!(failed.value.insufficient_evidence);

        let dropped = engine.discover("Acme").await;
        assert!(!dropped.used_fallback);
        assert!(dropped.value.insufficient_evidence);
        assert_eq!(dropped.value.intent_score, 0.0);
    }
}
