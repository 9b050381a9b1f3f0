// Account research: summarize a company from searched sources with the
// research model, keeping only claims backed by those sources.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use eloquas_core::db::Database;
use eloquas_core::models::{AccountResearch, NewAccountResearch};
use eloquas_llm::{ChatProvider, ChatRequest};

use super::{
    ask_json, clamp_unit, clean_list, evidence_urls, gather_web_evidence, normalize_url, prompt,
    EngineError, Evidence, Generated,
};
use crate::integrations::search::SearchProvider;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub fact: String,
    pub source_url: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchReport {
    pub company: String,
    pub summary: String,
    pub pain_points: Vec<String>,
    pub initiatives: Vec<String>,
    pub talking_points: Vec<String>,
    pub insights: Vec<Insight>,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReport {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    pain_points: Vec<String>,
    #[serde(default)]
    initiatives: Vec<String>,
    #[serde(default)]
    talking_points: Vec<String>,
    #[serde(default)]
    insights: Vec<RawInsight>,
    #[serde(default, alias = "sources")]
    citations: Vec<Citation>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInsight {
    #[serde(default)]
    fact: String,
    #[serde(default, alias = "url", alias = "source")]
    source_url: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.7
}

pub struct ResearchInsightsEngine<'a> {
    llm: &'a dyn ChatProvider,
    search: &'a dyn SearchProvider,
    research_model: Option<String>,
    min_citations: usize,
    max_results: usize,
}

impl<'a> ResearchInsightsEngine<'a> {
    pub fn new(llm: &'a dyn ChatProvider, search: &'a dyn SearchProvider, min_citations: usize, max_results: usize) -> Self {
        Self {
            llm,
            search,
            research_model: None,
            min_citations,
            max_results,
        }
    }

    /// Ask for a specific model; the client still falls back to its
    /// fallback model when this one fails.
    pub fn with_research_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.research_model = (!model.trim().is_empty()).then_some(model);
        self
    }

    pub fn min_citations(&self) -> usize {
        self.min_citations
    }

    pub async fn research(&self, company: &str) -> Result<Generated<ResearchReport>, EngineError> {
        let evidence = gather_web_evidence(self.search, &search_queries(company), self.max_results)
            .await
            .unwrap_or_else(|e| {
                warn!(company, "research search unavailable: {e}");
                Vec::new()
            });
        self.research_with(company, &evidence, None).await
    }

    /// Research from evidence gathered elsewhere, optionally with extra
    /// context (e.g. internal notes) for the prompt.
    pub async fn research_with(
        &self,
        company: &str,
        evidence: &[Evidence],
        context: Option<&str>,
    ) -> Result<Generated<ResearchReport>, EngineError> {
        let distinct = evidence_urls(evidence).len();
        if distinct < self.min_citations {
            return Err(EngineError::InsufficientEvidence(format!(
                "found {distinct} distinct sources for {company}, need at least {}",
                self.min_citations
            )));
        }

        let mut request = ChatRequest::json(
            prompt::research_system_prompt(),
            prompt::build_research_prompt(company, evidence, context, self.min_citations),
        )
        .with_max_tokens(4_000);
        if let Some(model) = &self.research_model {
            request = request.with_model(model.clone());
        }

        let reply = ask_json::<RawReport>(self.llm, &request).await?;
        let report = validate(company, reply.value, evidence, self.min_citations)?;
        info!(
            company,
            citations = report.citations.len(),
            insights = report.insights.len(),
            model = %reply.model,
            "research report ready"
        );
        Ok(Generated::from_model(report, reply.model))
    }
}

fn search_queries(company: &str) -> Vec<String> {
    vec![
        format!("{company} company overview strategy"),
        format!("{company} digital transformation ERP initiative"),
        format!("{company} news earnings challenges"),
    ]
}

/// Source-quality check: citations must come from the evidence, be distinct
/// and number at least `min_citations`. Insights citing anything else are
/// dropped.
fn validate(
    company: &str,
    raw: RawReport,
    evidence: &[Evidence],
    min_citations: usize,
) -> Result<ResearchReport, EngineError> {
    let known = evidence_urls(evidence);
    let mut seen = HashSet::new();
    let citations: Vec<Citation> = raw
        .citations
        .into_iter()
        .filter_map(|c| {
            let url = c.url.trim().to_string();
            let key = normalize_url(&url);
            if !known.contains(&key) || !seen.insert(key.clone()) {
                return None;
            }
            let title = if c.title.trim().is_empty() {
                evidence
                    .iter()
                    .find(|e| normalize_url(&e.url) == key)
                    .map(|e| e.title.clone())
                    .unwrap_or_default()
            } else {
                c.title.trim().to_string()
            };
            Some(Citation { url, title })
        })
        .collect();

    if citations.len() < min_citations {
        return Err(EngineError::InsufficientEvidence(format!(
            "report for {company} cites {} valid sources, need at least {min_citations}",
            citations.len()
        )));
    }

    let insights = raw
        .insights
        .into_iter()
        .filter(|i| !i.fact.trim().is_empty() && known.contains(&normalize_url(&i.source_url)))
        .map(|i| Insight {
            fact: i.fact.trim().to_string(),
            source_url: i.source_url.trim().to_string(),
            confidence: clamp_unit(i.confidence),
        })
        .collect();

    Ok(ResearchReport {
        company: company.to_string(),
        summary: raw.summary.trim().to_string(),
        pain_points: clean_list(raw.pain_points),
        initiatives: clean_list(raw.initiatives),
        talking_points: clean_list(raw.talking_points),
        insights,
        citations,
    })
}

/// Store a validated report as an AccountResearch row and each insight as a
/// CompanyFact. Returns the saved row.
pub fn persist(
    db: &Database,
    user_id: &str,
    account_id: Option<&str>,
    report: &Generated<ResearchReport>,
    intent_score: Option<f64>,
) -> Result<AccountResearch, EngineError> {
    let r = &report.value;
    let mut payload = serde_json::to_value(r).map_err(|e| EngineError::Store(e.into()))?;
    if let Some(model) = &report.model {
        payload["model"] = serde_json::Value::String(model.clone());
    }

    let saved = db.save_account_research(
        user_id,
        &NewAccountResearch {
            account_id: account_id.map(str::to_string),
            company: r.company.clone(),
            summary: r.summary.clone(),
            intent_score,
            payload,
            sources: r.citations.iter().map(|c| c.url.clone()).collect(),
        },
    )?;

    let mut new_facts = 0;
    for insight in &r.insights {
        let title = r
            .citations
            .iter()
            .find(|c| normalize_url(&c.url) == normalize_url(&insight.source_url))
            .map(|c| c.title.as_str())
            .filter(|t| !t.is_empty());
        if db.save_company_fact(
            &r.company,
            &insight.fact,
            Some(insight.source_url.as_str()),
            title,
            insight.confidence,
        )? {
            new_facts += 1;
        }
    }
    info!(company = %r.company, research = %saved.id, new_facts, "research persisted");
    Ok(saved)
}
