// Job-posting signals: search each tracked company for open roles, score the
// postings against target keywords and store the ones worth acting on.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use eloquas_core::config::SignalsConfig;
use eloquas_core::db::Database;
use eloquas_core::models::JobSignal;

use crate::engines::round_to;
use crate::integrations::search::SearchProvider;
use crate::integrations::IntegrationError;

pub const TARGET_KEYWORDS: [&str; 17] = [
    "SAP",
    "Oracle",
    "Dynamics 365",
    "D365",
    "QA",
    "Quality Assurance",
    "Test Automation",
    "Quality Engineering",
    "Quality Engineer",
    "Test Engineer",
    "SDET",
    "Testing",
    "Salesforce",
    "NetSuite",
    "ERP",
    "CRM",
    "Enterprise Systems",
];

const HIGH_VALUE_KEYWORDS: [&str; 6] = [
    "QA",
    "Quality Engineer",
    "Test Automation",
    "SAP",
    "Oracle",
    "Dynamics 365",
];

pub const SIGNALS_PER_COMPANY: usize = 5;
const SNIPPET_CHARS: usize = 200;
const SOURCE: &str = "web_search";

/// Whether `term` occurs in `text` on word boundaries. Both are lowercase.
fn contains_term(text: &str, term: &str) -> bool {
    text.match_indices(term).any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + term.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Target keywords found in `text`, in declaration order.
pub fn match_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TARGET_KEYWORDS
        .iter()
        .filter(|k| contains_term(&lower, &k.to_lowercase()))
        .map(|k| k.to_string())
        .collect()
}

/// 0.25 per matched keyword, plus 0.15 per high-value keyword, capped at 1.
pub fn match_score(keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let mut score = f64::min(keywords.len() as f64 * 0.25, 1.0);
    for hv in HIGH_VALUE_KEYWORDS {
        if keywords.iter().any(|k| k == hv) {
            score = f64::min(score + 0.15, 1.0);
        }
    }
    round_to(score, 2)
}

/// Stable id: first 16 hex chars of SHA-256 over company, title and URL.
pub fn signal_id(company: &str, title: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(company.as_bytes());
    hasher.update(title.as_bytes());
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

fn truncate_snippet(snippet: &str) -> Option<String> {
    let trimmed = snippet.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(SNIPPET_CHARS).collect())
}

fn job_query(company: &str) -> String {
    format!("{company} careers job opening QA OR \"test automation\" OR SAP OR Oracle OR \"Dynamics 365\"")
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    pub companies_scanned: usize,
    pub signals_found: usize,
    pub new_signals: usize,
    /// Companies whose search failed, with the reason.
    pub failed: Vec<String>,
}

pub struct SignalScanner<'a> {
    db: &'a Database,
    search: &'a dyn SearchProvider,
    config: &'a SignalsConfig,
    max_results: usize,
}

impl<'a> SignalScanner<'a> {
    pub fn new(
        db: &'a Database,
        search: &'a dyn SearchProvider,
        config: &'a SignalsConfig,
        max_results: usize,
    ) -> Self {
        Self {
            db,
            search,
            config,
            max_results,
        }
    }

    /// Postings for one company that score above `min_match_score`.
    pub async fn scan_company(&self, company: &str, now: DateTime<Utc>) -> Result<Vec<JobSignal>, IntegrationError> {
        let results = self.search.search(&job_query(company), self.max_results).await?;
        debug!(company, results = results.len(), "job search finished");

        let signals = results
            .into_iter()
            .filter_map(|r| {
                let keywords = match_keywords(&format!("{} {}", r.title, r.snippet));
                let score = match_score(&keywords);
                if score <= self.config.min_match_score {
                    return None;
                }
                Some(JobSignal {
                    id: signal_id(company, &r.title, &r.url),
                    company: company.to_string(),
                    title: r.title.trim().to_string(),
                    url: r.url,
                    keywords,
                    match_score: score,
                    source: SOURCE.to_string(),
                    snippet: truncate_snippet(&r.snippet),
                    detected_at: now,
                })
            })
            .collect();
        Ok(signals)
    }

    /// Watchlist plus every prospect company, case-insensitively distinct.
    pub fn companies(&self) -> anyhow::Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut companies = Vec::new();
        let tracked = self.db.prospect_companies(None)?;
        for company in self.config.watchlist.iter().chain(tracked.iter()) {
            let company = company.trim();
            if !company.is_empty() && seen.insert(company.to_lowercase()) {
                companies.push(company.to_string());
            }
        }
        Ok(companies)
    }

    /// Scan every tracked company and store new signals. A failing search
    /// is recorded and the scan moves on.
    pub async fn scan_all(&self, now: DateTime<Utc>) -> anyhow::Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        for company in self.companies()? {
            summary.companies_scanned += 1;
            match self.scan_company(&company, now).await {
                Ok(signals) => {
                    summary.signals_found += signals.len();
                    summary.new_signals += self.db.store_signals(&signals)?;
                }
                Err(e) => {
                    warn!(company = %company, "signal scan failed: {e}");
                    summary.failed.push(format!("{company}: {e}"));
                }
            }
        }
        info!(
            companies = summary.companies_scanned,
            found = summary.signals_found,
            new = summary.new_signals,
            "signal scan finished"
        );
        Ok(summary)
    }
}

/// Signals for a user's prospect companies, at most five per company,
/// newest first.
pub fn user_signals(db: &Database, user_id: &str, limit: usize) -> anyhow::Result<Vec<JobSignal>> {
    let companies = db.prospect_companies(Some(user_id))?;
    let mut signals = db.signals_for_companies(&companies, SIGNALS_PER_COMPANY, None)?;
    signals.truncate(limit);
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::test_support::{result, StaticSearch};
    use eloquas_core::models::{NewProspect, NewUser, Role};
    use pretty_assertions::assert_eq;

    #[test]
    fn keywords_match_on_word_boundaries() {
        assert_eq!(match_keywords("Senior QA Engineer - SAP S/4HANA"), vec!["SAP", "QA"]);
        assert!(match_keywords("Aquatics instructor").is_empty());
        assert_eq!(
            match_keywords("Test Automation Engineer (Testing)"),
            vec!["Test Automation", "Testing"]
        );
    }

    #[test]
    fn score_adds_high_value_bonus() {
        let kw = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(match_score(&[]), 0.0);
        // .25 + .15
        assert_eq!(match_score(&kw(&["QA"])), 0.4);
        // .25 only
        assert_eq!(match_score(&kw(&["CRM"])), 0.25);
        // .75 + .15 + .15 capped
        assert_eq!(match_score(&kw(&["SAP", "Oracle", "ERP"])), 1.0);
    }

    #[test]
    fn signal_id_is_stable_and_short() {
        let a = signal_id("Acme", "QA Lead", "https://jobs/1");
        assert_eq!(a.len(), 16);
        assert_eq!(a, signal_id("Acme", "QA Lead", "https://jobs/1"));
        assert_ne!(a, signal_id("Acme", "QA Lead", "https://jobs/2"));
    }

    #[tokio::test]
    async fn scan_keeps_strong_postings_and_dedups() {
        let db = Database::open(":memory:").unwrap();
        let user = db
            .create_user(&NewUser {
                email: "rep@eloquas.ai".into(),
                password_hash: "h".into(),
                role: Role::Bdr,
                company: None,
                full_name: None,
            })
            .unwrap();
        db.add_prospect(
            &user.id,
            &NewProspect {
                name: "Pat".into(),
                email: "pat@acme.com".into(),
                company: "Acme".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let search = StaticSearch::always(vec![
            result("https://jobs.example/1", "QA Automation Lead", "SAP test automation across ERP"),
            result("https://jobs.example/2", "Office Manager", "Front desk and scheduling"),
        ]);
        let config = SignalsConfig {
            watchlist: vec!["acme".into(), "Globex".into()],
            min_match_score: 0.5,
        };
        let scanner = SignalScanner::new(&db, &search, &config, 5);

        assert_eq!(scanner.companies().unwrap(), vec!["acme".to_string(), "Globex".to_string()]);

        let now = Utc::now();
        let first = scanner.scan_all(now).await.unwrap();
        assert_eq!(first.companies_scanned, 2);
        assert_eq!(first.signals_found, 2);
        assert_eq!(first.new_signals, 2);

        let second = scanner.scan_all(now).await.unwrap();
        assert_eq!(second.new_signals, 0);

        let mine = user_signals(&db, &user.id, 10).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "QA Automation Lead");
        assert!(mine[0].match_score > 0.5);
    }

    #[tokio::test]
    async fn failed_search_is_recorded() {
        let db = Database::open(":memory:").unwrap();
        let search = StaticSearch::failing();
        let config = SignalsConfig {
            watchlist: vec!["Acme".into()],
            min_match_score: 0.5,
        };
        let summary = SignalScanner::new(&db, &search, &config, 5).scan_all(Utc::now()).await.unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.new_signals, 0);
    }
}
