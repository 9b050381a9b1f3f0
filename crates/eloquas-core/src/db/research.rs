// Account research reports, company facts and research sessions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{enum_column, json_column, new_id, Database, StoreError};
use crate::models::{
    AccountResearch, CompanyFact, NewAccountResearch, ResearchSession, ResearchStatus,
};

fn research_from_row(row: &Row<'_>) -> rusqlite::Result<AccountResearch> {
    let payload: String = row.get(6)?;
    let sources: String = row.get(7)?;
    Ok(AccountResearch {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        company: row.get(3)?,
        summary: row.get(4)?,
        intent_score: row.get(5)?,
        payload: json_column(6, &payload)?,
        sources: json_column(7, &sources)?,
        created_at: row.get(8)?,
    })
}

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<CompanyFact> {
    Ok(CompanyFact {
        id: row.get(0)?,
        company: row.get(1)?,
        fact: row.get(2)?,
        source_url: row.get(3)?,
        source_title: row.get(4)?,
        confidence: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ResearchSession> {
    let status: String = row.get(3)?;
    let result: Option<String> = row.get(4)?;
    Ok(ResearchSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        company: row.get(2)?,
        status: enum_column(3, &status)?,
        result: result.map(|r| json_column(4, &r)).transpose()?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        completed_at: row.get(7)?,
    })
}

const SESSION_COLUMNS: &str = "id, user_id, company, status, result, error, created_at, completed_at";

impl Database {
    // ------------------------------------------------------------------
    // Account research
    // ------------------------------------------------------------------

    pub fn save_account_research(
        &self,
        user_id: &str,
        new: &NewAccountResearch,
    ) -> Result<AccountResearch> {
        let conn = self.conn();
        let research = AccountResearch {
            id: new_id(),
            user_id: user_id.to_string(),
            account_id: new.account_id.clone(),
            company: new.company.clone(),
            summary: new.summary.clone(),
            intent_score: new.intent_score,
            payload: new.payload.clone(),
            sources: new.sources.clone(),
            created_at: Utc::now(),
        };
        let payload = serde_json::to_string(&research.payload).context("failed to serialize payload")?;
        let sources = serde_json::to_string(&research.sources).context("failed to serialize sources")?;
        conn.execute(
            "INSERT INTO account_research
                (id, user_id, account_id, company, summary, intent_score, payload, sources, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                research.id,
                research.user_id,
                research.account_id,
                research.company,
                research.summary,
                research.intent_score,
                payload,
                sources,
                research.created_at,
            ],
        )
        .context("failed to insert account research")?;
        Ok(research)
    }

    /// Research reports for a user, optionally narrowed to one company.
    pub fn list_account_research(
        &self,
        user_id: &str,
        company: Option<&str>,
    ) -> Result<Vec<AccountResearch>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, account_id, company, summary, intent_score, payload, sources, created_at
                 FROM account_research
                 WHERE user_id = ?1 AND (?2 IS NULL OR lower(company) = lower(?2))
                 ORDER BY created_at DESC",
            )
            .context("failed to prepare list_account_research query")?;
        let rows = stmt
            .query_map(params![user_id, company], research_from_row)
            .context("failed to query account research")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map research rows")?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Company facts
    // ------------------------------------------------------------------

    /// Store a fact about a company. Returns `false` when the same fact is
    /// already recorded for that company.
    pub fn save_company_fact(
        &self,
        company: &str,
        fact: &str,
        source_url: Option<&str>,
        source_title: Option<&str>,
        confidence: f64,
    ) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute(
                "INSERT OR IGNORE INTO company_facts
                    (id, company, fact, source_url, source_title, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new_id(),
                    company.trim(),
                    fact.trim(),
                    source_url,
                    source_title,
                    confidence.clamp(0.0, 1.0),
                    Utc::now(),
                ],
            )
            .context("failed to insert company fact")?;
        Ok(n > 0)
    }

    /// Facts for a company, highest confidence first.
    pub fn company_facts(&self, company: &str) -> Result<Vec<CompanyFact>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, company, fact, source_url, source_title, confidence, created_at
                 FROM company_facts WHERE lower(company) = lower(?1)
                 ORDER BY confidence DESC, created_at DESC",
            )
            .context("failed to prepare company_facts query")?;
        let rows = stmt
            .query_map(params![company.trim()], fact_from_row)
            .context("failed to query company facts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map company fact rows")?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Research sessions
    // ------------------------------------------------------------------

    pub fn start_research_session(&self, user_id: &str, company: &str) -> Result<ResearchSession> {
        let conn = self.conn();
        let session = ResearchSession {
            id: new_id(),
            user_id: user_id.to_string(),
            company: company.trim().to_string(),
            status: ResearchStatus::Running,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        conn.execute(
            "INSERT INTO research_sessions (id, user_id, company, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.user_id,
                session.company,
                session.status.as_str(),
                session.created_at,
            ],
        )
        .context("failed to insert research session")?;
        Ok(session)
    }

    pub fn complete_research_session(
        &self,
        session_id: &str,
        result: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result_json = serde_json::to_string(result).context("failed to serialize result")?;
        self.finish_research_session(
            session_id,
            ResearchStatus::Completed,
            Some(result_json),
            None,
            at,
        )
    }

    pub fn fail_research_session(
        &self,
        session_id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.finish_research_session(session_id, ResearchStatus::Failed, None, Some(error), at)
    }

    fn finish_research_session(
        &self,
        session_id: &str,
        status: ResearchStatus,
        result: Option<String>,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn();
        let n = conn
            .execute(
                "UPDATE research_sessions
                 SET status = ?2, result = ?3, error = ?4, completed_at = ?5
                 WHERE id = ?1 AND status = 'running'",
                params![session_id, status.as_str(), result, error, at],
            )
            .context("failed to update research session")?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "running research session",
                id: session_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn research_session(&self, session_id: &str) -> Result<Option<ResearchSession>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM research_sessions WHERE id = ?1"),
            params![session_id],
            session_from_row,
        )
        .optional()
        .context("failed to load research session")
    }

    pub fn list_research_sessions(&self, user_id: &str) -> Result<Vec<ResearchSession>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM research_sessions WHERE user_id = ?1
                 ORDER BY created_at DESC"
            ))
            .context("failed to prepare list_research_sessions query")?;
        let rows = stmt
            .query_map(params![user_id], session_from_row)
            .context("failed to query research sessions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map research session rows")?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{test_db, test_user};
    use super::*;
    use serde_json::json;

    #[test]
    fn research_reports_filter_by_company() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        for company in ["Acme", "Globex"] {
            db.save_account_research(
                &user.id,
                &NewAccountResearch {
                    account_id: None,
                    company: company.into(),
                    summary: format!("{company} summary"),
                    intent_score: Some(64.0),
                    payload: json!({ "pain_points": ["manual testing"] }),
                    sources: vec!["https://a.example".into(), "https://b.example".into()],
                },
            )
            .unwrap();
        }

        let all = db.list_account_research(&user.id, None).unwrap();
        assert_eq!(all.len(), 2);
        let acme = db.list_account_research(&user.id, Some("acme")).unwrap();
        assert_eq!(acme.len(), 1);
        assert_eq!(acme[0].sources.len(), 2);
        assert_eq!(acme[0].payload["pain_points"][0], "manual testing");
    }

    #[test]
    fn company_facts_dedupe_and_order_by_confidence() {
        let db = test_db();
        assert!(db
            .save_company_fact("Acme", "Migrating to S/4HANA", Some("https://a"), None, 0.6)
            .unwrap());
        assert!(!db
            .save_company_fact("ACME", "Migrating to S/4HANA", None, None, 0.9)
            .unwrap());
        assert!(db
            .save_company_fact("Acme", "Hiring QA leads", None, None, 1.7)
            .unwrap());

        let facts = db.company_facts("acme").unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].fact, "Hiring QA leads");
        assert_eq!(facts[0].confidence, 1.0);
    }

    #[test]
    fn research_session_lifecycle() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        let session = db.start_research_session(&user.id, "Acme").unwrap();
        assert_eq!(session.status, ResearchStatus::Running);

        db.complete_research_session(&session.id, &json!({ "summary": "ok" }), Utc::now())
            .unwrap();
        let loaded = db.research_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.status, ResearchStatus::Completed);
        assert_eq!(loaded.result.unwrap()["summary"], "ok");
        assert!(loaded.completed_at.is_some());

        // A finished session cannot be finished again.
        assert!(db
            .fail_research_session(&session.id, "late failure", Utc::now())
            .is_err());
    }

    #[test]
    fn failed_session_records_error() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        let session = db.start_research_session(&user.id, "Acme").unwrap();
        db.fail_research_session(&session.id, "search provider down", Utc::now())
            .unwrap();

        let sessions = db.list_research_sessions(&user.id).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, ResearchStatus::Failed);
        assert_eq!(sessions[0].error.as_deref(), Some("search provider down"));
        assert!(sessions[0].result.is_none());
    }
}
