// Job-posting signals detected by the scanner.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Row};

use super::{json_column, Database};
use crate::models::{JobSignal, SignalStats};

const SIGNAL_COLUMNS: &str =
    "id, company, title, url, keywords, match_score, source, snippet, detected_at";

fn signal_from_row(row: &Row<'_>) -> rusqlite::Result<JobSignal> {
    let keywords: String = row.get(4)?;
    Ok(JobSignal {
        id: row.get(0)?,
        company: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        keywords: json_column(4, &keywords)?,
        match_score: row.get(5)?,
        source: row.get(6)?,
        snippet: row.get(7)?,
        detected_at: row.get(8)?,
    })
}

fn query_company(
    conn: &Connection,
    company: &str,
    since: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<Vec<JobSignal>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM job_signals
             WHERE lower(company) = lower(?1) AND (?2 IS NULL OR detected_at >= ?2)
             ORDER BY detected_at DESC LIMIT ?3"
        ))
        .context("failed to prepare company signals query")?;
    let rows = stmt
        .query_map(params![company.trim(), since, limit as i64], signal_from_row)
        .context("failed to query company signals")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map signal rows")?;
    Ok(rows)
}

impl Database {
    /// Insert signals, ignoring ids that were already stored. Returns the
    /// number of new rows.
    pub fn store_signals(&self, signals: &[JobSignal]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin signals transaction")?;
        let mut inserted = 0;
        for signal in signals {
            let keywords =
                serde_json::to_string(&signal.keywords).context("failed to serialize keywords")?;
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO job_signals
                        (id, company, title, url, keywords, match_score, source, snippet, detected_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        signal.id,
                        signal.company,
                        signal.title,
                        signal.url,
                        keywords,
                        signal.match_score,
                        signal.source,
                        signal.snippet,
                        signal.detected_at,
                    ],
                )
                .context("failed to insert job signal")?;
        }
        tx.commit().context("failed to commit signals")?;
        Ok(inserted)
    }

    /// Most recent signals for one company.
    pub fn company_signals(&self, company: &str, limit: usize) -> Result<Vec<JobSignal>> {
        let conn = self.conn();
        query_company(&conn, company, None, limit)
    }

    /// Signals for a set of companies, at most `per_company` each, newest
    /// first overall. `since` drops anything older.
    pub fn signals_for_companies(
        &self,
        companies: &[String],
        per_company: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<JobSignal>> {
        let conn = self.conn();
        let mut all = Vec::new();
        for company in companies {
            all.extend(query_company(&conn, company, since, per_company)?);
        }
        all.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(all)
    }

    pub fn all_signals(&self, limit: usize) -> Result<Vec<JobSignal>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SIGNAL_COLUMNS} FROM job_signals ORDER BY detected_at DESC LIMIT ?1"
            ))
            .context("failed to prepare all_signals query")?;
        let rows = stmt
            .query_map(params![limit as i64], signal_from_row)
            .context("failed to query signals")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map signal rows")?;
        Ok(rows)
    }

    /// Totals plus the ten most frequent matched keywords.
    pub fn signal_stats(&self, now: DateTime<Utc>) -> Result<SignalStats> {
        let conn = self.conn();
        let (total, companies): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT lower(company)) FROM job_signals",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("failed to count signals")?;
        let last_24h: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM job_signals WHERE detected_at >= ?1",
                params![now - Duration::hours(24)],
                |row| row.get(0),
            )
            .context("failed to count recent signals")?;

        let mut stmt = conn
            .prepare("SELECT keywords FROM job_signals")
            .context("failed to prepare keyword query")?;
        let keyword_lists = stmt
            .query_map([], |row| {
                let raw: String = row.get(0)?;
                json_column::<Vec<String>>(0, &raw)
            })
            .context("failed to query keywords")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map keyword rows")?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for keyword in keyword_lists.into_iter().flatten() {
            *counts.entry(keyword).or_default() += 1;
        }
        let mut top_keywords: Vec<(String, u64)> = counts.into_iter().collect();
        top_keywords.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_keywords.truncate(10);

        Ok(SignalStats {
            total_signals: total as u64,
            companies: companies as u64,
            last_24h: last_24h as u64,
            top_keywords,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_db;
    use super::*;

    fn signal(id: &str, company: &str, hours_ago: i64, keywords: &[&str]) -> JobSignal {
        JobSignal {
            id: id.to_string(),
            company: company.to_string(),
            title: format!("{company} QA Lead"),
            url: format!("https://jobs.example/{id}"),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            match_score: 0.65,
            source: "search".to_string(),
            snippet: None,
            detected_at: Utc::now() - Duration::hours(hours_ago),
        }
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let db = test_db();
        let batch = vec![signal("a", "Acme", 1, &["QA"]), signal("b", "Acme", 2, &["SAP"])];
        assert_eq!(db.store_signals(&batch).unwrap(), 2);
        assert_eq!(db.store_signals(&batch).unwrap(), 0);
        assert_eq!(db.all_signals(10).unwrap().len(), 2);
    }

    #[test]
    fn company_signals_newest_first_with_limit() {
        let db = test_db();
        db.store_signals(&[
            signal("old", "Acme", 30, &["QA"]),
            signal("new", "acme", 1, &["QA"]),
            signal("mid", "Acme", 5, &["QA"]),
            signal("other", "Globex", 1, &["QA"]),
        ])
        .unwrap();

        let acme = db.company_signals("ACME", 2).unwrap();
        let ids: Vec<&str> = acme.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn signals_for_companies_caps_each_company_and_respects_since() {
        let db = test_db();
        let mut batch = Vec::new();
        for i in 0..7 {
            batch.push(signal(&format!("a{i}"), "Acme", i, &["QA"]));
        }
        batch.push(signal("g0", "Globex", 40, &["SAP"]));
        db.store_signals(&batch).unwrap();

        let companies = vec!["Acme".to_string(), "Globex".to_string()];
        let capped = db.signals_for_companies(&companies, 5, None).unwrap();
        assert_eq!(capped.len(), 6);
        assert_eq!(capped[0].id, "a0");

        let recent = db
            .signals_for_companies(&companies, 5, Some(Utc::now() - Duration::hours(24)))
            .unwrap();
        assert!(recent.iter().all(|s| s.company == "Acme"));
    }

    #[test]
    fn stats_count_keywords() {
        let db = test_db();
        db.store_signals(&[
            signal("a", "Acme", 1, &["QA", "SAP"]),
            signal("b", "Globex", 48, &["QA"]),
        ])
        .unwrap();
        let stats = db.signal_stats(Utc::now()).unwrap();
        assert_eq!(stats.total_signals, 2);
        assert_eq!(stats.companies, 2);
        assert_eq!(stats.last_24h, 1);
        assert_eq!(stats.top_keywords[0], ("QA".to_string(), 2));
    }
}
