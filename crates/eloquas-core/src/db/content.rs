// Generated content, email cadences and call assessments.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};

use super::{enum_column, json_column, new_id, Database};
use crate::models::{CadenceStep, CallAssessmentRecord, EmailCadence, GeneratedContent, NewContent};

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<GeneratedContent> {
    let kind: String = row.get(3)?;
    let metadata: String = row.get(6)?;
    Ok(GeneratedContent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        prospect_id: row.get(2)?,
        kind: enum_column(3, &kind)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        metadata: json_column(6, &metadata)?,
        model: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn cadence_from_row(row: &Row<'_>) -> rusqlite::Result<EmailCadence> {
    let steps: String = row.get(4)?;
    Ok(EmailCadence {
        id: row.get(0)?,
        user_id: row.get(1)?,
        prospect_id: row.get(2)?,
        name: row.get(3)?,
        steps: json_column(4, &steps)?,
        model: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn assessment_from_row(row: &Row<'_>) -> rusqlite::Result<CallAssessmentRecord> {
    let payload: String = row.get(5)?;
    Ok(CallAssessmentRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        prospect_id: row.get(2)?,
        transcript: row.get(3)?,
        overall_score: row.get(4)?,
        payload: json_column(5, &payload)?,
        model: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl Database {
    // ------------------------------------------------------------------
    // Generated content
    // ------------------------------------------------------------------

    pub fn save_content(&self, user_id: &str, new: &NewContent) -> Result<GeneratedContent> {
        let conn = self.conn();
        let content = GeneratedContent {
            id: new_id(),
            user_id: user_id.to_string(),
            prospect_id: new.prospect_id.clone(),
            kind: new.kind,
            subject: new.subject.clone(),
            body: new.body.clone(),
            metadata: new.metadata.clone(),
            model: new.model.clone(),
            created_at: Utc::now(),
        };
        let metadata =
            serde_json::to_string(&content.metadata).context("failed to serialize metadata")?;
        conn.execute(
            "INSERT INTO generated_content
                (id, user_id, prospect_id, kind, subject, body, metadata, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                content.id,
                content.user_id,
                content.prospect_id,
                content.kind.as_str(),
                content.subject,
                content.body,
                metadata,
                content.model,
                content.created_at,
            ],
        )
        .context("failed to insert generated content")?;
        Ok(content)
    }

    /// Content generated by `user_id`, newest first, at most `limit` rows.
    pub fn list_content(&self, user_id: &str, limit: usize) -> Result<Vec<GeneratedContent>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, prospect_id, kind, subject, body, metadata, model, created_at
                 FROM generated_content WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )
            .context("failed to prepare list_content query")?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], content_from_row)
            .context("failed to query generated content")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map content rows")?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Email cadences
    // ------------------------------------------------------------------

    pub fn save_cadence(
        &self,
        user_id: &str,
        prospect_id: Option<&str>,
        name: &str,
        steps: &[CadenceStep],
        model: Option<&str>,
    ) -> Result<EmailCadence> {
        let conn = self.conn();
        let cadence = EmailCadence {
            id: new_id(),
            user_id: user_id.to_string(),
            prospect_id: prospect_id.map(str::to_string),
            name: name.to_string(),
            steps: steps.to_vec(),
            model: model.map(str::to_string),
            created_at: Utc::now(),
        };
        let steps_json = serde_json::to_string(&cadence.steps).context("failed to serialize steps")?;
        conn.execute(
            "INSERT INTO email_cadences (id, user_id, prospect_id, name, steps, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                cadence.id,
                cadence.user_id,
                cadence.prospect_id,
                cadence.name,
                steps_json,
                cadence.model,
                cadence.created_at,
            ],
        )
        .context("failed to insert email cadence")?;
        Ok(cadence)
    }

    pub fn list_cadences(&self, user_id: &str) -> Result<Vec<EmailCadence>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, prospect_id, name, steps, model, created_at
                 FROM email_cadences WHERE user_id = ?1 ORDER BY created_at DESC",
            )
            .context("failed to prepare list_cadences query")?;
        let rows = stmt
            .query_map(params![user_id], cadence_from_row)
            .context("failed to query cadences")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map cadence rows")?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Call assessments
    // ------------------------------------------------------------------

    pub fn save_call_assessment(
        &self,
        user_id: &str,
        prospect_id: Option<&str>,
        transcript: &str,
        overall_score: f64,
        payload: &serde_json::Value,
        model: Option<&str>,
    ) -> Result<CallAssessmentRecord> {
        let conn = self.conn();
        let record = CallAssessmentRecord {
            id: new_id(),
            user_id: user_id.to_string(),
            prospect_id: prospect_id.map(str::to_string),
            transcript: transcript.to_string(),
            overall_score,
            payload: payload.clone(),
            model: model.map(str::to_string),
            created_at: Utc::now(),
        };
        let payload_json =
            serde_json::to_string(&record.payload).context("failed to serialize assessment")?;
        conn.execute(
            "INSERT INTO call_assessments
                (id, user_id, prospect_id, transcript, overall_score, payload, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.user_id,
                record.prospect_id,
                record.transcript,
                record.overall_score,
                payload_json,
                record.model,
                record.created_at,
            ],
        )
        .context("failed to insert call assessment")?;
        Ok(record)
    }

    pub fn list_call_assessments(&self, user_id: &str) -> Result<Vec<CallAssessmentRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, prospect_id, transcript, overall_score, payload, model, created_at
                 FROM call_assessments WHERE user_id = ?1 ORDER BY created_at DESC",
            )
            .context("failed to prepare list_call_assessments query")?;
        let rows = stmt
            .query_map(params![user_id], assessment_from_row)
            .context("failed to query call assessments")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map call assessment rows")?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{test_db, test_prospect, test_user};
    use super::*;
    use crate::models::ContentKind;
    use serde_json::json;

    #[test]
    fn save_and_list_content_newest_first() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        let prospect = test_prospect(&db, &user, "pat@acme.com", "Acme");

        for i in 0..3 {
            db.save_content(
                &user.id,
                &NewContent {
                    prospect_id: Some(prospect.id.clone()),
                    kind: ContentKind::Email,
                    subject: Some(format!("Subject {i}")),
                    body: format!("Body {i}"),
                    metadata: json!({ "trust_score": 70 + i }),
                    model: Some("gpt-4o".into()),
                },
            )
            .unwrap();
        }

        let listed = db.list_content(&user.id, 2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].subject.as_deref(), Some("Subject 2"));
        assert_eq!(listed[0].metadata["trust_score"], 72);
        assert_eq!(listed[0].kind, ContentKind::Email);
    }

    #[test]
    fn deleting_prospect_keeps_content_but_clears_link() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        let prospect = test_prospect(&db, &user, "pat@acme.com", "Acme");
        db.save_content(
            &user.id,
            &NewContent {
                prospect_id: Some(prospect.id.clone()),
                kind: ContentKind::LinkedinPost,
                subject: None,
                body: "post".into(),
                metadata: json!({}),
                model: None,
            },
        )
        .unwrap();
        db.delete_prospect(&user.id, &prospect.id).unwrap();

        let listed = db.list_content(&user.id, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].prospect_id, None);
    }

    #[test]
    fn cadence_steps_survive_storage() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        let steps: Vec<CadenceStep> = (1..=6)
            .map(|i| CadenceStep {
                step: i,
                day: u32::from(i) * 2,
                channel: "email".into(),
                subject: format!("s{i}"),
                body: format!("b{i}"),
            })
            .collect();
        db.save_cadence(&user.id, None, "Q3 outreach", &steps, Some("gpt-4o"))
            .unwrap();

        let cadences = db.list_cadences(&user.id).unwrap();
        assert_eq!(cadences.len(), 1);
        assert_eq!(cadences[0].steps, steps);
    }

    #[test]
    fn call_assessments_listed_for_owner_only() {
        let db = test_db();
        let alice = test_user(&db, "alice@example.com");
        let bob = test_user(&db, "bob@example.com");
        db.save_call_assessment(
            &alice.id,
            None,
            "transcript",
            71.5,
            &json!({ "strengths": ["rapport"] }),
            Some("gpt-4o"),
        )
        .unwrap();

        let alices = db.list_call_assessments(&alice.id).unwrap();
        assert_eq!(alices.len(), 1);
        assert_eq!(alices[0].overall_score, 71.5);
        assert!(db.list_call_assessments(&bob.id).unwrap().is_empty());
    }
}
