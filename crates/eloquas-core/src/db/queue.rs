// Outbound email queue.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Row};

use super::{enum_column, new_id, Database, StoreError};
use crate::models::{EmailStatus, QueueStatus, QueuedEmail};

const QUEUE_COLUMNS: &str = "id, user_id, prospect_id, subject, body, story_score, status, attempts, scheduled_for, queued_at, sent_at";

fn queued_from_row(row: &Row<'_>) -> rusqlite::Result<QueuedEmail> {
    let status: String = row.get(6)?;
    Ok(QueuedEmail {
        id: row.get(0)?,
        user_id: row.get(1)?,
        prospect_id: row.get(2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        story_score: row.get(5)?,
        status: enum_column(6, &status)?,
        attempts: row.get(7)?,
        scheduled_for: row.get(8)?,
        queued_at: row.get(9)?,
        sent_at: row.get(10)?,
    })
}

/// What happened to an email after a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Rescheduled(DateTime<Utc>),
    GaveUp,
}

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue_email(
        &self,
        user_id: &str,
        prospect_id: &str,
        subject: &str,
        body: &str,
        story_score: Option<f64>,
        queued_at: DateTime<Utc>,
        scheduled_for: DateTime<Utc>,
    ) -> Result<QueuedEmail> {
        let conn = self.conn();
        let email = QueuedEmail {
            id: new_id(),
            user_id: user_id.to_string(),
            prospect_id: prospect_id.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            story_score,
            status: EmailStatus::Queued,
            attempts: 0,
            scheduled_for,
            queued_at,
            sent_at: None,
        };
        conn.execute(
            "INSERT INTO email_queue
                (id, user_id, prospect_id, subject, body, story_score, status, attempts, scheduled_for, queued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
            params![
                email.id,
                email.user_id,
                email.prospect_id,
                email.subject,
                email.body,
                email.story_score,
                email.status.as_str(),
                email.scheduled_for,
                email.queued_at,
            ],
        )
        .context("failed to enqueue email")?;
        Ok(email)
    }

    /// Queued emails whose scheduled time has passed, oldest first.
    pub fn due_emails(&self, now: DateTime<Utc>) -> Result<Vec<QueuedEmail>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {QUEUE_COLUMNS} FROM email_queue
                 WHERE status = 'queued' AND scheduled_for <= ?1
                 ORDER BY scheduled_for"
            ))
            .context("failed to prepare due_emails query")?;
        let rows = stmt
            .query_map(params![now], queued_from_row)
            .context("failed to query due emails")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map queued email rows")?;
        Ok(rows)
    }

    pub fn list_queue(&self, user_id: &str, limit: usize) -> Result<Vec<QueuedEmail>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {QUEUE_COLUMNS} FROM email_queue WHERE user_id = ?1
                 ORDER BY queued_at DESC LIMIT ?2"
            ))
            .context("failed to prepare list_queue query")?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], queued_from_row)
            .context("failed to query email queue")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map queued email rows")?;
        Ok(rows)
    }

    pub fn mark_sent(&self, email_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        let n = conn
            .execute(
                "UPDATE email_queue SET status = 'sent', sent_at = ?2, attempts = attempts + 1
                 WHERE id = ?1 AND status = 'queued'",
                params![email_id, at],
            )
            .context("failed to mark email sent")?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "queued email",
                id: email_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Count a failed delivery. Once `max_attempts` is reached the email is
    /// marked failed; otherwise it is pushed back by `retry_delay`.
    pub fn mark_attempt_failed(
        &self,
        email_id: &str,
        now: DateTime<Utc>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<RetryOutcome> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin retry transaction")?;
        let attempts: u32 = tx
            .query_row(
                "UPDATE email_queue SET attempts = attempts + 1
                 WHERE id = ?1 AND status = 'queued' RETURNING attempts",
                params![email_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => anyhow::Error::from(StoreError::NotFound {
                    entity: "queued email",
                    id: email_id.to_string(),
                }),
                other => anyhow::Error::new(other).context("failed to count failed attempt"),
            })?;

        let outcome = if attempts >= max_attempts {
            tx.execute(
                "UPDATE email_queue SET status = 'failed' WHERE id = ?1",
                params![email_id],
            )
            .context("failed to mark email failed")?;
            RetryOutcome::GaveUp
        } else {
            let next = now + retry_delay;
            tx.execute(
                "UPDATE email_queue SET scheduled_for = ?2 WHERE id = ?1",
                params![email_id, next],
            )
            .context("failed to reschedule email")?;
            RetryOutcome::Rescheduled(next)
        };
        tx.commit().context("failed to commit retry")?;
        Ok(outcome)
    }

    /// Queue counters for a user. `day_start` bounds the "sent today" count.
    pub fn queue_status(&self, user_id: &str, day_start: DateTime<Utc>) -> Result<QueueStatus> {
        let conn = self.conn();
        conn.query_row(
            "SELECT
                COALESCE(SUM(status = 'queued'), 0),
                COALESCE(SUM(status = 'failed'), 0),
                COALESCE(SUM(status = 'sent' AND sent_at >= ?2), 0),
                COALESCE(SUM(status = 'sent'), 0)
             FROM email_queue WHERE user_id = ?1",
            params![user_id, day_start],
            |row| {
                Ok(QueueStatus {
                    queued: row.get::<_, i64>(0)? as u64,
                    failed: row.get::<_, i64>(1)? as u64,
                    sent_today: row.get::<_, i64>(2)? as u64,
                    total_sent: row.get::<_, i64>(3)? as u64,
                })
            },
        )
        .context("failed to compute queue status")
    }

    /// Number of emails already delivered to a prospect.
    pub fn sent_count_for_prospect(&self, prospect_id: &str) -> Result<u32> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM email_queue WHERE prospect_id = ?1 AND status = 'sent'",
            params![prospect_id],
            |row| row.get(0),
        )
        .context("failed to count sent emails")
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{test_db, test_prospect, test_user};
    use super::*;

    #[test]
    fn only_due_emails_are_returned() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        let prospect = test_prospect(&db, &user, "pat@acme.com", "Acme");
        let now = Utc::now();

        db.enqueue_email(&user.id, &prospect.id, "due", "b", None, now, now - Duration::minutes(1))
            .unwrap();
        db.enqueue_email(&user.id, &prospect.id, "later", "b", None, now, now + Duration::minutes(10))
            .unwrap();

        let due = db.due_emails(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].subject, "due");
        assert_eq!(due[0].status, EmailStatus::Queued);
    }

    #[test]
    fn sent_email_leaves_the_queue() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        let prospect = test_prospect(&db, &user, "pat@acme.com", "Acme");
        let now = Utc::now();
        let email = db
            .enqueue_email(&user.id, &prospect.id, "s", "b", Some(14.0), now, now)
            .unwrap();

        db.mark_sent(&email.id, now).unwrap();
        assert!(db.due_emails(now).unwrap().is_empty());
        assert!(db.mark_sent(&email.id, now).is_err());
        assert_eq!(db.sent_count_for_prospect(&prospect.id).unwrap(), 1);

        let status = db.queue_status(&user.id, now - Duration::hours(1)).unwrap();
        assert_eq!(
            status,
            QueueStatus {
                queued: 0,
                failed: 0,
                sent_today: 1,
                total_sent: 1
            }
        );
    }

    #[test]
    fn failures_reschedule_then_give_up() {
        let db = test_db();
        let user = test_user(&db, "rep@example.com");
        let prospect = test_prospect(&db, &user, "pat@acme.com", "Acme");
        let now = Utc::now();
        let email = db
            .enqueue_email(&user.id, &prospect.id, "s", "b", None, now, now)
            .unwrap();
        let delay = Duration::hours(1);

        assert_eq!(
            db.mark_attempt_failed(&email.id, now, 3, delay).unwrap(),
            RetryOutcome::Rescheduled(now + delay)
        );
        assert!(db.due_emails(now).unwrap().is_empty());
        assert!(matches!(
            db.mark_attempt_failed(&email.id, now, 3, delay).unwrap(),
            RetryOutcome::Rescheduled(_)
        ));
        assert_eq!(
            db.mark_attempt_failed(&email.id, now, 3, delay).unwrap(),
            RetryOutcome::GaveUp
        );

        let queue = db.list_queue(&user.id, 10).unwrap();
        assert_eq!(queue[0].status, EmailStatus::Failed);
        assert_eq!(queue[0].attempts, 3);
        assert_eq!(db.queue_status(&user.id, now).unwrap().failed, 1);

        // Failed emails are no longer retried.
        assert!(db.mark_attempt_failed(&email.id, now, 3, delay).is_err());
    }
}
