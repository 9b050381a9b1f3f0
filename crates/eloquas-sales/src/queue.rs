// Outbound email queue: spam-checked scheduling, a due-email sender with
// bounded retries, and the background worker that drives it.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use eloquas_core::config::QueueConfig;
use eloquas_core::db::{Database, RetryOutcome};
use eloquas_core::models::QueuedEmail;

use crate::integrations::IntegrationError;
use crate::scoring::spam_score;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), IntegrationError>;
}

/// Records each send in the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), IntegrationError> {
        info!(to, subject, chars = body.chars().count(), "email sent (log transport)");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("spam score {score} exceeds threshold {threshold}")]
    Spam {
        score: f64,
        threshold: f64,
        reasons: Vec<String>,
    },

    #[error("prospect not found: {0}")]
    ProspectNotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Check the email for spam and schedule it a random number of minutes out.
#[allow(clippy::too_many_arguments)]
pub fn queue_email<R: Rng>(
    db: &Database,
    config: &QueueConfig,
    user_id: &str,
    prospect_id: &str,
    subject: &str,
    body: &str,
    story_score: Option<f64>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<QueuedEmail, QueueError> {
    if db.prospect_for_user(user_id, prospect_id)?.is_none() {
        return Err(QueueError::ProspectNotFound(prospect_id.to_string()));
    }
    let spam = spam_score(subject, body);
    if spam.exceeds(config.spam_threshold) {
        return Err(QueueError::Spam {
            score: spam.score,
            threshold: config.spam_threshold,
            reasons: spam.reasons,
        });
    }

    let (lo, hi) = if config.min_delay_minutes <= config.max_delay_minutes {
        (config.min_delay_minutes, config.max_delay_minutes)
    } else {
        (config.max_delay_minutes, config.min_delay_minutes)
    };
    let delay = rng.gen_range(lo.max(0)..=hi.max(0));
    let scheduled_for = now + Duration::minutes(delay);
    let email = db.enqueue_email(user_id, prospect_id, subject, body, story_score, now, scheduled_for)?;
    info!(email = %email.id, prospect = prospect_id, delay_minutes = delay, "email queued");
    Ok(email)
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Send every email due at `now`. A failed send counts an attempt and is
/// either rescheduled or marked failed at `max_attempts`.
pub async fn process_due(
    db: &Database,
    mailer: &dyn Mailer,
    config: &QueueConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<ProcessSummary> {
    let due = db.due_emails(now)?;
    let mut summary = ProcessSummary::default();
    if due.is_empty() {
        return Ok(summary);
    }
    debug!(count = due.len(), "processing due emails");

    for (i, email) in due.iter().enumerate() {
        if i > 0 && config.send_spacing_secs > 0 {
            tokio::time::sleep(StdDuration::from_secs(config.send_spacing_secs)).await;
        }
        let result = match db.prospect_for_user(&email.user_id, &email.prospect_id)? {
            Some(prospect) => mailer.send(&prospect.email, &email.subject, &email.body).await,
            None => Err(IntegrationError::parse("queue", "prospect no longer exists")),
        };

        match result {
            Ok(()) => {
                db.mark_sent(&email.id, Utc::now())?;
                summary.sent += 1;
            }
            Err(e) => {
                let retry = Duration::minutes(config.retry_delay_minutes);
                match db.mark_attempt_failed(&email.id, now, config.max_attempts, retry)? {
                    RetryOutcome::Rescheduled(at) => {
                        warn!(email = %email.id, retry_at = %at, "send failed, will retry: {e}");
                        summary.retried += 1;
                    }
                    RetryOutcome::GaveUp => {
                        warn!(email = %email.id, "send failed permanently: {e}");
                        summary.failed += 1;
                    }
                }
            }
        }
    }

    info!(sent = summary.sent, retried = summary.retried, failed = summary.failed, "email queue processed");
    Ok(summary)
}

/// Drain the queue every `interval_secs` until `shutdown` flips to true.
pub async fn run_worker(
    db: Arc<Database>,
    mailer: Arc<dyn Mailer>,
    config: QueueConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(StdDuration::from_secs(config.interval_secs.max(1)));
    info!(every_secs = config.interval_secs, "email queue worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = process_due(&db, mailer.as_ref(), &config, Utc::now()).await {
                    error!("email queue run failed: {e:#}");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("email queue worker stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eloquas_core::models::{EmailStatus, NewProspect, NewUser, Role};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;

    struct FlakyMailer {
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), IntegrationError> {
            if self.fail {
                return Err(IntegrationError::parse("smtp", "connection refused"));
            }
            self.sent.lock().unwrap().push(to.to_string());
            Ok(())
        }
    }

    fn config() -> QueueConfig {
        QueueConfig {
            interval_secs: 60,
            max_attempts: 2,
            min_delay_minutes: 5,
            max_delay_minutes: 10,
            retry_delay_minutes: 15,
            send_spacing_secs: 0,
            spam_threshold: 5.0,
        }
    }

    fn setup() -> (Database, String, String) {
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
        let prospect = db
            .add_prospect(
                &user.id,
                &NewProspect {
                    name: "Pat".into(),
                    email: "pat@acme.com".into(),
                    company: "Acme".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .into_inner();
        (db, user.id, prospect.id)
    }

    #[test]
    fn queued_within_delay_window() {
        let (db, user, prospect) = setup();
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(4);
        let email = queue_email(&db, &config(), &user, &prospect, "Hello", "Short note", None, now, &mut rng).unwrap();
        let delay = (email.scheduled_for - now).num_minutes();
        assert!((5..=10).contains(&delay), "{delay}");
        assert_eq!(email.status, EmailStatus::Queued);
    }

    #[test]
    fn spammy_email_is_rejected() {
        let (db, user, prospect) = setup();
        let mut rng = StdRng::seed_from_u64(4);
        let err = queue_email(
            &db,
            &config(),
            &user,
            &prospect,
            "FREE MONEY",
            "Click here! Act now! Limited time! Risk free!!!",
            None,
            Utc::now(),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, QueueError::Spam { .. }));
        assert!(db.list_queue(&user, 10).unwrap().is_empty());
    }

    #[test]
    fn unknown_prospect_is_rejected() {
        let (db, user, _) = setup();
        let mut rng = StdRng::seed_from_u64(4);
        let err = queue_email(&db, &config(), &user, "nope", "Hi", "Body", None, Utc::now(), &mut rng).unwrap_err();
        assert!(matches!(err, QueueError::ProspectNotFound(_)));
    }

    #[tokio::test]
    async fn due_emails_are_sent() {
        let (db, user, prospect) = setup();
        let now = Utc::now();
        db.enqueue_email(&user, &prospect, "Hi", "Body", None, now, now).unwrap();
        let mailer = FlakyMailer {
            fail: false,
            sent: Mutex::new(Vec::new()),
        };

        let summary = process_due(&db, &mailer, &config(), now).await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(*mailer.sent.lock().unwrap(), vec!["pat@acme.com".to_string()]);
        assert_eq!(db.sent_count_for_prospect(&prospect).unwrap(), 1);
    }

    #[tokio::test]
    async fn failures_retry_then_give_up() {
        let (db, user, prospect) = setup();
        let now = Utc::now();
        db.enqueue_email(&user, &prospect, "Hi", "Body", None, now, now).unwrap();
        let mailer = FlakyMailer {
            fail: true,
            sent: Mutex::new(Vec::new()),
        };
        let cfg = config();

        let first = process_due(&db, &mailer, &cfg, now).await.unwrap();
        assert_eq!(first.retried, 1);
        // rescheduled, so nothing is due at the same instant
        assert_eq!(process_due(&db, &mailer, &cfg, now).await.unwrap(), ProcessSummary::default());

        let later = now + Duration::minutes(cfg.retry_delay_minutes);
        let second = process_due(&db, &mailer, &cfg, later).await.unwrap();
        assert_eq!(second.failed, 1);

        let queue = db.list_queue(&user, 10).unwrap();
        assert_eq!(queue[0].status, EmailStatus::Failed);
        assert_eq!(queue[0].attempts, 2);
    }

    #[tokio::test]
    async fn worker_stops_on_shutdown() {
        let (db, _, _) = setup();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_worker(Arc::new(db), Arc::new(LogMailer), config(), rx));
        tx.send(true).unwrap();
        tokio::time::timeout(StdDuration::from_secs(5), handle)
            .await
            .expect("worker should stop")
            .unwrap();
    }
}
