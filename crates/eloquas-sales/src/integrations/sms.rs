// Daily SMS digest of fresh job signals, sent through Twilio.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use eloquas_core::config::{non_empty, Config};
use eloquas_core::db::Database;
use eloquas_core::models::JobSignal;

use super::{http_client, read_body, IntegrationError, DEFAULT_TIMEOUT};

const SERVICE: &str = "twilio";
const SIGNALS_PER_COMPANY: usize = 5;
const MAX_DIGEST_SIGNALS: usize = 20;

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), IntegrationError>;
}

pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl TwilioClient {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            http: http_client(DEFAULT_TIMEOUT),
            account_sid,
            auth_token,
            from_number,
            base_url: "https://api.twilio.com".to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Option<Self> {
        let creds = &config.credentials;
        Some(Self::new(
            non_empty(&creds.twilio_account_sid)?.to_string(),
            non_empty(&creds.twilio_auth_token)?.to_string(),
            non_empty(&creds.twilio_from_number)?.to_string(),
        ))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SmsSender for TwilioClient {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), IntegrationError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        );
        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await?;
        read_body(SERVICE, response).await?;
        debug!(to, "SMS sent");
        Ok(())
    }
}

/// Sender used when Twilio is not configured: messages are only logged.
pub struct LogSms;

#[async_trait]
impl SmsSender for LogSms {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), IntegrationError> {
        info!(to, chars = body.chars().count(), "SMS (not sent, Twilio disabled)");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Daily digest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestSummary {
    pub sent: usize,
    pub already_sent: usize,
    pub no_signals: usize,
    pub failed: usize,
}

/// Text for one digest: total count, then the first title per company for at
/// most three companies (looking at the newest five signals).
pub fn format_digest(signals: &[JobSignal]) -> String {
    let mut by_company: Vec<(&str, &str)> = Vec::new();
    for signal in signals.iter().take(5) {
        if !by_company.iter().any(|(c, _)| *c == signal.company) {
            by_company.push((signal.company.as_str(), signal.title.as_str()));
        }
    }

    let mut lines = vec![format!("{} new signals for your accounts:", signals.len())];
    for &(company, title) in by_company.iter().take(3) {
        let short = title.split('-').next().unwrap_or(title).trim();
        lines.push(format!("- {company}: {short}"));
    }
    if by_company.len() > 3 {
        lines.push(format!("+ {} more companies", by_company.len() - 3));
    }
    lines.push(String::new());
    lines.push("View more: app.eloquas.ai/signals".to_string());
    lines.join("\n")
}

/// Send each active user with a phone number one digest per day covering
/// signals for their prospects' companies from the last 24 hours.
pub async fn send_daily_digests(
    db: &Database,
    sender: &dyn SmsSender,
    now: DateTime<Utc>,
) -> anyhow::Result<DigestSummary> {
    let today = now.date_naive();
    let since = now - Duration::hours(24);
    let mut summary = DigestSummary::default();

    for user in db.list_users()? {
        let Some(phone) = user.phone.as_deref().filter(|p| !p.trim().is_empty()) else {
            continue;
        };
        if !user.is_active {
            continue;
        }
        if db.sms_sent_on(&user.id, today)? {
            summary.already_sent += 1;
            continue;
        }

        let companies = db.prospect_companies(Some(user.id.as_str()))?;
        let mut signals = db.signals_for_companies(&companies, SIGNALS_PER_COMPANY, Some(since))?;
        signals.truncate(MAX_DIGEST_SIGNALS);
        if signals.is_empty() {
            summary.no_signals += 1;
            continue;
        }

        match sender.send_sms(phone, &format_digest(&signals)).await {
            Ok(()) => {
                db.record_sms_digest(&user.id, today, signals.len(), now)?;
                summary.sent += 1;
            }
            Err(e) => {
                warn!(user = %user.email, "SMS digest failed: {e}");
                summary.failed += 1;
            }
        }
    }

    info!(
        sent = summary.sent,
        already_sent = summary.already_sent,
        failed = summary.failed,
        "SMS digest run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use eloquas_core::models::{NewProspect, NewUser, Role};

    #[derive(Default)]
    struct RecordingSms {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SmsSender for RecordingSms {
        async fn send_sms(&self, to: &str, body: &str) -> Result<(), IntegrationError> {
            self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn signal(company: &str, title: &str, at: DateTime<Utc>) -> JobSignal {
        JobSignal {
            id: format!("{company}-{title}"),
            company: company.into(),
            title: title.into(),
            url: format!("https://jobs.example/{company}/{title}"),
            keywords: vec!["QA".into()],
            match_score: 0.8,
            source: "search".into(),
            snippet: None,
            detected_at: at,
        }
    }

    #[test]
    fn digest_lists_top_three_companies() {
        let now = Utc::now();
        let signals = vec![
            signal("Acme", "QA Lead - Remote", now),
            signal("Acme", "SDET", now),
            signal("Globex", "SAP Tester", now),
            signal("Initech", "Quality Engineer", now),
            signal("Umbrella", "Test Automation", now),
        ];
        let text = format_digest(&signals);
        assert!(text.starts_with("5 new signals for your accounts:"));
        assert!(text.contains("- Acme: QA Lead"));
        assert!(!text.contains("Umbrella:"));
        assert!(text.contains("+ 1 more companies"));
        assert!(text.ends_with("View more: app.eloquas.ai/signals"));
    }

    #[tokio::test]
    async fn digest_sent_once_per_day() {
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
        db.set_user_phone(&user.id, Some("+15550001111")).unwrap();
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
        let now = Utc::now();
        db.store_signals(&[
            signal("Acme", "QA Lead", now - Duration::hours(2)),
            signal("Acme", "Old role", now - Duration::days(3)),
        ])
        .unwrap();

        let sms = RecordingSms::default();
        let first = send_daily_digests(&db, &sms, now).await.unwrap();
        assert_eq!(first.sent, 1);
        let second = send_daily_digests(&db, &sms, now).await.unwrap();
        assert_eq!(second.sent, 0);
        assert_eq!(second.already_sent, 1);

        let sent = sms.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+15550001111");
        assert!(sent[0].1.starts_with("1 new signals"));
    }
}
