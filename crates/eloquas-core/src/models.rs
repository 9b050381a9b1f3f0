// Row types shared by the store, the engines, and the REST layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enumerations stored as TEXT
// ---------------------------------------------------------------------------

/// Access level of a user. Admin passes every role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Ae,
    #[default]
    Bdr,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Ae => "ae",
            Role::Bdr => "bdr",
        }
    }

    /// Whether a user holding `self` may access something restricted to
    /// `required`.
    pub fn permits(&self, required: Role) -> bool {
        *self == Role::Admin || *self == required
    }
}

/// Error returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "ae" => Ok(Role::Ae),
            "bdr" => Ok(Role::Bdr),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Email,
    LinkedinPost,
    Scipab,
    SequenceStep,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Email => "email",
            ContentKind::LinkedinPost => "linkedin_post",
            ContentKind::Scipab => "scipab",
            ContentKind::SequenceStep => "sequence_step",
        }
    }
}

impl FromStr for ContentKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(ContentKind::Email),
            "linkedin_post" => Ok(ContentKind::LinkedinPost),
            "scipab" => Ok(ContentKind::Scipab),
            "sequence_step" => Ok(ContentKind::SequenceStep),
            other => Err(UnknownVariant {
                kind: "content kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactSource {
    Manual,
    Pdl,
}

impl ContactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactSource::Manual => "manual",
            ContactSource::Pdl => "pdl",
        }
    }
}

impl FromStr for ContactSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ContactSource::Manual),
            "pdl" => Ok(ContactSource::Pdl),
            other => Err(UnknownVariant {
                kind: "contact source",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchStatus {
    Running,
    Completed,
    Failed,
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchStatus::Running => "running",
            ResearchStatus::Completed => "completed",
            ResearchStatus::Failed => "failed",
        }
    }
}

impl FromStr for ResearchStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ResearchStatus::Running),
            "completed" => Ok(ResearchStatus::Completed),
            "failed" => Ok(ResearchStatus::Failed),
            other => Err(UnknownVariant {
                kind: "research status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Queued,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Queued => "queued",
            EmailStatus::Sent => "sent",
            EmailStatus::Failed => "failed",
        }
    }
}

impl FromStr for EmailStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(EmailStatus::Queued),
            "sent" => Ok(EmailStatus::Sent),
            "failed" => Ok(EmailStatus::Failed),
            other => Err(UnknownVariant {
                kind: "email status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Users and sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub company: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Fields needed to register a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub company: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Prospects, accounts, contacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub title: Option<String>,
    pub company: String,
    pub domain: Option<String>,
    pub linkedin_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProspect {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub title: Option<String>,
    pub company: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub domain: Option<String>,
    pub industry: Option<String>,
    pub employee_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAccount {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub employee_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub email: Option<String>,
    pub title: Option<String>,
    pub linkedin_url: Option<String>,
    pub source: ContactSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewContact {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default = "manual_source")]
    pub source: ContactSource,
}

fn manual_source() -> ContactSource {
    ContactSource::Manual
}

/// Result of an insert that deduplicates against existing rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted<T> {
    Inserted(T),
    Existing(T),
}

impl<T> Upserted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Upserted::Inserted(v) | Upserted::Existing(v) => v,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Upserted::Inserted(_))
    }
}

// ---------------------------------------------------------------------------
// Generated material
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedContent {
    pub id: String,
    pub user_id: String,
    pub prospect_id: Option<String>,
    pub kind: ContentKind,
    pub subject: Option<String>,
    pub body: String,
    pub metadata: serde_json::Value,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewContent {
    pub prospect_id: Option<String>,
    pub kind: ContentKind,
    pub subject: Option<String>,
    pub body: String,
    pub metadata: serde_json::Value,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceStep {
    pub step: u8,
    pub day: u32,
    pub channel: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailCadence {
    pub id: String,
    pub user_id: String,
    pub prospect_id: Option<String>,
    pub name: String,
    pub steps: Vec<CadenceStep>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallAssessmentRecord {
    pub id: String,
    pub user_id: String,
    pub prospect_id: Option<String>,
    pub transcript: String,
    pub overall_score: f64,
    pub payload: serde_json::Value,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountResearch {
    pub id: String,
    pub user_id: String,
    pub account_id: Option<String>,
    pub company: String,
    pub summary: String,
    pub intent_score: Option<f64>,
    pub payload: serde_json::Value,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccountResearch {
    pub account_id: Option<String>,
    pub company: String,
    pub summary: String,
    pub intent_score: Option<f64>,
    pub payload: serde_json::Value,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyFact {
    pub id: String,
    pub company: String,
    pub fact: String,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchSession {
    pub id: String,
    pub user_id: String,
    pub company: String,
    pub status: ResearchStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Job signals, email queue, LinkedIn profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSignal {
    pub id: String,
    pub company: String,
    pub title: String,
    pub url: String,
    pub keywords: Vec<String>,
    pub match_score: f64,
    pub source: String,
    pub snippet: Option<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalStats {
    pub total_signals: u64,
    pub companies: u64,
    pub last_24h: u64,
    pub top_keywords: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedEmail {
    pub id: String,
    pub user_id: String,
    pub prospect_id: String,
    pub subject: String,
    pub body: String,
    pub story_score: Option<f64>,
    pub status: EmailStatus,
    pub attempts: u32,
    pub scheduled_for: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct QueueStatus {
    pub queued: u64,
    pub failed: u64,
    pub sent_today: u64,
    pub total_sent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LinkedinProfile {
    pub user_id: String,
    pub linkedin_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub headline: Option<String>,
    pub picture_url: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_permits_every_role() {
        assert!(Role::Admin.permits(Role::Admin));
        assert!(Role::Admin.permits(Role::Ae));
        assert!(Role::Admin.permits(Role::Bdr));
    }

    #[test]
    fn non_admin_roles_only_permit_themselves() {
        assert!(Role::Ae.permits(Role::Ae));
        assert!(!Role::Ae.permits(Role::Admin));
        assert!(!Role::Bdr.permits(Role::Ae));
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" bdr ".parse::<Role>(), Ok(Role::Bdr));
        assert!("manager".parse::<Role>().is_err());
    }

    #[test]
    fn enum_round_trips_through_as_str() {
        for kind in [
            ContentKind::Email,
            ContentKind::LinkedinPost,
            ContentKind::Scipab,
            ContentKind::SequenceStep,
        ] {
            assert_eq!(kind.as_str().parse::<ContentKind>(), Ok(kind));
        }
        for status in [EmailStatus::Queued, EmailStatus::Sent, EmailStatus::Failed] {
            assert_eq!(status.as_str().parse::<EmailStatus>(), Ok(status));
        }
    }

    #[test]
    fn user_serialization_hides_password_hash() {
        let user = User {
            id: "u1".into(),
            email: "rep@example.com".into(),
            password_hash: "secret-hash".into(),
            role: Role::Ae,
            company: None,
            full_name: None,
            phone: None,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"role\":\"ae\""));
    }

    #[test]
    fn upserted_reports_insertion() {
        assert!(Upserted::Inserted(1).was_inserted());
        assert!(!Upserted::Existing(1).was_inserted());
        assert_eq!(Upserted::Existing(7).into_inner(), 7);
    }
}
