// TrustScore (0-100): how warm an outreach to one prospect is likely to be.

use chrono::{DateTime, Utc};
use serde::Serialize;

use eloquas_core::models::{JobSignal, LinkedinProfile, Prospect};

use super::linkedin::linkedin_trust_score;
use crate::engines::round_to;

const RELATIONSHIP_WEIGHT: f64 = 0.25;
const FRESHNESS_WEIGHT: f64 = 0.25;
const STORY_WEIGHT: f64 = 0.20;
const DELIVERABILITY_WEIGHT: f64 = 0.15;
const ENGAGEMENT_WEIGHT: f64 = 0.15;

const INDUSTRY_KEYWORDS: [&str; 10] = [
    "sap", "oracle", "dynamics", "erp", "crm", "quality", "qa", "director", "manager", "vp",
];
const SENIOR_TITLES: [&str; 4] = ["director", "vp", "head of", "manager"];
const FREE_MAIL: [&str; 4] = ["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"];
const ROLE_MAILBOXES: [&str; 4] = ["info", "contact", "admin", "sales"];

pub struct TrustInputs<'a> {
    pub prospect: &'a Prospect,
    /// Newest job signal for the prospect's company.
    pub signal: Option<&'a JobSignal>,
    /// The rep's own LinkedIn profile, when connected.
    pub rep_profile: Option<&'a LinkedinProfile>,
    /// Emails already sent to this prospect.
    pub emails_sent: u32,
    pub now: DateTime<Utc>,
}

/// Component scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrustComponents {
    pub relationship: f64,
    pub intent_freshness: f64,
    pub story_quality: f64,
    pub deliverability: f64,
    pub engagement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustScore {
    pub total: f64,
    pub components: TrustComponents,
}

pub fn trust_score(inputs: &TrustInputs<'_>) -> TrustScore {
    let components = TrustComponents {
        relationship: relationship(inputs.prospect, inputs.rep_profile),
        intent_freshness: intent_freshness(inputs.signal, inputs.now),
        story_quality: story_quality(inputs.prospect, inputs.signal),
        deliverability: deliverability(&inputs.prospect.email),
        engagement: engagement(inputs.emails_sent),
    };
    let weighted = RELATIONSHIP_WEIGHT * components.relationship
        + FRESHNESS_WEIGHT * components.intent_freshness
        + STORY_WEIGHT * components.story_quality
        + DELIVERABILITY_WEIGHT * components.deliverability
        + ENGAGEMENT_WEIGHT * components.engagement;
    TrustScore {
        total: round_to((weighted * 100.0).clamp(0.0, 100.0), 1),
        components,
    }
}

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn relationship(prospect: &Prospect, rep: Option<&LinkedinProfile>) -> f64 {
    let title = prospect.title.as_deref().unwrap_or_default().to_lowercase();
    let mut score = 0.3;
    if let Some(rep) = rep {
        score += 0.25 * f64::from(linkedin_trust_score(rep)) / 100.0;
        let headline = rep.headline.as_deref().unwrap_or_default().to_lowercase();
        if mentions_any(&title, &INDUSTRY_KEYWORDS) && mentions_any(&headline, &INDUSTRY_KEYWORDS) {
            score += 0.15;
        }
    }
    if title.contains("alumni") {
        score += 0.2;
    }
    round_to(f64::min(score, 1.0), 2)
}

fn intent_freshness(signal: Option<&JobSignal>, now: DateTime<Utc>) -> f64 {
    let Some(signal) = signal else {
        return 0.2;
    };
    // Whole days elapsed; a signal from 47 hours ago is one day old.
    match (now - signal.detected_at).num_days().max(0) {
        0..=1 => 1.0,
        2..=3 => 0.9,
        4..=7 => 0.7,
        8..=14 => 0.5,
        15..=30 => 0.3,
        _ => 0.1,
    }
}

fn story_quality(prospect: &Prospect, signal: Option<&JobSignal>) -> f64 {
    let mut score = match signal {
        Some(s) => 0.3 + 0.7 * s.match_score.clamp(0.0, 1.0),
        None => 0.5,
    };
    let title = prospect.title.as_deref().unwrap_or_default().to_lowercase();
    if mentions_any(&title, &SENIOR_TITLES) {
        score += 0.1;
    }
    round_to(f64::min(score, 1.0), 2)
}

fn deliverability(email: &str) -> f64 {
    let email = email.trim().to_lowercase();
    let (local, domain) = email.split_once('@').unwrap_or((email.as_str(), ""));
    let mut score: f64 = 0.9;
    if FREE_MAIL.contains(&domain) {
        score -= 0.3;
    }
    if mentions_any(local, &ROLE_MAILBOXES) {
        score -= 0.2;
    }
    round_to(score.max(0.1), 2)
}

fn engagement(emails_sent: u32) -> f64 {
    round_to(0.3 + 0.15 * f64::from(emails_sent.min(4)), 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn prospect(title: &str, email: &str) -> Prospect {
        Prospect {
            id: "p".into(),
            user_id: "u".into(),
            name: "Pat Doe".into(),
            email: email.into(),
            title: Some(title.into()),
            company: "Acme".into(),
            domain: None,
            linkedin_url: None,
            added_at: Utc::now(),
        }
    }

    fn signal(age: Duration, match_score: f64, now: DateTime<Utc>) -> JobSignal {
        JobSignal {
            id: "s".into(),
            company: "Acme".into(),
            title: "QA Lead".into(),
            url: "https://jobs.example".into(),
            keywords: vec!["QA".into()],
            match_score,
            source: "search".into(),
            snippet: None,
            detected_at: now - age,
        }
    }

    #[test]
    fn baseline_without_signal_or_profile() {
        let now = Utc::now();
        let p = prospect("Engineer", "pat@acme.com");
        let score = trust_score(&TrustInputs {
            prospect: &p,
            signal: None,
            rep_profile: None,
            emails_sent: 0,
            now,
        });
        // .25*.3 + .25*.2 + .2*.5 + .15*.9 + .15*.3
        assert_eq!(score.total, 40.5);
    }

    #[test]
    fn freshness_buckets() {
        let now = Utc::now();
        let cases = [(0, 1.0), (2, 0.9), (5, 0.7), (10, 0.5), (20, 0.3), (45, 0.1)];
        for (days, expected) in cases {
            let s = signal(Duration::days(days), 0.5, now);
            assert_eq!(intent_freshness(Some(&s), now), expected, "{days} days");
        }
    }

    #[test]
    fn freshness_counts_whole_days() {
        let now = Utc::now();
        let cases = [(36, 1.0), (47, 1.0), (48, 0.9), (84, 0.9), (95, 0.9), (96, 0.7)];
        for (hours, expected) in cases {
            let s = signal(Duration::hours(hours), 0.5, now);
            assert_eq!(intent_freshness(Some(&s), now), expected, "{hours} hours");
        }
    }

    #[test]
    fn only_exact_free_mail_domains_are_penalised() {
        assert_eq!(deliverability("pat@outlook.com"), 0.6);
        assert_eq!(deliverability("pat@outlookconsulting.com"), 0.9);
        assert_eq!(deliverability("pat@yahooligans.net"), 0.9);
        assert_eq!(deliverability("pat@mail.gmail.com"), 0.9);
    }

    #[test]
    fn components_respect_caps_and_floors() {
        assert_eq!(deliverability("info@gmail.com"), 0.4);
        assert_eq!(deliverability("pat@acme.com"), 0.9);
        assert_eq!(engagement(9), 0.9);

        let rep = LinkedinProfile {
            first_name: Some("Sam".into()),
            last_name: Some("Rivera".into()),
            email: Some("sam@eloquas.ai".into()),
            headline: Some("Director of SAP Quality at Eloquas".into()),
            picture_url: Some("https://media.example/1".into()),
            ..Default::default()
        };
        let p = prospect("QA Manager (Initech alumni)", "pat@acme.com");
        // .3 + .25*.8 + .15 + .2
        assert_eq!(relationship(&p, Some(&rep)), 0.85);
        let high = signal(Duration::hours(1), 1.0, Utc::now());
        assert_eq!(story_quality(&p, Some(&high)), 1.0);
    }

    #[test]
    fn total_stays_in_range() {
        let now = Utc::now();
        let p = prospect("VP Quality alumni", "pat@acme.com");
        let s = signal(Duration::hours(2), 1.0, now);
        let score = trust_score(&TrustInputs {
            prospect: &p,
            signal: Some(&s),
            rep_profile: None,
            emails_sent: 4,
            now,
        });
        assert!(score.total > 0.0 && score.total <= 100.0);
        assert_eq!(score.components.intent_freshness, 1.0);
    }
}
