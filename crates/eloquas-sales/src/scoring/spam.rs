// Heuristic spam-risk score for an outgoing email. Higher is worse.

use serde::Serialize;

const SUBJECT_TRIGGERS: [&str; 3] = ["free", "guarantee", "urgent"];
const BODY_PHRASES: [&str; 4] = ["click here", "act now", "limited time", "risk free"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpamReport {
    pub score: f64,
    /// One entry per rule that changed the score.
    pub reasons: Vec<String>,
}

impl SpamReport {
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.score > threshold
    }
}

pub fn spam_score(subject: &str, body: &str) -> SpamReport {
    let mut score = 0.0;
    let mut reasons = Vec::new();
    let mut add = |points: f64, reason: String| {
        score += points;
        reasons.push(reason);
    };

    let subject_lower = subject.to_lowercase();
    if subject.chars().count() > 100 {
        add(2.0, "subject longer than 100 characters".to_string());
    }
    if subject.chars().any(char::is_alphabetic) && !subject.chars().any(char::is_lowercase) {
        add(3.0, "subject is all caps".to_string());
    }
    if let Some(word) = SUBJECT_TRIGGERS.iter().find(|w| subject_lower.contains(*w)) {
        add(2.0, format!("subject contains \"{word}\""));
    }

    let body_lower = body.to_lowercase();
    let total_chars = body.chars().count();
    if total_chars > 0 {
        let caps = body.chars().filter(|c| c.is_uppercase()).count();
        if caps as f64 / total_chars as f64 > 0.3 {
            add(2.0, "more than 30% capital letters".to_string());
        }
    }
    for phrase in BODY_PHRASES {
        if body_lower.contains(phrase) {
            add(1.5, format!("contains \"{phrase}\""));
        }
    }
    let links = body_lower.matches("http").count();
    if links > 3 {
        add(2.0, format!("{links} links"));
    }
    let exclamations = body.matches('!').count();
    if exclamations > 3 {
        add(1.0, format!("{exclamations} exclamation marks"));
    }
    let dollars = body.matches('$').count();
    if dollars > 2 {
        add(2.0, format!("{dollars} dollar signs"));
    }

    if body_lower.contains("unsubscribe") {
        add(-1.0, "has an unsubscribe line".to_string());
    }
    let words = body.split_whitespace().count();
    if words > 50 && words < 300 {
        add(-0.5, "length between 50 and 300 words".to_string());
    }

    SpamReport {
        score: f64::max(score, 0.0),
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_email_scores_zero() {
        let body = "Hi Pat, I noticed Acme is hiring QA engineers. ".repeat(8);
        let report = spam_score("Quick question about QA at Acme", &body);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.reasons, vec!["length between 50 and 300 words".to_string()]);
    }

    #[test]
    fn spammy_email_accumulates_points() {
        let body = "CLICK HERE NOW!!!! Act now, limited time, $$$ http://a http://b http://c http://d";
        let report = spam_score("FREE MONEY", body);
        // caps subject 3 + free 2 + 3 phrases 4.5 + links 2 + ! 1 + $ 2
        assert_eq!(report.score, 14.5);
        assert!(report.exceeds(5.0));
    }

    #[test]
    fn score_is_never_negative() {
        let report = spam_score("hello", "reply unsubscribe");
        assert_eq!(report.score, 0.0);
        assert_eq!(report.reasons.len(), 1);
    }

    #[test]
    fn empty_body_is_not_a_caps_violation() {
        assert_eq!(spam_score("hi", "").score, 0.0);
        assert_eq!(spam_score("123", "").score, 0.0);
    }
}
