// Trust score (0-100) for a LinkedIn profile: how complete and credible the
// profile looks to a prospect.

use eloquas_core::models::LinkedinProfile;

const SENIORITY_KEYWORDS: [&str; 6] = ["executive", "director", "manager", "vp", "president", "chief"];
const TECH_KEYWORDS: [&str; 6] = ["sap", "oracle", "dynamics", "salesforce", "qa", "quality"];

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// 20 points for each filled field: first name, last name, email, headline, picture.
fn completeness(profile: &LinkedinProfile) -> u32 {
    [
        &profile.first_name,
        &profile.last_name,
        &profile.email,
        &profile.headline,
        &profile.picture_url,
    ]
    .into_iter()
    .filter(|f| present(f))
    .count() as u32
        * 20
}

fn headline_quality(headline: Option<&str>) -> u32 {
    let Some(headline) = headline.map(str::trim).filter(|h| !h.is_empty()) else {
        return 0;
    };
    let lower = headline.to_lowercase();
    let mut score = 0;
    if headline.chars().count() > 20 {
        score += 30;
    }
    if SENIORITY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        score += 40;
    }
    if TECH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        score += 30;
    }
    score
}

pub fn linkedin_trust_score(profile: &LinkedinProfile) -> u8 {
    let photo = if present(&profile.picture_url) { 100.0 } else { 0.0 };
    let score = completeness(profile) as f64 * 0.3
        + headline_quality(profile.headline.as_deref()) as f64 * 0.3
        + photo * 0.2;
    score.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_scores_zero() {
        assert_eq!(linkedin_trust_score(&LinkedinProfile::default()), 0);
    }

    #[test]
    fn complete_senior_profile_scores_highest() {
        let profile = LinkedinProfile {
            first_name: Some("Sam".into()),
            last_name: Some("Rivera".into()),
            email: Some("sam@initech.com".into()),
            headline: Some("Director of Quality Engineering at Initech".into()),
            picture_url: Some("https://media.example/1".into()),
            ..Default::default()
        };
        // 100*.3 + 100*.3 + 100*.2
        assert_eq!(linkedin_trust_score(&profile), 80);
    }

    #[test]
    fn short_generic_headline_adds_little() {
        let profile = LinkedinProfile {
            first_name: Some("Sam".into()),
            headline: Some("Consultant".into()),
            ..Default::default()
        };
        // completeness 40 -> 12, headline 0
        assert_eq!(linkedin_trust_score(&profile), 12);
        assert_eq!(headline_quality(Some("Sales manager")), 40);
    }
}
