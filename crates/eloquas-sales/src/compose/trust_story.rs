// TrustBuild openings from shared LinkedIn anchors, and the StoryBuild
// sequence that casts the prospect as the hero and the rep as the guide.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use super::templates::guess_industry;
use super::{ComposeError, ComposeRequest, ComposedEmail};
use crate::engines::first_name;

const SCHOOLS: [&str; 3] = ["MIT", "Stanford", "Harvard"];
const INTERESTS: [&str; 8] = [
    "sap",
    "oracle",
    "dynamics",
    "salesforce",
    "qa automation",
    "enterprise systems",
    "digital transformation",
    "devops",
];

const SOFT_INTROS: [&str; 3] = [
    "I've been following how {company} is approaching quality and wanted to reach out.",
    "Your work at {company} came up while I was researching teams in {industry}.",
    "I came across your profile and thought a short note was worth sending.",
];

pub const EXECUTIVE_OUTCOMES: [&str; 5] = [
    "faster releases",
    "lower testing costs",
    "fewer production incidents",
    "confident upgrades",
    "a team focused on the work that matters",
];

/// Step names of the StoryBuild sequence. The seventh is optional.
pub const STORY_STEPS: [&str; 7] = [
    "Hero Introduction",
    "Hero Challenge",
    "Guide Appears",
    "Fork in the Road",
    "Happy Path Example",
    "Hero's Victory",
    "Guide's Perspective",
];

const SIGN_OFF: &str = "Best regards,";

// ---------------------------------------------------------------------------
// Anchors
// ---------------------------------------------------------------------------

/// Things two LinkedIn headlines can have in common.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Anchors {
    pub companies: BTreeSet<String>,
    pub schools: BTreeSet<String>,
    pub interests: BTreeSet<String>,
}

impl Anchors {
    pub fn is_empty(&self) -> bool {
        self.companies.is_empty() && self.schools.is_empty() && self.interests.is_empty()
    }

    fn intersect(&self, other: &Anchors) -> Anchors {
        Anchors {
            companies: self.companies.intersection(&other.companies).cloned().collect(),
            schools: self.schools.intersection(&other.schools).cloned().collect(),
            interests: self.interests.intersection(&other.interests).cloned().collect(),
        }
    }
}

/// Pull anchors out of a headline such as "QA Director at Acme | Stanford".
/// Companies are stored lowercased.
pub fn anchors_from_headline(headline: &str) -> Anchors {
    let mut anchors = Anchors::default();
    let lower = headline.to_lowercase();

    for (idx, _) in lower.match_indices(" at ") {
        let rest = &lower[idx + 4..];
        let company = rest
            .split(['|', ',', '(', ')', '@'])
            .next()
            .unwrap_or_default()
            .trim();
        if !company.is_empty() {
            anchors.companies.insert(company.to_string());
        }
    }

    let words: BTreeSet<String> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    for school in SCHOOLS {
        if words.contains(&school.to_lowercase()) {
            anchors.schools.insert(school.to_string());
        }
    }
    for interest in INTERESTS {
        if lower.contains(interest) {
            anchors.interests.insert(interest.to_string());
        }
    }
    anchors
}

pub fn shared_anchors(rep_headline: &str, prospect_headline: &str) -> Anchors {
    anchors_from_headline(rep_headline).intersect(&anchors_from_headline(prospect_headline))
}

/// Opening line: shared company, then school, then interest, otherwise a
/// soft intro.
pub fn trust_opening<R: Rng>(anchors: &Anchors, company: &str, rng: &mut R) -> String {
    if let Some(shared) = anchors.companies.iter().next() {
        return format!("I noticed we both have ties to {}, which made me want to say hello.", title_case(shared));
    }
    if let Some(school) = anchors.schools.iter().next() {
        return format!("Fellow {school} alum here, so I hope you don't mind a short note.");
    }
    if let Some(interest) = anchors.interests.iter().next() {
        return format!("I see we're both spending a lot of time on {interest} these days.");
    }
    SOFT_INTROS
        .choose(rng)
        .copied()
        .unwrap_or(SOFT_INTROS[0])
        .replace("{company}", company)
        .replace("{industry}", guess_industry(company))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// TrustBuild
// ---------------------------------------------------------------------------

pub fn trustbuild_email<R: Rng>(request: &ComposeRequest<'_>, anchors: &Anchors, rng: &mut R) -> ComposedEmail {
    let name = first_name(&request.prospect.name);
    let company = &request.prospect.company;
    let opening = trust_opening(anchors, company, rng);
    let body = format!(
        "Hi {name},\n\n{opening}\n\n\
         Teams at companies like {company} often tell us testing is the slowest part of every release. \
         {sender_company} helps them automate the repetitive checks so releases go out on time.\n\n\
         Would a 15-minute call next week be useful?\n\n\
         {SIGN_OFF}\n{sender}",
        sender_company = request.sender.company_name,
        sender = request.sender.name,
    );
    ComposedEmail {
        step: 1,
        step_name: None,
        subject: format!("A quick note for {name}"),
        body,
        template: "trustbuild".to_string(),
        trust_anchor_used: !anchors.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// StoryBuild
// ---------------------------------------------------------------------------

/// Build one StoryBuild step. Steps run from 1 to 7.
pub fn regenerate_step(request: &ComposeRequest<'_>, step: u8) -> Result<ComposedEmail, ComposeError> {
    if !(1..=STORY_STEPS.len() as u8).contains(&step) {
        return Err(ComposeError::InvalidStep(step));
    }
    let name = first_name(&request.prospect.name);
    let company = &request.prospect.company;
    let industry = guess_industry(company);
    let us = &request.sender.company_name;
    let title = request.prospect.title.as_deref().unwrap_or("a leader");

    let (subject, middle) = match step {
        1 => (
            format!("{company}'s next chapter"),
            format!(
                "As {title} at {company}, you're the one who keeps releases honest. \
                 That job gets harder every time the business asks for more, faster."
            ),
        ),
        2 => (
            format!("The release squeeze at {company}"),
            format!(
                "Most teams in {industry} we meet face the same squeeze: more change, \
                 the same number of testers, and regression suites that take days to run."
            ),
        ),
        3 => (
            "Someone who's been there".to_string(),
            format!(
                "That's where {us} comes in. We've helped quality teams turn manual regression \
                 into automated runs that finish overnight, without rewriting their process."
            ),
        ),
        4 => (
            "Two ways this can go".to_string(),
            "Teams usually pick one of two roads: keep adding people to keep pace, \
             or automate the repeatable work and let people focus on judgment calls."
                .to_string(),
        ),
        5 => (
            "What the second road looked like".to_string(),
            format!(
                "One {industry} team took the second road. Within a quarter their regression \
                 cycle dropped from two weeks to two days, and the testers moved to exploratory work."
            ),
        ),
        6 => (
            format!("Picture {company} a quarter from now"),
            "Imagine releases that ship on schedule, upgrades that no longer cause dread, \
             and a team that gets credit for speed instead of blame for delays."
                .to_string(),
        ),
        _ => (
            "One last thought".to_string(),
            format!(
                "I've watched a lot of teams make this decision. The ones who moved early \
                 didn't regret it. If timing isn't right for {company}, I understand completely."
            ),
        ),
    };
    let cta = match step {
        1 | 2 => "Does that match what you're seeing?",
        3 | 4 => "Open to a short conversation about which road fits?",
        5 | 6 => "Worth 15 minutes to see how it could work for you?",
        _ => "Either way, I'm happy to be a resource.",
    };

    Ok(ComposedEmail {
        step,
        step_name: Some(STORY_STEPS[usize::from(step) - 1].to_string()),
        subject,
        body: format!("Hi {name},\n\n{middle}\n\n{cta}\n\n{SIGN_OFF}\n{}", request.sender.name),
        template: "storybuild".to_string(),
        trust_anchor_used: false,
    })
}

/// Steps 1 to 6, plus step 7 when requested.
pub fn storybuild_sequence(request: &ComposeRequest<'_>) -> Vec<ComposedEmail> {
    let last = if request.include_optional_step { 7 } else { 6 };
    (1..=last).filter_map(|step| regenerate_step(request, step).ok()).collect()
}

/// StoryBuild with the TrustBuild opening in step 1 and an executive
/// outcome line in every step.
pub fn combined_sequence<R: Rng>(request: &ComposeRequest<'_>, anchors: &Anchors, rng: &mut R) -> Vec<ComposedEmail> {
    let opening = trust_opening(anchors, &request.prospect.company, rng);
    storybuild_sequence(request)
        .into_iter()
        .map(|mut email| {
            if email.step == 1 {
                email.body = insert_after_greeting(&email.body, &opening);
                email.trust_anchor_used = !anchors.is_empty();
            }
            let outcome = EXECUTIVE_OUTCOMES.choose(rng).copied().unwrap_or(EXECUTIVE_OUTCOMES[0]);
            email.body = insert_before_sign_off(&email.body, &format!("The path to {outcome} is clear."));
            email.template = "combined".to_string();
            email
        })
        .collect()
}

fn insert_after_greeting(body: &str, line: &str) -> String {
    match body.split_once("\n\n") {
        Some((greeting, rest)) => format!("{greeting}\n\n{line}\n\n{rest}"),
        None => format!("{line}\n\n{body}"),
    }
}

fn insert_before_sign_off(body: &str, line: &str) -> String {
    match body.rfind(SIGN_OFF) {
        Some(idx) => format!("{}{line}\n\n{}", &body[..idx], &body[idx..]),
        None => format!("{body}\n\n{line}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::test_support::{prospect, sender};
    use crate::compose::Sender;
    use eloquas_core::models::Prospect;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn request<'a>(p: &'a Prospect, s: &'a Sender, optional: bool) -> ComposeRequest<'a> {
        ComposeRequest {
            prospect: p,
            signal: None,
            sender: s,
            rep_profile: None,
            include_optional_step: optional,
        }
    }

    #[test]
    fn anchors_are_parsed_from_headlines() {
        let a = anchors_from_headline("Director of QA Automation at Acme Bank | Stanford GSB");
        assert!(a.companies.contains("acme bank"));
        assert!(a.schools.contains("Stanford"));
        assert!(a.interests.contains("qa automation"));
        // "submit" must not count as MIT
        assert!(anchors_from_headline("Submit your SAP questions").schools.is_empty());
    }

    #[test]
    fn shared_anchors_intersect_and_company_wins() {
        let shared = shared_anchors(
            "AE at Eloquas, ex Acme Bank | MIT | DevOps fan",
            "VP Engineering at Acme Bank | MIT | DevOps",
        );
        assert!(shared.companies.is_empty());
        assert_eq!(shared.schools.iter().next().map(String::as_str), Some("MIT"));
        assert!(shared.interests.contains("devops"));

        let mut rng = StdRng::seed_from_u64(0);
        let opening = trust_opening(&shared, "Acme Bank", &mut rng);
        assert!(opening.starts_with("Fellow MIT alum"));

        let by_company = shared_anchors("Consultant at Initech", "QA Lead at Initech");
        assert!(trust_opening(&by_company, "Initech", &mut rng).contains("Initech"));
    }

    #[test]
    fn soft_intro_without_anchors() {
        let mut rng = StdRng::seed_from_u64(5);
        let opening = trust_opening(&Anchors::default(), "Acme Bank", &mut rng);
        assert!(!opening.contains('{'), "{opening}");
    }

    #[test]
    fn story_steps_are_bounded() {
        let p = prospect();
        let s = sender();
        let req = request(&p, &s, false);
        assert_eq!(regenerate_step(&req, 0), Err(ComposeError::InvalidStep(0)));
        assert_eq!(regenerate_step(&req, 8), Err(ComposeError::InvalidStep(8)));
        let seventh = regenerate_step(&req, 7).unwrap();
        assert_eq!(seventh.step_name.as_deref(), Some("Guide's Perspective"));

        assert_eq!(storybuild_sequence(&req).len(), 6);
        assert_eq!(storybuild_sequence(&request(&p, &s, true)).len(), 7);
    }

    #[test]
    fn combined_adds_opening_and_outcomes() {
        let p = prospect();
        let s = sender();
        let req = request(&p, &s, false);
        let anchors = shared_anchors("AE | Stanford", "Director of QA at Acme Bank | Stanford");
        let mut rng = StdRng::seed_from_u64(9);
        let emails = combined_sequence(&req, &anchors, &mut rng);

        assert_eq!(emails.len(), 6);
        assert!(emails[0].body.starts_with("Hi Pat,\n\nFellow Stanford alum"));
        assert!(emails[0].trust_anchor_used);
        for email in &emails {
            let outcome = email.body.find("The path to").unwrap();
            assert!(outcome < email.body.find(SIGN_OFF).unwrap());
            assert_eq!(email.template, "combined");
        }
    }
}
