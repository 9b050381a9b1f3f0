// Template-based email composition: spintax signal templates, TrustBuild
// openings and StoryBuild sequences. No model calls.

pub mod spintax;
pub mod templates;
pub mod trust_story;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use eloquas_core::models::{JobSignal, LinkedinProfile, Prospect, Role, User};

use self::templates::{choose_template, render_template};
use self::trust_story::{combined_sequence, shared_anchors, storybuild_sequence, trustbuild_email};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("invalid story step {0}: must be between 1 and 7")]
    InvalidStep(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeMode {
    #[default]
    Template,
    TrustBuild,
    StoryBuild,
    Combined,
}

/// Who the email is from, for greetings and signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub name: String,
    pub title: String,
    pub company_name: String,
    pub phone: String,
    pub tagline: String,
}

impl Sender {
    pub fn from_user(user: &User) -> Self {
        let name = user
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| user.email.split('@').next().unwrap_or_default().to_string());
        Self {
            name,
            title: match user.role {
                Role::Bdr => "Business Development Representative".to_string(),
                _ => "Senior Account Executive".to_string(),
            },
            company_name: user.company.clone().unwrap_or_else(|| "Eloquas AI".to_string()),
            phone: user.phone.clone().unwrap_or_default(),
            tagline: "Intelligent Sales Automation".to_string(),
        }
    }
}

pub struct ComposeRequest<'a> {
    pub prospect: &'a Prospect,
    pub signal: Option<&'a JobSignal>,
    pub sender: &'a Sender,
    /// The rep's LinkedIn profile; its headline feeds TrustBuild anchors.
    pub rep_profile: Option<&'a LinkedinProfile>,
    pub include_optional_step: bool,
}

impl ComposeRequest<'_> {
    /// Stand-in for the prospect's LinkedIn headline.
    pub(crate) fn prospect_headline(&self) -> String {
        match self.prospect.title.as_deref() {
            Some(title) => format!("{title} at {}", self.prospect.company),
            None => format!("at {}", self.prospect.company),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedEmail {
    pub step: u8,
    pub step_name: Option<String>,
    pub subject: String,
    pub body: String,
    /// Template key or mode that produced the email.
    pub template: String,
    pub trust_anchor_used: bool,
}

/// Compose one email (template, trustbuild) or a sequence (storybuild,
/// combined).
pub fn compose<R: Rng>(mode: ComposeMode, request: &ComposeRequest<'_>, rng: &mut R) -> Vec<ComposedEmail> {
    let rep_headline = request
        .rep_profile
        .and_then(|p| p.headline.as_deref())
        .unwrap_or_default();
    match mode {
        ComposeMode::Template => {
            let kind = choose_template(request.signal);
            vec![render_template(kind, request.prospect, request.sender, rng)]
        }
        ComposeMode::TrustBuild => {
            let anchors = shared_anchors(rep_headline, &request.prospect_headline());
            vec![trustbuild_email(request, &anchors, rng)]
        }
        ComposeMode::StoryBuild => storybuild_sequence(request),
        ComposeMode::Combined => {
            let anchors = shared_anchors(rep_headline, &request.prospect_headline());
            combined_sequence(request, &anchors, rng)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use eloquas_core::models::Prospect;

    use super::Sender;

    pub fn prospect() -> Prospect {
        Prospect {
            id: "p1".into(),
            user_id: "u1".into(),
            name: "Pat Doe".into(),
            email: "pat@acmebank.com".into(),
            title: Some("Director of QA".into()),
            company: "Acme Bank".into(),
            domain: None,
            linkedin_url: None,
            added_at: Utc::now(),
        }
    }

    pub fn sender() -> Sender {
        Sender {
            name: "Alex Kim".into(),
            title: "Senior Account Executive".into(),
            company_name: "Eloquas AI".into(),
            phone: "(555) 010-2000".into(),
            tagline: "Intelligent Sales Automation".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{prospect, sender};
    use super::*;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn every_mode_produces_spun_text() {
        let p = prospect();
        let s = sender();
        let request = ComposeRequest {
            prospect: &p,
            signal: None,
            sender: &s,
            rep_profile: None,
            include_optional_step: false,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let counts: Vec<usize> = [
            ComposeMode::Template,
            ComposeMode::TrustBuild,
            ComposeMode::StoryBuild,
            ComposeMode::Combined,
        ]
        .iter()
        .map(|mode| {
            let emails = compose(*mode, &request, &mut rng);
            for e in &emails {
                assert!(!e.body.contains('{'), "{mode:?}: {}", e.body);
                assert!(!e.subject.contains('{'), "{mode:?}: {}", e.subject);
            }
            emails.len()
        })
        .collect();
        assert_eq!(counts, vec![1, 1, 6, 6]);
    }

    #[test]
    fn sender_defaults_from_user() {
        let user = User {
            id: "u".into(),
            email: "alex@eloquas.ai".into(),
            password_hash: String::new(),
            role: Role::Bdr,
            company: None,
            full_name: None,
            phone: None,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        };
        let s = Sender::from_user(&user);
        assert_eq!(s.name, "alex");
        assert_eq!(s.company_name, "Eloquas AI");
        assert_eq!(s.title, "Business Development Representative");
    }
}
