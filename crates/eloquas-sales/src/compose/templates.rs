// Signal-triggered spintax templates. The template is chosen from the
// keywords of the job signal that prompted the outreach.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use eloquas_core::models::{JobSignal, Prospect};

use super::spintax::render;
use super::{ComposedEmail, Sender};
use crate::engines::first_name;

const QA_KEYWORDS: [&str; 4] = ["qa", "quality", "test", "sdet"];
const ERP_KEYWORDS: [&str; 5] = ["sap", "oracle", "dynamics", "d365", "netsuite"];

pub const SIGNATURE_VARIATIONS: [&str; 3] = [
    "{sender_name}\n{sender_title} | {company_name}\n{phone}",
    "Best,\n{sender_name}\n{company_name} - {tagline}",
    "{sender_name} | {sender_title}\n{company_name}\n{phone}",
];

const QA_SIGNAL_SUBJECT: &str =
    "{Quick question|Thought for you|Idea} {on|about} {testing|QA} at {company}";

const QA_SIGNAL_BODY: &str = "{Hi|Hello|Hey} {name},

{I saw|I noticed|It looks like} {company} is {hiring|growing the team|adding people} in quality engineering. \
{Teams in {industry}|Most {industry} teams} we {talk to|work with} {hit the same wall|run into the same problem}: \
regression cycles {grow|stretch} {faster than headcount|with every release}.

{We help|{company_name} helps} QA leaders {cut regression time|shorten release cycles} \
{by automating the repetitive checks|with automation that keeps up with change}, \
{so the new hires can focus on|freeing the team for} {exploratory work|the hard problems}.

{Worth a short call next week?|Open to a 15-minute conversation?|Would it make sense to compare notes?}

{signature_variation}";

const SAP_SIGNAL_SUBJECT: &str =
    "{Your|The} {ERP|SAP} {roadmap|rollout} at {company}";

const SAP_SIGNAL_BODY: &str = "{Hi|Hello} {name},

{I noticed|I came across} {a new role|an opening} at {company} {tied to|focused on} your enterprise systems. \
{That usually means|In {industry}, that often signals} {a rollout or upgrade|change} {is on the way|ahead}.

{We work with|{company_name} supports} {teams|leaders} {like yours|in your seat} \
{to test ERP changes before they reach users|so every SAP or Oracle update ships without surprises}. \
{One customer|A recent client} {cut their upgrade testing from weeks to days|halved their release testing}.

{Could we find 15 minutes?|Is this on your radar this quarter?|Happy to share how they did it if useful.}

{signature_variation}";

/// Which spintax template a signal email uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    QaSignal,
    SapSignal,
}

impl TemplateKind {
    pub fn key(&self) -> &'static str {
        match self {
            TemplateKind::QaSignal => "qa_signal",
            TemplateKind::SapSignal => "sap_signal",
        }
    }

    fn parts(&self) -> (&'static str, &'static str) {
        match self {
            TemplateKind::QaSignal => (QA_SIGNAL_SUBJECT, QA_SIGNAL_BODY),
            TemplateKind::SapSignal => (SAP_SIGNAL_SUBJECT, SAP_SIGNAL_BODY),
        }
    }
}

/// QA keywords win over ERP keywords; no signal means the QA template.
pub fn choose_template(signal: Option<&JobSignal>) -> TemplateKind {
    let Some(signal) = signal else {
        return TemplateKind::QaSignal;
    };
    let keywords: Vec<String> = signal.keywords.iter().map(|k| k.to_lowercase()).collect();
    let matches = |list: &[&str]| keywords.iter().any(|k| list.iter().any(|w| k.contains(w)));
    if matches(&QA_KEYWORDS) {
        TemplateKind::QaSignal
    } else if matches(&ERP_KEYWORDS) {
        TemplateKind::SapSignal
    } else {
        TemplateKind::QaSignal
    }
}

/// Rough industry from the company name.
pub fn guess_industry(company: &str) -> &'static str {
    let lower = company.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has_any(&["bank", "financial", "capital"]) {
        "financial services"
    } else if has_any(&["tech", "software", "systems"]) {
        "technology"
    } else if has_any(&["health", "medical", "pharma"]) {
        "healthcare"
    } else {
        "your industry"
    }
}

pub(crate) fn template_vars<R: Rng>(prospect: &Prospect, sender: &Sender, rng: &mut R) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("name", first_name(&prospect.name).to_string());
    vars.insert("company", prospect.company.clone());
    vars.insert("sender_name", sender.name.clone());
    vars.insert("sender_title", sender.title.clone());
    vars.insert("company_name", sender.company_name.clone());
    vars.insert("phone", sender.phone.clone());
    vars.insert("tagline", sender.tagline.clone());
    vars.insert("industry", guess_industry(&prospect.company).to_string());

    let signature = SIGNATURE_VARIATIONS.choose(rng).copied().unwrap_or(SIGNATURE_VARIATIONS[0]);
    let signature = super::spintax::substitute(signature, &vars);
    vars.insert("signature_variation", signature.trim_end().to_string());
    vars
}

pub fn render_template<R: Rng>(kind: TemplateKind, prospect: &Prospect, sender: &Sender, rng: &mut R) -> ComposedEmail {
    let vars = template_vars(prospect, sender, rng);
    let (subject, body) = kind.parts();
    ComposedEmail {
        step: 1,
        step_name: None,
        subject: render(subject, &vars, rng),
        body: render(body, &vars, rng),
        template: kind.key().to_string(),
        trust_anchor_used: false,
    }
}
