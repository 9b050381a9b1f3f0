// Six-touch outbound email cadence for one prospect.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use eloquas_core::models::{CadenceStep, JobSignal, Prospect};
use eloquas_llm::{ChatProvider, ChatRequest};

use super::{ask_json, first_name, prompt, Generated};

/// Day offsets of the six steps, counted from enrollment.
pub const STEP_DAYS: [u32; 6] = [1, 3, 7, 10, 14, 21];
pub const STEP_COUNT: usize = STEP_DAYS.len();

const CHANNELS: [&str; 3] = ["email", "linkedin", "call"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Consultative,
    Direct,
    Friendly,
    Executive,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Consultative => "consultative",
            Tone::Direct => "direct",
            Tone::Friendly => "friendly",
            Tone::Executive => "executive",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CadenceInput {
    pub prospect: Prospect,
    pub signal: Option<JobSignal>,
    pub tone: Tone,
    pub value_proposition: Option<String>,
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cadence {
    pub name: String,
    pub steps: Vec<CadenceStep>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCadence {
    #[serde(default)]
    name: String,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStep {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    channel: Option<String>,
}

pub struct EmailCadenceEngine<'a> {
    llm: &'a dyn ChatProvider,
}

impl<'a> EmailCadenceEngine<'a> {
    pub fn new(llm: &'a dyn ChatProvider) -> Self {
        Self { llm }
    }

    /// Always returns six steps. Model failures produce the template cadence.
    pub async fn generate(&self, input: &CadenceInput) -> Generated<Cadence> {
        let request = ChatRequest::json(
            prompt::cadence_system_prompt(),
            prompt::build_cadence_prompt(input),
        )
        .with_max_tokens(2_500);

        match ask_json::<RawCadence>(self.llm, &request).await {
            Ok(reply) => {
                let returned = reply.value.steps.len();
                let cadence = normalize(reply.value, input);
                info!(
                    prospect = %input.prospect.id,
                    returned,
                    model = %reply.model,
                    "cadence generated"
                );
                Generated::from_model(cadence, reply.model)
            }
            Err(e) => {
                warn!(prospect = %input.prospect.id, "cadence generation failed, using template: {e}");
                Generated::fallback(fallback_cadence(input))
            }
        }
    }
}

/// Force the model's answer into six steps on the fixed schedule. Extra steps
/// are dropped; missing or empty ones come from the template.
fn normalize(raw: RawCadence, input: &CadenceInput) -> Cadence {
    let template = fallback_cadence(input);
    let mut raw_steps = raw.steps.into_iter();

    let steps = template
        .steps
        .iter()
        .enumerate()
        .map(|(i, fallback)| {
            let candidate = raw_steps.next().unwrap_or_default();
            if candidate.subject.trim().is_empty() || candidate.body.trim().is_empty() {
                return fallback.clone();
            }
            CadenceStep {
                step: (i + 1) as u8,
                day: STEP_DAYS[i],
                channel: normalize_channel(candidate.channel.as_deref()),
                subject: candidate.subject.trim().to_string(),
                body: candidate.body.trim().to_string(),
            }
        })
        .collect();

    let name = if raw.name.trim().is_empty() {
        template.name
    } else {
        raw.name.trim().to_string()
    };
    Cadence { name, steps }
}

fn normalize_channel(channel: Option<&str>) -> String {
    let lower = channel.unwrap_or("email").trim().to_lowercase();
    if CHANNELS.contains(&lower.as_str()) {
        lower
    } else {
        "email".to_string()
    }
}

/// Template cadence used when the model is unavailable.
pub fn fallback_cadence(input: &CadenceInput) -> Cadence {
    let p = &input.prospect;
    let name = first_name(&p.name);
    let company = p.company.as_str();
    let sender = input.sender_name.as_deref().unwrap_or("The Eloquas team");
    let role = p.title.as_deref().unwrap_or("your team");
    let hook = match &input.signal {
        Some(signal) => format!("I saw {company} is hiring for \"{}\"", signal.title),
        None => format!("I've been following how {company} approaches quality engineering"),
    };
    let value = input
        .value_proposition
        .as_deref()
        .unwrap_or("cut regression cycles from weeks to days without adding headcount");

    let touches: [(&str, String, String); STEP_COUNT] = [
        (
            "email",
            format!("{company} and release confidence"),
            format!(
                "Hi {name},\n\n{hook}, and it made me wonder how your test coverage is keeping up with release pace.\n\n\
                 We help teams like yours {value}.\n\n\
                 Open to a 15-minute conversation next week?\n\n{sender}"
            ),
        ),
        (
            "email",
            format!("A quick idea for {company}"),
            format!(
                "Hi {name},\n\nFollowing up with one concrete idea: start by automating the five regression flows \
                 that block releases most often. Teams that do this first usually see results inside a quarter.\n\n\
                 Worth comparing notes?\n\n{sender}"
            ),
        ),
        (
            "linkedin",
            format!("Connecting with {name}"),
            format!(
                "Hi {name}, I work with leaders in {role} roles on test automation for enterprise systems. \
                 Would be glad to connect and share what's working for peers at companies like {company}."
            ),
        ),
        (
            "email",
            "How a peer cut test time by 80%".to_string(),
            format!(
                "Hi {name},\n\nA company at a similar scale to {company} moved from three-week regression cycles \
                 to three days within 90 days. The key was proving one critical workflow before scaling.\n\n\
                 Happy to walk you through how they did it.\n\n{sender}"
            ),
        ),
        (
            "call",
            format!("Call: {name} at {company}"),
            format!(
                "Reference the earlier emails and the {company} hiring activity. Ask how releases are tested today, \
                 where regression time goes, and who owns automation. Goal: book a 30-minute discovery session."
            ),
        ),
        (
            "email",
            "Should I close the loop?".to_string(),
            format!(
                "Hi {name},\n\nI haven't heard back, so I'll assume timing isn't right. If improving release \
                 confidence at {company} becomes a priority, reply to this note and I'll send over a short plan.\n\n{sender}"
            ),
        ),
    ];

    let steps = touches
        .into_iter()
        .enumerate()
        .map(|(i, (channel, subject, body))| CadenceStep {
            step: (i + 1) as u8,
            day: STEP_DAYS[i],
            channel: channel.to_string(),
            subject,
            body,
        })
        .collect();

    Cadence {
        name: format!("{company} outreach: {}", p.name),
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eloquas_llm::ScriptedProvider;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn input() -> CadenceInput {
        CadenceInput {
            prospect: Prospect {
                id: "p1".into(),
                user_id: "u1".into(),
                name: "Pat Doe".into(),
                email: "pat@acme.com".into(),
                title: Some("Director of QA".into()),
                company: "Acme".into(),
                domain: None,
                linkedin_url: None,
                added_at: Utc::now(),
            },
            signal: None,
            tone: Tone::Direct,
            value_proposition: None,
            sender_name: Some("Alex".into()),
        }
    }

    fn step(subject: &str) -> serde_json::Value {
        json!({ "subject": subject, "body": format!("Body for {subject}"), "channel": "email" })
    }

    fn assert_schedule(cadence: &Cadence) {
        assert_eq!(cadence.steps.len(), 6);
        let days: Vec<u32> = cadence.steps.iter().map(|s| s.day).collect();
        assert_eq!(days, STEP_DAYS.to_vec());
        let numbers: Vec<u8> = cadence.steps.iter().map(|s| s.step).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn short_answers_are_padded_from_template() {
        let llm = ScriptedProvider::new();
        llm.push_json(&json!({ "name": "Acme QA push", "steps": [step("One"), step("Two")] }));

        let out = EmailCadenceEngine::new(&llm).generate(&input()).await;
        assert!(!out.used_fallback);
        assert_schedule(&out.value);
        assert_eq!(out.value.name, "Acme QA push");
        assert_eq!(out.value.steps[1].subject, "Two");
        assert_eq!(out.value.steps[2], fallback_cadence(&input()).steps[2]);
    }

    #[tokio::test]
    async fn long_answers_are_truncated() {
        let llm = ScriptedProvider::new();
        let steps: Vec<_> = (1..=9).map(|i| step(&format!("S{i}"))).collect();
        llm.push_json(&json!({ "steps": steps }));

        let out = EmailCadenceEngine::new(&llm).generate(&input()).await;
        assert_schedule(&out.value);
        assert_eq!(out.value.steps[5].subject, "S6");
        assert!(out.value.name.starts_with("Acme outreach"));
    }

    #[tokio::test]
    async fn unknown_channels_become_email_and_empty_steps_fall_back() {
        let llm = ScriptedProvider::new();
        llm.push_json(&json!({ "steps": [
            { "subject": "Hi", "body": "Text", "channel": "Fax" },
            { "subject": "", "body": "no subject" }
        ] }));

        let out = EmailCadenceEngine::new(&llm).generate(&input()).await;
        assert_eq!(out.value.steps[0].channel, "email");
        assert_eq!(out.value.steps[1], fallback_cadence(&input()).steps[1]);
    }

    #[tokio::test]
    async fn model_failure_returns_template() {
        let llm = ScriptedProvider::new();
        llm.push_failure(500);

        let out = EmailCadenceEngine::new(&llm).generate(&input()).await;
        assert!(out.used_fallback);
        assert_eq!(out.model, None);
        assert_schedule(&out.value);
        assert!(out.value.steps[0].body.starts_with("Hi Pat,"));
    }

    #[test]
    fn template_mentions_signal() {
        let mut with_signal = input();
        with_signal.signal = Some(JobSignal {
            id: "s".into(),
            company: "Acme".into(),
            title: "Senior QA Engineer".into(),
            url: "https://jobs.example/1".into(),
            keywords: vec!["QA".into()],
            match_score: 0.9,
            source: "search".into(),
            snippet: None,
            detected_at: Utc::now(),
        });
        let cadence = fallback_cadence(&with_signal);
        assert!(cadence.steps[0].body.contains("hiring for \"Senior QA Engineer\""));
    }
}
