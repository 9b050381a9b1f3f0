// StoryScore (0-20): how well an email tells a story. The model grades three
// components; a keyword heuristic stands in when it is unavailable.

use serde::{Deserialize, Serialize};
use tracing::warn;

use eloquas_llm::{ChatProvider, ChatRequest};

use crate::engines::{ask_json, prompt, Generated};

pub const MAX_STORY_SCORE: u8 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryScore {
    pub total: u8,
    pub emotional_pull: Option<u8>,
    pub personalization: Option<u8>,
    pub clarity_cta: Option<u8>,
    pub feedback: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawStory {
    #[serde(default)]
    emotional_pull: f64,
    #[serde(default)]
    personalization: f64,
    #[serde(default)]
    clarity_cta: f64,
    #[serde(default)]
    feedback: String,
}

fn component(value: f64, max: u8) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, max as f64) as u8
}

pub async fn score_story(llm: &dyn ChatProvider, subject: &str, body: &str) -> Generated<StoryScore> {
    let request = ChatRequest::json(
        prompt::story_score_system_prompt(),
        prompt::build_story_score_prompt(subject, body),
    )
    .with_temperature(0.3)
    .with_max_tokens(300);

    match ask_json::<RawStory>(llm, &request).await {
        Ok(reply) => {
            let emotional_pull = component(reply.value.emotional_pull, 7);
            let personalization = component(reply.value.personalization, 7);
            let clarity_cta = component(reply.value.clarity_cta, 6);
            Generated::from_model(
                StoryScore {
                    total: emotional_pull + personalization + clarity_cta,
                    emotional_pull: Some(emotional_pull),
                    personalization: Some(personalization),
                    clarity_cta: Some(clarity_cta),
                    feedback: reply.value.feedback.trim().to_string(),
                },
                reply.model,
            )
        }
        Err(e) => {
            warn!("story scoring failed, using heuristic: {e}");
            Generated::fallback(StoryScore {
                total: heuristic_story_score(body),
                emotional_pull: None,
                personalization: None,
                clarity_cta: None,
                feedback: "Estimated from keywords and length.".to_string(),
            })
        }
    }
}

/// Keyword and length heuristic over the email body.
pub fn heuristic_story_score(body: &str) -> u8 {
    let lower = body.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let mut score: i32 = 10;
    if has_any(&["noticed", "saw your", "your team", "your company"]) {
        score += 2;
    }
    if has_any(&["reduce", "improve", "increase", "save", "accelerate"]) {
        score += 2;
    }
    if has_any(&["chat", "connect", "discuss", "meeting", "call"]) {
        score += 1;
    }
    let words = body.split_whitespace().count();
    if words > 150 {
        score -= 2;
    } else if words < 50 {
        score -= 1;
    }
    if has_any(&["sap", "oracle", "dynamics", "qa", "automation"]) {
        score += 1;
    }
    score.clamp(0, MAX_STORY_SCORE as i32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use eloquas_llm::ScriptedProvider;
    use serde_json::json;

    #[test]
    fn heuristic_rewards_personal_valuable_emails() {
        let body = "I noticed your team is scaling QA. We help reduce regression time. \
                    Open to a quick call? "
            .repeat(4);
        // 10 + 2 + 2 + 1 + 1, 60 words
        assert_eq!(heuristic_story_score(&body), 16);
        // short and generic: 10 - 1
        assert_eq!(heuristic_story_score("Hello there"), 9);
    }

    #[tokio::test]
    async fn model_components_are_clamped() {
        let llm = ScriptedProvider::new();
        llm.push_json(&json!({ "emotional_pull": 9, "personalization": 5.4, "clarity_cta": -1, "feedback": " Add a CTA " }));
        let out = score_story(&llm, "Hi", "Body").await;
        assert_eq!(out.value.total, 12);
        assert_eq!(out.value.emotional_pull, Some(7));
        assert_eq!(out.value.clarity_cta, Some(0));
        assert_eq!(out.value.feedback, "Add a CTA");
    }

    #[tokio::test]
    async fn unavailable_model_uses_heuristic() {
        let llm = ScriptedProvider::new();
        let out = score_story(&llm, "Hi", "Hello there").await;
        assert!(out.used_fallback);
        assert_eq!(out.value.total, 9);
        assert_eq!(out.value.personalization, None);
    }
}
