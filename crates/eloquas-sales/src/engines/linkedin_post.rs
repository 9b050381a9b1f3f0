// LinkedIn thought-leadership posts.

use serde::{Deserialize, Serialize};
use tracing::warn;

use eloquas_llm::{ChatProvider, ChatRequest};

use super::{ask_json, clean_list, prompt, EngineError, Generated};
use crate::engines::cadence::Tone;

/// LinkedIn's limit for a post, hashtags included.
pub const MAX_POST_CHARS: usize = 3_000;
pub const MAX_HASHTAGS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    pub topic: String,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default = "default_true")]
    pub include_hashtags: bool,
    #[serde(default)]
    pub key_points: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedinPost {
    pub body: String,
    pub hashtags: Vec<String>,
}

impl LinkedinPost {
    /// Body followed by the hashtag line, cut to the post limit.
    pub fn text(&self) -> String {
        let mut text = self.body.clone();
        if !self.hashtags.is_empty() {
            text.push_str("\n\n");
            text.push_str(&self.hashtags.join(" "));
        }
        truncate_chars(&text, MAX_POST_CHARS)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawPost {
    #[serde(default, alias = "post", alias = "content")]
    body: String,
    #[serde(default)]
    hashtags: Vec<String>,
}

pub struct LinkedinPostEngine<'a> {
    llm: &'a dyn ChatProvider,
}

impl<'a> LinkedinPostEngine<'a> {
    pub fn new(llm: &'a dyn ChatProvider) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, input: &PostInput) -> Result<Generated<LinkedinPost>, EngineError> {
        if input.topic.trim().is_empty() {
            return Err(EngineError::Validation("topic is required".to_string()));
        }
        let request = ChatRequest::json(
            prompt::linkedin_post_system_prompt(),
            prompt::build_linkedin_post_prompt(input),
        )
        .with_temperature(0.8);

        let generated = match ask_json::<RawPost>(self.llm, &request).await {
            Ok(reply) if !reply.value.body.trim().is_empty() => {
                let hashtags = if input.include_hashtags {
                    normalize_hashtags(reply.value.hashtags)
                } else {
                    Vec::new()
                };
                Generated::from_model(finish(reply.value.body.trim(), hashtags), reply.model)
            }
            Ok(_) => {
                warn!(topic = %input.topic, "model returned an empty post, using template");
                Generated::fallback(fallback_post(input))
            }
            Err(e) => {
                warn!(topic = %input.topic, "post generation failed, using template: {e}");
                Generated::fallback(fallback_post(input))
            }
        };
        Ok(generated)
    }
}

/// Trim the body so that body plus hashtags fits the post limit.
fn finish(body: &str, hashtags: Vec<String>) -> LinkedinPost {
    let tag_len: usize = if hashtags.is_empty() {
        0
    } else {
        2 + hashtags.join(" ").chars().count()
    };
    LinkedinPost {
        body: truncate_chars(body, MAX_POST_CHARS.saturating_sub(tag_len)),
        hashtags,
    }
}

/// `#`-prefixed, no inner whitespace or punctuation, no duplicates, at most five.
pub fn normalize_hashtags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in clean_list(tags) {
        let word: String = tag
            .trim_start_matches('#')
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            continue;
        }
        let tag = format!("#{word}");
        if !out.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            out.push(tag);
        }
        if out.len() == MAX_HASHTAGS {
            break;
        }
    }
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

pub fn fallback_post(input: &PostInput) -> LinkedinPost {
    let topic = input.topic.trim();
    let audience = input.audience.as_deref().unwrap_or("enterprise technology leaders");
    let mut body = format!(
        "{topic} keeps coming up in my conversations with {audience}.\n\n\
         The teams making progress share one habit: they measure what slows releases down before they buy anything.\n"
    );
    let points = clean_list(input.key_points.clone());
    if !points.is_empty() {
        body.push('\n');
        for point in &points {
            body.push_str(&format!("- {point}\n"));
        }
    }
    body.push_str("\nWhat has worked for your team? I'd like to hear it in the comments.");

    let hashtags = if input.include_hashtags {
        normalize_hashtags(vec![
            "QualityEngineering".into(),
            "TestAutomation".into(),
            "EnterpriseSystems".into(),
        ])
    } else {
        Vec::new()
    };
    finish(&body, hashtags)
}
