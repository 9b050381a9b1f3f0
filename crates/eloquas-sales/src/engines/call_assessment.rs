// Sales call coaching: score a transcript on five dimensions.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use eloquas_llm::{ChatProvider, ChatRequest};

use super::{ask_json, clean_list, prompt, round_to, EngineError, Generated};

/// Transcripts shorter than this (trimmed, in characters) are rejected.
pub const MIN_TRANSCRIPT_CHARS: usize = 200;

const WEIGHTS: DimensionScores = DimensionScores {
    discovery: 0.25,
    value_articulation: 0.25,
    objection_handling: 0.20,
    next_steps: 0.20,
    talk_ratio: 0.10,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CallAssessmentInput {
    pub transcript: String,
    #[serde(default)]
    pub prospect_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub call_goal: Option<String>,
}

/// Per-dimension scores on a 0-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionScores {
    pub discovery: f64,
    pub value_articulation: f64,
    pub objection_handling: f64,
    pub next_steps: f64,
    pub talk_ratio: f64,
}

impl DimensionScores {
    fn clamped(self) -> Self {
        let c = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 10.0) };
        Self {
            discovery: c(self.discovery),
            value_articulation: c(self.value_articulation),
            objection_handling: c(self.objection_handling),
            next_steps: c(self.next_steps),
            talk_ratio: c(self.talk_ratio),
        }
    }

    /// Weighted 0-100 score, one decimal.
    pub fn overall(&self) -> f64 {
        let sum = WEIGHTS.discovery * self.discovery
            + WEIGHTS.value_articulation * self.value_articulation
            + WEIGHTS.objection_handling * self.objection_handling
            + WEIGHTS.next_steps * self.next_steps
            + WEIGHTS.talk_ratio * self.talk_ratio;
        round_to(sum * 10.0, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallAssessment {
    pub scores: DimensionScores,
    pub overall_score: f64,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub next_actions: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawAssessment {
    #[serde(default)]
    scores: DimensionScores,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
    #[serde(default)]
    next_actions: Vec<String>,
    #[serde(default)]
    summary: String,
}

pub struct CallAssessmentEngine<'a> {
    llm: &'a dyn ChatProvider,
}

impl<'a> CallAssessmentEngine<'a> {
    pub fn new(llm: &'a dyn ChatProvider) -> Self {
        Self { llm }
    }

    pub async fn assess(&self, input: &CallAssessmentInput) -> Result<Generated<CallAssessment>, EngineError> {
        let length = input.transcript.trim().chars().count();
        if length < MIN_TRANSCRIPT_CHARS {
            return Err(EngineError::Validation(format!(
                "transcript must be at least {MIN_TRANSCRIPT_CHARS} characters (got {length})"
            )));
        }

        let request = ChatRequest::json(
            prompt::call_assessment_system_prompt(),
            prompt::build_call_assessment_prompt(input),
        )
        .with_temperature(0.2);

        let generated = match ask_json::<RawAssessment>(self.llm, &request).await {
            Ok(reply) => {
                let scores = reply.value.scores.clamped();
                let assessment = CallAssessment {
                    overall_score: scores.overall(),
                    scores,
                    strengths: clean_list(reply.value.strengths),
                    improvements: clean_list(reply.value.improvements),
                    next_actions: clean_list(reply.value.next_actions),
                    summary: reply.value.summary.trim().to_string(),
                };
                info!(overall = assessment.overall_score, model = %reply.model, "call assessed");
                Generated::from_model(assessment, reply.model)
            }
            Err(e) => {
                warn!("call assessment failed, using neutral fallback: {e}");
                Generated::fallback(fallback_assessment())
            }
        };
        Ok(generated)
    }
}

/// Neutral mid-scale assessment with generic coaching.
pub fn fallback_assessment() -> CallAssessment {
    let scores = DimensionScores {
        discovery: 5.0,
        value_articulation: 5.0,
        objection_handling: 5.0,
        next_steps: 5.0,
        talk_ratio: 5.0,
    };
    CallAssessment {
        overall_score: scores.overall(),
        scores,
        strengths: vec!["Call completed and transcript captured for review".to_string()],
        improvements: vec![
            "Ask more open-ended discovery questions about current testing process".to_string(),
            "Tie the value proposition to a metric the prospect mentioned".to_string(),
        ],
        next_actions: vec!["Send a recap email with an agreed next step and date".to_string()],
        summary: "Automated analysis unavailable; showing a neutral baseline.".to_string(),
    }
}
