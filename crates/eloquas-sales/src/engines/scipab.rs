// SCIPAB messaging framework: Situation, Complication, Implication,
// Position, Ask, Benefit.

use serde::{Deserialize, Serialize};
use tracing::warn;

use eloquas_llm::{ChatProvider, ChatRequest};

use super::{ask_json, clean_list, prompt, EngineError, Generated};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScipabInput {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub prospect_name: Option<String>,
    #[serde(default)]
    pub prospect_title: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub value_proposition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scipab {
    pub situation: String,
    pub complication: String,
    pub implication: String,
    pub position: String,
    pub ask: String,
    pub benefit: String,
}

impl Scipab {
    /// Replace blank fields with the corresponding field of `other`.
    fn fill_from(mut self, other: Scipab) -> Self {
        let fill = |field: &mut String, replacement: String| {
            if field.trim().is_empty() {
                *field = replacement;
            } else {
                *field = field.trim().to_string();
            }
        };
        fill(&mut self.situation, other.situation);
        fill(&mut self.complication, other.complication);
        fill(&mut self.implication, other.implication);
        fill(&mut self.position, other.position);
        fill(&mut self.ask, other.ask);
        fill(&mut self.benefit, other.benefit);
        self
    }

    fn is_blank(&self) -> bool {
        [
            &self.situation,
            &self.complication,
            &self.implication,
            &self.position,
            &self.ask,
            &self.benefit,
        ]
        .iter()
        .all(|f| f.trim().is_empty())
    }
}

pub struct ScipabEnhancementEngine<'a> {
    llm: &'a dyn ChatProvider,
}

impl<'a> ScipabEnhancementEngine<'a> {
    pub fn new(llm: &'a dyn ChatProvider) -> Self {
        Self { llm }
    }

    pub async fn enhance(&self, input: &ScipabInput) -> Result<Generated<Scipab>, EngineError> {
        if input.company.trim().is_empty() {
            return Err(EngineError::Validation("company is required".to_string()));
        }
        let mut input = input.clone();
        input.pain_points = clean_list(input.pain_points);

        let request = ChatRequest::json(prompt::scipab_system_prompt(), prompt::build_scipab_prompt(&input));
        let generated = match ask_json::<Scipab>(self.llm, &request).await {
            Ok(reply) if !reply.value.is_blank() => {
                Generated::from_model(reply.value.fill_from(fallback_scipab(&input)), reply.model)
            }
            Ok(_) => {
                warn!(company = %input.company, "model returned an empty SCIPAB, using template");
                Generated::fallback(fallback_scipab(&input))
            }
            Err(e) => {
                warn!(company = %input.company, "SCIPAB generation failed, using template: {e}");
                Generated::fallback(fallback_scipab(&input))
            }
        };
        Ok(generated)
    }
}

pub fn fallback_scipab(input: &ScipabInput) -> Scipab {
    let company = input.company.trim();
    let industry = input.industry.as_deref().unwrap_or("enterprise");
    let role = input.prospect_title.as_deref().unwrap_or("engineering leaders");
    let pain = input
        .pain_points
        .first()
        .map(String::as_str)
        .unwrap_or("manual regression testing slowing every release");
    let value = input
        .value_proposition
        .as_deref()
        .unwrap_or("automated, risk-based testing for packaged enterprise applications");

    Scipab {
        situation: format!(
            "{company} runs business-critical {industry} systems that change with every vendor update and internal release."
        ),
        complication: format!("Teams are dealing with {pain}."),
        implication: format!(
            "Each release carries more risk and more overtime, and {role} end up trading speed against stability."
        ),
        position: format!("We provide {value}, so coverage grows without adding headcount."),
        ask: "Would a 30-minute working session to map your highest-risk workflows be useful?".to_string(),
        benefit: "Shorter regression cycles, fewer production incidents and predictable release dates.".to_string(),
    }
}
