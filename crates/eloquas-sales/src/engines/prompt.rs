// Prompt templates for every engine.
//
// Each engine has a static system prompt describing the JSON it must return
// and a builder that lays out the request context in `## SECTION` blocks.
// Sources are numbered and listed with their URLs so answers can cite them.

use super::call_assessment::CallAssessmentInput;
use super::cadence::{CadenceInput, STEP_DAYS};
use super::linkedin_post::{PostInput, MAX_HASHTAGS, MAX_POST_CHARS};
use super::platform::{DetectedPlatform, PLATFORMS};
use super::scipab::ScipabInput;
use super::{Evidence, EvidenceOrigin};

/// Longest snippet included per source.
const SNIPPET_CHARS: usize = 600;

// ---------------------------------------------------------------------------
// Shared sections
// ---------------------------------------------------------------------------

fn format_sources(evidence: &[Evidence]) -> String {
    let mut out = String::with_capacity(evidence.len() * 256);
    for (i, e) in evidence.iter().enumerate() {
        let origin = match e.origin {
            EvidenceOrigin::Web => "web",
            EvidenceOrigin::Drive => "internal document",
        };
        let snippet: String = e.snippet.chars().take(SNIPPET_CHARS).collect();
        out.push_str(&format!(
            "[{}] {} ({origin})\nURL: {}\n{}\n\n",
            i + 1,
            e.title,
            e.url,
            snippet.trim(),
        ));
    }
    out
}

fn format_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {}\n", i.trim()))
        .collect::<String>()
}

// ---------------------------------------------------------------------------
// Email cadence
// ---------------------------------------------------------------------------

pub fn cadence_system_prompt() -> String {
    "You are an expert B2B sales development writer for Eloquas, which sells test automation for \
     enterprise systems (SAP, Oracle, Microsoft Dynamics 365, Salesforce).\n\
     \n\
     Write a six-step outbound cadence. Steps are sent on days 1, 3, 7, 10, 14 and 21.\n\
     Each step has a channel (email, linkedin or call), a subject and a body.\n\
     Emails stay under 120 words, open with something specific to the prospect, make one point \
     and end with a low-friction question. No spam trigger words, no exclamation marks.\n\
     \n\
     Respond with JSON only:\n\
     {\"name\": string, \"steps\": [{\"channel\": string, \"subject\": string, \"body\": string}]}"
        .to_string()
}

pub fn build_cadence_prompt(input: &CadenceInput) -> String {
    let p = &input.prospect;
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!(
        "## PROSPECT\n\
         Name: {}\n\
         Title: {}\n\
         Company: {}\n\
         Email: {}\n\n",
        p.name,
        p.title.as_deref().unwrap_or("unknown"),
        p.company,
        p.email,
    ));

    if let Some(signal) = &input.signal {
        prompt.push_str(&format!(
            "## BUYING SIGNAL\n\
             Job posting: {}\n\
             Keywords: {}\n\
             Match score: {:.2}\n\
             URL: {}\n\n",
            signal.title,
            signal.keywords.join(", "),
            signal.match_score,
            signal.url,
        ));
    }

    prompt.push_str(&format!("## TONE\n{}\n\n", input.tone.as_str()));

    if let Some(value) = input.value_proposition.as_deref().filter(|v| !v.trim().is_empty()) {
        prompt.push_str(&format!("## VALUE PROPOSITION\n{}\n\n", value.trim()));
    }
    if let Some(sender) = &input.sender_name {
        prompt.push_str(&format!("## SENDER\nSign emails as {sender}.\n\n"));
    }

    let days = STEP_DAYS.map(|d| d.to_string()).join(", ");
    prompt.push_str(&format!(
        "## TASK\nWrite exactly {} steps for days {days}.",
        STEP_DAYS.len()
    ));
    prompt
}

// ---------------------------------------------------------------------------
// Intent discovery
// ---------------------------------------------------------------------------

pub fn intent_system_prompt() -> String {
    "You are a B2B sales intelligence analyst. From the numbered sources, identify signals that \
     the company may buy test automation or quality engineering services.\n\
     \n\
     Signal types: hiring, technology_change, leadership_change, funding, expansion, news.\n\
     Every signal must cite exactly one source URL from the list. Do not use outside knowledge. \
     If the sources show no real signal, return an empty list.\n\
     Confidence is between 0 and 1.\n\
     \n\
     Respond with JSON only:\n\
     {\"summary\": string, \"signals\": [{\"type\": string, \"description\": string, \
     \"confidence\": number, \"source_url\": string}]}"
        .to_string()
}

pub fn build_intent_prompt(company: &str, evidence: &[Evidence]) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(&format!("## COMPANY\n{company}\n\n"));
    prompt.push_str("## SOURCES\n");
    prompt.push_str(&format_sources(evidence));
    prompt.push_str("## TASK\nList the buying-intent signals these sources support.");
    prompt
}

// ---------------------------------------------------------------------------
// Call assessment
// ---------------------------------------------------------------------------

pub fn call_assessment_system_prompt() -> String {
    "You are a sales coach reviewing a recorded sales call.\n\
     \n\
     Score the rep from 0 to 10 on each dimension:\n\
     - discovery: quality and depth of questions about the prospect's situation\n\
     - value_articulation: how clearly value was tied to the prospect's problems\n\
     - objection_handling: how concerns were acknowledged and answered\n\
     - next_steps: whether a concrete, dated next step was agreed\n\
     - talk_ratio: 10 when the prospect spoke most of the time, 0 when the rep monologued\n\
     \n\
     Quote or paraphrase the transcript in strengths and improvements. Keep each item to one sentence.\n\
     \n\
     Respond with JSON only:\n\
     {\"scores\": {\"discovery\": number, \"value_articulation\": number, \"objection_handling\": number, \
     \"next_steps\": number, \"talk_ratio\": number}, \"strengths\": [string], \"improvements\": [string], \
     \"next_actions\": [string], \"summary\": string}"
        .to_string()
}

pub fn build_call_assessment_prompt(input: &CallAssessmentInput) -> String {
    let mut prompt = String::with_capacity(input.transcript.len() + 512);
    prompt.push_str("## CALL CONTEXT\n");
    if let Some(name) = &input.prospect_name {
        prompt.push_str(&format!("Prospect: {name}\n"));
    }
    if let Some(company) = &input.company {
        prompt.push_str(&format!("Company: {company}\n"));
    }
    prompt.push_str(&format!(
        "Goal: {}\n\n",
        input.call_goal.as_deref().unwrap_or("discovery call")
    ));
    prompt.push_str("## TRANSCRIPT\n");
    prompt.push_str(input.transcript.trim());
    prompt.push_str("\n\n## TASK\nAssess this call.");
    prompt
}

// ---------------------------------------------------------------------------
// SCIPAB
// ---------------------------------------------------------------------------

pub fn scipab_system_prompt() -> String {
    "You write executive messaging using the SCIPAB framework:\n\
     Situation (the prospect's current state), Complication (what is changing or breaking), \
     Implication (the business cost of doing nothing), Position (how we solve it), \
     Ask (one specific request), Benefit (the outcome for the prospect).\n\
     Each field is one or two sentences in plain business language.\n\
     \n\
     Respond with JSON only:\n\
     {\"situation\": string, \"complication\": string, \"implication\": string, \
     \"position\": string, \"ask\": string, \"benefit\": string}"
        .to_string()
}

pub fn build_scipab_prompt(input: &ScipabInput) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(&format!("## ACCOUNT\nCompany: {}\n", input.company.trim()));
    if let Some(industry) = &input.industry {
        prompt.push_str(&format!("Industry: {industry}\n"));
    }
    prompt.push('\n');

    if input.prospect_name.is_some() || input.prospect_title.is_some() {
        prompt.push_str(&format!(
            "## PROSPECT\nName: {}\nTitle: {}\n\n",
            input.prospect_name.as_deref().unwrap_or("unknown"),
            input.prospect_title.as_deref().unwrap_or("unknown"),
        ));
    }
    if !input.pain_points.is_empty() {
        prompt.push_str("## KNOWN PAIN POINTS\n");
        prompt.push_str(&format_list(&input.pain_points));
        prompt.push('\n');
    }
    if let Some(value) = &input.value_proposition {
        prompt.push_str(&format!("## OUR VALUE PROPOSITION\n{value}\n\n"));
    }
    prompt.push_str("## TASK\nWrite the SCIPAB for this prospect.");
    prompt
}

// ---------------------------------------------------------------------------
// Platform discovery
// ---------------------------------------------------------------------------

pub fn platform_system_prompt() -> String {
    let names = PLATFORMS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You identify which enterprise platforms a company runs.\n\
         \n\
         Only consider these platforms: {names}.\n\
         Confirm a platform only when a source says the company uses, implements or hires for it. \
         A vendor mentioned in passing is not evidence. Cite source URLs from the list only.\n\
         \n\
         Respond with JSON only:\n\
         {{\"platforms\": [{{\"name\": string, \"confidence\": number, \"evidence\": [string]}}]}}"
    )
}

pub fn build_platform_prompt(company: &str, evidence: &[Evidence], candidates: &[DetectedPlatform]) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(&format!("## COMPANY\n{company}\n\n"));

    prompt.push_str("## KEYWORD MATCHES\n");
    if candidates.is_empty() {
        prompt.push_str("None\n");
    }
    for c in candidates {
        prompt.push_str(&format!(
            "  {}: {} mentions in {} sources\n",
            c.name,
            c.mentions,
            c.evidence.len()
        ));
    }
    prompt.push('\n');

    prompt.push_str("## SOURCES\n");
    prompt.push_str(&format_sources(evidence));
    prompt.push_str("## TASK\nConfirm or reject each platform.");
    prompt
}

// ---------------------------------------------------------------------------
// Research insights
// ---------------------------------------------------------------------------

pub fn research_system_prompt() -> String {
    "You are a senior account researcher preparing an enterprise seller for a first meeting.\n\
     \n\
     Use only the numbered sources. Every insight cites the URL it came from, and the citations \
     list contains every URL you relied on. Never invent URLs, numbers or names.\n\
     Pain points and initiatives should relate to enterprise systems, software quality and release speed \
     where the sources allow. Talking points are questions or observations a seller could open with.\n\
     \n\
     Respond with JSON only:\n\
     {\"summary\": string, \"pain_points\": [string], \"initiatives\": [string], \
     \"talking_points\": [string], \"insights\": [{\"fact\": string, \"source_url\": string, \
     \"confidence\": number}], \"citations\": [{\"url\": string, \"title\": string}]}"
        .to_string()
}

pub fn build_research_prompt(
    company: &str,
    evidence: &[Evidence],
    context: Option<&str>,
    min_citations: usize,
) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(&format!("## COMPANY\n{company}\n\n"));

    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("## ADDITIONAL CONTEXT\n{context}\n\n"));
    }

    prompt.push_str("## SOURCES\n");
    prompt.push_str(&format_sources(evidence));
    prompt.push_str(&format!(
        "## TASK\nWrite the account brief. Cite at least {min_citations} different sources."
    ));
    prompt
}

// ---------------------------------------------------------------------------
// LinkedIn posts
// ---------------------------------------------------------------------------

pub fn linkedin_post_system_prompt() -> String {
    format!(
        "You write LinkedIn posts for enterprise sales professionals.\n\
         \n\
         Open with a one-line hook, share one practical insight, end with a question to the reader.\n\
         Short paragraphs, no emojis, no more than {MAX_POST_CHARS} characters.\n\
         Suggest up to {MAX_HASHTAGS} hashtags without spaces.\n\
         \n\
         Respond with JSON only:\n\
         {{\"body\": string, \"hashtags\": [string]}}"
    )
}

pub fn build_linkedin_post_prompt(input: &PostInput) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str(&format!("## TOPIC\n{}\n\n", input.topic.trim()));
    prompt.push_str(&format!(
        "## AUDIENCE\n{}\n\n## TONE\n{}\n\n",
        input.audience.as_deref().unwrap_or("enterprise technology leaders"),
        input.tone.as_str(),
    ));
    if !input.key_points.is_empty() {
        prompt.push_str("## KEY POINTS\n");
        prompt.push_str(&format_list(&input.key_points));
        prompt.push('\n');
    }
    if !input.include_hashtags {
        prompt.push_str("Return an empty hashtags list.\n\n");
    }
    prompt.push_str("## TASK\nWrite the post.");
    prompt
}

// ---------------------------------------------------------------------------
// Story score
// ---------------------------------------------------------------------------

pub fn story_score_system_prompt() -> String {
    "You grade sales emails on storytelling.\n\
     \n\
     Scores:\n\
     - emotional_pull (0-7): does the email make the reader feel the problem or the win?\n\
     - personalization (0-7): is it clearly written for this reader and company?\n\
     - clarity_cta (0-6): is there one clear, easy next step?\n\
     Give one or two sentences of feedback the writer can act on.\n\
     \n\
     Respond with JSON only:\n\
     {\"emotional_pull\": integer, \"personalization\": integer, \"clarity_cta\": integer, \
     \"feedback\": string}"
        .to_string()
}

pub fn build_story_score_prompt(subject: &str, body: &str) -> String {
    let mut prompt = String::with_capacity(body.len() + 128);
    prompt.push_str(&format!("## SUBJECT\n{}\n\n", subject.trim()));
    prompt.push_str(&format!("## BODY\n{}\n\n", body.trim()));
    prompt.push_str("## TASK\nScore this email.");
    prompt
}
