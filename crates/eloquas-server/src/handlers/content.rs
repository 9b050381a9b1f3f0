// Generated material: composed emails, LinkedIn posts, SCIPAB, cadences,
// call assessments, and the StoryScore / spam checks.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use eloquas_core::models::{ContentKind, JobSignal, NewContent, Prospect};
use eloquas_sales::compose::trust_story::regenerate_step;
use eloquas_sales::compose::{compose, ComposeMode, ComposeRequest, ComposedEmail, Sender};
use eloquas_sales::engines::cadence::{CadenceInput, EmailCadenceEngine, Tone};
use eloquas_sales::engines::call_assessment::{CallAssessmentEngine, CallAssessmentInput};
use eloquas_sales::engines::linkedin_post::{LinkedinPostEngine, PostInput};
use eloquas_sales::engines::scipab::{ScipabEnhancementEngine, ScipabInput};
use eloquas_sales::scoring::{score_story, spam_score};

use super::prospects::load_prospect;
use crate::auth::AuthUser;
use crate::error::{reject, ApiError};
use crate::state::Ctx;

const CONTENT_LIST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list(query: LimitQuery, ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let limit = query.limit.unwrap_or(CONTENT_LIST_LIMIT).clamp(1, 500);
    let content = ctx.db.list_content(&auth.user.id, limit).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "content": content })))
}

/// The signal an email should reference: the requested one, or the newest
/// signal for the prospect's company.
fn pick_signal(ctx: &Ctx, prospect: &Prospect, signal_id: Option<&str>) -> Result<Option<JobSignal>, Rejection> {
    let signals = ctx.db.company_signals(&prospect.company, 20).map_err(reject)?;
    match signal_id {
        Some(id) => signals
            .into_iter()
            .find(|s| s.id == id)
            .map(Some)
            .ok_or_else(|| reject(ApiError::not_found("signal"))),
        None => Ok(signals.into_iter().next()),
    }
}

// ---------------------------------------------------------------------------
// Email composition
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ComposeBody {
    pub prospect_id: String,
    #[serde(default)]
    pub signal_id: Option<String>,
    #[serde(default)]
    pub mode: ComposeMode,
    #[serde(default)]
    pub include_optional_step: bool,
    /// Regenerate a single StoryBuild step (1-7) instead of composing.
    #[serde(default)]
    pub regenerate_step: Option<u8>,
}

pub async fn compose_email(ctx: Ctx, auth: AuthUser, body: ComposeBody) -> Result<impl Reply, Rejection> {
    let prospect = load_prospect(&ctx, &auth.user.id, &body.prospect_id)?;
    let signal = pick_signal(&ctx, &prospect, body.signal_id.as_deref())?;
    let rep_profile = ctx.db.linkedin_profile(&auth.user.id).map_err(reject)?;
    let sender = Sender::from_user(&auth.user);
    let request = ComposeRequest {
        prospect: &prospect,
        signal: signal.as_ref(),
        sender: &sender,
        rep_profile: rep_profile.as_ref(),
        include_optional_step: body.include_optional_step,
    };

    let emails: Vec<ComposedEmail> = match body.regenerate_step {
        Some(step) => vec![regenerate_step(&request, step).map_err(reject)?],
        None => {
            let mut rng = StdRng::from_entropy();
            compose(body.mode, &request, &mut rng)
        }
    };

    let kind = if emails.len() > 1 || body.regenerate_step.is_some() {
        ContentKind::SequenceStep
    } else {
        ContentKind::Email
    };
    let mut saved = Vec::with_capacity(emails.len());
    for email in &emails {
        let content = ctx
            .db
            .save_content(
                &auth.user.id,
                &NewContent {
                    prospect_id: Some(prospect.id.clone()),
                    kind,
                    subject: Some(email.subject.clone()),
                    body: email.body.clone(),
                    metadata: json!({
                        "step": email.step,
                        "step_name": email.step_name,
                        "template": email.template,
                        "trust_anchor_used": email.trust_anchor_used,
                        "signal_id": signal.as_ref().map(|s| s.id.as_str()),
                    }),
                    model: None,
                },
            )
            .map_err(reject)?;
        saved.push(content.id);
    }
    info!(user = %auth.user.email, prospect = %prospect.id, count = emails.len(), "emails composed");

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "emails": emails,
            "content_ids": saved,
            "signal": signal,
        })),
        StatusCode::CREATED,
    ))
}

// ---------------------------------------------------------------------------
// LinkedIn posts and SCIPAB
// ---------------------------------------------------------------------------

pub async fn linkedin_post(ctx: Ctx, auth: AuthUser, body: PostInput) -> Result<impl Reply, Rejection> {
    let generated = LinkedinPostEngine::new(ctx.llm.as_ref())
        .generate(&body)
        .await
        .map_err(reject)?;
    let content = ctx
        .db
        .save_content(
            &auth.user.id,
            &NewContent {
                prospect_id: None,
                kind: ContentKind::LinkedinPost,
                subject: Some(body.topic.clone()),
                body: generated.value.text(),
                metadata: json!({ "hashtags": generated.value.hashtags, "fallback": generated.used_fallback }),
                model: generated.model.clone(),
            },
        )
        .map_err(reject)?;
    Ok(warp::reply::json(&json!({ "post": generated, "content_id": content.id })))
}

#[derive(Debug, Deserialize)]
pub struct ScipabBody {
    #[serde(default)]
    pub prospect_id: Option<String>,
    #[serde(flatten)]
    pub input: ScipabInput,
}

pub async fn scipab(ctx: Ctx, auth: AuthUser, body: ScipabBody) -> Result<impl Reply, Rejection> {
    let mut input = body.input;
    if let Some(id) = body.prospect_id.as_deref() {
        let prospect = load_prospect(&ctx, &auth.user.id, id)?;
        if input.company.trim().is_empty() {
            input.company = prospect.company;
        }
        input.prospect_name.get_or_insert(prospect.name);
        if input.prospect_title.is_none() {
            input.prospect_title = prospect.title;
        }
    }
    let generated = ScipabEnhancementEngine::new(ctx.llm.as_ref())
        .enhance(&input)
        .await
        .map_err(reject)?;
    let payload = serde_json::to_value(&generated.value).map_err(|e| reject(anyhow::Error::from(e)))?;
    let content = ctx
        .db
        .save_content(
            &auth.user.id,
            &NewContent {
                prospect_id: body.prospect_id,
                kind: ContentKind::Scipab,
                subject: Some(input.company.clone()),
                body: generated.value.situation.clone(),
                metadata: payload,
                model: generated.model.clone(),
            },
        )
        .map_err(reject)?;
    Ok(warp::reply::json(&json!({ "scipab": generated, "content_id": content.id })))
}

// ---------------------------------------------------------------------------
// Cadences
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CadenceBody {
    pub prospect_id: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub value_proposition: Option<String>,
}

pub async fn list_cadences(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let cadences = ctx.db.list_cadences(&auth.user.id).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "cadences": cadences })))
}

pub async fn create_cadence(ctx: Ctx, auth: AuthUser, body: CadenceBody) -> Result<impl Reply, Rejection> {
    let prospect = load_prospect(&ctx, &auth.user.id, &body.prospect_id)?;
    let signal = pick_signal(&ctx, &prospect, None)?;
    let input = CadenceInput {
        prospect,
        signal,
        tone: body.tone,
        value_proposition: body.value_proposition,
        sender_name: auth.user.full_name.clone(),
    };
    let generated = EmailCadenceEngine::new(ctx.llm.as_ref()).generate(&input).await;
    let saved = ctx
        .db
        .save_cadence(
            &auth.user.id,
            Some(&input.prospect.id),
            &generated.value.name,
            &generated.value.steps,
            generated.model.as_deref(),
        )
        .map_err(reject)?;
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "cadence": saved, "fallback": generated.used_fallback })),
        StatusCode::CREATED,
    ))
}

// ---------------------------------------------------------------------------
// Call assessments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AssessBody {
    #[serde(default)]
    pub prospect_id: Option<String>,
    #[serde(flatten)]
    pub input: CallAssessmentInput,
}

pub async fn list_calls(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let calls = ctx.db.list_call_assessments(&auth.user.id).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "assessments": calls })))
}

pub async fn assess_call(ctx: Ctx, auth: AuthUser, body: AssessBody) -> Result<impl Reply, Rejection> {
    if let Some(id) = body.prospect_id.as_deref() {
        load_prospect(&ctx, &auth.user.id, id)?;
    }
    let generated = CallAssessmentEngine::new(ctx.llm.as_ref())
        .assess(&body.input)
        .await
        .map_err(reject)?;
    let payload = serde_json::to_value(&generated.value).map_err(|e| reject(anyhow::Error::from(e)))?;
    let record = ctx
        .db
        .save_call_assessment(
            &auth.user.id,
            body.prospect_id.as_deref(),
            &body.input.transcript,
            generated.value.overall_score,
            &payload,
            generated.model.as_deref(),
        )
        .map_err(reject)?;
    Ok(warp::reply::json(&json!({
        "assessment": generated,
        "record_id": record.id,
    })))
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EmailText {
    #[serde(default)]
    pub subject: String,
    pub body: String,
}

pub async fn story_score(ctx: Ctx, _auth: AuthUser, body: EmailText) -> Result<impl Reply, Rejection> {
    if body.body.trim().is_empty() {
        return Err(reject(ApiError::BadRequest("body is required".to_string())));
    }
    let scored = score_story(ctx.llm.as_ref(), &body.subject, &body.body).await;
    Ok(warp::reply::json(&scored))
}

pub async fn spam_check(ctx: Ctx, _auth: AuthUser, body: EmailText) -> Result<impl Reply, Rejection> {
    let report = spam_score(&body.subject, &body.body);
    let threshold = ctx.config.queue.spam_threshold;
    Ok(warp::reply::json(&json!({
        "score": report.score,
        "reasons": report.reasons,
        "threshold": threshold,
        "passes": !report.exceeds(threshold),
    })))
}
