// Account research: intent, platforms, cited insights, hybrid sessions,
// company facts and the people search.

use serde::Deserialize;
use serde_json::json;
use tracing::info;
use warp::{Rejection, Reply};

use eloquas_sales::engines::hybrid::{HybridRequest, HybridResearchEngine};
use eloquas_sales::engines::intent::IntentDiscoveryEngine;
use eloquas_sales::engines::platform::PlatformDiscoveryEngine;
use eloquas_sales::engines::research::{persist, ResearchInsightsEngine};
use eloquas_sales::integrations::pdl::PeopleQuery;
use eloquas_sales::IntegrationError;

use crate::auth::AuthUser;
use crate::error::{reject, ApiError};
use crate::state::Ctx;

#[derive(Debug, Deserialize)]
pub struct CompanyBody {
    pub company: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl CompanyBody {
    fn company(&self) -> Result<&str, Rejection> {
        let company = self.company.trim();
        if company.is_empty() {
            return Err(reject(ApiError::BadRequest("company is required".to_string())));
        }
        Ok(company)
    }
}

#[derive(Debug, Deserialize)]
pub struct CompanyQuery {
    pub company: String,
}

pub async fn intent(ctx: Ctx, _auth: AuthUser, body: CompanyBody) -> Result<impl Reply, Rejection> {
    let company = body.company()?;
    let report = IntentDiscoveryEngine::new(ctx.llm.as_ref(), ctx.search.as_ref(), ctx.config.search.max_results)
        .discover(company)
        .await;
    Ok(warp::reply::json(&report))
}

pub async fn platforms(ctx: Ctx, _auth: AuthUser, body: CompanyBody) -> Result<impl Reply, Rejection> {
    let company = body.company()?;
    let report = PlatformDiscoveryEngine::new(
        ctx.llm.as_ref(),
        ctx.search.as_ref(),
        &ctx.platform_cache,
        ctx.config.search.max_results,
    )
    .discover(company)
    .await;
    Ok(warp::reply::json(&report))
}

pub async fn insights(ctx: Ctx, auth: AuthUser, body: CompanyBody) -> Result<impl Reply, Rejection> {
    let company = body.company()?;
    let account_id = match body.account_id.as_deref() {
        Some(id) => Some(
            ctx.db
                .account_for_user(&auth.user.id, id)
                .map_err(reject)?
                .ok_or_else(|| reject(ApiError::not_found("account")))?
                .id,
        ),
        None => ctx.db.account_by_name(&auth.user.id, company).map_err(reject)?.map(|a| a.id),
    };

    let report = ResearchInsightsEngine::new(
        ctx.llm.as_ref(),
        ctx.search.as_ref(),
        ctx.config.research.min_citations,
        ctx.config.search.max_results,
    )
    .with_research_model(ctx.config.llm.research_model.clone())
    .research(company)
    .await
    .map_err(reject)?;

    let saved = persist(&ctx.db, &auth.user.id, account_id.as_deref(), &report, None).map_err(reject)?;
    info!(user = %auth.user.email, company, citations = report.value.citations.len(), "research saved");
    Ok(warp::reply::json(&json!({ "report": report, "research_id": saved.id })))
}

pub async fn hybrid(ctx: Ctx, auth: AuthUser, body: HybridRequest) -> Result<impl Reply, Rejection> {
    if body.company.trim().is_empty() {
        return Err(reject(ApiError::BadRequest("company is required".to_string())));
    }
    let report = HybridResearchEngine::new(
        ctx.llm.as_ref(),
        ctx.search.as_ref(),
        &ctx.db,
        ctx.config.research.min_citations,
        ctx.config.search.max_results,
    )
    .with_drive(ctx.drive.as_deref())
    .with_people(ctx.people.as_deref())
    .with_research_model(ctx.config.llm.research_model.clone())
    .run(&auth.user.id, &body)
    .await
    .map_err(reject)?;
    Ok(warp::reply::json(&report))
}

pub async fn sessions(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let sessions = ctx.db.list_research_sessions(&auth.user.id).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "sessions": sessions })))
}

pub async fn facts(query: CompanyQuery, ctx: Ctx, _auth: AuthUser) -> Result<impl Reply, Rejection> {
    let facts = ctx.db.company_facts(query.company.trim()).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "company": query.company, "facts": facts })))
}

pub async fn people_search(ctx: Ctx, _auth: AuthUser, query: PeopleQuery) -> Result<impl Reply, Rejection> {
    if query.company.trim().is_empty() {
        return Err(reject(ApiError::BadRequest("company is required".to_string())));
    }
    let people = ctx
        .people
        .as_ref()
        .ok_or_else(|| reject(IntegrationError::NotConfigured("People Data Labs")))?;
    let records = people.find_people(&query).await.map_err(reject)?;
    Ok(warp::reply::json(&json!({ "people": records })))
}
