// Prospects (including CSV upload and TrustScore), accounts and contacts.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Rejection, Reply};

use eloquas_core::models::{NewAccount, NewContact, NewProspect, Prospect};
use eloquas_sales::scoring::{trust_score, TrustInputs};

use crate::auth::AuthUser;
use crate::error::{reject, ApiError};
use crate::state::Ctx;

fn required(value: &str, field: &str) -> Result<(), Rejection> {
    if value.trim().is_empty() {
        return Err(reject(ApiError::BadRequest(format!("{field} is required"))));
    }
    Ok(())
}

pub(crate) fn load_prospect(ctx: &Ctx, user_id: &str, prospect_id: &str) -> Result<Prospect, Rejection> {
    ctx.db
        .prospect_for_user(user_id, prospect_id)
        .map_err(reject)?
        .ok_or_else(|| reject(ApiError::not_found("prospect")))
}

// ---------------------------------------------------------------------------
// Prospects
// ---------------------------------------------------------------------------

pub async fn list(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let prospects = ctx.db.list_prospects(&auth.user.id).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "prospects": prospects })))
}

pub async fn create(ctx: Ctx, auth: AuthUser, body: NewProspect) -> Result<impl Reply, Rejection> {
    required(&body.name, "name")?;
    required(&body.email, "email")?;
    required(&body.company, "company")?;
    let upserted = ctx.db.add_prospect(&auth.user.id, &body).map_err(reject)?;
    let created = upserted.was_inserted();
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "prospect": upserted.into_inner(), "created": created })),
        status,
    ))
}

pub async fn get(id: String, ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let prospect = load_prospect(&ctx, &auth.user.id, &id)?;
    Ok(warp::reply::json(&prospect))
}

pub async fn delete(id: String, ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    ctx.db.delete_prospect(&auth.user.id, &id).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "deleted": id })))
}

#[derive(Debug, Default, Serialize)]
pub struct UploadSummary {
    pub added: usize,
    pub duplicates: usize,
    pub errors: Vec<String>,
}

/// Parse a CSV with a header row. Recognised columns: name, email, title,
/// company, domain, linkedin_url. Rows missing name, email or company are
/// reported and skipped.
pub fn parse_prospect_csv(data: &[u8]) -> Result<(Vec<NewProspect>, Vec<String>), ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ApiError::BadRequest(format!("invalid CSV header: {e}")))?
        .iter()
        .map(|h| h.to_lowercase().replace(' ', "_"))
        .collect();
    for column in ["name", "email", "company"] {
        if !headers.iter().any(|h| h == column) {
            return Err(ApiError::BadRequest(format!("CSV is missing the {column} column")));
        }
    }

    let mut prospects = Vec::new();
    let mut errors = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let line = i + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("row {line}: {e}"));
                continue;
            }
        };
        let row: HashMap<&str, &str> = headers
            .iter()
            .map(String::as_str)
            .zip(record.iter())
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let field = |name: &str| row.get(name).map(|v| v.to_string());
        match (field("name"), field("email"), field("company")) {
            (Some(name), Some(email), Some(company)) => prospects.push(NewProspect {
                name,
                email,
                title: field("title"),
                company,
                domain: field("domain"),
                linkedin_url: field("linkedin_url"),
            }),
            _ => errors.push(format!("row {line}: name, email and company are required")),
        }
    }
    Ok((prospects, errors))
}

pub async fn upload(ctx: Ctx, auth: AuthUser, body: Bytes) -> Result<impl Reply, Rejection> {
    let (rows, errors) = parse_prospect_csv(&body).map_err(reject)?;
    let mut summary = UploadSummary {
        errors,
        ..Default::default()
    };
    for row in &rows {
        if ctx.db.add_prospect(&auth.user.id, row).map_err(reject)?.was_inserted() {
            summary.added += 1;
        } else {
            summary.duplicates += 1;
        }
    }
    info!(
        user = %auth.user.email,
        added = summary.added,
        duplicates = summary.duplicates,
        errors = summary.errors.len(),
        "prospect CSV imported"
    );
    Ok(warp::reply::json(&summary))
}

pub async fn trustscore(id: String, ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let prospect = load_prospect(&ctx, &auth.user.id, &id)?;
    let signal = ctx
        .db
        .company_signals(&prospect.company, 1)
        .map_err(reject)?
        .into_iter()
        .next();
    let rep_profile = ctx.db.linkedin_profile(&auth.user.id).map_err(reject)?;
    let emails_sent = ctx.db.sent_count_for_prospect(&prospect.id).map_err(reject)?;

    let score = trust_score(&TrustInputs {
        prospect: &prospect,
        signal: signal.as_ref(),
        rep_profile: rep_profile.as_ref(),
        emails_sent,
        now: Utc::now(),
    });
    Ok(warp::reply::json(&json!({
        "prospect_id": prospect.id,
        "trust_score": score,
        "signal": signal,
    })))
}

// ---------------------------------------------------------------------------
// Accounts and contacts
// ---------------------------------------------------------------------------

pub async fn list_accounts(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let accounts = ctx.db.list_accounts(&auth.user.id).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "accounts": accounts })))
}

pub async fn create_account(ctx: Ctx, auth: AuthUser, body: NewAccount) -> Result<impl Reply, Rejection> {
    required(&body.name, "name")?;
    let upserted = ctx.db.upsert_account(&auth.user.id, &body).map_err(reject)?;
    let created = upserted.was_inserted();
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "account": upserted.into_inner(), "created": created })),
        status,
    ))
}

fn owned_account(ctx: &Ctx, user_id: &str, account_id: &str) -> Result<eloquas_core::models::Account, Rejection> {
    ctx.db
        .account_for_user(user_id, account_id)
        .map_err(reject)?
        .ok_or_else(|| reject(ApiError::not_found("account")))
}

pub async fn get_account(id: String, ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let account = owned_account(&ctx, &auth.user.id, &id)?;
    let contacts = ctx.db.list_contacts(&account.id).map_err(reject)?;
    let research = ctx
        .db
        .list_account_research(&auth.user.id, Some(&account.name))
        .map_err(reject)?;
    Ok(warp::reply::json(&json!({
        "account": account,
        "contacts": contacts,
        "research": research,
    })))
}

pub async fn list_contacts(id: String, ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let account = owned_account(&ctx, &auth.user.id, &id)?;
    let contacts = ctx.db.list_contacts(&account.id).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "contacts": contacts })))
}

pub async fn add_contact(id: String, ctx: Ctx, auth: AuthUser, body: NewContact) -> Result<impl Reply, Rejection> {
    required(&body.name, "name")?;
    let account = owned_account(&ctx, &auth.user.id, &id)?;
    let upserted = ctx.db.add_contact(&account.id, &body).map_err(reject)?;
    let created = upserted.was_inserted();
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "contact": upserted.into_inner(), "created": created })),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_are_validated() {
        let data = b"Name,Email,Title,Company\n\
                     Pat Doe,pat@acme.com,QA Lead,Acme\n\
                     ,missing@acme.com,,Acme\n\
                     Sam Roe,sam@globex.com,,Globex\n";
        let (rows, errors) = parse_prospect_csv(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title.as_deref(), Some("QA Lead"));
        assert_eq!(rows[1].title, None);
        assert_eq!(errors, vec!["row 3: name, email and company are required".to_string()]);
    }

    #[test]
    fn csv_without_required_column_is_rejected() {
        let err = parse_prospect_csv(b"name,email\nPat,pat@acme.com\n").unwrap_err();
        assert_eq!(err.to_string(), "CSV is missing the company column");
    }
}
