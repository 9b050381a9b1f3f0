// Email queue and job signals as seen by a rep.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use eloquas_sales::queue::queue_email;
use eloquas_sales::signals::user_signals;

use super::content::LimitQuery;
use crate::auth::AuthUser;
use crate::error::{reject, ApiError};
use crate::state::Ctx;

const QUEUE_LIST_LIMIT: usize = 100;
const SIGNAL_LIST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SendBody {
    pub prospect_id: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub story_score: Option<f64>,
}

pub async fn send(ctx: Ctx, auth: AuthUser, body: SendBody) -> Result<impl Reply, Rejection> {
    if body.subject.trim().is_empty() || body.body.trim().is_empty() {
        return Err(reject(ApiError::BadRequest("subject and body are required".to_string())));
    }
    let mut rng = StdRng::from_entropy();
    let email = queue_email(
        &ctx.db,
        &ctx.config.queue,
        &auth.user.id,
        &body.prospect_id,
        &body.subject,
        &body.body,
        body.story_score,
        Utc::now(),
        &mut rng,
    )
    .map_err(reject)?;
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "email": email })),
        StatusCode::ACCEPTED,
    ))
}

pub async fn queue(query: LimitQuery, ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now);
    let limit = query.limit.unwrap_or(QUEUE_LIST_LIMIT).clamp(1, 500);
    let emails = ctx.db.list_queue(&auth.user.id, limit).map_err(reject)?;
    let status = ctx.db.queue_status(&auth.user.id, day_start).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "emails": emails, "status": status })))
}

pub async fn signals(query: LimitQuery, ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let limit = query.limit.unwrap_or(SIGNAL_LIST_LIMIT).clamp(1, 500);
    let signals = user_signals(&ctx.db, &auth.user.id, limit).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "signals": signals })))
}

pub async fn company_signals(company: String, ctx: Ctx, _auth: AuthUser) -> Result<impl Reply, Rejection> {
    let company = decode_path(&company);
    let signals = ctx.db.company_signals(&company, SIGNAL_LIST_LIMIT).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "company": company, "signals": signals })))
}

/// Undo percent-encoding in a path segment ("Acme%20Bank" → "Acme Bank").
fn decode_path(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_are_decoded() {
        assert_eq!(decode_path("Acme%20Bank"), "Acme Bank");
        assert_eq!(decode_path("AT%26T"), "AT&T");
        assert_eq!(decode_path("100%"), "100%");
        assert_eq!(decode_path("plain"), "plain");
    }
}
