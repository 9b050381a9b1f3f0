// Admin-only operations: user listing, signal scans, and manual runs of the
// email queue and SMS digest.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use warp::{Rejection, Reply};

use eloquas_sales::integrations::sms::send_daily_digests;
use eloquas_sales::queue::process_due;
use eloquas_sales::signals::SignalScanner;

use super::content::LimitQuery;
use crate::auth::AuthUser;
use crate::error::reject;
use crate::state::Ctx;

pub async fn users(ctx: Ctx, _auth: AuthUser) -> Result<impl Reply, Rejection> {
    let users = ctx.db.list_users().map_err(reject)?;
    Ok(warp::reply::json(&json!({ "users": users })))
}

pub async fn signals(query: LimitQuery, ctx: Ctx, _auth: AuthUser) -> Result<impl Reply, Rejection> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let signals = ctx.db.all_signals(limit).map_err(reject)?;
    let stats = ctx.db.signal_stats(Utc::now()).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "signals": signals, "stats": stats })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanBody {
    /// Scan just this company instead of every tracked one.
    #[serde(default)]
    pub company: Option<String>,
}

pub async fn scan_signals(ctx: Ctx, auth: AuthUser, body: ScanBody) -> Result<impl Reply, Rejection> {
    let scanner = SignalScanner::new(&ctx.db, ctx.search.as_ref(), &ctx.config.signals, ctx.config.search.max_results);
    let now = Utc::now();
    info!(admin = %auth.user.email, "signal scan requested");

    match body.company.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(company) => {
            let signals = scanner.scan_company(company, now).await.map_err(reject)?;
            let new_signals = ctx.db.store_signals(&signals).map_err(reject)?;
            Ok(warp::reply::json(&json!({
                "companies_scanned": 1,
                "signals_found": signals.len(),
                "new_signals": new_signals,
                "failed": Vec::<String>::new(),
            })))
        }
        None => {
            let summary = scanner.scan_all(now).await.map_err(reject)?;
            Ok(warp::reply::json(&summary))
        }
    }
}

pub async fn process_emails(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    info!(admin = %auth.user.email, "email queue run requested");
    let summary = process_due(&ctx.db, ctx.mailer.as_ref(), &ctx.config.queue, Utc::now())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&summary))
}

pub async fn sms_digest(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    info!(admin = %auth.user.email, "SMS digest requested");
    let summary = send_daily_digests(&ctx.db, ctx.sms.as_ref(), Utc::now())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&summary))
}
