// Request authentication: Bearer JWT or session cookie, plus the
// register/login/logout/me and LinkedIn OAuth handlers.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use warp::http::header::{LOCATION, SET_COOKIE};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use eloquas_core::auth::{bearer_token, hash_password, new_session_id, verify_password, Claims};
use eloquas_core::models::{NewUser, Role, User};
use eloquas_sales::integrations::linkedin::LinkedinOAuth;

use crate::error::{reject, ApiError};
use crate::state::Ctx;

const MIN_PASSWORD_CHARS: usize = 8;

/// The caller behind an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session_id: String,
}

pub fn with_ctx(ctx: Ctx) -> impl Filter<Extract = (Ctx,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value.trim())
    })
}

/// Resolve the caller from `Authorization: Bearer` first, then the session
/// cookie. The JWT is only honoured while its session row is alive.
pub fn authenticate(ctx: &Ctx, authorization: Option<&str>, cookie: Option<&str>) -> Result<AuthUser, ApiError> {
    let now = Utc::now();
    if let Some(token) = authorization.and_then(bearer_token) {
        let claims = ctx.jwt.verify(token)?;
        let user = ctx
            .db
            .session_user(&claims.sid, now)?
            .filter(|u| u.id == claims.sub)
            .ok_or_else(|| ApiError::Unauthorized("session has ended".to_string()))?;
        return Ok(AuthUser {
            user,
            session_id: claims.sid,
        });
    }
    if let Some(session_id) = cookie.and_then(|c| cookie_value(c, &ctx.config.auth.cookie_name)) {
        let user = ctx
            .db
            .session_user(session_id, now)?
            .ok_or_else(|| ApiError::Unauthorized("session has ended".to_string()))?;
        return Ok(AuthUser {
            user,
            session_id: session_id.to_string(),
        });
    }
    Err(ApiError::Unauthorized("authentication required".to_string()))
}

pub fn authenticated(ctx: Ctx) -> impl Filter<Extract = (AuthUser,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::header::optional::<String>("cookie"))
        .and(with_ctx(ctx))
        .and_then(|authorization: Option<String>, cookie: Option<String>, ctx: Ctx| async move {
            authenticate(&ctx, authorization.as_deref(), cookie.as_deref()).map_err(reject)
        })
}

pub fn require_role(ctx: Ctx, role: Role) -> impl Filter<Extract = (AuthUser,), Error = Rejection> + Clone {
    authenticated(ctx).and_then(move |auth: AuthUser| async move {
        if auth.user.role.permits(role) {
            Ok(auth)
        } else {
            Err(reject(ApiError::Forbidden(format!("{} role required", role.as_str()))))
        }
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse<'a> {
    token: String,
    expires_at: String,
    user: &'a User,
}

pub async fn register(ctx: Ctx, body: RegisterRequest) -> Result<impl Reply, Rejection> {
    let email = body.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(reject(ApiError::BadRequest("a valid email is required".to_string())));
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(reject(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        ))));
    }
    // Only an existing admin may hand out the admin role.
    let role = match body.role {
        Some(Role::Admin) => Role::Bdr,
        Some(role) => role,
        None => Role::default(),
    };
    let password_hash = hash_password(&body.password).map_err(reject)?;
    let user = ctx
        .db
        .create_user(&NewUser {
            email,
            password_hash,
            role,
            company: body.company,
            full_name: body.full_name,
        })
        .map_err(reject)?;
    info!(user = %user.email, role = role.as_str(), "user registered");
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "user": user })),
        StatusCode::CREATED,
    ))
}

pub async fn login(ctx: Ctx, body: LoginRequest) -> Result<impl Reply, Rejection> {
    let invalid = || reject(ApiError::Unauthorized("invalid email or password".to_string()));
    let email = body.email.trim().to_lowercase();
    let user = ctx.db.user_by_email(&email).map_err(reject)?.ok_or_else(invalid)?;
    if !user.is_active || !verify_password(&body.password, &user.password_hash) {
        warn!(user = %user.email, "failed login");
        return Err(invalid());
    }

    let now = Utc::now();
    let session_id = new_session_id();
    let session_ttl = Duration::hours(ctx.config.auth.session_ttl_hours);
    let jwt_ttl = Duration::hours(ctx.config.auth.jwt_ttl_hours);
    ctx.db
        .create_session(&session_id, &user.id, now, now + session_ttl)
        .map_err(reject)?;
    ctx.db.touch_last_login(&user.id, now).map_err(reject)?;

    let claims = Claims::new(&user.id, &user.email, user.role, &session_id, now, jwt_ttl);
    let token = ctx.jwt.sign(&claims).map_err(reject)?;
    info!(user = %user.email, "user logged in");

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ctx.config.auth.cookie_name,
        session_id,
        session_ttl.num_seconds()
    );
    let body = TokenResponse {
        token,
        expires_at: (now + jwt_ttl).to_rfc3339(),
        user: &user,
    };
    Ok(warp::reply::with_header(warp::reply::json(&body), SET_COOKIE, cookie))
}

pub async fn logout(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    ctx.db.delete_session(&auth.session_id).map_err(reject)?;
    info!(user = %auth.user.email, "user logged out");
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        ctx.config.auth.cookie_name
    );
    Ok(warp::reply::with_header(
        warp::reply::json(&json!({ "logged_out": true })),
        SET_COOKIE,
        cookie,
    ))
}

pub async fn me(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let linkedin = ctx.db.linkedin_profile(&auth.user.id).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "user": auth.user, "linkedin": linkedin })))
}

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    #[serde(default)]
    pub phone: Option<String>,
}

/// Set or clear the number the daily signal digest goes to.
pub async fn set_phone(ctx: Ctx, auth: AuthUser, body: PhoneRequest) -> Result<impl Reply, Rejection> {
    let phone = body.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
    if let Some(p) = phone {
        let digits = p.chars().filter(char::is_ascii_digit).count();
        if !p.starts_with('+') || digits < 8 {
            return Err(reject(ApiError::BadRequest(
                "phone must be in international format, e.g. +15550102000".to_string(),
            )));
        }
    }
    ctx.db.set_user_phone(&auth.user.id, phone).map_err(reject)?;
    Ok(warp::reply::json(&json!({ "phone": phone })))
}

fn linkedin_client(ctx: &Ctx) -> Result<&LinkedinOAuth, Rejection> {
    ctx.linkedin
        .as_ref()
        .ok_or_else(|| reject(ApiError::Unprocessable("LinkedIn is not configured".to_string())))
}

/// Start the OAuth flow: remember a state token for this user and return the
/// authorization URL.
pub async fn linkedin_start(ctx: Ctx, auth: AuthUser) -> Result<impl Reply, Rejection> {
    let client = linkedin_client(&ctx)?;
    let state = LinkedinOAuth::new_state();
    let url = client.authorization_url(&state).map_err(reject)?;
    ctx.oauth_states.insert(state, auth.user.id);
    Ok(warp::reply::json(&json!({ "authorization_url": url })))
}

pub async fn linkedin_callback(ctx: Ctx, query: HashMap<String, String>) -> Result<impl Reply, Rejection> {
    if let Some(error) = query.get("error") {
        return Err(reject(ApiError::BadRequest(format!("LinkedIn authorization failed: {error}"))));
    }
    let (Some(code), Some(state)) = (query.get("code"), query.get("state")) else {
        return Err(reject(ApiError::BadRequest("code and state are required".to_string())));
    };
    let user_id = ctx
        .oauth_states
        .take(state)
        .ok_or_else(|| reject(ApiError::BadRequest("unknown or expired state".to_string())))?;
    let client = linkedin_client(&ctx)?;

    let access_token = client.exchange_code(code).await.map_err(reject)?;
    let profile = client
        .fetch_profile(&user_id, &access_token, Utc::now())
        .await
        .map_err(reject)?;
    ctx.db.save_linkedin_profile(&profile).map_err(reject)?;
    info!(user = %user_id, linkedin = %profile.linkedin_id, "LinkedIn profile connected");

    Ok(warp::reply::with_status(
        warp::reply::with_header(warp::reply(), LOCATION, "/?linkedin=connected"),
        StatusCode::FOUND,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_by_name() {
        let header = "theme=dark; session_id=abc123 ; other=1";
        assert_eq!(cookie_value(header, "session_id"), Some("abc123"));
        assert_eq!(cookie_value(header, "missing"), None);
        assert_eq!(cookie_value("session_id_old=x", "session_id"), None);
    }
}
