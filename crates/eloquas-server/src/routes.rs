// HTTP route table. Every route under /api except register, login and the
// LinkedIn callback requires an authenticated caller.

use std::collections::HashMap;
use std::convert::Infallible;

use serde::de::DeserializeOwned;
use serde_json::json;
use warp::hyper::body::Bytes;
use warp::{Filter, Rejection, Reply};

use eloquas_core::models::Role;

use crate::auth::{self, authenticated, require_role, with_ctx};
use crate::error::{handle_rejection, reject, ApiError};
use crate::handlers::{admin, content, outreach, prospects, research};
use crate::state::Ctx;

const JSON_LIMIT: u64 = 1024 * 1024;
const CSV_LIMIT: u64 = 5 * 1024 * 1024;

fn json_body<T: DeserializeOwned + Send + 'static>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(JSON_LIMIT).and(warp::body::json())
}

/// A JSON body that may be omitted entirely.
fn optional_json<T: DeserializeOwned + Default + Send + 'static>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(JSON_LIMIT)
        .and(warp::body::bytes())
        .and_then(|bytes: Bytes| async move {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(T::default());
            }
            serde_json::from_slice(&bytes)
                .map_err(|e| reject(ApiError::BadRequest(format!("invalid request body: {e}"))))
        })
}

pub fn routes(ctx: Ctx) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    health
        .or(auth_routes(ctx.clone()))
        .or(prospect_routes(ctx.clone()))
        .or(content_routes(ctx.clone()))
        .or(research_routes(ctx.clone()))
        .or(outreach_routes(ctx.clone()))
        .or(admin_routes(ctx))
        .with(warp::trace::request())
        .recover(handle_rejection)
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

fn auth_routes(ctx: Ctx) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let register = warp::path!("api" / "auth" / "register")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(json_body())
        .and_then(auth::register);
    let login = warp::path!("api" / "auth" / "login")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(json_body())
        .and_then(auth::login);
    let logout = warp::path!("api" / "auth" / "logout")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(auth::logout);
    let me = warp::path!("api" / "auth" / "me")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(auth::me);
    let phone = warp::path!("api" / "auth" / "phone")
        .and(warp::put())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(auth::set_phone);
    let linkedin_start = warp::path!("api" / "auth" / "linkedin")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(auth::linkedin_start);
    let linkedin_callback = warp::path!("api" / "auth" / "linkedin" / "callback")
        .and(warp::get())
        .and(with_ctx(ctx))
        .and(warp::query::<HashMap<String, String>>())
        .and_then(auth::linkedin_callback);

    register
        .or(login)
        .or(logout)
        .or(me)
        .or(phone)
        .or(linkedin_start)
        .or(linkedin_callback)
}

fn prospect_routes(ctx: Ctx) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "prospects")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(prospects::list);
    let create = warp::path!("api" / "prospects")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(prospects::create);
    let upload = warp::path!("api" / "prospects" / "upload")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(warp::body::content_length_limit(CSV_LIMIT))
        .and(warp::body::bytes())
        .and_then(prospects::upload);
    let get = warp::path!("api" / "prospects" / String)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(prospects::get);
    let delete = warp::path!("api" / "prospects" / String)
        .and(warp::delete())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(prospects::delete);
    let trustscore = warp::path!("api" / "prospects" / String / "trustscore")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(prospects::trustscore);

    let accounts = warp::path!("api" / "accounts")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(prospects::list_accounts);
    let create_account = warp::path!("api" / "accounts")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(prospects::create_account);
    let account = warp::path!("api" / "accounts" / String)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(prospects::get_account);
    let contacts = warp::path!("api" / "accounts" / String / "contacts")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(prospects::list_contacts);
    let add_contact = warp::path!("api" / "accounts" / String / "contacts")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx))
        .and(json_body())
        .and_then(prospects::add_contact);

    list.or(create)
        .or(upload)
        .or(get)
        .or(delete)
        .or(trustscore)
        .or(accounts)
        .or(create_account)
        .or(account)
        .or(contacts)
        .or(add_contact)
}

fn content_routes(ctx: Ctx) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "content")
        .and(warp::get())
        .and(warp::query::<content::LimitQuery>())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(content::list);
    let email = warp::path!("api" / "content" / "email")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(content::compose_email);
    let post = warp::path!("api" / "content" / "linkedin-post")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(content::linkedin_post);
    let scipab = warp::path!("api" / "content" / "scipab")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(content::scipab);
    let cadences = warp::path!("api" / "cadences")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(content::list_cadences);
    let create_cadence = warp::path!("api" / "cadences")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(content::create_cadence);
    let calls = warp::path!("api" / "calls")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(content::list_calls);
    let assess = warp::path!("api" / "calls" / "assess")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(content::assess_call);
    let story = warp::path!("api" / "storyscore")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(content::story_score);
    let spam = warp::path!("api" / "spamscore")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx))
        .and(json_body())
        .and_then(content::spam_check);

    list.or(email)
        .or(post)
        .or(scipab)
        .or(cadences)
        .or(create_cadence)
        .or(calls)
        .or(assess)
        .or(story)
        .or(spam)
}

fn research_routes(ctx: Ctx) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let intent = warp::path!("api" / "research" / "intent")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(research::intent);
    let platforms = warp::path!("api" / "research" / "platforms")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(research::platforms);
    let insights = warp::path!("api" / "research" / "insights")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(research::insights);
    let hybrid = warp::path!("api" / "research" / "hybrid")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(research::hybrid);
    let sessions = warp::path!("api" / "research" / "sessions")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(research::sessions);
    let facts = warp::path!("api" / "research" / "facts")
        .and(warp::get())
        .and(warp::query::<research::CompanyQuery>())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(research::facts);
    let people = warp::path!("api" / "people" / "search")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx))
        .and(json_body())
        .and_then(research::people_search);

    intent
        .or(platforms)
        .or(insights)
        .or(hybrid)
        .or(sessions)
        .or(facts)
        .or(people)
}

fn outreach_routes(ctx: Ctx) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let send = warp::path!("api" / "emails" / "send")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and(json_body())
        .and_then(outreach::send);
    let queue = warp::path!("api" / "emails" / "queue")
        .and(warp::get())
        .and(warp::query::<content::LimitQuery>())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(outreach::queue);
    let signals = warp::path!("api" / "signals")
        .and(warp::get())
        .and(warp::query::<content::LimitQuery>())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx.clone()))
        .and_then(outreach::signals);
    let company = warp::path!("api" / "signals" / "company" / String)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(authenticated(ctx))
        .and_then(outreach::company_signals);

    send.or(queue).or(signals).or(company)
}

fn admin_routes(ctx: Ctx) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let users = warp::path!("api" / "admin" / "users")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(require_role(ctx.clone(), Role::Admin))
        .and_then(admin::users);
    let signals = warp::path!("api" / "admin" / "signals")
        .and(warp::get())
        .and(warp::query::<content::LimitQuery>())
        .and(with_ctx(ctx.clone()))
        .and(require_role(ctx.clone(), Role::Admin))
        .and_then(admin::signals);
    let scan = warp::path!("api" / "admin" / "signals" / "scan")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(require_role(ctx.clone(), Role::Admin))
        .and(optional_json())
        .and_then(admin::scan_signals);
    let process = warp::path!("api" / "admin" / "emails" / "process")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(require_role(ctx.clone(), Role::Admin))
        .and_then(admin::process_emails);
    let digest = warp::path!("api" / "admin" / "sms" / "digest")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(require_role(ctx, Role::Admin))
        .and_then(admin::sms_digest);

    users.or(signals).or(scan).or(process).or(digest)
}
