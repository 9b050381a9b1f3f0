// API errors and the rejection handler that turns them into JSON responses.

use std::convert::Infallible;

use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::{Rejection, Reply};

use eloquas_core::auth::AuthError;
use eloquas_core::db::StoreError;
use eloquas_sales::compose::ComposeError;
use eloquas_sales::queue::QueueError;
use eloquas_sales::{EngineError, IntegrationError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Upstream(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl Reject for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound(format!("{entity} not found"))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::EmailTaken(email)) => ApiError::Conflict(format!("email already registered: {email}")),
            Some(StoreError::NotFound { entity, .. }) => ApiError::not_found(entity),
            None => ApiError::Internal(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired | AuthError::InvalidToken(_) => ApiError::Unauthorized(err.to_string()),
            AuthError::Hash(_) | AuthError::Signing(_) => ApiError::Internal(err.into()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::BadRequest(msg),
            EngineError::InsufficientEvidence(_) => ApiError::Unprocessable(err.to_string()),
            EngineError::Llm(_) | EngineError::Parse(_) => ApiError::Upstream(err.to_string()),
            EngineError::Store(inner) => inner.into(),
        }
    }
}

impl From<IntegrationError> for ApiError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::NotConfigured(_) => ApiError::Unprocessable(err.to_string()),
            _ => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Spam { .. } => ApiError::Unprocessable(err.to_string()),
            QueueError::ProspectNotFound(_) => ApiError::not_found("prospect"),
            QueueError::Store(inner) => inner.into(),
        }
    }
}

impl From<ComposeError> for ApiError {
    fn from(err: ComposeError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Convert a handler error into a warp rejection.
pub fn reject(err: impl Into<ApiError>) -> Rejection {
    warp::reject::custom(err.into())
}

fn error_reply(status: StatusCode, message: &str) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status)
}

/// Map every rejection to `{"error": "..."}` with a matching status code.
pub async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    if rejection.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "not found"));
    }
    if let Some(err) = rejection.find::<ApiError>() {
        let status = err.status();
        match err {
            ApiError::Internal(source) => error!("request failed: {source:#}"),
            ApiError::Upstream(msg) => warn!("upstream failure: {msg}"),
            _ => {}
        }
        return Ok(error_reply(status, &err.to_string()));
    }
    if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, &format!("invalid request body: {err}")));
    }
    if let Some(err) = rejection.find::<warp::reject::InvalidQuery>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, &err.to_string()));
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
    }
    if let Some(err) = rejection.find::<warp::reject::UnsupportedMediaType>() {
        return Ok(error_reply(StatusCode::UNSUPPORTED_MEDIA_TYPE, &err.to_string()));
    }
    error!(?rejection, "unhandled rejection");
    Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
}
