// Outbound API clients: web search, People Data Labs, Google Drive, LinkedIn
// OAuth and Twilio SMS.

pub mod drive;
pub mod linkedin;
pub mod pdl;
pub mod search;
pub mod sms;

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned status {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("unexpected {service} response: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },

    #[error("credential error: {0}")]
    Credentials(String),
}

impl IntegrationError {
    pub(crate) fn parse(service: &'static str, message: impl Into<String>) -> Self {
        IntegrationError::Parse {
            service,
            message: message.into(),
        }
    }
}

/// Shared HTTP client with a request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!("failed to build HTTP client with timeout, using defaults: {e}");
            reqwest::Client::new()
        })
}

/// Read the response body, turning non-2xx statuses into
/// [`IntegrationError::Status`].
pub(crate) async fn read_body(
    service: &'static str,
    response: reqwest::Response,
) -> Result<String, IntegrationError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(IntegrationError::Status {
            service,
            status: status.as_u16(),
            message: text.chars().take(200).collect(),
        });
    }
    Ok(text)
}

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
