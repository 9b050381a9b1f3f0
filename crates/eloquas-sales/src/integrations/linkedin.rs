// LinkedIn OAuth: authorization URL, code exchange and the profile/email
// lookups used for relationship scoring.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde_json::Value;
use tracing::debug;

use eloquas_core::config::{non_empty, Config};
use eloquas_core::models::LinkedinProfile;

use super::{http_client, read_body, IntegrationError, DEFAULT_TIMEOUT};

const SERVICE: &str = "linkedin";
const SCOPE: &str = "r_liteprofile r_emailaddress";

pub struct LinkedinOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    api_base: String,
}

impl LinkedinOAuth {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            http: http_client(DEFAULT_TIMEOUT),
            client_id,
            client_secret,
            redirect_uri,
            auth_url: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
            token_url: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            api_base: "https://api.linkedin.com".to_string(),
        }
    }

    /// `None` unless client id, secret and redirect URI are all set.
    pub fn from_config(config: &Config) -> Option<Self> {
        let creds = &config.credentials;
        Some(Self::new(
            non_empty(&creds.linkedin_client_id)?.to_string(),
            non_empty(&creds.linkedin_client_secret)?.to_string(),
            non_empty(&creds.linkedin_redirect_uri)?.to_string(),
        ))
    }

    /// Point token exchange and API calls at another host (tests).
    pub fn with_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.token_url = format!("{base}/oauth/v2/accessToken");
        self.api_base = base.to_string();
        self
    }

    /// Random CSRF state for one authorization round-trip.
    pub fn new_state() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub fn authorization_url(&self, state: &str) -> Result<String, IntegrationError> {
        let url = reqwest::Url::parse_with_params(
            &self.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", SCOPE),
                ("state", state),
            ],
        )
        .map_err(|e| IntegrationError::Credentials(format!("invalid authorization URL: {e}")))?;
        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String, IntegrationError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        let body = read_body(SERVICE, response).await?;
        parse_access_token(&body).ok_or_else(|| IntegrationError::parse(SERVICE, "missing access_token"))
    }

    /// Fetch the member profile and primary email. A failed email lookup
    /// leaves the email empty.
    pub async fn fetch_profile(
        &self,
        user_id: &str,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<LinkedinProfile, IntegrationError> {
        let me = self
            .http
            .get(format!("{}/v2/me", self.api_base))
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .query(&[(
                "projection",
                "(id,localizedFirstName,localizedLastName,localizedHeadline,profilePicture(displayImage~:playableStreams))",
            )])
            .send()
            .await?;
        let body = read_body(SERVICE, me).await?;
        let mut profile =
            parse_profile(&body).ok_or_else(|| IntegrationError::parse(SERVICE, "profile has no id"))?;

        let email = self
            .http
            .get(format!("{}/v2/emailAddress", self.api_base))
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .query(&[("q", "members"), ("projection", "(elements*(handle~))")])
            .send()
            .await;
        match email {
            Ok(response) => match read_body(SERVICE, response).await {
                Ok(body) => profile.email = parse_email(&body),
                Err(e) => debug!("LinkedIn email lookup failed: {e}"),
            },
            Err(e) => debug!("LinkedIn email lookup failed: {e}"),
        }

        profile.user_id = user_id.to_string();
        profile.fetched_at = Some(now);
        Ok(profile)
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_access_token(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("access_token")?.as_str().map(str::to_string)
}

/// Profile fields from `/v2/me`. Accepts both the `localized*` shortcuts and
/// the `{ "localized": { "en_US": ... } }` multi-locale form.
pub(crate) fn parse_profile(data: &str) -> Option<LinkedinProfile> {
    let v: Value = serde_json::from_str(data).ok()?;
    let id = v.get("id")?.as_str()?.to_string();
    Some(LinkedinProfile {
        linkedin_id: id,
        first_name: localized(&v, "localizedFirstName", "firstName"),
        last_name: localized(&v, "localizedLastName", "lastName"),
        headline: localized(&v, "localizedHeadline", "headline"),
        picture_url: largest_picture(&v),
        ..Default::default()
    })
}

fn localized(v: &Value, short: &str, long: &str) -> Option<String> {
    let direct = v.get(short).and_then(Value::as_str);
    let nested = || {
        let map = v.get(long)?.get("localized")?.as_object()?;
        map.get("en_US")
            .or_else(|| map.values().next())
            .and_then(Value::as_str)
    };
    direct
        .or_else(nested)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Identifier of the widest display image.
fn largest_picture(v: &Value) -> Option<String> {
    let elements = v
        .get("profilePicture")?
        .get("displayImage~")?
        .get("elements")?
        .as_array()?;
    let width = |e: &Value| {
        e.pointer("/data/com.linkedin.digitalmedia.mediaartifact.StillImage/storageSize/width")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let largest = elements.iter().max_by_key(|e| width(e))?;
    largest
        .get("identifiers")?
        .get(0)?
        .get("identifier")?
        .as_str()
        .map(str::to_string)
}

pub(crate) fn parse_email(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("elements")?
        .get(0)?
        .get("handle~")?
        .get("emailAddress")?
        .as_str()
        .map(str::to_string)
}
