// Google Drive search for internal account documents, authenticated as a
// service account (RS256 JWT assertion exchanged for an OAuth token).

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use eloquas_core::config::{non_empty, Config};

use super::{http_client, read_body, IntegrationError, DEFAULT_TIMEOUT};

const SERVICE: &str = "google drive";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const GOOGLE_DOC: &str = "application/vnd.google-apps.document";
/// Exported document text is cut to this many characters.
pub const MAX_DOCUMENT_CHARS: usize = 8_000;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriveDocument {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub web_view_link: Option<String>,
    pub modified_time: Option<String>,
    pub text: String,
}

impl DriveDocument {
    /// Link used when citing the document.
    pub fn link(&self) -> String {
        self.web_view_link
            .clone()
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", self.id))
    }
}

/// Source of internal documents that mention a company.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn documents_mentioning(
        &self,
        company: &str,
        limit: usize,
    ) -> Result<Vec<DriveDocument>, IntegrationError>;
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct DriveClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    folder_id: Option<String>,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl DriveClient {
    pub fn new(key: ServiceAccountKey, folder_id: Option<String>) -> Self {
        Self {
            http: http_client(DEFAULT_TIMEOUT),
            key,
            folder_id,
            api_base: "https://www.googleapis.com".to_string(),
            token: Mutex::new(None),
        }
    }

    /// Load the service-account key named in the credentials. `Ok(None)` when
    /// Drive is not configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, IntegrationError> {
        let Some(path) = non_empty(&config.credentials.google_service_account_path) else {
            return Ok(None);
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| IntegrationError::Credentials(format!("cannot read {path}: {e}")))?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| IntegrationError::Credentials(format!("invalid service account key: {e}")))?;
        info!(account = %key.client_email, "Google Drive integration enabled");
        Ok(Some(Self::new(
            key,
            non_empty(&config.credentials.drive_folder_id).map(str::to_string),
        )))
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Signed JWT assertion for the token endpoint.
    fn assertion(&self, now: DateTime<Utc>) -> Result<String, IntegrationError> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| IntegrationError::Credentials(format!("invalid private key: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| IntegrationError::Credentials(format!("failed to sign assertion: {e}")))
    }

    /// Cached access token, refreshed a minute before it expires.
    async fn access_token(&self) -> Result<String, IntegrationError> {
        let now = Utc::now();
        let cached = self.token.lock().expect("token mutex poisoned").clone();
        if let Some(cached) = cached {
            if cached.expires_at - Duration::seconds(60) > now {
                return Ok(cached.value);
            }
        }

        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let body = read_body(SERVICE, response).await?;
        let (value, expires_in) =
            parse_token(&body).ok_or_else(|| IntegrationError::parse(SERVICE, "missing access_token"))?;
        debug!(expires_in, "refreshed Drive access token");

        *self.token.lock().expect("token mutex poisoned") = Some(CachedToken {
            value: value.clone(),
            expires_at: now + Duration::seconds(expires_in),
        });
        Ok(value)
    }

    async fn list_files(&self, token: &str, company: &str, limit: usize) -> Result<Vec<DriveFile>, IntegrationError> {
        let url = format!("{}/drive/v3/files", self.api_base.trim_end_matches('/'));
        let q = search_query(company, self.folder_id.as_deref());
        let page_size = limit.clamp(1, 50).to_string();
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("q", q.as_str()),
                ("pageSize", page_size.as_str()),
                ("orderBy", "modifiedTime desc"),
                ("fields", "files(id,name,mimeType,webViewLink,modifiedTime)"),
            ])
            .send()
            .await?;
        let body = read_body(SERVICE, response).await?;
        parse_files(&body).ok_or_else(|| IntegrationError::parse(SERVICE, "missing files array"))
    }

    /// Plain text of a file. Google Docs are exported; other text files are
    /// downloaded; anything else yields `None`.
    async fn file_text(&self, token: &str, file: &DriveFile) -> Result<Option<String>, IntegrationError> {
        let base = self.api_base.trim_end_matches('/');
        let request = if file.mime_type == GOOGLE_DOC {
            self.http
                .get(format!("{base}/drive/v3/files/{}/export", file.id))
                .query(&[("mimeType", "text/plain")])
        } else if file.mime_type.starts_with("text/") {
            self.http
                .get(format!("{base}/drive/v3/files/{}", file.id))
                .query(&[("alt", "media")])
        } else {
            return Ok(None);
        };
        let body = read_body(SERVICE, request.bearer_auth(token).send().await?).await?;
        Ok(Some(truncate_chars(body.trim(), MAX_DOCUMENT_CHARS)))
    }

    #[cfg(test)]
    fn seed_token(&self, value: &str, expires_at: DateTime<Utc>) {
        *self.token.lock().unwrap() = Some(CachedToken {
            value: value.to_string(),
            expires_at,
        });
    }
}

#[async_trait]
impl DocumentSource for DriveClient {
    async fn documents_mentioning(
        &self,
        company: &str,
        limit: usize,
    ) -> Result<Vec<DriveDocument>, IntegrationError> {
        let token = self.access_token().await?;
        let files = self.list_files(&token, company, limit).await?;
        debug!(company, files = files.len(), "Drive search finished");

        let mut documents = Vec::new();
        for file in files {
            let Some(text) = self.file_text(&token, &file).await? else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            documents.push(DriveDocument {
                id: file.id,
                name: file.name,
                mime_type: file.mime_type,
                web_view_link: file.web_view_link,
                modified_time: file.modified_time,
                text,
            });
        }
        Ok(documents)
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    pub web_view_link: Option<String>,
    pub modified_time: Option<String>,
}

/// Drive `q` expression: full-text match, not trashed, optionally limited to
/// one folder.
pub(crate) fn search_query(company: &str, folder_id: Option<&str>) -> String {
    let mut q = format!(
        "fullText contains '{}' and trashed = false",
        escape_literal(company.trim())
    );
    if let Some(folder) = folder_id {
        q.push_str(&format!(" and '{}' in parents", escape_literal(folder)));
    }
    q
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `{ "access_token": "...", "expires_in": 3599, "token_type": "Bearer" }`
pub(crate) fn parse_token(data: &str) -> Option<(String, i64)> {
    let v: Value = serde_json::from_str(data).ok()?;
    let token = v.get("access_token")?.as_str()?.to_string();
    let expires_in = v.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);
    Some((token, expires_in))
}

pub(crate) fn parse_files(data: &str) -> Option<Vec<DriveFile>> {
    let v: Value = serde_json::from_str(data).ok()?;
    serde_json::from_value(v.get("files")?.clone()).ok()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::test_server::serve;

    fn key() -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "research@eloquas.iam.gserviceaccount.com".into(),
            private_key: "not a pem".into(),
            token_uri: default_token_uri(),
        }
    }

    #[test]
    fn query_escapes_quotes_and_scopes_folder() {
        assert_eq!(
            search_query("O'Reilly", Some("folder123")),
            "fullText contains 'O\\'Reilly' and trashed = false and 'folder123' in parents"
        );
        assert_eq!(
            search_query(" Acme ", None),
            "fullText contains 'Acme' and trashed = false"
        );
    }

    #[test]
    fn token_response_parses_with_default_expiry() {
        assert_eq!(
            parse_token(r#"{"access_token":"ya29.x","expires_in":1200}"#),
            Some(("ya29.x".to_string(), 1200))
        );
        assert_eq!(parse_token(r#"{"access_token":"t"}"#).unwrap().1, 3600);
        assert_eq!(parse_token(r#"{"error":"invalid_grant"}"#), None);
    }

    #[test]
    fn bad_private_key_is_a_credentials_error() {
        let client = DriveClient::new(key(), None);
        let err = client.assertion(Utc::now()).unwrap_err();
        assert!(matches!(err, IntegrationError::Credentials(_)));
    }

    #[tokio::test]
    async fn expired_cache_tries_to_sign_a_new_assertion() {
        let client = DriveClient::new(key(), None);
        client.seed_token("old", Utc::now() + Duration::seconds(30));
        let err = client.access_token().await.unwrap_err();
        assert!(matches!(err, IntegrationError::Credentials(_)));
    }

    #[tokio::test]
    async fn exports_docs_and_skips_binary_files() {
        let files = r#"{"files":[
            {"id":"doc1","name":"Acme account plan","mimeType":"application/vnd.google-apps.document","webViewLink":"https://docs.google.com/document/d/doc1"},
            {"id":"pdf1","name":"Acme deck","mimeType":"application/pdf"},
            {"id":"txt1","name":"notes.txt","mimeType":"text/plain"}
        ]}"#;
        let (addr, server) = serve(vec![
            (200, files.to_string()),
            (200, "  Acme is migrating to S/4HANA in Q3.  ".to_string()),
            (200, "Call notes".to_string()),
        ])
        .await;
        let client = DriveClient::new(key(), Some("folder9".into())).with_api_base(format!("http://{addr}"));
        client.seed_token("cached-token", Utc::now() + Duration::hours(1));

        let docs = client.documents_mentioning("Acme", 5).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "Acme is migrating to S/4HANA in Q3.");
        assert_eq!(docs[0].link(), "https://docs.google.com/document/d/doc1");
        assert_eq!(docs[1].link(), "https://drive.google.com/file/d/txt1/view");

        let captured = server.await.unwrap();
        assert_eq!(captured[0].header("authorization"), Some("Bearer cached-token"));
        assert!(captured[1].request_line().contains("/drive/v3/files/doc1/export"));
        assert!(captured[2].request_line().contains("alt=media"));
    }
}
