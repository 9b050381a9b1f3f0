// People Data Labs person search (`POST /v5/person/search`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use eloquas_core::config::{non_empty, Config};

use super::{http_client, IntegrationError, DEFAULT_TIMEOUT};

const SERVICE: &str = "people data labs";
const MAX_SIZE: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub full_name: String,
    pub job_title: Option<String>,
    pub job_company_name: Option<String>,
    pub work_email: Option<String>,
    pub linkedin_url: Option<String>,
    pub location_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PeopleQuery {
    pub company: String,
    #[serde(default)]
    pub domain: Option<String>,
    /// Job-title keywords; any one must match.
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// Anything that can look up people working at a company.
#[async_trait]
pub trait PeopleSource: Send + Sync {
    async fn find_people(&self, query: &PeopleQuery) -> Result<Vec<PersonRecord>, IntegrationError>;
}

pub struct PdlClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PdlClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: http_client(DEFAULT_TIMEOUT),
            api_key,
            base_url: "https://api.peopledatalabs.com".to_string(),
        }
    }

    /// `None` when no PDL key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        non_empty(&config.credentials.pdl_api_key).map(|key| Self::new(key.to_string()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl PeopleSource for PdlClient {
    async fn find_people(&self, query: &PeopleQuery) -> Result<Vec<PersonRecord>, IntegrationError> {
        let url = format!("{}/v5/person/search", self.base_url.trim_end_matches('/'));
        let body = build_query(query);
        debug!(company = %query.company, titles = query.titles.len(), "PDL person search");

        let response = self
            .http
            .post(url)
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        // PDL answers 404 when nothing matches.
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: status.as_u16(),
                message: parse_error(&text).unwrap_or_else(|| text.chars().take(200).collect()),
            });
        }
        parse_people(&text).ok_or_else(|| IntegrationError::parse(SERVICE, "missing data array"))
    }
}

/// Elasticsearch-style query: the company (by name or website) must match,
/// and at least one title keyword when any are given.
pub(crate) fn build_query(query: &PeopleQuery) -> Value {
    let mut company_match = vec![json!({ "term": { "job_company_name": query.company.trim().to_lowercase() } })];
    if let Some(domain) = query.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        company_match.push(json!({ "term": { "job_company_website": domain.to_lowercase() } }));
    }

    let mut must = vec![json!({
        "bool": { "should": company_match, "minimum_should_match": 1 }
    })];

    let titles: Vec<Value> = query
        .titles
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| json!({ "match": { "job_title": t } }))
        .collect();
    if !titles.is_empty() {
        must.push(json!({ "bool": { "should": titles, "minimum_should_match": 1 } }));
    }

    json!({
        "query": { "bool": { "must": must } },
        "size": query.limit.clamp(1, MAX_SIZE),
    })
}

/// `{ "status": 200, "data": [{...}], "total": N }`. Fields the plan does not
/// unlock come back as booleans and are treated as absent.
pub(crate) fn parse_people(data: &str) -> Option<Vec<PersonRecord>> {
    let v: Value = serde_json::from_str(data).ok()?;
    let items = v.get("data")?.as_array()?;
    let text = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Some(
        items
            .iter()
            .filter_map(|item| {
                let full_name = text(item, "full_name")?;
                Some(PersonRecord {
                    full_name,
                    job_title: text(item, "job_title"),
                    job_company_name: text(item, "job_company_name"),
                    work_email: text(item, "work_email"),
                    linkedin_url: text(item, "linkedin_url").map(|u| {
                        if u.starts_with("http") {
                            u
                        } else {
                            format!("https://{u}")
                        }
                    }),
                    location_name: text(item, "location_name"),
                })
            })
            .collect(),
    )
}

fn parse_error(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("error")?.get("message")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::test_server::serve;
    use pretty_assertions::assert_eq;

    fn query() -> PeopleQuery {
        PeopleQuery {
            company: "Acme Corp".into(),
            domain: Some("acme.com".into()),
            titles: vec!["QA".into(), " ".into(), "Quality".into()],
            limit: 500,
        }
    }

    #[test]
    fn query_matches_company_and_titles() {
        let body = build_query(&query());
        assert_eq!(body["size"], 100);
        let must = body["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert_eq!(must[0]["bool"]["should"][0]["term"]["job_company_name"], "acme corp");
        assert_eq!(must[0]["bool"]["should"][1]["term"]["job_company_website"], "acme.com");
        assert_eq!(must[1]["bool"]["should"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn query_without_titles_has_single_clause() {
        let body = build_query(&PeopleQuery {
            company: "Acme".into(),
            limit: 5,
            ..Default::default()
        });
        assert_eq!(body["query"]["bool"]["must"].as_array().unwrap().len(), 1);
        assert_eq!(body["size"], 5);
    }

    #[test]
    fn parse_people_skips_locked_fields_and_nameless_rows() {
        let body = r#"{"status":200,"total":2,"data":[
            {"full_name":"jane roe","job_title":"qa director","work_email":true,"linkedin_url":"linkedin.com/in/janeroe"},
            {"job_title":"ghost"}
        ]}"#;
        let people = parse_people(body).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].work_email, None);
        assert_eq!(people[0].linkedin_url.as_deref(), Some("https://linkedin.com/in/janeroe"));
    }

    #[tokio::test]
    async fn not_found_means_no_people() {
        let (addr, server) = serve(vec![(404, r#"{"status":404,"error":{"type":"not_found","message":"No records were found"}}"#.into())]).await;
        let client = PdlClient::new("pdl-key".into()).with_base_url(format!("http://{addr}"));
        let people = client.find_people(&query()).await.unwrap();
        assert!(people.is_empty());

        let captured = server.await.unwrap();
        assert!(captured[0].request_line().starts_with("POST /v5/person/search"));
        assert_eq!(captured[0].header("x-api-key"), Some("pdl-key"));
    }

    #[tokio::test]
    async fn auth_failure_reports_message() {
        let (addr, _server) = serve(vec![(401, r#"{"status":401,"error":{"message":"Invalid API key"}}"#.into())]).await;
        let client = PdlClient::new("bad".into()).with_base_url(format!("http://{addr}"));
        match client.find_people(&query()).await {
            Err(IntegrationError::Status { status, message, .. }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
