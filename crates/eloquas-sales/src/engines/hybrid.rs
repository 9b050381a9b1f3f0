// Hybrid account research: public web, internal Drive documents and PDL
// contacts combined in one tracked research session.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use eloquas_core::db::Database;
use eloquas_core::models::{Contact, ContactSource, NewAccount, NewContact};
use eloquas_llm::ChatProvider;

use super::intent::{IntentDiscoveryEngine, IntentReport};
use super::research::{persist, ResearchInsightsEngine, ResearchReport};
use super::{gather_web_evidence, normalize_url, EngineError, Evidence};
use crate::integrations::drive::DocumentSource;
use crate::integrations::pdl::{PeopleQuery, PeopleSource, PersonRecord};
use crate::integrations::search::SearchProvider;

const MAX_DOCUMENTS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct HybridRequest {
    pub company: String,
    #[serde(default)]
    pub domain: Option<String>,
    /// Title keywords for the contact search.
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default = "default_max_contacts")]
    pub max_contacts: usize,
}

fn default_max_contacts() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridReport {
    pub session_id: String,
    pub company: String,
    pub account_id: String,
    pub research: ResearchReport,
    pub research_model: Option<String>,
    pub intent: IntentReport,
    pub contacts: Vec<Contact>,
    pub new_contacts: usize,
    pub web_sources: usize,
    pub internal_documents: usize,
    /// Steps that were unavailable, with the reason.
    pub skipped: Vec<String>,
}

pub struct HybridResearchEngine<'a> {
    llm: &'a dyn ChatProvider,
    search: &'a dyn SearchProvider,
    db: &'a Database,
    drive: Option<&'a dyn DocumentSource>,
    people: Option<&'a dyn PeopleSource>,
    research_model: String,
    min_citations: usize,
    max_results: usize,
}

impl<'a> HybridResearchEngine<'a> {
    pub fn new(
        llm: &'a dyn ChatProvider,
        search: &'a dyn SearchProvider,
        db: &'a Database,
        min_citations: usize,
        max_results: usize,
    ) -> Self {
        Self {
            llm,
            search,
            db,
            drive: None,
            people: None,
            research_model: String::new(),
            min_citations,
            max_results,
        }
    }

    pub fn with_drive(mut self, drive: Option<&'a dyn DocumentSource>) -> Self {
        self.drive = drive;
        self
    }

    pub fn with_people(mut self, people: Option<&'a dyn PeopleSource>) -> Self {
        self.people = people;
        self
    }

    pub fn with_research_model(mut self, model: impl Into<String>) -> Self {
        self.research_model = model.into();
        self
    }

    /// Run the whole pipeline inside a research session. The session ends
    /// `completed` with the report or `failed` with the error.
    pub async fn run(&self, user_id: &str, request: &HybridRequest) -> Result<HybridReport, EngineError> {
        let company = request.company.trim();
        if company.is_empty() {
            return Err(EngineError::Validation("company is required".to_string()));
        }
        let session = self.db.start_research_session(user_id, company)?;
        info!(company, session = %session.id, "hybrid research started");

        match self.execute(user_id, &session.id, company, request).await {
            Ok(report) => {
                let result = serde_json::to_value(&report).map_err(|e| EngineError::Store(e.into()))?;
                self.db.complete_research_session(&session.id, &result, Utc::now())?;
                info!(
                    company,
                    session = %session.id,
                    contacts = report.contacts.len(),
                    skipped = report.skipped.len(),
                    "hybrid research completed"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(company, session = %session.id, "hybrid research failed: {e}");
                self.db.fail_research_session(&session.id, &e.to_string(), Utc::now())?;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        user_id: &str,
        session_id: &str,
        company: &str,
        request: &HybridRequest,
    ) -> Result<HybridReport, EngineError> {
        let mut skipped = Vec::new();

        // Public web
        let queries = vec![
            format!("{company} company overview strategy"),
            format!("{company} digital transformation ERP QA initiative"),
            format!("{company} hiring news"),
        ];
        let web = match gather_web_evidence(self.search, &queries, self.max_results).await {
            Ok(web) => web,
            Err(e) => {
                skipped.push(format!("web search: {e}"));
                Vec::new()
            }
        };
        let web_sources = web.len();

        // Internal documents
        let documents: Vec<Evidence> = match self.drive {
            Some(drive) => match drive.documents_mentioning(company, MAX_DOCUMENTS).await {
                Ok(docs) => docs.into_iter().map(Evidence::from).collect(),
                Err(e) => {
                    skipped.push(format!("google drive: {e}"));
                    Vec::new()
                }
            },
            None => {
                skipped.push("google drive: not configured".to_string());
                Vec::new()
            }
        };
        let internal_documents = documents.len();

        // Contacts
        let people: Vec<PersonRecord> = match self.people {
            Some(people) => {
                let query = PeopleQuery {
                    company: company.to_string(),
                    domain: request.domain.clone(),
                    titles: request.titles.clone(),
                    limit: request.max_contacts,
                };
                match people.find_people(&query).await {
                    Ok(found) => found,
                    Err(e) => {
                        skipped.push(format!("people data labs: {e}"));
                        Vec::new()
                    }
                }
            }
            None => {
                skipped.push("people data labs: not configured".to_string());
                Vec::new()
            }
        };
        for step in &skipped {
            warn!(company, session = session_id, "skipped {step}");
        }

        let evidence = merge_evidence(web, documents);
        let context = contact_context(&people);

        let mut research = ResearchInsightsEngine::new(self.llm, self.search, self.min_citations, self.max_results);
        if !self.research_model.is_empty() {
            research = research.with_research_model(self.research_model.clone());
        }
        let report = research.research_with(company, &evidence, context.as_deref()).await?;

        let intent = IntentDiscoveryEngine::new(self.llm, self.search, self.max_results)
            .analyze(company, evidence)
            .await
            .value;

        let account = self
            .db
            .upsert_account(
                user_id,
                &NewAccount {
                    name: company.to_string(),
                    domain: request.domain.clone(),
                    ..Default::default()
                },
            )?
            .into_inner();

        let mut contacts = Vec::new();
        let mut new_contacts = 0;
        for person in &people {
            let saved = self.db.add_contact(
                &account.id,
                &NewContact {
                    name: person.full_name.clone(),
                    email: person.work_email.clone(),
                    title: person.job_title.clone(),
                    linkedin_url: person.linkedin_url.clone(),
                    source: ContactSource::Pdl,
                },
            )?;
            if saved.was_inserted() {
                new_contacts += 1;
            }
            contacts.push(saved.into_inner());
        }

        let intent_score = (!intent.insufficient_evidence).then_some(intent.intent_score);
        persist(self.db, user_id, Some(&account.id), &report, intent_score)?;

        Ok(HybridReport {
            session_id: session_id.to_string(),
            company: company.to_string(),
            account_id: account.id,
            research: report.value,
            research_model: report.model,
            intent,
            contacts,
            new_contacts,
            web_sources,
            internal_documents,
            skipped,
        })
    }
}

/// Web results first, then documents, without repeated URLs.
fn merge_evidence(web: Vec<Evidence>, documents: Vec<Evidence>) -> Vec<Evidence> {
    let mut seen = HashSet::new();
    web.into_iter()
        .chain(documents)
        .filter(|e| seen.insert(normalize_url(&e.url)))
        .collect()
}

fn contact_context(people: &[PersonRecord]) -> Option<String> {
    if people.is_empty() {
        return None;
    }
    let mut context = String::from("Known contacts at the company:\n");
    for p in people {
        context.push_str(&format!(
            "- {} ({})\n",
            p.full_name,
            p.job_title.as_deref().unwrap_or("title unknown")
        ));
    }
    Some(context)
}
