// Shared application context handed to every request handler.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use eloquas_core::auth::JwtKeys;
use eloquas_core::cache::TtlCache;
use eloquas_core::config::Config;
use eloquas_core::db::Database;
use eloquas_llm::{ChatProvider, LlmClient};
use eloquas_sales::engines::platform::PlatformReport;
use eloquas_sales::integrations::drive::{DocumentSource, DriveClient};
use eloquas_sales::integrations::linkedin::LinkedinOAuth;
use eloquas_sales::integrations::pdl::{PdlClient, PeopleSource};
use eloquas_sales::integrations::search::{provider_from_config, SearchProvider};
use eloquas_sales::integrations::sms::{LogSms, SmsSender, TwilioClient};
use eloquas_sales::queue::{LogMailer, Mailer};
use eloquas_sales::Generated;

/// OAuth state tokens expire after ten minutes.
const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);

pub type Ctx = Arc<AppContext>;

pub struct AppContext {
    pub config: Config,
    pub db: Arc<Database>,
    pub jwt: JwtKeys,
    pub llm: Arc<dyn ChatProvider>,
    pub search: Arc<dyn SearchProvider>,
    pub people: Option<Arc<dyn PeopleSource>>,
    pub drive: Option<Arc<dyn DocumentSource>>,
    pub linkedin: Option<LinkedinOAuth>,
    pub sms: Arc<dyn SmsSender>,
    pub mailer: Arc<dyn Mailer>,
    pub platform_cache: TtlCache<String, Generated<PlatformReport>>,
    /// LinkedIn OAuth state → user id.
    pub oauth_states: TtlCache<String, String>,
}

impl AppContext {
    /// Wire every client from the configuration. Integrations without
    /// credentials are left disabled.
    pub fn from_config(config: Config, db: Arc<Database>) -> anyhow::Result<Self> {
        let secret = config
            .jwt_secret()
            .ok_or_else(|| anyhow::anyhow!("jwt_secret is not configured"))?;
        let jwt = JwtKeys::new(secret);

        let llm = LlmClient::from_config(&config);
        if llm.is_active() {
            info!(model = %config.llm.model, "LLM client initialized");
        } else {
            info!("LLM client disabled (no API key), engines will use fallbacks");
        }
        let search = provider_from_config(&config);
        info!(provider = search.name(), "web search provider ready");

        let people = PdlClient::from_config(&config).map(|c| Arc::new(c) as Arc<dyn PeopleSource>);
        let drive = match DriveClient::from_config(&config) {
            Ok(client) => client.map(|c| Arc::new(c) as Arc<dyn DocumentSource>),
            Err(e) => {
                warn!("Google Drive disabled: {e}");
                None
            }
        };
        let sms: Arc<dyn SmsSender> = match TwilioClient::from_config(&config) {
            Some(client) => Arc::new(client),
            None => Arc::new(LogSms),
        };
        let linkedin = LinkedinOAuth::from_config(&config);
        let cache_ttl = Duration::from_secs(config.research.cache_ttl_secs);

        Ok(Self {
            jwt,
            db,
            llm: Arc::new(llm),
            search,
            people,
            drive,
            linkedin,
            sms,
            mailer: Arc::new(LogMailer),
            platform_cache: TtlCache::new(cache_ttl),
            oauth_states: TtlCache::new(OAUTH_STATE_TTL),
            config,
        })
    }

    pub fn with_llm(mut self, llm: Arc<dyn ChatProvider>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = search;
        self
    }

    pub fn with_people(mut self, people: Option<Arc<dyn PeopleSource>>) -> Self {
        self.people = people;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_sms(mut self, sms: Arc<dyn SmsSender>) -> Self {
        self.sms = sms;
        self
    }
}
