// Configuration loading and parsing (app.toml, credentials.toml, environment).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub queue: QueueConfig,
    pub signals: SignalsConfig,
    pub logging: LoggingConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// app.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire app.toml file.
#[derive(Debug, Clone, Deserialize)]
struct AppFile {
    server: ServerConfig,
    database: DatabaseConfig,
    auth: AuthConfig,
    llm: LlmConfig,
    search: SearchConfig,
    research: ResearchConfig,
    queue: QueueConfig,
    #[serde(default)]
    signals: SignalsConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. Empty means the platform data directory.
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_ttl_hours: i64,
    pub session_ttl_hours: i64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

fn default_cookie_name() -> String {
    "session_id".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub fallback_model: String,
    /// Model used for research reports. Falls back to `fallback_model`.
    pub research_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Tavily,
    Bing,
    Serpapi,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub provider: SearchProviderKind,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchConfig {
    pub min_citations: usize,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub interval_secs: u64,
    pub max_attempts: u32,
    pub min_delay_minutes: i64,
    pub max_delay_minutes: i64,
    pub retry_delay_minutes: i64,
    #[serde(default)]
    pub send_spacing_secs: u64,
    pub spam_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalsConfig {
    /// Companies scanned even when no user tracks them as prospects.
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default = "default_min_match_score")]
    pub min_match_score: f64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            watchlist: Vec::new(),
            min_match_score: default_min_match_score(),
        }
    }
}

fn default_min_match_score() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Optional log file; logs go to stdout when unset.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
        }
    }
}

fn default_log_filter() -> String {
    "eloquas=info,warn".to_string()
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub openai_api_key: Option<String>,
    pub pdl_api_key: Option<String>,
    pub search_api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub google_service_account_path: Option<String>,
    pub drive_folder_id: Option<String>,
    pub linkedin_client_id: Option<String>,
    pub linkedin_client_secret: Option<String>,
    pub linkedin_redirect_uri: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
}

impl CredentialsConfig {
    /// Override fields from environment-style lookups (`OPENAI_API_KEY`, ...).
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut Option<String>); 12] = [
            ("OPENAI_API_KEY", &mut self.openai_api_key),
            ("PDL_API_KEY", &mut self.pdl_api_key),
            ("SEARCH_API_KEY", &mut self.search_api_key),
            ("JWT_SECRET", &mut self.jwt_secret),
            (
                "GOOGLE_SERVICE_ACCOUNT_PATH",
                &mut self.google_service_account_path,
            ),
            ("DRIVE_FOLDER_ID", &mut self.drive_folder_id),
            ("LINKEDIN_CLIENT_ID", &mut self.linkedin_client_id),
            ("LINKEDIN_CLIENT_SECRET", &mut self.linkedin_client_secret),
            ("LINKEDIN_REDIRECT_URI", &mut self.linkedin_redirect_uri),
            ("TWILIO_ACCOUNT_SID", &mut self.twilio_account_sid),
            ("TWILIO_AUTH_TOKEN", &mut self.twilio_auth_token),
            ("TWILIO_FROM_NUMBER", &mut self.twilio_from_number),
        ];
        for (var, slot) in fields {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        }
    }
}

/// Returns the credential if it is set and non-empty.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Resolve the SQLite path. An empty `[database] path` maps to
    /// `<platform data dir>/eloquas.db`.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if !self.database.path.trim().is_empty() {
            return Ok(PathBuf::from(&self.database.path));
        }
        let dirs = directories::ProjectDirs::from("ai", "Eloquas", "eloquas").ok_or_else(|| {
            ConfigError::ValidationError {
                field: "database.path".into(),
                message: "no home directory available; set an explicit path".into(),
            }
        })?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).map_err(|e| ConfigError::ValidationError {
            field: "database.path".into(),
            message: format!("cannot create {}: {e}", data_dir.display()),
        })?;
        Ok(data_dir.join("eloquas.db"))
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        non_empty(&self.credentials.jwt_secret)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/app.toml` and (optionally)
/// `config/credentials.toml`, both relative to `base_dir`. Credential
/// fields are then overridden by `lookup` (the process environment in
/// production).
pub fn load_config_from<F>(base_dir: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_dir = base_dir.join("config");

    // --- app.toml (required) ---
    let app_path = config_dir.join("app.toml");
    let app_text = read_file(&app_path)?;
    let app: AppFile = toml::from_str(&app_text).map_err(|e| ConfigError::ParseError {
        path: app_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let mut credentials: CredentialsConfig = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };
    credentials.apply_overrides(lookup);

    let config = Config {
        server: app.server,
        database: app.database,
        auth: app.auth,
        llm: app.llm,
        search: app.search,
        research: app.research,
        queue: app.queue,
        signals: app.signals,
        logging: app.logging,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads `.env` if present, copies missing defaults and
/// loads config relative to the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    // A missing .env is normal.
    let _ = dotenvy::from_path(cwd.join(".env"));
    ensure_config_files(&cwd)?;
    load_config_from(&cwd, |var| std::env::var(var).ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port", "must be greater than 0"));
    }

    let ttl_fields: &[(&str, i64)] = &[
        ("auth.jwt_ttl_hours", config.auth.jwt_ttl_hours),
        ("auth.session_ttl_hours", config.auth.session_ttl_hours),
    ];
    for (name, val) in ttl_fields {
        if *val <= 0 {
            return Err(invalid(name, format!("must be > 0, got {val}")));
        }
    }

    let llm = &config.llm;
    if llm.model.trim().is_empty() {
        return Err(invalid("llm.model", "must not be empty"));
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(invalid(
            "llm.temperature",
            format!("must be between 0.0 and 2.0 inclusive, got {}", llm.temperature),
        ));
    }
    if llm.max_tokens == 0 {
        return Err(invalid("llm.max_tokens", "must be > 0"));
    }

    if config.search.max_results == 0 {
        return Err(invalid("search.max_results", "must be > 0"));
    }
    if config.research.min_citations == 0 {
        return Err(invalid("research.min_citations", "must be >= 1"));
    }

    let queue = &config.queue;
    if queue.max_attempts == 0 {
        return Err(invalid("queue.max_attempts", "must be >= 1"));
    }
    if queue.min_delay_minutes < 0 || queue.min_delay_minutes > queue.max_delay_minutes {
        return Err(invalid(
            "queue.min_delay_minutes",
            format!(
                "must be between 0 and max_delay_minutes ({}), got {}",
                queue.max_delay_minutes, queue.min_delay_minutes
            ),
        ));
    }
    if queue.spam_threshold <= 0.0 {
        return Err(invalid(
            "queue.spam_threshold",
            format!("must be > 0, got {}", queue.spam_threshold),
        ));
    }

    let score = config.signals.min_match_score;
    if !(0.0..=1.0).contains(&score) {
        return Err(invalid(
            "signals.min_match_score",
            format!("must be between 0.0 and 1.0 inclusive, got {score}"),
        ));
    }

    if config.jwt_secret().is_none() {
        return Err(invalid(
            "credentials.jwt_secret",
            "must be set in credentials.toml or JWT_SECRET",
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::fs;

    const APP_TOML: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[database]
path = "eloquas-test.db"

[auth]
jwt_ttl_hours = 24
session_ttl_hours = 24

[llm]
base_url = "https://api.openai.com/v1"
model = "gpt-4o"
fallback_model = "gpt-4o-mini"
research_model = "o1-pro"
temperature = 0.7
max_tokens = 2000
timeout_secs = 60

[search]
provider = "tavily"
max_results = 8

[research]
min_citations = 3
cache_ttl_secs = 3600

[queue]
interval_secs = 60
max_attempts = 3
min_delay_minutes = 5
max_delay_minutes = 30
retry_delay_minutes = 60
spam_threshold = 5.0
"#;

    fn write_config(app: &str, credentials: Option<&str>) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let config_dir = tmp.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("app.toml"), app).unwrap();
        if let Some(creds) = credentials {
            fs::write(config_dir.join("credentials.toml"), creds).unwrap();
        }
        tmp
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn load_valid_config() {
        let tmp = write_config(APP_TOML, Some("jwt_secret = \"s3cret\"\n"));
        let config = load_config_from(tmp.path(), no_env).expect("should load valid config");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.research_model, "o1-pro");
        assert_eq!(config.search.provider, SearchProviderKind::Tavily);
        assert_eq!(config.research.min_citations, 3);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.auth.cookie_name, "session_id");
        assert_eq!(config.signals.min_match_score, 0.5);
        assert_eq!(config.logging.filter, "eloquas=info,warn");
        assert_eq!(config.jwt_secret(), Some("s3cret"));
        assert!(config.credentials.openai_api_key.is_none());
    }

    #[test]
    fn missing_app_toml_is_file_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config_from(tmp.path(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = write_config("[server\nport = 1", None);
        let err = load_config_from(tmp.path(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_jwt_secret_fails_validation() {
        let tmp = write_config(APP_TOML, None);
        let err = load_config_from(tmp.path(), no_env).unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "credentials.jwt_secret")
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn environment_overrides_credentials_file() {
        let tmp = write_config(
            APP_TOML,
            Some("jwt_secret = \"from-file\"\nopenai_api_key = \"sk-file\"\n"),
        );
        let env: HashMap<&str, &str> =
            HashMap::from([("OPENAI_API_KEY", "sk-env"), ("PDL_API_KEY", "  ")]);
        let config = load_config_from(tmp.path(), |var| env.get(var).map(|v| v.to_string()))
            .expect("should load");

        assert_eq!(config.credentials.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.jwt_secret(), Some("from-file"));
        // Blank environment values do not clobber anything.
        assert!(config.credentials.pdl_api_key.is_none());
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let app = APP_TOML.replace("temperature = 0.7", "temperature = 3.5");
        let tmp = write_config(&app, Some("jwt_secret = \"x\"\n"));
        let err = load_config_from(tmp.path(), no_env).unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "llm.temperature"),
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn queue_delays_must_be_ordered() {
        let app = APP_TOML.replace("min_delay_minutes = 5", "min_delay_minutes = 45");
        let tmp = write_config(&app, Some("jwt_secret = \"x\"\n"));
        let err = load_config_from(tmp.path(), no_env).unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { ref field, .. } if field == "queue.min_delay_minutes")
        );
    }

    #[test]
    fn zero_min_citations_rejected() {
        let app = APP_TOML.replace("min_citations = 3", "min_citations = 0");
        let tmp = write_config(&app, Some("jwt_secret = \"x\"\n"));
        assert!(load_config_from(tmp.path(), no_env).is_err());
    }

    #[test]
    fn ensure_config_files_copies_missing_and_skips_examples() {
        let tmp = tempfile::tempdir().unwrap();
        let defaults = tmp.path().join("defaults");
        fs::create_dir_all(&defaults).unwrap();
        fs::write(defaults.join("app.toml"), APP_TOML).unwrap();
        fs::write(defaults.join("credentials.toml.example"), "jwt_secret = \"\"").unwrap();

        let copied = ensure_config_files(tmp.path()).unwrap();
        assert_eq!(copied.len(), 1);
        assert!(tmp.path().join("config/app.toml").exists());
        assert!(!tmp.path().join("config/credentials.toml.example").exists());

        // Second run copies nothing and leaves edits alone.
        fs::write(tmp.path().join("config/app.toml"), "edited").unwrap();
        assert!(ensure_config_files(tmp.path()).unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(tmp.path().join("config/app.toml")).unwrap(),
            "edited"
        );
    }

    #[test]
    fn ensure_config_files_errors_without_any_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ensure_config_files(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));
    }

    #[test]
    fn explicit_database_path_is_used_verbatim() {
        let tmp = write_config(APP_TOML, Some("jwt_secret = \"x\"\n"));
        let config = load_config_from(tmp.path(), no_env).unwrap();
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("eloquas-test.db")
        );
    }
}
