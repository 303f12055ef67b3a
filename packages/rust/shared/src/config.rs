//! Application configuration for quizrelay.
//!
//! User config lives at `~/.quizrelay/quizrelay.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it names the environment variables
//! that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuizRelayError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "quizrelay.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".quizrelay";

// ---------------------------------------------------------------------------
// Config structs (matching quizrelay.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub translate: TranslateConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub run: RunConfig,
}

/// How the source exposes solutions on an item page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealMode {
    /// Submit the quiz form over plain HTTP, then re-fetch.
    Form,
    /// Pages already carry full content.
    None,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Site origin; relative links are resolved against it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_listing_path")]
    pub listing_path: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Authenticated page used to check whether a stored session still works.
    #[serde(default = "default_listing_path")]
    pub probe_path: String,

    /// Endpoint the quiz form posts to during the reveal step.
    #[serde(default = "default_submit_path")]
    pub submit_path: String,

    #[serde(default = "default_reveal_mode")]
    pub reveal_mode: RevealMode,

    /// Cookies that make up an authenticated session.
    #[serde(default = "default_session_cookies")]
    pub session_cookies: Vec<String>,

    /// Pause before each request to the source, in ms.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            listing_path: default_listing_path(),
            login_path: default_login_path(),
            probe_path: default_listing_path(),
            submit_path: default_submit_path(),
            reveal_mode: default_reveal_mode(),
            session_cookies: default_session_cookies(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl SourceConfig {
    /// Join a configured path onto the base URL.
    pub fn url(&self, path: &str) -> Result<url::Url> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| QuizRelayError::config(format!("invalid base_url: {e}")))?;
        base.join(path)
            .map_err(|e| QuizRelayError::config(format!("invalid path {path:?}: {e}")))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn default_base_url() -> String {
    "https://pendulumedu.com".into()
}
fn default_listing_path() -> String {
    "/quiz/current-affairs".into()
}
fn default_login_path() -> String {
    "/login".into()
}
fn default_submit_path() -> String {
    "/quiz/quizanwers".into()
}
fn default_reveal_mode() -> RevealMode {
    RevealMode::Form
}
fn default_session_cookies() -> Vec<String> {
    vec!["PHPSESSID".into(), "pendulum_session".into()]
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".into()
}

/// `[credentials]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_email_env")]
    pub email_env: String,

    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            email_env: default_email_env(),
            password_env: default_password_env(),
        }
    }
}

fn default_email_env() -> String {
    "LOGIN_EMAIL".into()
}
fn default_password_env() -> String {
    "LOGIN_PASSWORD".into()
}

/// `[retry]` section: exponential backoff for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}

/// `[state]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Local JSON file holding processed identifiers.
    #[serde(default = "default_state_path")]
    pub local_path: PathBuf,

    /// Mirror state to the remote backend when it is configured.
    #[serde(default = "default_true")]
    pub remote: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            local_path: default_state_path(),
            remote: true,
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/scraped_urls.json")
}

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub local_path: PathBuf,

    #[serde(default = "default_true")]
    pub remote: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_path: default_session_path(),
            remote: true,
        }
    }
}

fn default_session_path() -> PathBuf {
    PathBuf::from("data/session.json")
}

/// `[remote]` section: GitHub Gist used as the remote JSON store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_api_base")]
    pub api_base: String,

    /// Env var holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Env var holding the gist id for processed state.
    #[serde(default = "default_state_gist_env")]
    pub state_gist_env: String,

    /// Env var holding the gist id for the session.
    #[serde(default = "default_session_gist_env")]
    pub session_gist_env: String,

    #[serde(default = "default_state_file_name")]
    pub state_file_name: String,

    #[serde(default = "default_session_file_name")]
    pub session_file_name: String,

    /// Upper bound on waiting for the last remote sync at shutdown.
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_remote_api_base(),
            token_env: default_token_env(),
            state_gist_env: default_state_gist_env(),
            session_gist_env: default_session_gist_env(),
            state_file_name: default_state_file_name(),
            session_file_name: default_session_file_name(),
            flush_timeout_secs: default_flush_timeout_secs(),
        }
    }
}

fn default_remote_api_base() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GIST_TOKEN".into()
}
fn default_state_gist_env() -> String {
    "GIST_ID".into()
}
fn default_session_gist_env() -> String {
    "SESSION_GIST_ID".into()
}
fn default_state_file_name() -> String {
    "scraped_urls.json".into()
}
fn default_session_file_name() -> String {
    "session.json".into()
}
fn default_flush_timeout_secs() -> u64 {
    10
}

/// `[translate]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_source_lang")]
    pub source_lang: String,

    #[serde(default = "default_target_lang")]
    pub target_lang: String,

    /// Strings passed through untouched (branding, URLs, handles).
    #[serde(default = "default_preserve")]
    pub preserve: Vec<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between questions, in ms.
    #[serde(default = "default_question_delay_ms")]
    pub question_delay_ms: u64,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            endpoint: default_translate_endpoint(),
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            preserve: default_preserve(),
            max_attempts: default_max_attempts(),
            question_delay_ms: default_question_delay_ms(),
        }
    }
}

impl TranslateConfig {
    pub fn question_delay(&self) -> Duration {
        Duration::from_millis(self.question_delay_ms)
    }
}

fn default_translate_endpoint() -> String {
    "https://translate.googleapis.com/translate_a/single".into()
}
fn default_source_lang() -> String {
    "en".into()
}
fn default_target_lang() -> String {
    "gu".into()
}
fn default_preserve() -> Vec<String> {
    vec![
        "CurrentAdda".into(),
        "https://t.me/currentadda".into(),
        "@currentadda".into(),
    ]
}
fn default_question_delay_ms() -> u64 {
    500
}

/// Output document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    Pdf,
    Html,
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Where rendered documents are kept after distribution.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_render_format")]
    pub format: RenderFormat,

    /// Headless browser used for HTML to PDF conversion.
    #[serde(default = "default_browser")]
    pub browser: String,

    #[serde(default = "default_render_timeout_secs")]
    pub timeout_secs: u64,

    /// Title printed on the cover of each document.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: default_render_format(),
            browser: default_browser(),
            timeout_secs: default_render_timeout_secs(),
            title: default_title(),
        }
    }
}

impl RenderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_render_format() -> RenderFormat {
    RenderFormat::Pdf
}
fn default_browser() -> String {
    "chromium".into()
}
fn default_render_timeout_secs() -> u64 {
    120
}
fn default_title() -> String {
    "Current Affairs Quiz".into()
}

/// `[telegram]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Lines appended to every caption.
    #[serde(default = "default_branding")]
    pub branding: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            bot_token_env: default_bot_token_env(),
            channel: default_channel(),
            max_upload_bytes: default_max_upload_bytes(),
            branding: default_branding(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}
fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".into()
}
fn default_channel() -> String {
    "@currentadda".into()
}
fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_branding() -> Vec<String> {
    vec![
        "📢 Channel: @currentadda".into(),
        "🔗 https://t.me/currentadda".into(),
    ]
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Items processed at once. 1 keeps listing order.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Stop starting new items after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            deadline_secs: None,
        }
    }
}

fn default_concurrency() -> usize {
    1
}

// ---------------------------------------------------------------------------
// Resolved secrets
// ---------------------------------------------------------------------------

/// Login credentials read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Remote store access resolved from the environment.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub api_base: String,
    pub token: String,
    pub gist_id: String,
    pub file_name: String,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn require_env(name: &str, what: &str) -> Result<String> {
    env_value(name).ok_or_else(|| {
        QuizRelayError::config(format!(
            "{what} not found. Set the {name} environment variable."
        ))
    })
}

impl AppConfig {
    /// Login credentials; both variables must be set.
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            email: require_env(&self.credentials.email_env, "login email")?,
            password: require_env(&self.credentials.password_env, "login password")?,
        })
    }

    pub fn bot_token(&self) -> Result<String> {
        require_env(&self.telegram.bot_token_env, "Telegram bot token")
    }

    /// Remote target for processed state, if enabled and both env vars are set.
    pub fn state_remote(&self) -> Option<RemoteTarget> {
        if !self.state.remote {
            return None;
        }
        self.remote_target(&self.remote.state_gist_env, &self.remote.state_file_name)
    }

    /// Remote target for the session, if enabled and both env vars are set.
    pub fn session_remote(&self) -> Option<RemoteTarget> {
        if !self.session.remote {
            return None;
        }
        self.remote_target(&self.remote.session_gist_env, &self.remote.session_file_name)
    }

    fn remote_target(&self, id_env: &str, file_name: &str) -> Option<RemoteTarget> {
        let token = env_value(&self.remote.token_env);
        let gist_id = env_value(id_env);
        match (token, gist_id) {
            (Some(token), Some(gist_id)) => Some(RemoteTarget {
                api_base: self.remote.api_base.clone(),
                token,
                gist_id,
                file_name: file_name.to_string(),
            }),
            _ => {
                tracing::info!(
                    token_env = %self.remote.token_env,
                    id_env,
                    "remote storage not configured, using local file only"
                );
                None
            }
        }
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        self.source.url(&self.source.listing_path)?;
        if self.run.concurrency == 0 {
            return Err(QuizRelayError::config("run.concurrency must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(QuizRelayError::config("retry.max_attempts must be at least 1"));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(QuizRelayError::config(format!(
                "retry.backoff_multiplier must be a finite number >= 1.0, got {multiplier}"
            )));
        }
        if self.translate.max_attempts == 0 {
            return Err(QuizRelayError::config(
                "translate.max_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.quizrelay/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| QuizRelayError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.quizrelay/quizrelay.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| QuizRelayError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| QuizRelayError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file, to `path` or the default location.
/// Returns the path to the created file.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| QuizRelayError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| QuizRelayError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| QuizRelayError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("LOGIN_EMAIL"));
        assert!(toml_str.contains("scraped_urls.json"));
        assert!(toml_str.contains("reveal_mode = \"form\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.telegram.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(parsed.translate.target_lang, "gu");
        assert_eq!(parsed.run.concurrency, 1);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[source]
base_url = "http://127.0.0.1:9000"
reveal_mode = "none"

[run]
concurrency = 4
deadline_secs = 600
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.source.reveal_mode, RevealMode::None);
        assert_eq!(config.source.login_path, "/login");
        assert_eq!(config.run.deadline_secs, Some(600));
        assert_eq!(config.state.local_path, PathBuf::from("data/scraped_urls.json"));
        assert_eq!(
            config.source.url("/quiz/current-affairs").expect("url").as_str(),
            "http://127.0.0.1:9000/quiz/current-affairs"
        );
    }

    #[test]
    fn missing_credentials_name_the_variable() {
        let mut config = AppConfig::default();
        // Unique names so other tests' env is not touched
        config.credentials.email_env = "QR_TEST_NONEXISTENT_EMAIL_4821".into();
        let err = config.credentials().unwrap_err();
        assert!(err.to_string().contains("QR_TEST_NONEXISTENT_EMAIL_4821"));
    }

    #[test]
    fn remote_disabled_without_env() {
        let mut config = AppConfig::default();
        config.remote.token_env = "QR_TEST_NONEXISTENT_TOKEN_4821".into();
        assert!(config.state_remote().is_none());

        config.state.remote = false;
        assert!(config.state_remote().is_none());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());
        config.run.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_backoff_multiplier() {
        for bad in [-1.0, 0.5, f64::NAN, f64::INFINITY] {
            let mut config = AppConfig::default();
            config.retry.backoff_multiplier = bad;
            assert!(config.validate().is_err(), "accepted {bad}");
        }

        let mut config = AppConfig::default();
        config.retry.backoff_multiplier = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn init_config_writes_loadable_file() {
        let dir = std::env::temp_dir().join(format!("qr-config-{}", uuid::Uuid::now_v7()));
        let path = dir.join("quizrelay.toml");
        let written = init_config(Some(&path)).expect("init");
        let loaded = load_config_from(&written).expect("load");
        assert_eq!(loaded.telegram.channel, "@currentadda");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
