//! Application configuration for KeywordKit.
//!
//! User config lives at `~/.keywordkit/keywordkit.toml`.
//! Environment variables override config file values, which override defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{KeywordKitError, Result};
use crate::types::TopicTable;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "keywordkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".keywordkit";

// ---------------------------------------------------------------------------
// Config structs (matching keywordkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server and link settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Report rendering settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Run-record store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Classifier vocabulary, in declaration order.
    #[serde(default)]
    pub topics: TopicTable,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public base URL used to build download links.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Interface to bind.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name of the env var holding the download secret (never store the secret itself).
    #[serde(default = "default_download_token_env")]
    pub download_token_env: String,

    /// Maximum pipeline runs in flight.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum queued jobs before submissions are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Name of the env var holding the chat platform's request signing secret.
    #[serde(default = "default_signing_secret_env")]
    pub signing_secret_env: String,

    /// Name of the env var holding the bot token. Unset means results go
    /// only to the per-command `response_url`.
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Web API base URL for bot messages.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Hosts a command's `response_url` may point at.
    #[serde(default = "default_response_url_hosts")]
    pub response_url_hosts: Vec<String>,

    /// Signed requests older than this many seconds are rejected.
    #[serde(default = "default_max_request_age_secs")]
    pub max_request_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bind: default_bind(),
            port: default_port(),
            download_token_env: default_download_token_env(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            signing_secret_env: default_signing_secret_env(),
            bot_token_env: default_bot_token_env(),
            api_url: default_api_url(),
            response_url_hosts: default_response_url_hosts(),
            max_request_age_secs: default_max_request_age_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_download_token_env() -> String {
    "DOWNLOAD_TOKEN".into()
}
fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    64
}
fn default_signing_secret_env() -> String {
    "SLACK_SIGNING_SECRET".into()
}
fn default_bot_token_env() -> String {
    "SLACK_BOT_TOKEN".into()
}
fn default_api_url() -> String {
    "https://slack.com/api".into()
}
fn default_response_url_hosts() -> Vec<String> {
    vec!["hooks.slack.com".into()]
}
fn default_max_request_age_secs() -> u64 {
    300
}

/// `[report]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory rendered PDFs are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "/tmp/reports".into()
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Seconds a batch record stays retrievable. `0` keeps records forever.
    #[serde(default)]
    pub ttl_secs: u64,
}

// ---------------------------------------------------------------------------
// Server settings (runtime, resolved from config + environment)
// ---------------------------------------------------------------------------

/// Secrets read from the environment. Never serialized; `Debug` redacts them.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Shared secret required by the download endpoint.
    pub download_token: String,
    /// Key for verifying signed platform requests.
    pub signing_secret: String,
    /// Bot token for posting into channels.
    pub bot_token: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("download_token", &REDACTED)
            .field("signing_secret", &REDACTED)
            .field("bot_token", &self.bot_token.as_ref().map(|_| REDACTED))
            .finish()
    }
}

const REDACTED: &str = "<redacted>";

/// Validated runtime settings for `serve`.
#[derive(Clone)]
pub struct ServerSettings {
    /// Base URL without a trailing slash.
    pub base_url: Url,
    /// Shared secret required by the download endpoint.
    pub download_token: String,
    pub signing_secret: String,
    pub bot_token: Option<String>,
    pub api_url: Url,
    pub response_url_hosts: Vec<String>,
    pub max_request_age: Duration,
    pub output_dir: PathBuf,
    pub addr: SocketAddr,
    pub workers: usize,
    pub queue_capacity: usize,
    /// `None` disables eviction.
    pub ttl: Option<Duration>,
}

impl std::fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSettings")
            .field("base_url", &self.base_url.as_str())
            .field("download_token", &REDACTED)
            .field("signing_secret", &REDACTED)
            .field("bot_token", &self.bot_token.as_ref().map(|_| REDACTED))
            .field("api_url", &self.api_url.as_str())
            .field("response_url_hosts", &self.response_url_hosts)
            .field("max_request_age", &self.max_request_age)
            .field("output_dir", &self.output_dir)
            .field("addr", &self.addr)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ServerSettings {
    /// Resolve and validate settings from a loaded config and its secrets.
    pub fn from_config(config: &AppConfig, secrets: Secrets) -> Result<Self> {
        let base_url = Url::parse(config.server.base_url.trim_end_matches('/')).map_err(|e| {
            KeywordKitError::config(format!(
                "invalid base_url '{}': {e}",
                config.server.base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(KeywordKitError::config(format!(
                "base_url '{}' cannot carry a path",
                config.server.base_url
            )));
        }

        let api_url = Url::parse(config.server.api_url.trim_end_matches('/')).map_err(|e| {
            KeywordKitError::config(format!("invalid api_url '{}': {e}", config.server.api_url))
        })?;

        let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
            .parse()
            .map_err(|e| {
                KeywordKitError::config(format!(
                    "invalid bind address '{}:{}': {e}",
                    config.server.bind, config.server.port
                ))
            })?;

        if config.server.workers == 0 {
            return Err(KeywordKitError::config("server.workers must be at least 1"));
        }
        if config.server.queue_capacity == 0 {
            return Err(KeywordKitError::config(
                "server.queue_capacity must be at least 1",
            ));
        }
        if secrets.signing_secret.is_empty() {
            return Err(KeywordKitError::config("signing secret must not be empty"));
        }

        Ok(Self {
            base_url,
            download_token: secrets.download_token,
            signing_secret: secrets.signing_secret,
            bot_token: secrets.bot_token.filter(|t| !t.is_empty()),
            api_url,
            response_url_hosts: config
                .server
                .response_url_hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            max_request_age: Duration::from_secs(config.server.max_request_age_secs),
            output_dir: PathBuf::from(&config.report.output_dir),
            addr,
            workers: config.server.workers,
            queue_capacity: config.server.queue_capacity,
            ttl: (config.store.ttl_secs > 0).then(|| Duration::from_secs(config.store.ttl_secs)),
        })
    }

    /// Link a requester can use to fetch a batch's report. The token is
    /// form-encoded so any secret survives the round trip.
    pub fn download_url(&self, batch_id: &crate::BatchId) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("download")
                .push(&batch_id.to_string());
        }
        url.query_pairs_mut().append_pair("token", &self.download_token);
        url.into()
    }

    /// Whether `response_url` is an https URL on an allowed host.
    pub fn accepts_response_url(&self, response_url: &str) -> bool {
        let Ok(url) = Url::parse(response_url) else {
            return false;
        };
        url.scheme() == "https"
            && url
                .host_str()
                .is_some_and(|host| self.response_url_hosts.iter().any(|h| h == host))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.keywordkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KeywordKitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.keywordkit/keywordkit.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| KeywordKitError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        KeywordKitError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KeywordKitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KeywordKitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KeywordKitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Apply `BASE_URL`, `OUTPUT_DIR` and `PORT` from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

fn apply_overrides_from(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(base_url) = lookup("BASE_URL").filter(|v| !v.is_empty()) {
        config.server.base_url = base_url;
    }
    if let Some(output_dir) = lookup("OUTPUT_DIR").filter(|v| !v.is_empty()) {
        config.report.output_dir = output_dir;
    }
    if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
        config.server.port = port
            .parse()
            .map_err(|e| KeywordKitError::config(format!("invalid PORT '{port}': {e}")))?;
    }
    Ok(())
}

/// Read the download secret from the env var named in the config.
pub fn resolve_download_token(config: &AppConfig) -> Result<String> {
    required_env(&config.server.download_token_env, "download token")
}

/// Read every secret `serve` needs. The bot token is optional.
pub fn resolve_secrets(config: &AppConfig) -> Result<Secrets> {
    Ok(Secrets {
        download_token: resolve_download_token(config)?,
        signing_secret: required_env(&config.server.signing_secret_env, "signing secret")?,
        bot_token: std::env::var(&config.server.bot_token_env)
            .ok()
            .filter(|v| !v.is_empty()),
    })
}

fn required_env(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(KeywordKitError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}
