//! Application configuration.
//!
//! Sources, lowest priority first: built-in defaults, the TOML file,
//! `NESTLINK_*` environment variables, command-line flags. Environment
//! variables and flags are merged by clap, so a flag beats its variable.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:4343"
//!
//! [smartthings]
//! client-secret = "..."
//! oauth-state-file = "st-oauth.json"
//!
//! [google]
//! project-id = "device-access-project"
//!
//! [pubsub]
//! project-id = "gcp-project"
//! subscription = "nest-events"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! location = "/var/log/nestlink.log"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nestlink_api::{HandlerConfig, ServerConfig};
use nestlink_core::config::{devices, endpoints, events, oauth, server};
use nestlink_devices::SdmClientConfig;
use nestlink_events::{FeedTokenSource, PipelineConfig, PubSubConfig};
use nestlink_oauth::OAuthClientConfig;
use serde::{Deserialize, Serialize};

use crate::cli::{CommonArgs, LoggingArgs, PubSubArgs, ServerArgs};

const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub smartthings: SmartThingsSection,
    pub google: GoogleSection,
    pub pubsub: PubSubSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerSection {
    pub listen: String,
    /// Seconds to wait for open requests on shutdown
    pub shutdown_timeout: u64,
    /// Log webhook request and response bodies at debug level
    pub log_requests: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: server::DEFAULT_LISTEN.to_string(),
            shutdown_timeout: server::DEFAULT_SHUTDOWN_SECS,
            log_requests: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SmartThingsSection {
    pub client_secret: String,
    pub oauth_state_file: PathBuf,
    /// Seconds, for token exchanges and state callbacks
    pub timeout: u64,
}

impl Default for SmartThingsSection {
    fn default() -> Self {
        Self {
            client_secret: String::new(),
            oauth_state_file: PathBuf::from(server::DEFAULT_OAUTH_STATE_FILE),
            timeout: oauth::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for SmartThingsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartThingsSection")
            .field("client_secret", &nestlink_core::fingerprint(&self.client_secret))
            .field("oauth_state_file", &self.oauth_state_file)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GoogleSection {
    /// Device Access project id
    pub project_id: String,
    pub api_url: String,
    /// Seconds per device API call
    pub timeout: u64,
}

impl Default for GoogleSection {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_url: endpoints::SDM_API.to_string(),
            timeout: devices::DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PubSubSection {
    /// GCP project owning the subscription
    pub project_id: String,
    pub subscription: String,
    pub api_url: String,
    /// Fixed bearer token for the feed
    pub token: Option<String>,
    /// File holding the feed's bearer token
    pub token_file: Option<PathBuf>,
    /// Service account key file, exchanged for feed tokens
    pub credentials_file: Option<PathBuf>,
    /// Metadata server token URL, used when no other credential is set
    pub metadata_url: String,
    /// Seconds
    pub max_message_age: u64,
    pub workers: usize,
    pub log_messages: bool,
}

impl Default for PubSubSection {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            subscription: String::new(),
            api_url: endpoints::PUBSUB_API.to_string(),
            token: None,
            token_file: None,
            credentials_file: None,
            metadata_url: endpoints::METADATA_TOKEN.to_string(),
            max_message_age: events::DEFAULT_MAX_AGE_SECS,
            workers: events::DEFAULT_WORKERS,
            log_messages: false,
        }
    }
}

impl std::fmt::Debug for PubSubSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubSection")
            .field("project_id", &self.project_id)
            .field("subscription", &self.subscription)
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_deref().map(nestlink_core::fingerprint))
            .field("token_file", &self.token_file)
            .field("credentials_file", &self.credentials_file)
            .field("metadata_url", &self.metadata_url)
            .field("max_message_age", &self.max_message_age)
            .field("workers", &self.workers)
            .field("log_messages", &self.log_messages)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
    /// `stderr`, `stdout` or a file path
    pub location: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            location: "stderr".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with the config file.
    ///
    /// Without an explicit path, `./config.toml` is read when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_logging(&mut self, args: &LoggingArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = args.log_format {
            self.logging.format = format;
        }
        if let Some(location) = &args.log_location {
            self.logging.location = location.clone();
        }
    }

    pub fn apply_common(&mut self, args: &CommonArgs) {
        if let Some(project_id) = &args.project_id {
            self.google.project_id = project_id.clone();
        }
        if let Some(secret) = &args.client_secret {
            self.smartthings.client_secret = secret.clone();
        }
        if let Some(path) = &args.oauth_state_file {
            self.smartthings.oauth_state_file = path.clone();
        }
        if let Some(timeout) = args.smartthings_timeout {
            self.smartthings.timeout = timeout;
        }
    }

    pub fn apply_server(&mut self, args: &ServerArgs) {
        self.apply_common(&args.common);
        if let Some(listen) = &args.listen {
            self.server.listen = listen.clone();
        }
        if args.log_requests {
            self.server.log_requests = true;
        }
    }

    pub fn apply_pubsub(&mut self, args: &PubSubArgs) {
        self.apply_common(&args.common);
        if let Some(project_id) = &args.pubsub_project {
            self.pubsub.project_id = project_id.clone();
        }
        if let Some(subscription) = &args.subscription {
            self.pubsub.subscription = subscription.clone();
        }
        if let Some(token) = &args.pubsub_token {
            self.pubsub.token = Some(token.clone());
        }
        if let Some(path) = &args.pubsub_token_file {
            self.pubsub.token_file = Some(path.clone());
        }
        if let Some(path) = &args.pubsub_credentials_file {
            self.pubsub.credentials_file = Some(path.clone());
        }
        if let Some(max_age) = args.pubsub_maxage {
            self.pubsub.max_message_age = max_age;
        }
        if let Some(workers) = args.workers {
            self.pubsub.workers = workers;
        }
        if args.log_messages {
            self.pubsub.log_messages = true;
        }
    }

    /// Keys the `server` command cannot run without.
    pub fn require_server(&self) -> Result<()> {
        require(&[
            ("google.project-id", &self.google.project_id),
            ("smartthings.client-secret", &self.smartthings.client_secret),
        ])
    }

    /// Keys the `pubsub` command cannot run without.
    pub fn require_pubsub(&self) -> Result<()> {
        require(&[
            ("google.project-id", &self.google.project_id),
            ("smartthings.client-secret", &self.smartthings.client_secret),
            ("pubsub.project-id", &self.pubsub.project_id),
            ("pubsub.subscription", &self.pubsub.subscription),
        ])
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen: self.server.listen.clone(),
            shutdown_timeout: self.server.shutdown_timeout,
        }
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            project_id: self.google.project_id.clone(),
            oauth_state_file: self.smartthings.oauth_state_file.clone(),
            log_requests: self.server.log_requests,
        }
    }

    pub fn sdm_config(&self) -> SdmClientConfig {
        SdmClientConfig {
            project_id: self.google.project_id.clone(),
            base_url: self.google.api_url.clone(),
            timeout: self.google.timeout,
        }
    }

    pub fn oauth_client_config(&self) -> OAuthClientConfig {
        OAuthClientConfig {
            client_secret: self.smartthings.client_secret.clone(),
            timeout: self.smartthings.timeout,
        }
    }

    pub fn pubsub_config(&self) -> PubSubConfig {
        let pubsub = &self.pubsub;
        let token = if let Some(token) = &pubsub.token {
            FeedTokenSource::Static { token: token.clone() }
        } else if let Some(path) = &pubsub.token_file {
            FeedTokenSource::File { path: path.clone() }
        } else if let Some(path) = &pubsub.credentials_file {
            FeedTokenSource::ServiceAccount { path: path.clone() }
        } else {
            FeedTokenSource::Metadata {
                url: pubsub.metadata_url.clone(),
            }
        };

        let mut config = PubSubConfig::new(&self.pubsub.project_id, &self.pubsub.subscription);
        config.base_url = self.pubsub.api_url.clone();
        config.token = token;
        config
    }

    /// Message logging only takes effect when `debug_logging` is on.
    pub fn pipeline_config(&self, debug_logging: bool) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.google.project_id);
        config.max_message_age = self.pubsub.max_message_age;
        config.workers = self.pubsub.workers;
        config.log_messages = self.pubsub.log_messages && debug_logging;
        config
    }
}

fn require(items: &[(&str, &String)]) -> Result<()> {
    let missing: Vec<String> = items
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| format!("`{}`", key))
        .collect();

    if !missing.is_empty() {
        bail!("required config item(s) {} not set", missing.join(", "));
    }
    Ok(())
}
