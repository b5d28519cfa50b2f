//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use nestlink_core::config::env_vars;

use crate::config::LogFormat;

/// SmartThings Schema connector for Google Nest thermostats.
#[derive(Parser, Debug)]
#[command(name = "nestlink")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML). Defaults to ./config.toml when present.
    #[arg(short, long, global = true, env = env_vars::CONFIG_FILE)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the ST-Schema webhook and the OAuth redirect.
    Server(ServerArgs),
    /// Forward device events from Pub/Sub to SmartThings.
    Pubsub(PubSubArgs),
    /// Print the version and exit.
    Version {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(ClapArgs, Debug, Default)]
pub struct LoggingArgs {
    /// Log level or filter directive, overridden by RUST_LOG.
    #[arg(long, global = true, env = env_vars::LOG_LEVEL)]
    pub log_level: Option<String>,

    #[arg(long, global = true, value_enum, env = env_vars::LOG_FORMAT)]
    pub log_format: Option<LogFormat>,

    /// `stderr`, `stdout` or a file path.
    #[arg(long, global = true, env = env_vars::LOG_LOCATION)]
    pub log_location: Option<String>,
}

/// Settings shared by both services.
#[derive(ClapArgs, Debug, Default)]
pub struct CommonArgs {
    /// Google Device Access project id.
    #[arg(long, env = env_vars::GOOGLE_PROJECT_ID)]
    pub project_id: Option<String>,

    /// SmartThings connector client secret.
    #[arg(long, env = env_vars::ST_CLIENT_SECRET, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Where the callback OAuth state is kept.
    #[arg(long, env = env_vars::ST_OAUTH_STATE_FILE)]
    pub oauth_state_file: Option<PathBuf>,

    /// Timeout in seconds for SmartThings token exchanges and callbacks.
    #[arg(long)]
    pub smartthings_timeout: Option<u64>,
}

#[derive(ClapArgs, Debug, Default)]
pub struct ServerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Listen address.
    #[arg(short, long, env = env_vars::LISTEN)]
    pub listen: Option<String>,

    /// Log webhook bodies at debug level.
    #[arg(long)]
    pub log_requests: bool,
}

#[derive(ClapArgs, Debug, Default)]
pub struct PubSubArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// GCP project that owns the subscription.
    #[arg(long, env = env_vars::PUBSUB_PROJECT_ID)]
    pub pubsub_project: Option<String>,

    /// Pub/Sub subscription id.
    #[arg(long, env = env_vars::PUBSUB_SUBSCRIPTION)]
    pub subscription: Option<String>,

    /// Fixed bearer token for Pub/Sub.
    #[arg(long, env = env_vars::PUBSUB_TOKEN, hide_env_values = true)]
    pub pubsub_token: Option<String>,

    /// File holding the Pub/Sub bearer token, re-read on every call.
    #[arg(long, env = env_vars::PUBSUB_TOKEN_FILE)]
    pub pubsub_token_file: Option<PathBuf>,

    /// Service account key file used to mint Pub/Sub tokens.
    #[arg(long, env = env_vars::PUBSUB_CREDENTIALS_FILE)]
    pub pubsub_credentials_file: Option<PathBuf>,

    /// Maximum message age in seconds; older events are acked and dropped.
    #[arg(long)]
    pub pubsub_maxage: Option<u64>,

    /// Number of concurrent callback workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log every received message at debug level.
    #[arg(long)]
    pub log_messages: bool,
}
