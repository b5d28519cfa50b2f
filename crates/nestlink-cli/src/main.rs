//! Command-line entry point for the NestLink bridge.
//!
//! `nestlink server` answers SmartThings webhook calls; `nestlink pubsub`
//! forwards Nest device events to SmartThings. Both stop cleanly on SIGINT
//! or SIGTERM.

mod cli;
mod config;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nestlink_api::{router, serve, AppState, SchemaHandler};
use nestlink_devices::SdmClient;
use nestlink_events::{HttpCallbackSender, Pipeline, PubSubClient};
use nestlink_oauth::{OAuthClient, StateFile, TokenManager};
use tokio_util::sync::CancellationToken;

use crate::cli::{Args, Command};
use crate::config::AppConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::Version { json } = args.command {
        if json {
            println!("{}", serde_json::json!({ "name": "nestlink", "version": VERSION }));
        } else {
            println!("nestlink {}", VERSION);
        }
        return Ok(());
    }

    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_logging(&args.logging);
    match &args.command {
        Command::Server(server) => config.apply_server(server),
        Command::Pubsub(pubsub) => config.apply_pubsub(pubsub),
        Command::Version { .. } => {}
    }

    let _log_guard = logging::init(&config.logging)?;
    tracing::debug!(config = ?config, "Configuration loaded");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    match args.command {
        Command::Server(_) => run_server(&config, cancel).await,
        Command::Pubsub(_) => run_pubsub(&config, cancel).await,
        Command::Version { .. } => Ok(()),
    }
}

async fn run_server(config: &AppConfig, cancel: CancellationToken) -> Result<()> {
    config.require_server()?;

    let span = tracing::info_span!("server", project_id = %config.google.project_id);
    let sdm = Arc::new(SdmClient::new(config.sdm_config()));
    let oauth = OAuthClient::new(config.oauth_client_config());
    let handler = Arc::new(SchemaHandler::new(sdm, oauth, config.handler_config(), span));

    let server_config = config.server_config();
    let listener = tokio::net::TcpListener::bind(&server_config.listen)
        .await
        .with_context(|| format!("binding {}", server_config.listen))?;

    tracing::info!(version = VERSION, "Starting NestLink server");
    serve(listener, router(AppState { handler }), &server_config, cancel).await
}

async fn run_pubsub(config: &AppConfig, cancel: CancellationToken) -> Result<()> {
    config.require_pubsub()?;

    let debug_logging = logging::debug_enabled();
    if config.pubsub.log_messages && !debug_logging {
        tracing::warn!("Message logging requested but debug logging is disabled, ignoring");
    }
    let pipeline_config = config.pipeline_config(debug_logging);

    let span = tracing::info_span!("pubsub", subscription = %config.pubsub.subscription);
    let store = StateFile::new(&config.smartthings.oauth_state_file);
    let tokens = TokenManager::load(
        store,
        OAuthClient::new(config.oauth_client_config()),
        span.clone(),
    )
    .await
    .with_context(|| {
        format!(
            "loading OAuth state from {}; grant callback access first",
            config.smartthings.oauth_state_file.display()
        )
    })?;

    let feed = Arc::new(PubSubClient::new(config.pubsub_config()));
    let sender = Arc::new(HttpCallbackSender::new(config.smartthings.timeout));

    tracing::info!(version = VERSION, "Starting NestLink event forwarder");
    let stats = Pipeline::new(feed, Arc::new(tokens), sender, pipeline_config, span)
        .run(cancel)
        .await;

    tracing::info!(
        pulled = stats.pulled,
        forwarded = stats.forwarded,
        failed = stats.failed,
        "Event forwarder stopped"
    );
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
