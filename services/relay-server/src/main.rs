//! Cipherpost relay server
//!
//! Serves the directory HTTP API and the realtime WebSocket channel over one
//! shared relay.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand};
use cipherpost_relay::{DeliveryPolicy, RelayServer, RelayServerConfig, StorageBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod error;
mod realtime;

/// Relay server CLI arguments
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Cipherpost relay: directory API and realtime channel")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    http_address: Option<String>,

    /// Realtime (WebSocket) listen address
    #[arg(long)]
    realtime_address: Option<String>,

    /// Sled database path
    #[arg(short, long)]
    storage_path: Option<String>,

    /// Keep all state in memory
    #[arg(long, conflicts_with = "storage_path")]
    in_memory: bool,

    /// Secret used to sign bearer tokens
    #[arg(long, env = "CIPHERPOST_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// Deliver envelopes only to their sender and receiver
    #[arg(long)]
    participants_only: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the relay (default)
    Serve,
    /// Print identity and envelope counts
    Check,
    /// Delete every identity and envelope
    Purge,
}

/// Application state
pub struct AppState {
    pub server: Arc<RelayServer>,
}

fn load_config(args: &Args) -> anyhow::Result<RelayServerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => RelayServerConfig::default(),
    };

    if let Some(address) = &args.http_address {
        config.http_address = address.clone();
    }
    if let Some(address) = &args.realtime_address {
        config.realtime_address = address.clone();
    }
    if let Some(path) = &args.storage_path {
        config.storage = StorageBackend::Sled { path: path.clone() };
    }
    if args.in_memory {
        config.storage = StorageBackend::Memory;
    }
    if let Some(secret) = &args.token_secret {
        config.token_secret = secret.clone();
    }
    if args.participants_only {
        config.delivery_policy = DeliveryPolicy::Participants;
    }
    Ok(config)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    let config = load_config(&args)?;
    let server = Arc::new(RelayServer::new(config).context("starting relay")?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Check => {
            let stats = server.stats()?;
            println!("identities: {}", stats.identity_count);
            println!("envelopes:  {}", stats.envelope_count);
            return Ok(());
        }
        Command::Purge => {
            server.purge()?;
            server.shutdown()?;
            println!("Database cleared.");
            return Ok(());
        }
        Command::Serve => {}
    }

    let http_address = server.config().http_address.clone();
    let listener = TcpListener::bind(&server.config().realtime_address)
        .await
        .with_context(|| format!("binding {}", server.config().realtime_address))?;
    let mut realtime = tokio::spawn(realtime::serve(listener, server.clone()));

    info!(address = %http_address, "Starting HTTP API");
    let app_state = web::Data::new(AppState {
        server: server.clone(),
    });

    let http = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())
            .configure(api::configure)
    })
    .bind(http_address.as_str())?
    .run();
    let http_handle = http.handle();
    let mut http = actix_web::rt::spawn(http);

    // Either surface going down takes the whole relay with it
    let outcome = tokio::select! {
        joined = &mut http => match joined {
            Ok(result) => result.context("HTTP server failed"),
            Err(e) => Err(anyhow::Error::new(e).context("HTTP server task aborted")),
        },
        joined = &mut realtime => {
            let err = realtime_exit(joined);
            error!(error = %err, "Realtime channel stopped, shutting down");
            http_handle.stop(true).await;
            Err(err)
        }
    };

    realtime.abort();
    if let Err(e) = server.shutdown() {
        error!(error = %e, "Failed to flush storage on shutdown");
    }
    outcome
}

/// Error describing why the realtime task ended
fn realtime_exit(joined: Result<anyhow::Result<()>, JoinError>) -> anyhow::Error {
    match joined {
        Ok(Ok(())) => anyhow::anyhow!("realtime channel exited"),
        Ok(Err(e)) => e.context("realtime channel failed"),
        Err(e) => anyhow::Error::new(e).context("realtime task aborted"),
    }
}
