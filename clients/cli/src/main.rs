//! Cipherpost CLI Client
//!
//! Command-line interface for end-to-end encrypted messaging through a
//! Cipherpost relay.

use clap::{Parser, Subcommand};
use cipherpost_client::{ChatSession, ClientConfig, MessageBody, RenderedMessage, SledLocalState};
use console::{style, Emoji};
use dialoguer::{Confirm, Password};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod config;
mod remote;

use remote::{HttpDirectory, RelayTransport};

static LOCK: Emoji<'_, '_> = Emoji("🔐 ", "");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
static SEND: Emoji<'_, '_> = Emoji("📤 ", "[SEND] ");
static RECV: Emoji<'_, '_> = Emoji("📥 ", "[RECV] ");
static KEY: Emoji<'_, '_> = Emoji("🔑 ", "[KEY] ");

type Session = ChatSession<HttpDirectory, RelayTransport>;

/// Cipherpost CLI - end-to-end encrypted messaging
#[derive(Parser)]
#[command(name = "cipherpost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new identity and generate its key pair
    Register {
        /// Username
        username: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "CIPHERPOST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log in to an existing identity
    Login {
        /// Username
        username: String,
        /// Password (prompted when omitted)
        #[arg(long, env = "CIPHERPOST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// List other identities and their presence
    Users,

    /// Send a message
    Send {
        /// Recipient username
        to: String,
        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Show the conversation with a user
    History {
        /// Partner username
        with: String,
    },

    /// Print incoming messages from a user as they arrive
    Listen {
        /// Partner username
        with: String,
    },

    /// Generate a new key pair and register its public key
    Rotate {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Delete all local state (session, keys and sent messages)
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let config = config::load_or_default(&config_path)?;
    let mut session = open_session(&config)?;

    match cli.command {
        Commands::Register { username, password } => {
            register(&mut session, &username, password).await?;
        }
        Commands::Login { username, password } => {
            login(&mut session, &username, password).await?;
        }
        Commands::Users => {
            resume(&mut session)?;
            list_users(&session).await?;
        }
        Commands::Send { to, message } => {
            resume(&mut session)?;
            send_message(&mut session, &to, &message.join(" ")).await?;
        }
        Commands::History { with } => {
            resume(&mut session)?;
            show_history(&mut session, &with).await?;
        }
        Commands::Listen { with } => {
            resume(&mut session)?;
            listen(&mut session, &with, &config).await?;
        }
        Commands::Rotate { force } => {
            resume(&mut session)?;
            rotate(&mut session, force).await?;
        }
        Commands::Reset { force } => {
            reset(&mut session, force)?;
        }
    }

    Ok(())
}

fn open_session(config: &ClientConfig) -> anyhow::Result<Session> {
    let data_dir = config::data_dir(config);
    std::fs::create_dir_all(&data_dir)?;
    let state = Arc::new(SledLocalState::open(&data_dir)?);

    let directory = HttpDirectory::new(config)?;
    let transport = RelayTransport::new(directory.clone(), config.realtime_url.clone());
    Ok(ChatSession::new(directory, transport, state))
}

fn resume(session: &mut Session) -> anyhow::Result<()> {
    session
        .resume()?
        .ok_or_else(|| anyhow::anyhow!("Not logged in. Run 'cipherpost login <username>' first."))?;
    Ok(())
}

fn password(given: Option<String>, confirm: bool) -> anyhow::Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    let prompt = Password::new().with_prompt("Password");
    let password = if confirm {
        prompt
            .with_confirmation("Confirm password", "Passwords don't match")
            .interact()?
    } else {
        prompt.interact()?
    };
    Ok(password)
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn register(
    session: &mut Session,
    username: &str,
    given: Option<String>,
) -> anyhow::Result<()> {
    let password = password(given, true)?;

    println!("{} Registering {}...", LOCK, style(username).cyan());
    let pb = spinner("Generating RSA key pair...");
    let result = session.register(username, &password).await;
    pb.finish_and_clear();
    let auth = result?;

    println!("{} Registered!", CHECK);
    println!();
    println!("  {} User ID:  {}", KEY, style(auth.user_id).cyan());
    println!("  {} Username: {}", KEY, style(&auth.username).green());
    println!();
    println!(
        "{}",
        style("Your private key is stored only on this machine.").dim()
    );
    Ok(())
}

async fn login(session: &mut Session, username: &str, given: Option<String>) -> anyhow::Result<()> {
    let password = password(given, false)?;
    let auth = session.login(username, &password).await?;

    println!("{} Logged in as {}", CHECK, style(&auth.username).green());
    if !session.has_private_key() {
        println!(
            "{} {}",
            CROSS,
            style("No private key for this identity on this machine; incoming messages cannot be decrypted.")
                .yellow()
        );
    }
    Ok(())
}

async fn list_users(session: &Session) -> anyhow::Result<()> {
    let users = session.users().await?;
    if users.is_empty() {
        println!("  (No other users yet)");
        return Ok(());
    }

    println!("Users:");
    for user in users {
        println!(
            "  {:>4}  {:<24} {}",
            user.id,
            style(&user.username).cyan(),
            style(user.status).dim()
        );
    }
    Ok(())
}

fn print_message(session: &Session, message: &RenderedMessage) {
    let time = message
        .timestamp
        .as_datetime()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    let (icon, name) = if message.outgoing {
        (SEND, "you".to_string())
    } else {
        let name = session
            .partner()
            .map(|p| p.username.clone())
            .unwrap_or_else(|| message.sender_id.to_string());
        (RECV, name)
    };
    let text = match &message.body {
        MessageBody::Plaintext(text) => style(text.clone()),
        other => style(other.display_text().to_string()).red(),
    };
    println!("{}{} {}: {}", icon, style(time).dim(), style(name).bold(), text);
}

async fn send_message(session: &mut Session, to: &str, text: &str) -> anyhow::Result<()> {
    session.resolve_partner(to).await?;
    let message = session.send(text).await?;
    print_message(session, &message);
    Ok(())
}

async fn show_history(session: &mut Session, with: &str) -> anyhow::Result<()> {
    session.resolve_partner(with).await?;
    let history = session.history().await?;
    if history.is_empty() {
        println!("  (No messages yet)");
    }
    for message in &history {
        print_message(session, message);
    }
    Ok(())
}

async fn listen(session: &mut Session, with: &str, config: &ClientConfig) -> anyhow::Result<()> {
    let partner = session.resolve_partner(with).await?;
    let me = session
        .auth()
        .map(|auth| auth.user_id)
        .ok_or_else(|| anyhow::anyhow!("Not logged in"))?;

    let events = remote::subscribe(&config.realtime_url, me).await?;
    println!(
        "{} Listening for messages with {} (Ctrl-C to stop)",
        RECV,
        style(&partner.username).cyan()
    );

    let session: &Session = session;
    let mut incoming = Box::pin(session.incoming(events));
    loop {
        tokio::select! {
            message = incoming.next() => match message {
                Some(message) => print_message(session, &message),
                None => {
                    println!("{} Connection to relay lost", CROSS);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn rotate(session: &mut Session, force: bool) -> anyhow::Result<()> {
    if !force {
        let confirm = Confirm::new()
            .with_prompt("Rotate keys? Messages sent to your old key become unreadable.")
            .default(false)
            .interact()?;
        if !confirm {
            println!("{} Cancelled", CROSS);
            return Ok(());
        }
    }

    let pb = spinner("Generating RSA key pair...");
    let result = session.rotate_keys().await;
    pb.finish_and_clear();
    result?;

    println!("{} Keys rotated", CHECK);
    Ok(())
}

fn reset(session: &mut Session, force: bool) -> anyhow::Result<()> {
    if !force {
        let confirm = Confirm::new()
            .with_prompt("Delete your local session, private keys and sent messages?")
            .default(false)
            .interact()?;
        if !confirm {
            println!("{} Cancelled", CROSS);
            return Ok(());
        }
    }

    session.reset()?;
    println!("{} Local state cleared", CHECK);
    Ok(())
}
