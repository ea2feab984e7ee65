//! Fitcoach CLI
//!
//! Command-line client for the Fitcoach authentication session.
//!
//! # Usage
//!
//! ```bash
//! # Register and confirm a new account
//! fitcoach sign-up ada@example.com --password 'correct horse' --first-name Ada
//! fitcoach confirm ada@example.com 123456
//!
//! # Sign in and inspect the session
//! fitcoach sign-in ada@example.com --password 'correct horse'
//! fitcoach status --format json
//!
//! # Keep the session fresh until Ctrl+C
//! fitcoach watch
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use fitcoach_session::{
    FileStore, Profile, ProfileUpdate, SessionEvent, SessionManager,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod config;

#[derive(Parser)]
#[command(name = "fitcoach")]
#[command(about = "Sign in to Fitcoach and manage your session")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "FITCOACH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    SignIn {
        email: String,

        #[arg(short, long, env = "FITCOACH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Register a new account
    SignUp {
        email: String,

        #[arg(short, long, env = "FITCOACH_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,
    },

    /// Confirm a registration with the emailed code
    Confirm {
        email: String,

        code: String,
    },

    /// Sign out and wipe all local state
    SignOut,

    /// Show who is signed in
    Status {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the signed-in user's profile
    Profile {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Update profile fields
    UpdateProfile {
        /// Field assignment; the value is parsed as JSON, or taken as a string
        #[arg(long = "set", value_name = "KEY=VALUE", required = true, value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Keep the session refreshed and print session events until Ctrl+C
    Watch,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    init_logging(&config.log_level, cli.verbose);
    info!("Loaded configuration from {:?}", config.config_path);

    let store = FileStore::open(config.store_path())
        .with_context(|| format!("Failed to open store at {:?}", config.store_path()))?;
    let manager = SessionManager::from_config(&config.session, Arc::new(store))
        .context("Failed to set up session")?;

    let result = match cli.command {
        Commands::SignIn { email, password } => sign_in(&manager, &email, &password).await,
        Commands::SignUp {
            email,
            password,
            first_name,
            last_name,
        } => sign_up(&manager, &email, &password, first_name, last_name).await,
        Commands::Confirm { email, code } => confirm(&manager, &email, &code).await,
        Commands::SignOut => sign_out(&manager).await,
        Commands::Status { format } => status(&manager, format).await,
        Commands::Profile { format } => profile(&manager, format).await,
        Commands::UpdateProfile { fields } => update_profile(&manager, fields).await,
        Commands::Watch => watch(&manager).await,
    };

    manager.shutdown();
    result
}

fn init_logging(default_level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse `key=value`, reading the value as JSON when possible.
fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty field name in {:?}", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

async fn require_session(manager: &SessionManager) -> Result<()> {
    manager.check_auth_state().await;
    if !manager.is_authenticated() {
        bail!("Not signed in. Run `fitcoach sign-in <email>` first.");
    }
    Ok(())
}

async fn sign_in(manager: &SessionManager, email: &str, password: &str) -> Result<()> {
    manager.sign_in(email, password).await?;

    if let Some(user) = manager.user() {
        println!("Signed in as {} ({})", user.email, user.user_id);
    }
    if manager.profile().is_none() {
        println!("No profile yet. Use `fitcoach update-profile` to create one.");
    }
    Ok(())
}

async fn sign_up(
    manager: &SessionManager,
    email: &str,
    password: &str,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Result<()> {
    manager
        .sign_up(email, password, first_name.as_deref(), last_name.as_deref())
        .await?;
    println!("Account created for {}", email);
    println!("Check your email for a confirmation code, then run `fitcoach confirm`.");
    Ok(())
}

async fn confirm(manager: &SessionManager, email: &str, code: &str) -> Result<()> {
    manager.confirm_sign_up(email, code).await?;
    println!("Account {} confirmed. You can now sign in.", email);
    Ok(())
}

async fn sign_out(manager: &SessionManager) -> Result<()> {
    match manager.sign_out().await {
        Ok(()) => {
            println!("Signed out");
            Ok(())
        }
        Err(e) => {
            println!("Signed out locally");
            Err(e.into())
        }
    }
}

async fn status(manager: &SessionManager, format: OutputFormat) -> Result<()> {
    manager.check_auth_state().await;
    let state = manager.snapshot();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        OutputFormat::Text => match state.user() {
            Some(user) => {
                println!("Signed in as {}", user.email);
                println!("  User ID:    {}", user.user_id);
                println!("  Session:    {}", user.session_id);
                println!("  Since:      {}", user.established_at.to_rfc3339());
                println!(
                    "  Profile:    {}",
                    if state.profile().is_some() { "loaded" } else { "none" }
                );
            }
            None => println!("Not signed in"),
        },
    }
    Ok(())
}

async fn profile(manager: &SessionManager, format: OutputFormat) -> Result<()> {
    require_session(manager).await?;

    let Some(profile) = manager.profile() else {
        println!("No profile found");
        return Ok(());
    };
    print_profile(&profile, format)
}

async fn update_profile(manager: &SessionManager, fields: Vec<(String, Value)>) -> Result<()> {
    require_session(manager).await?;

    let update = fields
        .into_iter()
        .fold(ProfileUpdate::new(), |update, (key, value)| update.set(key, value));
    let profile = manager.update_profile(update).await?;

    println!("Profile updated");
    print_profile(&profile, OutputFormat::Text)
}

fn print_profile(profile: &Profile, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(profile)?),
        OutputFormat::Text => {
            if let Value::Object(fields) = serde_json::to_value(profile)? {
                for (key, value) in fields {
                    match value {
                        Value::String(s) => println!("  {}: {}", key, s),
                        other => println!("  {}: {}", key, other),
                    }
                }
            }
        }
    }
    Ok(())
}

async fn watch(manager: &SessionManager) -> Result<()> {
    let mut events = manager.events();
    require_session(manager).await?;

    if let Some(user) = manager.user() {
        println!("Watching session for {}. Press Ctrl+C to stop.", user.email);
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Invalidated { user_id }) => {
                    println!("Session for {} expired. Sign in again.", user_id);
                    break;
                }
                Ok(event) => println!("{:?}", event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed session events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}
