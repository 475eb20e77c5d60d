//! Leasehold - command line access to the rental marketplace API.
//!
//! Signs in, keeps the token pair in the local stores and issues
//! authenticated requests through the shared credentialed client.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leasehold_core::auth::{CookieJar, CredentialStore, FileStore, KeyringStore, SyncedStore};
use leasehold_core::navigation::{home_route, Navigator, LOGIN_ROUTE};
use leasehold_core::models::Registration;
use leasehold_core::{ApiClient, Config, Role};

// ============================================================================
// Constants
// ============================================================================

/// Durable credential file inside the data directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Cookie jar file inside the data directory
const COOKIES_FILE: &str = "cookies.json";

#[derive(Parser)]
#[command(name = "leasehold", version, about = "Rental marketplace API client")]
struct Cli {
    /// Override the API base URL for this invocation
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the token pair
    Login {
        #[arg(short, long)]
        username: Option<String>,
        /// Keep the session for 7 days instead of 1
        #[arg(long)]
        remember: bool,
    },
    /// Create an account and sign in with it
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// tenant or landlord
        #[arg(long, default_value = "tenant")]
        role: Role,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        remember: bool,
    },
    /// Forget the stored session
    Logout,
    /// Fetch the signed-in user's profile
    Profile,
    /// Show the cached display fields without contacting the server
    Whoami,
    /// Send an authenticated GET and print the JSON response
    Get {
        /// Path below the API base URL, e.g. /bookings
        path: String,
    },
}

/// Terminal stand-in for the login page redirect.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect_to_login(&self) {
        eprintln!(
            "Session expired ({}). Run `leasehold login` to sign in again.",
            LOGIN_ROUTE
        );
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn open_store(config: &Config) -> Result<SyncedStore> {
    let data_dir = config.data_dir()?;
    let durable: Arc<dyn CredentialStore> = if config.use_keyring {
        Arc::new(KeyringStore::new())
    } else {
        Arc::new(FileStore::open(data_dir.join(CREDENTIALS_FILE))?)
    };
    let cookies = Arc::new(CookieJar::open(data_dir.join(COOKIES_FILE))?);
    Ok(SyncedStore::new(durable, cookies))
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    let base_url = cli.api_url.clone().unwrap_or_else(|| config.base_url());
    let store = open_store(&config)?;
    let client = ApiClient::new(&base_url, store, Arc::new(TerminalNavigator))?;
    info!(base_url = %base_url, "Client ready");

    match cli.command {
        Command::Login { username, remember } => {
            let username = match username.or_else(|| config.last_username.clone()) {
                Some(u) => u,
                None => prompt("Username: ")?,
            };
            let password =
                rpassword::prompt_password("Password: ").context("Failed to read password")?;

            let profile = client.login(&username, &password, remember).await?;

            config.last_username = Some(username);
            config.save()?;
            println!(
                "Signed in as {} ({}) - home: {}",
                profile.full_name(),
                profile.role,
                home_route(profile.role)
            );
        }
        Command::Register {
            username,
            email,
            first_name,
            last_name,
            role,
            phone,
            remember,
        } => {
            let password =
                rpassword::prompt_password("Password: ").context("Failed to read password")?;
            let registration = Registration {
                username: username.clone(),
                email,
                password,
                first_name,
                last_name,
                role,
                phone,
            };

            let profile = client.register(&registration, remember).await?;

            config.last_username = Some(username);
            config.save()?;
            println!(
                "Registered and signed in as {} ({}) - home: {}",
                profile.full_name(),
                profile.role,
                home_route(profile.role)
            );
        }
        Command::Logout => {
            client.logout()?;
            println!("Signed out");
        }
        Command::Profile => {
            let profile = client.fetch_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Whoami => match client.store().cached_profile()? {
            Some(cached) => println!("{} <{}> {}", cached.full_name, cached.username, cached.role),
            None => println!("Not signed in"),
        },
        Command::Get { path } => {
            let value: serde_json::Value = client.get_json(&path).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
