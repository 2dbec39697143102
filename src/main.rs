//! nibe-poller - NIBE Uplink telemetry poller
//!
//! Polls heat-pump sensor readings from the NIBE Uplink API and prints
//! them as JSON, one event per line.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nibe_poller::api::ReqwestTransport;
use nibe_poller::auth::{AuthFlow, CredentialStore, FileStore, TerminalPrompt};
use nibe_poller::{Event, Options, Poller, Schedule};

#[derive(Parser)]
#[command(name = "nibe-poller")]
#[command(about = "Poll NIBE Uplink heat-pump telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// OAuth2 client id (default: NIBE_CLIENT_ID)
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// OAuth2 client secret (default: NIBE_CLIENT_SECRET)
    #[arg(long, global = true)]
    client_secret: Option<String>,

    /// Heat-pump system id (default: NIBE_SYSTEM_ID)
    #[arg(long, global = true)]
    system_id: Option<u64>,

    /// API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize interactively and store tokens
    Login {
        /// Force interactive authorization even if a usable token exists
        #[arg(short, long)]
        force: bool,
    },

    /// Clear stored credentials
    Logout,

    /// Show credential status
    Status,

    /// Run one fetch cycle and print the readings as JSON
    Fetch,

    /// Poll on a schedule, streaming events as JSON lines
    Run {
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,

        /// Cron expression (sec min hour day month weekday); overrides --interval
        #[arg(long)]
        cron: Option<String>,

        /// Timezone for cron evaluation (e.g. Europe/Berlin)
        #[arg(long)]
        timezone: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let options = build_options(&cli)?;

    match cli.command {
        Commands::Login { force } => login(options, force).await?,
        Commands::Logout => logout(options)?,
        Commands::Status => status(options)?,
        Commands::Fetch => fetch(options).await?,
        Commands::Run {
            interval,
            cron,
            timezone,
        } => run(options, interval, cron, timezone).await?,
    }

    Ok(())
}

/// Merge CLI flags and environment variables onto the defaults.
fn build_options(cli: &Cli) -> Result<Options> {
    let client_id = cli
        .client_id
        .clone()
        .or_else(|| std::env::var("NIBE_CLIENT_ID").ok())
        .context("Missing client id (--client-id or NIBE_CLIENT_ID)")?;
    let client_secret = cli
        .client_secret
        .clone()
        .or_else(|| std::env::var("NIBE_CLIENT_SECRET").ok())
        .context("Missing client secret (--client-secret or NIBE_CLIENT_SECRET)")?;
    let system_id = match cli.system_id {
        Some(id) => id,
        None => std::env::var("NIBE_SYSTEM_ID")
            .ok()
            .context("Missing system id (--system-id or NIBE_SYSTEM_ID)")?
            .parse()
            .context("NIBE_SYSTEM_ID must be numeric")?,
    };

    let mut options = Options::new(client_id, client_secret, system_id);
    if let Some(base_url) = &cli.base_url {
        options.base_url = base_url.clone();
    }
    // The binary drives start() explicitly.
    options.auto_start = false;
    options.validate()?;
    Ok(options)
}

async fn login(options: Options, force: bool) -> Result<()> {
    let store = Arc::new(FileStore::for_options(&options)?);
    let transport = Arc::new(ReqwestTransport::new(&options)?);
    let flow = AuthFlow::new(Arc::new(options), transport, store.clone());

    if force {
        store.clear()?;
    } else if flow.has_refresh_token() && !flow.is_token_expired() {
        println!("Already authorized (access token valid). Use --force to re-authenticate.");
        return Ok(());
    }

    flow.ensure_token(&TerminalPrompt).await?;
    println!("Login successful.");
    Ok(())
}

fn logout(options: Options) -> Result<()> {
    let store = FileStore::for_options(&options)?;
    store.clear()?;
    println!("Logged out.");
    Ok(())
}

fn status(options: Options) -> Result<()> {
    let store = FileStore::for_options(&options)?;
    let margin = options.renew_before_expiry_ms();

    match store.get() {
        Some(credentials) => {
            if credentials.is_expired(margin) {
                println!("Access token:  expired");
            } else {
                println!("Access token:  valid");
            }
            if let Some(expires) = chrono::DateTime::from_timestamp_millis(credentials.expires_at)
            {
                println!("  expires_at:  {}", expires);
            }
            if credentials.refresh_token.is_empty() {
                println!("Refresh token: none");
            } else {
                println!("Refresh token: present");
            }
        }
        None => {
            println!("No stored credentials.");
            println!("\nRun 'nibe-poller login' to authorize.");
        }
    }
    Ok(())
}

async fn fetch(options: Options) -> Result<()> {
    let poller = build_poller(options)?;
    let mut events = poller.subscribe();

    poller.tick().await;

    match events.try_recv() {
        Ok(Event::Data(readings)) => {
            println!("{}", serde_json::to_string_pretty(&readings)?);
            Ok(())
        }
        Ok(Event::Error(e)) => Err(e.into()),
        Err(_) => anyhow::bail!("fetch cycle produced no event"),
    }
}

async fn run(
    options: Options,
    interval: Option<u64>,
    cron: Option<String>,
    timezone: Option<String>,
) -> Result<()> {
    let mut options = options;
    if let Some(expr) = &cron {
        options.schedule = Schedule::cron(expr)?;
    } else if let Some(secs) = interval {
        options.schedule = Schedule::interval_secs(secs);
    }
    if let Some(tz) = &timezone {
        options.timezone = tz
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid timezone {:?}: {}", tz, e))?;
    }

    let poller = build_poller(options)?;
    let mut events = poller.subscribe();
    poller.start();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(Event::Data(readings)) => {
                    println!("{}", serde_json::to_string(&readings)?);
                }
                Ok(Event::Error(e)) => {
                    tracing::warn!("cycle failed: {}", e);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("event stream lagged, dropped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                poller.stop();
                break;
            }
        }
    }

    Ok(())
}

fn build_poller(options: Options) -> Result<Arc<Poller>> {
    let store = Arc::new(FileStore::for_options(&options)?);
    let transport = Arc::new(ReqwestTransport::new(&options)?);
    Ok(Poller::with_parts(
        options,
        transport,
        store,
        Arc::new(TerminalPrompt),
    )?)
}
