//! Giftshop CLI - scripted sessions against the sync core.
//!
//! Wires [`giftshop_sync::SessionLifecycle`] to the in-memory collaborators
//! and drives it through a scripted scenario, printing what the UI would
//! show at each step.
//!
//! # Usage
//!
//! ```bash
//! # Sign in, stream unread counter values one per tick, create orders, log out
//! giftshop simulate --unread 0,0,3,3,5 --orders 2
//!
//! # Same, with the notification prompt denied
//! giftshop simulate --deny-notifications
//!
//! # Scripted cart session
//! giftshop cart
//! ```
//!
//! # Environment Variables
//!
//! See [`giftshop_sync::SyncConfig::from_env`]. `RUST_LOG` controls log
//! output and `GIFTSHOP_LOG_FORMAT=json` switches to structured lines.

#![cfg_attr(not(test), forbid(unsafe_code))]
// Command output goes to stdout; diagnostics go through tracing.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::{Parser, Subcommand};
use giftshop_sync::{LogFormat, SyncConfig};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "giftshop")]
#[command(author, version, about = "Giftshop sync core driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted in-memory session
    Simulate {
        /// Unread counter values, one per poll tick
        #[arg(long, value_delimiter = ',', default_value = "0,0,3,3,5")]
        unread: Vec<u64>,

        /// Orders to create for the signed-in user
        #[arg(long, default_value_t = 2)]
        orders: usize,

        /// Answer the notification prompt with "denied"
        #[arg(long)]
        deny_notifications: bool,

        /// Identity to sign in as
        #[arg(long, default_value = "demo-user")]
        user: String,
    },
    /// Run a scripted cart session and print the aggregate
    Cart,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "giftshop_sync=info,giftshop_cli=info".into());

    let is_json = config.log_format == LogFormat::Json;
    let json_layer = is_json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: SyncConfig) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Simulate {
            unread,
            orders,
            deny_notifications,
            user,
        } => {
            let options = commands::simulate::SimulateOptions {
                user,
                unread,
                orders,
                deny_notifications,
            };
            commands::simulate::run(config, options).await?;
        }
        Commands::Cart => commands::cart::run(&config)?,
    }
    Ok(())
}
