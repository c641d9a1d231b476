mod clock;
mod config;
mod logstore;
mod monitoring;
mod notify;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::logstore::FileLogStore;
use crate::monitoring::probe::HttpProber;
use crate::monitoring::{Engine, Scheduler};
use crate::notify::{LogNotifier, Notifier, TwilioNotifier};
use crate::registry::FileRegistry;

/// Background uptime-monitoring engine.
#[derive(Parser)]
#[command(name = "upwatch-service", version, about)]
struct Cli {
    /// Path to the configuration file (defaults to the XDG config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;
    info!("{config}");

    let registry = Arc::new(FileRegistry::new(&config.storage.data_dir)?);
    let logs = Arc::new(FileLogStore::new(&config.storage.data_dir)?);
    let notifier: Arc<dyn Notifier> = match &config.twilio {
        Some(twilio) => Arc::new(TwilioNotifier::new(
            twilio.account_sid.clone(),
            twilio.auth_token.clone(),
            twilio.from_phone.clone(),
        )?),
        None => {
            warn!("no twilio credentials configured, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let engine = Arc::new(Engine::new(
        registry,
        Arc::new(HttpProber::new()?),
        notifier,
        logs,
        Arc::new(SystemClock),
        config.engine.max_concurrent_probes,
    ));

    let scheduler = Scheduler::new(
        engine,
        Duration::from_secs(config.engine.check_interval_seconds),
        Duration::from_secs(config.engine.rotation_interval_seconds),
    );
    let _handles = scheduler.start();
    info!("background workers are running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Initialize the tracing subscriber; `RUST_LOG` filters, and
/// `RUST_LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let env_filter =
        EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_filter(env_filter).boxed(),
    };

    tracing_subscriber::registry().with(log_layer).init();
}
