//! CLI for confgate
//!
//! Subcommands:
//! - `serve`: run the HTTP gateway
//! - `drain`: subscribe to a queue and log every message until Ctrl-C

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use confgate::broker::{self, ConnectOptions, MemoryBroker, SharedChannel};
use confgate::config::{Settings, load_config};
use confgate::gateway::{self, AppState};
use confgate::utils::{logging, redact_url};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "confgate", version, about = "Configuration gateway over a message broker")]
enum Command {
    /// Start the HTTP gateway
    Serve,
    /// Log every message arriving on a queue until interrupted
    Drain {
        /// Queue to consume (defaults to the configuration queue)
        #[arg(long)]
        queue: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info", "json");
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log.level, &settings.log.format);

    // Shared by every `memory://` dial in this process.
    let memory = MemoryBroker::new();

    let result = match cmd {
        Command::Serve => run_server(settings, &memory).await,
        Command::Drain { queue } => run_drain(settings, queue, &memory).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_server(
    settings: Settings,
    memory: &MemoryBroker,
) -> Result<(), Box<dyn std::error::Error>> {
    let shared = match settings.broker.url.as_deref() {
        None => {
            warn!("RABBIT_URL not set, running api without broker connection");
            None
        }
        Some(url) => {
            info!(url = %redact_url(url), "broker configured");
            let dialer = broker::dialer_for(url, memory)?;
            let options = ConnectOptions::from_settings(&settings.broker)?;
            let mut shared = SharedChannel::new(dialer, options);
            if settings.broker.declare_queue {
                shared = shared.declaring(&settings.broker.config_queue);
            }
            Some(Arc::new(shared))
        }
    };

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let state = AppState::new(shared, &settings.broker);

    gateway::serve(listener, state, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    })
    .await?;
    Ok(())
}

async fn run_drain(
    settings: Settings,
    queue: Option<String>,
    memory: &MemoryBroker,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = ConnectOptions::from_settings(&settings.broker)?;
    let dialer = broker::dialer_for(&options.url, memory)?;
    let queue = queue.unwrap_or_else(|| settings.broker.config_queue.clone());

    let channel = broker::connect(dialer.as_ref(), &options).await?;

    let outcome = async {
        if settings.broker.declare_queue {
            channel.declare_queue(&queue).await?;
        }
        broker::subscribe(&channel, &queue).await
    }
    .await;

    let subscription = match outcome {
        Ok(subscription) => subscription,
        Err(e) => {
            channel.close().await;
            return Err(e.into());
        }
    };

    tokio::select! {
        received = broker::drain(subscription) => {
            warn!(queue = %queue, received, "subscription ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    channel.close().await;
    Ok(())
}
