use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use replay_throttle::config::{LoggingConfig, ThrottleConfig};
use replay_throttle::error::ThrottleError;
use replay_throttle::ratelimit::{Operation, RateLimiterRegistry, Tier, TierConfig};

#[derive(Debug, Parser)]
#[command(name = "replay-throttle", version, about = "Inspect and exercise API rate limits")]
struct Cli {
    /// Settings file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the built-in tier limits as JSON
    Tiers {
        /// Only print this tier
        #[arg(long)]
        tier: Option<Tier>,
    },
    /// Issue back-to-back calls through a limiter and log when each fires
    Simulate {
        /// Operation to call
        #[arg(long)]
        operation: Operation,

        /// Number of calls
        #[arg(long, default_value_t = 10)]
        calls: u32,

        /// Override the configured tier
        #[arg(long)]
        tier: Option<Tier>,

        /// Start with a pre-loaded window
        #[arg(long)]
        safe_start: bool,

        /// Calls allowed to fire immediately after a safe start
        #[arg(long)]
        initial_burst_allowance: Option<u32>,

        /// Disable rate limiting
        #[arg(long)]
        disabled: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = ThrottleConfig::load(cli.config.as_deref())?;

    init_tracing(&config.logging);

    match cli.command {
        Command::Tiers { tier } => {
            let tiers: BTreeMap<&str, TierConfig> = match tier {
                Some(tier) => BTreeMap::from([(tier.as_str(), tier.config())]),
                None => Tier::ALL.iter().map(|t| (t.as_str(), t.config())).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&tiers)?);
        }
        Command::Simulate {
            operation,
            calls,
            tier,
            safe_start,
            initial_burst_allowance,
            disabled,
        } => {
            let settings = &mut config.rate_limiting;
            if let Some(tier) = tier {
                settings.tier = tier;
                settings.tier_file = None;
            }
            settings.safe_start |= safe_start;
            settings.enabled &= !disabled;
            if let Some(allowance) = initial_burst_allowance {
                settings.initial_burst_allowance = allowance;
            }

            simulate(&config, operation, calls).await?;
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

async fn simulate(config: &ThrottleConfig, operation: Operation, calls: u32) -> anyhow::Result<()> {
    let registry = RateLimiterRegistry::from_config(&config.rate_limiting)?;
    if registry.is_enabled() && registry.limiter(operation).is_none() {
        warn!(operation = %operation, "Operation is not rate limited by this tier");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    info!(operation = %operation, calls = calls, "Starting simulation");
    let start = Instant::now();

    for call in 1..=calls {
        match registry.acquire_with_cancel(operation, &cancel).await {
            Ok(delay) => info!(
                call = call,
                offset_ms = start.elapsed().as_millis() as u64,
                delay_ms = delay.as_millis() as u64,
                "Call fired"
            ),
            Err(ThrottleError::Cancelled(_)) => {
                info!(completed = call - 1, "Simulation cancelled");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Simulation finished"
    );
    Ok(())
}

/// Cancel `cancel` on a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling pending calls");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling pending calls");
        }
    }

    cancel.cancel();
}
