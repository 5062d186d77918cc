use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Bytes;
use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use swap_engine::{Config, SwapEngine};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "swap-engine", version, about = "Multi-chain gas, quote and transaction tool")]
struct Cli {
    /// Path to the YAML configuration.
    #[arg(long, default_value = "config/default.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current gas snapshot of a chain.
    Gas { chain: String },

    /// Quote a swap across every router configured for the chain.
    Quote {
        chain: String,
        /// Input token, symbol or address.
        token_in: String,
        /// Output token, symbol or address.
        token_out: String,
        amount: Decimal,
        #[arg(long, default_value_t = 50)]
        slippage_bps: u32,
    },

    /// Native balance, or an ERC20 balance with `--token`.
    Balance {
        chain: String,
        address: String,
        #[arg(long)]
        token: Option<String>,
    },

    /// Broadcast a signed raw transaction and wait for its receipt.
    Submit {
        chain: String,
        /// 0x-prefixed signed transaction.
        payload: Bytes,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,swap_engine=debug".into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml(&cli.config).await?;
    let engine = SwapEngine::from_config(&config).context("failed to build engine")?;

    match cli.cmd {
        Command::Gas { chain } => print_json(&engine.get_gas_snapshot(&chain).await?),
        Command::Quote {
            chain,
            token_in,
            token_out,
            amount,
            slippage_bps,
        } => print_json(
            &engine
                .get_quote(&chain, &token_in, &token_out, amount, slippage_bps)
                .await?,
        ),
        Command::Balance { chain, address, token } => {
            let balance = match token {
                Some(token) => engine.get_token_balance(&chain, &token, &address).await?,
                None => engine.get_native_balance(&chain, &address).await?,
            };
            print_json(&balance)
        }
        Command::Submit {
            chain,
            payload,
            timeout_secs,
        } => {
            let cancellation_token = CancellationToken::new();
            tokio::spawn(shutdown_signal(cancellation_token.clone()));

            let record = engine
                .submit_and_track(
                    &chain,
                    payload,
                    timeout_secs.map(Duration::from_secs),
                    &cancellation_token,
                )
                .await?;
            print_json(&record)?;

            if record.is_terminal() {
                record.ensure_confirmed()?;
            }
            Ok(())
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping transaction tracking...");
    cancellation_token.cancel();
}
