//! Hearth CLI
//!
//! Runs a node, commissions devices over PASE, and prints configuration.

mod config;

use clap::{Parser, Subcommand};
use hearth_core::Node;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::Config;

/// Hearth - secure message layer for Matter-style devices
#[derive(Parser)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: ~/.config/hearth/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node and answer PASE/CASE requests until Ctrl+C
    Serve {
        /// Listen address (overrides the configuration file)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Commission a device with its setup passcode
    Commission {
        /// Device address
        #[arg(long, required = true)]
        peer: SocketAddr,

        /// Setup passcode
        #[arg(long, required = true)]
        passcode: u32,

        /// Local address
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::resolve(cli.config.as_deref())?;

    // RUST_LOG wins over --verbose and the configured level
    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    config.validate()?;

    match cli.command {
        Commands::Serve { bind } => serve(bind, config).await?,
        Commands::Commission {
            peer,
            passcode,
            bind,
        } => commission(peer, passcode, bind, config).await?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

/// Run a node until interrupted
async fn serve(bind: Option<SocketAddr>, mut config: Config) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.node.listen_addr = bind;
    }
    let node = Node::bind(config.node).await?;
    node.start().await;

    println!("Hearth node");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Listen: {}", node.local_addr()?);
    println!("Commissionable: {}", node.is_commissionable());
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    node.stop().await?;
    Ok(())
}

/// Commission one device and report the resulting session
async fn commission(
    peer: SocketAddr,
    passcode: u32,
    bind: SocketAddr,
    mut config: Config,
) -> anyhow::Result<()> {
    tracing::info!("Commissioning {}", peer);

    // the commissioner never answers PASE itself
    config.node.listen_addr = bind;
    config.node.commissioning = None;
    let node = Node::bind(config.node).await?;
    node.start().await;

    let result = node.commission(peer, passcode).await;
    node.stop().await?;
    let session = result?;

    println!("Commissioned {}", peer);
    println!("Local session id: {}", session.id());
    println!("Peer session id: {}", session.peer_session_id());
    Ok(())
}
