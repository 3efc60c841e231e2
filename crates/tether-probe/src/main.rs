// ============================================
// File: crates/tether-probe/src/main.rs
// ============================================
//! # Tether Probe Entry Point
//!
//! ## Creation Reason
//! Main entry point for the probe binary. Handles CLI parsing, logging
//! setup, configuration loading and the probe run.
//!
//! ## Usage
//! ```bash
//! # Probe a WebSocket echo server 100 times
//! tether-probe run --url ws://127.0.0.1:9001/echo --cycles 100
//!
//! # Probe with a config file
//! tether-probe run --config /etc/tether/probe.toml
//!
//! # Other commands
//! tether-probe validate --config probe.toml   # Validate config file
//! tether-probe defaults > probe.toml          # Print default config
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `RUST_LOG` overrides the configured log level
//! - Exit status is 1 if any cycle failed
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tether_probe::{ProbeConfig, ProbeStack, Prober};

// ============================================
// CLI Definition
// ============================================

/// Tether transport chain probe
#[derive(Parser, Debug)]
#[command(name = "tether-probe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run connect / exchange / close cycles against a target
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Target URL, overrides the config (ws://host[:port][/path] or tcp://host:port)
        #[arg(short, long)]
        url: Option<String>,

        /// Number of cycles, overrides the config
        #[arg(short = 'n', long)]
        cycles: Option<u32>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "probe.toml")]
        config: PathBuf,
    },

    /// Print the default configuration as TOML
    Defaults,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `run` installs the subscriber once its config level is known
    let result = match cli.command {
        Commands::Run { config, url, cycles } => cmd_run(config.as_deref(), url, cycles).await,
        Commands::Validate { config } => {
            init_logging("info");
            cmd_validate(&config).await
        }
        Commands::Defaults => {
            print!("{}", ProbeConfig::default().to_toml());
            Ok(())
        }
    };

    if let Err(e) = result {
        init_logging("info");
        error!("{}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Builds the chain and runs the probe.
async fn cmd_run(config_path: Option<&Path>, url: Option<String>, cycles: Option<u32>) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => ProbeConfig::load(path).await?,
        None => ProbeConfig::default(),
    };
    if let Some(url) = url {
        config.target.url = url;
    }
    if let Some(cycles) = cycles {
        config.probe.cycles = cycles;
    }
    config.validate()?;

    init_logging(&config.logging.level);

    let target = config.target()?;
    let stack = ProbeStack::build(&config)?;
    let top = stack
        .top()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("chain has no '{}' entry", stack.top_scheme()))?;

    info!("Probing {} ({} cycles)", target, config.probe.cycles);
    let report = Prober::new(&top, &target, &config.probe).run(config.probe.cycles).await;
    drop(top);

    stack.destroy().await?;

    println!();
    println!("Probe of {target}");
    println!("════════════════════════════════════════");
    println!("{report}");
    println!("════════════════════════════════════════");

    if report.failed > 0 {
        anyhow::bail!("{} of {} cycles failed", report.failed, report.cycles);
    }
    Ok(())
}

/// Validates configuration file.
async fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    let config = ProbeConfig::load(config_path).await?;
    let target = config.target()?;

    println!("✅ Configuration is valid");
    println!();
    println!("Target:");
    println!("   URL:         {target}");
    println!();
    println!("TCP:");
    println!("   Timeout:     {}ms", config.tcp.connect_timeout_ms);
    println!("   Nodelay:     {}", config.tcp.nodelay);
    println!("   Keep-alive:  {}", config.tcp.keep_alive.enable);
    println!();
    println!("WS:");
    println!("   Buffer:      {} bytes", config.ws.buffer_size);
    println!("   Headers:     {}", config.ws.headers.len());
    println!();
    println!("Probe:");
    println!("   Cycles:      {}", config.probe.cycles);
    println!("   IO timeout:  {}ms", config.probe.io_timeout_ms);
    println!("   Leaf owner:  {}", config.probe.leaf_ownership);
    println!();

    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}
