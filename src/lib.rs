//! Kiosko POS
//!
//! Point of sale for small shops over a local SQLite database: login with
//! role gating, a register cart, one-transaction sale commits with stock
//! movements, PDF/HTML tickets rendered off the main thread, a randomized
//! sales simulator, Excel reports and a dashboard. The `kiosko` binary is a
//! thin wrapper around [`run`].

use anyhow::Context as _;
use clap::Parser;
use tracing::info;

pub mod auth;
pub mod cache;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod money;
pub mod payment;
pub mod points;
pub mod reports;
pub mod sales;
pub mod simulator;
pub mod ticket;

pub use error::{PosError, Result};

/// Parse the command line, start logging, log in and run one command.
pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = config::PosConfig::resolve(cli.data_dir.as_deref());
    logging::init_logging(&config.log_dir, cli.verbose, cli.json_logs);

    info!(
        version = cli::VERSION,
        data_dir = %config.data_dir.display(),
        "Starting Kiosko POS"
    );

    let db_path = config.db_path.clone();
    let mut ctx = commands::open(&cli, config)
        .with_context(|| format!("could not open the register at {}", db_path.display()))?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut input = stdin.lock();
    let mut out = stdout.lock();
    let result = commands::dispatch(&mut ctx, cli.command, &mut input, &mut out);

    ctx.auth.logout()?;
    result?;
    Ok(())
}
