//! Command-line arguments for the FX client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::{Parser, Subcommand};
use fx_common::Command;
use fx_common::net::{DEFAULT_PORT, addr};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server address (`host:port`).
    #[arg(long, default_value_t = addr("127.0.0.1", DEFAULT_PORT))]
    pub server: String,

    /// What to do.
    #[command(subcommand)]
    pub action: Action,
}

/// Client actions.
#[derive(Debug, Subcommand)]
pub enum Action {
    /// Subscribe and print quotes until Ctrl+C.
    Stream {
        /// Subscriber id.
        #[arg(long)]
        user_id: String,
    },
    /// Start pricing one instrument.
    Start {
        /// Instrument symbol.
        symbol: String,
    },
    /// Pause pricing one instrument.
    Pause {
        /// Instrument symbol.
        symbol: String,
    },
    /// Start every instrument.
    StartAll,
    /// Pause every instrument.
    PauseAll,
    /// Show the active flag of every instrument.
    State,
    /// List configured instruments.
    Instruments,
    /// Show server gauges.
    Metrics,
}

impl Action {
    /// Protocol command for this action.
    pub fn to_command(&self) -> Command {
        match self {
            Action::Stream { user_id } => Command::Subscribe {
                user_id: user_id.clone(),
            },
            Action::Start { symbol } => Command::StartPricing {
                symbol: normalize_symbol(symbol),
            },
            Action::Pause { symbol } => Command::PausePricing {
                symbol: normalize_symbol(symbol),
            },
            Action::StartAll => Command::StartAllPricing,
            Action::PauseAll => Command::PauseAllPricing,
            Action::State => Command::PricingState,
            Action::Instruments => Command::Instruments,
            Action::Metrics => Command::Metrics,
        }
    }
}

/// Trim surrounding quotes and whitespace and upper-case the symbol.
fn normalize_symbol(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_ascii_uppercase()
}
