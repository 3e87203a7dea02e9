//! FX Client: talks to the dispatcher over its TCP front end.
//!
//! `stream` subscribes under a user id and prints every received quote until
//! Ctrl+C; the other subcommands send one control command and print the answer.
//!
//! Usage example (CLI):
//! ```bash
//! fx_client --server 127.0.0.1:8080 start EURUSD
//! fx_client --server 127.0.0.1:8080 stream --user-id alice
//! ```
#![warn(missing_docs)]
mod args;
mod sender;

use crate::args::{Action, Args};
use crate::sender::CommandSender;
use clap::Parser;
use fx_common::{DispatchError, Response, Result};
use log::{error, info};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let mut sender = CommandSender::connect(&args.server)?;
    let response = sender.send_command(&args.action.to_command())?;

    match (&args.action, response) {
        (Action::Stream { user_id }, Response::Subscribed { .. }) => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let shutdown = shutdown.clone();
                ctrlc::set_handler(move || {
                    info!("Ctrl+C received. Shutting down client...");
                    shutdown.store(true, Ordering::SeqCst);
                })
                .map_err(|e| DispatchError::Format(format!("Error setting Ctrl+C handler: {e}")))?;
            }

            info!("Streaming quotes for {}. Press Ctrl+C to exit.", user_id);
            let received = sender.stream_quotes(&shutdown, |quote| {
                info!(
                    "QUOTE: {} Bid={} Ask={} Time={}",
                    quote.symbol, quote.bid, quote.ask, quote.timestamp
                );
            })?;
            info!("Received {} quotes", received);
        }
        (_, Response::PricingState { state }) => {
            for (symbol, active) in state {
                println!("{symbol}\t{}", if active { "active" } else { "paused" });
            }
        }
        (_, Response::Instruments { symbols }) => println!("{}", symbols.join("\n")),
        (_, Response::Metrics { connections, streams }) => {
            println!("connections={connections} streams={streams}");
        }
        (_, Response::Ok { message }) => println!("{message}"),
        (_, Response::NotFound { symbol }) => {
            error!("Unknown instrument: {}", symbol);
            return Err(DispatchError::InstrumentNotFound(symbol));
        }
        (_, other) => {
            error!("Unexpected response: {:?}", other);
            return Err(DispatchError::Format(format!("unexpected response {other:?}")));
        }
    }
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
