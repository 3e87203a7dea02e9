//! FX price dispatcher server.
//!
//! Loads the instrument list, builds the dispatcher (scheduler, registry,
//! broadcaster, pricer, metrics reporter) and serves the TCP front end:
//!
//! - control commands (`start_pricing`, `pause_pricing`, `pricing_state`, ...) are
//!   answered with one JSON line each;
//! - a `subscribe` command turns the connection into a one-way stream of
//!   `data: <quote json>` frames.
//!
//! A missing or malformed instrument list is fatal: the process exits before
//! binding. Ctrl+C cancels every scheduled task, closes all streams and exits.
use std::sync::Arc;

use clap::Parser;
use fx_common::Result;
use fx_server::{Dispatcher, InstrumentConfig, Settings, StreamServer};
use log::{error, info};

fn main() -> Result<()> {
    init_logger();
    let settings = Settings::parse();
    settings.validate()?;

    let config = InstrumentConfig::load(&settings.instruments).inspect_err(|e| {
        error!("Cannot start without instruments: {}", e);
    })?;
    info!(
        "Loaded {} instruments from {}",
        config.len(),
        settings.instruments.display()
    );

    let dispatcher = Arc::new(Dispatcher::new(&config, settings.dispatcher_options())?);
    if settings.start_all {
        dispatcher.start_all()?;
    }

    {
        let dispatcher = Arc::clone(&dispatcher);
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down server...");
            dispatcher.shutdown();
            std::process::exit(0);
        }) {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    }

    let server = StreamServer::bind(&settings.bind, dispatcher, settings.stream_options())?;
    server.serve()
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
