//! Simulated FX price dispatcher.
//!
//! The crate generates a continuous random-walk quote feed per configured
//! instrument and fans every quote out to all connected subscribers. Building
//! blocks, leaves first:
//!
//! - `metrics`: connection and in-flight stream gauges.
//! - `scheduler`: timer thread plus bounded worker pool running cancellable
//!   repeating tasks.
//! - `registry`: concurrent subscriber map and lifecycle transitions.
//! - `broadcaster`: per-quote fan-out with per-subscriber failure isolation.
//! - `pricer`: per-instrument tick chains and the quote random walk.
//! - `dispatcher`: single owner wiring the above together; the control surface.
//! - `receiver` / `stream` / `handle`: TCP front end, stream writer and the
//!   channel-backed output handle.
//! - `settings`: CLI settings.
#![warn(missing_docs)]

pub mod broadcaster;
pub mod dispatcher;
pub mod handle;
pub mod metrics;
pub mod model;
pub mod pricer;
pub mod receiver;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod stream;

pub use dispatcher::{Dispatcher, DispatcherOptions};
pub use model::instruments::InstrumentConfig;
pub use receiver::{StreamOptions, StreamServer};
pub use settings::Settings;
