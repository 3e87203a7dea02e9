//! Command-line settings for the dispatcher server.
//!
//! This module defines the CLI interface using `clap`; every value has a default
//! matching the reference deployment, so the server can be started bare.
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use fx_common::net::{DEFAULT_PORT, addr};
use fx_common::{DispatchError, Result};
use rust_decimal::Decimal;

use crate::dispatcher::DispatcherOptions;
use crate::pricer::PricingParams;
use crate::receiver::StreamOptions;

/// Parsed command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(version, about = "Simulated FX price feed with fan-out streaming", long_about = None)]
pub struct Settings {
    /// Address the TCP front end listens on.
    #[arg(long, default_value_t = addr("0.0.0.0", DEFAULT_PORT))]
    pub bind: String,

    /// Instrument list, one `SYMBOL,basePrice` per line.
    #[arg(long, default_value = "ccypair-list.csv")]
    pub instruments: PathBuf,

    /// Upper bound (exclusive) of the random delay between ticks, in milliseconds.
    #[arg(long, default_value_t = 10)]
    pub max_delay_ms: u64,

    /// Full width of the bid band around the base price.
    #[arg(long, default_value = "0.01")]
    pub variation: Decimal,

    /// Smallest ask-bid spread.
    #[arg(long, default_value = "0.0001")]
    pub spread_min: Decimal,

    /// Width of the random part of the spread.
    #[arg(long, default_value = "0.0001")]
    pub spread_range: Decimal,

    /// Scheduler worker threads.
    #[arg(long, default_value_t = 3)]
    pub workers: usize,

    /// Deadline for handing one quote to one subscriber, in milliseconds.
    #[arg(long, default_value_t = 250)]
    pub write_timeout_ms: u64,

    /// Idle limit of a subscriber stream, in seconds.
    #[arg(long, default_value_t = 300)]
    pub stream_timeout_secs: u64,

    /// Period of the metrics report, in seconds.
    #[arg(long, default_value_t = 60)]
    pub metrics_interval_secs: u64,

    /// Start every instrument immediately.
    #[arg(long)]
    pub start_all: bool,
}

impl Settings {
    /// Reject values the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max-delay-ms", self.max_delay_ms),
            ("workers", self.workers as u64),
            ("write-timeout-ms", self.write_timeout_ms),
            ("stream-timeout-secs", self.stream_timeout_secs),
            ("metrics-interval-secs", self.metrics_interval_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(DispatchError::InvalidSettings(format!("--{name} must be positive")));
        }
        self.pricing().validate()
    }

    /// Random walk parameters.
    pub fn pricing(&self) -> PricingParams {
        PricingParams {
            max_delay: Duration::from_millis(self.max_delay_ms),
            variation: self.variation,
            spread_min: self.spread_min,
            spread_range: self.spread_range,
        }
    }

    /// Dispatch core options.
    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            pricing: self.pricing(),
            workers: self.workers,
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            metrics_interval: Duration::from_secs(self.metrics_interval_secs),
        }
    }

    /// Transport options.
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            idle_timeout: Duration::from_secs(self.stream_timeout_secs),
            ..StreamOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_reference_deployment() {
        let settings = Settings::parse_from(["fx_server"]);
        settings.validate().unwrap();

        assert_eq!(settings.bind, "0.0.0.0:8080");
        assert_eq!(settings.pricing(), PricingParams::default());
        assert_eq!(settings.dispatcher_options().workers, 3);
        assert_eq!(settings.stream_options().idle_timeout, Duration::from_secs(300));
        assert!(!settings.start_all);
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::parse_from([
            "fx_server",
            "--spread-min",
            "0.0002",
            "--workers",
            "8",
            "--start-all",
        ]);
        assert_eq!(settings.spread_min, dec!(0.0002));
        assert_eq!(settings.workers, 8);
        assert!(settings.start_all);
    }

    #[test]
    fn zero_values_are_rejected() {
        let settings = Settings::parse_from(["fx_server", "--workers", "0"]);
        assert!(matches!(settings.validate(), Err(DispatchError::InvalidSettings(m)) if m.contains("workers")));

        let settings = Settings::parse_from(["fx_server", "--spread-min", "0"]);
        assert!(settings.validate().is_err());
    }
}
