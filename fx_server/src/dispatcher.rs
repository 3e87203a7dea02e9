//! The dispatcher: one owner for every piece of shared state.
//!
//! Constructed once at startup, it creates the scheduler, metrics, registry,
//! broadcaster and pricer, wires the broadcaster into the pricer as its quote
//! sink, and schedules the periodic metrics report. The transport and the binary
//! talk to the core only through this type.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fx_common::{Command, DispatchError, Response, Result};
use log::{error, info, warn};

use crate::broadcaster::Broadcaster;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::model::instruments::InstrumentConfig;
use crate::model::subscriber::{StreamHandle, Subscriber};
use crate::pricer::{Pricer, PricingParams};
use crate::registry::ConnectionRegistry;
use crate::scheduler::{Scheduler, TaskHandle};

/// Tunables of the dispatch core.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Random walk parameters.
    pub pricing: PricingParams,
    /// Scheduler worker threads.
    pub workers: usize,
    /// Bound on each per-subscriber write.
    pub write_timeout: Duration,
    /// Period of the metrics report.
    pub metrics_interval: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            pricing: PricingParams::default(),
            workers: 3,
            write_timeout: Duration::from_millis(250),
            metrics_interval: Duration::from_secs(60),
        }
    }
}

/// Owner of the price feed, the subscriber registry and the gauges.
pub struct Dispatcher {
    scheduler: Arc<Scheduler>,
    metrics: Arc<Metrics>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    pricer: Pricer,
    reporter: TaskHandle,
}

impl Dispatcher {
    /// Build the core for `config`. Every instrument starts paused.
    pub fn new(config: &InstrumentConfig, options: DispatcherOptions) -> Result<Self> {
        if options.metrics_interval.is_zero() {
            return Err(DispatchError::InvalidSettings(
                "metrics interval must be positive".into(),
            ));
        }
        let scheduler = Arc::new(Scheduler::new("dispatcher", options.workers)?);
        let metrics = Arc::new(Metrics::new());
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&metrics)));
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            options.write_timeout,
        ));
        let pricer = Pricer::new(
            config,
            options.pricing,
            broadcaster.clone(),
            Arc::clone(&scheduler),
        )?;

        let reporter_metrics = Arc::clone(&metrics);
        let reporter = scheduler.schedule_at_fixed_rate(
            "metrics-report",
            Duration::ZERO,
            options.metrics_interval,
            move || {
                reporter_metrics.report();
            },
        )?;

        info!("Dispatcher ready with {} instruments", config.len());
        Ok(Self {
            scheduler,
            metrics,
            registry,
            broadcaster,
            pricer,
            reporter,
        })
    }

    /// Resume quotes for `symbol`.
    pub fn start(&self, symbol: &str) -> Result<()> {
        self.pricer.start(symbol)
    }

    /// Suspend quotes for `symbol`.
    pub fn pause(&self, symbol: &str) -> Result<()> {
        self.pricer.pause(symbol)
    }

    /// Resume every instrument.
    pub fn start_all(&self) -> Result<()> {
        self.pricer.start_all()
    }

    /// Suspend every instrument.
    pub fn pause_all(&self) {
        self.pricer.pause_all()
    }

    /// Active flag per instrument.
    pub fn current_state(&self) -> BTreeMap<String, bool> {
        self.pricer.current_state()
    }

    /// Configured symbols, sorted.
    pub fn instruments(&self) -> Vec<String> {
        self.pricer.symbols()
    }

    /// Register a subscriber stream under `id`.
    pub fn open_stream(&self, id: &str, handle: Box<dyn StreamHandle>) -> Arc<Subscriber> {
        info!("Received request to stream quotes for user: {}", id);
        self.registry.register(id, handle)
    }

    /// Subscriber registry, for lifecycle callbacks.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Fan-out used as the pricer's quote sink.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Open subscriber connections.
    pub fn active_connections(&self) -> i64 {
        self.metrics.active_connections()
    }

    /// In-flight send attempts.
    pub fn active_streams(&self) -> i64 {
        self.metrics.active_streams()
    }

    /// Log and return both gauges now.
    pub fn report_metrics(&self) -> MetricsSnapshot {
        self.metrics.report()
    }

    /// Run `body` every `period` on the dispatcher's workers until shutdown.
    pub fn schedule_periodic<F>(&self, name: &str, period: Duration, body: F) -> Result<TaskHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.scheduler.schedule_at_fixed_rate(name, period, period, body)
    }

    /// Apply a control command. `Subscribe` needs a transport and is refused here.
    pub fn execute(&self, command: Command) -> Response {
        match command {
            Command::Subscribe { .. } => Response::Error {
                message: "subscribe must be issued on a stream connection".to_string(),
            },
            Command::Instruments => Response::Instruments {
                symbols: self.instruments(),
            },
            Command::StartPricing { symbol } => match self.start(&symbol) {
                Ok(()) => Response::Ok {
                    message: format!("Started pricing for {symbol}"),
                },
                Err(e) => self.control_failure(symbol, e),
            },
            Command::PausePricing { symbol } => match self.pause(&symbol) {
                Ok(()) => Response::Ok {
                    message: format!("Paused pricing for {symbol}"),
                },
                Err(e) => self.control_failure(symbol, e),
            },
            Command::StartAllPricing => match self.start_all() {
                Ok(()) => Response::Ok {
                    message: "Started pricing for all currency pairs".to_string(),
                },
                Err(e) => {
                    error!("Failed to start all pricing: {}", e);
                    Response::Error {
                        message: e.to_string(),
                    }
                }
            },
            Command::PauseAllPricing => {
                self.pause_all();
                Response::Ok {
                    message: "Paused pricing for all currency pairs".to_string(),
                }
            }
            Command::PricingState => Response::PricingState {
                state: self.current_state(),
            },
            Command::Metrics => {
                let snapshot = self.report_metrics();
                Response::Metrics {
                    connections: snapshot.connections,
                    streams: snapshot.streams,
                }
            }
        }
    }

    /// Stop every chain and the reporter, close every stream and join the workers.
    pub fn shutdown(&self) {
        if !self.scheduler.is_running() {
            return;
        }
        info!("Dispatcher shutting down");
        self.reporter.cancel();
        self.pricer.stop();
        self.scheduler.shutdown();
        let closed = self.registry.close_all();
        info!("Dispatcher stopped, {} streams closed", closed);
    }

    fn control_failure(&self, symbol: String, error: DispatchError) -> Response {
        match error {
            DispatchError::InstrumentNotFound(_) => {
                warn!("Unknown currency pair: {}", symbol);
                Response::NotFound { symbol }
            }
            other => {
                error!("Control command for {} failed: {}", symbol, other);
                Response::Error {
                    message: other.to_string(),
                }
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ChannelHandle;
    use rust_decimal_macros::dec;

    fn dispatcher() -> Dispatcher {
        let config = InstrumentConfig::from_pairs([("EURUSD", dec!(1.1)), ("GBPUSD", dec!(1.27))]).unwrap();
        Dispatcher::new(&config, DispatcherOptions::default()).unwrap()
    }

    #[test]
    fn control_commands_map_to_responses() {
        let d = dispatcher();

        assert_eq!(
            d.execute(Command::StartPricing {
                symbol: "EURUSD".into()
            }),
            Response::Ok {
                message: "Started pricing for EURUSD".into()
            }
        );
        assert_eq!(
            d.execute(Command::PausePricing {
                symbol: "NOPE".into()
            }),
            Response::NotFound {
                symbol: "NOPE".into()
            }
        );
        assert_eq!(
            d.execute(Command::PricingState),
            Response::PricingState {
                state: BTreeMap::from([("EURUSD".into(), true), ("GBPUSD".into(), false)])
            }
        );
        assert_eq!(
            d.execute(Command::Instruments),
            Response::Instruments {
                symbols: vec!["EURUSD".into(), "GBPUSD".into()]
            }
        );
        assert!(matches!(
            d.execute(Command::Subscribe { user_id: "u".into() }),
            Response::Error { .. }
        ));
    }

    #[test]
    fn metrics_command_reports_gauges() {
        let d = dispatcher();
        let (handle, _rx) = ChannelHandle::pair("u", 4);
        d.open_stream("u", Box::new(handle));

        assert_eq!(
            d.execute(Command::Metrics),
            Response::Metrics {
                connections: 1,
                streams: 0
            }
        );
    }

    #[test]
    fn shutdown_closes_streams_and_is_idempotent() {
        let d = dispatcher();
        let (handle, rx) = ChannelHandle::pair("u", 4);
        d.open_stream("u", Box::new(handle));
        d.start_all().unwrap();

        d.shutdown();
        d.shutdown();

        assert!(rx.is_closed());
        assert_eq!(d.active_connections(), 0);
        assert!(d.registry().is_empty());
        assert!(d.start("EURUSD").is_err());
    }

    #[test]
    fn zero_metrics_interval_is_rejected() {
        let config = InstrumentConfig::from_pairs([("EURUSD", dec!(1.1))]).unwrap();
        let options = DispatcherOptions {
            metrics_interval: Duration::ZERO,
            ..DispatcherOptions::default()
        };
        assert!(Dispatcher::new(&config, options).is_err());
    }
}
