//! Quote fan-out.
//!
//! The broadcaster is the engine's [`QuoteSink`]. Each quote is serialized once
//! and written to every subscriber in a registry snapshot. A failed write (peer
//! gone, deadline exceeded) evicts that subscriber only and the loop moves on;
//! there are no retries.

use std::sync::Arc;
use std::time::Duration;

use fx_common::Quote;
use log::{error, warn};

use crate::metrics::Metrics;
use crate::pricer::QuoteSink;
use crate::registry::ConnectionRegistry;

/// Writes quotes to all registered subscribers.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
    write_timeout: Duration,
}

impl Broadcaster {
    /// Create a broadcaster bounding each per-subscriber write by `write_timeout`.
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<Metrics>, write_timeout: Duration) -> Self {
        Self {
            registry,
            metrics,
            write_timeout,
        }
    }

    /// Deliver `quote` to every registered subscriber and return how many accepted it.
    pub fn send(&self, quote: &Quote) -> usize {
        let payload = match quote.to_json_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize quote for {}: {}", quote.symbol, e);
                return 0;
            }
        };

        let mut delivered = 0;
        for subscriber in self.registry.snapshot() {
            let stream = self.metrics.begin_stream();
            let result = subscriber.write(&payload, self.write_timeout);
            drop(stream);

            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Error sending price update to user: {}: {}", subscriber.id(), e);
                    self.registry.fail(&subscriber, &e);
                }
            }
        }
        delivered
    }
}

impl QuoteSink for Broadcaster {
    fn publish(&self, quote: Quote) {
        self.send(&quote);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{ChannelHandle, StreamReceiver};
    use rust_decimal_macros::dec;
    use std::thread;

    fn setup() -> (Broadcaster, Arc<ConnectionRegistry>, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&metrics)));
        let broadcaster = Broadcaster::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Duration::from_millis(10),
        );
        (broadcaster, registry, metrics)
    }

    fn subscribe(registry: &ConnectionRegistry, id: &str) -> StreamReceiver {
        let (handle, rx) = ChannelHandle::pair(id, 8);
        registry.register(id, Box::new(handle));
        rx
    }

    fn quote() -> Quote {
        Quote::new("EURUSD", dec!(1.1000), dec!(1.1002))
    }

    #[test]
    fn delivers_to_every_subscriber() {
        let (broadcaster, registry, metrics) = setup();
        let receivers: Vec<_> = (0..5).map(|i| subscribe(&registry, &format!("u{i}"))).collect();

        assert_eq!(broadcaster.send(&quote()), 5);
        for rx in &receivers {
            let frames = rx.drain();
            assert_eq!(frames.len(), 1);
            assert_eq!(Quote::from_json_bytes(&frames[0]).unwrap().symbol, "EURUSD");
        }
        assert_eq!(metrics.active_streams(), 0);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn one_failing_subscriber_does_not_affect_the_rest() {
        let (broadcaster, registry, metrics) = setup();
        let mut receivers: Vec<_> = (0..5).map(|i| subscribe(&registry, &format!("u{i}"))).collect();
        let broken = receivers.remove(2);
        drop(broken);

        assert_eq!(broadcaster.send(&quote()), 4);
        assert_eq!(registry.len(), 4);
        assert!(!registry.contains("u2"));
        assert!(receivers.iter().all(|rx| rx.drain().len() == 1));
        assert_eq!(metrics.active_streams(), 0);
        assert_eq!(metrics.active_connections(), 4);
    }

    #[test]
    fn slow_subscriber_is_evicted_after_the_deadline() {
        let (broadcaster, registry, _metrics) = setup();
        let (handle, slow_rx) = ChannelHandle::pair("slow", 1);
        registry.register("slow", Box::new(handle));
        let fast_rx = subscribe(&registry, "fast");

        assert_eq!(broadcaster.send(&quote()), 2);
        assert_eq!(broadcaster.send(&quote()), 1);

        assert!(!registry.contains("slow"));
        assert!(slow_rx.is_closed());
        assert_eq!(fast_rx.drain().len(), 2);
    }

    #[test]
    fn empty_registry_delivers_nothing() {
        let (broadcaster, _registry, metrics) = setup();
        assert_eq!(broadcaster.send(&quote()), 0);
        assert_eq!(metrics.active_streams(), 0);
    }

    #[test]
    fn concurrent_registration_then_broadcast_reaches_all() {
        let (broadcaster, registry, _metrics) = setup();
        let joins: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || subscribe(&registry, &format!("c{i}")))
            })
            .collect();
        let receivers: Vec<StreamReceiver> = joins.into_iter().map(|j| j.join().unwrap()).collect();

        assert_eq!(broadcaster.send(&quote()), 16);
        assert!(receivers.iter().all(|rx| rx.drain().len() == 1));
    }
}
