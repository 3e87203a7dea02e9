//! Connection registry and subscriber lifecycle.
//!
//! The registry is the only structure mutated from several independent call sites:
//! the broadcaster evicts failed subscribers while transport threads register new
//! ones and report completions and timeouts. It is a sharded `DashMap`, and
//! [`ConnectionRegistry::snapshot`] clones the entries out so that no shard lock is
//! held while quotes are written.
//!
//! Terminal transitions go through [`ConnectionRegistry::complete`],
//! [`ConnectionRegistry::time_out`] and [`ConnectionRegistry::fail`]. Whichever
//! fires first removes the entry (only if it still belongs to the same subscriber
//! instance), decrements the connection gauge and closes the handle; later calls
//! are no-ops.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use fx_common::DispatchError;
use log::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::model::subscriber::{LifecycleState, StreamHandle, Subscriber};

/// Concurrent map of open subscribers keyed by id.
pub struct ConnectionRegistry {
    entries: DashMap<String, Arc<Subscriber>>,
    metrics: Arc<Metrics>,
    next_serial: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry reporting into `metrics`.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            entries: DashMap::new(),
            metrics,
            next_serial: AtomicU64::new(1),
        }
    }

    /// Add a subscriber and count its connection.
    ///
    /// If `id` is already registered, the previous subscriber is completed (its
    /// handle closed and its connection uncounted) before the new one takes over.
    pub fn register(&self, id: impl Into<String>, handle: Box<dyn StreamHandle>) -> Arc<Subscriber> {
        let id = id.into();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber::new(id.clone(), serial, handle));

        self.metrics.increment_connections();
        let previous = self.entries.insert(id.clone(), Arc::clone(&subscriber));
        if let Some(previous) = previous {
            info!("Replacing existing stream for user: {}", id);
            self.complete(&previous);
        }
        info!("Stream registered for user: {}", id);
        subscriber
    }

    /// Complete and remove the live subscriber for `id`, if any. Idempotent.
    pub fn unregister(&self, id: &str) -> bool {
        let Some(subscriber) = self.get(id) else {
            return false;
        };
        let removed = self.complete(&subscriber);
        if removed {
            debug!("Stream unregistered for user: {}", id);
        }
        removed
    }

    /// Remove the entry for `subscriber` only if it has not been replaced since.
    pub fn unregister_subscriber(&self, subscriber: &Subscriber) -> bool {
        self.entries
            .remove_if(subscriber.id(), |_, current| current.serial() == subscriber.serial())
            .is_some()
    }

    /// Current subscribers. Weakly consistent with concurrent changes.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.entries.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Registered subscriber for `id`.
    pub fn get(&self, id: &str) -> Option<Arc<Subscriber>> {
        self.entries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normal end of the stream.
    pub fn complete(&self, subscriber: &Subscriber) -> bool {
        self.finish(subscriber, LifecycleState::Completed, None)
    }

    /// The stream exceeded its idle limit.
    pub fn time_out(&self, subscriber: &Subscriber) -> bool {
        self.finish(subscriber, LifecycleState::TimedOut, None)
    }

    /// The stream failed.
    pub fn fail(&self, subscriber: &Subscriber, cause: &DispatchError) -> bool {
        self.finish(subscriber, LifecycleState::Errored, Some(cause))
    }

    /// Complete every registered subscriber. Used on shutdown.
    pub fn close_all(&self) -> usize {
        self.snapshot().iter().filter(|sub| self.complete(sub)).count()
    }

    fn finish(
        &self,
        subscriber: &Subscriber,
        terminal: LifecycleState,
        cause: Option<&DispatchError>,
    ) -> bool {
        if !subscriber.transition(terminal) {
            return false;
        }
        self.unregister_subscriber(subscriber);
        self.metrics.decrement_connections();

        let id = subscriber.id();
        match (terminal, cause) {
            (LifecycleState::TimedOut, _) => {
                subscriber.handle().close();
                warn!("Stream timed out for user: {}", id);
            }
            (LifecycleState::Errored, Some(cause)) => {
                subscriber.handle().close_with_error(cause);
                error!("Stream encountered an error for user: {}: {}", id, cause);
            }
            _ => {
                subscriber.handle().close();
                info!("Stream completed for user: {}", id);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ChannelHandle;
    use std::thread;

    fn registry() -> (ConnectionRegistry, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        (ConnectionRegistry::new(Arc::clone(&metrics)), metrics)
    }

    #[test]
    fn register_counts_connections() {
        let (registry, metrics) = registry();
        let (handle, _rx) = ChannelHandle::pair("a", 4);
        registry.register("a", Box::new(handle));

        assert!(registry.contains("a"));
        assert_eq!(registry.len(), 1);
        assert_eq!(metrics.active_connections(), 1);
    }

    #[test]
    fn unregister_absent_id_is_a_no_op() {
        let (registry, metrics) = registry();
        assert!(!registry.unregister("ghost"));
        assert!(registry.is_empty());
        assert_eq!(metrics.active_connections(), 0);
    }

    #[test]
    fn unregister_live_subscriber_closes_and_uncounts_it() {
        let (registry, metrics) = registry();
        let (handle, rx) = ChannelHandle::pair("a", 4);
        let sub = registry.register("a", Box::new(handle));

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));

        assert_eq!(sub.state(), LifecycleState::Completed);
        assert_eq!(metrics.active_connections(), 0);
        assert!(registry.is_empty());
        assert!(rx.is_closed());
    }

    #[test]
    fn terminal_transitions_decrement_exactly_once() {
        let (registry, metrics) = registry();
        let (handle, rx) = ChannelHandle::pair("a", 4);
        let sub = registry.register("a", Box::new(handle));

        assert!(registry.time_out(&sub));
        assert!(!registry.complete(&sub));
        assert!(!registry.fail(&sub, &DispatchError::PeerClosed("a".into())));
        assert!(!registry.unregister("a"));

        assert_eq!(sub.state(), LifecycleState::TimedOut);
        assert_eq!(metrics.active_connections(), 0);
        assert!(registry.is_empty());
        assert!(rx.is_closed());
    }

    #[test]
    fn duplicate_id_closes_the_previous_handle() {
        let (registry, metrics) = registry();
        let (first_handle, first_rx) = ChannelHandle::pair("a", 4);
        let (second_handle, second_rx) = ChannelHandle::pair("a", 4);

        let first = registry.register("a", Box::new(first_handle));
        let second = registry.register("a", Box::new(second_handle));

        assert_eq!(first.state(), LifecycleState::Completed);
        assert!(first_rx.is_closed());
        assert!(!second_rx.is_closed());
        assert_eq!(registry.len(), 1);
        assert_eq!(metrics.active_connections(), 1);

        // A late callback from the replaced stream must not evict its successor.
        assert!(!registry.complete(&first));
        assert!(!registry.unregister_subscriber(&first));
        assert_eq!(registry.get("a").map(|s| s.serial()), Some(second.serial()));
    }

    #[test]
    fn concurrent_registrations_are_not_lost() {
        let (registry, metrics) = registry();
        let registry = Arc::new(registry);
        let mut receivers = Vec::new();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let id = format!("user-{i}");
                let (handle, rx) = ChannelHandle::pair(&id, 4);
                receivers.push(rx);
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry.register(id, Box::new(handle));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.len(), 32);
        assert_eq!(registry.snapshot().len(), 32);
        assert_eq!(metrics.active_connections(), 32);
    }

    #[test]
    fn close_all_completes_everyone() {
        let (registry, metrics) = registry();
        let mut receivers = Vec::new();
        for id in ["a", "b", "c"] {
            let (handle, rx) = ChannelHandle::pair(id, 4);
            receivers.push(rx);
            registry.register(id, Box::new(handle));
        }

        assert_eq!(registry.close_all(), 3);
        assert!(registry.is_empty());
        assert_eq!(metrics.active_connections(), 0);
        assert!(receivers.iter().all(|rx| rx.is_closed()));
    }
}
