//! Idle tracking for subscriber streams.
//!
//! The monitor remembers when each open subscriber last received a frame. A
//! periodic sweep calls [`IdleMonitor::check_timeouts`], which returns every
//! subscriber idle for longer than the limit and forgets it; subscribers that
//! already reached a terminal state are dropped silently on the same pass.
//!
//! Time is measured with `std::time::Instant`, so clock changes do not cause
//! spurious timeouts. The monitor is not synchronized; share it behind a `Mutex`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::model::subscriber::Subscriber;

struct Tracked {
    subscriber: Arc<Subscriber>,
    last_activity: Instant,
}

/// Tracks subscriber activity against an idle limit.
pub struct IdleMonitor {
    clients: HashMap<u64, Tracked>,
    timeout: Duration,
}

impl IdleMonitor {
    /// Create a monitor with the given idle limit.
    pub fn new(timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            timeout,
        }
    }

    /// Start tracking `subscriber`, counting it as active now.
    pub fn track(&mut self, subscriber: Arc<Subscriber>) {
        self.clients.insert(
            subscriber.serial(),
            Tracked {
                subscriber,
                last_activity: Instant::now(),
            },
        );
    }

    /// Record activity for the subscriber with `serial`.
    pub fn touch(&mut self, serial: u64) {
        if let Some(tracked) = self.clients.get_mut(&serial) {
            tracked.last_activity = Instant::now();
        }
    }

    /// Stop tracking the subscriber with `serial`.
    pub fn forget(&mut self, serial: u64) {
        self.clients.remove(&serial);
    }

    /// Remove and return every open subscriber idle for longer than the limit.
    pub fn check_timeouts(&mut self) -> Vec<Arc<Subscriber>> {
        self.check_timeouts_at(Instant::now())
    }

    fn check_timeouts_at(&mut self, now: Instant) -> Vec<Arc<Subscriber>> {
        let timeout = self.timeout;
        let mut timed_out = Vec::new();

        self.clients.retain(|_, tracked| {
            if !tracked.subscriber.is_open() {
                false
            } else if now.saturating_duration_since(tracked.last_activity) > timeout {
                timed_out.push(Arc::clone(&tracked.subscriber));
                false
            } else {
                true
            }
        });
        timed_out
    }

    /// Number of tracked subscribers.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ChannelHandle;
    use crate::model::subscriber::LifecycleState;

    fn subscriber(serial: u64) -> Arc<Subscriber> {
        let (handle, _rx) = ChannelHandle::pair("idle", 1);
        Arc::new(Subscriber::new(format!("user-{serial}"), serial, Box::new(handle)))
    }

    #[test]
    fn reports_idle_subscribers_once() {
        let mut monitor = IdleMonitor::new(Duration::from_secs(5));
        monitor.track(subscriber(1));
        monitor.track(subscriber(2));

        let later = Instant::now() + Duration::from_secs(6);
        monitor.touch(2);
        let mut expired: Vec<u64> = monitor.check_timeouts_at(later).iter().map(|s| s.serial()).collect();
        expired.sort_unstable();

        assert_eq!(expired, vec![1, 2]);
        assert!(monitor.is_empty());
        assert!(monitor.check_timeouts_at(later).is_empty());
    }

    #[test]
    fn touch_keeps_a_subscriber_alive() {
        let mut monitor = IdleMonitor::new(Duration::from_millis(50));
        monitor.track(subscriber(1));
        monitor.touch(1);

        assert!(monitor.check_timeouts().is_empty());
        assert_eq!(monitor.len(), 1);
    }

    #[test]
    fn finished_subscribers_are_dropped_without_a_timeout() {
        let mut monitor = IdleMonitor::new(Duration::from_secs(5));
        let sub = subscriber(1);
        monitor.track(Arc::clone(&sub));
        assert!(sub.transition(LifecycleState::Completed));

        let later = Instant::now() + Duration::from_secs(60);
        assert!(monitor.check_timeouts_at(later).is_empty());
        assert!(monitor.is_empty());
    }

    #[test]
    fn forget_stops_tracking() {
        let mut monitor = IdleMonitor::new(Duration::from_secs(5));
        monitor.track(subscriber(7));
        monitor.forget(7);
        assert!(monitor.is_empty());
    }
}
