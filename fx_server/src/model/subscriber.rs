//! Subscriber entries and the output handle abstraction.
//!
//! A `Subscriber` pairs a caller-supplied id with the `StreamHandle` its quotes are
//! written to. Its lifecycle is `Open` followed by exactly one terminal state; the
//! transition is a single compare-and-swap so that concurrent completion, timeout
//! and error paths agree on which one happened.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use fx_common::{DispatchError, Result};
use strum_macros::Display;

/// Lifecycle of a subscriber stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    /// Receiving quotes.
    Open,
    /// Closed normally by either side.
    Completed,
    /// Closed because the stream exceeded its idle limit.
    TimedOut,
    /// Closed because a write or the transport failed.
    Errored,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Open,
            1 => LifecycleState::Completed,
            2 => LifecycleState::TimedOut,
            _ => LifecycleState::Errored,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LifecycleState::Open => 0,
            LifecycleState::Completed => 1,
            LifecycleState::TimedOut => 2,
            LifecycleState::Errored => 3,
        }
    }

    /// All states other than `Open` are terminal.
    pub fn is_terminal(self) -> bool {
        self != LifecycleState::Open
    }
}

/// Long-lived output channel of one subscriber.
///
/// Implementations must bound `write` by `deadline` and must tolerate `close`
/// being called after the peer is gone.
pub trait StreamHandle: Send + Sync {
    /// Deliver one serialized quote.
    fn write(&self, payload: &[u8], deadline: Duration) -> Result<()>;

    /// Finish the stream normally.
    fn close(&self);

    /// Finish the stream because of `error`.
    fn close_with_error(&self, error: &DispatchError);
}

/// One registered subscriber.
pub struct Subscriber {
    id: String,
    serial: u64,
    handle: Box<dyn StreamHandle>,
    state: AtomicU8,
    opened_at: Instant,
}

impl Subscriber {
    pub(crate) fn new(id: String, serial: u64, handle: Box<dyn StreamHandle>) -> Self {
        Self {
            id,
            serial,
            handle,
            state: AtomicU8::new(LifecycleState::Open.as_u8()),
            opened_at: Instant::now(),
        }
    }

    /// Caller-supplied id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registry-assigned number distinguishing successive subscribers with the same id.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether the subscriber still accepts quotes.
    pub fn is_open(&self) -> bool {
        self.state() == LifecycleState::Open
    }

    /// Time since registration.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub(crate) fn write(&self, payload: &[u8], deadline: Duration) -> Result<()> {
        self.handle.write(payload, deadline)
    }

    pub(crate) fn handle(&self) -> &dyn StreamHandle {
        self.handle.as_ref()
    }

    /// Move from `Open` to `terminal`. Only the first caller wins.
    pub(crate) fn transition(&self, terminal: LifecycleState) -> bool {
        debug_assert!(terminal.is_terminal());
        self.state
            .compare_exchange(
                LifecycleState::Open.as_u8(),
                terminal.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("serial", &self.serial)
            .field("state", &self.state())
            .finish()
    }
}
