//! Error types shared between client and server.
//!
//! The `DispatchError` enum unifies the failure cases of the dispatcher: I/O and
//! serialization problems, instrument config loading, subscriber delivery faults,
//! channel communication and scheduler shutdown, allowing crates to propagate a
//! single error type.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by client and server.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The instrument list could not be loaded. Startup-fatal.
    #[error("Instrument config error at line {line}: {reason}")]
    ConfigLoad {
        /// 1-based line number, or 0 when the failure is not tied to a line.
        line: usize,
        /// What was wrong with the source.
        reason: String,
    },

    /// A control command named an instrument that is not configured.
    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),

    /// A subscriber did not accept a payload within the write deadline.
    #[error("Write deadline exceeded for subscriber {0}")]
    WriteTimeout(String),

    /// The subscriber's side of the stream has gone away.
    #[error("Peer closed for subscriber {0}")]
    PeerClosed(String),

    /// Crossbeam/channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Crossbeam/channel receive failed (e.g., sender closed); contains a short context string.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),

    /// A task was submitted after the scheduler stopped.
    #[error("Scheduler is shut down")]
    SchedulerShutdown,

    /// Server settings failed validation.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl DispatchError {
    /// Shorthand for a config error tied to a specific line.
    pub fn config(line: usize, reason: impl Into<String>) -> Self {
        DispatchError::ConfigLoad {
            line,
            reason: reason.into(),
        }
    }
}

impl<T> From<PoisonError<T>> for DispatchError {
    fn from(err: PoisonError<T>) -> Self {
        DispatchError::MutexLock(err.to_string())
    }
}
