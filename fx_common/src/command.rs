//! Shared protocol types used by client and server.
//!
//! Every request is a single JSON `Command` terminated by a newline; the server
//! answers with a single JSON `Response` line. A `Subscribe` command turns the
//! connection into a one-way quote stream after the `Subscribed` response.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Command payload sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Open a quote stream for the given subscriber id.
    Subscribe {
        /// Caller-supplied subscriber id.
        user_id: String,
    },
    /// List the configured instrument symbols.
    Instruments,
    /// Resume quote delivery for one instrument.
    StartPricing {
        /// Instrument symbol.
        symbol: String,
    },
    /// Suspend quote delivery for one instrument.
    PausePricing {
        /// Instrument symbol.
        symbol: String,
    },
    /// Resume every configured instrument.
    StartAllPricing,
    /// Suspend every configured instrument.
    PauseAllPricing,
    /// Read the active flag of every instrument.
    PricingState,
    /// Read the connection and stream gauges.
    Metrics,
}

impl Command {
    /// Encode as one newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>> {
        encode_line(self)
    }
}

/// Server answer to a `Command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Subscription accepted; quote frames follow on the same connection.
    Subscribed {
        /// Echo of the subscriber id.
        user_id: String,
    },
    /// Configured instrument symbols, sorted.
    Instruments {
        /// Symbols.
        symbols: Vec<String>,
    },
    /// A control command was applied.
    Ok {
        /// Human-readable confirmation.
        message: String,
    },
    /// A control command named an unknown instrument. Nothing changed.
    NotFound {
        /// The unknown symbol.
        symbol: String,
    },
    /// Active flag per instrument.
    PricingState {
        /// Symbol to active flag.
        state: BTreeMap<String, bool>,
    },
    /// Current gauges.
    Metrics {
        /// Open subscriber connections.
        connections: i64,
        /// In-flight send attempts.
        streams: i64,
    },
    /// The command could not be understood.
    Error {
        /// Reason.
        message: String,
    },
}

impl Response {
    /// Encode as one newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>> {
        encode_line(self)
    }
}

fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}
