//! Channel-backed stream handle.
//!
//! `ChannelHandle` is the `StreamHandle` the transport hands to the registry: the
//! broadcaster pushes serialized quotes into a bounded crossbeam channel and a
//! per-subscriber writer thread drains it onto the socket. A full channel is
//! backpressure; `write` waits at most the deadline and then reports
//! `WriteTimeout`. A dropped receiver is reported as `PeerClosed`.
//!
//! Closing is signalled on a separate one-slot channel so the writer can stop
//! without waiting for the data channel to drain.

use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use fx_common::{DispatchError, Result};

use crate::model::subscriber::StreamHandle;

/// How a stream was closed from the dispatcher side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Normal completion.
    Completed,
    /// Completion caused by an error.
    Failed(String),
}

/// Writing half, owned by the registry entry.
pub struct ChannelHandle {
    id: String,
    data_tx: Sender<Vec<u8>>,
    end_tx: Sender<StreamEnd>,
}

/// Reading half, owned by whoever delivers frames to the subscriber.
pub struct StreamReceiver {
    data_rx: Receiver<Vec<u8>>,
    end_rx: Receiver<StreamEnd>,
}

impl ChannelHandle {
    /// Create a handle buffering up to `capacity` payloads.
    pub fn pair(id: &str, capacity: usize) -> (ChannelHandle, StreamReceiver) {
        let (data_tx, data_rx) = bounded(capacity);
        let (end_tx, end_rx) = bounded(1);
        (
            ChannelHandle {
                id: id.to_string(),
                data_tx,
                end_tx,
            },
            StreamReceiver { data_rx, end_rx },
        )
    }
}

impl StreamHandle for ChannelHandle {
    fn write(&self, payload: &[u8], deadline: Duration) -> Result<()> {
        self.data_tx
            .send_timeout(payload.to_vec(), deadline)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DispatchError::WriteTimeout(self.id.clone()),
                SendTimeoutError::Disconnected(_) => DispatchError::PeerClosed(self.id.clone()),
            })
    }

    fn close(&self) {
        let _ = self.end_tx.try_send(StreamEnd::Completed);
    }

    fn close_with_error(&self, error: &DispatchError) {
        let _ = self.end_tx.try_send(StreamEnd::Failed(error.to_string()));
    }
}

impl StreamReceiver {
    /// Serialized quotes.
    pub fn data(&self) -> &Receiver<Vec<u8>> {
        &self.data_rx
    }

    /// Close signal.
    pub fn end_signal(&self) -> &Receiver<StreamEnd> {
        &self.end_rx
    }

    /// Whether a close signal is pending. Does not consume it.
    pub fn is_closed(&self) -> bool {
        !self.end_rx.is_empty()
    }

    /// Take every payload currently buffered.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.data_rx.try_iter().collect()
    }
}
