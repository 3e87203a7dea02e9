//! Per-subscriber stream writer.
//!
//! Drains a subscriber's `StreamReceiver` onto its socket as `data: ...\n\n`
//! frames. The loop ends when the dispatcher closes the handle, when a socket
//! write fails (the subscriber is failed in the registry), or when the data
//! channel disconnects. Successful writes count as activity for the idle monitor.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crossbeam_channel::select;
use fx_common::net::frame;
use fx_common::{DispatchError, Result};
use log::{debug, error};

use crate::handle::{StreamEnd, StreamReceiver};
use crate::model::idle_monitor::IdleMonitor;
use crate::model::subscriber::Subscriber;
use crate::registry::ConnectionRegistry;

/// Write loop for one subscriber.
pub fn write_stream<W: Write>(
    mut out: W,
    rx: StreamReceiver,
    subscriber: &Subscriber,
    registry: &ConnectionRegistry,
    monitor: &Arc<Mutex<IdleMonitor>>,
) -> Result<()> {
    loop {
        select! {
            recv(rx.end_signal()) -> end => {
                if let Ok(StreamEnd::Failed(reason)) = end {
                    debug!("Stream for {} closed with error: {}", subscriber.id(), reason);
                }
                break;
            },
            recv(rx.data()) -> msg => match msg {
                Ok(payload) => {
                    if let Err(e) = out.write_all(&frame(&payload)).and_then(|_| out.flush()) {
                        let cause = DispatchError::Io(e);
                        registry.fail(subscriber, &cause);
                        return Err(cause);
                    }
                    monitor.lock()?.touch(subscriber.serial());
                },
                Err(e) => {
                    error!("Stream channel for {} disconnected: {}", subscriber.id(), e);
                    registry.fail(subscriber, &DispatchError::ChannelRecv(e.to_string()));
                    break;
                },
            }
        }
    }
    Ok(())
}
