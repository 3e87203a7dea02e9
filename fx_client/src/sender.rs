//! Talking to the dispatcher over TCP.
//!
//! `CommandSender` writes one JSON command line, reads one JSON response line,
//! and for subscriptions keeps reading `data: ...` frames from the same connection.
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fx_common::net::unframe;
use fx_common::{Command, DispatchError, Quote, Response, Result};
use log::{debug, info, warn};

/// How long a blocked read waits before re-checking the shutdown flag.
const READ_POLL_MS: u64 = 500;

/// Connection to the server.
pub struct CommandSender {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl CommandSender {
    /// Connect to `server` (`host:port`).
    pub fn connect(server: &str) -> Result<Self> {
        let stream = TcpStream::connect(server)
            .map_err(|e| DispatchError::Format(format!("Failed to connect to server {server}: {e}")))?;
        stream.set_read_timeout(Some(Duration::from_millis(READ_POLL_MS)))?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
        })
    }

    /// Send `command` and wait for its response.
    pub fn send_command(&mut self, command: &Command) -> Result<Response> {
        info!("Sending command: {:?}", command);
        self.writer.write_all(&command.to_line()?)?;

        let mut line = String::new();
        loop {
            match self.reader.read_line(&mut line) {
                Ok(0) => return Err(DispatchError::PeerClosed("server".to_string())),
                Ok(_) => return Ok(serde_json::from_str(&line)?),
                Err(e) if is_poll_timeout(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read quote frames, calling `on_quote` for each, until the server closes the
    /// stream or `shutdown` is set.
    pub fn stream_quotes<F>(&mut self, shutdown: &Arc<AtomicBool>, mut on_quote: F) -> Result<usize>
    where
        F: FnMut(Quote),
    {
        let mut received = 0;
        let mut line = String::new();

        while !shutdown.load(Ordering::Relaxed) {
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    info!("Server closed the stream");
                    break;
                }
                Ok(_) => {
                    if let Some(payload) = unframe(&line) {
                        match Quote::from_json_bytes(payload.as_bytes()) {
                            Ok(quote) => {
                                received += 1;
                                on_quote(quote);
                            }
                            Err(e) => warn!("Skipping undecodable frame: {}", e),
                        }
                    } else if !line.trim().is_empty() {
                        debug!("Ignoring non-data line: {}", line.trim());
                    }
                    line.clear();
                }
                Err(e) if is_poll_timeout(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        info!("Receiver loop stopping...");
        Ok(received)
    }
}

fn is_poll_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
