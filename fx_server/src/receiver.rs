//! TCP front end: command lines in, responses and quote frames out.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use fx_common::{Command, DispatchError, Response, Result};
use log::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::handle::ChannelHandle;
use crate::model::idle_monitor::IdleMonitor;
use crate::stream::write_stream;

/// Transport tunables.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// A stream with no delivered frame for this long is timed out.
    pub idle_timeout: Duration,
    /// How often idle streams are swept.
    pub sweep_interval: Duration,
    /// Socket write timeout for stream frames.
    pub socket_write_timeout: Duration,
    /// Frames buffered per subscriber before writes start to wait.
    pub buffer: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(1),
            socket_write_timeout: Duration::from_secs(5),
            buffer: 256,
        }
    }
}

/// TCP front end accepting control commands and quote subscriptions.
///
/// Each accepted connection gets its own thread reading newline-delimited JSON
/// `Command`s and answering with one `Response` line each. A `subscribe` command
/// switches the connection into streaming mode: the subscriber is registered with
/// the dispatcher, a reader watches for the peer closing, and the connection
/// thread becomes the frame writer.
pub struct StreamServer {
    /// The underlying TCP listening socket.
    pub(crate) socket: TcpListener,
    dispatcher: Arc<Dispatcher>,
    monitor: Arc<Mutex<IdleMonitor>>,
    options: StreamOptions,
}

impl StreamServer {
    /// Bind to `bind_addr` (e.g., `0.0.0.0:8080`) and start the idle sweep.
    pub fn bind(bind_addr: &str, dispatcher: Arc<Dispatcher>, options: StreamOptions) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        let monitor = Arc::new(Mutex::new(IdleMonitor::new(options.idle_timeout)));

        let sweep_monitor = Arc::clone(&monitor);
        let registry = Arc::clone(dispatcher.registry());
        dispatcher.schedule_periodic("idle-sweep", options.sweep_interval, move || {
            let timed_out = match sweep_monitor.lock() {
                Ok(mut monitor) => monitor.check_timeouts(),
                Err(e) => {
                    error!("Idle monitor unavailable: {}", e);
                    return;
                }
            };
            for subscriber in timed_out {
                registry.time_out(&subscriber);
            }
        })?;

        Ok(Self {
            socket,
            dispatcher,
            monitor,
            options,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking accept loop. A failure on one connection never stops the loop.
    pub fn serve(self) -> Result<()> {
        info!("Quote server is started on {}", self.socket.local_addr()?);

        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let monitor = Arc::clone(&self.monitor);
                    let options = self.options.clone();
                    let spawned = thread::Builder::new()
                        .name("fx-connection".to_string())
                        .spawn(move || {
                            let peer = stream.peer_addr().ok();
                            if let Err(e) = handle_connection(stream, &dispatcher, &monitor, &options) {
                                warn!("Connection {:?} ended with error: {}", peer, e);
                            }
                        });
                    if let Err(e) = spawned {
                        error!("Failed to spawn connection thread: {}", e);
                    }
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
        Ok(())
    }
}

fn handle_connection(
    stream: TcpStream,
    dispatcher: &Dispatcher,
    monitor: &Arc<Mutex<IdleMonitor>>,
    options: &StreamOptions,
) -> Result<()> {
    debug!("Connection from {:?}", stream.peer_addr());
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Command>(trimmed) {
            Ok(Command::Subscribe { user_id }) => {
                writer.write_all(&Response::Subscribed { user_id: user_id.clone() }.to_line()?)?;
                return run_subscription(&user_id, reader, writer, dispatcher, monitor, options);
            }
            Ok(command) => {
                info!("Received command {:?}", command);
                dispatcher.execute(command)
            }
            Err(e) => {
                warn!("Rejected malformed command: {}", e);
                Response::Error {
                    message: format!("invalid command: {e}"),
                }
            }
        };
        writer.write_all(&response.to_line()?)?;
    }
}

fn run_subscription(
    user_id: &str,
    mut reader: BufReader<TcpStream>,
    writer: TcpStream,
    dispatcher: &Dispatcher,
    monitor: &Arc<Mutex<IdleMonitor>>,
    options: &StreamOptions,
) -> Result<()> {
    writer.set_write_timeout(Some(options.socket_write_timeout))?;
    let (handle, rx) = ChannelHandle::pair(user_id, options.buffer);
    let subscriber = dispatcher.open_stream(user_id, Box::new(handle));
    monitor.lock()?.track(Arc::clone(&subscriber));

    let watcher = {
        let subscriber = Arc::clone(&subscriber);
        let registry = Arc::clone(dispatcher.registry());
        thread::Builder::new()
            .name("fx-peer-watch".to_string())
            .spawn(move || {
                let mut sink = [0u8; 256];
                loop {
                    match reader.read(&mut sink) {
                        Ok(0) => {
                            registry.complete(&subscriber);
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            registry.fail(&subscriber, &DispatchError::Io(e));
                            break;
                        }
                    }
                }
            })?
    };

    let result = write_stream(&writer, rx, &subscriber, dispatcher.registry(), monitor);

    let _ = writer.shutdown(Shutdown::Both);
    if watcher.join().is_err() {
        error!("Peer watcher for {} panicked", user_id);
    }
    monitor.lock()?.forget(subscriber.serial());
    result
}
