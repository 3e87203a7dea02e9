use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fx_common::net::unframe;
use fx_common::{Command, Quote, Response};
use fx_server::{Dispatcher, DispatcherOptions, InstrumentConfig, StreamOptions, StreamServer};
use rust_decimal_macros::dec;

fn spawn_server(options: StreamOptions) -> (SocketAddr, Arc<Dispatcher>) {
    let config = InstrumentConfig::from_pairs([("EURUSD", dec!(1.1000)), ("USDJPY", dec!(151.20))]).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(&config, DispatcherOptions::default()).unwrap());
    let server = StreamServer::bind("127.0.0.1:0", Arc::clone(&dispatcher), options).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.serve());
    (addr, dispatcher)
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        Self {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        }
    }

    fn send_raw(&mut self, line: &str) -> Response {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.read_response()
    }

    fn send(&mut self, command: &Command) -> Response {
        self.writer.write_all(&command.to_line().unwrap()).unwrap();
        self.read_response()
    }

    fn read_response(&mut self) -> Response {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn next_quote(&mut self) -> Quote {
        let mut line = String::new();
        loop {
            line.clear();
            assert!(self.reader.read_line(&mut line).unwrap() > 0, "stream closed");
            if let Some(payload) = unframe(&line) {
                return Quote::from_json_bytes(payload.as_bytes()).unwrap();
            }
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn control_commands_round_trip() {
    let (addr, dispatcher) = spawn_server(StreamOptions::default());
    let mut client = Client::connect(addr);

    assert_eq!(
        client.send(&Command::Instruments),
        Response::Instruments {
            symbols: vec!["EURUSD".into(), "USDJPY".into()]
        }
    );
    assert!(matches!(
        client.send(&Command::StartPricing { symbol: "USDJPY".into() }),
        Response::Ok { .. }
    ));
    assert_eq!(
        client.send(&Command::PausePricing { symbol: "AUDNZD".into() }),
        Response::NotFound {
            symbol: "AUDNZD".into()
        }
    );
    match client.send(&Command::PricingState) {
        Response::PricingState { state } => {
            assert_eq!(state.get("USDJPY"), Some(&true));
            assert_eq!(state.get("EURUSD"), Some(&false));
        }
        other => panic!("unexpected response {other:?}"),
    }
    assert!(matches!(client.send(&Command::Metrics), Response::Metrics { .. }));
    dispatcher.shutdown();
}

#[test]
fn malformed_command_gets_an_error_and_the_connection_survives() {
    let (addr, dispatcher) = spawn_server(StreamOptions::default());
    let mut client = Client::connect(addr);

    assert!(matches!(client.send_raw("not json\n"), Response::Error { .. }));
    assert!(matches!(client.send_raw("{\"command\":\"login\"}\n"), Response::Error { .. }));
    assert!(matches!(client.send(&Command::PauseAllPricing), Response::Ok { .. }));
    dispatcher.shutdown();
}

#[test]
fn subscriber_receives_framed_quotes() {
    let (addr, dispatcher) = spawn_server(StreamOptions::default());
    let mut subscriber = Client::connect(addr);
    assert_eq!(
        subscriber.send(&Command::Subscribe { user_id: "alice".into() }),
        Response::Subscribed {
            user_id: "alice".into()
        }
    );
    assert!(wait_until(|| dispatcher.active_connections() == 1));

    dispatcher.start("EURUSD").unwrap();
    let quote = subscriber.next_quote();

    assert_eq!(quote.symbol, "EURUSD");
    assert!(quote.bid < quote.ask);
    dispatcher.shutdown();
}

#[test]
fn closing_the_socket_completes_the_subscriber() {
    let (addr, dispatcher) = spawn_server(StreamOptions::default());
    let mut subscriber = Client::connect(addr);
    subscriber.send(&Command::Subscribe { user_id: "bob".into() });
    assert!(wait_until(|| dispatcher.registry().contains("bob")));

    drop(subscriber);

    assert!(wait_until(|| !dispatcher.registry().contains("bob")));
    assert!(wait_until(|| dispatcher.active_connections() == 0));
    dispatcher.shutdown();
}

#[test]
fn idle_stream_times_out() {
    let options = StreamOptions {
        idle_timeout: Duration::from_millis(100),
        sweep_interval: Duration::from_millis(20),
        ..StreamOptions::default()
    };
    let (addr, dispatcher) = spawn_server(options);
    let mut subscriber = Client::connect(addr);
    subscriber.send(&Command::Subscribe { user_id: "carol".into() });
    assert!(wait_until(|| dispatcher.registry().contains("carol")));

    assert!(wait_until(|| !dispatcher.registry().contains("carol")));
    assert_eq!(dispatcher.active_connections(), 0);

    let mut rest = String::new();
    assert_eq!(subscriber.reader.read_line(&mut rest).unwrap_or(0), 0);
    dispatcher.shutdown();
}
