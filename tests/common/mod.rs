//! Shared fakes for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use intake_connect::connection::Dialer;
use intake_connect::{Diagnostic, DiagnosticSink, Error, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::Level;

/// Route test output through the libtest writer when RUST_LOG is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Keeps every diagnostic it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m.starts_with(prefix))
            .count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, diagnostic: &Diagnostic<'_>) {
        self.events
            .lock()
            .unwrap()
            .push((diagnostic.level(), diagnostic.to_string()));
    }
}

fn refused(host: &str, port: u16) -> Error {
    Error::Dial {
        target: format!("{}:{}", host, port),
        source: io::Error::from(io::ErrorKind::ConnectionRefused),
    }
}

/// Fails the first `failures` dials, then connects to `target`.
#[derive(Debug)]
pub struct FlakyDialer {
    failures_left: AtomicUsize,
    target: SocketAddr,
    make_error: fn(&str, u16) -> Error,
    pub dials: AtomicUsize,
}

impl FlakyDialer {
    /// Failures are refused connections
    pub fn new(failures: usize, target: SocketAddr) -> Arc<Self> {
        Self::with_error(failures, target, refused)
    }

    /// Failures are built by `make_error`
    pub fn with_error(
        failures: usize,
        target: SocketAddr,
        make_error: fn(&str, u16) -> Error,
    ) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            target,
            make_error,
            dials: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Dialer for FlakyDialer {
    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let refuse = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err((self.make_error)(host, port));
        }
        Ok(TcpStream::connect(self.target).await?)
    }
}

/// Takes `delay` per dial and records how many dials overlap.
#[derive(Debug)]
pub struct SlowDialer {
    delay: Duration,
    target: SocketAddr,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub dials: AtomicUsize,
}

impl SlowDialer {
    pub fn new(delay: Duration, target: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            delay,
            target,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            dials: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Dialer for SlowDialer {
    async fn dial(&self, _host: &str, _port: u16) -> Result<TcpStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        let result = TcpStream::connect(self.target).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(result?)
    }
}

/// A listener whose accepted sockets are kept open until the test ends.
pub async fn start_sink_backend() -> (SocketAddr, Arc<tokio::sync::Mutex<Vec<TcpStream>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(tokio::sync::Mutex::new(Vec::new()));

    let held = accepted.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            held.lock().await.push(socket);
        }
    });

    (addr, accepted)
}

/// Minimal SOCKS5 proxy: no auth, CONNECT only, never dials out.
///
/// Each request's target is recorded. The first `reject` requests are
/// answered with "connection refused"; later ones succeed and the tunnel
/// stays open, discarding whatever the client sends.
pub async fn start_fake_socks5(reject: usize) -> (SocketAddr, Arc<Mutex<Vec<(String, u16)>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let rejections_left = Arc::new(AtomicUsize::new(reject));

    let recorded = requests.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let recorded = recorded.clone();
            let rejections_left = rejections_left.clone();
            tokio::spawn(async move {
                let mut greeting = [0u8; 2];
                socket.read_exact(&mut greeting).await.unwrap();
                let mut methods = vec![0u8; greeting[1] as usize];
                socket.read_exact(&mut methods).await.unwrap();
                socket.write_all(&[0x05, 0x00]).await.unwrap();

                let mut header = [0u8; 4];
                socket.read_exact(&mut header).await.unwrap();
                assert_eq!(header[1], 0x01, "only CONNECT is expected");
                let host = match header[3] {
                    0x01 => {
                        let mut ip = [0u8; 4];
                        socket.read_exact(&mut ip).await.unwrap();
                        std::net::Ipv4Addr::from(ip).to_string()
                    }
                    0x03 => {
                        let len = socket.read_u8().await.unwrap();
                        let mut name = vec![0u8; len as usize];
                        socket.read_exact(&mut name).await.unwrap();
                        String::from_utf8(name).unwrap()
                    }
                    other => panic!("unexpected address type {}", other),
                };
                let port = socket.read_u16().await.unwrap();
                recorded.lock().unwrap().push((host, port));

                let refuse = rejections_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                let rep = if refuse { 0x05 } else { 0x00 };
                socket
                    .write_all(&[0x05, rep, 0x00, 0x01, 127, 0, 0, 1, 0x04, 0x38])
                    .await
                    .unwrap();
                if refuse {
                    return;
                }

                let mut sink = Vec::new();
                let _ = socket.read_to_end(&mut sink).await;
            });
        }
    });

    (addr, requests)
}
