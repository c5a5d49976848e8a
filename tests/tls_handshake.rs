//! Full TLS handshakes against a local server with a generated certificate.

use intake_connect::{
    BackoffPolicy, ConnectionManager, ConnectionState, Error, ManagerConfig, TlsConfig,
};
use rcgen::{CertificateParams, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_test::assert_ok;
use tracing::Level;

mod common;
use common::{FlakyDialer, RecordingSink};

/// Self-signed certificate for `localhost` plus a CA file trusting it
struct TestCert {
    der: CertificateDer<'static>,
    acceptor: TlsAcceptor,
    ca_path: PathBuf,
}

impl Drop for TestCert {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.ca_path);
    }
}

fn localhost_cert() -> TestCert {
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    let key_pair = KeyPair::generate().unwrap();
    let params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    let cert = params.self_signed(&key_pair).unwrap();

    let ca_path = std::env::temp_dir().join(format!(
        "intake-connect-ca-{}-{}.pem",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::write(&ca_path, cert.pem()).unwrap();

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();

    TestCert {
        der: cert.der().clone(),
        acceptor: TlsAcceptor::from(Arc::new(server_config)),
        ca_path,
    }
}

/// Accept one TLS client, read `expect.len()` bytes, then hand the stream back
async fn accept_and_read(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    expect: &'static [u8],
) -> TlsStream<tokio::net::TcpStream> {
    let (socket, _) = listener.accept().await.unwrap();
    let mut tls = acceptor.accept(socket).await.unwrap();
    let mut buf = vec![0u8; expect.len()];
    tls.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, expect);
    tls
}

fn manager_trusting(
    cert: &TestCert,
    server_name: &str,
    backend: SocketAddr,
    sink: Arc<RecordingSink>,
) -> ConnectionManager {
    let tls = TlsConfig::builder()
        .ca_cert_path(cert.ca_path.to_string_lossy())
        .build()
        .unwrap();
    assert!(tls.ca_cert_path().is_some());

    let config = ManagerConfig::builder(server_name, backend.port())
        .tls_config(tls)
        .dialer(FlakyDialer::new(0, backend))
        .backoff(BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(10)))
        .build()
        .unwrap();
    ConnectionManager::with_sink(config, sink)
}

#[tokio::test]
async fn test_tls_close_notify_marks_peer_closed() {
    common::init_tracing();
    let cert = localhost_cert();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = listener.local_addr().unwrap();
    let sink = RecordingSink::new();
    let manager = manager_trusting(&cert, "localhost", backend, sink.clone());

    let server = tokio::spawn(async move {
        let mut tls = accept_and_read(listener, cert.acceptor.clone(), b"hello\n").await;
        tls.shutdown().await.unwrap();
        cert
    });

    let conn = manager.new_connection().await;
    assert!(conn.is_tls());
    assert_ok!(conn.write_all(b"hello\n").await);
    assert_ok!(conn.flush().await);

    tokio::time::timeout(Duration::from_secs(5), conn.closed())
        .await
        .expect("close_notify was not detected");
    let cert = server.await.unwrap();

    assert_eq!(conn.state(), ConnectionState::PeerClosed);
    assert!(matches!(
        conn.write_all(b"late\n").await,
        Err(Error::ConnectionClosed)
    ));
    let expected: [u8; 32] = Sha256::digest(cert.der.as_ref()).into();
    assert_eq!(conn.peer_certificate_fingerprint(), Some(expected));
    assert!(sink.messages(Level::WARN).is_empty());
    assert_eq!(sink.count_starting_with("connection to localhost"), 1);
}

#[tokio::test]
async fn test_tls_drop_without_close_notify_marks_peer_closed() {
    let cert = localhost_cert();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = listener.local_addr().unwrap();
    let sink = RecordingSink::new();
    let manager = manager_trusting(&cert, "localhost", backend, sink.clone());

    let acceptor = cert.acceptor.clone();
    let server = tokio::spawn(async move {
        let tls = accept_and_read(listener, acceptor, b"hello\n").await;
        // Plain FIN, no TLS alert
        let (tcp, _) = tls.into_inner();
        drop(tcp);
    });

    let conn = manager.new_connection().await;
    assert_ok!(conn.write_all(b"hello\n").await);
    assert_ok!(conn.flush().await);
    server.await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), conn.closed())
        .await
        .expect("unclean close was not detected");

    assert_eq!(conn.state(), ConnectionState::PeerClosed);
    assert!(sink.messages(Level::WARN).is_empty());
    assert!(matches!(
        conn.write_all(b"late\n").await,
        Err(Error::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_tls_name_mismatch_is_retried() {
    let cert = localhost_cert();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = listener.local_addr().unwrap();
    let handshakes = Arc::new(AtomicUsize::new(0));

    let acceptor = cert.acceptor.clone();
    let seen = handshakes.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            seen.fetch_add(1, Ordering::SeqCst);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let _ = acceptor.accept(socket).await;
            });
        }
    });

    // The certificate only names localhost
    let sink = RecordingSink::new();
    let manager = manager_trusting(&cert, "127.0.0.1", backend, sink.clone());

    let result = manager
        .new_connection_until(tokio::time::sleep(Duration::from_millis(300)))
        .await;

    assert!(result.is_none());
    assert!(handshakes.load(Ordering::SeqCst) >= 2);
    let warnings = sink.messages(Level::WARN);
    assert!(warnings.len() >= 2);
    assert!(warnings.iter().all(|w| w.contains("tls error")));
    assert!(manager.retry_count().await >= 2);
}
