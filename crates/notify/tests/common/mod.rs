//! In-process QUIC notification server for channel tests.

use futures::{SinkExt, StreamExt};
use quinn::crypto::rustls::QuicServerConfig;
use quinn::{Connection, Endpoint, SendStream};
use rustls::RootCertStore;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tripwire_notify::{ALPN, Notification, frame_codec};

pub type FrameSink = FramedWrite<SendStream, LengthDelimitedCodec>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub roots: RootCertStore,
    // Keeps the endpoint alive for the duration of the test.
    _endpoint: Endpoint,
}

fn tls_pair() -> (rustls::ServerConfig, RootCertStore) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = certified.cert.der().clone();
    let key_der: PrivateKeyDer<'static> =
        PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()).into();

    let mut roots = RootCertStore::empty();
    roots.add(cert_der.clone()).unwrap();

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut server = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();
    server.alpn_protocols = vec![ALPN.to_vec()];
    (server, roots)
}

/// Start a server that accepts one connection, reads the registration frame
/// and hands the connection plus a framed sink to `script`.
pub fn start<F, Fut, T>(script: F) -> (TestServer, JoinHandle<T>)
where
    F: FnOnce(Connection, FrameSink, Notification) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tls, roots) = tls_pair();
    let config = quinn::ServerConfig::with_crypto(Arc::new(
        QuicServerConfig::try_from(tls).unwrap(),
    ));
    let endpoint = Endpoint::server(config, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = endpoint.local_addr().unwrap();

    let accept = endpoint.clone();
    let handle = tokio::spawn(async move {
        let incoming = accept.accept().await.expect("endpoint closed");
        let conn = incoming.await.expect("handshake failed");
        let (send, recv) = conn.accept_bi().await.expect("no stream opened");

        let mut frames = FramedRead::new(recv, frame_codec());
        let first = frames
            .next()
            .await
            .expect("stream ended before registration")
            .expect("registration frame unreadable");
        let registration = Notification::from_slice(&first).expect("registration not JSON");

        script(conn, FramedWrite::new(send, frame_codec()), registration).await
    });

    (
        TestServer {
            addr,
            roots,
            _endpoint: endpoint,
        },
        handle,
    )
}

/// Send each notification as one frame.
pub async fn send_all(sink: &mut FrameSink, notifications: &[Notification]) {
    for n in notifications {
        sink.send(n.to_bytes().unwrap()).await.unwrap();
    }
}
