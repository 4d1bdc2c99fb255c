mod common;

use bytes::Bytes;
use futures::SinkExt;
use quinn::{ConnectionError, VarInt};
use serde_json::json;
use std::time::Duration;
use tripwire_notify::{
    ChannelError, ChannelState, Notification, NotificationChannel, NotificationLog,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn channel(server: &common::TestServer) -> NotificationChannel {
    NotificationChannel::new(
        server.roots.clone(),
        server.addr.to_string(),
        "localhost",
        Notification::registration("desk-7", "alice"),
    )
    .unwrap()
}

fn numbered(n: usize) -> Vec<Notification> {
    (0..n)
        .map(|i| Notification::new(json!({ "type": "opened", "seq": i })))
        .collect()
}

#[tokio::test]
async fn registers_then_logs_messages_in_arrival_order() {
    let expected = numbered(50);
    let to_send = expected.clone();
    let (server, server_task) = common::start(move |conn, mut sink, registration| async move {
        common::send_all(&mut sink, &to_send).await;
        sink.get_mut().finish().unwrap();
        let _ = conn.closed().await;
        registration
    });

    let session = channel(&server).spawn(NotificationLog::new());

    // Concurrent readers must only ever observe a prefix of the sent sequence.
    let mut readers = Vec::new();
    for _ in 0..4 {
        let log = session.log().clone();
        let expected = expected.clone();
        readers.push(tokio::spawn(async move {
            loop {
                let seen = log.snapshot().await;
                assert_eq!(seen[..], expected[..seen.len()]);
                if seen.len() == expected.len() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    let log = session.log().clone();
    let state = tokio::time::timeout(TEST_TIMEOUT, session.join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, ChannelState::Closed);
    assert_eq!(log.snapshot().await, expected);

    for reader in readers {
        tokio::time::timeout(TEST_TIMEOUT, reader)
            .await
            .unwrap()
            .unwrap();
    }

    let registration = server_task.await.unwrap();
    assert_eq!(registration, Notification::registration("desk-7", "alice"));
}

#[tokio::test]
async fn decode_failure_fails_the_session_and_keeps_prior_entries() {
    let (server, server_task) = common::start(|conn, mut sink, _| async move {
        common::send_all(&mut sink, &numbered(2)).await;
        sink.send(Bytes::from_static(b"{not json")).await.unwrap();
        conn.closed().await
    });

    let session = channel(&server).spawn(NotificationLog::new());
    let mut state = session.subscribe();
    let log = session.log().clone();

    let err = tokio::time::timeout(TEST_TIMEOUT, session.join())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ChannelError::Decode(_)), "{err:?}");
    assert_eq!(*state.borrow_and_update(), ChannelState::Failed);
    assert_eq!(log.snapshot().await, numbered(2));

    match server_task.await.unwrap() {
        ConnectionError::ApplicationClosed(close) => {
            assert_eq!(close.error_code, VarInt::from_u32(2));
            assert_eq!(close.reason.as_ref(), b"decode error");
        }
        other => panic!("unexpected close: {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_closes_with_cancelled_code() {
    let (server, server_task) = common::start(|conn, mut sink, _| async move {
        common::send_all(&mut sink, &numbered(1)).await;
        // Hold the stream open until the client goes away.
        conn.closed().await
    });

    let session = channel(&server).spawn(NotificationLog::new());
    tokio::time::timeout(TEST_TIMEOUT, async {
        while session.log().len().await < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(session.state(), ChannelState::Streaming);

    let state = tokio::time::timeout(TEST_TIMEOUT, session.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, ChannelState::Closed);

    match server_task.await.unwrap() {
        ConnectionError::ApplicationClosed(close) => {
            assert_eq!(close.error_code, VarInt::from_u32(1));
            assert_eq!(close.reason.as_ref(), b"cancelled");
        }
        other => panic!("unexpected close: {other:?}"),
    }
}

#[tokio::test]
async fn unresponsive_peer_times_out_during_dial() {
    // Bound but never answered: the handshake cannot complete.
    let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = silent.local_addr().unwrap();

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let mut roots = rustls::RootCertStore::empty();
    roots.add(certified.cert.der().clone()).unwrap();

    let session = NotificationChannel::new(
        roots,
        addr.to_string(),
        "localhost",
        Notification::registration("c", "u"),
    )
    .unwrap()
    .with_handshake_timeout(Duration::from_millis(200))
    .spawn(NotificationLog::new());

    let err = tokio::time::timeout(TEST_TIMEOUT, session.join())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ChannelError::DialTimeout { .. }), "{err:?}");
}

#[tokio::test]
async fn untrusted_server_certificate_fails() {
    let (server, _server_task) = common::start(|conn, _sink, _| async move { conn.closed().await });

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let mut other_roots = rustls::RootCertStore::empty();
    other_roots.add(certified.cert.der().clone()).unwrap();

    let session = NotificationChannel::new(
        other_roots,
        server.addr.to_string(),
        "localhost",
        Notification::registration("c", "u"),
    )
    .unwrap()
    .spawn(NotificationLog::new());

    let err = tokio::time::timeout(TEST_TIMEOUT, session.join())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ChannelError::Connection(_)), "{err:?}");
}
