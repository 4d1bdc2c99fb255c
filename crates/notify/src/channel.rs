//! QUIC notification channel: dial, register, then stream frames into the log.

use crate::error::{ChannelError, ChannelResult};
use crate::log::NotificationLog;
use crate::notification::Notification;
use futures::{SinkExt, StreamExt};
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{Connection, Endpoint, RecvStream, SendStream, VarInt};
use rustls::RootCertStore;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use tripwire_core::config::NotifyConfig;

/// ALPN protocol identifier negotiated during the handshake.
pub const ALPN: &[u8] = b"tripwire-notify";

/// Largest accepted frame payload (64 KiB).
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Default bound on connection setup.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Bound on flushing the close frame before the endpoint is dropped.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Codec for channel frames: 4-byte big-endian length prefix, then the payload.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Lifecycle of a channel session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Dialing,
    Registered,
    Streaming,
    Closed,
    Failed,
}

impl ChannelState {
    /// Whether the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Dialing => "dialing",
            Self::Registered => "registered",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Application close code and reason sent when the client tears down the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    Closed,
    Cancelled,
    DecodeError,
    TransportError,
}

impl CloseReason {
    pub fn code(&self) -> u32 {
        match self {
            Self::Closed => 0,
            Self::Cancelled => 1,
            Self::DecodeError => 2,
            Self::TransportError => 3,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::DecodeError => "decode error",
            Self::TransportError => "transport error",
        }
    }

    fn for_error(err: &ChannelError) -> Self {
        match err {
            ChannelError::Decode(_) => Self::DecodeError,
            _ => Self::TransportError,
        }
    }
}

/// Load trusted CA certificates from a PEM bundle.
pub fn load_root_certificates(path: impl AsRef<Path>) -> ChannelResult<RootCertStore> {
    let path = path.as_ref();
    let mut roots = RootCertStore::empty();
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| ChannelError::Tls(format!("failed to read {}: {e}", path.display())))?;
    for cert in certs {
        let cert =
            cert.map_err(|e| ChannelError::Tls(format!("invalid PEM in {}: {e}", path.display())))?;
        roots
            .add(cert)
            .map_err(|e| ChannelError::Tls(format!("rejected CA certificate: {e}")))?;
    }
    if roots.is_empty() {
        return Err(ChannelError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(roots)
}

/// A configured, not yet started notification channel.
pub struct NotificationChannel {
    client_config: quinn::ClientConfig,
    address: String,
    server_name: String,
    handshake_timeout: Duration,
    registration: Notification,
}

impl fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl NotificationChannel {
    /// Build a channel trusting `roots` that registers with `registration`.
    pub fn new(
        roots: RootCertStore,
        address: impl Into<String>,
        server_name: impl Into<String>,
        registration: Notification,
    ) -> ChannelResult<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut tls = rustls::ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| ChannelError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        tls.alpn_protocols = vec![ALPN.to_vec()];

        let quic_tls = QuicClientConfig::try_from(tls).map_err(|e| ChannelError::Tls(e.to_string()))?;

        Ok(Self {
            client_config: quinn::ClientConfig::new(Arc::new(quic_tls)),
            address: address.into(),
            server_name: server_name.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            registration,
        })
    }

    /// Build a channel from configuration. A CA bundle path is required.
    pub fn from_config(config: &NotifyConfig, registration: Notification) -> ChannelResult<Self> {
        let ca_path = config
            .ca_cert_path
            .as_ref()
            .ok_or_else(|| ChannelError::Tls("notify.ca_cert_path is not set".to_string()))?;
        let roots = load_root_certificates(ca_path)?;
        Ok(Self::new(roots, &config.address, &config.server_name, registration)?
            .with_handshake_timeout(config.handshake_timeout()))
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Start the receive loop on its own task.
    pub fn spawn(self, log: NotificationLog) -> NotificationSession {
        let (state_tx, state_rx) = watch::channel(ChannelState::Idle);
        let cancel = CancellationToken::new();
        let task_log = log.clone();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let result = self.run(&task_log, &state_tx, &task_cancel).await;
            let final_state = match &result {
                Ok(_) => ChannelState::Closed,
                Err(_) => ChannelState::Failed,
            };
            state_tx.send_replace(final_state);
            result.map(|()| final_state)
        });

        NotificationSession {
            handle,
            log,
            state: state_rx,
            cancel,
        }
    }

    #[instrument(skip_all, fields(address = %self.address))]
    async fn run(
        self,
        log: &NotificationLog,
        state: &watch::Sender<ChannelState>,
        cancel: &CancellationToken,
    ) -> ChannelResult<()> {
        state.send_replace(ChannelState::Dialing);
        let dialed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("cancelled while dialing");
                return Ok(());
            }
            dialed = self.dial() => dialed,
        };
        let (endpoint, connection, send, recv) = match dialed {
            Ok(parts) => parts,
            Err(err) => {
                warn!(error = %err, "notification channel dial failed");
                return Err(err);
            }
        };

        let outcome = self.session(log, state, cancel, send, recv).await;
        let close = match &outcome {
            Ok(reason) => *reason,
            Err(err) => CloseReason::for_error(err),
        };
        match &outcome {
            Ok(_) => info!(reason = close.reason(), "notification channel closed"),
            Err(err) => warn!(error = %err, "notification channel failed"),
        }

        connection.close(VarInt::from_u32(close.code()), close.reason().as_bytes());
        let _ = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, endpoint.wait_idle()).await;
        outcome.map(|_| ())
    }

    /// Resolve, connect and open the bidirectional stream, bounded by the handshake timeout.
    async fn dial(&self) -> ChannelResult<(Endpoint, Connection, SendStream, RecvStream)> {
        let connect_err = |reason: String| ChannelError::Connect {
            address: self.address.clone(),
            reason,
        };

        let handshake = async {
            let remote: SocketAddr = tokio::net::lookup_host(&self.address)
                .await
                .map_err(|e| connect_err(e.to_string()))?
                .next()
                .ok_or_else(|| connect_err("address did not resolve".to_string()))?;

            let bind: SocketAddr = if remote.is_ipv6() {
                (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
            } else {
                (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
            };
            let endpoint = Endpoint::client(bind)?;
            let connecting = endpoint
                .connect_with(self.client_config.clone(), remote, &self.server_name)
                .map_err(|e| connect_err(e.to_string()))?;
            let connection = connecting.await?;
            let (send, recv) = connection.open_bi().await?;
            debug!(%remote, "notification stream opened");
            Ok::<_, ChannelError>((endpoint, connection, send, recv))
        };

        tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| ChannelError::DialTimeout {
                address: self.address.clone(),
                timeout_ms: self.handshake_timeout.as_millis(),
            })?
    }

    async fn session(
        &self,
        log: &NotificationLog,
        state: &watch::Sender<ChannelState>,
        cancel: &CancellationToken,
        send: SendStream,
        recv: RecvStream,
    ) -> ChannelResult<CloseReason> {
        // The send half stays open for the session; only registration is written.
        let mut sink = FramedWrite::new(send, frame_codec());
        sink.send(self.registration.to_bytes()?).await?;
        state.send_replace(ChannelState::Registered);
        debug!("registration sent");

        let mut frames = FramedRead::new(recv, frame_codec());
        state.send_replace(ChannelState::Streaming);

        loop {
            if cancel.is_cancelled() {
                return Ok(CloseReason::Cancelled);
            }

            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(CloseReason::Cancelled),
                frame = frames.next() => frame,
            };

            match frame {
                None => return Ok(CloseReason::Closed),
                Some(Ok(payload)) => {
                    let notification = Notification::from_slice(&payload)?;
                    debug!(kind = notification.kind().unwrap_or("-"), "notification received");
                    log.append(notification).await;
                }
                Some(Err(err)) if err.kind() == std::io::ErrorKind::InvalidData => {
                    return Err(ChannelError::Decode(err.to_string()));
                }
                Some(Err(err)) => return Err(ChannelError::Io(err)),
            }
        }
    }
}

/// Handle to a running channel.
#[derive(Debug)]
pub struct NotificationSession {
    handle: JoinHandle<ChannelResult<ChannelState>>,
    log: NotificationLog,
    state: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
}

impl NotificationSession {
    /// Shared log the receive task appends to.
    pub fn log(&self) -> &NotificationLog {
        &self.log
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cooperative shutdown of the receive loop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the receive task to finish.
    pub async fn join(self) -> ChannelResult<ChannelState> {
        self.handle
            .await
            .map_err(|e| ChannelError::Task(e.to_string()))?
    }

    /// Cancel and wait for the receive task.
    pub async fn shutdown(self) -> ChannelResult<ChannelState> {
        self.cancel();
        self.join().await
    }
}
