//! Message transport seam.
//!
//! The session engine talks to `TransportSink`/`TransportStream` trait
//! objects, never to a socket directly. The WebSocket implementation lives
//! here alongside a channel-backed mock, so the whole session can run in
//! tests without a network.
//!
//! Delivery order: the stream yields complete binary messages strictly in
//! transport arrival order; the sink transmits sends strictly in call order.

use crate::endpoint::Endpoint;
use crate::error::{Result, VoxlinkError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Outbound half of a transport.
#[async_trait]
pub trait TransportSink: Send {
    /// Transmits one complete binary message. Fire-and-forget: no
    /// acknowledgment is awaited beyond the write completing.
    async fn send(&mut self, payload: Vec<u8>) -> Result<()>;

    /// Initiates connection close. Idempotent best-effort.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a transport.
#[async_trait]
pub trait TransportStream: Send {
    /// The next complete binary message, `None` once the connection closed.
    ///
    /// Non-message traffic (pings, pongs) is absorbed internally.
    async fn next_message(&mut self) -> Option<Result<Vec<u8>>>;
}

/// An open, not-yet-split connection.
pub trait Transport: Send {
    fn split(self: Box<Self>) -> (Box<dyn TransportSink>, Box<dyn TransportStream>);
}

/// Opens the WebSocket connection for `endpoint`.
///
/// Open failures are classified: an HTTP 401/403 during the upgrade is a
/// credential rejection, a DNS failure an unresolvable endpoint. Neither is
/// retried.
pub async fn connect(endpoint: &Endpoint) -> Result<Box<dyn Transport>> {
    let request = endpoint.request()?;

    let connector = if endpoint.insecure {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| VoxlinkError::TransportOpen {
                message: format!("failed to build TLS connector: {}", e),
            })?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let (stream, response) = connect_async_tls_with_config(request, None, false, connector)
        .await
        .map_err(|e| classify_connect_error(e, &endpoint.host()))?;
    tracing::debug!(status = %response.status(), "websocket upgrade complete");

    Ok(Box::new(WsTransport { stream }))
}

fn classify_connect_error(
    err: tokio_tungstenite::tungstenite::Error,
    host: &str,
) -> VoxlinkError {
    use tokio_tungstenite::tungstenite::Error;

    match err {
        Error::Http(response) => {
            let status = response.status();
            if status == 401 || status == 403 {
                VoxlinkError::CredentialRejected {
                    status: status.as_u16(),
                }
            } else {
                VoxlinkError::TransportOpen {
                    message: format!("server rejected connection with HTTP {}", status),
                }
            }
        }
        Error::Io(io_err) => {
            // getaddrinfo failures surface as uncategorized I/O errors
            let text = io_err.to_string();
            if text.contains("lookup") || text.contains("resolve") || text.contains("Name or service")
            {
                VoxlinkError::EndpointUnresolvable {
                    host: host.to_string(),
                }
            } else {
                VoxlinkError::TransportOpen {
                    message: format!("connection to {} failed: {}", host, io_err),
                }
            }
        }
        other => VoxlinkError::TransportOpen {
            message: other.to_string(),
        },
    }
}

/// Live WebSocket transport.
pub struct WsTransport {
    stream: WsStream,
}

impl Transport for WsTransport {
    fn split(self: Box<Self>) -> (Box<dyn TransportSink>, Box<dyn TransportStream>) {
        let (sink, stream) = self.stream.split();
        (Box::new(WsSink { sink }), Box::new(WsReceiver { stream }))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        self.sink
            .send(Message::Binary(payload))
            .await
            .map_err(|e| VoxlinkError::TransportRuntime {
                message: format!("send failed: {}", e),
            })
    }

    async fn close(&mut self) -> Result<()> {
        // An error here usually means the peer already closed
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            tracing::debug!(error = %e, "close frame not sent");
        }
        Ok(())
    }
}

struct WsReceiver {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WsReceiver {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                Ok(Message::Close(_)) => return None,
                Ok(Message::Text(text)) => {
                    // The protocol is binary-only; a text frame is a server bug
                    tracing::warn!(len = text.len(), "ignoring unexpected text frame");
                }
                Ok(_) => {} // ping/pong/raw frames
                Err(e) => {
                    return Some(Err(VoxlinkError::TransportRuntime {
                        message: format!("receive failed: {}", e),
                    }));
                }
            }
        }
    }
}

/// Channel-backed transport for tests: the "remote" end is a pair of
/// in-process channels driven by the test.
pub struct MockTransport {
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: mpsc::UnboundedReceiver<Result<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

/// Test-side handle to a [`MockTransport`].
pub struct MockRemote {
    /// Feeds inbound messages to the client under test.
    pub inbound_tx: mpsc::UnboundedSender<Result<Vec<u8>>>,
    /// Receives everything the client transmitted.
    pub outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Creates a connected transport/remote pair.
    pub fn pair() -> (Self, MockRemote) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                outbound_tx,
                inbound_rx,
                closed: closed.clone(),
            },
            MockRemote {
                inbound_tx,
                outbound_rx,
                closed,
            },
        )
    }
}

impl MockRemote {
    /// True once the client closed its half of the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulates a peer-initiated close by ending the inbound stream.
    pub fn close_from_peer(&mut self) {
        // Replace the sender with one whose receiver is immediately dropped
        let (tx, _) = mpsc::unbounded_channel();
        self.inbound_tx = tx;
    }
}

impl Transport for MockTransport {
    fn split(self: Box<Self>) -> (Box<dyn TransportSink>, Box<dyn TransportStream>) {
        (
            Box::new(MockSink {
                outbound_tx: self.outbound_tx,
                closed: self.closed,
            }),
            Box::new(MockStream {
                inbound_rx: self.inbound_rx,
            }),
        )
    }
}

struct MockSink {
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VoxlinkError::TransportRuntime {
                message: "connection closed".to_string(),
            });
        }
        self.outbound_tx
            .send(payload)
            .map_err(|_| VoxlinkError::TransportRuntime {
                message: "remote receiver dropped".to_string(),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockStream {
    inbound_rx: mpsc::UnboundedReceiver<Result<Vec<u8>>>,
}

#[async_trait]
impl TransportStream for MockStream {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>>> {
        self.inbound_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireMessage;

    #[tokio::test]
    async fn test_mock_transport_delivers_outbound_in_order() {
        let (transport, mut remote) = MockTransport::pair();
        let (mut sink, _stream) = Box::new(transport).split();

        sink.send(vec![1]).await.unwrap();
        sink.send(vec![2]).await.unwrap();
        sink.send(vec![3]).await.unwrap();

        assert_eq!(remote.outbound_rx.recv().await.unwrap(), vec![1]);
        assert_eq!(remote.outbound_rx.recv().await.unwrap(), vec![2]);
        assert_eq!(remote.outbound_rx.recv().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_mock_transport_delivers_inbound_in_order() {
        let (transport, remote) = MockTransport::pair();
        let (_sink, mut stream) = Box::new(transport).split();

        remote
            .inbound_tx
            .send(Ok(WireMessage::Handshake.encode()))
            .unwrap();
        remote
            .inbound_tx
            .send(Ok(WireMessage::Text("hi".to_string()).encode()))
            .unwrap();

        let first = stream.next_message().await.unwrap().unwrap();
        assert_eq!(WireMessage::decode(&first).unwrap(), WireMessage::Handshake);
        let second = stream.next_message().await.unwrap().unwrap();
        assert_eq!(
            WireMessage::decode(&second).unwrap(),
            WireMessage::Text("hi".to_string())
        );
    }

    #[tokio::test]
    async fn test_mock_stream_ends_on_peer_close() {
        let (transport, mut remote) = MockTransport::pair();
        let (_sink, mut stream) = Box::new(transport).split();

        remote.close_from_peer();
        assert!(stream.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_mock_sink_close_sets_flag_and_rejects_sends() {
        let (transport, remote) = MockTransport::pair();
        let (mut sink, _stream) = Box::new(transport).split();

        assert!(!remote.is_closed());
        sink.close().await.unwrap();
        assert!(remote.is_closed());
        assert!(sink.send(vec![0]).await.is_err());
    }

    #[test]
    fn test_classify_credential_rejection() {
        use tokio_tungstenite::tungstenite::Error;
        use tokio_tungstenite::tungstenite::http::Response;

        let response = Response::builder().status(403).body(None).unwrap();
        let err = classify_connect_error(Error::Http(response), "host");
        assert!(matches!(err, VoxlinkError::CredentialRejected { status: 403 }));
    }

    #[test]
    fn test_classify_other_http_status() {
        use tokio_tungstenite::tungstenite::Error;
        use tokio_tungstenite::tungstenite::http::Response;

        let response = Response::builder().status(500).body(None).unwrap();
        let err = classify_connect_error(Error::Http(response), "host");
        assert!(matches!(err, VoxlinkError::TransportOpen { .. }));
    }

    #[test]
    fn test_classify_dns_failure() {
        use tokio_tungstenite::tungstenite::Error;

        let io_err = std::io::Error::other("failed to lookup address information");
        let err = classify_connect_error(Error::Io(io_err), "bad.example.com");
        assert!(matches!(err, VoxlinkError::EndpointUnresolvable { .. }));
        assert!(err.to_string().contains("bad.example.com"));
    }

    #[test]
    fn test_classify_generic_io_failure() {
        use tokio_tungstenite::tungstenite::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = classify_connect_error(Error::Io(io_err), "host");
        assert!(matches!(err, VoxlinkError::TransportOpen { .. }));
    }
}
