//! Websocket transport to the game server.
//!
//! The server speaks JSON packets; the agent replies with plain text. The
//! sink and stream halves each live behind an async mutex so the realtime
//! coordinator's background receiver can share the connection with the
//! dispatcher: only one side receives at a time by construction, and the
//! sink lock serializes sends.

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message,
    },
};
use tracing::warn;
use wolf_protocol::Packet;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport outcomes, split so callers can tell expected timeouts and
/// recoverable hiccups from connection loss. Only `Fatal` propagates past
/// the realtime receive loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("receive timed out")]
    Timeout,
    #[error("transient transport error: {0}")]
    Transient(String),
    #[error("connection failed: {0}")]
    Fatal(String),
}

/// A request/response-capable, full-duplex connection to the game server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Receives the next packet, blocking until one arrives.
    async fn receive(&self) -> Result<Packet, TransportError>;

    /// Receives the next packet, giving up with [`TransportError::Timeout`]
    /// after `timeout`.
    async fn receive_timeout(&self, timeout: Duration) -> Result<Packet, TransportError>;

    /// Sends one plain-text reply.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Closes the connection. Best effort.
    async fn close(&self);
}

/// The production [`Transport`] over tokio-tungstenite.
pub struct Connection {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    stream: Arc<Mutex<SplitStream<WsStream>>>,
}

impl Connection {
    /// Connects to the game server, attaching a bearer token when one is
    /// configured.
    pub async fn connect(url: &str, token: Option<&str>) -> Result<Self, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Fatal(e.to_string()))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::Fatal(e.to_string()))?;
            let _ = request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Fatal(e.to_string()))?;
        let (sink, stream) = ws_stream.split();
        Ok(Self {
            sink: Arc::new(Mutex::new(sink)),
            stream: Arc::new(Mutex::new(stream)),
        })
    }
}

#[async_trait]
impl Transport for Connection {
    async fn receive(&self) -> Result<Packet, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Packet>(text.as_str()) {
                        Ok(packet) => return Ok(packet),
                        Err(e) => {
                            warn!(error = %e, "received malformed packet");
                            return Err(TransportError::Transient(e.to_string()));
                        }
                    }
                }
                // The server never sends binary frames; pings are answered
                // by tungstenite itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    return Err(TransportError::Fatal(format!(
                        "server closed the connection: {frame:?}"
                    )));
                }
                Some(Ok(other)) => {
                    warn!(?other, "ignoring unexpected frame");
                }
                Some(Err(e)) => return Err(TransportError::Fatal(e.to_string())),
                None => return Err(TransportError::Fatal("connection closed".to_string())),
            }
        }
    }

    async fn receive_timeout(&self, timeout: Duration) -> Result<Packet, TransportError> {
        tokio::time::timeout(timeout, self.receive())
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.to_string().into()))
            .await
            .map_err(|e| TransportError::Fatal(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
    }
}
