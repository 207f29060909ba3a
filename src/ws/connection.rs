//! WebSocket connection primitives
//!
//! Low-latency WebSocket client using tokio-tungstenite:
//! - connect with timeout, TCP_NODELAY on plaintext streams
//! - stream split into independent reader/writer halves, so the listen
//!   unit owns receiving while ping/subscribe writes go through a shared
//!   writer handle

use std::time::Duration;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};

/// Connect timeout for the initial handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors that can occur on the WebSocket transport
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Timeout")]
    Timeout,
    #[error("Not connected")]
    NotConnected,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WsError>;

/// Writer half of a WebSocket connection
///
/// Shared (behind an async mutex) between the ping unit, pong replies from
/// the listen unit, and subscription sends.
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

/// Reader half of a WebSocket connection, owned by the listen unit
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

/// Open a WebSocket connection and split it into reader/writer halves
///
/// Applies TCP_NODELAY when the stream is plaintext; for TLS streams the
/// wrapped socket is not reachable and OS defaults apply.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let connect_future = connect_async(url);
    let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_future)
        .await
        .map_err(|_| WsError::Timeout)?
        .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

    if let MaybeTlsStream::Plain(ref tcp) = ws_stream.get_ref() {
        tcp.set_nodelay(true)
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
    }

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

impl WsWriter {
    /// Send a message
    pub async fn send(&mut self, msg: Message) -> Result<()> {
        self.sink
            .send(msg)
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    /// Send a text message
    #[inline]
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(Message::text(text.to_string())).await
    }

    /// Close the connection gracefully
    pub async fn close(&mut self) -> Result<()> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))?;
        let _ = self.sink.close().await;
        Ok(())
    }
}

impl WsReader {
    /// Receive the next message
    ///
    /// Returns `Ok(None)` on graceful close.
    pub async fn next(&mut self) -> Result<Option<Message>> {
        match self.stream.next().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(WsError::ReceiveFailed(e.to_string())),
            None => Ok(None),
        }
    }
}
