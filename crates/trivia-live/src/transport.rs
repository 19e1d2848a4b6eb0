//! Duplex transport to the live service and the connect handshake.
//!
//! [`Connector::connect`] is a pure function of the session configuration: it
//! opens a fresh connection, sends the setup payload and waits for the service
//! to accept it. The reconnect policy calls it again with the same value.

use crate::config::SessionConfig;
use crate::error::{LiveError, LiveResult};
use crate::protocol::{ClientMessage, ServerMessage};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// One open connection. Dropped and replaced on reconnect.
#[async_trait]
pub trait LiveTransport: Send {
    async fn send(&mut self, message: &ClientMessage) -> LiveResult<()>;

    /// Next inbound message, `Ok(None)` once the remote side has closed.
    ///
    /// Must be cancel-safe: the session polls it inside `select!`.
    async fn recv(&mut self) -> LiveResult<Option<ServerMessage>>;

    async fn close(&mut self) -> LiveResult<()>;
}

/// Produces connected, configured transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and complete the setup handshake. Fails with
    /// [`LiveError::ConfigRejected`] when the service refuses the configuration,
    /// [`LiveError::TransientTransport`] for everything worth retrying.
    async fn connect(&self, config: &SessionConfig) -> LiveResult<Box<dyn LiveTransport>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Frame {
    Message(ServerMessage),
    Closed(Option<String>),
}

/// WebSocket transport. JSON arrives in both text and binary frames.
pub struct WebSocketTransport {
    ws: WsStream,
}

impl WebSocketTransport {
    async fn next_frame(&mut self) -> LiveResult<Frame> {
        loop {
            match self.ws.next().await {
                None => return Ok(Frame::Closed(None)),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => {
                    return ServerMessage::parse(text.as_str()).map(Frame::Message)
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return ServerMessage::parse_bytes(&bytes).map(Frame::Message)
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()));
                    debug!(?reason, "close frame received");
                    return Ok(Frame::Closed(reason));
                }
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn await_setup_complete(&mut self) -> LiveResult<()> {
        loop {
            match self.next_frame().await? {
                Frame::Message(message) => {
                    if let Some(error) = message.error {
                        return Err(LiveError::ConfigRejected(error.to_string()));
                    }
                    if message.setup_complete.is_some() {
                        return Ok(());
                    }
                    debug!("ignoring message received before setupComplete");
                }
                Frame::Closed(reason) => {
                    return Err(LiveError::ConfigRejected(
                        reason.unwrap_or_else(|| "connection closed before setup completed".to_string()),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl LiveTransport for WebSocketTransport {
    async fn send(&mut self, message: &ClientMessage) -> LiveResult<()> {
        let json = message.to_json()?;
        self.ws.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> LiveResult<Option<ServerMessage>> {
        match self.next_frame().await? {
            Frame::Message(message) => Ok(Some(message)),
            Frame::Closed(reason) => {
                if let Some(reason) = reason {
                    info!("🔌 Live connection closed by remote: {}", reason);
                }
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> LiveResult<()> {
        if let Err(e) = self.ws.close(None).await {
            debug!("close on a finished connection: {}", e);
        }
        Ok(())
    }
}

/// Connector for the Gemini live WebSocket endpoint.
#[derive(Debug, Clone, Default)]
pub struct GeminiLiveConnector;

impl GeminiLiveConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for GeminiLiveConnector {
    async fn connect(&self, config: &SessionConfig) -> LiveResult<Box<dyn LiveTransport>> {
        config.validate()?;
        info!("🔗 Connecting to live service ({})", config.model);
        let (ws, response) = tokio::time::timeout(config.handshake_timeout, connect_async(config.connect_url()))
            .await
            .map_err(|_| LiveError::TransientTransport("connect timed out".to_string()))?
            .map_err(|e| match e {
                // 4xx on upgrade means the key or model was refused
                tungstenite::Error::Http(resp) if resp.status().is_client_error() => {
                    LiveError::ConfigRejected(format!("upgrade refused with HTTP {}", resp.status()))
                }
                other => other.into(),
            })?;
        debug!(status = %response.status(), "websocket upgraded");

        let mut transport = WebSocketTransport { ws };
        transport.send(&ClientMessage::setup(config)).await?;

        match tokio::time::timeout(config.handshake_timeout, transport.await_setup_complete()).await {
            Ok(Ok(())) => {
                info!("✅ Live session configured");
                Ok(Box::new(transport))
            }
            Ok(Err(e)) => {
                warn!("live setup failed: {}", e);
                let _ = transport.close().await;
                Err(e)
            }
            Err(_) => {
                let _ = transport.close().await;
                Err(LiveError::TransientTransport(
                    "timed out waiting for setupComplete".to_string(),
                ))
            }
        }
    }
}
