//! WebSocket transport behind a small trait seam.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::ClientError;

/// An open text-frame connection.
#[async_trait]
pub trait Transport: Send {
    /// Next text frame. `None` once the connection has closed, for whatever
    /// reason.
    async fn recv(&mut self) -> Option<String>;

    async fn send(&mut self, text: String) -> Result<(), ClientError>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    async fn connect(&self, url: &Url) -> Result<Self::Transport, ClientError>;
}

/// Connector over tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, url: &Url) -> Result<WsTransport, ClientError> {
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::debug!(status = %response.status(), "websocket handshake complete");
        Ok(WsTransport { stream })
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<String> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "websocket closed by peer");
                    return None;
                }
                Ok(Message::Binary(bytes)) => tracing::debug!(len = bytes.len(), "ignoring binary frame"),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("websocket error: {e}");
                    return None;
                }
            }
        }
        None
    }

    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }
}
