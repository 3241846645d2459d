use crate::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens feed connections; one connection per ingestion session
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>>;

    /// Endpoint description for logs
    fn endpoint(&self) -> &str;
}

/// An open feed connection exchanging JSON text frames
#[async_trait]
pub trait FeedConnection: Send {
    async fn send(&mut self, message: &Value) -> Result<()>;

    /// Next text frame; `None` once the peer closed the connection
    async fn next_message(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// WebSocket transport over tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>> {
        let (stream, _) = timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| format!("connection to {} timed out", self.url))??;

        Ok(Box::new(WsConnection { stream }))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn send(&mut self, message: &Value) -> Result<()> {
        self.stream
            .send(Message::Text(message.to_string().into()))
            .await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!("Feed closed by peer: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
