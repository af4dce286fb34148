use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ProtocolError};
use crate::models::{ClientMessage, InitMessage, ServerMessage, SessionId};

/// WebSocket connection to the collaboration hub.
pub struct CollabClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    session_id: SessionId,
}

impl CollabClient {
    /// Connect and wait for the server's `init`, which must be the first message.
    pub async fn connect(url: &str) -> Result<(Self, InitMessage), ClientError> {
        let (ws, _response) = connect_async(url).await?;
        let mut client = Self {
            ws,
            session_id: SessionId::new(),
        };
        match client.next_message().await? {
            Some(ServerMessage::Init(init)) => {
                info!(session = %init.user_id, %url, "connected to collaboration hub");
                client.session_id = init.user_id.clone();
                Ok((client, init))
            }
            Some(other) => Err(ClientError::UnexpectedFirstMessage(other.kind())),
            None => Err(ClientError::ClosedBeforeInit),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let text = serde_json::to_string(message).map_err(ClientError::Encode)?;
        self.ws.send(Message::text(text)).await?;
        Ok(())
    }

    /// Send a raw frame, bypassing message encoding.
    pub async fn send_frame(&mut self, frame: Message) -> Result<(), ClientError> {
        self.ws.send(frame).await?;
        Ok(())
    }

    pub async fn send_all(&mut self, messages: Vec<ClientMessage>) -> Result<(), ClientError> {
        for message in &messages {
            self.send(message).await?;
        }
        Ok(())
    }

    /// Next server message. `None` once the server closes the connection.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        while let Some(frame) = self.ws.next().await {
            match frame? {
                Message::Text(text) => match ServerMessage::parse(text.as_str()) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => warn!(error = %e, "dropping server message"),
                },
                Message::Binary(_) => {
                    warn!(error = %ProtocolError::UnexpectedFrame("binary"), "dropping server message");
                }
                Message::Close(_) => {
                    debug!("server closed the connection");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}
