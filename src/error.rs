use thiserror::Error;

use crate::models::SessionId;

/// A message from a peer that cannot be processed. The message is dropped,
/// the connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("session {actual} sent a message claiming to be {claimed}")]
    IdentityMismatch { claimed: SessionId, actual: SessionId },

    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("coordination hub is no longer running")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("connection closed before init was received")]
    ClosedBeforeInit,

    #[error("expected init as first message, got {0}")]
    UnexpectedFirstMessage(&'static str),
}
