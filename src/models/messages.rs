use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ProtocolError;

/// Opaque identity assigned to a connected session.
pub type SessionId = String;

/// Identity of a diagram element (task, event, sequence flow, ...).
pub type ElementId = String;

/// Full element -> owner mapping as sent over the wire.
pub type LockSnapshot = BTreeMap<ElementId, SessionId>;

/// A connected participant as shown in the presence list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct Participant {
    pub id: SessionId,
    pub joined_at: DateTime<Utc>,
}

// Client -> server

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UpdateXmlMessage {
    pub xml: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<SessionId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LockRequestMessage {
    pub element_id: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<SessionId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "update_xml")]
    UpdateXml(UpdateXmlMessage),
    #[serde(rename = "acquire_lock")]
    AcquireLock(LockRequestMessage),
    #[serde(rename = "release_lock")]
    ReleaseLock(LockRequestMessage),
    #[serde(rename = "ping")]
    Ping,
}

impl ClientMessage {
    pub fn update_xml(xml: impl Into<String>, by: impl Into<SessionId>) -> Self {
        ClientMessage::UpdateXml(UpdateXmlMessage {
            xml: xml.into(),
            by: Some(by.into()),
        })
    }

    pub fn acquire(element_id: impl Into<ElementId>, user_id: impl Into<SessionId>) -> Self {
        ClientMessage::AcquireLock(LockRequestMessage {
            element_id: element_id.into(),
            user_id: Some(user_id.into()),
        })
    }

    pub fn release(element_id: impl Into<ElementId>, user_id: impl Into<SessionId>) -> Self {
        ClientMessage::ReleaseLock(LockRequestMessage {
            element_id: element_id.into(),
            user_id: Some(user_id.into()),
        })
    }

    /// Parse a text frame received from a client.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Identity the sender claims in the payload, if any.
    pub fn claimed_sender(&self) -> Option<&str> {
        match self {
            ClientMessage::UpdateXml(msg) => msg.by.as_deref(),
            ClientMessage::AcquireLock(msg) | ClientMessage::ReleaseLock(msg) => {
                msg.user_id.as_deref()
            }
            ClientMessage::Ping => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::UpdateXml(_) => "update_xml",
            ClientMessage::AcquireLock(_) => "acquire_lock",
            ClientMessage::ReleaseLock(_) => "release_lock",
            ClientMessage::Ping => "ping",
        }
    }
}

// Server -> client

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InitMessage {
    pub xml: String,
    pub user_id: SessionId,
    pub users: Vec<Participant>,
    pub locks: LockSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct XmlUpdateMessage {
    pub xml: String,
    pub by: SessionId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LockAcquiredMessage {
    pub element_id: ElementId,
    pub user_id: SessionId,
}

/// Why an acquire request was turned down.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Another session owns the element.
    Held,
    /// The element can never be locked (canvas, root container).
    Exempt,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LockDeniedMessage {
    pub element_id: ElementId,
    pub user_id: SessionId,
    #[serde(default)]
    pub owner: Option<SessionId>,
    pub reason: DenyReason,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LockReleasedMessage {
    pub element_id: ElementId,
    pub user_id: SessionId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LocksUpdateMessage {
    pub locks: LockSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserJoinMessage {
    pub user: Participant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserLeaveMessage {
    pub user_id: SessionId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init(InitMessage),
    #[serde(rename = "xml_update")]
    XmlUpdate(XmlUpdateMessage),
    #[serde(rename = "lock_acquired")]
    LockAcquired(LockAcquiredMessage),
    #[serde(rename = "lock_denied")]
    LockDenied(LockDeniedMessage),
    #[serde(rename = "lock_released")]
    LockReleased(LockReleasedMessage),
    #[serde(rename = "locks_update")]
    LocksUpdate(LocksUpdateMessage),
    #[serde(rename = "user_join")]
    UserJoin(UserJoinMessage),
    #[serde(rename = "user_leave")]
    UserLeave(UserLeaveMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init(_) => "init",
            ServerMessage::XmlUpdate(_) => "xml_update",
            ServerMessage::LockAcquired(_) => "lock_acquired",
            ServerMessage::LockDenied(_) => "lock_denied",
            ServerMessage::LockReleased(_) => "lock_released",
            ServerMessage::LocksUpdate(_) => "locks_update",
            ServerMessage::UserJoin(_) => "user_join",
            ServerMessage::UserLeave(_) => "user_leave",
            ServerMessage::Pong(_) => "pong",
        }
    }
}
