//! Wire protocol: framed JSON objects over the WebSocket stream.
//!
//! Inbound frames are flat objects discriminated by `message_type`
//! (defaulting to `text`, unknown keys ignored). Outbound frames are
//! discriminated by `type`; frames fanned out to a room additionally carry
//! the room name in the envelope.

use crate::error::DispatchError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current wall-clock time as an ISO-8601 string, as carried by every
/// event-like outbound frame.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Inbound
// ============================================================================

/// Raw inbound frame as it appears on the wire. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawFrame {
    pub message_type: Option<String>,
    pub content: Option<String>,
    pub room: Option<String>,
    pub username: Option<String>,
    pub recipient_username: Option<String>,
    pub encrypted_content: Option<String>,
    pub public_key: Option<String>,
    pub room_name: Option<String>,
}

/// Inbound frame after discrimination on `message_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// First frame of a connection; absent username means auto-allocation.
    Register { username: Option<String> },
    RegisterKey { public_key: Option<String> },
    Ping,
    Private {
        recipient: Option<String>,
        encrypted_content: Option<String>,
    },
    GetRooms,
    GetRoomUsers { room: String },
    JoinRoom { room: Option<String> },
    LeaveRoom { room: Option<String> },
    /// Chat text or a slash-command; the default kind.
    Text { content: String, room: String },
}

impl ClientFrame {
    /// Parse one wire frame. Not-JSON yields `Parse`; an unrecognized
    /// `message_type` yields `Validation`.
    pub fn parse(text: &str) -> Result<Self, DispatchError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|_| DispatchError::Parse)?;
        Self::try_from(raw)
    }
}

impl TryFrom<RawFrame> for ClientFrame {
    type Error = DispatchError;

    fn try_from(raw: RawFrame) -> Result<Self, DispatchError> {
        let frame = match raw.message_type.as_deref() {
            None | Some("text") => ClientFrame::Text {
                content: raw.content.unwrap_or_default(),
                room: raw.room.unwrap_or_else(|| "main".to_string()),
            },
            Some("register") => ClientFrame::Register {
                username: raw
                    .username
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty()),
            },
            Some("register_key") => ClientFrame::RegisterKey {
                public_key: raw.public_key.filter(|k| !k.is_empty()),
            },
            Some("ping") => ClientFrame::Ping,
            Some("private") => ClientFrame::Private {
                recipient: raw.recipient_username.filter(|r| !r.is_empty()),
                encrypted_content: raw.encrypted_content.filter(|c| !c.is_empty()),
            },
            Some("get_rooms") => ClientFrame::GetRooms,
            Some("get_room_users") => ClientFrame::GetRoomUsers {
                room: raw.room_name.unwrap_or_else(|| "main".to_string()),
            },
            Some("join_room") => ClientFrame::JoinRoom {
                room: raw.room_name.filter(|r| !r.is_empty()),
            },
            Some("leave_room") => ClientFrame::LeaveRoom {
                room: raw.room_name.filter(|r| !r.is_empty()),
            },
            Some(other) => {
                return Err(DispatchError::Validation(format!(
                    "Unknown message type: {other}"
                )));
            }
        };
        Ok(frame)
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// One user as it appears in `users_list` and `room_users_list`.
#[derive(Debug, Clone, Serialize)]
pub struct UserEntry {
    pub username: String,
    pub ip: String,
    pub is_admin: bool,
    pub joined_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// One room as it appears in `rooms_list`.
#[derive(Debug, Clone, Serialize)]
pub struct RoomEntry {
    pub name: String,
    pub created_by: String,
    pub created_at: String,
}

/// Payload of a `user_info` reply.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfoBody {
    pub username: String,
    pub ip: String,
    pub is_admin: bool,
    pub joined_at: String,
    pub rooms: Vec<String>,
}

/// Outbound frame, discriminated on the wire by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        username: String,
        message: String,
        rooms: Vec<String>,
    },
    Error {
        message: String,
    },
    Help {
        message: String,
    },
    Pong {
        timestamp: String,
    },
    Message {
        username: String,
        content: String,
        timestamp: String,
        is_admin: bool,
    },
    PrivateMessage {
        from_username: String,
        encrypted_content: String,
        timestamp: String,
        is_admin: bool,
    },
    UserJoined {
        username: String,
        message: String,
        timestamp: String,
    },
    UserLeft {
        username: String,
        message: String,
        timestamp: String,
    },
    UserRenamed {
        old_username: String,
        new_username: String,
        message: String,
        timestamp: String,
    },
    UserJoinedRoom {
        username: String,
        message: String,
        timestamp: String,
    },
    UserLeftRoom {
        username: String,
        message: String,
        timestamp: String,
    },
    UserKicked {
        message: String,
        timestamp: String,
    },
    UserBanned {
        message: String,
        timestamp: String,
    },
    Kicked {
        message: String,
    },
    Banned {
        message: String,
    },
    UsernameChanged {
        old_username: String,
        new_username: String,
        message: String,
    },
    KeyRegistered {
        message: String,
    },
    AdminSuccess {
        message: String,
    },
    UsersList {
        users: Vec<UserEntry>,
    },
    RoomUsersList {
        room_name: String,
        users: Vec<UserEntry>,
    },
    RoomsList {
        rooms: Vec<RoomEntry>,
    },
    RoomJoined {
        room_name: String,
        message: String,
    },
    RoomLeft {
        room_name: String,
        message: String,
    },
    RoomCreated {
        message: String,
    },
    RoomDeleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        room_name: Option<String>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    UserInfo {
        target: String,
        info: UserInfoBody,
    },
    BanSuccess {
        message: String,
    },
}

impl ServerFrame {
    /// Shorthand for the ubiquitous `error` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize for a direct (non-room) delivery.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"internal serialization failure"}"#.to_string()
        })
    }

    /// Serialize for delivery to a room: the envelope gains a `room` key.
    pub fn to_json_in(&self, room: &str) -> String {
        let mut value = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(_) => return self.to_json(),
        };
        if let Some(map) = value.as_object_mut() {
            map.insert("room".to_string(), serde_json::Value::String(room.to_string()));
        }
        value.to_string()
    }
}
