//! Push-channel wire format.
//!
//! On the event stream the SSE `event:` field names the kind and `data:`
//! carries the JSON payload:
//! ```text
//! event: note-created        data: { ...Note... }
//! event: note-updated        data: { ...Note... }
//! event: note-deleted        data: {"id": 42}      (or a bare id)
//! event: online-users        data: ["a@x.io", ...]
//! ```
//!
//! On the WebSocket alternative every text frame is a JSON envelope naming
//! the event, e.g. `{"event": "note-deleted", "data": {"id": 42}}`.
//!
//! Decoding is strict per event kind. A frame that does not fit its kind is
//! rejected as a whole, so a bad frame can never partially touch the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::note::{Note, NoteId};

pub const NOTE_CREATED: &str = "note-created";
pub const NOTE_UPDATED: &str = "note-updated";
pub const NOTE_DELETED: &str = "note-deleted";
pub const ONLINE_USERS: &str = "online-users";
/// Accepted alias for [`ONLINE_USERS`].
pub const PRESENCE_SNAPSHOT: &str = "presence-snapshot";

/// Raw envelope as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// A decoded change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    NoteCreated(Note),
    NoteUpdated(Note),
    NoteDeleted(NoteId),
    /// Full list of online users; replaces the previous one.
    PresenceSnapshot(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeletedPayload {
    Object { id: NoteId },
    Bare(NoteId),
}

impl Notification {
    /// Wire event name for this notification.
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::NoteCreated(_) => NOTE_CREATED,
            Notification::NoteUpdated(_) => NOTE_UPDATED,
            Notification::NoteDeleted(_) => NOTE_DELETED,
            Notification::PresenceSnapshot(_) => ONLINE_USERS,
        }
    }

    /// Note id the notification refers to, if any.
    pub fn note_id(&self) -> Option<NoteId> {
        match self {
            Notification::NoteCreated(note) | Notification::NoteUpdated(note) => Some(note.id),
            Notification::NoteDeleted(id) => Some(*id),
            Notification::PresenceSnapshot(_) => None,
        }
    }

    /// Decode a payload for a named event.
    pub fn decode(event: &str, data: Value) -> Result<Self, ProtocolError> {
        let data = unwrap_embedded(data);
        match event {
            NOTE_CREATED => serde_json::from_value(data)
                .map(Notification::NoteCreated)
                .map_err(|source| ProtocolError::InvalidPayload { event: NOTE_CREATED, source }),
            NOTE_UPDATED => serde_json::from_value(data)
                .map(Notification::NoteUpdated)
                .map_err(|source| ProtocolError::InvalidPayload { event: NOTE_UPDATED, source }),
            NOTE_DELETED => serde_json::from_value::<DeletedPayload>(data)
                .map(|payload| match payload {
                    DeletedPayload::Object { id } | DeletedPayload::Bare(id) => {
                        Notification::NoteDeleted(id)
                    }
                })
                .map_err(|source| ProtocolError::InvalidPayload { event: NOTE_DELETED, source }),
            ONLINE_USERS | PRESENCE_SNAPSHOT => serde_json::from_value(data)
                .map(Notification::PresenceSnapshot)
                .map_err(|source| ProtocolError::InvalidPayload { event: ONLINE_USERS, source }),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Decode one server-sent event. Unnamed events must carry a full
    /// `{"event", "data"}` envelope.
    pub fn from_event(event: &str, data: &str) -> Result<Self, ProtocolError> {
        if event.is_empty() || event == "message" {
            return Self::parse(data);
        }
        let data = serde_json::from_str(data).map_err(ProtocolError::InvalidFrame)?;
        Self::decode(event, data)
    }

    pub fn from_frame(frame: PushFrame) -> Result<Self, ProtocolError> {
        Self::decode(&frame.event, frame.data)
    }

    /// Parse a complete text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: PushFrame = serde_json::from_str(text).map_err(ProtocolError::InvalidFrame)?;
        Self::from_frame(frame)
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let data = match self {
            Notification::NoteCreated(note) | Notification::NoteUpdated(note) => {
                serde_json::to_value(note)
            }
            Notification::NoteDeleted(id) => Ok(serde_json::json!({ "id": id })),
            Notification::PresenceSnapshot(users) => serde_json::to_value(users),
        }
        .map_err(ProtocolError::Encode)?;

        let frame = PushFrame {
            event: self.event_name().to_string(),
            data,
        };
        serde_json::to_string(&frame).map_err(ProtocolError::Encode)
    }
}

/// Servers relaying event-stream data sometimes double-encode the payload
/// as a JSON string. Unwrap one level when that is the case.
fn unwrap_embedded(data: Value) -> Value {
    match data {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

/// Push-channel decoding errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown push event: {0}")]
    UnknownEvent(String),

    #[error("malformed {event} payload: {source}")]
    InvalidPayload {
        event: &'static str,
        source: serde_json::Error,
    },

    #[error("malformed push frame: {0}")]
    InvalidFrame(#[source] serde_json::Error),

    #[error("failed to encode push frame: {0}")]
    Encode(#[source] serde_json::Error),
}
