//! Matrix client-server API wire types (minimal subset).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub login_type: &'a str,
    pub identifier: UserIdentifier<'a>,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_device_display_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserIdentifier<'a> {
    #[serde(rename = "type")]
    pub id_type: &'a str,
    pub user: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRoomRequest<'a> {
    pub name: &'a str,
    pub invite: Vec<&'a str>,
    pub preset: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RedactRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub errcode: String,
    #[serde(default)]
    pub error: String,
}

/// Successful password login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoomIdResponse {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventIdResponse {
    pub event_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JoinedRoomsResponse {
    pub joined_rooms: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub content_uri: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SyncResponse {
    #[serde(default)]
    pub rooms: SyncRooms,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SyncRooms {
    #[serde(default)]
    pub invite: HashMap<String, serde_json::Value>,
}

/// A room event as returned by `GET /rooms/{roomId}/event/{eventId}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub event_id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl RoomEvent {
    /// `content.body`, if present.
    pub fn body(&self) -> Option<&str> {
        self.content.get("body").and_then(serde_json::Value::as_str)
    }

    /// `content.url`, the `mxc://` URI of media events.
    pub fn content_uri(&self) -> Option<&str> {
        self.content.get("url").and_then(serde_json::Value::as_str)
    }
}
