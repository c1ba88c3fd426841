// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server-originated events fanned out to sessions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    identifiers::{KeyVersion, MessageId, RoomId, UserId},
    material::{Ciphertext, Iv, MlKemPublicKey, WrappedKey},
};

/// Discriminates stored ciphertexts from server-originated informational
/// records that clients render without decrypting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    System,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::User => "user",
            MessageKind::System => "system",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown message type: {0}")]
pub struct UnknownMessageKind(String);

impl TryFrom<String> for MessageKind {
    type Error = UnknownMessageKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(MessageKind::User),
            "system" => Ok(MessageKind::System),
            _ => Err(UnknownMessageKind(value)),
        }
    }
}

/// Why a rotation happened or is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    UserLeft,
    PendingFromLeave,
    ManualRotation,
}

/// Everything the gateway can push to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    RotationRequired(RotationRequiredPayload),
    RoomCreated(RoomCreatedPayload),
    UsersInvited(UsersInvitedPayload),
    InvitedToRoom(InvitedToRoomPayload),
    UserLeft(UserLeftPayload),
    RoomLeft(RoomLeftPayload),
    RoomDeleted(RoomDeletedPayload),
    KeyRotated(KeyRotatedPayload),
    NewMessage(MessagePayload),
    MessagesHistory(MessagesHistoryPayload),
    Error(ErrorPayload),
}

/// Public record of a user, as exposed to other clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: UserId,
    pub username: String,
    pub public_key: MlKemPublicKey,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomMember {
    pub id: UserId,
    pub username: String,
}

/// Room participant together with the public key needed to wrap keys for
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomPeer {
    pub user_id: UserId,
    pub username: String,
    pub public_key: MlKemPublicKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPayload {
    pub id: RoomId,
    pub name: Option<String>,
    pub is_group: bool,
    pub current_key_version: KeyVersion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participant_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<RoomMember>>,
}

/// Per-room state replayed to a freshly connected session: who is in the
/// room and every wrapped key version the user still holds an entry at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomPayload,
    pub participants: Vec<RoomPeer>,
    pub encrypted_symmetric_keys: BTreeMap<KeyVersion, WrappedKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    pub message: String,
    pub user: UserPayload,
    pub rooms: Vec<RoomSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationRequiredPayload {
    pub room_id: RoomId,
    pub reason: RotationReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_user: Option<RoomMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomCreatedPayload {
    pub room: RoomPayload,
    pub created_by: String,
    pub encryption_setup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersInvitedPayload {
    pub room_id: RoomId,
    pub invited_users: Vec<UserPayload>,
    pub invited_by: String,
    pub new_key_version: KeyVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitedToRoomPayload {
    pub room: RoomPayload,
    pub invited_by: String,
    pub encrypted_key: WrappedKey,
    pub new_key_version: KeyVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLeftPayload {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub rotation_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomLeftPayload {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDeletedPayload {
    pub room_id: RoomId,
}

/// Targeted per recipient: each participant gets their own wrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRotatedPayload {
    pub room_id: RoomId,
    pub new_key_version: KeyVersion,
    pub reason: RotationReason,
    pub rotated_by: String,
    pub encrypted_key: WrappedKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message_id: MessageId,
    pub room_id: RoomId,
    pub sender_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    pub message_type: MessageKind,
    pub encrypted_content: Ciphertext,
    pub iv: Iv,
    pub key_version: KeyVersion,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesHistoryPayload {
    pub room_id: RoomId,
    pub messages: Vec<MessagePayload>,
    pub count: usize,
    pub offset: i64,
    pub has_more: bool,
    pub encrypted_symmetric_keys: BTreeMap<KeyVersion, WrappedKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_has_flat_envelope() {
        let frame = serde_json::to_value(ServerEvent::error("Room not found")).unwrap();
        assert_eq!(
            frame,
            serde_json::json!({"event": "error", "data": {"message": "Room not found"}})
        );
    }

    #[test]
    fn key_version_maps_serialize_with_string_keys() {
        let mut keys = BTreeMap::new();
        keys.insert(
            KeyVersion::FIRST,
            WrappedKey::try_from("QTE=".to_owned()).unwrap(),
        );
        keys.insert(
            KeyVersion::new(2),
            WrappedKey::try_from("QTI=".to_owned()).unwrap(),
        );
        let value = serde_json::to_value(&keys).unwrap();
        assert_eq!(value, serde_json::json!({"1": "QTE=", "2": "QTI="}));
    }

    #[test]
    fn rotation_reasons_use_snake_case() {
        assert_eq!(
            serde_json::to_value(RotationReason::PendingFromLeave).unwrap(),
            serde_json::json!("pending_from_leave")
        );
        assert_eq!(
            serde_json::to_value(RotationReason::ManualRotation).unwrap(),
            serde_json::json!("manual_rotation")
        );
    }
}
