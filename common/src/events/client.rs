// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-originated events and their payloads.

use serde::{Deserialize, Serialize};

use crate::{
    identifiers::{KeyVersion, RoomId, UserId},
    material::{Ciphertext, Iv, WrappedKey},
};

/// One wrapped key destined for one recipient, as sent by clients whenever a
/// new key version is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub user_id: UserId,
    pub encrypted_key: WrappedKey,
}

/// Everything a client can ask the gateway to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    CreateRoom(CreateRoom),
    InviteToRoom(InviteToRoom),
    LeaveRoom(LeaveRoom),
    RotateRoomKey(RotateRoomKey),
    SendMessage(SendMessage),
    GetMessages(GetMessages),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRoom {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
    /// Defaults to true when more than one participant is invited.
    #[serde(default)]
    pub is_group: Option<bool>,
    /// Version-1 wraps; must cover the creator and every invitee.
    #[serde(default)]
    pub encrypted_keys: Vec<KeyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteToRoom {
    pub room_id: RoomId,
    pub invited_user_ids: Vec<UserId>,
    /// Wraps for the next version; must cover current participants plus
    /// invitees.
    #[serde(default)]
    pub new_encrypted_keys: Vec<KeyEntry>,
    /// The version the wraps were built for (observed current + 1). When
    /// present, a mismatch with the room's actual next version is a
    /// conflict.
    #[serde(default)]
    pub new_key_version: Option<KeyVersion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRoom {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateRoomKey {
    pub room_id: RoomId,
    /// Wraps for the next version; must cover exactly the current
    /// participant set.
    pub new_encrypted_keys: Vec<KeyEntry>,
    /// The version the wraps were built for. Losing a rotation race shows up
    /// as a conflict on this field; the client may retry against the new
    /// current version.
    pub new_key_version: KeyVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessage {
    pub room_id: RoomId,
    pub encrypted_content: Ciphertext,
    pub iv: Iv,
    pub key_version: KeyVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMessages {
    pub room_id: RoomId,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}
