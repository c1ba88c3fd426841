// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use cachet_common::{
    events::server::{MessageKind, MessagePayload},
    identifiers::{KeyVersion, MessageId, RoomId, UserId},
    material::{Ciphertext, Iv},
};

use crate::errors::StorageError;

/// One stored ciphertext. Immutable once appended, except for the
/// set-once `delivered` flag on 1-to-1 traffic.
#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(test, derive(PartialEq))]
pub struct MessageRecord {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: Option<UserId>,
    #[sqlx(try_from = "String")]
    pub message_type: MessageKind,
    pub encrypted_content: Ciphertext,
    pub iv: Iv,
    pub key_version: KeyVersion,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn payload(&self, sender_username: Option<String>) -> MessagePayload {
        MessagePayload {
            message_id: self.id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            // Only user messages carry a sender name.
            sender_username: match self.message_type {
                MessageKind::User => sender_username,
                MessageKind::System => None,
            },
            message_type: self.message_type,
            encrypted_content: self.encrypted_content.clone(),
            iv: self.iv.clone(),
            key_version: self.key_version,
            created_at: self.created_at,
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, message_type, encrypted_content, iv, \
     key_version, delivered, created_at";

impl MessageRecord {
    pub(super) async fn insert_user(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
        sender_id: UserId,
        encrypted_content: &Ciphertext,
        iv: &Iv,
        key_version: KeyVersion,
    ) -> Result<MessageRecord, StorageError> {
        let message = sqlx::query_as::<_, MessageRecord>(&format!(
            "INSERT INTO messages
                (room_id, sender_id, message_type, encrypted_content, iv, key_version)
            VALUES ($1, $2, 'user', $3, $4, $5)
            RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(room_id)
        .bind(sender_id)
        .bind(encrypted_content)
        .bind(iv)
        .bind(key_version)
        .fetch_one(connection)
        .await?;
        Ok(message)
    }

    /// Server-originated informational record ("alice joined the room").
    /// Stored base64-encoded with a dummy IV; clients recognise the type and
    /// render without decrypting.
    pub(super) async fn insert_system(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
        text: &str,
        key_version: KeyVersion,
    ) -> Result<MessageRecord, StorageError> {
        let message = sqlx::query_as::<_, MessageRecord>(&format!(
            "INSERT INTO messages
                (room_id, sender_id, message_type, encrypted_content, iv, key_version)
            VALUES ($1, NULL, 'system', $2, $3, $4)
            RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(room_id)
        .bind(Ciphertext::from_plain_text(text))
        .bind(Iv::dummy())
        .bind(key_version)
        .fetch_one(connection)
        .await?;
        Ok(message)
    }

    /// One page, newest first; server timestamp with id as tiebreak.
    pub(super) async fn history_page(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryRow>, StorageError> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {columns}, u.username AS sender_username
            FROM messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.room_id = $1
            ORDER BY m.created_at DESC, m.id DESC
            OFFSET $2 LIMIT $3",
            columns = MESSAGE_COLUMNS
                .split(", ")
                .map(|column| format!("m.{column}"))
                .collect::<Vec<_>>()
                .join(", "),
        ))
        .bind(room_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(connection)
        .await?;
        Ok(rows)
    }

    /// Set once, on first successful fan-out to a live recipient session.
    pub(super) async fn mark_delivered(
        connection: impl PgExecutor<'_>,
        message_id: MessageId,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE messages SET delivered = TRUE WHERE id = $1")
            .bind(message_id)
            .execute(connection)
            .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct HistoryRow {
    #[sqlx(flatten)]
    pub(super) message: MessageRecord,
    pub(super) sender_username: Option<String>,
}
