// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};

use cachet_common::{
    events::server::{RoomMember, RoomPayload},
    identifiers::{KeyVersion, RoomId},
};

use crate::errors::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(test, derive(PartialEq))]
pub struct RoomRecord {
    pub id: RoomId,
    pub name: Option<String>,
    pub is_group: bool,
    pub current_key_version: KeyVersion,
    pub rotation_pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoomRecord {
    pub fn payload(&self, participants: Option<Vec<RoomMember>>, count: usize) -> RoomPayload {
        RoomPayload {
            id: self.id,
            name: self.name.clone(),
            is_group: self.is_group,
            current_key_version: self.current_key_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            participant_count: count,
            participants,
        }
    }
}

const ROOM_COLUMNS: &str =
    "id, name, is_group, current_key_version, rotation_pending, created_at, updated_at";

impl RoomRecord {
    pub(super) async fn insert(
        connection: impl PgExecutor<'_>,
        name: Option<&str>,
        is_group: bool,
    ) -> Result<RoomRecord, StorageError> {
        let room = sqlx::query_as::<_, RoomRecord>(&format!(
            "INSERT INTO rooms (name, is_group) VALUES ($1, $2) RETURNING {ROOM_COLUMNS}"
        ))
        .bind(name)
        .bind(is_group)
        .fetch_one(connection)
        .await?;
        Ok(room)
    }

    pub(super) async fn load(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
    ) -> Result<Option<RoomRecord>, StorageError> {
        let room = sqlx::query_as::<_, RoomRecord>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"
        ))
        .bind(room_id)
        .fetch_optional(connection)
        .await?;
        Ok(room)
    }

    /// Load the room row with a row lock. All membership changes and key
    /// installs for a room are serialised on this lock; two concurrent
    /// rotations therefore produce exactly one winner.
    pub(super) async fn load_for_update(
        connection: &mut PgConnection,
        room_id: RoomId,
    ) -> Result<Option<RoomRecord>, StorageError> {
        let room = sqlx::query_as::<_, RoomRecord>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1 FOR UPDATE"
        ))
        .bind(room_id)
        .fetch_optional(connection)
        .await?;
        Ok(room)
    }

    pub(super) async fn set_rotation_pending(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
        pending: bool,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE rooms SET rotation_pending = $2, updated_at = now() WHERE id = $1")
            .bind(room_id)
            .bind(pending)
            .execute(connection)
            .await?;
        Ok(())
    }

    /// Deleting the room cascades to participants, ledger entries and
    /// messages.
    pub(super) async fn delete(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
    ) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(connection)
            .await?;
        Ok(())
    }
}
