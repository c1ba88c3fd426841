// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The room_participants join table: source of truth for who is in a room.

use sqlx::PgExecutor;

use cachet_common::{
    events::server::{RoomMember, RoomPeer},
    identifiers::{RoomId, UserId},
};

use crate::errors::StorageError;

use super::room_record::RoomRecord;

/// Idempotent: re-adding an existing participant is a no-op.
pub(super) async fn add_participant(
    connection: impl PgExecutor<'_>,
    room_id: RoomId,
    user_id: UserId,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO room_participants (user_id, room_id) VALUES ($1, $2)
        ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(room_id)
    .execute(connection)
    .await?;
    Ok(())
}

/// Returns whether the user actually was a participant.
pub(super) async fn remove_participant(
    connection: impl PgExecutor<'_>,
    room_id: RoomId,
    user_id: UserId,
) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM room_participants WHERE user_id = $1 AND room_id = $2")
        .bind(user_id)
        .bind(room_id)
        .execute(connection)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn participant_ids(
    connection: impl PgExecutor<'_>,
    room_id: RoomId,
) -> Result<Vec<UserId>, StorageError> {
    let ids = sqlx::query_scalar::<_, UserId>(
        "SELECT user_id FROM room_participants WHERE room_id = $1 ORDER BY user_id",
    )
    .bind(room_id)
    .fetch_all(connection)
    .await?;
    Ok(ids)
}

pub(super) async fn is_participant(
    connection: impl PgExecutor<'_>,
    room_id: RoomId,
    user_id: UserId,
) -> Result<bool, StorageError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM room_participants WHERE room_id = $1 AND user_id = $2
        )",
    )
    .bind(room_id)
    .bind(user_id)
    .fetch_one(connection)
    .await?;
    Ok(exists)
}

pub(super) async fn members(
    connection: impl PgExecutor<'_>,
    room_id: RoomId,
) -> Result<Vec<RoomMember>, StorageError> {
    let members = sqlx::query_as::<_, RoomMember>(
        "SELECT u.id, u.username
        FROM room_participants rp
        JOIN users u ON u.id = rp.user_id
        WHERE rp.room_id = $1
        ORDER BY u.id",
    )
    .bind(room_id)
    .fetch_all(connection)
    .await?;
    Ok(members)
}

/// Participants with the public keys new wraps get encapsulated under.
pub(super) async fn peers(
    connection: impl PgExecutor<'_>,
    room_id: RoomId,
) -> Result<Vec<RoomPeer>, StorageError> {
    let peers = sqlx::query_as::<_, RoomPeer>(
        "SELECT u.id AS user_id, u.username, u.public_key
        FROM room_participants rp
        JOIN users u ON u.id = rp.user_id
        WHERE rp.room_id = $1
        ORDER BY u.id",
    )
    .bind(room_id)
    .fetch_all(connection)
    .await?;
    Ok(peers)
}

pub(super) async fn rooms_of_user(
    connection: impl PgExecutor<'_>,
    user_id: UserId,
) -> Result<Vec<RoomRecord>, StorageError> {
    let rooms = sqlx::query_as::<_, RoomRecord>(
        "SELECT r.id, r.name, r.is_group, r.current_key_version, r.rotation_pending,
            r.created_at, r.updated_at
        FROM room_participants rp
        JOIN rooms r ON r.id = rp.room_id
        WHERE rp.user_id = $1
        ORDER BY r.id",
    )
    .bind(user_id)
    .fetch_all(connection)
    .await?;
    Ok(rooms)
}
