// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-room append-only log of versioned wrapped keys.
//!
//! Versions form a contiguous range `[1 .. current_key_version]`. Installing
//! version v inserts one wrap per participant, stamps every entry at v-1
//! revoked with a single timestamp and bumps the room's current version, all
//! inside the caller's transaction while the room row lock is held. Entries
//! are never deleted, except the leaver's wrap at the pre-departure version
//! which is purged for forward secrecy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};

use cachet_common::{
    identifiers::{KeyVersion, RoomId, UserId},
    material::WrappedKey,
};

use crate::errors::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(test, derive(PartialEq))]
pub struct KeyLedgerEntry {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub key_version: KeyVersion,
    pub encrypted_key: WrappedKey,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl KeyLedgerEntry {
    /// Install a complete wrap set at `version`.
    pub(super) async fn install(
        connection: &mut PgConnection,
        room_id: RoomId,
        version: KeyVersion,
        wraps: &BTreeMap<UserId, WrappedKey>,
    ) -> Result<(), StorageError> {
        for (user_id, encrypted_key) in wraps {
            Self::replace_or_insert(&mut *connection, room_id, version, *user_id, encrypted_key)
                .await?;
        }
        if let Some(previous) = version.previous() {
            sqlx::query(
                "UPDATE symmetric_keys SET revoked_at = now()
                WHERE room_id = $1 AND key_version = $2 AND revoked_at IS NULL",
            )
            .bind(room_id)
            .bind(previous)
            .execute(&mut *connection)
            .await?;
        }
        sqlx::query(
            "UPDATE rooms SET current_key_version = $2, updated_at = now() WHERE id = $1",
        )
        .bind(room_id)
        .bind(version)
        .execute(connection)
        .await?;
        Ok(())
    }

    /// Upsert a single wrap. Resending a wrap for an already-covered
    /// (room, user, version) triple replaces it in place.
    pub(super) async fn replace_or_insert(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
        version: KeyVersion,
        user_id: UserId,
        encrypted_key: &WrappedKey,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO symmetric_keys (room_id, user_id, key_version, encrypted_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (room_id, user_id, key_version)
            DO UPDATE SET encrypted_key = EXCLUDED.encrypted_key",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(version)
        .bind(encrypted_key)
        .execute(connection)
        .await?;
        Ok(())
    }

    /// Every version the user still holds an entry at, oldest first. This is
    /// what lets a reconnecting client decrypt back-history.
    pub(super) async fn wrapped_keys_for(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<BTreeMap<KeyVersion, WrappedKey>, StorageError> {
        let rows = sqlx::query_as::<_, (KeyVersion, WrappedKey)>(
            "SELECT key_version, encrypted_key FROM symmetric_keys
            WHERE room_id = $1 AND user_id = $2
            ORDER BY key_version ASC",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_all(connection)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Forward-secrecy purge of a leaver's wrap at the pre-departure version.
    pub(super) async fn purge(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
        user_id: UserId,
        version: KeyVersion,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "DELETE FROM symmetric_keys
            WHERE room_id = $1 AND user_id = $2 AND key_version = $3",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(version)
        .execute(connection)
        .await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn entries_at(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
        version: KeyVersion,
    ) -> Result<Vec<KeyLedgerEntry>, StorageError> {
        let entries = sqlx::query_as::<_, KeyLedgerEntry>(
            "SELECT room_id, user_id, key_version, encrypted_key, created_at, revoked_at
            FROM symmetric_keys
            WHERE room_id = $1 AND key_version = $2
            ORDER BY user_id",
        )
        .bind(room_id)
        .bind(version)
        .fetch_all(connection)
        .await?;
        Ok(entries)
    }

    #[cfg(test)]
    pub(crate) async fn versions(
        connection: impl PgExecutor<'_>,
        room_id: RoomId,
    ) -> Result<Vec<KeyVersion>, StorageError> {
        let versions = sqlx::query_scalar::<_, KeyVersion>(
            "SELECT DISTINCT key_version FROM symmetric_keys
            WHERE room_id = $1 ORDER BY key_version",
        )
        .bind(room_id)
        .fetch_all(connection)
        .await?;
        Ok(versions)
    }
}
