// SPDX-FileCopyrightText: 2024 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use cachet_common::identifiers::UserId;

use crate::errors::StorageError;

/// Server-side record of an issued refresh token, addressed by its jti.
/// Mutated only to set `revoked`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub jti: Uuid,
    pub user_id: UserId,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub(crate) async fn store(
        connection: impl PgExecutor<'_>,
        jti: Uuid,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO refresh_tokens (jti, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(jti)
            .bind(user_id)
            .bind(expires_at)
            .execute(connection)
            .await?;
        Ok(())
    }

    pub(crate) async fn load(
        connection: impl PgExecutor<'_>,
        jti: Uuid,
    ) -> Result<Option<RefreshTokenRecord>, StorageError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT jti, user_id, revoked, expires_at, created_at
            FROM refresh_tokens WHERE jti = $1",
        )
        .bind(jti)
        .fetch_optional(connection)
        .await?;
        Ok(record)
    }

    pub(crate) async fn revoke(
        connection: impl PgExecutor<'_>,
        jti: Uuid,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = $1")
            .bind(jti)
            .execute(connection)
            .await?;
        Ok(())
    }
}
