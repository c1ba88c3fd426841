// SPDX-FileCopyrightText: 2024 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use cachet_common::{
    events::server::UserPayload, identifiers::UserId, material::MlKemPublicKey,
};

use crate::errors::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(test, derive(PartialEq))]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub public_key: MlKemPublicKey,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// The public view of this user.
    pub fn payload(&self) -> UserPayload {
        UserPayload {
            id: self.id,
            username: self.username.clone(),
            public_key: self.public_key.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, password_hash, public_key, is_active, created_at, updated_at";

impl UserRecord {
    pub(crate) async fn store_new(
        connection: impl PgExecutor<'_>,
        username: &str,
        password_hash: &str,
        public_key: &MlKemPublicKey,
    ) -> Result<UserRecord, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (username, password_hash, public_key)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(password_hash)
        .bind(public_key)
        .fetch_one(connection)
        .await
    }

    pub async fn load(
        connection: impl PgExecutor<'_>,
        user_id: UserId,
    ) -> Result<Option<UserRecord>, StorageError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(connection)
        .await?;
        Ok(record)
    }

    pub async fn load_by_username(
        connection: impl PgExecutor<'_>,
        username: &str,
    ) -> Result<Option<UserRecord>, StorageError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(connection)
        .await?;
        Ok(record)
    }

    /// Case-insensitive substring search over usernames, paginated. Returns
    /// the page and the total match count.
    pub async fn search(
        connection: impl PgExecutor<'_> + Clone,
        query: &str,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<UserRecord>, i64), StorageError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE username ILIKE '%' || $1 || '%'",
        )
        .bind(query)
        .fetch_one(connection.clone())
        .await?;

        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users
            WHERE username ILIKE '%' || $1 || '%'
            ORDER BY username ASC
            OFFSET $2 LIMIT $3"
        ))
        .bind(query)
        .bind(offset)
        .bind(limit)
        .fetch_all(connection)
        .await?;

        Ok((records, total))
    }
}
