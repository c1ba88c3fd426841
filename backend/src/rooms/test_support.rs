// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fixtures shared by the room service tests.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sqlx::PgPool;

use cachet_common::{
    events::client::KeyEntry,
    identifiers::UserId,
    material::{Ciphertext, Iv, MlKemPublicKey, WrappedKey},
};

use crate::auth_service::{AuthenticatedUser, UserRecord};

pub(crate) async fn seed_user(pool: &PgPool, username: &str) -> anyhow::Result<AuthenticatedUser> {
    let public_key = MlKemPublicKey::try_from(BASE64.encode(vec![1u8; 800]))?;
    let user = UserRecord::store_new(pool, username, "not-a-real-hash", &public_key).await?;
    Ok(AuthenticatedUser {
        user_id: user.id,
        username: user.username,
    })
}

/// A distinguishable wrapped-key blob ("A1" etc., base64-encoded).
pub(crate) fn wrap(tag: &str) -> WrappedKey {
    WrappedKey::try_from(BASE64.encode(tag.as_bytes())).expect("valid base64")
}

pub(crate) fn key_entries(entries: &[(UserId, &str)]) -> Vec<KeyEntry> {
    entries
        .iter()
        .map(|(user_id, tag)| KeyEntry {
            user_id: *user_id,
            encrypted_key: wrap(tag),
        })
        .collect()
}

pub(crate) fn ciphertext(tag: &str) -> Ciphertext {
    Ciphertext::try_from(BASE64.encode(tag.as_bytes())).expect("valid base64")
}

pub(crate) fn iv() -> Iv {
    Iv::try_from(BASE64.encode([9u8; 16])).expect("valid base64")
}
