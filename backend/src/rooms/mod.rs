// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Room and key lifecycle engine.
//!
//! The membership set of a room and the versioned ledger of wrapped keys
//! move in lockstep: every membership change installs (or demands) a new key
//! version covering exactly the participants. All mutations of one room are
//! serialised on the room row lock, so a rotation either wins outright or
//! fails with a version conflict.
//!
//! The service returns plain outcome structs; fan-out to live sessions is
//! the transport layer's business.

use std::collections::BTreeMap;

use sqlx::PgPool;

use async_trait::async_trait;

use cachet_common::{
    events::client::KeyEntry,
    identifiers::UserId,
    material::WrappedKey,
};

use crate::{
    service::{BackendService, ServiceCreationError},
    settings::Settings,
};

mod connect;
mod create;
mod errors;
mod history;
mod invite;
mod key_ledger;
mod leave;
mod membership;
mod message_record;
mod room_record;
mod rotate;
mod send_message;

pub use connect::ConnectSnapshot;
pub use create::CreatedRoom;
pub use errors::RoomError;
pub use invite::InviteOutcome;
pub use key_ledger::KeyLedgerEntry;
pub use leave::LeaveOutcome;
pub use message_record::MessageRecord;
pub use room_record::RoomRecord;
pub use rotate::RotationOutcome;
pub use send_message::AppendedMessage;

#[derive(Debug, Clone)]
pub struct RoomService {
    db_pool: PgPool,
}

#[async_trait]
impl BackendService for RoomService {
    async fn initialize(
        db_pool: PgPool,
        _settings: &Settings,
    ) -> Result<Self, ServiceCreationError> {
        Ok(Self { db_pool })
    }
}

impl RoomService {
    #[cfg(test)]
    pub(crate) fn new_for_test(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.db_pool
    }
}

/// Collapse a client-supplied wrap list into a per-user map. Later entries
/// for the same user win.
fn wrap_map(entries: Vec<KeyEntry>) -> BTreeMap<UserId, WrappedKey> {
    entries
        .into_iter()
        .map(|entry| (entry.user_id, entry.encrypted_key))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests;
