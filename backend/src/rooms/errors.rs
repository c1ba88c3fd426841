// SPDX-FileCopyrightText: 2024 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

use cachet_common::identifiers::{KeyVersion, UserId};

use crate::errors::{ErrorKind, StorageError};

/// Failures of room, ledger and message operations. The display strings are
/// what clients receive in `error` events; they never carry internals.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("User {0} not found")]
    UserNotFound(UserId),
    #[error("Not a participant in this room")]
    NotAParticipant,
    #[error("No new users were added")]
    NoNewUsers,
    #[error("Must provide keys for ALL current participants")]
    IncompleteWrapSet,
    #[error("Key version conflict: next version is {expected}, keys were built for {provided}")]
    VersionConflict {
        expected: KeyVersion,
        provided: KeyVersion,
    },
    #[error("key_version {requested} is ahead of the room's current version {current}")]
    FutureKeyVersion {
        requested: KeyVersion,
        current: KeyVersion,
    },
    #[error("key_version must be at least 1")]
    InvalidKeyVersion,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::RoomNotFound | RoomError::UserNotFound(_) => ErrorKind::NotFound,
            RoomError::NotAParticipant => ErrorKind::AuthorizationDenied,
            RoomError::NoNewUsers
            | RoomError::FutureKeyVersion { .. }
            | RoomError::InvalidKeyVersion => ErrorKind::Validation,
            RoomError::VersionConflict { .. } => ErrorKind::Conflict,
            RoomError::IncompleteWrapSet => ErrorKind::StateInvariant,
            RoomError::Storage(_) => ErrorKind::StorageFailure,
        }
    }
}

impl From<sqlx::Error> for RoomError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.into())
    }
}
