// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use cachet_common::{
    events::server::RoomSnapshot,
    identifiers::{RoomId, UserId},
};

use crate::auth_service::UserRecord;

use super::{errors::RoomError, key_ledger::KeyLedgerEntry, membership, RoomService};

/// Everything a freshly authenticated session is told: the user's own
/// record, a snapshot per room (participants with public keys, every
/// wrapped-key version the user holds) and which of those rooms still await
/// a rotation.
#[derive(Debug)]
pub struct ConnectSnapshot {
    pub user: UserRecord,
    pub rooms: Vec<RoomSnapshot>,
    pub pending_rotations: Vec<RoomId>,
}

impl RoomService {
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn connect_snapshot(&self, user_id: UserId) -> Result<ConnectSnapshot, RoomError> {
        let user = UserRecord::load(self.pool(), user_id)
            .await?
            .ok_or(RoomError::UserNotFound(user_id))?;

        let rooms = membership::rooms_of_user(self.pool(), user_id).await?;
        let mut snapshots = Vec::with_capacity(rooms.len());
        let mut pending_rotations = Vec::new();
        for room in rooms {
            let participants = membership::peers(self.pool(), room.id).await?;
            let encrypted_symmetric_keys =
                KeyLedgerEntry::wrapped_keys_for(self.pool(), room.id, user_id).await?;
            if room.rotation_pending {
                pending_rotations.push(room.id);
            }
            snapshots.push(RoomSnapshot {
                room: room.payload(None, participants.len()),
                participants,
                encrypted_symmetric_keys,
            });
        }

        Ok(ConnectSnapshot {
            user,
            rooms: snapshots,
            pending_rotations,
        })
    }
}
