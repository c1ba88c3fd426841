// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::{BTreeMap, BTreeSet};

use cachet_common::{
    events::client::RotateRoomKey,
    identifiers::{KeyVersion, UserId},
    material::WrappedKey,
};

use crate::auth_service::AuthenticatedUser;

use super::{
    errors::RoomError, key_ledger::KeyLedgerEntry, membership, room_record::RoomRecord,
    wrap_map, RoomService,
};

#[derive(Debug)]
pub struct RotationOutcome {
    pub room: RoomRecord,
    pub new_key_version: KeyVersion,
    pub rotated_by: String,
    /// One wrap per current participant, for targeted fan-out.
    pub wraps: BTreeMap<UserId, WrappedKey>,
}

impl RoomService {
    /// Install the next key version. The wrap set must equal the current
    /// participant set, and the supplied version must be exactly
    /// current + 1; a stale version means another rotation won the race and
    /// the caller should rebuild its wraps against the new current version.
    #[tracing::instrument(skip(self, request), fields(room_id = %request.room_id, caller = %caller.user_id))]
    pub async fn rotate(
        &self,
        caller: &AuthenticatedUser,
        request: RotateRoomKey,
    ) -> Result<RotationOutcome, RoomError> {
        let mut tx = self.pool().begin().await?;
        let room = RoomRecord::load_for_update(&mut tx, request.room_id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        let participants = membership::participant_ids(&mut *tx, room.id).await?;
        if !participants.contains(&caller.user_id) {
            return Err(RoomError::NotAParticipant);
        }

        let next = room.current_key_version.next();
        if request.new_key_version != next {
            return Err(RoomError::VersionConflict {
                expected: next,
                provided: request.new_key_version,
            });
        }

        let wraps = wrap_map(request.new_encrypted_keys);
        let covered: BTreeSet<UserId> = wraps.keys().copied().collect();
        if covered != participants.iter().copied().collect::<BTreeSet<_>>() {
            return Err(RoomError::IncompleteWrapSet);
        }

        KeyLedgerEntry::install(&mut *tx, room.id, next, &wraps).await?;
        if room.rotation_pending {
            RoomRecord::set_rotation_pending(&mut *tx, room.id, false).await?;
        }

        let room = RoomRecord::load(&mut *tx, room.id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;
        tx.commit().await?;

        tracing::info!(room_id = %room.id, new_key_version = %next, "room key rotated");
        Ok(RotationOutcome {
            room,
            new_key_version: next,
            rotated_by: caller.username.clone(),
            wraps,
        })
    }
}
