// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use cachet_common::identifiers::{RoomId, UserId};

use crate::auth_service::AuthenticatedUser;

use super::{
    errors::RoomError, key_ledger::KeyLedgerEntry, membership, message_record::MessageRecord,
    room_record::RoomRecord, RoomService,
};

#[derive(Debug)]
pub enum LeaveOutcome {
    /// The last participant left; the room and everything in it is gone.
    Deleted { room_id: RoomId },
    /// The room lives on and now needs a rotation by one of the remaining
    /// participants.
    Left {
        room: RoomRecord,
        remaining: Vec<UserId>,
    },
}

impl RoomService {
    /// Leave a room. The leaver's wrap at the current version is purged
    /// immediately; the rotation itself is a client's job, so the room is
    /// only flagged. When nobody remains the room is deleted outright and
    /// its messages and ledger cascade away.
    #[tracing::instrument(skip(self), fields(room_id = %room_id, caller = %caller.user_id))]
    pub async fn leave(
        &self,
        caller: &AuthenticatedUser,
        room_id: RoomId,
    ) -> Result<LeaveOutcome, RoomError> {
        let mut tx = self.pool().begin().await?;
        let room = RoomRecord::load_for_update(&mut tx, room_id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        if !membership::remove_participant(&mut *tx, room.id, caller.user_id).await? {
            return Err(RoomError::NotAParticipant);
        }

        let remaining = membership::participant_ids(&mut *tx, room.id).await?;
        if remaining.is_empty() {
            RoomRecord::delete(&mut *tx, room.id).await?;
            tx.commit().await?;
            tracing::info!(room_id = %room.id, "room deleted, no participants left");
            return Ok(LeaveOutcome::Deleted { room_id: room.id });
        }

        KeyLedgerEntry::purge(&mut *tx, room.id, caller.user_id, room.current_key_version)
            .await?;
        RoomRecord::set_rotation_pending(&mut *tx, room.id, true).await?;
        MessageRecord::insert_system(
            &mut *tx,
            room.id,
            &format!("{} left the room", caller.username),
            room.current_key_version,
        )
        .await?;

        let room = RoomRecord::load(&mut *tx, room.id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;
        tx.commit().await?;

        tracing::info!(room_id = %room.id, "participant left, rotation pending");
        Ok(LeaveOutcome::Left { room, remaining })
    }
}
