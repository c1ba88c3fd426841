// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::{BTreeMap, BTreeSet};

use cachet_common::{
    events::{client::InviteToRoom, server::RoomMember},
    identifiers::{KeyVersion, UserId},
    material::WrappedKey,
};

use crate::auth_service::{AuthenticatedUser, UserRecord};

use super::{
    errors::RoomError, key_ledger::KeyLedgerEntry, membership, message_record::MessageRecord,
    room_record::RoomRecord, wrap_map, RoomService,
};

#[derive(Debug)]
pub struct InviteOutcome {
    pub room: RoomRecord,
    pub members: Vec<RoomMember>,
    pub invited_users: Vec<UserRecord>,
    pub invited_by: String,
    pub new_key_version: KeyVersion,
    /// The full wrap set installed at the new version, for targeted fan-out.
    pub wraps: BTreeMap<UserId, WrappedKey>,
}

impl RoomService {
    /// Add users to a room. Adding a member rotates the key: the inviter
    /// supplies wraps at the next version for everyone, current members and
    /// invitees alike, or nothing changes.
    #[tracing::instrument(skip(self, request), fields(room_id = %request.room_id, caller = %caller.user_id))]
    pub async fn invite(
        &self,
        caller: &AuthenticatedUser,
        request: InviteToRoom,
    ) -> Result<InviteOutcome, RoomError> {
        let mut tx = self.pool().begin().await?;
        let room = RoomRecord::load_for_update(&mut tx, request.room_id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        let current = membership::participant_ids(&mut *tx, room.id).await?;
        if !current.contains(&caller.user_id) {
            return Err(RoomError::NotAParticipant);
        }

        let next = room.current_key_version.next();
        if let Some(provided) = request.new_key_version {
            if provided != next {
                return Err(RoomError::VersionConflict {
                    expected: next,
                    provided,
                });
            }
        }

        // An invitee who is already in the room is a per-user no-op.
        let mut invited_users = Vec::new();
        let mut seen = BTreeSet::new();
        for user_id in request.invited_user_ids {
            if !seen.insert(user_id) {
                continue;
            }
            let user = UserRecord::load(&mut *tx, user_id)
                .await?
                .ok_or(RoomError::UserNotFound(user_id))?;
            if !current.contains(&user_id) {
                invited_users.push(user);
            }
        }
        if invited_users.is_empty() {
            return Err(RoomError::NoNewUsers);
        }

        let wraps = wrap_map(request.new_encrypted_keys);
        let target: BTreeSet<UserId> = current
            .iter()
            .copied()
            .chain(invited_users.iter().map(|user| user.id))
            .collect();
        if wraps.keys().copied().collect::<BTreeSet<_>>() != target {
            return Err(RoomError::IncompleteWrapSet);
        }

        for user in &invited_users {
            membership::add_participant(&mut *tx, room.id, user.id).await?;
        }
        KeyLedgerEntry::install(&mut *tx, room.id, next, &wraps).await?;
        if room.rotation_pending {
            // The fresh head postdates the last departure.
            RoomRecord::set_rotation_pending(&mut *tx, room.id, false).await?;
        }

        let joined = invited_users
            .iter()
            .map(|user| user.username.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        MessageRecord::insert_system(&mut *tx, room.id, &format!("{joined} joined the room"), next)
            .await?;

        let members = membership::members(&mut *tx, room.id).await?;
        let room = RoomRecord::load(&mut *tx, room.id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;
        tx.commit().await?;

        tracing::info!(
            room_id = %room.id,
            new_key_version = %next,
            invited = invited_users.len(),
            "users invited, key rotated"
        );
        Ok(InviteOutcome {
            room,
            members,
            invited_users,
            invited_by: caller.username.clone(),
            new_key_version: next,
            wraps,
        })
    }
}
