// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeSet;

use cachet_common::events::{client::CreateRoom, server::RoomMember};
use cachet_common::identifiers::{KeyVersion, UserId};

use crate::auth_service::{AuthenticatedUser, UserRecord};

use super::{
    errors::RoomError, key_ledger::KeyLedgerEntry, membership, room_record::RoomRecord,
    wrap_map, RoomService,
};

#[derive(Debug)]
pub struct CreatedRoom {
    pub room: RoomRecord,
    pub members: Vec<RoomMember>,
    pub participant_ids: Vec<UserId>,
    pub created_by: String,
    pub encryption_setup: bool,
}

impl RoomService {
    /// Create a room and install ledger version 1 in the same transaction.
    ///
    /// The wrap set must cover the creator and every invitee; listing the
    /// creator among the invitees is harmless.
    #[tracing::instrument(skip(self, request), fields(creator = %caller.user_id))]
    pub async fn create_room(
        &self,
        caller: &AuthenticatedUser,
        request: CreateRoom,
    ) -> Result<CreatedRoom, RoomError> {
        let invitees: BTreeSet<UserId> = request
            .participant_ids
            .iter()
            .copied()
            .filter(|id| *id != caller.user_id)
            .collect();
        let mut participants = invitees.clone();
        participants.insert(caller.user_id);

        let wraps = wrap_map(request.encrypted_keys);
        let covered: BTreeSet<UserId> = wraps.keys().copied().collect();
        if covered != participants {
            return Err(RoomError::IncompleteWrapSet);
        }

        let is_group = request.is_group.unwrap_or(invitees.len() > 1);

        let mut tx = self.pool().begin().await?;
        for invitee in &invitees {
            UserRecord::load(&mut *tx, *invitee)
                .await?
                .ok_or(RoomError::UserNotFound(*invitee))?;
        }

        let room = RoomRecord::insert(&mut *tx, request.name.as_deref(), is_group).await?;
        for participant in &participants {
            membership::add_participant(&mut *tx, room.id, *participant).await?;
        }
        KeyLedgerEntry::install(&mut *tx, room.id, KeyVersion::FIRST, &wraps).await?;

        let members = membership::members(&mut *tx, room.id).await?;
        let room = RoomRecord::load(&mut *tx, room.id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;
        tx.commit().await?;

        tracing::info!(room_id = %room.id, participants = participants.len(), "room created");
        Ok(CreatedRoom {
            room,
            members,
            participant_ids: participants.into_iter().collect(),
            created_by: caller.username.clone(),
            encryption_setup: true,
        })
    }
}
