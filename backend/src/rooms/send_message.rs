// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use cachet_common::{
    events::client::SendMessage,
    identifiers::{KeyVersion, MessageId, UserId},
};

use crate::auth_service::AuthenticatedUser;

use super::{
    errors::RoomError, membership, message_record::MessageRecord, room_record::RoomRecord,
    RoomService,
};

#[derive(Debug)]
pub struct AppendedMessage {
    pub message: MessageRecord,
    pub sender_username: String,
    pub is_group: bool,
    pub participants: Vec<UserId>,
}

impl RoomService {
    /// Append a ciphertext to a room. The named key version must already be
    /// installed, which pins every stored message to a version at most the
    /// room's current one.
    #[tracing::instrument(skip(self, request), fields(room_id = %request.room_id, sender = %caller.user_id))]
    pub async fn append_user_message(
        &self,
        caller: &AuthenticatedUser,
        request: SendMessage,
    ) -> Result<AppendedMessage, RoomError> {
        if request.key_version < KeyVersion::FIRST {
            return Err(RoomError::InvalidKeyVersion);
        }

        let mut tx = self.pool().begin().await?;
        let room = RoomRecord::load_for_update(&mut tx, request.room_id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        let participants = membership::participant_ids(&mut *tx, room.id).await?;
        if !participants.contains(&caller.user_id) {
            return Err(RoomError::NotAParticipant);
        }
        if request.key_version > room.current_key_version {
            return Err(RoomError::FutureKeyVersion {
                requested: request.key_version,
                current: room.current_key_version,
            });
        }

        let message = MessageRecord::insert_user(
            &mut *tx,
            room.id,
            caller.user_id,
            &request.encrypted_content,
            &request.iv,
            request.key_version,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(message_id = %message.id, "message stored");
        Ok(AppendedMessage {
            message,
            sender_username: caller.username.clone(),
            is_group: room.is_group,
            participants,
        })
    }

    /// Set the delivered flag after the first successful fan-out to a live
    /// recipient session. Only meaningful for 1-to-1 rooms; never reset.
    pub async fn mark_delivered(&self, message_id: MessageId) -> Result<(), RoomError> {
        MessageRecord::mark_delivered(self.pool(), message_id).await?;
        Ok(())
    }
}
