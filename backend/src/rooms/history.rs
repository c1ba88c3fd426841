// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use cachet_common::{
    events::{client::GetMessages, server::MessagesHistoryPayload},
    MESSAGE_PAGE_LIMIT,
};

use crate::auth_service::AuthenticatedUser;

use super::{
    errors::RoomError, key_ledger::KeyLedgerEntry, membership, message_record::MessageRecord,
    room_record::RoomRecord, RoomService,
};

impl RoomService {
    /// One page of history, oldest first within the page, plus the caller's
    /// complete wrapped-key map so every returned ciphertext is decryptable.
    #[tracing::instrument(skip(self, request), fields(room_id = %request.room_id, caller = %caller.user_id))]
    pub async fn message_history(
        &self,
        caller: &AuthenticatedUser,
        request: GetMessages,
    ) -> Result<MessagesHistoryPayload, RoomError> {
        let room = RoomRecord::load(self.pool(), request.room_id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;
        if !membership::is_participant(self.pool(), room.id, caller.user_id).await? {
            return Err(RoomError::NotAParticipant);
        }

        let limit = request
            .limit
            .unwrap_or(MESSAGE_PAGE_LIMIT)
            .clamp(0, MESSAGE_PAGE_LIMIT);
        let offset = request.offset.unwrap_or(0).max(0);

        let mut messages = Vec::new();
        if limit > 0 {
            let rows = MessageRecord::history_page(self.pool(), room.id, limit, offset).await?;
            // Fetched newest first; hand back chronological order.
            messages.extend(
                rows.into_iter()
                    .rev()
                    .map(|row| row.message.payload(row.sender_username)),
            );
        }

        let encrypted_symmetric_keys =
            KeyLedgerEntry::wrapped_keys_for(self.pool(), room.id, caller.user_id).await?;

        let has_more = limit > 0 && messages.len() as i64 == limit;
        Ok(MessagesHistoryPayload {
            room_id: room.id,
            count: messages.len(),
            messages,
            offset,
            has_more,
            encrypted_symmetric_keys,
        })
    }
}
