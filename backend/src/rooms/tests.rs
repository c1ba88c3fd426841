// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sqlx::PgPool;

use cachet_common::{
    events::client::{CreateRoom, GetMessages, InviteToRoom, RotateRoomKey, SendMessage},
    events::server::MessageKind,
    identifiers::KeyVersion,
};

use super::{
    key_ledger::KeyLedgerEntry,
    membership,
    test_support::{ciphertext, iv, key_entries, seed_user, wrap},
    LeaveOutcome, RoomError, RoomService,
};

fn service(pool: &PgPool) -> RoomService {
    RoomService::new_for_test(pool.clone())
}

#[sqlx::test]
async fn create_room_bootstraps_version_one(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: Some("r".to_owned()),
                // The creator listing themselves must not double-insert.
                participant_ids: vec![alice.user_id, bob.user_id],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1"), (bob.user_id, "B1")]),
            },
        )
        .await?;

    assert_eq!(created.room.current_key_version, KeyVersion::FIRST);
    assert!(!created.room.rotation_pending);
    assert!(!created.room.is_group);
    assert_eq!(created.participant_ids, vec![alice.user_id, bob.user_id]);
    assert_eq!(created.members.len(), 2);
    assert!(created.encryption_setup);

    let entries = KeyLedgerEntry::entries_at(&pool, created.room.id, KeyVersion::FIRST).await?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].encrypted_key, wrap("A1"));
    assert_eq!(entries[1].encrypted_key, wrap("B1"));
    assert!(entries.iter().all(|entry| entry.revoked_at.is_none()));
    Ok(())
}

#[sqlx::test]
async fn create_room_with_single_self_wrap(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1")]),
            },
        )
        .await?;

    assert_eq!(created.room.current_key_version, KeyVersion::FIRST);
    assert_eq!(created.participant_ids, vec![alice.user_id]);
    let entries = KeyLedgerEntry::entries_at(&pool, created.room.id, KeyVersion::FIRST).await?;
    assert_eq!(entries.len(), 1);
    Ok(())
}

#[sqlx::test]
async fn create_room_rejects_incomplete_wraps(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;

    let result = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![bob.user_id],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1")]),
            },
        )
        .await;
    assert!(matches!(result, Err(RoomError::IncompleteWrapSet)));

    // Nothing was created.
    let room_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rooms")
        .fetch_one(&pool)
        .await?;
    assert_eq!(room_count, 0);
    Ok(())
}

#[sqlx::test]
async fn create_room_rejects_unknown_invitee(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let ghost = cachet_common::identifiers::UserId::new(4096);

    let result = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![ghost],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1"), (ghost, "G1")]),
            },
        )
        .await;
    assert!(matches!(result, Err(RoomError::UserNotFound(id)) if id == ghost));
    Ok(())
}

#[sqlx::test]
async fn invite_installs_next_version_and_revokes_previous(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;
    let carol = seed_user(&pool, "carol").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: Some("r".to_owned()),
                participant_ids: vec![bob.user_id],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1"), (bob.user_id, "B1")]),
            },
        )
        .await?;
    let room_id = created.room.id;

    let outcome = rooms
        .invite(
            &alice,
            InviteToRoom {
                room_id,
                invited_user_ids: vec![carol.user_id],
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A2"),
                    (bob.user_id, "B2"),
                    (carol.user_id, "C2"),
                ]),
                new_key_version: Some(KeyVersion::new(2)),
            },
        )
        .await?;

    assert_eq!(outcome.new_key_version, KeyVersion::new(2));
    assert_eq!(outcome.room.current_key_version, KeyVersion::new(2));
    assert_eq!(outcome.invited_users.len(), 1);
    assert_eq!(outcome.invited_users[0].username, "carol");
    assert_eq!(outcome.wraps[&carol.user_id], wrap("C2"));

    // Version 1 is revoked in bulk, version 2 is live.
    let v1 = KeyLedgerEntry::entries_at(&pool, room_id, KeyVersion::FIRST).await?;
    assert!(v1.iter().all(|entry| entry.revoked_at.is_some()));
    let v2 = KeyLedgerEntry::entries_at(&pool, room_id, KeyVersion::new(2)).await?;
    assert_eq!(v2.len(), 3);
    assert!(v2.iter().all(|entry| entry.revoked_at.is_none()));

    // The join notice is stored at the new version, not broadcast.
    let history = rooms
        .message_history(
            &alice,
            GetMessages {
                room_id,
                limit: None,
                offset: None,
            },
        )
        .await?;
    assert_eq!(history.messages.len(), 1);
    let notice = &history.messages[0];
    assert_eq!(notice.message_type, MessageKind::System);
    assert_eq!(notice.key_version, KeyVersion::new(2));
    assert_eq!(
        BASE64.decode(notice.encrypted_content.as_str())?,
        b"carol joined the room"
    );
    Ok(())
}

#[sqlx::test]
async fn invite_requires_wraps_for_everyone(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;
    let carol = seed_user(&pool, "carol").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![bob.user_id],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1"), (bob.user_id, "B1")]),
            },
        )
        .await?;

    // Missing bob's wrap: rejected with no state change.
    let result = rooms
        .invite(
            &alice,
            InviteToRoom {
                room_id: created.room.id,
                invited_user_ids: vec![carol.user_id],
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A2"),
                    (carol.user_id, "C2"),
                ]),
                new_key_version: None,
            },
        )
        .await;
    assert!(matches!(result, Err(RoomError::IncompleteWrapSet)));

    let participants = membership::participant_ids(&pool, created.room.id).await?;
    assert_eq!(participants, vec![alice.user_id, bob.user_id]);
    assert_eq!(
        KeyLedgerEntry::versions(&pool, created.room.id).await?,
        vec![KeyVersion::FIRST]
    );
    Ok(())
}

#[sqlx::test]
async fn invite_of_present_user_is_per_user_noop(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;
    let carol = seed_user(&pool, "carol").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![bob.user_id],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1"), (bob.user_id, "B1")]),
            },
        )
        .await?;

    // Bob is already in the room; only carol is actually added, but wraps
    // still have to cover all three.
    let outcome = rooms
        .invite(
            &alice,
            InviteToRoom {
                room_id: created.room.id,
                invited_user_ids: vec![bob.user_id, carol.user_id],
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A2"),
                    (bob.user_id, "B2"),
                    (carol.user_id, "C2"),
                ]),
                new_key_version: None,
            },
        )
        .await?;
    assert_eq!(outcome.invited_users.len(), 1);
    assert_eq!(outcome.invited_users[0].id, carol.user_id);

    // Inviting only present users changes nothing.
    let result = rooms
        .invite(
            &alice,
            InviteToRoom {
                room_id: created.room.id,
                invited_user_ids: vec![bob.user_id],
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A3"),
                    (bob.user_id, "B3"),
                    (carol.user_id, "C3"),
                ]),
                new_key_version: None,
            },
        )
        .await;
    assert!(matches!(result, Err(RoomError::NoNewUsers)));
    Ok(())
}

#[sqlx::test]
async fn invite_detects_version_conflict(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1")]),
            },
        )
        .await?;

    let result = rooms
        .invite(
            &alice,
            InviteToRoom {
                room_id: created.room.id,
                invited_user_ids: vec![bob.user_id],
                new_encrypted_keys: key_entries(&[(alice.user_id, "A3"), (bob.user_id, "B3")]),
                new_key_version: Some(KeyVersion::new(3)),
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(RoomError::VersionConflict { expected, provided })
            if expected == KeyVersion::new(2) && provided == KeyVersion::new(3)
    ));
    Ok(())
}

#[sqlx::test]
async fn leave_purges_current_wrap_and_flags_rotation(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;
    let carol = seed_user(&pool, "carol").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![bob.user_id, carol.user_id],
                is_group: Some(true),
                encrypted_keys: key_entries(&[
                    (alice.user_id, "A1"),
                    (bob.user_id, "B1"),
                    (carol.user_id, "C1"),
                ]),
            },
        )
        .await?;
    let room_id = created.room.id;

    rooms
        .rotate(
            &alice,
            RotateRoomKey {
                room_id,
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A2"),
                    (bob.user_id, "B2"),
                    (carol.user_id, "C2"),
                ]),
                new_key_version: KeyVersion::new(2),
            },
        )
        .await?;

    let outcome = rooms.leave(&carol, room_id).await?;
    let LeaveOutcome::Left { room, remaining } = outcome else {
        panic!("room should survive");
    };
    assert!(room.rotation_pending);
    assert_eq!(remaining, vec![alice.user_id, bob.user_id]);

    // Carol's wrap at the pre-departure version is purged, her older wrap
    // stays retrievable.
    let v2 = KeyLedgerEntry::entries_at(&pool, room_id, KeyVersion::new(2)).await?;
    assert!(v2.iter().all(|entry| entry.user_id != carol.user_id));
    let carol_keys = KeyLedgerEntry::wrapped_keys_for(&pool, room_id, carol.user_id).await?;
    assert_eq!(carol_keys.len(), 1);
    assert_eq!(carol_keys[&KeyVersion::FIRST], wrap("C1"));

    // The leave notice is stored at the pre-rotation version.
    let history = rooms
        .message_history(
            &alice,
            GetMessages {
                room_id,
                limit: None,
                offset: None,
            },
        )
        .await?;
    let notice = history.messages.last().unwrap();
    assert_eq!(notice.message_type, MessageKind::System);
    assert_eq!(notice.key_version, KeyVersion::new(2));
    assert_eq!(
        BASE64.decode(notice.encrypted_content.as_str())?,
        b"carol left the room"
    );
    Ok(())
}

#[sqlx::test]
async fn sole_participant_leaving_deletes_the_room(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1")]),
            },
        )
        .await?;
    rooms
        .append_user_message(
            &alice,
            SendMessage {
                room_id: created.room.id,
                encrypted_content: ciphertext("CT"),
                iv: iv(),
                key_version: KeyVersion::FIRST,
            },
        )
        .await?;

    let outcome = rooms.leave(&alice, created.room.id).await?;
    assert!(matches!(outcome, LeaveOutcome::Deleted { room_id } if room_id == created.room.id));

    // Cascade took the ledger and messages with it.
    for table in ["rooms", "room_participants", "symmetric_keys", "messages"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await?;
        assert_eq!(count, 0, "{table} should be empty");
    }
    Ok(())
}

#[sqlx::test]
async fn rotate_enforces_set_equality(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![bob.user_id],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1"), (bob.user_id, "B1")]),
            },
        )
        .await?;

    // Subset is not enough.
    let result = rooms
        .rotate(
            &alice,
            RotateRoomKey {
                room_id: created.room.id,
                new_encrypted_keys: key_entries(&[(alice.user_id, "A2")]),
                new_key_version: KeyVersion::new(2),
            },
        )
        .await;
    assert!(matches!(result, Err(RoomError::IncompleteWrapSet)));

    // A stranger in the wrap set is rejected too.
    let mallory = seed_user(&pool, "mallory").await?;
    let result = rooms
        .rotate(
            &alice,
            RotateRoomKey {
                room_id: created.room.id,
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A2"),
                    (bob.user_id, "B2"),
                    (mallory.user_id, "M2"),
                ]),
                new_key_version: KeyVersion::new(2),
            },
        )
        .await;
    assert!(matches!(result, Err(RoomError::IncompleteWrapSet)));

    assert_eq!(
        KeyLedgerEntry::versions(&pool, created.room.id).await?,
        vec![KeyVersion::FIRST]
    );
    Ok(())
}

#[sqlx::test]
async fn concurrent_rotations_have_one_winner(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![bob.user_id],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1"), (bob.user_id, "B1")]),
            },
        )
        .await?;
    let room_id = created.room.id;

    let request = |a_tag: &str, b_tag: &str| RotateRoomKey {
        room_id,
        new_encrypted_keys: key_entries(&[(alice.user_id, a_tag), (bob.user_id, b_tag)]),
        new_key_version: KeyVersion::new(2),
    };
    let (first, second) = tokio::join!(
        rooms.rotate(&alice, request("A2", "B2")),
        rooms.rotate(&bob, request("A2x", "B2x")),
    );

    let winners = [&first, &second]
        .iter()
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(winners, 1, "exactly one rotation must commit");
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(RoomError::VersionConflict { .. })));

    // The loser retries against the new current version and succeeds.
    let retry = rooms
        .rotate(
            &bob,
            RotateRoomKey {
                room_id,
                new_encrypted_keys: key_entries(&[(alice.user_id, "A3"), (bob.user_id, "B3")]),
                new_key_version: KeyVersion::new(3),
            },
        )
        .await?;
    assert_eq!(retry.new_key_version, KeyVersion::new(3));
    Ok(())
}

#[sqlx::test]
async fn leave_reinvite_rotate_round_trip(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;
    let carol = seed_user(&pool, "carol").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![bob.user_id, carol.user_id],
                is_group: Some(true),
                encrypted_keys: key_entries(&[
                    (alice.user_id, "A1"),
                    (bob.user_id, "B1"),
                    (carol.user_id, "C1"),
                ]),
            },
        )
        .await?;
    let room_id = created.room.id;

    rooms.leave(&carol, room_id).await?;
    rooms
        .invite(
            &bob,
            InviteToRoom {
                room_id,
                invited_user_ids: vec![carol.user_id],
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A2"),
                    (bob.user_id, "B2"),
                    (carol.user_id, "C2"),
                ]),
                new_key_version: None,
            },
        )
        .await?;
    let rotated = rooms
        .rotate(
            &carol,
            RotateRoomKey {
                room_id,
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A3"),
                    (bob.user_id, "B3"),
                    (carol.user_id, "C3"),
                ]),
                new_key_version: KeyVersion::new(3),
            },
        )
        .await?;
    assert!(!rotated.room.rotation_pending);

    // Carol holds wraps only from her re-entry on; the purged pre-leave wrap
    // stays gone.
    let carol_keys = KeyLedgerEntry::wrapped_keys_for(&pool, room_id, carol.user_id).await?;
    assert_eq!(
        carol_keys.keys().copied().collect::<Vec<_>>(),
        vec![KeyVersion::new(2), KeyVersion::new(3)]
    );

    // Ledger invariant: versions are contiguous and each one covers exactly
    // the participant set at install time.
    assert_eq!(
        KeyLedgerEntry::versions(&pool, room_id).await?,
        vec![KeyVersion::FIRST, KeyVersion::new(2), KeyVersion::new(3)]
    );
    let v1_users: Vec<_> = KeyLedgerEntry::entries_at(&pool, room_id, KeyVersion::FIRST)
        .await?
        .into_iter()
        .map(|entry| entry.user_id)
        .collect();
    // Carol's v1 wrap was purged when she left.
    assert_eq!(v1_users, vec![alice.user_id, bob.user_id]);
    let v3_users: Vec<_> = KeyLedgerEntry::entries_at(&pool, room_id, KeyVersion::new(3))
        .await?
        .into_iter()
        .map(|entry| entry.user_id)
        .collect();
    assert_eq!(v3_users, vec![alice.user_id, bob.user_id, carol.user_id]);
    Ok(())
}

#[sqlx::test]
async fn message_rules(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;
    let mallory = seed_user(&pool, "mallory").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![bob.user_id],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1"), (bob.user_id, "B1")]),
            },
        )
        .await?;
    let room_id = created.room.id;

    // Only participants may send.
    let result = rooms
        .append_user_message(
            &mallory,
            SendMessage {
                room_id,
                encrypted_content: ciphertext("CT"),
                iv: iv(),
                key_version: KeyVersion::FIRST,
            },
        )
        .await;
    assert!(matches!(result, Err(RoomError::NotAParticipant)));

    // A version beyond the room's current one is rejected.
    let result = rooms
        .append_user_message(
            &alice,
            SendMessage {
                room_id,
                encrypted_content: ciphertext("CT"),
                iv: iv(),
                key_version: KeyVersion::new(2),
            },
        )
        .await;
    assert!(matches!(result, Err(RoomError::FutureKeyVersion { .. })));

    let appended = rooms
        .append_user_message(
            &alice,
            SendMessage {
                room_id,
                encrypted_content: ciphertext("CT"),
                iv: iv(),
                key_version: KeyVersion::FIRST,
            },
        )
        .await?;
    assert_eq!(appended.message.key_version, KeyVersion::FIRST);
    assert_eq!(appended.sender_username, "alice");
    assert!(!appended.message.delivered);
    assert_eq!(appended.participants, vec![alice.user_id, bob.user_id]);

    // The delivered flag is set once, after fan-out reached a recipient.
    rooms.mark_delivered(appended.message.id).await?;
    let delivered: bool = sqlx::query_scalar("SELECT delivered FROM messages WHERE id = $1")
        .bind(appended.message.id)
        .fetch_one(&pool)
        .await?;
    assert!(delivered);
    Ok(())
}

#[sqlx::test]
async fn history_paginates_in_commit_order(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: None,
                participant_ids: vec![],
                is_group: None,
                encrypted_keys: key_entries(&[(alice.user_id, "A1")]),
            },
        )
        .await?;
    let room_id = created.room.id;

    let mut ids = Vec::new();
    for tag in ["m1", "m2", "m3", "m4", "m5"] {
        let appended = rooms
            .append_user_message(
                &alice,
                SendMessage {
                    room_id,
                    encrypted_content: ciphertext(tag),
                    iv: iv(),
                    key_version: KeyVersion::FIRST,
                },
            )
            .await?;
        ids.push(appended.message.id);
    }

    // Newest page first, chronological inside the page.
    let page = rooms
        .message_history(
            &alice,
            GetMessages {
                room_id,
                limit: Some(2),
                offset: Some(0),
            },
        )
        .await?;
    assert_eq!(page.count, 2);
    assert!(page.has_more);
    assert_eq!(
        page.messages.iter().map(|m| m.message_id).collect::<Vec<_>>(),
        vec![ids[3], ids[4]]
    );
    assert_eq!(page.encrypted_symmetric_keys[&KeyVersion::FIRST], wrap("A1"));

    let next_page = rooms
        .message_history(
            &alice,
            GetMessages {
                room_id,
                limit: Some(2),
                offset: Some(2),
            },
        )
        .await?;
    assert_eq!(
        next_page
            .messages
            .iter()
            .map(|m| m.message_id)
            .collect::<Vec<_>>(),
        vec![ids[1], ids[2]]
    );

    // limit = 0 is an empty page, not an error.
    let empty = rooms
        .message_history(
            &alice,
            GetMessages {
                room_id,
                limit: Some(0),
                offset: Some(0),
            },
        )
        .await?;
    assert!(empty.messages.is_empty());
    assert!(!empty.has_more);

    // The page size is capped.
    let capped = rooms
        .message_history(
            &alice,
            GetMessages {
                room_id,
                limit: Some(10_000),
                offset: Some(0),
            },
        )
        .await?;
    assert_eq!(capped.count, 5);
    Ok(())
}

#[sqlx::test]
async fn connect_snapshot_replays_all_wrapped_keys(pool: PgPool) -> anyhow::Result<()> {
    let rooms = service(&pool);
    let alice = seed_user(&pool, "alice").await?;
    let bob = seed_user(&pool, "bob").await?;
    let carol = seed_user(&pool, "carol").await?;

    let created = rooms
        .create_room(
            &alice,
            CreateRoom {
                name: Some("r".to_owned()),
                participant_ids: vec![bob.user_id, carol.user_id],
                is_group: Some(true),
                encrypted_keys: key_entries(&[
                    (alice.user_id, "A1"),
                    (bob.user_id, "B1"),
                    (carol.user_id, "C1"),
                ]),
            },
        )
        .await?;
    let room_id = created.room.id;

    rooms
        .rotate(
            &alice,
            RotateRoomKey {
                room_id,
                new_encrypted_keys: key_entries(&[
                    (alice.user_id, "A2"),
                    (bob.user_id, "B2"),
                    (carol.user_id, "C2"),
                ]),
                new_key_version: KeyVersion::new(2),
            },
        )
        .await?;
    rooms.leave(&carol, room_id).await?;

    let snapshot = rooms.connect_snapshot(alice.user_id).await?;
    assert_eq!(snapshot.user.id, alice.user_id);
    assert_eq!(snapshot.rooms.len(), 1);
    let room_snapshot = &snapshot.rooms[0];
    assert_eq!(room_snapshot.room.current_key_version, KeyVersion::new(2));
    assert_eq!(room_snapshot.participants.len(), 2);
    assert_eq!(
        room_snapshot
            .encrypted_symmetric_keys
            .keys()
            .copied()
            .collect::<Vec<_>>(),
        vec![KeyVersion::FIRST, KeyVersion::new(2)]
    );
    // Carol's departure left the rotation pending; the next connecting
    // participant is told.
    assert_eq!(snapshot.pending_rotations, vec![room_id]);
    Ok(())
}
