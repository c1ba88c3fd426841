// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-event handlers behind the gateway.
//!
//! Each handler drives one backend operation and performs the fan-out the
//! commit entitles subscribers to. `key_rotated` (and its siblings carrying
//! fresh wraps) are enqueued inside the same handler that commits, before
//! control returns, so every subscriber observes the rotation before any
//! message sent under the new version.

use cachet_backend::{
    auth_service::AuthenticatedUser,
    errors::ErrorKind,
    rooms::{LeaveOutcome, RoomError, RoomService},
};
use cachet_common::{
    events::{
        client::{ClientEvent, CreateRoom, GetMessages, InviteToRoom, RotateRoomKey, SendMessage},
        server::{
            ConnectedPayload, InvitedToRoomPayload, KeyRotatedPayload, RoomCreatedPayload,
            RoomDeletedPayload, RoomLeftPayload, RoomMember, RotationReason,
            RotationRequiredPayload, ServerEvent, UserLeftPayload, UsersInvitedPayload,
        },
    },
    identifiers::{RoomId, SessionId},
};

use crate::{dispatch::EventDispatcher, registry::SessionRegistry};

/// Send the `connected` snapshot, auto-subscribe the session to its rooms
/// and point it at any pending rotations.
pub(super) async fn announce_connected(
    room_service: RoomService,
    dispatch: EventDispatcher,
    session_id: SessionId,
    user: AuthenticatedUser,
) {
    match room_service.connect_snapshot(user.user_id).await {
        Ok(snapshot) => {
            for room in &snapshot.rooms {
                dispatch.subscribe(session_id, room.room.id);
            }
            let pending = snapshot.pending_rotations;
            dispatch.to_session(
                session_id,
                ServerEvent::Connected(ConnectedPayload {
                    message: "Successfully connected".to_owned(),
                    user: snapshot.user.payload(),
                    rooms: snapshot.rooms,
                }),
            );
            // This session is now a connected participant who can perform
            // the outstanding rotations.
            for room_id in pending {
                dispatch.to_session(
                    session_id,
                    ServerEvent::RotationRequired(RotationRequiredPayload {
                        room_id,
                        reason: RotationReason::PendingFromLeave,
                        left_user: None,
                    }),
                );
            }
        }
        Err(error) => {
            tracing::error!(user_id = %user.user_id, %error, "connect snapshot failed");
            dispatch.to_session(session_id, ServerEvent::error("Failed to load account state"));
        }
    }
}

pub(super) async fn handle_client_event(
    room_service: RoomService,
    registry: SessionRegistry,
    dispatch: EventDispatcher,
    session_id: SessionId,
    user: AuthenticatedUser,
    event: ClientEvent,
) {
    let result = match event {
        ClientEvent::CreateRoom(request) => {
            create_room(&room_service, &registry, &dispatch, &user, request).await
        }
        ClientEvent::InviteToRoom(request) => {
            invite(&room_service, &registry, &dispatch, &user, request).await
        }
        ClientEvent::LeaveRoom(request) => {
            leave(
                &room_service,
                &registry,
                &dispatch,
                session_id,
                &user,
                request.room_id,
            )
            .await
        }
        ClientEvent::RotateRoomKey(request) => {
            rotate(&room_service, &registry, &dispatch, &user, request).await
        }
        ClientEvent::SendMessage(request) => {
            send_message(&room_service, &registry, &dispatch, &user, request).await
        }
        ClientEvent::GetMessages(request) => {
            get_messages(&room_service, &dispatch, session_id, &user, request).await
        }
    };

    if let Err(error) = result {
        let message = match error.kind() {
            ErrorKind::StorageFailure => {
                tracing::error!(user_id = %user.user_id, %error, "operation failed");
                "Internal server error".to_owned()
            }
            ErrorKind::AuthorizationDenied => {
                tracing::warn!(user_id = %user.user_id, %error, "authorization denied");
                error.to_string()
            }
            _ => {
                tracing::debug!(user_id = %user.user_id, %error, "operation rejected");
                error.to_string()
            }
        };
        dispatch.to_session(session_id, ServerEvent::error(message));
    }
}

async fn create_room(
    room_service: &RoomService,
    registry: &SessionRegistry,
    dispatch: &EventDispatcher,
    user: &AuthenticatedUser,
    request: CreateRoom,
) -> Result<(), RoomError> {
    let created = room_service.create_room(user, request).await?;

    // Initial participants are subscribed right away; they were online
    // before the room existed.
    for participant in &created.participant_ids {
        for session in registry.sessions_of_user(*participant) {
            dispatch.subscribe(session, created.room.id);
        }
    }

    let member_count = created.members.len();
    dispatch.broadcast(
        created.room.id,
        &ServerEvent::RoomCreated(RoomCreatedPayload {
            room: created.room.payload(Some(created.members), member_count),
            created_by: created.created_by,
            encryption_setup: created.encryption_setup,
        }),
        None,
    );
    Ok(())
}

async fn invite(
    room_service: &RoomService,
    registry: &SessionRegistry,
    dispatch: &EventDispatcher,
    user: &AuthenticatedUser,
    request: InviteToRoom,
) -> Result<(), RoomError> {
    let outcome = room_service.invite(user, request).await?;

    for invited in &outcome.invited_users {
        for session in registry.sessions_of_user(invited.id) {
            dispatch.subscribe(session, outcome.room.id);
        }
    }

    let member_count = outcome.members.len();
    let room_payload = outcome
        .room
        .payload(Some(outcome.members.clone()), member_count);

    dispatch.broadcast(
        outcome.room.id,
        &ServerEvent::UsersInvited(UsersInvitedPayload {
            room_id: outcome.room.id,
            invited_users: outcome
                .invited_users
                .iter()
                .map(|invited| invited.payload())
                .collect(),
            invited_by: outcome.invited_by.clone(),
            new_key_version: outcome.new_key_version,
        }),
        None,
    );

    // Each invitee additionally gets their own wrap on all their sessions.
    for invited in &outcome.invited_users {
        let Some(encrypted_key) = outcome.wraps.get(&invited.id) else {
            continue;
        };
        dispatch.to_sessions(
            &registry.sessions_of_user(invited.id),
            &ServerEvent::InvitedToRoom(InvitedToRoomPayload {
                room: room_payload.clone(),
                invited_by: outcome.invited_by.clone(),
                encrypted_key: encrypted_key.clone(),
                new_key_version: outcome.new_key_version,
            }),
        );
    }
    Ok(())
}

async fn leave(
    room_service: &RoomService,
    registry: &SessionRegistry,
    dispatch: &EventDispatcher,
    session_id: SessionId,
    user: &AuthenticatedUser,
    room_id: RoomId,
) -> Result<(), RoomError> {
    match room_service.leave(user, room_id).await? {
        LeaveOutcome::Deleted { room_id } => {
            dispatch.drop_room(room_id);
            dispatch.to_session(session_id, ServerEvent::RoomDeleted(RoomDeletedPayload { room_id }));
        }
        LeaveOutcome::Left { room, remaining } => {
            // Every session of the leaver loses the subscription, not just
            // the one that sent the event.
            for session in registry.sessions_of_user(user.user_id) {
                dispatch.unsubscribe(session, room.id);
            }

            dispatch.broadcast(
                room.id,
                &ServerEvent::UserLeft(UserLeftPayload {
                    room_id: room.id,
                    user_id: user.user_id,
                    username: user.username.clone(),
                    rotation_required: true,
                }),
                None,
            );

            // Ask the first connected remaining participant to rotate. If
            // nobody is online the pending flag reaches the next one to
            // connect.
            let target = remaining
                .iter()
                .find_map(|user_id| registry.sessions_of_user(*user_id).into_iter().next());
            match target {
                Some(session) => {
                    dispatch.to_session(
                        session,
                        ServerEvent::RotationRequired(RotationRequiredPayload {
                            room_id: room.id,
                            reason: RotationReason::UserLeft,
                            left_user: Some(RoomMember {
                                id: user.user_id,
                                username: user.username.clone(),
                            }),
                        }),
                    );
                }
                None => {
                    tracing::info!(room_id = %room.id, "no participant online, rotation stays pending");
                }
            }

            dispatch.to_session(session_id, ServerEvent::RoomLeft(RoomLeftPayload { room_id: room.id }));
        }
    }
    Ok(())
}

async fn rotate(
    room_service: &RoomService,
    registry: &SessionRegistry,
    dispatch: &EventDispatcher,
    user: &AuthenticatedUser,
    request: RotateRoomKey,
) -> Result<(), RoomError> {
    let outcome = room_service.rotate(user, request).await?;

    // Targeted per participant: everyone gets the new version announcement
    // together with their own wrap.
    for (recipient, encrypted_key) in &outcome.wraps {
        dispatch.to_sessions(
            &registry.sessions_of_user(*recipient),
            &ServerEvent::KeyRotated(KeyRotatedPayload {
                room_id: outcome.room.id,
                new_key_version: outcome.new_key_version,
                reason: RotationReason::ManualRotation,
                rotated_by: outcome.rotated_by.clone(),
                encrypted_key: encrypted_key.clone(),
            }),
        );
    }
    Ok(())
}

async fn send_message(
    room_service: &RoomService,
    registry: &SessionRegistry,
    dispatch: &EventDispatcher,
    user: &AuthenticatedUser,
    request: SendMessage,
) -> Result<(), RoomError> {
    let appended = room_service.append_user_message(user, request).await?;
    let message_id = appended.message.id;
    let room_id = appended.message.room_id;

    let payload = appended
        .message
        .payload(Some(appended.sender_username.clone()));
    let reached = dispatch.broadcast(room_id, &ServerEvent::NewMessage(payload), None);

    // 1-to-1 delivery receipt: flag the message once any live session of the
    // other party saw the fan-out.
    if !appended.is_group {
        let reached_recipient = reached
            .iter()
            .filter_map(|session| registry.resolve_user(*session))
            .any(|recipient| recipient != user.user_id);
        if reached_recipient {
            room_service.mark_delivered(message_id).await?;
        }
    }
    Ok(())
}

async fn get_messages(
    room_service: &RoomService,
    dispatch: &EventDispatcher,
    session_id: SessionId,
    user: &AuthenticatedUser,
    request: GetMessages,
) -> Result<(), RoomError> {
    let history = room_service.message_history(user, request).await?;
    dispatch.to_session(session_id, ServerEvent::MessagesHistory(history));
    Ok(())
}
