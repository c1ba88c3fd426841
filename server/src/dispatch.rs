// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Dispatch for all websocket connections. It keeps the outbound channel of
//! every connected session plus a room → sessions subscription index, and
//! can fan an event out to a room, a set of sessions or a single session.
//!
//! Sends go through unbounded channels and never block; the session actor
//! drains its channel onto the socket. Both index locks are released before
//! anything is sent, so a slow session cannot stall fan-out to others.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc;
use tracing::info;

use cachet_common::{
    events::server::ServerEvent,
    identifiers::{RoomId, SessionId},
};

#[derive(Clone, Default, Debug)]
pub struct EventDispatcher {
    senders: Arc<Mutex<HashMap<SessionId, mpsc::UnboundedSender<ServerEvent>>>>,
    rooms: Arc<Mutex<HashMap<RoomId, HashSet<SessionId>>>>,
}

impl EventDispatcher {
    /// Register a session's outbound channel.
    pub fn connect(&self, session_id: SessionId, tx: mpsc::UnboundedSender<ServerEvent>) {
        let mut senders = self.senders.lock().expect("dispatch lock poisoned");
        senders.insert(session_id, tx);
    }

    /// Drop a session and all its subscriptions.
    pub fn disconnect(&self, session_id: SessionId) {
        self.senders
            .lock()
            .expect("dispatch lock poisoned")
            .remove(&session_id);
        let mut rooms = self.rooms.lock().expect("dispatch lock poisoned");
        for subscribers in rooms.values_mut() {
            subscribers.remove(&session_id);
        }
        rooms.retain(|_, subscribers| !subscribers.is_empty());
    }

    pub fn subscribe(&self, session_id: SessionId, room_id: RoomId) {
        let mut rooms = self.rooms.lock().expect("dispatch lock poisoned");
        rooms.entry(room_id).or_default().insert(session_id);
    }

    pub fn unsubscribe(&self, session_id: SessionId, room_id: RoomId) {
        let mut rooms = self.rooms.lock().expect("dispatch lock poisoned");
        if let Some(subscribers) = rooms.get_mut(&room_id) {
            subscribers.remove(&session_id);
            if subscribers.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    /// Forget a room's subscription index entirely (the room was deleted).
    pub fn drop_room(&self, room_id: RoomId) {
        self.rooms
            .lock()
            .expect("dispatch lock poisoned")
            .remove(&room_id);
    }

    /// Deliver an event to every session subscribed to the room. At most
    /// once per session; best effort. Returns the sessions that accepted
    /// the event.
    pub fn broadcast(
        &self,
        room_id: RoomId,
        event: &ServerEvent,
        exclude: Option<SessionId>,
    ) -> Vec<SessionId> {
        let subscribers: Vec<SessionId> = {
            let rooms = self.rooms.lock().expect("dispatch lock poisoned");
            rooms
                .get(&room_id)
                .map(|subscribers| {
                    subscribers
                        .iter()
                        .copied()
                        .filter(|id| Some(*id) != exclude)
                        .collect()
                })
                .unwrap_or_default()
        };
        self.to_sessions(&subscribers, event)
    }

    /// Deliver an event to each listed session, returning those that were
    /// live.
    pub fn to_sessions(&self, session_ids: &[SessionId], event: &ServerEvent) -> Vec<SessionId> {
        let channels: Vec<(SessionId, mpsc::UnboundedSender<ServerEvent>)> = {
            let senders = self.senders.lock().expect("dispatch lock poisoned");
            session_ids
                .iter()
                .filter_map(|id| senders.get(id).map(|tx| (*id, tx.clone())))
                .collect()
        };

        let mut delivered = Vec::with_capacity(channels.len());
        let mut dead = Vec::new();
        for (session_id, tx) in channels {
            if tx.send(event.clone()).is_ok() {
                delivered.push(session_id);
            } else {
                dead.push(session_id);
            }
        }
        for session_id in dead {
            info!(%session_id, "dropping session with closed channel");
            self.disconnect(session_id);
        }
        delivered
    }

    /// Acknowledgement/error path to one session.
    pub fn to_session(&self, session_id: SessionId, event: ServerEvent) -> bool {
        !self.to_sessions(&[session_id], &event).is_empty()
    }
}
