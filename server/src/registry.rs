// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bidirectional mapping between live transport sessions and authenticated
//! users. A user may hold any number of concurrent sessions; a session is
//! bound to exactly one user. Process-local, never replicated.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use cachet_common::identifiers::{SessionId, UserId};

#[derive(Clone, Default, Debug)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default, Debug)]
struct RegistryInner {
    users_by_session: HashMap<SessionId, UserId>,
    sessions_by_user: HashMap<UserId, HashSet<SessionId>>,
    usernames: HashMap<UserId, String>,
}

impl SessionRegistry {
    /// Bind a session to a user. Idempotent; a prior binding for the same
    /// session id is replaced.
    pub fn attach(&self, session_id: SessionId, user_id: UserId, username: String) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if let Some(previous) = inner.users_by_session.insert(session_id, user_id) {
            remove_session(&mut inner, previous, session_id);
        }
        inner
            .sessions_by_user
            .entry(user_id)
            .or_default()
            .insert(session_id);
        inner.usernames.insert(user_id, username);
    }

    /// Unbind a session; a no-op if it is not known.
    pub fn detach(&self, session_id: SessionId) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if let Some(user_id) = inner.users_by_session.remove(&session_id) {
            remove_session(&mut inner, user_id, session_id);
        }
    }

    pub fn resolve_user(&self, session_id: SessionId) -> Option<UserId> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.users_by_session.get(&session_id).copied()
    }

    pub fn is_authenticated(&self, session_id: SessionId) -> bool {
        self.resolve_user(session_id).is_some()
    }

    /// All live sessions of a user, for targeted fan-out.
    pub fn sessions_of_user(&self, user_id: UserId) -> Vec<SessionId> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner
            .sessions_by_user
            .get(&user_id)
            .map(|sessions| sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn username_of(&self, user_id: UserId) -> Option<String> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.usernames.get(&user_id).cloned()
    }
}

fn remove_session(inner: &mut RegistryInner, user_id: UserId, session_id: SessionId) {
    let last_session_gone = match inner.sessions_by_user.get_mut(&user_id) {
        Some(sessions) => {
            sessions.remove(&session_id);
            sessions.is_empty()
        }
        None => true,
    };
    if last_session_gone {
        inner.sessions_by_user.remove(&user_id);
        inner.usernames.remove(&user_id);
    }
}
