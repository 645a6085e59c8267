use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};

use crate::{domain::UserId, security::AllowList};

/// Where a user's conversation currently stands.
///
/// Only one state exists today. Multi-step flows (e.g. confirm before capture)
/// add a variant here and a branch in the command router.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Waiting,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub status: SessionStatus,
}

/// Per-user sessions behind one store-wide lock.
///
/// The lock is deliberately coarse: the dispatcher holds it for the whole
/// lookup → reply → cleanup span of an update, so updates from different users
/// never interleave, even when the transport delivers them concurrently.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl SessionStore {
    /// One `Waiting` session per allow-listed identity. No others are ever added.
    pub fn from_allow_list(allowed: &AllowList) -> Self {
        let sessions = allowed
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    Session {
                        user_id: id.clone(),
                        status: SessionStatus::Waiting,
                    },
                )
            })
            .collect();

        Self {
            sessions: Mutex::new(sessions),
        }
    }

    /// Enter the critical section. Released when the guard is dropped, on every path.
    pub async fn acquire(&self) -> SessionGuard<'_> {
        SessionGuard {
            inner: self.sessions.lock().await,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn snapshot(&self, id: &UserId) -> Option<Session> {
        self.sessions.lock().await.get(id).cloned()
    }
}

/// Exclusive access to the whole store for the span of one update.
pub struct SessionGuard<'a> {
    inner: MutexGuard<'a, HashMap<UserId, Session>>,
}

impl SessionGuard<'_> {
    pub fn get(&self, id: &UserId) -> Option<&Session> {
        self.inner.get(id)
    }

    pub fn get_mut(&mut self, id: &UserId) -> Option<&mut Session> {
        self.inner.get_mut(id)
    }
}
