//! World registry: who is connected, under which key, and in which phase.
//!
//! The table itself never leaves this module. Every operation takes the lock
//! once, and anything that writes to a socket (broadcast) snapshots the
//! recipients first and sends after the lock is released.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::outbox::Outbox;

/// Process-unique session id, assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{:06}", self.0)
    }
}

/// A session is keyed by its endpoint until it picks a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Endpoint(SocketAddr),
    Name(String),
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Endpoint(a) => write!(f, "endpoint:{a}"),
            SessionKey::Name(n) => write!(f, "name:{n}"),
        }
    }
}

/// Registry-visible lifecycle phase. `Disconnected` sessions are never listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Login,
    Password,
    Playing,
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub id: SessionId,
    pub name: Option<String>,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// Another session already holds the name.
    NameTaken,
    /// The caller has no entry under the key it tried to move.
    NotRegistered,
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::NameTaken => f.write_str("name already taken"),
            ClaimError::NotRegistered => f.write_str("session not registered"),
        }
    }
}

impl std::error::Error for ClaimError {}

#[derive(Debug, Clone)]
struct Entry {
    id: SessionId,
    name: Option<String>,
    phase: Phase,
    outbox: Outbox,
}

impl Entry {
    fn presence(&self) -> Presence {
        Presence {
            id: self.id,
            name: self.name.clone(),
            phase: self.phase,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    sessions: Arc<Mutex<HashMap<SessionKey, Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Insert a session in `Login`. Overwrites whatever held `key`.
    pub async fn register(&self, key: SessionKey, id: SessionId, outbox: Outbox) {
        let mut m = self.sessions.lock().await;
        m.insert(
            key,
            Entry {
                id,
                name: None,
                phase: Phase::Login,
                outbox,
            },
        );
    }

    /// Move `id`'s entry from `old` to `new`. Returns false if `old` is not
    /// held by `id`.
    pub async fn rekey(&self, old: &SessionKey, new: SessionKey, id: SessionId) -> bool {
        let mut m = self.sessions.lock().await;
        move_owned(&mut m, old, new, id, |_| {})
    }

    /// Login: check that `name` is free and move `id` from `old` to it, as a
    /// single step. The entry advances to `Password`.
    pub async fn claim_name(
        &self,
        old: &SessionKey,
        name: &str,
        id: SessionId,
    ) -> Result<(), ClaimError> {
        let key = SessionKey::Name(name.to_string());

        let mut m = self.sessions.lock().await;
        if m.contains_key(&key) {
            return Err(ClaimError::NameTaken);
        }
        let moved = move_owned(&mut m, old, key, id, |e| {
            e.name = Some(name.to_string());
            e.phase = Phase::Password;
        });
        if moved {
            Ok(())
        } else {
            Err(ClaimError::NotRegistered)
        }
    }

    pub async fn set_phase(&self, key: &SessionKey, id: SessionId, phase: Phase) -> bool {
        let mut m = self.sessions.lock().await;
        match m.get_mut(key) {
            Some(e) if e.id == id => {
                e.phase = phase;
                true
            }
            _ => false,
        }
    }

    /// Remove `key` if `id` holds it. Absent or foreign keys are left alone.
    pub async fn remove(&self, key: &SessionKey, id: SessionId) -> bool {
        let mut m = self.sessions.lock().await;
        take_owned(&mut m, key, id).is_some()
    }

    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Presence> {
        self.sessions.lock().await.get(key).map(Entry::presence)
    }

    /// All `Playing` sessions, in no particular order.
    pub async fn list_playing(&self) -> Vec<Presence> {
        let m = self.sessions.lock().await;
        m.values()
            .filter(|e| e.phase == Phase::Playing)
            .map(Entry::presence)
            .collect()
    }

    /// Queue `text` for every `Playing` session. Returns how many accepted it.
    pub async fn broadcast(&self, text: impl Into<Bytes>) -> usize {
        self.broadcast_where(text, |p| p.phase == Phase::Playing)
            .await
    }

    /// Queue `text` for every session matching `pred`. Never waits on a
    /// recipient; see `Outbox::offer`.
    pub async fn broadcast_where<F>(&self, text: impl Into<Bytes>, pred: F) -> usize
    where
        F: Fn(&Presence) -> bool + Send,
    {
        let text = text.into();
        let targets = {
            let m = self.sessions.lock().await;
            m.values()
                .filter(|e| pred(&e.presence()))
                .map(|e| e.outbox.clone())
                .collect::<Vec<_>>()
        };

        targets
            .iter()
            .filter(|ob| ob.offer(text.clone()))
            .count()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

fn take_owned(
    m: &mut HashMap<SessionKey, Entry>,
    key: &SessionKey,
    id: SessionId,
) -> Option<Entry> {
    match m.get(key) {
        Some(e) if e.id == id => m.remove(key),
        _ => None,
    }
}

/// Rekey step shared by `rekey` and `claim_name`; the caller holds the lock.
fn move_owned(
    m: &mut HashMap<SessionKey, Entry>,
    old: &SessionKey,
    new: SessionKey,
    id: SessionId,
    update: impl FnOnce(&mut Entry),
) -> bool {
    let Some(mut e) = take_owned(m, old, id) else {
        return false;
    };
    update(&mut e);
    m.insert(new, e);
    true
}
