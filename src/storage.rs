// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Persistence for recorded sessions.

use std::fmt;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::performance::HitEvent;

pub mod json;
pub mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session {0} does not exist")]
    NotFound(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unable to (de)serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Identifies a stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> SessionId {
        SessionId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        SessionId(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recording about to be saved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub name: String,
    pub duration_ms: i64,
    pub bpm: u32,
    pub sound_pack: Option<String>,
    pub looped: bool,
    pub hits: Vec<HitEvent>,
}

/// Everything about a stored session except its hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub bpm: u32,
    pub sound_pack: Option<String>,
    pub looped: bool,
    pub hit_count: usize,
}

impl SessionSummary {
    fn new(id: SessionId, session: &NewSession, now: DateTime<Utc>) -> SessionSummary {
        SessionSummary {
            id,
            name: session.name.clone(),
            duration_ms: session.duration_ms,
            created_at: now,
            modified_at: now,
            bpm: session.bpm,
            sound_pack: session.sound_pack.clone(),
            looped: session.looped,
            hit_count: session.hits.len(),
        }
    }
}

/// A session as it is kept by a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    summary: SessionSummary,
    hits: Vec<HitEvent>,
}

impl StoredSession {
    fn new(id: SessionId, session: NewSession) -> StoredSession {
        StoredSession {
            summary: SessionSummary::new(id, &session, Utc::now()),
            hits: session.hits,
        }
    }

    /// Renames the session and marks it as modified now.
    fn rename(&mut self, name: &str) {
        self.summary.name = name.to_string();
        self.summary.modified_at = Utc::now();
    }
}

/// Saves, loads, and deletes recorded sessions.
pub trait SessionStore: Send + Sync {
    /// Stores the session under a new id.
    fn save_session(&self, session: NewSession) -> Result<SessionId, StorageError>;

    /// Loads the hits of a session in their recorded order.
    fn load_hits(&self, id: SessionId) -> Result<Vec<HitEvent>, StorageError>;

    /// Renames a session. Counts as a modification for ordering.
    fn rename_session(&self, id: SessionId, name: &str) -> Result<(), StorageError>;

    fn delete_session(&self, id: SessionId) -> Result<(), StorageError>;

    /// Lists sessions, most recently modified first.
    fn list_sessions(&self) -> Result<Vec<SessionSummary>, StorageError>;
}

/// Most recently modified first. Newer ids win ties.
fn sort_by_recent(sessions: &mut [SessionSummary]) {
    sessions.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[cfg(test)]
pub(crate) mod test {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::pad::PadId;

    pub fn new_session(name: &str, hits: usize) -> NewSession {
        NewSession {
            name: name.to_string(),
            duration_ms: 1000,
            bpm: 120,
            sound_pack: Some("default".to_string()),
            looped: false,
            hits: (0..hits)
                .map(|i| HitEvent::new(PadId::new(i as u16 % 32), i as i64 * 10, 1.0))
                .collect(),
        }
    }

    /// Behavior every store has to share.
    pub fn exercise_store(store: &dyn SessionStore) -> Result<(), StorageError> {
        assert!(store.list_sessions()?.is_empty());

        let first = store.save_session(new_session("first", 3))?;
        let second = store.save_session(new_session("second", 5))?;
        assert_ne!(first, second);

        let hits = store.load_hits(first)?;
        assert_eq!(new_session("first", 3).hits, hits);

        let sessions = store.list_sessions()?;
        let names: Vec<&str> = sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(vec!["second", "first"], names);
        assert_eq!(5, sessions[0].hit_count);
        assert_eq!(Some("default".to_string()), sessions[0].sound_pack);
        assert_eq!(sessions[0].created_at, sessions[0].modified_at);

        store.delete_session(first)?;
        assert!(matches!(
            store.load_hits(first),
            Err(StorageError::NotFound(id)) if id == first
        ));
        assert!(matches!(
            store.delete_session(first),
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(1, store.list_sessions()?.len());

        // Renaming moves a session to the front.
        let third = store.save_session(new_session("third", 1))?;
        thread::sleep(Duration::from_millis(5));
        store.rename_session(second, "second, renamed")?;
        let sessions = store.list_sessions()?;
        assert_eq!(second, sessions[0].id);
        assert_eq!("second, renamed", sessions[0].name);
        assert!(sessions[0].modified_at > sessions[0].created_at);
        assert_eq!(third, sessions[1].id);
        assert!(matches!(
            store.rename_session(first, "gone"),
            Err(StorageError::NotFound(_))
        ));

        // Ids are not reused, not even the newest one after it is deleted.
        store.delete_session(third)?;
        let fourth = store.save_session(new_session("fourth", 1))?;
        for id in [first, second, third] {
            assert_ne!(id, fourth);
        }
        assert!(matches!(
            store.load_hits(third),
            Err(StorageError::NotFound(_))
        ));
        Ok(())
    }
}
