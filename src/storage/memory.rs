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
use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use super::{
    sort_by_recent, NewSession, SessionId, SessionStore, SessionSummary, StorageError,
    StoredSession,
};
use crate::performance::HitEvent;

#[derive(Default)]
struct Sessions {
    next_id: u64,
    sessions: BTreeMap<SessionId, StoredSession>,
}

/// Keeps sessions for the life of the process.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<Sessions>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl SessionStore for MemoryStore {
    fn save_session(&self, session: NewSession) -> Result<SessionId, StorageError> {
        let mut sessions = self.sessions.lock();
        sessions.next_id += 1;
        let id = SessionId::new(sessions.next_id);
        sessions.sessions.insert(id, StoredSession::new(id, session));
        debug!(id = id.get(), "Session saved in memory");
        Ok(id)
    }

    fn load_hits(&self, id: SessionId) -> Result<Vec<HitEvent>, StorageError> {
        self.sessions
            .lock()
            .sessions
            .get(&id)
            .map(|stored| stored.hits.clone())
            .ok_or(StorageError::NotFound(id))
    }

    fn rename_session(&self, id: SessionId, name: &str) -> Result<(), StorageError> {
        let mut sessions = self.sessions.lock();
        let stored = sessions
            .sessions
            .get_mut(&id)
            .ok_or(StorageError::NotFound(id))?;
        stored.rename(name);
        Ok(())
    }

    fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        self.sessions
            .lock()
            .sessions
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(id))
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, StorageError> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .lock()
            .sessions
            .values()
            .map(|stored| stored.summary.clone())
            .collect();
        sort_by_recent(&mut summaries);
        Ok(summaries)
    }
}
