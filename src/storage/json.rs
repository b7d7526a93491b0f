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
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};

use super::{
    sort_by_recent, NewSession, SessionId, SessionStore, SessionSummary, StorageError,
    StoredSession,
};
use crate::performance::HitEvent;

const FILE_PREFIX: &str = "session-";
const FILE_EXTENSION: &str = "json";
/// Holds the last id handed out, so ids of deleted sessions are never reused.
const LAST_ID_FILE: &str = "last-id";

/// Stores each session as a JSON file in a directory.
pub struct JsonStore {
    directory: PathBuf,
    /// Serializes id allocation and rewrites between concurrent callers.
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Opens the store, creating the directory if needed.
    pub fn open(directory: &Path) -> Result<JsonStore, StorageError> {
        fs::create_dir_all(directory)?;
        info!(directory = %directory.display(), "Opened session store");
        Ok(JsonStore {
            directory: directory.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, id: SessionId) -> PathBuf {
        self.directory
            .join(format!("{}{}.{}", FILE_PREFIX, id, FILE_EXTENSION))
    }

    /// Parses the id out of a session file name.
    fn id_from_path(path: &Path) -> Option<SessionId> {
        if path.extension()? != FILE_EXTENSION {
            return None;
        }
        path.file_stem()?
            .to_str()?
            .strip_prefix(FILE_PREFIX)?
            .parse::<u64>()
            .ok()
            .map(SessionId::new)
    }

    fn session_ids(&self) -> Result<Vec<SessionId>, StorageError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            if let Some(id) = JsonStore::id_from_path(&entry?.path()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn read(&self, id: SessionId) -> Result<StoredSession, StorageError> {
        let contents = match fs::read_to_string(self.path(id)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes under a temporary name first so a partially written file is never read.
    fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn write(&self, stored: &StoredSession) -> Result<(), StorageError> {
        let contents = serde_json::to_string_pretty(stored)?;
        JsonStore::write_atomic(&self.path(stored.summary.id), &contents)
    }

    /// The last id handed out. Falls back to the newest session on disk when the
    /// marker is missing, such as for a directory written by hand.
    fn last_id(&self) -> Result<u64, StorageError> {
        let on_disk = self
            .session_ids()?
            .into_iter()
            .map(|id| id.get())
            .max()
            .unwrap_or(0);
        let recorded = match fs::read_to_string(self.directory.join(LAST_ID_FILE)) {
            Ok(contents) => contents.trim().parse::<u64>().unwrap_or_else(|e| {
                warn!(err = %e, "Ignoring unreadable last session id");
                0
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(recorded.max(on_disk))
    }
}

impl SessionStore for JsonStore {
    fn save_session(&self, session: NewSession) -> Result<SessionId, StorageError> {
        let _guard = self.write_lock.lock();
        let id = SessionId::new(self.last_id()? + 1);
        JsonStore::write_atomic(&self.directory.join(LAST_ID_FILE), &id.to_string())?;

        let stored = StoredSession::new(id, session);
        self.write(&stored)?;

        info!(
            id = id.get(),
            name = stored.summary.name,
            hits = stored.hits.len(),
            "Session saved"
        );
        Ok(id)
    }

    fn load_hits(&self, id: SessionId) -> Result<Vec<HitEvent>, StorageError> {
        Ok(self.read(id)?.hits)
    }

    fn rename_session(&self, id: SessionId, name: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let mut stored = self.read(id)?;
        stored.rename(name);
        self.write(&stored)?;
        info!(id = id.get(), name, "Session renamed");
        Ok(())
    }

    fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.path(id)) {
            Ok(()) => {
                info!(id = id.get(), "Session deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>, StorageError> {
        let mut summaries = Vec::new();
        for id in self.session_ids()? {
            match self.read(id) {
                Ok(stored) => summaries.push(stored.summary),
                Err(e) => warn!(id = id.get(), err = %e, "Skipping unreadable session"),
            }
        }
        sort_by_recent(&mut summaries);
        Ok(summaries)
    }
}
