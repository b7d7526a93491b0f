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
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::hit::HitEvent;
use crate::clock::Clock;
use crate::pad::{PadError, PadGrid, PadId};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error(transparent)]
    InvalidPad(#[from] PadError),
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub hits: Vec<HitEvent>,
    pub duration: Duration,
}

impl Recording {
    pub fn duration_ms(&self) -> i64 {
        self.duration.as_millis() as i64
    }
}

struct RecordingSession {
    start: Instant,
    hits: Vec<HitEvent>,
}

/// Captures pad hits with their offset from the start of the recording.
pub struct EventRecorder {
    clock: Arc<dyn Clock>,
    grid: PadGrid,
    /// None while idle. Start, capture and stop all go through this one lock, so
    /// timestamps come out in capture order.
    session: Mutex<Option<RecordingSession>>,
}

impl EventRecorder {
    pub fn new(clock: Arc<dyn Clock>, grid: PadGrid) -> EventRecorder {
        EventRecorder {
            clock,
            grid,
            session: Mutex::new(None),
        }
    }

    /// Starts a new recording.
    pub fn start(&self) -> Result<(), RecordError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(RecordError::AlreadyRecording);
        }
        *session = Some(RecordingSession {
            start: self.clock.now(),
            hits: Vec::new(),
        });
        info!("Recording started");
        Ok(())
    }

    /// Records a hit if a recording is in progress.
    pub fn capture(&self, pad: PadId, velocity: f32) -> Result<Option<HitEvent>, RecordError> {
        self.grid.index(pad)?;
        let mut session = self.session.lock();
        let Some(session) = session.as_mut() else {
            return Ok(None);
        };

        let elapsed = self.clock.now().saturating_duration_since(session.start);
        let velocity = if velocity.is_nan() {
            0.0
        } else {
            velocity.clamp(0.0, 1.0)
        };
        let hit = HitEvent::new(pad, elapsed.as_millis() as i64, velocity);
        session.hits.push(hit);
        debug!(pad = pad.get(), timestamp_ms = hit.timestamp_ms, velocity, "Hit captured");
        Ok(Some(hit))
    }

    /// Ends the recording and returns it, or None if nothing was being recorded.
    pub fn finish(&self) -> Option<Recording> {
        let session = self.session.lock().take()?;
        let recording = Recording {
            duration: self.clock.now().saturating_duration_since(session.start),
            hits: session.hits,
        };
        info!(
            hits = recording.hits.len(),
            duration_ms = recording.duration_ms(),
            "Recording stopped"
        );
        Some(recording)
    }

    /// Ends the recording and returns its hits in capture order.
    pub fn stop(&self) -> Vec<HitEvent> {
        self.finish().map(|r| r.hits).unwrap_or_default()
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().is_some()
    }

    /// How long the current recording has been going. Zero when idle.
    pub fn elapsed(&self) -> Duration {
        self.session
            .lock()
            .as_ref()
            .map(|session| self.clock.now().saturating_duration_since(session.start))
            .unwrap_or_default()
    }
}
