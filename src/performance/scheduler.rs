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

//! Replays a recorded hit sequence with its original relative timing.
//!
//! Each replay is one task. Every event's due time is measured from the fixed
//! start instant of the run, so lateness on one event never pushes back the
//! events after it. Events that are already due fire immediately.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, span, warn, Instrument, Level};

use super::events::{HitSource, Observers, SessionEvent};
use super::hit::HitEvent;
use crate::clock::Clock;
use crate::playsync::CancelHandle;
use crate::samples::{TriggerError, VoicePlaybackEngine};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlaybackError {
    #[error("there are no events to play back")]
    EmptySequence,

    #[error("event {index} can't be played back: {reason}")]
    InvalidEvent { index: usize, reason: String },
}

/// The replay that is currently running.
struct Run {
    generation: u64,
    start: Instant,
    cancel: CancelHandle,
    /// Cancelled by the task itself once it has exited.
    done: CancelHandle,
}

#[derive(Default)]
struct RunSlot {
    next_generation: u64,
    current: Option<Run>,
}

/// Schedules replays on the tokio runtime.
pub struct PlaybackScheduler {
    engine: Arc<VoicePlaybackEngine>,
    clock: Arc<dyn Clock>,
    observers: Arc<Observers>,
    runtime: Handle,
    /// Never held across an await.
    run: Arc<Mutex<RunSlot>>,
}

impl PlaybackScheduler {
    pub fn new(
        engine: Arc<VoicePlaybackEngine>,
        clock: Arc<dyn Clock>,
        observers: Arc<Observers>,
        runtime: Handle,
    ) -> PlaybackScheduler {
        PlaybackScheduler {
            engine,
            clock,
            observers,
            runtime,
            run: Arc::new(Mutex::new(RunSlot::default())),
        }
    }

    /// Checks every event before anything is touched.
    fn validate(&self, events: &[HitEvent]) -> Result<(), PlaybackError> {
        if events.is_empty() {
            return Err(PlaybackError::EmptySequence);
        }

        let grid = self.engine.grid();
        for (index, event) in events.iter().enumerate() {
            if event.timestamp_ms < 0 {
                return Err(PlaybackError::InvalidEvent {
                    index,
                    reason: format!("negative timestamp {}ms", event.timestamp_ms),
                });
            }
            if let Err(e) = grid.index(event.pad) {
                return Err(PlaybackError::InvalidEvent {
                    index,
                    reason: e.to_string(),
                });
            }
            if !(0.0..=1.0).contains(&event.velocity) {
                return Err(PlaybackError::InvalidEvent {
                    index,
                    reason: format!("velocity {} is outside of [0, 1]", event.velocity),
                });
            }
        }

        Ok(())
    }

    /// Starts replaying the events. Any replay already running is stopped first.
    pub fn start_playback(&self, events: &[HitEvent]) -> Result<(), PlaybackError> {
        self.validate(events)?;

        let mut events = events.to_vec();
        // Stable, so hits that share a timestamp keep their capture order.
        events.sort_by_key(|event| event.timestamp_ms);

        let mut slot = self.run.lock();
        if let Some(previous) = slot.current.take() {
            previous.cancel.cancel();
            info!(generation = previous.generation, "Superseding running playback");
            self.observers
                .publish(SessionEvent::PlaybackStopped { completed: false });
        }

        let generation = slot.next_generation;
        slot.next_generation += 1;
        let run = Run {
            generation,
            start: self.clock.now(),
            cancel: CancelHandle::new(),
            done: CancelHandle::new(),
        };

        let span = span!(Level::INFO, "playback", generation, events = events.len());
        let task = PlaybackTask {
            engine: self.engine.clone(),
            clock: self.clock.clone(),
            observers: self.observers.clone(),
            run_slot: self.run.clone(),
            generation,
            start: run.start,
            cancel: run.cancel.clone(),
            done: run.done.clone(),
        };

        info!(generation, events = events.len(), "Playback started");
        self.observers.publish(SessionEvent::PlaybackStarted {
            events: events.len(),
        });
        self.observers.update_state(|state| state.playing = true);
        slot.current = Some(run);
        drop(slot);

        self.runtime.spawn(task.run(events).instrument(span));
        Ok(())
    }

    /// Stops the running replay, if there is one.
    pub fn stop(&self) {
        let mut slot = self.run.lock();
        let Some(run) = slot.current.take() else {
            return;
        };
        run.cancel.cancel();
        info!(generation = run.generation, "Playback stopped");
        // Reported under the slot lock so a concurrent start can't be overtaken.
        self.observers
            .publish(SessionEvent::PlaybackStopped { completed: false });
        self.observers.update_state(|state| state.playing = false);
    }

    pub fn is_playing(&self) -> bool {
        self.run.lock().current.is_some()
    }

    /// Time since the running replay started. Zero when idle.
    pub fn elapsed(&self) -> Duration {
        self.run
            .lock()
            .current
            .as_ref()
            .map(|run| self.clock.now().saturating_duration_since(run.start))
            .unwrap_or_default()
    }

    /// Waits for the running replay's task to exit, whether it completed or was stopped.
    pub async fn wait(&self) {
        let done = match self.run.lock().current.as_ref() {
            Some(run) => run.done.clone(),
            None => return,
        };
        done.cancelled().await;
    }
}

struct PlaybackTask {
    engine: Arc<VoicePlaybackEngine>,
    clock: Arc<dyn Clock>,
    observers: Arc<Observers>,
    run_slot: Arc<Mutex<RunSlot>>,
    generation: u64,
    start: Instant,
    cancel: CancelHandle,
    done: CancelHandle,
}

impl PlaybackTask {
    async fn run(self, events: Vec<HitEvent>) {
        let completed = self.play(&events).await;

        if completed {
            // Only the run that still owns the slot reports completion. A stop or a
            // newer start has already reported for this one otherwise.
            let mut slot = self.run_slot.lock();
            if slot
                .current
                .as_ref()
                .is_some_and(|run| run.generation == self.generation)
            {
                slot.current = None;
                info!("Playback finished");
                self.observers
                    .publish(SessionEvent::PlaybackStopped { completed: true });
                self.observers.update_state(|state| state.playing = false);
            }
        }
        self.done.cancel();
    }

    /// Plays every event. Returns false if cancelled part way.
    async fn play(&self, events: &[HitEvent]) -> bool {
        for event in events {
            let elapsed = self.clock.now().saturating_duration_since(self.start);
            let due = event.offset();
            if due > elapsed {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return false,
                    _ = tokio::time::sleep(due - elapsed) => {}
                }
            }
            if self.cancel.is_cancelled() {
                return false;
            }

            match self.engine.trigger(event.pad, event.velocity) {
                Ok(voice) => self.observers.publish(SessionEvent::VoiceFired {
                    pad: event.pad,
                    voice,
                    source: HitSource::Replay,
                }),
                Err(TriggerError::NoSampleLoaded(pad)) => {
                    debug!(pad = pad.get(), "Skipping hit for pad without a sample");
                }
                Err(e) => {
                    warn!(pad = event.pad.get(), err = %e, "Unable to play hit");
                }
            }
        }
        true
    }
}
