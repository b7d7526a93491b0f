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
use tokio::sync::{broadcast, watch};

use super::state::PerformanceState;
use crate::pad::PadId;
use crate::samples::VoiceId;

/// Lagging subscribers lose the oldest events past this many.
const EVENT_CAPACITY: usize = 256;

/// Where a voice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSource {
    Live,
    Replay,
}

/// Lifecycle notifications for anything observing a performance.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RecordingStarted,
    RecordingStopped { hits: usize, duration_ms: i64 },
    PlaybackStarted { events: usize },
    /// `completed` is false when the replay was stopped or superseded.
    PlaybackStopped { completed: bool },
    VoiceFired {
        pad: PadId,
        voice: VoiceId,
        source: HitSource,
    },
}

/// The broadcast side of the session: lifecycle events plus the latest state.
pub struct Observers {
    events: broadcast::Sender<SessionEvent>,
    state: watch::Sender<PerformanceState>,
}

impl Observers {
    pub fn new(initial: PerformanceState) -> Observers {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(initial);
        Observers { events, state }
    }

    /// Sends the event to every subscriber. Having none is fine.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Changes the state, notifying watchers only if something actually changed.
    pub fn update_state<F>(&self, modify: F)
    where
        F: FnOnce(&mut PerformanceState),
    {
        self.state.send_if_modified(|state| {
            let before = state.clone();
            modify(state);
            *state != before
        });
    }

    pub fn state(&self) -> PerformanceState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<PerformanceState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let observers = Observers::new(PerformanceState::default());
        observers.publish(SessionEvent::RecordingStarted);

        let mut rx = observers.subscribe();
        observers.publish(SessionEvent::PlaybackStarted { events: 3 });
        assert_eq!(Ok(SessionEvent::PlaybackStarted { events: 3 }), rx.try_recv());
    }

    #[test]
    fn test_state_updates() {
        let observers = Observers::new(PerformanceState::default());
        let mut watcher = observers.watch();

        observers.update_state(|state| state.bpm = 120);
        assert!(!watcher.has_changed().unwrap_or(true));

        observers.update_state(|state| state.bpm = 140);
        assert!(watcher.has_changed().unwrap_or(false));
        assert_eq!(140, watcher.borrow_and_update().bpm);
        assert_eq!(140, observers.state().bpm);
    }
}
