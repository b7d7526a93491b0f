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

use chrono::{DateTime, Local};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::events::{HitSource, Observers, SessionEvent};
use super::hit::HitEvent;
use super::recorder::{EventRecorder, RecordError, Recording};
use super::scheduler::{PlaybackError, PlaybackScheduler};
use super::state::{clamp_bpm, PerformanceState};
use crate::clock::Clock;
use crate::pad::{PadError, PadId};
use crate::samples::{TriggerError, VoiceId, VoicePlaybackEngine};
use crate::storage::{NewSession, SessionId, SessionStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// The name a recording gets when the performer doesn't pick one.
pub fn default_recording_name(now: DateTime<Local>) -> String {
    now.format("Recording_%Y-%m-%d_%H-%M-%S").to_string()
}

/// Coordinates live playing, recording, and replay for one performer.
pub struct PerformanceSession {
    engine: Arc<VoicePlaybackEngine>,
    recorder: EventRecorder,
    scheduler: PlaybackScheduler,
    observers: Arc<Observers>,
}

impl PerformanceSession {
    /// Creates a session. Replays are spawned onto the given runtime.
    pub fn new(
        engine: Arc<VoicePlaybackEngine>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> PerformanceSession {
        let observers = Arc::new(Observers::new(PerformanceState {
            master_volume: engine.master_gain(),
            ..PerformanceState::default()
        }));
        PerformanceSession {
            recorder: EventRecorder::new(clock.clone(), engine.grid()),
            scheduler: PlaybackScheduler::new(engine.clone(), clock, observers.clone(), runtime),
            engine,
            observers,
        }
    }

    pub fn engine(&self) -> &Arc<VoicePlaybackEngine> {
        &self.engine
    }

    /// Plays the pad and records the hit if a recording is running. The hit is
    /// recorded even if the pad has nothing loaded.
    pub fn press_pad(&self, pad: PadId, velocity: f32) -> Result<Option<VoiceId>, PadError> {
        self.engine.grid().index(pad)?;

        let voice = match self.engine.trigger(pad, velocity) {
            Ok(voice) => {
                self.observers.publish(SessionEvent::VoiceFired {
                    pad,
                    voice,
                    source: HitSource::Live,
                });
                Some(voice)
            }
            Err(TriggerError::InvalidPad(e)) => return Err(e),
            Err(TriggerError::NoSampleLoaded(_)) => None,
            Err(e) => {
                warn!(pad = pad.get(), err = %e, "Unable to play pad");
                None
            }
        };

        match self.recorder.capture(pad, velocity) {
            Ok(_) => {}
            Err(RecordError::InvalidPad(e)) => return Err(e),
            Err(e) => warn!(pad = pad.get(), err = %e, "Unable to record hit"),
        }

        Ok(voice)
    }

    /// Samples are one-shots and play to completion, so releasing a pad only
    /// checks it.
    pub fn release_pad(&self, pad: PadId) -> Result<(), PadError> {
        self.engine.grid().index(pad)?;
        Ok(())
    }

    pub fn begin_recording(&self) -> Result<(), RecordError> {
        self.recorder.start()?;
        self.observers.publish(SessionEvent::RecordingStarted);
        self.observers.update_state(|state| state.recording = true);
        Ok(())
    }

    /// Ends the recording, returning it with its duration. None if nothing was
    /// being recorded.
    pub fn finish_recording(&self) -> Option<Recording> {
        let recording = self.recorder.finish()?;
        self.observers.publish(SessionEvent::RecordingStopped {
            hits: recording.hits.len(),
            duration_ms: recording.duration_ms(),
        });
        self.observers.update_state(|state| state.recording = false);
        Some(recording)
    }

    /// Ends the recording and returns its hits. Empty if nothing was being recorded.
    pub fn end_recording(&self) -> Vec<HitEvent> {
        self.finish_recording()
            .map(|recording| recording.hits)
            .unwrap_or_default()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn recording_elapsed(&self) -> Duration {
        self.recorder.elapsed()
    }

    /// Replays the events, replacing any replay already running. Allowed while
    /// recording; replayed hits are not captured.
    pub fn replay(&self, events: &[HitEvent]) -> Result<(), PlaybackError> {
        self.scheduler.start_playback(events)
    }

    pub fn stop_replay(&self) {
        self.scheduler.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    pub fn replay_elapsed(&self) -> Duration {
        self.scheduler.elapsed()
    }

    /// Waits until the running replay finishes or is stopped.
    pub async fn wait_replay(&self) {
        self.scheduler.wait().await;
    }

    /// Sets the master volume and returns the value actually applied.
    pub fn set_master_volume(&self, volume: f32) -> f32 {
        self.engine.set_master_gain(volume);
        let volume = self.engine.master_gain();
        self.observers
            .update_state(|state| state.master_volume = volume);
        volume
    }

    pub fn set_pad_volume(&self, pad: PadId, volume: f32) -> Result<(), PadError> {
        self.engine.set_pad_gain(pad, volume)
    }

    /// Sets the tempo, clamped to the supported range, and returns it.
    pub fn set_bpm(&self, bpm: u32) -> u32 {
        let bpm = clamp_bpm(bpm);
        self.observers.update_state(|state| state.bpm = bpm);
        debug!(bpm, "Tempo set");
        bpm
    }

    /// Flips the metronome flag and returns the new value.
    pub fn toggle_metronome(&self) -> bool {
        let mut enabled = false;
        self.observers.update_state(|state| {
            state.metronome = !state.metronome;
            enabled = state.metronome;
        });
        enabled
    }

    /// Flips loop mode and returns the new value.
    pub fn toggle_loop_mode(&self) -> bool {
        let mut enabled = false;
        self.observers.update_state(|state| {
            state.looping = !state.looping;
            enabled = state.looping;
        });
        enabled
    }

    pub fn set_sound_pack(&self, sound_pack: Option<String>) {
        self.observers
            .update_state(|state| state.sound_pack = sound_pack);
    }

    pub fn state(&self) -> PerformanceState {
        self.observers.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<PerformanceState> {
        self.observers.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.observers.subscribe()
    }

    /// Saves a recording along with the current tempo, sound pack, and loop flag.
    /// Recordings without any hits are not saved.
    pub fn save_recording(
        &self,
        store: &dyn SessionStore,
        name: Option<String>,
        hits: &[HitEvent],
        duration_ms: i64,
    ) -> Result<Option<SessionId>, StorageError> {
        if hits.is_empty() {
            info!("Recording has no hits, not saving");
            return Ok(None);
        }

        let state = self.state();
        let session = NewSession {
            name: name.unwrap_or_else(|| default_recording_name(Local::now())),
            duration_ms,
            bpm: state.bpm,
            sound_pack: state.sound_pack,
            looped: state.looping,
            hits: hits.to_vec(),
        };
        Ok(Some(store.save_session(session)?))
    }

    /// Loads a stored session and replays it.
    pub fn replay_session(
        &self,
        store: &dyn SessionStore,
        id: SessionId,
    ) -> Result<(), SessionError> {
        let hits = store.load_hits(id)?;
        info!(id = id.get(), hits = hits.len(), "Replaying stored session");
        self.replay(&hits)?;
        Ok(())
    }

    /// Stops everything and releases all audio resources. Any recording in
    /// progress is discarded.
    pub fn shutdown(&self) {
        self.scheduler.stop();
        if let Some(recording) = self.recorder.finish() {
            info!(hits = recording.hits.len(), "Discarding unfinished recording");
        }
        self.engine.release_all();
        let master_volume = self.engine.master_gain();
        self.observers.update_state(|state| {
            state.recording = false;
            state.playing = false;
            state.master_volume = master_volume;
        });
        info!("Performance session shut down");
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;
    use crate::audio::mock;
    use crate::clock::SystemClock;
    use crate::pad::PadGrid;
    use crate::samples::SampleBank;
    use crate::storage::MemoryStore;
    use crate::testutil::pcm_sample;

    fn session() -> PerformanceSession {
        let device = Arc::new(mock::Device::get("mock-session", 44100, 2));
        let bank = Arc::new(SampleBank::new(PadGrid::default(), 44100));
        let engine = Arc::new(VoicePlaybackEngine::new(bank, device, 32));
        for pad in [1, 2] {
            engine
                .load_sample(PadId::new(pad), pcm_sample(44100, 44100))
                .expect("sample should load");
        }
        PerformanceSession::new(engine, Arc::new(SystemClock), Handle::current())
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_and_replay() -> Result<(), Box<dyn std::error::Error>> {
        let session = session();
        let mut events = session.subscribe();

        session.begin_recording()?;
        assert!(session.state().recording);
        session.press_pad(PadId::new(1), 1.0)?;
        session.press_pad(PadId::new(2), 0.5)?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.press_pad(PadId::new(1), 0.75)?;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let recording = session.finish_recording().expect("recording should be returned");
        assert_eq!(100, recording.duration_ms());
        assert_eq!(
            vec![
                HitEvent::new(PadId::new(1), 0, 1.0),
                HitEvent::new(PadId::new(2), 0, 0.5),
                HitEvent::new(PadId::new(1), 50, 0.75),
            ],
            recording.hits
        );
        assert!(!session.state().recording);

        session.replay(&recording.hits)?;
        assert!(session.state().playing);
        session.wait_replay().await;
        assert!(!session.is_playing());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(SessionEvent::RecordingStarted, seen[0]);
        assert!(seen.contains(&SessionEvent::RecordingStopped {
            hits: 3,
            duration_ms: 100
        }));
        assert!(seen.contains(&SessionEvent::PlaybackStarted { events: 3 }));
        assert_eq!(Some(&SessionEvent::PlaybackStopped { completed: true }), seen.last());
        let replayed = seen
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    SessionEvent::VoiceFired {
                        source: HitSource::Replay,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(3, replayed);
        Ok(())
    }

    #[tokio::test]
    async fn test_unloaded_pad_is_still_recorded() -> Result<(), Box<dyn std::error::Error>> {
        let session = session();
        session.begin_recording()?;
        assert_eq!(None, session.press_pad(PadId::new(9), 1.0)?);
        let hits = session.end_recording();
        assert_eq!(1, hits.len());
        assert_eq!(PadId::new(9), hits[0].pad);
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_range_pad() -> Result<(), Box<dyn std::error::Error>> {
        let session = session();
        session.begin_recording()?;
        assert!(session.press_pad(PadId::new(32), 1.0).is_err());
        assert!(session.release_pad(PadId::new(32)).is_err());
        assert!(session.set_pad_volume(PadId::new(32), 0.5).is_err());
        session.release_pad(PadId::new(1))?;
        assert!(session.end_recording().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_begin_twice() -> Result<(), Box<dyn std::error::Error>> {
        let session = session();
        session.begin_recording()?;
        session.press_pad(PadId::new(1), 1.0)?;
        assert!(matches!(
            session.begin_recording(),
            Err(RecordError::AlreadyRecording)
        ));
        assert_eq!(1, session.end_recording().len());
        assert!(session.end_recording().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_while_recording() -> Result<(), Box<dyn std::error::Error>> {
        let session = session();
        session.begin_recording()?;
        session.replay(&[HitEvent::new(PadId::new(2), 0, 1.0)])?;
        session.press_pad(PadId::new(1), 1.0)?;
        session.wait_replay().await;

        // Only the live hit is recorded.
        let hits = session.end_recording();
        assert_eq!(vec![PadId::new(1)], hits.iter().map(|h| h.pad).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_replay() {
        let session = session();
        assert!(matches!(session.replay(&[]), Err(PlaybackError::EmptySequence)));
        assert!(!session.is_playing());
        assert!(!session.state().playing);
        session.stop_replay();
    }

    #[tokio::test]
    async fn test_state_changes() -> Result<(), PadError> {
        let session = session();
        let mut watcher = session.watch_state();

        assert_eq!(300, session.set_bpm(500));
        assert_eq!(60, session.set_bpm(10));
        assert_eq!(90, session.set_bpm(90));
        assert!(session.toggle_metronome());
        assert!(!session.toggle_metronome());
        assert!(session.toggle_loop_mode());
        assert_eq!(0.5, session.set_master_volume(0.5));
        assert_eq!(1.0, session.set_master_volume(2.0));
        session.set_pad_volume(PadId::new(1), 0.25)?;
        assert_eq!(0.25, session.engine().pad_gain(PadId::new(1))?);
        session.set_sound_pack(Some("808".to_string()));

        let state = watcher.borrow_and_update().clone();
        assert_eq!(
            PerformanceState {
                bpm: 90,
                master_volume: 1.0,
                metronome: false,
                looping: true,
                recording: false,
                playing: false,
                sound_pack: Some("808".to_string()),
            },
            state
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_and_replay_session() -> Result<(), Box<dyn std::error::Error>> {
        let session = session();
        let store = MemoryStore::new();

        assert_eq!(None, session.save_recording(&store, None, &[], 0)?);
        assert!(store.list_sessions()?.is_empty());

        session.set_bpm(140);
        session.toggle_loop_mode();
        let hits = vec![
            HitEvent::new(PadId::new(1), 0, 1.0),
            HitEvent::new(PadId::new(2), 20, 1.0),
        ];
        let id = session
            .save_recording(&store, Some("groove".to_string()), &hits, 40)?
            .expect("recording should be saved");
        let summary = &store.list_sessions()?[0];
        assert_eq!("groove", summary.name);
        assert_eq!(140, summary.bpm);
        assert!(summary.looped);
        assert_eq!(40, summary.duration_ms);

        session.replay_session(&store, id)?;
        assert!(session.is_playing());
        session.wait_replay().await;

        assert!(matches!(
            session.replay_session(&store, SessionId::new(404)),
            Err(SessionError::Storage(StorageError::NotFound(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_default_recording_name() {
        let now = Local
            .with_ymd_and_hms(2026, 3, 7, 9, 5, 2)
            .single()
            .expect("valid local time");
        assert_eq!("Recording_2026-03-07_09-05-02", default_recording_name(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() -> Result<(), Box<dyn std::error::Error>> {
        let session = session();
        session.begin_recording()?;
        session.press_pad(PadId::new(1), 1.0)?;
        session.replay(&[
            HitEvent::new(PadId::new(2), 0, 1.0),
            HitEvent::new(PadId::new(2), 500, 1.0),
        ])?;

        session.shutdown();
        assert!(!session.is_recording());
        assert!(!session.is_playing());
        assert_eq!(0, session.engine().active_voice_count());
        assert!(session.engine().bank().loaded_pads().is_empty());
        let state = session.state();
        assert!(!state.recording);
        assert!(!state.playing);
        Ok(())
    }
}
