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
use std::error::Error;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, warn, Instrument, Level};

use crate::pad::PadId;
use crate::performance::{HitEvent, PerformanceSession};
use crate::storage::{SessionId, SessionStore};

pub mod keyboard;

/// Controller events that drive a performance session.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Strikes a pad.
    Hit { pad: PadId, velocity: f32 },

    /// Starts recording.
    Record,

    /// Stops recording and saves the take if it has any hits.
    EndRecording,

    /// Replays a stored session, or the last take when no id is given.
    Play(Option<SessionId>),

    /// Stops the running replay. If nothing is replaying, does nothing.
    Stop,

    /// Sets the master volume.
    Volume(f32),

    /// Sets the tempo.
    Bpm(u32),

    Metronome,

    Loop,

    /// Lists the stored sessions.
    List,

    /// Stops everything and exits.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Applies controller events to a session.
struct Performer {
    session: Arc<PerformanceSession>,
    store: Arc<dyn SessionStore>,
    /// The most recent take, whether or not it was saved.
    last_take: Vec<HitEvent>,
}

impl Performer {
    /// Handles one event. Returns false once the performer should stop.
    fn handle(&mut self, event: Event) -> Result<bool, Box<dyn Error>> {
        match event {
            Event::Hit { pad, velocity } => {
                self.session.press_pad(pad, velocity)?;
            }
            Event::Record => self.session.begin_recording()?,
            Event::EndRecording => {
                let Some(recording) = self.session.finish_recording() else {
                    warn!("Not recording");
                    return Ok(true);
                };
                let duration_ms = recording.duration_ms();
                let saved = self.session.save_recording(
                    self.store.as_ref(),
                    None,
                    &recording.hits,
                    duration_ms,
                )?;
                if let Some(id) = saved {
                    info!(id = id.get(), hits = recording.hits.len(), duration_ms, "Take saved");
                }
                self.last_take = recording.hits;
            }
            Event::Play(Some(id)) => self.session.replay_session(self.store.as_ref(), id)?,
            Event::Play(None) => self.session.replay(&self.last_take)?,
            Event::Stop => self.session.stop_replay(),
            Event::Volume(volume) => {
                let volume = self.session.set_master_volume(volume);
                info!(volume, "Master volume set");
            }
            Event::Bpm(bpm) => {
                let bpm = self.session.set_bpm(bpm);
                info!(bpm, "Tempo set");
            }
            Event::Metronome => {
                let enabled = self.session.toggle_metronome();
                info!(enabled, "Metronome toggled");
            }
            Event::Loop => {
                let enabled = self.session.toggle_loop_mode();
                info!(enabled, "Loop mode toggled");
            }
            Event::List => {
                for summary in self.store.list_sessions()? {
                    info!(
                        id = summary.id.get(),
                        name = summary.name,
                        hits = summary.hit_count,
                        duration_ms = summary.duration_ms,
                        bpm = summary.bpm,
                        modified = %summary.modified_at,
                        "Session"
                    );
                }
            }
            Event::Quit => return Ok(false),
        }
        Ok(true)
    }
}

/// Drives a performance session from a controller driver.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(
        session: Arc<PerformanceSession>,
        store: Arc<dyn SessionStore>,
        driver: Arc<dyn Driver>,
    ) -> Controller {
        let performer = Performer {
            session,
            store,
            last_take: Vec::new(),
        };
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::trigger_events(performer, driver).instrument(span)),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies events from the driver until it closes or asks to quit.
    async fn trigger_events(mut performer: Performer, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        info!("Controller started.");

        while let Some(event) = events_rx.recv().await {
            info!(event = format!("{:?}", event), "Received event.");
            match performer.handle(event) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => error!("Error handling event: {}", e),
            }
        }

        info!("Controller closing.");
        performer.session.shutdown();
        // The driver may be parked on a blocking read, so it isn't awaited after a quit.
        if join_handle.is_finished() {
            match join_handle.await {
                Ok(Err(e)) => error!("Event monitor failed: {}", e),
                Err(e) => error!("Error waiting for event monitor to stop: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }
}
