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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::pad::PadId;
use crate::storage::SessionId;

const RECORD: &str = "rec";
const END: &str = "end";
const PLAY: &str = "play";
const STOP: &str = "stop";
const VOLUME: &str = "vol";
const BPM: &str = "bpm";
const METRONOME: &str = "metronome";
const LOOP: &str = "loop";
const LIST: &str = "list";
const QUIT: &str = "quit";

/// A controller that plays pads and drives recording from typed commands.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Turns one line of input into an event.
    fn parse(input: &str) -> Result<Option<Event>, String> {
        let input = input.trim().to_lowercase();
        let mut words = input.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };
        let argument = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for {}", command));
        }

        let event = match (command, argument) {
            (RECORD, None) => Event::Record,
            (END, None) => Event::EndRecording,
            (PLAY, None) => Event::Play(None),
            (PLAY, Some(id)) => Event::Play(Some(SessionId::new(
                id.parse().map_err(|_| format!("invalid session id {}", id))?,
            ))),
            (STOP, None) => Event::Stop,
            (VOLUME, Some(volume)) => Event::Volume(
                volume
                    .parse()
                    .map_err(|_| format!("invalid volume {}", volume))?,
            ),
            (BPM, Some(bpm)) => {
                Event::Bpm(bpm.parse().map_err(|_| format!("invalid tempo {}", bpm))?)
            }
            (METRONOME, None) => Event::Metronome,
            (LOOP, None) => Event::Loop,
            (LIST, None) => Event::List,
            (QUIT, None) => Event::Quit,
            (pad, velocity) => {
                let pad: u16 = pad
                    .parse()
                    .map_err(|_| format!("unrecognized command {}", input))?;
                let velocity = match velocity {
                    Some(velocity) => velocity
                        .parse()
                        .map_err(|_| format!("invalid velocity {}", velocity))?,
                    None => 1.0,
                };
                Event::Hit {
                    pad: PadId::new(pad),
                    velocity,
                }
            }
        };
        Ok(Some(event))
    }

    /// Reads one command. Returns false once input has ended or the user quit.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command (<pad> [velocity], {}, {}, {} [id], {}, {} <0-1>, {} <n>, {}, {}, {}, {}): ",
            RECORD, END, PLAY, STOP, VOLUME, BPM, METRONOME, LOOP, LIST, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        let event = match Driver::parse(&input) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(true),
            Err(e) => {
                warn!(input = input.trim(), err = e, "Unrecognized input");
                return Ok(true);
            }
        };
        let quit = event == Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(!quit)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
