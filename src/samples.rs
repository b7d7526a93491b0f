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

//! Pad-triggered sample playback.
//!
//! This module provides:
//! - Sample decoding into memory (so a trigger never waits on a decoder)
//! - The per-pad sample bank
//! - A bounded voice pool with oldest-first stealing
//! - The playback engine that hands voices to the audio device

mod bank;
mod engine;
mod error;
mod loader;
mod voice;

pub use bank::SampleBank;
pub use engine::{effective_gain, VoicePlaybackEngine, DEFAULT_MAX_VOICES};
pub use error::{LoadError, TriggerError};
pub use loader::{LoadedSample, SampleData, DEFAULT_SAMPLE_GAIN};
pub use voice::VoiceId;
