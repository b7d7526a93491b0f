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
use serde::Serialize;

pub const MIN_BPM: u32 = 60;
pub const MAX_BPM: u32 = 300;
pub const DEFAULT_BPM: u32 = 120;

/// Clamps a tempo to the supported range.
pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// What a UI needs to draw the performance screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceState {
    pub bpm: u32,
    pub master_volume: f32,
    /// Metronome and loop mode are carried as flags only.
    pub metronome: bool,
    pub looping: bool,
    pub recording: bool,
    pub playing: bool,
    pub sound_pack: Option<String>,
}

impl Default for PerformanceState {
    fn default() -> Self {
        PerformanceState {
            bpm: DEFAULT_BPM,
            master_volume: 1.0,
            metronome: false,
            looping: false,
            recording: false,
            playing: false,
            sound_pack: None,
        }
    }
}
