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
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pad::PadId;

/// A single pad hit, timed relative to the start of its recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    pub pad: PadId,
    /// Milliseconds since the recording started.
    pub timestamp_ms: i64,
    /// Strike strength in [0, 1].
    pub velocity: f32,
}

impl HitEvent {
    pub fn new(pad: PadId, timestamp_ms: i64, velocity: f32) -> HitEvent {
        HitEvent {
            pad,
            timestamp_ms,
            velocity,
        }
    }

    /// The offset from the start of the recording. Negative timestamps are treated as zero.
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.timestamp_ms.max(0) as u64)
    }
}
