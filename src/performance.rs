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

//! Recording live performances and replaying them.

mod events;
mod hit;
mod recorder;
mod scheduler;
mod session;
mod state;

pub use events::{HitSource, SessionEvent};
pub use hit::HitEvent;
pub use recorder::{EventRecorder, RecordError, Recording};
pub use scheduler::{PlaybackError, PlaybackScheduler};
pub use session::{default_recording_name, PerformanceSession, SessionError};
pub use state::{clamp_bpm, PerformanceState, DEFAULT_BPM, MAX_BPM, MIN_BPM};
