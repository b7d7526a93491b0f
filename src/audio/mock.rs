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
use std::fmt;

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use super::{ActiveSource, AudioMixer, DeviceError};

/// A device with a mixer but no audio backend. Nothing renders unless
/// `render` is called, so voices stay alive until a test moves time along.
#[derive(Clone)]
pub struct Device {
    name: String,
    mixer: AudioMixer,
    #[cfg(test)]
    played: Arc<AtomicUsize>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, sample_rate: u32, channels: u16) -> Device {
        Device {
            name: name.to_string(),
            mixer: AudioMixer::new(channels, sample_rate),
            #[cfg(test)]
            played: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Renders the given number of frames through the mixer.
    pub fn render(&self, num_frames: usize) -> Vec<f32> {
        self.mixer.process_frames(num_frames)
    }

    /// Number of sources still held by the mixer.
    pub fn active_sources(&self) -> usize {
        self.mixer.active_count()
    }

    /// Number of sources ever handed to this device.
    #[cfg(test)]
    pub fn played(&self) -> usize {
        self.played.load(Ordering::Relaxed)
    }
}

impl super::Device for Device {
    fn play(&self, source: ActiveSource) -> Result<(), DeviceError> {
        debug!(device = self.name, source = source.id, "Mock device playing source");
        #[cfg(test)]
        self.played.fetch_add(1, Ordering::Relaxed);
        self.mixer.add_source(source);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, DeviceError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
