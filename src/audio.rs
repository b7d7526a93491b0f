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
use std::any::Any;
use std::{fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod mixer;
pub mod mock;

pub use mixer::{ActiveSource, AudioMixer, SourceSender};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("audio device {0} was not found")]
    NotFound(String),

    #[error("unable to initialize audio output: {0}")]
    Init(String),

    #[error("audio output for {0} is no longer running")]
    Closed(String),

    #[error("audio output for {0} is not keeping up")]
    Overloaded(String),
}

/// An audio output. Sources handed to `play` are mixed and rendered until they
/// run out or their cancel handle fires.
pub trait Device: Any + fmt::Display + Send + Sync {
    /// Hands a source to the output. Must not block on the audio thread.
    fn play(&self, source: ActiveSource) -> Result<(), DeviceError>;

    /// The output sample rate. Samples are converted to this on load.
    fn sample_rate(&self) -> u32;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, DeviceError>;
}

/// Lists the available output devices as printable descriptions.
pub fn list_devices() -> Result<Vec<String>, DeviceError> {
    cpal::Device::list()
}

/// Opens the configured output device. Names starting with "mock" produce a mock
/// device that never touches the audio backend.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, DeviceError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(
            device,
            config.sample_rate(),
            config.channels(),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
