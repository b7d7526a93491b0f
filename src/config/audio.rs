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
use serde::Deserialize;

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. "default" picks the host's default output, names
    /// starting with "mock" pick a device that never touches the hardware.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100). Samples are converted to
    /// this rate when they are loaded.
    sample_rate: Option<u32>,

    /// Number of output channels (default: 2).
    channels: Option<u16>,

    /// Fixed stream buffer size in frames. When unset the backend picks one.
    /// Lower values mean lower trigger latency and less tolerance for jitter.
    buffer_size: Option<u32>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            sample_rate: None,
            channels: None,
            buffer_size: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the number of output channels (default: 2)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    pub fn buffer_size(&self) -> Option<u32> {
        self.buffer_size
    }
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(DEFAULT_DEVICE)
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    #[test]
    fn test_defaults() -> Result<(), config::ConfigError> {
        let audio: Audio = Config::builder()
            .add_source(File::from_str("{}", FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        assert_eq!("default", audio.device());
        assert_eq!(44100, audio.sample_rate());
        assert_eq!(2, audio.channels());
        assert_eq!(None, audio.buffer_size());
        Ok(())
    }

    #[test]
    fn test_explicit_values() -> Result<(), config::ConfigError> {
        let yaml = r#"
            device: "UltraLite-mk5"
            sample_rate: 48000
            channels: 8
            buffer_size: 128
        "#;
        let audio: Audio = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        assert_eq!("UltraLite-mk5", audio.device());
        assert_eq!(48000, audio.sample_rate());
        assert_eq!(8, audio.channels());
        assert_eq!(Some(128), audio.buffer_size());
        Ok(())
    }
}
