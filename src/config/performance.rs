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
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;
use tracing::{error, info};

use super::audio::Audio;
use super::error::ConfigError;
use crate::pad::{PadGrid, PadId};
use crate::performance::{clamp_bpm, DEFAULT_BPM};
use crate::samples::{VoicePlaybackEngine, DEFAULT_MAX_VOICES};

const DEFAULT_SESSIONS_DIR: &str = "sessions";

/// A sample assigned to a pad.
#[derive(Deserialize, Clone, Debug)]
pub struct PadSample {
    /// The pad to load the sample onto.
    pad: PadId,
    /// The audio file. Relative paths are relative to the config file.
    file: String,
    /// The pad's gain (default: 1.0).
    volume: Option<f32>,
}

impl PadSample {
    pub fn pad(&self) -> PadId {
        self.pad
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(1.0)
    }
}

/// The configuration for a performance: audio output, pad layout, and samples.
#[derive(Deserialize, Clone, Debug)]
pub struct PerformanceConfig {
    /// The audio output.
    #[serde(default)]
    audio: Audio,
    /// The pad grid (default: 4 rows of 8).
    #[serde(default)]
    grid: PadGrid,
    /// Ceiling on voices playing at once (default: 32).
    max_voices: Option<usize>,
    /// Initial master volume (default: 1.0).
    master_volume: Option<f32>,
    /// Initial tempo, clamped to 60..=300 (default: 120).
    bpm: Option<u32>,
    /// Name of the sound pack the samples come from. Stored with recordings.
    sound_pack: Option<String>,
    /// Directory that recorded sessions are saved in.
    sessions: Option<String>,
    /// Samples to load onto pads.
    #[serde(default)]
    pads: Vec<PadSample>,

    /// Directory of the config file, used to resolve relative paths.
    #[serde(skip)]
    base_path: PathBuf,
}

impl PerformanceConfig {
    /// Parse a performance configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<PerformanceConfig, ConfigError> {
        let mut config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<PerformanceConfig>()?;
        config.base_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.is_empty() {
            return Err(ConfigError::Invalid("the pad grid has no pads".to_string()));
        }
        if self.audio.sample_rate() == 0 {
            return Err(ConfigError::Invalid("audio sample_rate must be above 0".to_string()));
        }
        if self.max_voices == Some(0) {
            return Err(ConfigError::Invalid(
                "max_voices must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for sample in &self.pads {
            self.grid
                .index(sample.pad)
                .map_err(|e| ConfigError::Invalid(format!("{} ({})", e, sample.file)))?;
            if !seen.insert(sample.pad) {
                return Err(ConfigError::Invalid(format!(
                    "pad {} is assigned more than once",
                    sample.pad
                )));
            }
        }
        Ok(())
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn grid(&self) -> PadGrid {
        self.grid
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume.unwrap_or(1.0)
    }

    pub fn bpm(&self) -> u32 {
        clamp_bpm(self.bpm.unwrap_or(DEFAULT_BPM))
    }

    pub fn sound_pack(&self) -> Option<&str> {
        self.sound_pack.as_deref()
    }

    /// The directory recorded sessions are kept in.
    pub fn sessions_dir(&self) -> PathBuf {
        self.resolve(self.sessions.as_deref().unwrap_or(DEFAULT_SESSIONS_DIR))
    }

    pub fn pads(&self) -> &[PadSample] {
        &self.pads
    }

    /// Resolves a path from the config against the config file's directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    /// Loads every configured sample into the engine and applies pad volumes.
    /// A sample that fails to load is logged and its pad is left empty. Returns
    /// the number of pads loaded.
    pub fn load_samples(&self, engine: &VoicePlaybackEngine) -> usize {
        let mut loaded = 0;
        for sample in &self.pads {
            let path = self.resolve(&sample.file);
            match engine.load_sample_file(sample.pad, &path) {
                Ok(_) => {
                    if let Err(e) = engine.set_pad_gain(sample.pad, sample.volume()) {
                        error!(pad = sample.pad.get(), err = %e, "Unable to set pad volume");
                    }
                    loaded += 1;
                }
                Err(e) => error!(
                    pad = sample.pad.get(),
                    path = %path.display(),
                    err = %e,
                    "Unable to load sample"
                ),
            }
        }
        info!(loaded, configured = self.pads.len(), "Samples loaded");
        loaded
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::sync::Arc;

    use config::FileFormat;

    use super::*;
    use crate::audio::mock;
    use crate::samples::SampleBank;
    use crate::testutil::write_wav;

    #[test]
    fn test_minimal_config() -> Result<(), config::ConfigError> {
        let config: PerformanceConfig = Config::builder()
            .add_source(File::from_str("audio:\n  device: mock\n", FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        assert_eq!("mock", config.audio().device());
        assert_eq!(32, config.grid().len());
        assert_eq!(DEFAULT_MAX_VOICES, config.max_voices());
        assert_eq!(1.0, config.master_volume());
        assert_eq!(DEFAULT_BPM, config.bpm());
        assert_eq!(None, config.sound_pack());
        assert!(config.pads().is_empty());
        Ok(())
    }

    #[test]
    fn test_full_config() -> Result<(), Box<dyn std::error::Error>> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("performance.yaml");
        fs::write(
            &path,
            r#"
audio:
  device: mock-output
  sample_rate: 48000
grid:
  rows: 2
  columns: 4
max_voices: 16
master_volume: 0.8
bpm: 400
sound_pack: "808 Classics"
sessions: recordings
pads:
  - pad: 0
    file: kick.wav
  - pad: 7
    file: /samples/snare.wav
    volume: 0.5
"#,
        )?;

        let config = PerformanceConfig::deserialize(&path)?;
        assert_eq!(48000, config.audio().sample_rate());
        assert_eq!(8, config.grid().len());
        assert_eq!(16, config.max_voices());
        assert_eq!(0.8, config.master_volume());
        assert_eq!(300, config.bpm());
        assert_eq!(Some("808 Classics"), config.sound_pack());
        assert_eq!(tempdir.path().join("recordings"), config.sessions_dir());

        let pads = config.pads();
        assert_eq!(2, pads.len());
        assert_eq!(PadId::new(7), pads[1].pad());
        assert_eq!(0.5, pads[1].volume());
        assert_eq!(1.0, pads[0].volume());
        assert_eq!(tempdir.path().join("kick.wav"), config.resolve(pads[0].file()));
        assert_eq!(PathBuf::from("/samples/snare.wav"), config.resolve(pads[1].file()));
        Ok(())
    }

    #[test]
    fn test_invalid_pads() -> Result<(), Box<dyn std::error::Error>> {
        let tempdir = tempfile::tempdir()?;

        let path = tempdir.path().join("outside.yaml");
        fs::write(&path, "pads:\n  - pad: 32\n    file: kick.wav\n")?;
        assert!(matches!(
            PerformanceConfig::deserialize(&path),
            Err(ConfigError::Invalid(_))
        ));

        let path = tempdir.path().join("duplicate.yaml");
        fs::write(
            &path,
            "pads:\n  - pad: 1\n    file: kick.wav\n  - pad: 1\n    file: snare.wav\n",
        )?;
        assert!(matches!(
            PerformanceConfig::deserialize(&path),
            Err(ConfigError::Invalid(_))
        ));

        let path = tempdir.path().join("rate.yaml");
        fs::write(&path, "audio:\n  device: mock\n  sample_rate: 0\n")?;
        assert!(matches!(
            PerformanceConfig::deserialize(&path),
            Err(ConfigError::Invalid(_))
        ));

        let path = tempdir.path().join("voices.yaml");
        fs::write(&path, "max_voices: 0\n")?;
        assert!(matches!(
            PerformanceConfig::deserialize(&path),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            PerformanceConfig::deserialize(&tempdir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
        Ok(())
    }

    #[test]
    fn test_load_samples() -> Result<(), Box<dyn std::error::Error>> {
        let tempdir = tempfile::tempdir()?;
        write_wav(tempdir.path().join("kick.wav"), vec![vec![0.5f32; 100]], 44100)?;
        let path = tempdir.path().join("performance.yaml");
        fs::write(
            &path,
            r#"
audio:
  device: mock
pads:
  - pad: 0
    file: kick.wav
    volume: 0.25
  - pad: 1
    file: missing.wav
"#,
        )?;

        let config = PerformanceConfig::deserialize(&path)?;
        let bank = Arc::new(SampleBank::new(config.grid(), 44100));
        let engine = VoicePlaybackEngine::new(
            bank,
            Arc::new(mock::Device::get("mock", 44100, 2)),
            config.max_voices(),
        );

        assert_eq!(1, config.load_samples(&engine));
        assert_eq!(vec![PadId::new(0)], engine.bank().loaded_pads());
        assert_eq!(0.25, engine.pad_gain(PadId::new(0))?);
        Ok(())
    }
}
