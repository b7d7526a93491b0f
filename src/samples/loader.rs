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

//! Sample decoding. Samples are decoded entirely into memory up front so that
//! triggering never touches a decoder.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use super::error::LoadError;
use crate::audio::ActiveSource;
use crate::playsync::CancelHandle;

/// Gain a freshly loaded sample plays at before any pad volume is applied.
pub const DEFAULT_SAMPLE_GAIN: f32 = 1.0;

/// Raw sample data as handed over by whoever supplies sounds for the pads.
#[derive(Clone, Debug)]
pub enum SampleData {
    /// An encoded audio file (WAV, FLAC, OGG, MP3...). The extension, if known,
    /// helps the probe pick a format.
    Encoded {
        bytes: Vec<u8>,
        extension: Option<String>,
    },
    /// Already decoded interleaved PCM.
    Pcm {
        samples: Vec<f32>,
        channel_count: u16,
        sample_rate: u32,
    },
}

impl SampleData {
    /// Reads an encoded audio file from disk.
    pub fn from_file(path: &Path) -> Result<SampleData, LoadError> {
        let bytes = std::fs::read(path).map_err(|e| {
            std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
        })?;
        Ok(SampleData::Encoded {
            bytes,
            extension: path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_string()),
        })
    }
}

/// A decoded sample that can be played back.
/// The sample data is stored in an Arc for efficient sharing between voices.
#[derive(Clone)]
pub struct LoadedSample {
    /// The sample data as f32 samples (interleaved if multi-channel).
    data: Arc<Vec<f32>>,
    /// Number of channels in the sample.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
    /// Gain the owning pad is reset to when this sample is loaded.
    default_gain: f32,
}

impl LoadedSample {
    /// Decodes the data and converts it to the target sample rate.
    pub fn decode(data: SampleData, target_sample_rate: u32) -> Result<LoadedSample, LoadError> {
        let (samples, channel_count, sample_rate) = match data {
            SampleData::Encoded { bytes, extension } => decode_bytes(bytes, extension.as_deref())?,
            SampleData::Pcm {
                samples,
                channel_count,
                sample_rate,
            } => (samples, channel_count, sample_rate),
        };

        if target_sample_rate == 0 {
            return Err(LoadError::Malformed("output sample rate is zero".to_string()));
        }
        if channel_count == 0 {
            return Err(LoadError::Malformed("sample has no channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(LoadError::Malformed("sample rate is zero".to_string()));
        }
        if samples.len() < channel_count as usize {
            return Err(LoadError::Malformed("sample has no frames".to_string()));
        }
        if samples.len() % channel_count as usize != 0 {
            return Err(LoadError::Malformed(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channel_count
            )));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(LoadError::Malformed(
                "sample contains non-finite values".to_string(),
            ));
        }

        let samples = if sample_rate != target_sample_rate {
            debug!(
                source_rate = sample_rate,
                target_rate = target_sample_rate,
                "Transcoding sample"
            );
            transcode_samples(&samples, channel_count, sample_rate, target_sample_rate)
        } else {
            samples
        };

        let loaded = LoadedSample {
            data: Arc::new(samples),
            channel_count,
            sample_rate: target_sample_rate,
            default_gain: DEFAULT_SAMPLE_GAIN,
        };

        info!(
            channels = channel_count,
            sample_rate = target_sample_rate,
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Sample decoded"
        );

        Ok(loaded)
    }

    /// Creates a mixer source for one voice of this sample.
    pub fn create_source(
        &self,
        id: u64,
        gain: f32,
        is_finished: Arc<AtomicBool>,
        cancel_handle: CancelHandle,
    ) -> ActiveSource {
        ActiveSource::new(
            id,
            self.data.clone(),
            self.channel_count,
            gain,
            is_finished,
            cancel_handle,
        )
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn default_gain(&self) -> f32 {
        self.default_gain
    }

    /// Returns the number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frames() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// True if both handles share the same decoded audio.
    pub fn same_data(&self, other: &LoadedSample) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl std::fmt::Debug for LoadedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSample")
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Decodes an in-memory audio file into interleaved f32 samples.
fn decode_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
) -> Result<(Vec<f32>, u16, u32), LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::Malformed("sample data is empty".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    // Find the first audio track
    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::Malformed("no audio track found".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| LoadError::Malformed("sample rate not specified".to_string()))?;
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);

    let mut decoder = get_codecs().make(&params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // A single corrupt packet is skipped rather than failing the whole sample.
                warn!(err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count() as u16;
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    Ok((samples, channels, sample_rate))
}

/// Transcodes samples from one sample rate to another using linear interpolation.
/// Good enough for drum hits and one-shots.
fn transcode_samples(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let channels = channel_count as usize;
    let source_frames = samples.len() / channels;
    let target_frames =
        (source_frames as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;

    let mut output = Vec::with_capacity(target_frames * channels);

    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let idx0 = source_frame * channels + channel;
            let idx1 = (source_frame + 1) * channels + channel;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);

            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}
