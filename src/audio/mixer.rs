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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::playsync::CancelHandle;

/// Sender used to hand new sources to the audio callback without taking the mixer lock.
pub type SourceSender = crossbeam_channel::Sender<ActiveSource>;

/// A sample being rendered by the mixer.
pub struct ActiveSource {
    /// Unique ID for this source
    pub id: u64,
    /// Interleaved sample data, shared with every other voice of the same sample.
    data: Arc<Vec<f32>>,
    /// Number of channels in the data.
    channel_count: u16,
    /// Next frame to render.
    frame: usize,
    /// Gain applied to every sample, fixed at trigger time.
    gain: f32,
    /// Set by the mixer once the source has played out or was cancelled.
    pub is_finished: Arc<AtomicBool>,
    /// Cancel handle for this source
    pub cancel_handle: CancelHandle,
}

impl ActiveSource {
    pub fn new(
        id: u64,
        data: Arc<Vec<f32>>,
        channel_count: u16,
        gain: f32,
        is_finished: Arc<AtomicBool>,
        cancel_handle: CancelHandle,
    ) -> ActiveSource {
        ActiveSource {
            id,
            data,
            channel_count: channel_count.max(1),
            frame: 0,
            gain,
            is_finished,
            cancel_handle,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    fn total_frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Adds the next frame of this source into the output frame. Returns false
    /// once the source has nothing left to play.
    fn mix_next_frame(&mut self, output: &mut [f32]) -> bool {
        if self.frame >= self.total_frames() {
            return false;
        }

        let channels = self.channel_count as usize;
        let start = self.frame * channels;
        let input = &self.data[start..start + channels];

        if channels == 1 {
            // Mono sources feed every output channel.
            let sample = input[0] * self.gain;
            for out in output.iter_mut() {
                *out += sample;
            }
        } else {
            for (out, sample) in output.iter_mut().zip(input.iter()) {
                *out += sample * self.gain;
            }
        }

        self.frame += 1;
        true
    }
}

/// Sums active sources into interleaved output buffers.
#[derive(Clone)]
pub struct AudioMixer {
    /// Active audio sources currently playing
    active_sources: Arc<Mutex<Vec<ActiveSource>>>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        Self {
            active_sources: Arc::new(Mutex::new(Vec::new())),
            num_channels: num_channels.max(1),
            sample_rate,
        }
    }

    /// Adds a new audio source to the mixer
    pub fn add_source(&self, source: ActiveSource) {
        self.active_sources.lock().push(source);
    }

    /// Mixes `num_frames` frames into `output`, which is cleared first. Finished and
    /// cancelled sources are dropped and flagged as finished.
    pub fn process_into_output(&self, output: &mut [f32], num_frames: usize) {
        let channels = self.num_channels as usize;
        let frames = num_frames.min(output.len() / channels);
        output.fill(0.0);

        let mut sources = self.active_sources.lock();
        for frame in output.chunks_exact_mut(channels).take(frames) {
            sources.retain_mut(|source| {
                if source.cancel_handle.is_cancelled() || !source.mix_next_frame(frame) {
                    source.is_finished.store(true, Ordering::Release);
                    return false;
                }
                true
            });

            if sources.is_empty() {
                break;
            }
        }

        // Sources that ran out exactly on the last frame are retired now rather than
        // lingering until the next callback.
        sources.retain(|source| {
            if source.cancel_handle.is_cancelled() || source.frame >= source.total_frames() {
                source.is_finished.store(true, Ordering::Release);
                return false;
            }
            true
        });
    }

    /// Processes multiple frames of audio mixing
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0f32; num_frames * self.num_channels as usize];
        self.process_into_output(&mut frames, num_frames);
        frames
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of sources still being rendered.
    pub fn active_count(&self) -> usize {
        self.active_sources.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: u64, samples: Vec<f32>, channels: u16, gain: f32) -> ActiveSource {
        ActiveSource::new(
            id,
            Arc::new(samples),
            channels,
            gain,
            Arc::new(AtomicBool::new(false)),
            CancelHandle::new(),
        )
    }

    #[test]
    fn test_basic_mixing() {
        let mixer = AudioMixer::new(2, 44100);

        // Mono source should land on both output channels.
        mixer.add_source(source(1, vec![0.5, 0.25], 1, 1.0));

        let frames = mixer.process_frames(2);
        assert_eq!(vec![0.5, 0.5, 0.25, 0.25], frames);
    }

    #[test]
    fn test_multiple_source_mixing() {
        let mixer = AudioMixer::new(2, 44100);
        mixer.add_source(source(1, vec![0.5, 0.25], 2, 1.0));
        mixer.add_source(source(2, vec![0.25, 0.5], 2, 1.0));

        let frames = mixer.process_frames(1);
        assert_eq!(vec![0.75, 0.75], frames);
    }

    #[test]
    fn test_gain_applied() {
        let mixer = AudioMixer::new(1, 44100);
        mixer.add_source(source(1, vec![1.0, 1.0], 1, 0.5));

        let frames = mixer.process_frames(2);
        assert_eq!(vec![0.5, 0.5], frames);
    }

    #[test]
    fn test_finished_sources_are_flagged() {
        let mixer = AudioMixer::new(2, 44100);
        let finished = Arc::new(AtomicBool::new(false));
        mixer.add_source(ActiveSource::new(
            1,
            Arc::new(vec![0.5, 0.5]),
            1,
            1.0,
            finished.clone(),
            CancelHandle::new(),
        ));

        let frames = mixer.process_frames(4);
        assert_eq!(vec![0.5, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0], frames);
        assert!(finished.load(Ordering::Acquire));
        assert_eq!(0, mixer.active_count());
    }

    #[test]
    fn test_cancelled_sources_stop() {
        let mixer = AudioMixer::new(1, 44100);
        let cancel_handle = CancelHandle::new();
        let finished = Arc::new(AtomicBool::new(false));
        mixer.add_source(ActiveSource::new(
            1,
            Arc::new(vec![1.0; 16]),
            1,
            1.0,
            finished.clone(),
            cancel_handle.clone(),
        ));

        assert_eq!(vec![1.0, 1.0], mixer.process_frames(2));
        cancel_handle.cancel();
        assert_eq!(vec![0.0, 0.0], mixer.process_frames(2));
        assert!(finished.load(Ordering::Acquire));
        assert_eq!(0, mixer.active_count());
    }
}
