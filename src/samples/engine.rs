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

//! The playback engine: turns pad triggers into voices on the audio device.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::bank::SampleBank;
use super::error::{LoadError, TriggerError};
use super::loader::{LoadedSample, SampleData, DEFAULT_SAMPLE_GAIN};
use super::voice::{Voice, VoiceId, VoicePool};
use crate::audio::Device;
use crate::pad::{PadError, PadGrid, PadId};
use crate::playsync::CancelHandle;

/// Default ceiling on simultaneously playing voices.
pub const DEFAULT_MAX_VOICES: usize = 32;

/// Computes the gain a voice plays at. Inputs are not trusted to be in range.
pub fn effective_gain(master: f32, pad: f32, velocity: f32) -> f32 {
    clamp_unit(clamp_unit(master) * clamp_unit(pad) * clamp_unit(velocity))
}

/// Clamps to [0, 1], mapping NaN to 0.
fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

struct Gains {
    master: f32,
    pads: Vec<f32>,
}

/// Triggers and stops voices for the samples held in a [`SampleBank`].
pub struct VoicePlaybackEngine {
    bank: Arc<SampleBank>,
    device: Arc<dyn Device>,
    grid: PadGrid,
    gains: RwLock<Gains>,
    voices: Mutex<VoicePool>,
}

impl VoicePlaybackEngine {
    pub fn new(
        bank: Arc<SampleBank>,
        device: Arc<dyn Device>,
        max_voices: usize,
    ) -> VoicePlaybackEngine {
        let grid = bank.grid();
        info!(
            device = %device,
            pads = grid.len(),
            max_voices,
            "Playback engine ready"
        );
        VoicePlaybackEngine {
            bank,
            device,
            grid,
            gains: RwLock::new(Gains {
                master: 1.0,
                pads: vec![DEFAULT_SAMPLE_GAIN; grid.len()],
            }),
            voices: Mutex::new(VoicePool::new(max_voices)),
        }
    }

    pub fn bank(&self) -> &Arc<SampleBank> {
        &self.bank
    }

    pub fn grid(&self) -> PadGrid {
        self.grid
    }

    /// Loads a sample onto the pad and resets the pad's gain to the sample's default.
    pub fn load_sample(&self, pad: PadId, data: SampleData) -> Result<LoadedSample, LoadError> {
        let sample = self.bank.load(pad, data)?;
        self.reset_pad_gain(pad, sample.default_gain())?;
        Ok(sample)
    }

    /// Loads an audio file onto the pad.
    pub fn load_sample_file(&self, pad: PadId, path: &Path) -> Result<LoadedSample, LoadError> {
        let sample = self.bank.load_file(pad, path)?;
        self.reset_pad_gain(pad, sample.default_gain())?;
        Ok(sample)
    }

    /// Unloads the pad's sample. Voices already playing it finish normally.
    pub fn unload_sample(&self, pad: PadId) -> Result<(), LoadError> {
        self.bank.unload(pad)?;
        self.reset_pad_gain(pad, DEFAULT_SAMPLE_GAIN)?;
        Ok(())
    }

    fn reset_pad_gain(&self, pad: PadId, gain: f32) -> Result<(), PadError> {
        let index = self.grid.index(pad)?;
        self.gains.write().pads[index] = gain;
        Ok(())
    }

    /// Starts a new voice for the pad's sample.
    pub fn trigger(&self, pad: PadId, velocity: f32) -> Result<VoiceId, TriggerError> {
        let index = self.grid.index(pad)?;
        let Some(sample) = self.bank.get(pad).ok().flatten() else {
            debug!(pad = pad.get(), "No sample loaded, nothing to trigger");
            return Err(TriggerError::NoSampleLoaded(pad));
        };

        let gain = {
            let gains = self.gains.read();
            effective_gain(gains.master, gains.pads[index], velocity)
        };

        let cancel_handle = CancelHandle::new();
        let is_finished = Arc::new(AtomicBool::new(false));
        let voice = Voice::new(pad, gain, cancel_handle.clone(), is_finished.clone());

        // The pool lock covers the hand-off to the device so that a steal and the
        // new voice reach the mixer in trigger order.
        let mut voices = self.voices.lock();
        let (id, evicted) = voices.add(voice);
        if let Some(evicted) = evicted {
            debug!(pad = evicted.pad().get(), gain = evicted.gain(), "Stolen voice stopped");
        }
        let source = sample.create_source(id.get(), gain, is_finished, cancel_handle);
        if let Err(e) = self.device.play(source) {
            voices.stop(id);
            warn!(pad = pad.get(), err = %e, "Unable to hand voice to the audio device");
            return Err(e.into());
        }
        drop(voices);

        debug!(pad = pad.get(), velocity, gain, voice = %id, "Voice triggered");
        Ok(id)
    }

    /// Stops the voice. Unknown and already finished voices are ignored.
    pub fn stop(&self, voice: VoiceId) {
        if self.voices.lock().stop(voice) {
            debug!(voice = %voice, "Voice stopped");
        }
    }

    /// True while the voice is still playing.
    pub fn is_active(&self, voice: VoiceId) -> bool {
        self.voices.lock().is_active(voice)
    }

    /// Sets the master gain. Applies to voices triggered from now on.
    pub fn set_master_gain(&self, gain: f32) {
        let gain = clamp_unit(gain);
        self.gains.write().master = gain;
        debug!(gain, "Master gain set");
    }

    pub fn master_gain(&self) -> f32 {
        self.gains.read().master
    }

    /// Sets the gain of one pad. Applies to voices triggered from now on.
    pub fn set_pad_gain(&self, pad: PadId, gain: f32) -> Result<(), PadError> {
        let index = self.grid.index(pad)?;
        let gain = clamp_unit(gain);
        self.gains.write().pads[index] = gain;
        debug!(pad = pad.get(), gain, "Pad gain set");
        Ok(())
    }

    pub fn pad_gain(&self, pad: PadId) -> Result<f32, PadError> {
        let index = self.grid.index(pad)?;
        Ok(self.gains.read().pads[index])
    }

    /// Stops every voice. Samples and gains stay as they are.
    pub fn stop_all(&self) {
        let stopped = self.voices.lock().clear();
        if stopped > 0 {
            info!(stopped, "All voices stopped");
        }
    }

    /// Stops every voice, resets gains, and releases all loaded samples.
    pub fn release_all(&self) {
        self.stop_all();
        {
            let mut gains = self.gains.write();
            gains.master = 1.0;
            gains.pads.iter_mut().for_each(|g| *g = DEFAULT_SAMPLE_GAIN);
        }
        self.bank.release();
        info!("Playback engine released");
    }

    /// Returns the number of active voices.
    pub fn active_voice_count(&self) -> usize {
        self.voices.lock().active_count()
    }

    /// Returns the total memory used by loaded samples.
    pub fn memory_usage(&self) -> usize {
        self.bank.memory_usage()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;

    use rand::Rng;

    use super::*;
    use crate::audio::mock;
    use crate::testutil::pcm_sample;

    fn engine(max_voices: usize) -> (VoicePlaybackEngine, Arc<mock::Device>) {
        let device = Arc::new(mock::Device::get("mock-engine", 44100, 2));
        let bank = Arc::new(SampleBank::new(PadGrid::default(), 44100));
        (
            VoicePlaybackEngine::new(bank, device.clone(), max_voices),
            device,
        )
    }

    #[test]
    fn test_gain_formula() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let master: f32 = rng.gen_range(-0.5..1.5);
            let pad: f32 = rng.gen_range(-0.5..1.5);
            let velocity: f32 = rng.gen_range(-0.5..1.5);

            let gain = effective_gain(master, pad, velocity);
            let expected =
                master.clamp(0.0, 1.0) * pad.clamp(0.0, 1.0) * velocity.clamp(0.0, 1.0);
            assert!((gain - expected).abs() < 1e-6);
            assert!((0.0..=1.0).contains(&gain));
        }
        assert_eq!(0.0, effective_gain(1.0, 1.0, f32::NAN));
    }

    #[test]
    fn test_trigger_applies_gain() -> Result<(), Box<dyn std::error::Error>> {
        let (engine, device) = engine(8);
        let pad = PadId::new(2);
        engine.load_sample(pad, pcm_sample(100, 44100))?;

        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let master: f32 = rng.gen_range(0.0..1.0);
            let pad_gain: f32 = rng.gen_range(0.0..1.0);
            let velocity: f32 = rng.gen_range(0.0..1.0);
            engine.set_master_gain(master);
            engine.set_pad_gain(pad, pad_gain)?;

            let voice = engine.trigger(pad, velocity)?;
            let frame = device.render(1);
            // The test sample is a constant 0.5.
            let expected = 0.5 * master * pad_gain * velocity;
            assert!((frame[0] - expected).abs() < 1e-5);
            assert!((frame[1] - expected).abs() < 1e-5);
            engine.stop(voice);
            device.render(1);
        }
        Ok(())
    }

    #[test]
    fn test_gain_changes_only_affect_new_voices() -> Result<(), Box<dyn std::error::Error>> {
        let (engine, device) = engine(8);
        let pad = PadId::new(0);
        engine.load_sample(pad, pcm_sample(100, 44100))?;

        engine.trigger(pad, 1.0)?;
        engine.set_master_gain(0.0);
        let frame = device.render(1);
        assert!((frame[0] - 0.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_gains_are_clamped() -> Result<(), PadError> {
        let (engine, _) = engine(8);
        engine.set_master_gain(3.0);
        assert_eq!(1.0, engine.master_gain());
        engine.set_master_gain(-1.0);
        assert_eq!(0.0, engine.master_gain());

        engine.set_pad_gain(PadId::new(1), 2.0)?;
        assert_eq!(1.0, engine.pad_gain(PadId::new(1))?);
        engine.set_pad_gain(PadId::new(1), f32::NAN)?;
        assert_eq!(0.0, engine.pad_gain(PadId::new(1))?);
        Ok(())
    }

    #[test]
    fn test_loading_resets_pad_gain() -> Result<(), Box<dyn std::error::Error>> {
        let (engine, _) = engine(8);
        let pad = PadId::new(4);
        engine.set_pad_gain(pad, 0.25)?;
        engine.load_sample(pad, pcm_sample(10, 44100))?;
        assert_eq!(1.0, engine.pad_gain(pad)?);

        engine.set_pad_gain(pad, 0.25)?;
        engine.unload_sample(pad)?;
        assert_eq!(1.0, engine.pad_gain(pad)?);
        Ok(())
    }

    #[test]
    fn test_trigger_unloaded_pad() {
        let (engine, device) = engine(8);
        let result = engine.trigger(PadId::new(3), 1.0);
        assert!(matches!(
            result,
            Err(TriggerError::NoSampleLoaded(pad)) if pad == PadId::new(3)
        ));
        assert_eq!(0, engine.active_voice_count());
        assert_eq!(0, device.played());
    }

    #[test]
    fn test_out_of_range_pads() {
        let (engine, _) = engine(8);
        let pad = PadId::new(32);
        assert!(matches!(
            engine.trigger(pad, 1.0),
            Err(TriggerError::InvalidPad(_))
        ));
        assert!(engine.set_pad_gain(pad, 0.5).is_err());
        assert!(engine.pad_gain(pad).is_err());
        assert!(matches!(
            engine.load_sample(pad, pcm_sample(10, 44100)),
            Err(LoadError::InvalidPad(_))
        ));
        assert!(engine.unload_sample(pad).is_err());
    }

    #[test]
    fn test_voice_ceiling_steals_oldest() -> Result<(), Box<dyn std::error::Error>> {
        let max_voices = 4;
        let (engine, device) = engine(max_voices);
        let pad = PadId::new(0);
        engine.load_sample(pad, pcm_sample(44100, 44100))?;

        let voices = (0..max_voices + 3)
            .map(|_| engine.trigger(pad, 1.0))
            .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(max_voices, engine.active_voice_count());
        for voice in &voices[..3] {
            assert!(!engine.is_active(*voice));
        }
        for voice in &voices[3..] {
            assert!(engine.is_active(*voice));
        }

        // The mixer drops the stolen sources on the next render.
        device.render(1);
        assert_eq!(max_voices, device.active_sources());
        Ok(())
    }

    #[test]
    fn test_concurrent_triggers_respect_ceiling() -> Result<(), Box<dyn std::error::Error>> {
        let max_voices = 6;
        let pads = 8;
        let triggers_per_pad = 25;
        let (engine, device) = engine(max_voices);
        for pad in 0..pads {
            engine.load_sample(PadId::new(pad), pcm_sample(441_000, 44100))?;
        }

        let rendering = AtomicBool::new(true);
        let voices: Vec<VoiceId> = std::thread::scope(|scope| {
            let renderer = scope.spawn(|| {
                while rendering.load(Ordering::Relaxed) {
                    device.render(16);
                }
            });
            let triggers: Vec<_> = (0..pads)
                .map(|pad| {
                    let engine = &engine;
                    scope.spawn(move || {
                        (0..triggers_per_pad)
                            .map(|_| engine.trigger(PadId::new(pad), 1.0))
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect();

            let results: Vec<_> = triggers.into_iter().map(|handle| handle.join()).collect();
            rendering.store(false, Ordering::Relaxed);
            assert!(renderer.join().is_ok(), "render thread panicked");

            let mut voices = Vec::new();
            for result in results {
                match result {
                    Ok(ids) => voices.extend(ids?),
                    Err(_) => panic!("trigger thread panicked"),
                }
            }
            Ok::<_, TriggerError>(voices)
        })?;

        let total = pads as usize * triggers_per_pad;
        assert_eq!(total, voices.len());
        assert_eq!(max_voices, engine.active_voice_count());

        // The survivors are exactly the last voices triggered, in any thread.
        let pool = engine.voices.lock();
        let mut survivors: Vec<u64> =
            voices.iter().filter_map(|id| pool.sequence(*id)).collect();
        drop(pool);
        survivors.sort_unstable();
        let newest: Vec<u64> = ((total - max_voices) as u64..total as u64).collect();
        assert_eq!(newest, survivors);

        device.render(1);
        assert_eq!(max_voices, device.active_sources());
        Ok(())
    }

    #[test]
    fn test_stop_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let (engine, device) = engine(8);
        let pad = PadId::new(0);
        engine.load_sample(pad, pcm_sample(1000, 44100))?;

        let voice = engine.trigger(pad, 1.0)?;
        engine.stop(voice);
        engine.stop(voice);
        assert_eq!(0, engine.active_voice_count());
        device.render(1);
        assert_eq!(0, device.active_sources());
        Ok(())
    }

    #[test]
    fn test_finished_voices_are_reaped() -> Result<(), Box<dyn std::error::Error>> {
        let (engine, device) = engine(8);
        let pad = PadId::new(0);
        engine.load_sample(pad, pcm_sample(10, 44100))?;

        let voice = engine.trigger(pad, 1.0)?;
        assert_eq!(1, engine.active_voice_count());
        device.render(20);
        assert_eq!(0, engine.active_voice_count());

        // Stopping a finished voice is a no-op.
        engine.stop(voice);
        Ok(())
    }

    #[test]
    fn test_release_all() -> Result<(), Box<dyn std::error::Error>> {
        let (engine, _) = engine(8);
        engine.load_sample(PadId::new(0), pcm_sample(1000, 44100))?;
        engine.load_sample(PadId::new(1), pcm_sample(1000, 44100))?;
        engine.trigger(PadId::new(0), 1.0)?;
        engine.trigger(PadId::new(1), 1.0)?;
        engine.set_master_gain(0.5);

        engine.release_all();
        assert_eq!(0, engine.active_voice_count());
        assert_eq!(1.0, engine.master_gain());
        assert!(engine.bank().loaded_pads().is_empty());
        assert!(matches!(
            engine.trigger(PadId::new(0), 1.0),
            Err(TriggerError::NoSampleLoaded(_))
        ));
        Ok(())
    }
}
