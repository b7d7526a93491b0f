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

//! Voice management for polyphonic sample playback.
//!
//! Voices live in a fixed set of slots. A voice id is the slot index plus the
//! slot's generation, so ids of stopped or stolen voices never resolve to the
//! voice that reused their slot.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::pad::PadId;
use crate::playsync::CancelHandle;

/// Identifies a voice for as long as it is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

impl VoiceId {
    fn new(slot: usize, generation: u32) -> VoiceId {
        VoiceId(((generation as u64) << 32) | slot as u64)
    }

    fn slot(&self) -> usize {
        (self.0 & u32::MAX as u64) as usize
    }

    fn generation(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The opaque numeric form, also used as the mixer source id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.slot(), self.generation())
    }
}

/// Represents an active voice playing a sample.
pub struct Voice {
    pad: PadId,
    /// Effective gain, fixed when the voice was triggered.
    gain: f32,
    /// Trigger order. Lower is older.
    sequence: u64,
    cancel_handle: CancelHandle,
    /// Set by the mixer when the voice has played out.
    is_finished: Arc<AtomicBool>,
}

impl Voice {
    pub fn new(
        pad: PadId,
        gain: f32,
        cancel_handle: CancelHandle,
        is_finished: Arc<AtomicBool>,
    ) -> Voice {
        Voice {
            pad,
            gain,
            sequence: 0,
            cancel_handle,
            is_finished,
        }
    }

    pub fn pad(&self) -> PadId {
        self.pad
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    fn is_finished(&self) -> bool {
        self.is_finished.load(Ordering::Relaxed) || self.cancel_handle.is_cancelled()
    }

    fn stop(&self) {
        self.cancel_handle.cancel();
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    voice: Option<Voice>,
}

/// A bounded pool of voices that steals the oldest voice when full.
pub struct VoicePool {
    slots: Vec<Slot>,
    next_sequence: u64,
}

impl VoicePool {
    /// Creates a pool holding at most `max_voices` voices (at least one).
    pub fn new(max_voices: usize) -> VoicePool {
        VoicePool {
            slots: (0..max_voices.max(1)).map(|_| Slot::default()).collect(),
            next_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Adds a voice. If every slot is busy the oldest voice is stopped and
    /// returned along with the new voice's id.
    pub fn add(&mut self, mut voice: Voice) -> (VoiceId, Option<Voice>) {
        self.reap();

        voice.sequence = self.next_sequence;
        self.next_sequence += 1;

        let (index, evicted) = match self.slots.iter().position(|slot| slot.voice.is_none()) {
            Some(index) => (index, None),
            None => {
                let index = self
                    .slots
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, slot)| slot.voice.as_ref().map(|v| v.sequence))
                    .map(|(index, _)| index)
                    .unwrap_or(0);
                let evicted = self.slots[index].voice.take();
                if let Some(evicted) = evicted.as_ref() {
                    evicted.stop();
                    warn!(
                        max_voices = self.slots.len(),
                        stolen_pad = evicted.pad.get(),
                        "Voice limit reached, stealing oldest"
                    );
                }
                (index, evicted)
            }
        };

        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.voice = Some(voice);
        (VoiceId::new(index, slot.generation), evicted)
    }

    /// Stops the voice. Returns false if the id no longer refers to a live voice.
    pub fn stop(&mut self, id: VoiceId) -> bool {
        let Some(slot) = self.slots.get_mut(id.slot()) else {
            return false;
        };
        if slot.generation != id.generation() {
            return false;
        }
        match slot.voice.take() {
            Some(voice) => {
                voice.stop();
                true
            }
            None => false,
        }
    }

    /// Drops voices that have played out.
    pub fn reap(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.voice.as_ref().is_some_and(|v| v.is_finished()) {
                slot.voice = None;
            }
        }
    }

    /// Stops and removes every voice.
    pub fn clear(&mut self) -> usize {
        let mut stopped = 0;
        for slot in self.slots.iter_mut() {
            if let Some(voice) = slot.voice.take() {
                voice.stop();
                stopped += 1;
            }
        }
        stopped
    }

    /// Returns the current number of active voices.
    pub fn active_count(&mut self) -> usize {
        self.reap();
        self.slots.iter().filter(|slot| slot.voice.is_some()).count()
    }

    /// True if the id refers to a voice that is still playing.
    pub fn is_active(&mut self, id: VoiceId) -> bool {
        self.reap();
        self.slots
            .get(id.slot())
            .is_some_and(|slot| slot.generation == id.generation() && slot.voice.is_some())
    }

    /// Trigger order of a live voice.
    #[cfg(test)]
    pub fn sequence(&self, id: VoiceId) -> Option<u64> {
        let slot = self.slots.get(id.slot())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.voice.as_ref().map(|voice| voice.sequence)
    }
}

impl fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoicePool")
            .field(
                "active_voices",
                &self.slots.iter().filter(|s| s.voice.is_some()).count(),
            )
            .field("max_voices", &self.slots.len())
            .finish()
    }
}
