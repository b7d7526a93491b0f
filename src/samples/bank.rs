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
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, info, span, Level};

use super::error::LoadError;
use super::loader::{LoadedSample, SampleData};
use crate::pad::{PadGrid, PadId};

/// Holds at most one decoded sample per pad.
///
/// Decoding happens outside of the lock. The lock is only taken to swap a
/// slot or to clone a sample handle out of it, so triggers never wait on a
/// load in progress.
pub struct SampleBank {
    grid: PadGrid,
    /// Samples are converted to this rate on load.
    sample_rate: u32,
    slots: RwLock<Vec<Option<LoadedSample>>>,
}

impl SampleBank {
    pub fn new(grid: PadGrid, sample_rate: u32) -> SampleBank {
        SampleBank {
            grid,
            sample_rate,
            slots: RwLock::new(vec![None; grid.len()]),
        }
    }

    pub fn grid(&self) -> PadGrid {
        self.grid
    }

    /// Decodes the data and registers it on the pad. Whatever was loaded on the
    /// pad before stays in place if decoding fails.
    pub fn load(&self, pad: PadId, data: SampleData) -> Result<LoadedSample, LoadError> {
        let index = self.grid.index(pad)?;
        let span = span!(Level::INFO, "load sample", pad = pad.get());
        let _enter = span.enter();

        let sample = LoadedSample::decode(data, self.sample_rate)?;
        let previous = self.slots.write()[index].replace(sample.clone());
        if previous.is_some() {
            debug!("Replaced previously loaded sample");
        }

        Ok(sample)
    }

    /// Reads and loads an audio file.
    pub fn load_file(&self, pad: PadId, path: &Path) -> Result<LoadedSample, LoadError> {
        self.grid.index(pad)?;
        info!(pad = pad.get(), path = %path.display(), "Loading sample file");
        self.load(pad, SampleData::from_file(path)?)
    }

    /// Removes the sample from the pad. Voices already playing it keep their
    /// own handle and finish normally.
    pub fn unload(&self, pad: PadId) -> Result<(), LoadError> {
        let index = self.grid.index(pad)?;
        if self.slots.write()[index].take().is_some() {
            debug!(pad = pad.get(), "Unloaded sample");
        }
        Ok(())
    }

    /// Gets the sample loaded on the pad, if any.
    pub fn get(&self, pad: PadId) -> Result<Option<LoadedSample>, LoadError> {
        let index = self.grid.index(pad)?;
        Ok(self.slots.read()[index].clone())
    }

    /// Pads that currently have a sample.
    pub fn loaded_pads(&self) -> Vec<PadId> {
        let slots = self.slots.read();
        self.grid
            .pads()
            .zip(slots.iter())
            .filter(|(_, slot)| slot.is_some())
            .map(|(pad, _)| pad)
            .collect()
    }

    /// Bytes of decoded audio held by the bank.
    pub fn memory_usage(&self) -> usize {
        self.slots
            .read()
            .iter()
            .flatten()
            .map(|sample| sample.memory_size())
            .sum()
    }

    pub fn unload_all(&self) {
        let mut slots = self.slots.write();
        let count = slots.iter().filter(|slot| slot.is_some()).count();
        slots.iter_mut().for_each(|slot| *slot = None);
        if count > 0 {
            info!(count, "Unloaded all samples");
        }
    }

    /// Releases everything the bank holds. The bank can still be loaded again.
    pub fn release(&self) {
        self.unload_all();
    }
}
