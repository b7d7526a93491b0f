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

//! Pad identifiers and the pad grid they index into.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of pad rows.
pub const DEFAULT_ROWS: u16 = 4;

/// Default number of pad columns.
pub const DEFAULT_COLUMNS: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PadError {
    #[error("pad {pad} is outside of the grid (0..{pads})")]
    OutOfRange { pad: u16, pads: usize },
}

/// A logical pad slot. Whether a pad identifier is valid depends on the grid
/// it is used against, so every component checks it with [`PadGrid::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PadId(u16);

impl PadId {
    pub const fn new(pad: u16) -> PadId {
        PadId(pad)
    }

    pub fn get(&self) -> u16 {
        self.0
    }
}

impl From<u16> for PadId {
    fn from(pad: u16) -> Self {
        PadId(pad)
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed grid of pads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PadGrid {
    rows: u16,
    columns: u16,
}

impl Default for PadGrid {
    fn default() -> Self {
        PadGrid {
            rows: DEFAULT_ROWS,
            columns: DEFAULT_COLUMNS,
        }
    }
}

impl PadGrid {
    pub fn new(rows: u16, columns: u16) -> PadGrid {
        PadGrid { rows, columns }
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    /// The total number of pads on the grid.
    pub fn len(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves the pad to a storage index, rejecting anything off the grid.
    pub fn index(&self, pad: PadId) -> Result<usize, PadError> {
        let index = pad.0 as usize;
        if index < self.len() {
            Ok(index)
        } else {
            Err(PadError::OutOfRange {
                pad: pad.0,
                pads: self.len(),
            })
        }
    }

    /// Iterates every pad on the grid in order.
    pub fn pads(&self) -> impl Iterator<Item = PadId> {
        (0..self.len() as u16).map(PadId)
    }

    /// Returns the (row, column) position of the pad.
    pub fn position(&self, pad: PadId) -> Result<(u16, u16), PadError> {
        let index = self.index(pad)? as u16;
        Ok((index / self.columns, index % self.columns))
    }
}
