//! Microphone array layouts
//!
//! Arrays are built from identical linear sticks of [`MICS_PER_STICK`]
//! microphones. Sticks are either placed side by side (a longer linear array)
//! or stacked vertically (a rectangular array with an elevation axis).

use serde::{Deserialize, Serialize};

/// Microphones on a single stick
pub const MICS_PER_STICK: usize = 16;

/// Horizontal distance between adjacent microphones on a stick [m]
pub const MIC_SPACING_M: f32 = 0.03;

/// Vertical distance between stacked sticks [m]
pub const STICK_SPACING_M: f32 = 0.04;

/// DOA grid columns (azimuth cells)
pub const DOA_COLUMNS: usize = 25;

/// DOA grid rows for layouts with an elevation axis
pub const DOA_ROWS: usize = 7;

/// Physical microphone array layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MicArrayConfig {
    /// Single stick
    #[default]
    Ula1,
    /// Two sticks side by side
    Ula2,
    /// Three sticks side by side
    Ula3,
    /// Four sticks side by side
    Ula4,
    /// Two sticks stacked vertically
    Ura2,
    /// Three sticks stacked vertically
    Ura3,
    /// Four sticks stacked vertically
    Ura4,
    /// Two columns of two stacked sticks
    Ura2x2,
}

impl MicArrayConfig {
    pub const ALL: [MicArrayConfig; 8] = [
        Self::Ula1,
        Self::Ula2,
        Self::Ula3,
        Self::Ula4,
        Self::Ura2,
        Self::Ura3,
        Self::Ura4,
        Self::Ura2x2,
    ];

    /// Sticks placed side by side (horizontal extent)
    #[inline]
    pub fn columns(self) -> usize {
        match self {
            Self::Ula1 | Self::Ura2 | Self::Ura3 | Self::Ura4 => 1,
            Self::Ula2 | Self::Ura2x2 => 2,
            Self::Ula3 => 3,
            Self::Ula4 => 4,
        }
    }

    /// Sticks stacked vertically
    #[inline]
    pub fn rows(self) -> usize {
        match self {
            Self::Ula1 | Self::Ula2 | Self::Ula3 | Self::Ula4 => 1,
            Self::Ura2 | Self::Ura2x2 => 2,
            Self::Ura3 => 3,
            Self::Ura4 => 4,
        }
    }

    #[inline]
    pub fn num_sticks(self) -> usize {
        self.columns() * self.rows()
    }

    /// Number of microphone channels
    #[inline]
    pub fn num_mics(self) -> usize {
        self.num_sticks() * MICS_PER_STICK
    }

    /// Linear arrays cannot resolve elevation
    #[inline]
    pub fn is_linear(self) -> bool {
        self.rows() == 1
    }

    /// DOA grid for this layout
    pub fn doa_grid(self) -> DoaGrid {
        DoaGrid {
            columns: DOA_COLUMNS,
            rows: if self.is_linear() { 1 } else { DOA_ROWS },
        }
    }

    /// Planar (x, y) position of each channel in metres, centred on the array
    ///
    /// Channel order: stick by stick (row-major over sticks), microphones left
    /// to right within a stick.
    pub fn mic_positions(self) -> Vec<(f32, f32)> {
        let columns = self.columns();
        let rows = self.rows();
        let mics_wide = columns * MICS_PER_STICK;
        let x_center = (mics_wide as f32 - 1.0) * 0.5;
        let y_center = (rows as f32 - 1.0) * 0.5;

        let mut positions = Vec::with_capacity(self.num_mics());
        for row in 0..rows {
            for column in 0..columns {
                for mic in 0..MICS_PER_STICK {
                    let x_idx = (column * MICS_PER_STICK + mic) as f32;
                    positions.push((
                        (x_idx - x_center) * MIC_SPACING_M,
                        (y_center - row as f32) * STICK_SPACING_M,
                    ));
                }
            }
        }
        positions
    }
}

/// Direction-of-arrival grid dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoaGrid {
    /// Horizontal cells
    pub columns: usize,
    /// Vertical cells (1 for linear arrays)
    pub rows: usize,
}

impl DoaGrid {
    #[inline]
    pub fn len(&self) -> usize {
        self.columns * self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Profile index of a cell (row-major)
    #[inline]
    pub fn index(&self, column: usize, row: usize) -> usize {
        assert!(column < self.columns && row < self.rows, "DOA cell out of range");
        row * self.columns + column
    }

    /// Normalized steering coordinates in [-1, 1] of a cell
    pub fn direction(&self, index: usize) -> (f32, f32) {
        assert!(index < self.len(), "DOA index out of range");
        let column = index % self.columns;
        let row = index / self.columns;
        (normalized(column, self.columns), normalized(row, self.rows))
    }
}

fn normalized(idx: usize, count: usize) -> f32 {
    if count <= 1 {
        0.0
    } else {
        -1.0 + 2.0 * idx as f32 / (count - 1) as f32
    }
}
