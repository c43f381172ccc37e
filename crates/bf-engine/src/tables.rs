//! FIR table library
//!
//! Beam and DOA impulse responses are precomputed per microphone layout and
//! handed to the engine as immutable data. A [`FirLibrary`] supplies them on
//! `set_mic_config`; [`FirTableSet`] holds tables loaded from JSON, and
//! [`crate::DelayAndSumDesign`] generates them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bf_core::{BeamParameters, BfError, BfResult, MicArrayConfig};
use bf_dsp::ImpulseResponseTable;

// ============ Steering Grid ============

/// Discretization of the beam table
///
/// Entry index = `(iw * steer_y + iy) * steer_x + ix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteeringGrid {
    /// Horizontal steering positions
    pub steer_x: usize,
    /// Vertical steering positions (1 for linear arrays)
    pub steer_y: usize,
    /// Beam width steps
    pub widths: usize,
}

impl SteeringGrid {
    pub fn new(steer_x: usize, steer_y: usize, widths: usize) -> Self {
        Self {
            steer_x,
            steer_y,
            widths,
        }
    }

    /// Number of entries, saturating at `usize::MAX`
    #[inline]
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    /// Number of entries, or `None` when the dimensions overflow
    #[inline]
    pub fn checked_len(&self) -> Option<usize> {
        self.steer_x
            .checked_mul(self.steer_y)?
            .checked_mul(self.widths)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry index of grid coordinates
    #[inline]
    pub fn entry(&self, ix: usize, iy: usize, iw: usize) -> usize {
        assert!(
            ix < self.steer_x && iy < self.steer_y && iw < self.widths,
            "steering cell ({ix}, {iy}, {iw}) out of range"
        );
        (iw * self.steer_y + iy) * self.steer_x + ix
    }

    /// Nearest entry for a set of beam parameters
    pub fn index(&self, params: &BeamParameters) -> usize {
        let ix = nearest(params.steer_x.clamp(-1.0, 1.0) * 0.5 + 0.5, self.steer_x);
        let iy = nearest(params.steer_y.clamp(-1.0, 1.0) * 0.5 + 0.5, self.steer_y);
        let iw = nearest(params.width.clamp(0.0, 1.0), self.widths);
        self.entry(ix, iy, iw)
    }

    /// Normalized steering of entry coordinates, the inverse of [`index`](Self::index)
    pub fn steering(&self, ix: usize, iy: usize) -> (f32, f32) {
        (position(ix, self.steer_x) * 2.0 - 1.0, position(iy, self.steer_y) * 2.0 - 1.0)
    }

    /// Normalized width of a width step
    pub fn width(&self, iw: usize) -> f32 {
        position(iw, self.widths)
    }
}

/// Index nearest to `t` in [0, 1] over `count` points
#[inline]
fn nearest(t: f32, count: usize) -> usize {
    if count <= 1 {
        0
    } else {
        ((t * (count - 1) as f32).round() as usize).min(count - 1)
    }
}

#[inline]
fn position(idx: usize, count: usize) -> f32 {
    if count <= 1 {
        0.5
    } else {
        idx as f32 / (count - 1) as f32
    }
}

// ============ Tables ============

/// Beam and DOA impulse responses for one microphone layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirTables {
    pub grid: SteeringGrid,
    /// `[grid entry][mic][tap]`
    pub beam: ImpulseResponseTable,
    /// `[DOA cell][mic][tap]`, cells row-major
    pub doa: ImpulseResponseTable,
}

impl FirTables {
    /// Check the table dimensions against `config`
    pub fn validate_for(&self, config: MicArrayConfig) -> BfResult<()> {
        let mics = config.num_mics();
        for table in [&self.beam, &self.doa] {
            if table.num_channels() != mics {
                return Err(BfError::InvalidChannelCount {
                    expected: mics,
                    got: table.num_channels(),
                });
            }
        }

        let Some(grid_len) = self.grid.checked_len() else {
            return Err(BfError::TableShape(format!(
                "steering grid {}x{}x{} overflows",
                self.grid.steer_x, self.grid.steer_y, self.grid.widths
            )));
        };
        if grid_len != self.beam.num_entries() {
            return Err(BfError::TableShape(format!(
                "steering grid has {grid_len} cells but beam table has {} entries",
                self.beam.num_entries()
            )));
        }

        let cells = config.doa_grid().len();
        if self.doa.num_entries() != cells {
            return Err(BfError::TableShape(format!(
                "{config:?} needs {cells} DOA entries, table has {}",
                self.doa.num_entries()
            )));
        }

        Ok(())
    }

    /// Longest response across both tables
    pub fn max_fir_len(&self) -> usize {
        self.beam.taps().max(self.doa.taps())
    }
}

/// Source of FIR tables per microphone layout
pub trait FirLibrary: Send + Sync {
    fn tables(&self, config: MicArrayConfig) -> BfResult<Arc<FirTables>>;
}

// ============ Table Set ============

#[derive(Serialize, Deserialize)]
struct LayoutTables {
    layout: MicArrayConfig,
    tables: FirTables,
}

#[derive(Serialize, Deserialize)]
struct TableFile {
    layouts: Vec<LayoutTables>,
}

/// Tables keyed by layout
#[derive(Debug, Clone, Default)]
pub struct FirTableSet {
    tables: HashMap<MicArrayConfig, Arc<FirTables>>,
}

impl FirTableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the tables for `config`
    pub fn insert(&mut self, config: MicArrayConfig, tables: FirTables) -> BfResult<()> {
        tables.validate_for(config)?;
        self.tables.insert(config, Arc::new(tables));
        Ok(())
    }

    pub fn layouts(&self) -> impl Iterator<Item = MicArrayConfig> + '_ {
        self.tables.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Parse a `{ "layouts": [{ "layout": .., "tables": .. }] }` document
    pub fn from_json_str(json: &str) -> BfResult<Self> {
        let file: TableFile =
            serde_json::from_str(json).map_err(|e| BfError::Serialization(e.to_string()))?;

        let mut set = Self::new();
        for entry in file.layouts {
            set.insert(entry.layout, entry.tables)?;
        }
        Ok(set)
    }

    /// Load tables from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> BfResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let set = Self::from_json_str(&json)?;
        log::info!("Loaded FIR tables for {} layouts from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn to_json_string(&self) -> BfResult<String> {
        let mut layouts: Vec<LayoutTables> = self
            .tables
            .iter()
            .map(|(&layout, tables)| LayoutTables {
                layout,
                tables: FirTables::clone(tables),
            })
            .collect();
        layouts.sort_by_key(|entry| MicArrayConfig::ALL.iter().position(|&c| c == entry.layout));

        serde_json::to_string(&TableFile { layouts })
            .map_err(|e| BfError::Serialization(e.to_string()))
    }
}

impl FirLibrary for FirTableSet {
    fn tables(&self, config: MicArrayConfig) -> BfResult<Arc<FirTables>> {
        self.tables
            .get(&config)
            .cloned()
            .ok_or(BfError::UnsupportedLayout(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tables(config: MicArrayConfig, grid: SteeringGrid) -> FirTables {
        let mics = config.num_mics();
        let entry = |n: usize| ImpulseResponseTable::new(vec![vec![vec![1.0]; mics]; n]).unwrap();
        FirTables {
            grid,
            beam: entry(grid.len()),
            doa: entry(config.doa_grid().len()),
        }
    }

    #[test]
    fn test_grid_index_layout() {
        let grid = SteeringGrid::new(5, 3, 2);
        assert_eq!(grid.len(), 30);
        assert_eq!(grid.entry(0, 0, 0), 0);
        assert_eq!(grid.entry(4, 0, 0), 4);
        assert_eq!(grid.entry(0, 1, 0), 5);
        assert_eq!(grid.entry(0, 0, 1), 15);
        assert_eq!(grid.entry(4, 2, 1), 29);
    }

    #[test]
    fn test_grid_nearest() {
        let grid = SteeringGrid::new(5, 1, 3);
        assert_eq!(grid.index(&BeamParameters::new(-1.0, 0.0)), 0);
        assert_eq!(grid.index(&BeamParameters::new(0.0, 0.0)), 2);
        assert_eq!(grid.index(&BeamParameters::new(0.45, 0.0)), 3);
        assert_eq!(grid.index(&BeamParameters::new(1.0, 1.0)), 14);
        assert_eq!(grid.index(&BeamParameters::new(0.0, 0.5)), 7);
        // Vertical steering has no effect on a single row
        assert_eq!(grid.index(&BeamParameters::new(0.0, 0.0).with_steer_y(1.0)), 2);
    }

    #[test]
    fn test_grid_steering_inverse() {
        let grid = SteeringGrid::new(9, 3, 4);
        for ix in 0..9 {
            for iy in 0..3 {
                for iw in 0..4 {
                    let (x, y) = grid.steering(ix, iy);
                    let params = BeamParameters::new(x, grid.width(iw)).with_steer_y(y);
                    assert_eq!(grid.index(&params), grid.entry(ix, iy, iw));
                }
            }
        }
    }

    #[test]
    fn test_set_lookup() {
        let mut set = FirTableSet::new();
        let tables = unit_tables(MicArrayConfig::Ula1, SteeringGrid::new(3, 1, 1));
        set.insert(MicArrayConfig::Ula1, tables).unwrap();
        assert!(set.tables(MicArrayConfig::Ula1).is_ok());
        assert!(matches!(
            set.tables(MicArrayConfig::Ura2),
            Err(BfError::UnsupportedLayout(MicArrayConfig::Ura2))
        ));
    }

    #[test]
    fn test_insert_rejects_mismatch() {
        let mut set = FirTableSet::new();
        let tables = unit_tables(MicArrayConfig::Ula1, SteeringGrid::new(3, 1, 1));
        assert!(matches!(
            set.insert(MicArrayConfig::Ula2, tables.clone()),
            Err(BfError::InvalidChannelCount { expected: 32, got: 16 })
        ));

        let mut bad_grid = tables;
        bad_grid.grid = SteeringGrid::new(4, 1, 1);
        assert!(matches!(
            set.insert(MicArrayConfig::Ula1, bad_grid),
            Err(BfError::TableShape(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let mut set = FirTableSet::new();
        let tables = unit_tables(MicArrayConfig::Ula1, SteeringGrid::new(2, 1, 2));
        set.insert(MicArrayConfig::Ula1, tables.clone()).unwrap();

        let json = set.to_json_string().unwrap();
        let loaded = FirTableSet::from_json_str(&json).unwrap();
        assert_eq!(*loaded.tables(MicArrayConfig::Ula1).unwrap(), tables);
    }

    #[test]
    fn test_overflowing_grid_rejected() {
        let grid = SteeringGrid::new(usize::MAX, 2, 2);
        assert_eq!(grid.checked_len(), None);
        assert_eq!(grid.len(), usize::MAX);

        let mut set = FirTableSet::new();
        let tables = unit_tables(MicArrayConfig::Ula1, SteeringGrid::new(2, 1, 2));
        set.insert(MicArrayConfig::Ula1, tables).unwrap();
        let json = set.to_json_string().unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        doc["layouts"][0]["tables"]["grid"] =
            serde_json::json!({ "steer_x": usize::MAX, "steer_y": 2, "widths": 2 });

        assert!(matches!(
            FirTableSet::from_json_str(&doc.to_string()),
            Err(BfError::TableShape(_))
        ));
    }
}
