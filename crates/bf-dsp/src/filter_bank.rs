//! Frequency-domain FIR filter banks
//!
//! A bank is built once from a time-domain impulse-response table indexed by
//! `[entry][channel][tap]` and is immutable afterwards, so it can be shared
//! between the audio thread and the DOA worker behind an `Arc` without locking.

use serde::{Deserialize, Serialize};

use bf_core::{BfError, BfResult, Sample, try_zeroed};

use crate::spectral::SpectralTransform;

// ============ Impulse Response Table ============

/// Validated time-domain FIR table, `[entry][channel][tap]`
///
/// Every response is zero-padded to the longest one in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Vec<Sample>>>", into = "Vec<Vec<Vec<Sample>>>")]
pub struct ImpulseResponseTable {
    entries: Vec<Vec<Vec<Sample>>>,
    channels: usize,
    taps: usize,
}

impl ImpulseResponseTable {
    pub fn new(mut entries: Vec<Vec<Vec<Sample>>>) -> BfResult<Self> {
        let channels = match entries.first() {
            Some(first) if !first.is_empty() => first.len(),
            Some(_) => return Err(BfError::TableShape("entry 0 has no channels".into())),
            None => return Err(BfError::TableShape("table has no entries".into())),
        };

        if let Some((idx, entry)) = entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.len() != channels)
        {
            return Err(BfError::TableShape(format!(
                "entry {idx} has {} channels, expected {channels}",
                entry.len()
            )));
        }

        let taps = entries
            .iter()
            .flatten()
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        if taps == 0 {
            return Err(BfError::TableShape("impulse responses are empty".into()));
        }

        if entries.iter().flatten().flatten().any(|tap| !tap.is_finite()) {
            return Err(BfError::TableShape("non-finite filter tap".into()));
        }

        for response in entries.iter_mut().flatten() {
            response.resize(taps, 0.0);
        }

        Ok(Self {
            entries,
            channels,
            taps,
        })
    }

    #[inline]
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// FIR length in taps
    #[inline]
    pub fn taps(&self) -> usize {
        self.taps
    }

    #[inline]
    pub fn response(&self, entry: usize, channel: usize) -> &[Sample] {
        &self.entries[entry][channel]
    }
}

impl TryFrom<Vec<Vec<Vec<Sample>>>> for ImpulseResponseTable {
    type Error = BfError;

    fn try_from(entries: Vec<Vec<Vec<Sample>>>) -> BfResult<Self> {
        Self::new(entries)
    }
}

impl From<ImpulseResponseTable> for Vec<Vec<Vec<Sample>>> {
    fn from(table: ImpulseResponseTable) -> Self {
        table.entries
    }
}

// ============ FIR Filter Bank ============

/// Packed frequency-domain FIRs ready for multiply-accumulate
#[derive(Debug, Clone)]
pub struct FirFilterBank {
    /// Packed spectra, `[entry][channel][packed_len]` flattened
    spectra: Vec<Sample>,
    /// Source table, kept for time-domain readback
    table: ImpulseResponseTable,
    fft_size: usize,
    packed_len: usize,
}

impl FirFilterBank {
    /// Transform every response of `table` with `transform`
    pub fn build(transform: &mut SpectralTransform, table: ImpulseResponseTable) -> BfResult<Self> {
        let fft_size = transform.size();
        if table.taps() > fft_size {
            return Err(BfError::TableShape(format!(
                "{} taps do not fit a {fft_size}-point transform",
                table.taps()
            )));
        }

        let packed_len = transform.packed_len();
        let total = table.num_entries() * table.num_channels() * packed_len;
        let mut spectra = try_zeroed(total)?;

        for (slot, response) in spectra
            .chunks_exact_mut(packed_len)
            .zip(table.entries.iter().flatten())
        {
            transform.forward(response, slot);
        }

        log::debug!(
            "Built FIR bank: {} entries x {} channels, {} taps, {}-point FFT",
            table.num_entries(),
            table.num_channels(),
            table.taps(),
            fft_size
        );

        Ok(Self {
            spectra,
            table,
            fft_size,
            packed_len,
        })
    }

    /// Packed spectrum of `(index, channel)`
    #[inline]
    pub fn get(&self, index: usize, channel: usize) -> &[Sample] {
        assert!(
            index < self.num_entries() && channel < self.num_channels(),
            "filter ({index}, {channel}) out of range"
        );
        let start = (index * self.num_channels() + channel) * self.packed_len;
        &self.spectra[start..start + self.packed_len]
    }

    /// Stored time-domain taps of `(index, channel)`
    #[inline]
    pub fn impulse_response(&self, index: usize, channel: usize) -> &[Sample] {
        assert!(
            index < self.num_entries() && channel < self.num_channels(),
            "filter ({index}, {channel}) out of range"
        );
        self.table.response(index, channel)
    }

    #[inline]
    pub fn num_entries(&self) -> usize {
        self.table.num_entries()
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.table.num_channels()
    }

    #[inline]
    pub fn fir_len(&self) -> usize {
        self.table.taps()
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    #[inline]
    pub fn packed_len(&self) -> usize {
        self.packed_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ImpulseResponseTable {
        ImpulseResponseTable::new(vec![
            vec![vec![1.0, 0.5], vec![0.25]],
            vec![vec![0.0, 1.0], vec![0.0, 0.0, 2.0]],
        ])
        .unwrap()
    }

    #[test]
    fn test_table_padding() {
        let table = table();
        assert_eq!(table.taps(), 3);
        assert_eq!(table.response(0, 1), &[0.25, 0.0, 0.0]);
        assert_eq!(table.num_entries(), 2);
        assert_eq!(table.num_channels(), 2);
    }

    #[test]
    fn test_table_rejects_ragged_channels() {
        let result = ImpulseResponseTable::new(vec![vec![vec![1.0]], vec![vec![1.0], vec![1.0]]]);
        assert!(matches!(result, Err(BfError::TableShape(_))));
    }

    #[test]
    fn test_table_rejects_empty() {
        assert!(ImpulseResponseTable::new(vec![]).is_err());
        assert!(ImpulseResponseTable::new(vec![vec![]]).is_err());
        assert!(ImpulseResponseTable::new(vec![vec![vec![]]]).is_err());
        assert!(ImpulseResponseTable::new(vec![vec![vec![f32::NAN]]]).is_err());
    }

    #[test]
    fn test_table_json_validates() {
        let table: ImpulseResponseTable = serde_json::from_str("[[[1.0],[0.5, 0.5]]]").unwrap();
        assert_eq!(table.taps(), 2);
        assert!(serde_json::from_str::<ImpulseResponseTable>("[]").is_err());
    }

    #[test]
    fn test_bank_matches_direct_transform() {
        let mut transform = SpectralTransform::new(8);
        let bank = FirFilterBank::build(&mut transform, table()).unwrap();

        let mut expected = vec![0.0; 9];
        transform.forward(&[0.0, 0.0, 2.0], &mut expected);
        assert_eq!(bank.get(1, 1), expected.as_slice());
        assert_eq!(bank.impulse_response(1, 1), &[0.0, 0.0, 2.0]);
        assert_eq!(bank.fir_len(), 3);
    }

    #[test]
    fn test_bank_rejects_long_fir() {
        let mut transform = SpectralTransform::new(4);
        let long = ImpulseResponseTable::new(vec![vec![vec![1.0; 5]]]).unwrap();
        assert!(FirFilterBank::build(&mut transform, long).is_err());
    }

    #[test]
    #[should_panic]
    fn test_bank_out_of_range() {
        let mut transform = SpectralTransform::new(8);
        let bank = FirFilterBank::build(&mut transform, table()).unwrap();
        let _ = bank.get(2, 0);
    }
}
