//! Non-uniform mapping between signed 16-bit values and 8-bit codes.
//!
//! A [`MappingTable`] holds 128 non-decreasing magnitudes. An 8-bit code is read as a two's
//! complement `i8`; its magnitude indexes the table and its sign is applied to the entry, so
//! code `0` is the value `0` and small codes are small values. Tables produced by
//! [`MappingTable::for_quality`] are dense near zero and sparse towards the extremes.
//!
//! # Serialized form
//!
//! ```plain
//! .- mapping table -------------------------------------------------.
//! | u8 n | n × u8 (entries 0..n) | (128 - n) × u16le (entries n..128) |
//! `-----------------------------------------------------------------`
//! ```
//!
//! The encoder stores the leading entries that fit into one byte as single bytes.

use byteorder::{ByteOrder, LittleEndian};
use snafu::{ensure, OptionExt, Snafu};

/// Number of entries in a mapping table.
pub const MAPPING_TABLE_LEN: usize = 128;

#[derive(Debug, Snafu)]
pub enum MappingError {
    #[snafu(display("mapping table is empty"))]
    Empty,
    #[snafu(display("mapping table claims {count} single-byte entries"))]
    InvalidSingleByteCount { count: usize },
    #[snafu(display("mapping table should be {expected} bytes, got {actual}"))]
    InvalidSize { expected: usize, actual: usize },
    #[snafu(display("mapping table must start at 0, starts at {first}"))]
    NonZeroOrigin { first: u16 },
    #[snafu(display("mapping table decreases at entry {index}"))]
    NonMonotonic { index: usize },
    #[snafu(display("mapping table entry {index} ({value}) exceeds the 16-bit signed range"))]
    OutOfRange { index: usize, value: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    table: [u16; MAPPING_TABLE_LEN],
}

impl MappingTable {
    /// Validates and wraps a table.
    pub fn from_entries(table: [u16; MAPPING_TABLE_LEN]) -> Result<Self, MappingError> {
        ensure!(table[0] == 0, NonZeroOriginSnafu { first: table[0] });

        for (index, pair) in table.windows(2).enumerate() {
            ensure!(pair[0] <= pair[1], NonMonotonicSnafu { index: index + 1 });
        }

        let last = MAPPING_TABLE_LEN - 1;
        ensure!(
            table[last] <= i16::MAX as u16,
            OutOfRangeSnafu {
                index: last,
                value: table[last],
            }
        );

        Ok(Self { table })
    }

    /// Derives a table for `quality` (0..=100) covering magnitudes up to `max_value`.
    ///
    /// With `max_value` of at most 127 the table is the identity, saturating at `max_value`.
    /// Otherwise entry `i` is `i + (max_value - 127) * (i / 127)^γ` with
    /// `γ = 2 + 2 * (100 - quality) / 100`: steps of one near zero growing towards the top,
    /// faster at lower quality.
    pub fn for_quality(quality: u8, max_value: u16) -> Self {
        let quality = quality.min(100);
        let max_value = max_value.min(i16::MAX as u16);
        let last = (MAPPING_TABLE_LEN - 1) as u16;

        let mut table = [0; MAPPING_TABLE_LEN];
        if max_value <= last {
            for (i, entry) in (0u16..).zip(table.iter_mut()) {
                *entry = i.min(max_value);
            }
        } else {
            let gamma = 2.0 + 2.0 * f64::from(100 - quality) / 100.0;
            let span = f64::from(max_value - last);
            for (i, entry) in (0u16..).zip(table.iter_mut()) {
                let t = f64::from(i) / f64::from(last);
                *entry = (f64::from(i) + span * t.powf(gamma)).round() as u16;
            }
        }

        Self { table }
    }

    /// Table for the low-res prediction residuals, which span `-255..=255`.
    pub fn low_res_for_quality(quality: u8) -> Self {
        Self::for_quality(quality, 255)
    }

    /// Table for full-res residuals quantized with steps of at least `min_step`.
    pub fn full_res_for_quality(quality: u8, min_step: u8) -> Self {
        let min_step = u16::from(min_step.max(1));
        Self::for_quality(quality, (255 + min_step - 1) / min_step)
    }

    pub fn entries(&self) -> &[u16; MAPPING_TABLE_LEN] {
        &self.table
    }

    fn single_byte_items(&self) -> usize {
        self.table.iter().take_while(|&&e| e < 256).count()
    }

    /// Size of the serialized table, in bytes.
    pub fn size_in_bytes(&self) -> usize {
        let n = self.single_byte_items();
        1 + n + 2 * (MAPPING_TABLE_LEN - n)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        let n = self.single_byte_items();
        out.reserve(self.size_in_bytes());

        out.push(n as u8);
        out.extend(self.table[..n].iter().map(|&e| e as u8));
        for &entry in &self.table[n..] {
            out.extend_from_slice(&entry.to_le_bytes());
        }
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, MappingError> {
        let (&n, rest) = data.split_first().context(EmptySnafu)?;

        let n = usize::from(n);
        ensure!(
            n <= MAPPING_TABLE_LEN,
            InvalidSingleByteCountSnafu { count: n }
        );

        let expected = 1 + n + 2 * (MAPPING_TABLE_LEN - n);
        ensure!(
            data.len() == expected,
            InvalidSizeSnafu {
                expected,
                actual: data.len(),
            }
        );

        let (single, double) = rest.split_at(n);
        let mut table = [0; MAPPING_TABLE_LEN];
        for (entry, &byte) in table.iter_mut().zip(single) {
            *entry = u16::from(byte);
        }
        for (entry, bytes) in table[n..].iter_mut().zip(double.chunks_exact(2)) {
            *entry = LittleEndian::read_u16(bytes);
        }

        Self::from_entries(table)
    }

    /// Maps `x` to the code of the nearest representable value.
    ///
    /// Ties go to the smaller magnitude; magnitudes beyond the last entry saturate.
    pub fn map_to_8bit(&self, x: i16) -> u8 {
        let magnitude = x.unsigned_abs();
        let index = match self.table.binary_search(&magnitude) {
            Ok(index) => index,
            Err(0) => 0,
            Err(MAPPING_TABLE_LEN) => MAPPING_TABLE_LEN - 1,
            Err(above) => {
                let below = above - 1;
                if magnitude - self.table[below] <= self.table[above] - magnitude {
                    below
                } else {
                    above
                }
            }
        };

        let code = index as i8;
        if x < 0 {
            code.wrapping_neg() as u8
        } else {
            code as u8
        }
    }

    #[inline]
    pub fn unmap_from_8bit(&self, code: u8) -> i16 {
        let code = code as i8;
        let index = usize::from(code.unsigned_abs()).min(MAPPING_TABLE_LEN - 1);
        // entries are validated to fit into an i16
        let magnitude = self.table[index] as i16;
        if code < 0 {
            -magnitude
        } else {
            magnitude
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nearest_distance(table: &MappingTable, x: i16) -> u16 {
        let magnitude = x.unsigned_abs();
        table
            .entries()
            .iter()
            .map(|&e| e.abs_diff(magnitude))
            .min()
            .unwrap()
    }

    #[test]
    fn quality_tables_are_valid() {
        for quality in [0, 10, 50, 75, 90, 100] {
            for max in [1, 64, 127, 128, 255, 1000, 40000] {
                let table = MappingTable::for_quality(quality, max);
                let validated = MappingTable::from_entries(*table.entries()).unwrap();
                assert_eq!(validated, table);
                assert_eq!(table.entries()[127], max.min(i16::MAX as u16));
            }
        }
    }

    #[test]
    fn finer_near_zero() {
        let table = MappingTable::low_res_for_quality(50);
        let e = table.entries();
        assert_eq!(&e[..4], &[0, 1, 2, 3]);
        assert!(e[127] - e[126] > e[1] - e[0]);
    }

    #[test]
    fn map_picks_nearest_entry() {
        let table = MappingTable::full_res_for_quality(30, 1);
        for x in i16::MIN..=i16::MAX {
            let code = table.map_to_8bit(x);
            let y = table.unmap_from_8bit(code);
            assert_eq!(
                y.unsigned_abs().abs_diff(x.unsigned_abs()),
                nearest_distance(&table, x),
                "{x} -> {code} -> {y}"
            );
            assert!(y == 0 || (y < 0) == (x < 0));
        }
    }

    #[test]
    fn codes_are_stable() {
        let table = MappingTable::low_res_for_quality(80);
        assert_eq!(table.map_to_8bit(0), 0);
        assert_eq!(table.unmap_from_8bit(0), 0);
        assert_eq!(table.map_to_8bit(-1), 0xff);
        assert_eq!(table.unmap_from_8bit(0xff), -1);

        for code in 0..=255u8 {
            let value = table.unmap_from_8bit(code);
            assert_eq!(table.unmap_from_8bit(table.map_to_8bit(value)), value);
        }
    }

    #[test]
    fn serialize_roundtrip() {
        for table in [
            MappingTable::low_res_for_quality(0),
            MappingTable::full_res_for_quality(100, 4),
            MappingTable::for_quality(70, 20000),
        ] {
            let mut out = vec![];
            table.serialize(&mut out);
            assert_eq!(out.len(), table.size_in_bytes());
            assert_eq!(MappingTable::deserialize(&out).unwrap(), table);
        }
    }

    #[test]
    fn deserialize_rejects_malformed() {
        let mut out = vec![];
        MappingTable::low_res_for_quality(50).serialize(&mut out);

        assert!(matches!(
            MappingTable::deserialize(&[]),
            Err(MappingError::Empty)
        ));
        assert!(matches!(
            MappingTable::deserialize(&out[..out.len() - 1]),
            Err(MappingError::InvalidSize { .. })
        ));

        let mut bad = out.clone();
        bad[0] = 200;
        assert!(matches!(
            MappingTable::deserialize(&bad),
            Err(MappingError::InvalidSingleByteCount { count: 200 })
        ));

        let mut bad = out.clone();
        bad[1] = 1;
        assert!(matches!(
            MappingTable::deserialize(&bad),
            Err(MappingError::NonZeroOrigin { first: 1 })
        ));

        let mut bad = out.clone();
        bad[11] = 0;
        assert!(matches!(
            MappingTable::deserialize(&bad),
            Err(MappingError::NonMonotonic { index: 10 })
        ));

        let mut entries = [0u16; MAPPING_TABLE_LEN];
        entries[127] = 40000;
        assert!(matches!(
            MappingTable::from_entries(entries),
            Err(MappingError::OutOfRange { index: 127, .. })
        ));
    }
}
