// Claxon -- A FLAC decoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Partitioned-Rice residual decoding.

use std::io;

use crate::bitstream::BitReader;
use crate::error::{Error, Result};

/// Maps an unsigned Rice-coded value back to its signed residual.
///
/// Rice coding stores a signed value `v` as the unsigned `zigzag(v)`, where
/// positive values map to even numbers and negative values to odd numbers:
/// `0, -1, 1, -2, 2, -3, 3, ...` maps to `0, 1, 2, 3, 4, 5, 6, ...`.
fn rice_unsigned_to_signed(value: u32) -> i64 {
    if value & 1 == 0 {
        (value >> 1) as i64
    } else {
        -((value >> 1) as i64) - 1
    }
}

/// Reads one Rice-coded residual value with the given parameter.
fn read_rice_value<R: io::Read>(bits: &mut BitReader<R>, param: u32) -> Result<i64> {
    let quotient = bits.read_unary()?;
    let remainder = if param > 0 { bits.read_uint(param)? } else { 0 };
    let folded = (quotient << param) | remainder;
    Ok(rice_unsigned_to_signed(folded))
}

/// Decodes a full partitioned-Rice residual of `block_size - predictor_order`
/// values into `out`, which must already have that length.
///
/// `predictor_order` is needed because the first partition carries
/// `partition_size - predictor_order` residual values rather than the full
/// partition size (the warmup samples "use up" part of partition zero).
pub fn decode_residual<R: io::Read>(
    bits: &mut BitReader<R>,
    block_size: u32,
    predictor_order: u32,
    out: &mut Vec<i64>,
) -> Result<()> {
    out.clear();

    let coding_method = bits.read_uint(2)?;
    if coding_method > 1 {
        return Err(Error::Unparseable {
            bit_offset: bits.bits_read(),
            reason: "reserved residual coding method".to_string(),
        });
    }
    // Method 0 uses a 4-bit Rice parameter, method 1 uses a 5-bit parameter
    // and reserves the all-ones value as an escape code for raw binary.
    let param_bits = if coding_method == 0 { 4 } else { 5 };
    let escape_param = (1u32 << param_bits) - 1;

    let partition_order = bits.read_uint(4)?;
    let partition_count = 1u32 << partition_order;

    if partition_order > 0 && block_size % partition_count != 0 {
        return Err(Error::Unparseable {
            bit_offset: bits.bits_read(),
            reason: "block size is not divisible by the partition count".to_string(),
        });
    }

    let partition_size = block_size / partition_count;
    if predictor_order > partition_size {
        return Err(Error::Unparseable {
            bit_offset: bits.bits_read(),
            reason: "predictor order exceeds the first partition's size".to_string(),
        });
    }

    out.reserve((block_size - predictor_order) as usize);

    for partition in 0..partition_count {
        let values_in_partition = if partition == 0 {
            partition_size - predictor_order
        } else {
            partition_size
        };

        let param = bits.read_uint(param_bits)?;

        if param == escape_param {
            // Escape code: values are stored as raw binary with an explicit
            // per-partition bit width.
            let raw_bits = bits.read_uint(5)?;
            for _ in 0..values_in_partition {
                let raw = bits.read_int(raw_bits)?;
                out.push(raw as i64);
            }
        } else {
            for _ in 0..values_in_partition {
                out.push(read_rice_value(bits, param)?);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{decode_residual, rice_unsigned_to_signed};
    use crate::bitstream::BitReader;
    use crate::error::Error;
    use std::io::Cursor;

    #[test]
    fn zigzag_mapping_matches_spec_sequence() {
        let expected = [0i64, -1, 1, -2, 2, -3, 3];
        for (i, &want) in expected.iter().enumerate() {
            assert_eq!(rice_unsigned_to_signed(i as u32), want);
        }
    }

    #[test]
    fn zigzag_mapping_handles_extremes() {
        assert_eq!(rice_unsigned_to_signed(u32::MAX), -2147483648);
        assert_eq!(rice_unsigned_to_signed(0), 0);
    }

    #[test]
    fn predictor_order_above_block_size_with_single_partition_is_rejected() {
        // partition_order = 0000 (one partition), coding method 0, param 0000.
        let data = vec![0b0000_0000u8, 0, 0, 0];
        let mut bits = BitReader::new(Cursor::new(data));
        let mut out = Vec::new();
        let result = decode_residual(&mut bits, 16, 32, &mut out);
        assert!(matches!(result, Err(Error::Unparseable { .. })));
    }
}
