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

//! The `subframe` module decodes the individual channel subframes that make
//! up a frame of the FLAC stream.

use std::io;

use crate::bitstream::BitReader;
use crate::error::{Error, Result};
use crate::predictor;
use crate::rice;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SubframeType {
    Constant,
    Verbatim,
    Fixed(u32),
    Lpc(u32),
}

#[derive(Copy, Clone)]
struct SubframeHeader {
    sf_type: SubframeType,
    wasted_bits: u32,
}

fn read_subframe_header<R: io::Read>(bits: &mut BitReader<R>) -> Result<SubframeHeader> {
    // The first bit must be a 0 padding bit.
    if bits.read_uint(1)? != 0 {
        return Err(Error::Unparseable {
            bit_offset: bits.bits_read(),
            reason: "subframe header is missing its zero padding bit".to_string(),
        });
    }

    let type_bits = bits.read_uint(6)?;
    let sf_type = match type_bits {
        0 => SubframeType::Constant,
        1 => SubframeType::Verbatim,

        // Bit patterns 00001x, 0001xx and 01xxxx are reserved.
        n if (n & 0b111_110 == 0b000_010)
            || (n & 0b111_100 == 0b000_100)
            || (n & 0b110_000 == 0b010_000) =>
        {
            return Err(Error::Unparseable {
                bit_offset: bits.bits_read(),
                reason: "reserved subframe type".to_string(),
            });
        }

        n if n & 0b111_000 == 0b001_000 => {
            let order = n & 0b000_111;
            if order > 4 {
                return Err(Error::Unparseable {
                    bit_offset: bits.bits_read(),
                    reason: "fixed predictor order above 4".to_string(),
                });
            }
            SubframeType::Fixed(order)
        }

        // The only possibility left is bit pattern 1xxxxx, an LPC subframe;
        // the xxxxx bits are the order minus one.
        n => SubframeType::Lpc((n & 0b011_111) + 1),
    };

    let wastes_bits = bits.read_uint(1)? == 1;
    let wasted_bits = if !wastes_bits {
        0
    } else {
        1 + bits.read_unary()?
    };

    Ok(SubframeHeader {
        sf_type,
        wasted_bits,
    })
}

/// Decodes one subframe (one channel's worth of samples for the block) into
/// a freshly allocated `i32` sample buffer.
pub fn decode_subframe<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u32,
    block_size: u32,
) -> Result<Vec<i32>> {
    let header = read_subframe_header(bits)?;
    let effective_bps = bps - header.wasted_bits;

    let mut samples = match header.sf_type {
        SubframeType::Constant => decode_constant(bits, effective_bps, block_size)?,
        SubframeType::Verbatim => decode_verbatim(bits, effective_bps, block_size)?,
        SubframeType::Fixed(order) => decode_fixed(bits, effective_bps, order, block_size)?,
        SubframeType::Lpc(order) => decode_lpc(bits, effective_bps, order, block_size)?,
    };

    if header.wasted_bits > 0 {
        for s in samples.iter_mut() {
            *s <<= header.wasted_bits;
        }
    }

    Ok(samples)
}

fn decode_constant<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u32,
    block_size: u32,
) -> Result<Vec<i32>> {
    let value = bits.read_int(bps)?;
    Ok(vec![value; block_size as usize])
}

fn decode_verbatim<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u32,
    block_size: u32,
) -> Result<Vec<i32>> {
    let mut samples = Vec::with_capacity(block_size as usize);
    for _ in 0..block_size {
        samples.push(bits.read_int(bps)?);
    }
    Ok(samples)
}

fn read_warmup<R: io::Read>(bits: &mut BitReader<R>, bps: u32, order: u32) -> Result<Vec<i64>> {
    let mut warmup = Vec::with_capacity(order as usize);
    for _ in 0..order {
        warmup.push(bits.read_int(bps)? as i64);
    }
    Ok(warmup)
}

fn decode_fixed<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u32,
    order: u32,
    block_size: u32,
) -> Result<Vec<i32>> {
    let mut buffer = read_warmup(bits, bps, order)?;

    let mut residual = Vec::new();
    rice::decode_residual(bits, block_size, order, &mut residual)?;
    buffer.extend(residual);

    predictor::predict_fixed(order, &mut buffer).map_err(|e| e.at_bit_offset(bits.bits_read()))?;

    Ok(buffer.into_iter().map(|s| s as i32).collect())
}

fn decode_lpc<R: io::Read>(
    bits: &mut BitReader<R>,
    bps: u32,
    order: u32,
    block_size: u32,
) -> Result<Vec<i32>> {
    let mut buffer = read_warmup(bits, bps, order)?;

    let qlp_precision = bits.read_uint(4)? + 1;
    if qlp_precision - 1 == 0b1111 {
        return Err(Error::Unparseable {
            bit_offset: bits.bits_read(),
            reason: "invalid quantized LPC precision".to_string(),
        });
    }

    let qlp_shift = bits.read_int(5)?;

    let mut coefficients = Vec::with_capacity(order as usize);
    for _ in 0..order {
        coefficients.push(bits.read_int(qlp_precision)?);
    }

    let mut residual = Vec::new();
    rice::decode_residual(bits, block_size, order, &mut residual)?;
    buffer.extend(residual);

    predictor::predict_lpc(&coefficients, qlp_shift, &mut buffer)
        .map_err(|e| e.at_bit_offset(bits.bits_read()))?;

    Ok(buffer.into_iter().map(|s| s as i32).collect())
}

/// Given a signed two's complement integer in the `bits` least significant
/// bits of `val`, extends the sign bit to a valid 16-bit signed integer.
///
/// Kept for parity with values read through plain byte accessors (e.g. the
/// frame header's fixed-width fields) that do not go through `BitReader`.
pub fn extend_sign_u16(val: u16, bits: u32) -> i16 {
    if bits >= 16 {
        val as i16
    } else if val < (1 << (bits - 1)) {
        val as i16
    } else {
        (val as i16).wrapping_sub(1 << bits)
    }
}
