// Claxon -- A FLAC decoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License, version 3,
// as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! The `frame` module deals with the frames that make up a FLAC stream.

use std::io;

use crate::bitstream::BitReader;
use crate::error::{Error, Result};
use crate::subframe;

#[derive(Clone, Copy, Debug)]
enum BlockingStrategy {
    Fixed,
    Variable,
}

#[derive(Clone, Copy, Debug)]
pub enum BlockTime {
    FrameNumber(u32),
    SampleNumber(u64),
}

#[derive(Clone, Copy, Debug)]
pub enum ChannelAssignment {
    /// The `n` channels are coded as-is.
    Independent(u8),
    /// Channel 0 is the left channel, channel 1 is the side channel.
    LeftSideStereo,
    /// Channel 0 is the side channel, channel 1 is the right channel.
    RightSideStereo,
    /// Channel 0 is the mid channel, channel 1 is the side channel.
    MidSideStereo,
}

impl ChannelAssignment {
    pub fn channels(&self) -> u8 {
        match *self {
            ChannelAssignment::Independent(n) => n,
            ChannelAssignment::LeftSideStereo => 2,
            ChannelAssignment::RightSideStereo => 2,
            ChannelAssignment::MidSideStereo => 2,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FrameHeader {
    pub block_time: BlockTime,
    pub block_size: u32,
    /// `None` means "use the stream's sample rate from STREAMINFO".
    pub sample_rate: Option<u32>,
    pub channel_assignment: ChannelAssignment,
    /// `None` means "use the stream's bits per sample from STREAMINFO".
    pub bits_per_sample: Option<u32>,
}

/// A fully decoded frame: a header plus one sample buffer per channel.
pub struct Frame {
    pub header: FrameHeader,
    pub channels: Vec<Vec<i32>>,
}

fn unparseable<R>(bits: &BitReader<R>, reason: &str) -> Error {
    Error::Unparseable {
        bit_offset: bits.bits_read(),
        reason: reason.to_string(),
    }
}

/// A reserved frame-header bit pattern was encountered; the driver may
/// resynchronize past it rather than aborting the whole stream.
fn lost_sync<R>(bits: &BitReader<R>) -> Error {
    Error::LostSync {
        bit_offset: bits.bits_read(),
    }
}

/// Reads a frame header, including the leading sync code.
fn read_frame_header<R: io::Read>(bits: &mut BitReader<R>) -> Result<FrameHeader> {
    bits.reset_crc8();

    // First are 14 bits frame sync code, a reserved bit, and blocking strategy.
    let sync_res_block = bits.read_uint(16)? as u16;

    let sync_code = sync_res_block & 0b1111_1111_1111_1100;
    if sync_code != 0b1111_1111_1111_1000 {
        return Err(unparseable(bits, "frame sync code missing"));
    }

    read_frame_header_after_sync(bits, sync_res_block)
}

/// Reads a frame header, assuming the caller has already located and
/// consumed the 16-bit sync/reserved/blocking-strategy word (as happens
/// after a driver resync scan) and hands it in as `sync_res_block`.
fn read_frame_header_after_sync<R: io::Read>(
    bits: &mut BitReader<R>,
    sync_res_block: u16,
) -> Result<FrameHeader> {
    if sync_res_block & 0b0000_0000_0000_0010 != 0 {
        return Err(lost_sync(bits));
    }

    let blocking_strategy = if sync_res_block & 0b0000_0000_0000_0001 == 0 {
        BlockingStrategy::Fixed
    } else {
        BlockingStrategy::Variable
    };

    // Next are 4 bits block size and 4 bits sample rate.
    let bs_sr = bits.read_uint(8)?;
    let mut block_size = 0u32;
    let mut read_8bit_bs = false;
    let mut read_16bit_bs = false;

    match bs_sr >> 4 {
        0b0000 => return Err(lost_sync(bits)),
        0b0001 => block_size = 192,
        n if (0b0010..=0b0101).contains(&n) => block_size = 576 * (1 << (n - 2)),
        0b0110 => read_8bit_bs = true,
        0b0111 => read_16bit_bs = true,
        n => block_size = 256 * (1 << (n - 8)),
    }

    let mut sample_rate = None;
    let mut read_8bit_sr = false;
    let mut read_16bit_sr = false;
    let mut read_16bit_sr_ten = false;

    match bs_sr & 0b0000_1111 {
        0b0000 => sample_rate = None,
        0b0001 => sample_rate = Some(88_200),
        0b0010 => sample_rate = Some(176_400),
        0b0011 => sample_rate = Some(192_000),
        0b0100 => sample_rate = Some(8_000),
        0b0101 => sample_rate = Some(16_000),
        0b0110 => sample_rate = Some(22_050),
        0b0111 => sample_rate = Some(24_000),
        0b1000 => sample_rate = Some(32_000),
        0b1001 => sample_rate = Some(44_100),
        0b1010 => sample_rate = Some(48_000),
        0b1011 => sample_rate = Some(96_000),
        0b1100 => read_8bit_sr = true,
        0b1101 => read_16bit_sr = true,
        0b1110 => read_16bit_sr_ten = true,
        _ => return Err(lost_sync(bits)),
    }

    // Next are 4 bits channel assignment, 3 bits sample size, and 1 reserved bit.
    let chan_bps_res = bits.read_uint(8)?;

    let channel_assignment = match chan_bps_res >> 4 {
        n if n < 8 => ChannelAssignment::Independent(n as u8 + 1),
        0b1000 => ChannelAssignment::LeftSideStereo,
        0b1001 => ChannelAssignment::RightSideStereo,
        0b1010 => ChannelAssignment::MidSideStereo,
        _ => return Err(lost_sync(bits)),
    };

    let bits_per_sample = match (chan_bps_res & 0b0000_1110) >> 1 {
        0b000 => None,
        0b001 => Some(8),
        0b010 => Some(12),
        0b100 => Some(16),
        0b101 => Some(20),
        0b110 => Some(24),
        _ => return Err(lost_sync(bits)),
    };

    if chan_bps_res & 0b0000_0001 != 0 {
        return Err(unparseable(bits, "reserved bit set after bits-per-sample"));
    }

    let block_time = match blocking_strategy {
        BlockingStrategy::Variable => {
            let sample = bits.read_utf8_u64()?;
            BlockTime::SampleNumber(sample)
        }
        BlockingStrategy::Fixed => {
            let frame = bits.read_utf8_u64()?;
            if frame > 0x7fff_ffff {
                return Err(unparseable(bits, "frame number too large"));
            }
            BlockTime::FrameNumber(frame as u32)
        }
    };

    if read_8bit_bs {
        block_size = bits.read_uint(8)? + 1;
    }
    if read_16bit_bs {
        let bs = bits.read_uint(16)?;
        if bs == 0xffff {
            return Err(unparseable(bits, "block size exceeds 65535"));
        }
        block_size = bs + 1;
    }

    if block_size < 16 {
        return Err(unparseable(bits, "block size must be at least 16"));
    }

    if read_8bit_sr {
        sample_rate = Some(bits.read_uint(8)?);
    }
    if read_16bit_sr {
        sample_rate = Some(bits.read_uint(16)?);
    }
    if read_16bit_sr_ten {
        sample_rate = Some(bits.read_uint(16)? * 10);
    }

    let computed_crc = bits.crc8();
    let presumed_crc = bits.read_stored_crc8()?;
    if computed_crc != presumed_crc {
        return Err(Error::BadHeaderCrc {
            bit_offset: bits.bits_read(),
        });
    }

    Ok(FrameHeader {
        block_time,
        block_size,
        sample_rate,
        channel_assignment,
        bits_per_sample,
    })
}

/// Reconstructs left/right from a left + side buffer pair, in place.
fn decode_left_side(left: &mut [i32], side: &mut [i32]) {
    for (l, s) in left.iter().zip(side.iter_mut()) {
        // side = left - right => right = left - side.
        *s = *l - *s;
    }
}

/// Reconstructs left/right from a side + right buffer pair, in place.
fn decode_right_side(side: &mut [i32], right: &mut [i32]) {
    for (s, r) in side.iter_mut().zip(right.iter()) {
        // side = left - right => left = side + right.
        *s += *r;
    }
}

/// Reconstructs left/right from a mid + side buffer pair, in place.
fn decode_mid_side(mid: &mut [i32], side: &mut [i32]) {
    for (m, s) in mid.iter_mut().zip(side.iter_mut()) {
        // Double mid first, then correct for the truncation that occurred
        // during encoding when side was odd.
        let doubled_mid = (*m << 1) | (*s & 1);
        let left = (doubled_mid + *s) >> 1;
        let right = (doubled_mid - *s) >> 1;
        *m = left;
        *s = right;
    }
}

/// Decodes one full frame: header, every channel's subframe, decorrelation,
/// and the footer CRC-16 check.
///
/// `stream_bps` is STREAMINFO's bits-per-sample, used when the frame header
/// defers to it.
pub fn decode_frame<R: io::Read>(bits: &mut BitReader<R>, stream_bps: u32) -> Result<Frame> {
    bits.reset_crc16();
    let header = read_frame_header(bits)?;
    decode_frame_body(bits, stream_bps, header)
}

/// Like `decode_frame`, but for use after a driver resync scan has already
/// located and consumed the sync word and manually fed it to both running
/// CRCs; `sync_res_block` is that consumed 16-bit word.
pub fn decode_frame_presynced<R: io::Read>(
    bits: &mut BitReader<R>,
    stream_bps: u32,
    sync_res_block: u16,
) -> Result<Frame> {
    let header = read_frame_header_after_sync(bits, sync_res_block)?;
    decode_frame_body(bits, stream_bps, header)
}

fn decode_frame_body<R: io::Read>(
    bits: &mut BitReader<R>,
    stream_bps: u32,
    header: FrameHeader,
) -> Result<Frame> {
    let bps = header.bits_per_sample.unwrap_or(stream_bps);
    let bs = header.block_size;

    let channels: Vec<Vec<i32>> = match header.channel_assignment {
        ChannelAssignment::Independent(n) => {
            let mut chans = Vec::with_capacity(n as usize);
            for _ in 0..n {
                chans.push(subframe::decode_subframe(bits, bps, bs)?);
            }
            chans
        }
        ChannelAssignment::LeftSideStereo => {
            let mut left = subframe::decode_subframe(bits, bps, bs)?;
            let mut side = subframe::decode_subframe(bits, bps + 1, bs)?;
            decode_left_side(&mut left, &mut side);
            vec![left, side]
        }
        ChannelAssignment::RightSideStereo => {
            let mut side = subframe::decode_subframe(bits, bps + 1, bs)?;
            let right = subframe::decode_subframe(bits, bps, bs)?;
            decode_right_side(&mut side, &right);
            // `side` now holds the reconstructed left channel.
            vec![side, right]
        }
        ChannelAssignment::MidSideStereo => {
            let mut mid = subframe::decode_subframe(bits, bps, bs)?;
            let mut side = subframe::decode_subframe(bits, bps + 1, bs)?;
            decode_mid_side(&mut mid, &mut side);
            vec![mid, side]
        }
    };

    if !bits.is_byte_aligned() {
        bits.align_to_byte();
    }

    let computed_crc = bits.crc16();
    let presumed_crc = bits.read_stored_crc16()?;
    if computed_crc != presumed_crc {
        return Err(Error::BadFrameCrc {
            bit_offset: bits.bits_read(),
        });
    }

    Ok(Frame { header, channels })
}

#[cfg(test)]
mod tests {
    use super::{decode_left_side, decode_mid_side, decode_right_side};

    #[test]
    fn left_side_reconstructs_right_channel() {
        let mut left = vec![2, 5, 83, 113, 127, -63, -45, -15];
        let mut side = vec![-5, -33, -59, -125, 127, 89, 7, 3];
        decode_left_side(&mut left, &mut side);
        assert_eq!(side, vec![7, 38, 142, 238, 0, -152, -52, -18]);
    }

    #[test]
    fn right_side_reconstructs_left_channel() {
        let mut side = vec![-5, -33, -59, -125, 127, 89, 7, 3];
        let right = vec![7, 38, 142, 238, 0, -152, -52, -18];
        decode_right_side(&mut side, &right);
        assert_eq!(side, vec![2, 5, 83, 113, 127, -63, -45, -15]);
    }

    #[test]
    fn mid_side_reconstructs_left_and_right() {
        let mut mid = vec![-2, -14, 12, -6, 127, 13, -19, -6];
        let mut side = vec![7, 38, 142, 238, 0, -152, -52, -18];
        decode_mid_side(&mut mid, &mut side);
        assert_eq!(mid, vec![2, 5, 83, 113, 127, -63, -45, -15]);
        assert_eq!(side, vec![-5, -33, -59, -125, 127, 89, 7, 3]);
    }

    #[test]
    fn mid_side_constant_subframes_reconstruct_to_three_and_five() {
        // mid = 4, side = -2 for every sample: mid_adj = (4<<1)|(-2 & 1) = 9,
        // left = (9 + -2) >> 1 = 3, right = (9 - -2) >> 1 = 5.
        let mut mid = vec![4; 8];
        let mut side = vec![-2; 8];
        decode_mid_side(&mut mid, &mut side);
        assert_eq!(mid, vec![3; 8]);
        assert_eq!(side, vec![5; 8]);
    }
}
