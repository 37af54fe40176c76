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

//! The `metadata` module deals with the metadata blocks that precede the
//! audio frames of a FLAC stream.

use std::io;

use byteorder::{BigEndian, ReadBytesExt};
use log::warn;

use crate::error::{Error, Result};

/// The different kinds of metadata block defined by the FLAC format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    /// A block type not defined by the format at the time of writing.
    Reserved(u8),
}

/// The header that precedes every metadata block.
#[derive(Clone, Copy)]
pub struct BlockHeader {
    /// Whether this is the last metadata block before the audio frames.
    pub is_last: bool,
    pub block_type: BlockType,
    /// Length of the metadata block's body in bytes, excluding this header.
    pub length: u32,
}

/// The STREAMINFO block, with the technical parameters of the stream.
#[derive(Clone, Copy, Debug)]
pub struct StreamInfo {
    /// The minimum block size (in inter-channel samples) used in the stream.
    pub min_block_size: u16,
    /// The maximum block size (in inter-channel samples) used in the stream.
    pub max_block_size: u16,
    /// The minimum frame size (in bytes) used in the stream.
    pub min_frame_size: Option<u32>,
    /// The maximum frame size (in bytes) used in the stream.
    pub max_frame_size: Option<u32>,
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The number of channels.
    pub channels: u32,
    /// The number of bits per sample.
    pub bits_per_sample: u32,
    /// The total number of inter-channel samples in the stream, if known.
    pub samples: Option<u64>,
    /// MD5 signature of the unencoded audio data.
    pub md5sum: [u8; 16],
}

/// A single entry in a SEEKTABLE block.
#[derive(Clone, Copy, Debug)]
pub struct SeekPoint {
    /// Sample number of the first sample in the target frame, or `None` for
    /// a placeholder point.
    pub sample: Option<u64>,
    /// Byte offset from the first frame header to the target frame's header.
    pub offset: u64,
    /// Number of inter-channel samples in the target frame.
    pub frame_samples: u16,
}

/// A parsed SEEKTABLE block: seek points in the order they were stored.
#[derive(Clone, Debug, Default)]
pub struct SeekTable {
    pub points: Vec<SeekPoint>,
}

/// A single `NAME=value` tag from a VORBIS_COMMENT block.
#[derive(Clone, Debug)]
pub struct VorbisComment {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl VorbisComment {
    /// Returns the value of the first comment whose field name matches
    /// `field_name`, case-insensitively, as `VORBIS_COMMENT` field names are.
    pub fn get(&self, field_name: &str) -> Option<&str> {
        self.comments.iter().find_map(|c| {
            let mut parts = c.splitn(2, '=');
            let name = parts.next()?;
            let value = parts.next()?;
            if name.eq_ignore_ascii_case(field_name) {
                Some(value)
            } else {
                None
            }
        })
    }
}

/// A metadata block, as read from the stream.
///
/// PADDING, APPLICATION, CUESHEET and PICTURE bodies are not interpreted;
/// their raw bytes are exposed for callers that need them.
pub enum MetadataBlock {
    StreamInfo(StreamInfo),
    Padding { length: u32 },
    Application { id: u32, data: Vec<u8> },
    SeekTable(SeekTable),
    VorbisComment(VorbisComment),
    CueSheet { data: Vec<u8> },
    Picture { data: Vec<u8> },
    Reserved { block_type: u8, data: Vec<u8> },
}

fn bad_metadata(reason: &str) -> Error {
    Error::BadMetadata {
        bit_offset: 0,
        reason: reason.to_string(),
    }
}

pub fn read_block_header<R: io::Read>(input: &mut R) -> Result<BlockHeader> {
    let byte = input.read_u8()?;

    let is_last = (byte >> 7) == 1;
    let block_type_u8 = byte & 0b0111_1111;

    let length = input.read_uint::<BigEndian>(3)? as u32;

    let block_type = match block_type_u8 {
        0 => BlockType::StreamInfo,
        1 => BlockType::Padding,
        2 => BlockType::Application,
        3 => BlockType::SeekTable,
        4 => BlockType::VorbisComment,
        5 => BlockType::CueSheet,
        6 => BlockType::Picture,
        127 => return Err(bad_metadata("invalid metadata block type 127")),
        n => BlockType::Reserved(n),
    };

    if block_type == BlockType::StreamInfo && length != 34 {
        return Err(bad_metadata("STREAMINFO block must be 34 bytes"));
    }

    Ok(BlockHeader {
        is_last,
        block_type,
        length,
    })
}

pub fn read_streaminfo_block<R: io::Read>(input: &mut R) -> Result<StreamInfo> {
    let min_block_size = input.read_u16::<BigEndian>()?;
    let max_block_size = input.read_u16::<BigEndian>()?;

    let min_frame_size = input.read_uint::<BigEndian>(3)? as u32;
    let max_frame_size = input.read_uint::<BigEndian>(3)? as u32;

    // Next up are 20 bits that determine the sample rate.
    let sample_rate_msb = input.read_u16::<BigEndian>()?;
    let sample_rate_lsb = input.read_u8()?;
    let sample_rate = (sample_rate_msb as u32) << 4 | (sample_rate_lsb as u32) >> 4;

    // Next three bits are the number of channels minus one.
    let n_channels_bps = sample_rate_lsb;
    let channels = ((n_channels_bps >> 1) & 0b0000_0111) as u32 + 1;

    // The final bit is the most significant bit of bits-per-sample minus one.
    let bps_msb = n_channels_bps & 1;
    let bps_lsb_n_samples = input.read_u8()?;
    let bits_per_sample = ((bps_msb << 4) | (bps_lsb_n_samples >> 4)) as u32 + 1;

    // Number of samples is 36 bits; 4 already read, 32 to go.
    let n_samples_msb = bps_lsb_n_samples & 0b0000_1111;
    let n_samples_lsb = input.read_u32::<BigEndian>()?;
    let n_samples = (n_samples_msb as u64) << 32 | n_samples_lsb as u64;

    let mut md5sum = [0u8; 16];
    input.read_exact(&mut md5sum)?;

    if min_block_size > max_block_size {
        return Err(bad_metadata("min block size exceeds max block size"));
    }
    if min_block_size < 16 {
        return Err(bad_metadata("block size must be at least 16"));
    }
    if min_frame_size > max_frame_size && max_frame_size != 0 {
        return Err(bad_metadata("min frame size exceeds max frame size"));
    }
    if sample_rate == 0 || sample_rate > 655_350 {
        return Err(bad_metadata("sample rate out of range"));
    }

    Ok(StreamInfo {
        min_block_size,
        max_block_size,
        min_frame_size: if min_frame_size == 0 {
            None
        } else {
            Some(min_frame_size)
        },
        max_frame_size: if max_frame_size == 0 {
            None
        } else {
            Some(max_frame_size)
        },
        sample_rate,
        channels,
        bits_per_sample,
        samples: if n_samples == 0 { None } else { Some(n_samples) },
        md5sum,
    })
}

fn read_application_block<R: io::Read>(input: &mut R, length: u32) -> Result<(u32, Vec<u8>)> {
    if length < 4 {
        return Err(bad_metadata("application block shorter than its id"));
    }
    let id = input.read_u32::<BigEndian>()?;
    let mut data = vec![0u8; (length - 4) as usize];
    input.read_exact(&mut data)?;
    Ok((id, data))
}

fn read_seektable_block<R: io::Read>(input: &mut R, length: u32) -> Result<SeekTable> {
    if length % 18 != 0 {
        return Err(bad_metadata("SEEKTABLE length is not a multiple of 18"));
    }
    let n_points = length / 18;
    let mut points = Vec::with_capacity(n_points as usize);
    for _ in 0..n_points {
        let sample = input.read_u64::<BigEndian>()?;
        let offset = input.read_u64::<BigEndian>()?;
        let frame_samples = input.read_u16::<BigEndian>()?;
        points.push(SeekPoint {
            sample: if sample == u64::MAX { None } else { Some(sample) },
            offset,
            frame_samples,
        });
    }
    Ok(SeekTable { points })
}

fn read_length_prefixed_bytes<R: io::Read>(input: &mut R) -> Result<Vec<u8>> {
    let len = input.read_u32::<byteorder::LittleEndian>()?;
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_length_prefixed_utf8<R: io::Read>(input: &mut R) -> Result<String> {
    let buf = read_length_prefixed_bytes(input)?;
    String::from_utf8(buf).map_err(|_| bad_metadata("VORBIS_COMMENT field is not valid UTF-8"))
}

fn read_vorbis_comment_block<R: io::Read>(input: &mut R) -> Result<VorbisComment> {
    let vendor = read_length_prefixed_utf8(input)?;
    let n_comments = input.read_u32::<byteorder::LittleEndian>()?;
    let mut comments = Vec::with_capacity(n_comments as usize);
    for _ in 0..n_comments {
        let bytes = read_length_prefixed_bytes(input)?;
        match String::from_utf8(bytes) {
            Ok(tag) => comments.push(tag),
            // Metadata corruption in a single tag must not stop decoding.
            Err(_) => warn!("skipping VORBIS_COMMENT tag with invalid UTF-8"),
        }
    }
    Ok(VorbisComment { vendor, comments })
}

fn read_opaque_block<R: io::Read>(input: &mut R, length: u32) -> Result<Vec<u8>> {
    let mut data = vec![0u8; length as usize];
    input.read_exact(&mut data)?;
    Ok(data)
}

/// Reads one full metadata block (header and body) from `input`.
pub fn read_next_block<R: io::Read>(input: &mut R) -> Result<(BlockHeader, MetadataBlock)> {
    let header = read_block_header(input)?;
    let block = read_metadata_block(input, &header)?;
    Ok((header, block))
}

fn read_metadata_block<R: io::Read>(
    input: &mut R,
    header: &BlockHeader,
) -> Result<MetadataBlock> {
    match header.block_type {
        BlockType::StreamInfo => {
            Ok(MetadataBlock::StreamInfo(read_streaminfo_block(input)?))
        }
        BlockType::Padding => {
            read_opaque_block(input, header.length)?;
            Ok(MetadataBlock::Padding {
                length: header.length,
            })
        }
        BlockType::Application => {
            let (id, data) = read_application_block(input, header.length)?;
            Ok(MetadataBlock::Application { id, data })
        }
        BlockType::SeekTable => Ok(MetadataBlock::SeekTable(read_seektable_block(
            input,
            header.length,
        )?)),
        BlockType::VorbisComment => Ok(MetadataBlock::VorbisComment(read_vorbis_comment_block(
            input,
        )?)),
        BlockType::CueSheet => Ok(MetadataBlock::CueSheet {
            data: read_opaque_block(input, header.length)?,
        }),
        BlockType::Picture => Ok(MetadataBlock::Picture {
            data: read_opaque_block(input, header.length)?,
        }),
        BlockType::Reserved(n) => Ok(MetadataBlock::Reserved {
            block_type: n,
            data: read_opaque_block(input, header.length)?,
        }),
    }
}
