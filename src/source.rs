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

//! The `source` module holds helpers for peeking at a FLAC stream's
//! STREAMINFO block without committing to decoding it.

use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;
use crate::metadata::{self, StreamInfo};

/// Reads just the STREAMINFO block from a seekable source, then rewinds to
/// the position it started at.
///
/// This lets a caller inspect sample rate, channel count and duration
/// without committing to decoding the whole stream, e.g. to size an output
/// buffer up front.
pub fn probe_streaminfo<R: Read + Seek>(input: &mut R) -> Result<StreamInfo> {
    let start = input.stream_position()?;

    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if &magic != b"fLaC" {
        input.seek(SeekFrom::Start(start))?;
        return Err(crate::error::Error::BadMagic { bit_offset: 0 });
    }

    let header = metadata::read_block_header(input)?;
    let result = if header.block_type == metadata::BlockType::StreamInfo {
        metadata::read_streaminfo_block(input)
    } else {
        Err(crate::error::Error::BadMetadata {
            bit_offset: 32,
            reason: "first metadata block is not STREAMINFO".to_string(),
        })
    };

    input.seek(SeekFrom::Start(start))?;
    result
}
