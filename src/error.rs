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

//! The `error` module defines the error and result types.

/// An error that prevents successful decoding of the FLAC stream.
///
/// Every decoding-related variant carries the bit offset, measured from the
/// start of the stream, at which the problem was detected.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The underlying byte source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The source ran out of bytes before a value could be fully read.
    #[error("unexpected end of stream at bit offset {bit_offset}")]
    UnexpectedEnd { bit_offset: u64 },

    /// The stream header does not equal 'fLaC'.
    #[error("expected 'fLaC' stream marker at bit offset {bit_offset}")]
    BadMagic { bit_offset: u64 },

    /// A metadata block header or body violates the format.
    #[error("malformed metadata block at bit offset {bit_offset}: {reason}")]
    BadMetadata { bit_offset: u64, reason: String },

    /// A frame sync code could not be found; the driver must resynchronize.
    #[error("lost frame sync at bit offset {bit_offset}")]
    LostSync { bit_offset: u64 },

    /// A bit pattern that the format leaves reserved, or that is otherwise
    /// structurally invalid, was encountered.
    #[error("unparseable bitstream at bit offset {bit_offset}: {reason}")]
    Unparseable { bit_offset: u64, reason: String },

    /// The frame header's stored CRC-8 does not match the computed one.
    #[error("frame header CRC-8 mismatch at bit offset {bit_offset}")]
    BadHeaderCrc { bit_offset: u64 },

    /// The frame footer's stored CRC-16 does not match the computed one.
    #[error("frame footer CRC-16 mismatch at bit offset {bit_offset}")]
    BadFrameCrc { bit_offset: u64 },

    /// The whole-stream MD5 signature does not match STREAMINFO's, when
    /// verification was requested via `DecoderOptions::verify`.
    #[error("MD5 signature mismatch: expected {expected:02x?}, computed {computed:02x?}")]
    ChecksumMismatch {
        expected: [u8; 16],
        computed: [u8; 16],
    },
}

impl Error {
    /// The bit offset at which the error was detected, if applicable.
    pub fn bit_offset(&self) -> Option<u64> {
        match *self {
            Error::Io(_) => None,
            Error::UnexpectedEnd { bit_offset }
            | Error::BadMagic { bit_offset }
            | Error::BadMetadata { bit_offset, .. }
            | Error::LostSync { bit_offset }
            | Error::Unparseable { bit_offset, .. }
            | Error::BadHeaderCrc { bit_offset }
            | Error::BadFrameCrc { bit_offset } => Some(bit_offset),
            Error::ChecksumMismatch { .. } => None,
        }
    }

    /// Overrides the bit offset on a decoding error, leaving `Io` and
    /// `ChecksumMismatch` (which have none) untouched. Used by components
    /// such as the predictors that do not themselves hold a bit reader.
    pub fn at_bit_offset(mut self, offset: u64) -> Error {
        match &mut self {
            Error::UnexpectedEnd { bit_offset }
            | Error::BadMagic { bit_offset }
            | Error::BadMetadata { bit_offset, .. }
            | Error::LostSync { bit_offset }
            | Error::Unparseable { bit_offset, .. }
            | Error::BadHeaderCrc { bit_offset }
            | Error::BadFrameCrc { bit_offset } => *bit_offset = offset,
            Error::Io(_) | Error::ChecksumMismatch { .. } => {}
        }
        self
    }

    /// Whether the stream driver may recover from this error by resyncing.
    ///
    /// Only a subset of errors are recoverable: a corrupt frame is something
    /// we can skip past and resynchronize after, but a malformed stream
    /// header or a missing STREAMINFO block means there is nothing sensible
    /// left to decode.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::LostSync { .. } | Error::BadHeaderCrc { .. } | Error::BadFrameCrc { .. }
        )
    }
}

/// Either `T` on success, or an `Error` on failure.
pub type Result<T> = std::result::Result<T, Error>;
