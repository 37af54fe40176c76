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

//! Optional whole-stream MD5 validation against STREAMINFO's signature.

use md5::{Digest, Md5};

use crate::error::{Error, Result};

/// Feeds decoded PCM through a running MD5 digest, to be compared against
/// STREAMINFO's `md5sum` once the stream ends.
///
/// Only built and fed when `DecoderOptions::verify` is set, since hashing
/// every sample has a real cost that most callers don't want to pay.
pub struct Md5AudioValidator {
    digest: Md5,
    expected: [u8; 16],
}

impl Md5AudioValidator {
    pub fn new(expected: [u8; 16]) -> Md5AudioValidator {
        Md5AudioValidator {
            digest: Md5::new(),
            expected,
        }
    }

    /// Feeds one frame's worth of already-packed little-endian PCM bytes
    /// into the running digest. This must be called with the exact bytes
    /// that would be written to a WAV file, since that is what STREAMINFO's
    /// signature was computed over.
    pub fn feed(&mut self, pcm_bytes: &[u8]) {
        self.digest.update(pcm_bytes);
    }

    /// Consumes the validator and checks the final digest against the
    /// expected signature.
    pub fn finish(self) -> Result<()> {
        let computed: [u8; 16] = self.digest.finalize().into();
        if computed == self.expected {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                expected: self.expected,
                computed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Md5AudioValidator;
    use md5::{Digest, Md5};

    #[test]
    fn matching_signature_finishes_ok() {
        let data = b"some pcm bytes";
        let mut digest = Md5::new();
        digest.update(data);
        let expected: [u8; 16] = digest.finalize().into();

        let mut validator = Md5AudioValidator::new(expected);
        validator.feed(data);
        assert!(validator.finish().is_ok());
    }

    #[test]
    fn mismatched_signature_is_reported() {
        let mut validator = Md5AudioValidator::new([0u8; 16]);
        validator.feed(b"some pcm bytes");
        assert!(validator.finish().is_err());
    }
}
