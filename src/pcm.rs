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

//! Packs channel-interleaved, reconstructed samples into little-endian PCM
//! bytes at the stream's container width (8/16/24/32 bits per sample).

/// Rounds `bits_per_sample` up to the next supported container width.
fn container_width(bits_per_sample: u32) -> u32 {
    match bits_per_sample {
        0..=8 => 8,
        9..=16 => 16,
        17..=24 => 24,
        _ => 32,
    }
}

/// Interleaves `channels` (one `Vec<i32>` per channel, all the same length)
/// into `out`, appending little-endian samples at the container width
/// implied by `bits_per_sample`.
///
/// `out` is not cleared first, so callers can accumulate multiple frames'
/// worth of PCM into one buffer before handing it to a processor.
pub fn pack_interleaved(channels: &[Vec<i32>], bits_per_sample: u32, out: &mut Vec<u8>) {
    if channels.is_empty() {
        return;
    }

    let width = container_width(bits_per_sample);
    let bytes_per_sample = (width / 8) as usize;
    let block_size = channels[0].len();

    out.reserve(block_size * channels.len() * bytes_per_sample);

    for i in 0..block_size {
        for channel in channels {
            let sample = channel[i];
            let bytes = sample.to_le_bytes();
            out.extend_from_slice(&bytes[..bytes_per_sample]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pack_interleaved;

    #[test]
    fn packs_stereo_16_bit_interleaved() {
        let left = vec![1i32, -1];
        let right = vec![2i32, -2];
        let mut out = Vec::new();
        pack_interleaved(&[left, right], 16, &mut out);
        assert_eq!(
            out,
            vec![
                1, 0, // left sample 0 = 1
                2, 0, // right sample 0 = 2
                0xff, 0xff, // left sample 1 = -1
                0xfe, 0xff, // right sample 1 = -2
            ]
        );
    }

    #[test]
    fn rounds_up_odd_bit_depths_to_next_container() {
        let mono = vec![0i32];
        let mut out = Vec::new();
        pack_interleaved(&[mono], 20, &mut out);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn appends_without_clearing_prior_contents() {
        let mut out = vec![0xaa];
        pack_interleaved(&[vec![1i32]], 8, &mut out);
        assert_eq!(out, vec![0xaa, 1]);
    }
}
