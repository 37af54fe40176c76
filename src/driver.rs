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

//! The `driver` module runs the sync -> metadata -> frame loop and fans
//! decoded PCM out to registered processors.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::bitstream::BitReader;
use crate::error::{Error, Result};
use crate::frame;
use crate::metadata::{self, MetadataBlock, StreamInfo};
use crate::pcm;
use crate::processor::ProcessorRegistry;
use crate::validate::Md5AudioValidator;

/// The 14-bit frame sync code, left-aligned in the top bits of a 16-bit word.
const SYNC_MASK: u16 = 0b1111_1111_1111_1100;
const SYNC_VALUE: u16 = 0b1111_1111_1111_1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SearchForMetadata,
    ReadMetadata,
    SearchForFrameSync,
    /// Carries the sync word the preceding `SearchForFrameSync` scan found,
    /// since `BitReader` has no pushback to let the frame parser re-read it.
    ReadFrame(u16),
    EndOfStream,
    Aborted,
}

/// Options controlling how a `Driver` decodes a stream.
#[derive(Clone, Debug)]
pub struct DecoderOptions {
    /// Verify the decoded audio against STREAMINFO's MD5 signature.
    pub verify: bool,
    /// When a frame's CRC fails, resynchronize and keep decoding rather
    /// than aborting the stream.
    pub resync_on_bad_frame: bool,
    /// Initial capacity, in bytes, reserved for the per-frame PCM buffer.
    pub initial_buffer_capacity: usize,
}

impl Default for DecoderOptions {
    fn default() -> DecoderOptions {
        DecoderOptions {
            verify: false,
            resync_on_bad_frame: true,
            initial_buffer_capacity: 4096,
        }
    }
}

/// Drives a FLAC byte source through metadata and frames, dispatching
/// decoded data to a `ProcessorRegistry`.
pub struct Driver<R> {
    bits: BitReader<R>,
    options: DecoderOptions,
    abort: Arc<AtomicBool>,
}

impl<R: io::Read> Driver<R> {
    pub fn new(reader: R, options: DecoderOptions) -> Driver<R> {
        Driver {
            bits: BitReader::new(reader),
            options,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A shared flag that any processor can set (via the `Arc` it was
    /// constructed with) to make the driver stop after the current frame.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Runs the full sync -> metadata -> frame loop to completion, emitting
    /// events to `registry` as it goes.
    pub fn run(&mut self, registry: &ProcessorRegistry) -> Result<()> {
        let mut state = State::SearchForMetadata;
        let mut stream_info: Option<StreamInfo> = None;
        let mut validator: Option<Md5AudioValidator> = None;
        let mut pcm_buffer = Vec::with_capacity(self.options.initial_buffer_capacity);

        loop {
            state = match state {
                State::SearchForMetadata => {
                    let mut magic = [0u8; 4];
                    self.bits.read_byte_block_aligned(&mut magic)?;
                    if &magic != b"fLaC" {
                        return Err(Error::BadMagic { bit_offset: 0 });
                    }
                    State::ReadMetadata
                }

                State::ReadMetadata => {
                    let info = self.read_metadata(registry)?;
                    if self.options.verify {
                        validator = Some(Md5AudioValidator::new(info.md5sum));
                    }
                    stream_info = Some(info);
                    State::SearchForFrameSync
                }

                State::SearchForFrameSync => {
                    if self.abort.load(Ordering::SeqCst) {
                        State::Aborted
                    } else {
                        match self.resync()? {
                            Some(sync_word) => State::ReadFrame(sync_word),
                            None => State::EndOfStream,
                        }
                    }
                }

                State::ReadFrame(sync_word) => {
                    let info = stream_info
                        .as_ref()
                        .expect("STREAMINFO must be read before any frame");

                    match self.decode_one_frame(info, sync_word, &mut pcm_buffer) {
                        Ok(()) => {
                            registry.dispatch_pcm(&pcm_buffer);
                            if let Some(v) = validator.as_mut() {
                                v.feed(&pcm_buffer);
                            }
                            State::SearchForFrameSync
                        }
                        Err(e) if e.is_recoverable() && self.options.resync_on_bad_frame => {
                            warn!("recoverable frame error, resynchronizing: {e}");
                            State::SearchForFrameSync
                        }
                        Err(Error::UnexpectedEnd { .. }) => State::EndOfStream,
                        Err(e) => return Err(e),
                    }
                }

                State::EndOfStream => {
                    if let Some(v) = validator.take() {
                        v.finish()?;
                    }
                    debug!("end of stream reached");
                    return Ok(());
                }

                State::Aborted => {
                    debug!("decode aborted by a processor");
                    return Ok(());
                }
            };
        }
    }

    fn read_metadata(&mut self, registry: &ProcessorRegistry) -> Result<StreamInfo> {
        let mut stream_info = None;

        loop {
            let (header, block) = metadata::read_next_block(&mut MetadataByteAdapter(&mut self.bits))?;

            if let MetadataBlock::StreamInfo(info) = block {
                stream_info = Some(info);
            }

            if header.is_last {
                break;
            }
        }

        let info = stream_info.ok_or_else(|| Error::BadMetadata {
            bit_offset: 32,
            reason: "stream is missing a STREAMINFO block".to_string(),
        })?;

        registry.dispatch_stream_info(&info);
        trace!(
            "streaminfo: {} Hz, {} channel(s), {} bit(s) per sample",
            info.sample_rate,
            info.channels,
            info.bits_per_sample
        );

        Ok(info)
    }

    /// Scans byte-by-byte for the 14-bit frame sync code. On a match, resets
    /// both running CRCs and feeds them the two sync bytes (since `BitReader`
    /// has no pushback, the frame header parser is then entered past the
    /// sync word rather than re-reading it). Returns `None` on a clean end
    /// of stream.
    fn resync(&mut self) -> Result<Option<u16>> {
        let mut prev = 0u8;
        loop {
            let byte = match self.bits.read_raw_byte() {
                Ok(b) => b,
                Err(Error::UnexpectedEnd { .. }) => return Ok(None),
                Err(e) => return Err(e),
            };
            let window = ((prev as u16) << 8) | byte as u16;
            if window & SYNC_MASK == SYNC_VALUE {
                self.bits.reset_crc8();
                self.bits.reset_crc16();
                self.bits.feed_crc8_byte(prev);
                self.bits.feed_crc16_byte(prev);
                self.bits.feed_crc8_byte(byte);
                self.bits.feed_crc16_byte(byte);
                return Ok(Some(window));
            }
            prev = byte;
        }
    }

    fn decode_one_frame(
        &mut self,
        info: &StreamInfo,
        sync_word: u16,
        pcm_buffer: &mut Vec<u8>,
    ) -> Result<()> {
        let frame = frame::decode_frame_presynced(&mut self.bits, info.bits_per_sample, sync_word)?;
        pcm_buffer.clear();
        let bps = frame.header.bits_per_sample.unwrap_or(info.bits_per_sample);
        pcm::pack_interleaved(&frame.channels, bps, pcm_buffer);
        Ok(())
    }
}

/// Adapts a `BitReader` to `io::Read` for the byte-aligned metadata reader,
/// which talks to a plain `io::Read` rather than the bit-level API.
struct MetadataByteAdapter<'a, R>(&'a mut BitReader<R>);

impl<'a, R: io::Read> io::Read for MetadataByteAdapter<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read_byte_block_aligned(buf) {
            Ok(()) => Ok(buf.len()),
            Err(Error::UnexpectedEnd { .. }) => Ok(0),
            Err(Error::Io(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "metadata read failed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    use crate::crc::{Crc8, Crc16};
    use crate::processor::Processor;

    #[test]
    fn default_options_enable_resync_but_not_verify() {
        let opts = DecoderOptions::default();
        assert!(!opts.verify);
        assert!(opts.resync_on_bad_frame);
    }

    struct FramePcmCollector {
        frames: Mutex<Vec<Vec<u8>>>,
    }

    impl Processor for FramePcmCollector {
        fn on_pcm(&self, bytes: &[u8]) {
            self.frames.lock().unwrap().push(bytes.to_vec());
        }
    }

    fn streaminfo_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.push(0x0a);
        bytes.push(0xc4);
        let channels_code = 1u8; // 2 channels
        let bps_code = 15u8; // 16 bits per sample
        let bps_msb = (bps_code >> 4) & 1;
        bytes.push(0x40 | (channels_code << 1) | bps_msb);
        bytes.push((bps_code & 0x0f) << 4);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&[0u8; 16]);
        bytes
    }

    fn stream_header() -> Vec<u8> {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"fLaC");
        stream.push(0x80);
        stream.extend_from_slice(&[0, 0, 34]);
        stream.extend_from_slice(&streaminfo_bytes());
        stream
    }

    /// Builds a stereo, block-size-4096 frame holding two independent
    /// CONSTANT subframes at `value`, 16 bits per sample.
    fn stereo_constant_frame(value: i16) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.push(0xff);
        frame.push(0xf8);
        frame.push(0b1100_0000);
        frame.push(0b0001_0000);
        frame.push(0x00);

        let mut crc8 = Crc8::new();
        crc8.update_bytes(&frame);
        frame.push(crc8.value());

        for _ in 0..2 {
            frame.push(0b0000_0000);
            frame.extend_from_slice(&value.to_be_bytes());
        }

        let mut crc16 = Crc16::new();
        crc16.update_bytes(&frame);
        let crc16_value = crc16.value();
        frame.push((crc16_value >> 8) as u8);
        frame.push((crc16_value & 0xff) as u8);
        frame
    }

    #[test]
    fn bad_frame_crc_resyncs_past_the_bad_frame_and_decodes_the_next_one() {
        let mut stream = stream_header();
        stream.extend_from_slice(&stereo_constant_frame(100));

        let mut bad_frame = stereo_constant_frame(200);
        let last = bad_frame.len() - 1;
        bad_frame[last] ^= 0x01;
        stream.extend_from_slice(&bad_frame);

        stream.extend_from_slice(&stereo_constant_frame(300));

        let mut driver = Driver::new(Cursor::new(stream), DecoderOptions::default());
        let registry = ProcessorRegistry::default();
        let collector = Arc::new(FramePcmCollector {
            frames: Mutex::new(Vec::new()),
        });
        registry.register(collector.clone());

        driver.run(&registry).unwrap();

        let frames = collector.frames.lock().unwrap();
        assert_eq!(frames.len(), 2, "the corrupted middle frame must be skipped, not dispatched");

        let first_sample = i16::from_be_bytes([frames[0][0], frames[0][1]]);
        let second_sample = i16::from_be_bytes([frames[1][0], frames[1][1]]);
        assert_eq!(first_sample, 100);
        assert_eq!(second_sample, 300);
    }
}
