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

//! A FLAC bitstream decoder producing bit-identical PCM.
//!
//! This crate decodes the FLAC stream format itself: stream and frame
//! headers, metadata blocks, and the fixed/LPC predictors and Rice-coded
//! residuals that reconstruct each channel's samples. It does not implement
//! a byte source (files, network streams), an audio sink, or encoding.
//!
//! The entry point is [`FlacReader`], which parses STREAMINFO up front and
//! then lets the caller pull decoded frames one at a time via registered
//! processors.

pub mod bitstream;
pub mod crc;
pub mod driver;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod pcm;
pub mod predictor;
pub mod processor;
pub mod rice;
pub mod source;
pub mod subframe;
pub mod validate;

use std::io;
use std::sync::Arc;

pub use driver::{DecoderOptions, Driver};
pub use error::{Error, Result};
pub use metadata::StreamInfo;
pub use processor::Processor;

/// Decodes a FLAC stream, dispatching STREAMINFO and PCM events to
/// registered processors as it goes.
///
/// This is the library's main entry point: construct one from any
/// `io::Read`, register processors, then call [`FlacReader::decode`] to run
/// the whole stream to completion.
pub struct FlacReader<R> {
    driver: Driver<R>,
    registry: processor::ProcessorRegistry,
}

impl<R: io::Read> FlacReader<R> {
    /// Wraps `reader` with default decoder options (no MD5 verification,
    /// resync past bad frame CRCs).
    pub fn new(reader: R) -> FlacReader<R> {
        FlacReader::with_options(reader, DecoderOptions::default())
    }

    pub fn with_options(reader: R, options: DecoderOptions) -> FlacReader<R> {
        FlacReader {
            driver: Driver::new(reader, options),
            registry: processor::ProcessorRegistry::new(),
        }
    }

    /// Registers a processor to receive STREAMINFO and PCM events.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.registry.register(processor);
    }

    /// A flag any registered processor can set to stop the decode after the
    /// current frame.
    pub fn abort_flag(&self) -> Arc<std::sync::atomic::AtomicBool> {
        self.driver.abort_flag()
    }

    /// Runs the stream to completion: parses all metadata, then every
    /// frame, dispatching events to registered processors as they occur.
    pub fn decode(&mut self) -> Result<()> {
        self.driver.run(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CollectingProcessor {
        stream_info_calls: AtomicUsize,
        pcm_bytes: Mutex<Vec<u8>>,
    }

    impl Processor for CollectingProcessor {
        fn on_stream_info(&self, _info: &StreamInfo) {
            self.stream_info_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_pcm(&self, bytes: &[u8]) {
            self.pcm_bytes.lock().unwrap().extend_from_slice(bytes);
        }
    }

    fn streaminfo_bytes(sample_rate_code: [u8; 3]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(0x10);
        bytes.push(0x00); // min block size 4096
        bytes.push(0x10);
        bytes.push(0x00); // max block size 4096
        bytes.extend_from_slice(&[0, 0, 0]); // min frame size unknown
        bytes.extend_from_slice(&[0, 0, 0]); // max frame size unknown
        bytes.extend_from_slice(&sample_rate_code);
        bytes.push(0x00); // bits-per-sample low nibble + n_samples top nibble
        bytes.extend_from_slice(&[0, 0, 0, 0]); // n_samples unknown
        bytes.extend_from_slice(&[0u8; 16]); // md5sum
        bytes
    }

    fn build_mono_constant_stream() -> Vec<u8> {
        // STREAMINFO: sample rate 44100 Hz, mono, 8 bits per sample. The
        // sample rate + channel/bps fields are stitched exactly as
        // metadata::read_streaminfo_block unpacks them: 20 bits sample
        // rate, 3 bits channels - 1, 5 bits bits-per-sample - 1.
        let sample_rate_code = [0x0a, 0xc4, 0x40];
        let mut info = streaminfo_bytes(sample_rate_code);
        info[13] = 0x70; // bits_per_sample - 1 = 7, in the top nibble

        let mut stream = Vec::new();
        stream.extend_from_slice(b"fLaC");
        stream.push(0x80); // last metadata block, type STREAMINFO
        stream.extend_from_slice(&[0, 0, 34]);
        stream.extend_from_slice(&info);

        // One frame: fixed blocking, block size 192 (code 0001), sample
        // rate "from streaminfo" (code 0000), channel assignment
        // independent mono (code 0000), bits per sample "from streaminfo"
        // (code 000), reserved bit 0, frame number 0 (UTF-8 single byte),
        // one CONSTANT subframe, footer CRC-16.
        let mut frame = Vec::new();
        frame.push(0xff);
        frame.push(0xf8); // sync + reserved 0 + fixed blocking strategy
        frame.push(0b0001_0000); // block size code 0001 (192), sample rate code 0000
        frame.push(0b0000_0000); // channel assignment 0000 (mono), bps 000, reserved 0
        frame.push(0x00); // frame number 0 (UTF-8 single byte)

        let mut crc8 = crate::crc::Crc8::new();
        crc8.update_bytes(&frame);
        frame.push(crc8.value());

        // CONSTANT subframe: 0 padding, type 000000, no wasted bits, value 42.
        frame.push(0b0000_0000);
        frame.push(42);

        let mut crc16 = crate::crc::Crc16::new();
        crc16.update_bytes(&frame);
        let crc16_value = crc16.value();
        frame.push((crc16_value >> 8) as u8);
        frame.push((crc16_value & 0xff) as u8);

        stream.extend_from_slice(&frame);
        stream
    }

    #[test]
    fn decodes_a_single_constant_frame_stream() {
        let bytes = build_mono_constant_stream();
        let mut reader = FlacReader::new(io::Cursor::new(bytes));

        let processor = Arc::new(CollectingProcessor {
            stream_info_calls: AtomicUsize::new(0),
            pcm_bytes: Mutex::new(Vec::new()),
        });
        reader.register(processor.clone());

        reader.decode().unwrap();

        assert_eq!(processor.stream_info_calls.load(Ordering::SeqCst), 1);
        let pcm = processor.pcm_bytes.lock().unwrap();
        // 192 samples of value 42 at 8 bits per sample, mono.
        assert_eq!(pcm.len(), 192);
        assert!(pcm.iter().all(|&b| b == 42));
    }
}
