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

//! The `processor` module is the concurrent touch point of an otherwise
//! single-threaded, synchronous decoder: a registry of PCM/metadata
//! listeners that can be mutated from one thread while dispatch runs on
//! another.

use std::sync::{Arc, Mutex};

use crate::metadata::StreamInfo;

/// Receives the events a running decode emits.
///
/// Both callbacks are synchronous and return no value; a processor that
/// wants to stop the decode early sets `abort` via `std::sync::atomic` state
/// it owns and checks after returning, rather than through a return value
/// here (see `Driver::run`'s abort handling).
pub trait Processor: Send + Sync {
    /// Called once, after STREAMINFO has been parsed.
    fn on_stream_info(&self, _info: &StreamInfo) {}

    /// Called once per decoded frame, with interleaved little-endian PCM
    /// bytes at the frame's bit depth. The slice is only valid for the
    /// duration of the call.
    fn on_pcm(&self, bytes: &[u8]);
}

/// A mutable set of processors, safe to register/unregister concurrently
/// with dispatch.
///
/// Iteration snapshots the registry under the lock, then releases it before
/// invoking any processor, so a processor that registers or unregisters
/// another during its own callback does not disturb the current fan-out.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: Mutex<Vec<Arc<dyn Processor>>>,
}

impl ProcessorRegistry {
    pub fn new() -> ProcessorRegistry {
        ProcessorRegistry {
            processors: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, processor: Arc<dyn Processor>) {
        self.processors.lock().unwrap().push(processor);
    }

    /// Removes every registered processor whose `Arc` pointer equals
    /// `processor`'s.
    pub fn unregister(&self, processor: &Arc<dyn Processor>) {
        self.processors
            .lock()
            .unwrap()
            .retain(|p| !Arc::ptr_eq(p, processor));
    }

    fn snapshot(&self) -> Vec<Arc<dyn Processor>> {
        self.processors.lock().unwrap().clone()
    }

    pub fn dispatch_stream_info(&self, info: &StreamInfo) {
        for p in self.snapshot() {
            p.on_stream_info(info);
        }
    }

    pub fn dispatch_pcm(&self, bytes: &[u8]) {
        for p in self.snapshot() {
            p.on_pcm(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcessor {
        calls: AtomicUsize,
    }

    impl Processor for CountingProcessor {
        fn on_pcm(&self, _bytes: &[u8]) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatch_reaches_every_registered_processor() {
        let registry = ProcessorRegistry::new();
        let a = Arc::new(CountingProcessor {
            calls: AtomicUsize::new(0),
        });
        let b = Arc::new(CountingProcessor {
            calls: AtomicUsize::new(0),
        });
        registry.register(a.clone());
        registry.register(b.clone());

        registry.dispatch_pcm(&[1, 2, 3]);

        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_stops_future_dispatch() {
        let registry = ProcessorRegistry::new();
        let a: Arc<dyn Processor> = Arc::new(CountingProcessor {
            calls: AtomicUsize::new(0),
        });
        registry.register(a.clone());
        registry.unregister(&a);
        registry.dispatch_pcm(&[1]);
        assert_eq!(registry.snapshot().len(), 0);
    }
}
