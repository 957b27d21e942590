//! Shared helpers for transport integration tests.

#![allow(dead_code)]

use std::sync::Once;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use termio::Ingest;

pub const TIMEOUT: Duration = Duration::from_secs(10);

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        // Leaked on purpose: the guard must outlive every test in the binary.
        std::mem::forget(termio_common::init_tracing("warn"));
    });
}

/// Ingestion sink that forwards every chunk over a channel.
pub struct Collector {
    tx: channel::Sender<Vec<u8>>,
}

pub struct Received {
    rx: channel::Receiver<Vec<u8>>,
    bytes: Vec<u8>,
}

pub fn collector() -> (Collector, Received) {
    let (tx, rx) = channel::unbounded();
    (
        Collector { tx },
        Received {
            rx,
            bytes: Vec::new(),
        },
    )
}

impl Ingest for Collector {
    fn ingest(&self, data: &[u8]) {
        let _ = self.tx.send(data.to_vec());
    }
}

impl Received {
    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> &[u8] {
        while let Ok(chunk) = self.rx.try_recv() {
            self.bytes.extend(chunk);
        }
        &self.bytes
    }

    /// Waits until at least `len` bytes have arrived or the timeout passes.
    pub fn wait_for_len(&mut self, len: usize) -> &[u8] {
        let deadline = Instant::now() + TIMEOUT;
        while self.bytes.len() < len {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(chunk) => self.bytes.extend(chunk),
                Err(_) => break,
            }
        }
        &self.bytes
    }

    /// Waits until the received bytes contain `needle`.
    pub fn wait_for(&mut self, needle: &[u8]) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            if self.bytes.windows(needle.len()).any(|w| w == needle) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(chunk) => self.bytes.extend(chunk),
                Err(channel::RecvTimeoutError::Timeout) => return false,
                Err(channel::RecvTimeoutError::Disconnected) => {
                    return self.bytes.windows(needle.len()).any(|w| w == needle);
                }
            }
        }
    }
}
