//! Pooled, non-blocking write path toward the outbound descriptor.
//!
//! `queue_write` splits input into fixed-size pooled buffers and appends one
//! request per buffer to a FIFO. Nothing is written until the worker's loop
//! calls [`WriteQueue::tick`] or [`WriteQueue::flush`]; those drive the
//! queue front to back and release each request and its buffer once the
//! bytes are fully written or the write has failed.

use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::TransportError;
use crate::fd;
use crate::pool::{ObjectPool, PoolIndex};

pub const WRITE_BUF_LEN: usize = 64;

/// Backing bytes of one queued write.
#[derive(Clone)]
pub struct WriteBuf([u8; WRITE_BUF_LEN]);

impl Default for WriteBuf {
    fn default() -> Self {
        Self([0; WRITE_BUF_LEN])
    }
}

/// One in-flight write: which buffer, how much of it is valid, how much of
/// it has reached the descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteRequest {
    buf: Option<PoolIndex>,
    len: usize,
    written: usize,
}

/// Copies the next chunk of `data` into `buf`.
///
/// Returns `(consumed, filled)`: how many input bytes were taken and how many
/// output bytes were produced. With `linefeed` set every `\r` becomes
/// `\r\n`; an expansion that does not fit is left for the next chunk, never
/// split. `buf` must hold at least two bytes.
pub fn fill_chunk(data: &[u8], buf: &mut [u8], linefeed: bool) -> (usize, usize) {
    let direct = data.len().min(buf.len());
    if !linefeed || !data[..direct].contains(&b'\r') {
        buf[..direct].copy_from_slice(&data[..direct]);
        return (direct, direct);
    }

    let mut consumed = 0;
    let mut filled = 0;
    for &byte in data {
        let need = if byte == b'\r' { 2 } else { 1 };
        if filled + need > buf.len() {
            break;
        }
        buf[filled] = byte;
        if byte == b'\r' {
            buf[filled + 1] = b'\n';
        }
        filled += need;
        consumed += 1;
    }
    (consumed, filled)
}

/// Outbound stream plus the pools and FIFO that feed it.
///
/// Owned by exactly one worker thread; nothing here is shared with the
/// read thread.
pub struct WriteQueue {
    fd: OwnedFd,
    requests: ObjectPool<WriteRequest>,
    buffers: ObjectPool<WriteBuf>,
    queue: VecDeque<PoolIndex>,
    completed: u64,
    failed: u64,
    last_error: Option<TransportError>,
}

impl WriteQueue {
    pub fn new(fd: OwnedFd, segment_len: usize) -> Result<Self, TransportError> {
        fd::set_nonblocking(fd.as_fd()).map_err(TransportError::descriptor)?;
        Ok(Self {
            fd,
            requests: ObjectPool::new(segment_len),
            buffers: ObjectPool::new(segment_len),
            queue: VecDeque::new(),
            completed: 0,
            failed: 0,
            last_error: None,
        })
    }

    /// Splits `data` into pooled chunks and queues them in order.
    pub fn queue_write(&mut self, data: &[u8], linefeed: bool) {
        let mut rest = data;
        while !rest.is_empty() {
            let req_idx = self.requests.acquire();
            let buf_idx = self.buffers.acquire();

            let buf = &mut self.buffers.get_mut(buf_idx).0;
            let (consumed, filled) = fill_chunk(rest, buf, linefeed);
            *self.requests.get_mut(req_idx) = WriteRequest {
                buf: Some(buf_idx),
                len: filled,
                written: 0,
            };
            self.queue.push_back(req_idx);
            rest = &rest[consumed..];
        }
    }

    /// Writes as much of the queue as the descriptor accepts without
    /// blocking. Returns the number of requests completed or dropped.
    pub fn tick(&mut self) -> usize {
        let mut finished = 0;
        while let Some(&req_idx) = self.queue.front() {
            let req = *self.requests.get(req_idx);
            let Some(buf_idx) = req.buf else {
                self.queue.pop_front();
                self.complete(req_idx, None);
                finished += 1;
                continue;
            };

            let pending = &self.buffers.get(buf_idx).0[req.written..req.len];
            if pending.is_empty() {
                self.queue.pop_front();
                self.complete(req_idx, None);
                finished += 1;
                continue;
            }

            match fd::write(self.fd.as_fd(), pending) {
                Ok(0) => break,
                Ok(n) => {
                    let req = self.requests.get_mut(req_idx);
                    req.written += n;
                    if req.written >= req.len {
                        self.queue.pop_front();
                        self.complete(req_idx, None);
                        finished += 1;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.queue.pop_front();
                    self.complete(req_idx, Some(e));
                    finished += 1;
                }
            }
        }
        finished
    }

    /// Drives the queue until it is empty or `timeout` elapses, waiting for
    /// writability in between. `None` waits as long as it takes.
    ///
    /// Returns `true` once nothing is left queued.
    pub fn flush(&mut self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            self.tick();
            if self.queue.is_empty() {
                return true;
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            match fd::wait_writable(self.fd.as_fd(), remaining) {
                Ok(true) => {}
                Ok(false) => return false,
                // The next tick hits the same condition and drops the writes.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    warn!(error = %e, "Waiting for outbound descriptor failed");
                    return false;
                }
            }
        }
    }

    fn complete(&mut self, req_idx: PoolIndex, error: Option<io::Error>) {
        let req = *self.requests.get(req_idx);
        match error {
            Some(e) => {
                let err = TransportError::write(e);
                warn!(
                    error = %err,
                    code = err.code(),
                    len = req.len,
                    written = req.written,
                    "Queued write failed, dropping it"
                );
                self.failed += 1;
                self.last_error = Some(err);
            }
            None => self.completed += 1,
        }
        if let Some(buf_idx) = req.buf {
            self.buffers.release(buf_idx);
        }
        *self.requests.get_mut(req_idx) = WriteRequest::default();
        self.requests.release(req_idx);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Outstanding `(requests, buffers)` drawn from the pools.
    pub fn pool_in_use(&self) -> (usize, usize) {
        (self.requests.in_use(), self.buffers.in_use())
    }

    pub fn completed_writes(&self) -> u64 {
        self.completed
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed
    }

    /// Most recent dropped write, cleared by the call.
    pub fn take_last_error(&mut self) -> Option<TransportError> {
        self.last_error.take()
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        if !self.queue.is_empty() {
            debug!(pending = self.queue.len(), "Discarding unflushed writes");
        }
    }
}
