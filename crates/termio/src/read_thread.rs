//! Background reader for the inbound descriptor.
//!
//! The thread owns its data descriptor and the read end of the quit pipe.
//! It drains the data descriptor without blocking, then parks in `poll` on
//! both. Writing one byte to the quit pipe wakes it for shutdown.

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, error, warn};

use crate::error::TransportError;
use crate::fd;
use crate::fd::PipePair;
use crate::ingest::Ingest;

pub const READ_BUF_LEN: usize = 1024;

/// Upper bound on bytes forwarded before the thread looks at the quit pipe
/// again.
const DRAIN_BUDGET: usize = 64 * READ_BUF_LEN;

/// Result of draining the data descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    /// The descriptor would block; wait for more.
    Idle,
    /// The byte budget ran out with data possibly still queued.
    Budget,
    /// End of stream or an EOF-equivalent error; exit cleanly.
    Closed,
    /// Unrecoverable read error; exit after logging.
    Failed,
}

/// Handle to a running read thread and the write end of its quit pipe.
///
/// Dropping the handle performs the same signal-and-join as [`stop`].
///
/// [`stop`]: ReadThread::stop
#[derive(Debug)]
pub struct ReadThread {
    handle: Option<JoinHandle<()>>,
    quit: Option<OwnedFd>,
}

impl ReadThread {
    /// Starts a named reader over `data`, woken for shutdown through `quit`.
    ///
    /// On failure `data` and both quit ends are closed before returning.
    pub(crate) fn spawn(
        name: &str,
        data: OwnedFd,
        quit: PipePair,
        ingest: Arc<dyn Ingest>,
    ) -> Result<Self, TransportError> {
        let PipePair {
            read: quit_rx,
            write: quit_tx,
        } = quit;
        let span = tracing::debug_span!("read_thread", thread = name);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = span.enter();
                run(data, quit_rx, ingest.as_ref());
            })
            .map_err(TransportError::spawn)?;

        Ok(Self {
            handle: Some(handle),
            quit: Some(quit_tx),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wakes the thread and blocks until it has returned.
    ///
    /// A broken pipe on the quit write means the thread already exited on
    /// its own and is not reported. Calling this twice is a no-op.
    pub fn stop(&mut self) {
        let Some(quit) = self.quit.take() else {
            return;
        };

        loop {
            match fd::write(quit.as_fd(), &[0]) {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
                Err(e) => {
                    warn!(error = %e, "Failed to signal read thread");
                    break;
                }
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Read thread panicked");
            }
        }
        drop(quit);
    }
}

impl Drop for ReadThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(data: OwnedFd, quit: OwnedFd, ingest: &dyn Ingest) {
    if let Err(e) = fd::set_nonblocking(data.as_fd()) {
        warn!(error = %e, "Failed to make inbound descriptor non-blocking");
    }

    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        match drain(&data, &mut buf, ingest, DRAIN_BUDGET) {
            Drain::Idle | Drain::Budget => {}
            Drain::Closed => {
                debug!("Inbound descriptor closed");
                return;
            }
            Drain::Failed => return,
        }

        let wakeup = match fd::wait_readable_or_quit(data.as_fd(), quit.as_fd()) {
            Ok(wakeup) => wakeup,
            Err(e) => {
                error!(error = %e, "poll on inbound descriptor failed");
                return;
            }
        };

        if wakeup.quit || wakeup.hangup {
            // Deliver what was queued when the signal arrived, and no more:
            // a writer that never stops must not hold up shutdown.
            let queued = fd::bytes_available(data.as_fd()).unwrap_or(DRAIN_BUDGET);
            drain(&data, &mut buf, ingest, queued);
            if wakeup.quit {
                debug!("Read thread received quit signal");
                drop(quit);
            } else {
                debug!("Inbound descriptor hung up");
            }
            return;
        }
    }
}

/// Forwards at most `budget` bytes from `data` to `ingest`.
fn drain(data: &OwnedFd, buf: &mut [u8], ingest: &dyn Ingest, budget: usize) -> Drain {
    let mut remaining = budget;
    loop {
        if remaining == 0 {
            return Drain::Budget;
        }
        let len = buf.len().min(remaining);
        match fd::read(data.as_fd(), &mut buf[..len]) {
            Ok(0) => return Drain::Closed,
            Ok(n) => {
                ingest.ingest(&buf[..n]);
                remaining -= n;
            }
            Err(e) => match classify(&e) {
                ReadError::Retry => continue,
                ReadError::WouldBlock => return Drain::Idle,
                ReadError::Eof => return Drain::Closed,
                ReadError::Fatal => {
                    error!(error = %e, "Read from inbound descriptor failed");
                    return Drain::Failed;
                }
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadError {
    Retry,
    WouldBlock,
    Eof,
    Fatal,
}

/// `EBADF` (not open for reading) and `EIO` count as end of stream.
fn classify(err: &io::Error) -> ReadError {
    match err.kind() {
        io::ErrorKind::Interrupted => return ReadError::Retry,
        io::ErrorKind::WouldBlock => return ReadError::WouldBlock,
        _ => {}
    }
    match err.raw_os_error() {
        Some(libc::EBADF) | Some(libc::EIO) => ReadError::Eof,
        _ => ReadError::Fatal,
    }
}
