//! Thin wrappers over the libc descriptor calls the transports need.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::time::Duration;

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, poll, pollfd};

/// The two ends of one unidirectional OS pipe.
#[derive(Debug)]
pub struct PipePair {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl PipePair {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        // Owned from here on, so an early return below closes both ends.
        let (read, write) =
            unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(read.as_fd())?;
        set_cloexec(write.as_fd())?;
        Ok(Self { read, write })
    }
}

fn set_cloexec(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }

    let result = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

pub fn read(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

pub fn write(fd: BorrowedFd<'_>, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::write(fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Bytes queued on `fd` that a read would return right now.
pub fn bytes_available(fd: BorrowedFd<'_>) -> io::Result<usize> {
    let mut queued: libc::c_int = 0;
    if unsafe { libc::ioctl(fd.as_raw_fd(), libc::FIONREAD, &mut queued) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(usize::try_from(queued).unwrap_or(0))
}

/// What woke a reader blocked in [`wait_readable_or_quit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wakeup {
    pub quit: bool,
    pub readable: bool,
    pub hangup: bool,
}

/// Blocks with no timeout until `data` or `quit` needs attention.
///
/// `EINTR` is retried. `POLLERR`/`POLLNVAL` on the data descriptor are
/// reported as a hang-up.
pub fn wait_readable_or_quit(data: BorrowedFd<'_>, quit: BorrowedFd<'_>) -> io::Result<Wakeup> {
    let mut fds = [
        pollfd {
            fd: data.as_raw_fd(),
            events: POLLIN,
            revents: 0,
        },
        pollfd {
            fd: quit.as_raw_fd(),
            events: POLLIN,
            revents: 0,
        },
    ];

    loop {
        let rc = unsafe { poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        let data_events = fds[0].revents;
        let quit_events = fds[1].revents;
        return Ok(Wakeup {
            quit: quit_events & (POLLIN | POLLHUP | POLLERR | POLLNVAL) != 0,
            readable: data_events & POLLIN != 0,
            hangup: data_events & (POLLHUP | POLLERR | POLLNVAL) != 0,
        });
    }
}

/// Waits until `fd` accepts writes. `None` waits forever.
///
/// Returns `Ok(false)` on timeout. A hung-up peer is reported as
/// `BrokenPipe` so the caller's next write fails the same way.
pub fn wait_writable(fd: BorrowedFd<'_>, timeout: Option<Duration>) -> io::Result<bool> {
    let mut fds = [pollfd {
        fd: fd.as_raw_fd(),
        events: POLLOUT,
        revents: 0,
    }];
    let timeout_ms = poll_timeout_ms(timeout);

    loop {
        let rc = unsafe { poll(fds.as_mut_ptr(), 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(false);
        }

        let events = fds[0].revents;
        if events & (POLLHUP | POLLERR) != 0 {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if events & POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        return Ok(events & POLLOUT != 0);
    }
}

/// `poll` timeout in whole milliseconds, rounded up so a short remaining
/// deadline still waits instead of polling once.
fn poll_timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        Some(timeout) => timeout.as_micros().div_ceil(1000).min(i32::MAX as u128) as i32,
        None => -1,
    }
}
