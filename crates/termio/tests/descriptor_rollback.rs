//! Construction and activation close everything they opened when the
//! process runs out of descriptors.
//!
//! The checks lower `RLIMIT_NOFILE`, so they run in a re-executed copy of
//! this test binary instead of the shared test process.

#![cfg(unix)]

mod common;

use std::process::Command;
use std::sync::Arc;

use common::collector;
use termio::{Config, Pipe, TransportError};

const CHILD_ENV: &str = "TERMIO_FD_LIMIT_CHILD";
const CHILD_TEST: &str = "test_exhausted_descriptors_in_child";
const SCAN_LIMIT: i32 = 4096;

fn open_fds() -> Vec<i32> {
    (0..SCAN_LIMIT)
        .filter(|&fd| unsafe { libc::fcntl(fd, libc::F_GETFD) } != -1)
        .collect()
}

/// Lowers the soft descriptor limit until exactly `slots` new descriptors
/// can be opened. The old limit comes back on drop.
struct FdLimit {
    original: libc::rlimit,
}

impl FdLimit {
    fn with_free_slots(slots: usize) -> Self {
        assert!(slots > 0);
        let mut original = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        assert_eq!(
            unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut original) },
            0
        );

        let open = open_fds();
        let mut free = 0;
        let mut highest = 0;
        while free < slots {
            if !open.contains(&highest) {
                free += 1;
                if free == slots {
                    break;
                }
            }
            highest += 1;
        }

        let limited = libc::rlimit {
            rlim_cur: (highest + 1) as libc::rlim_t,
            rlim_max: original.rlim_max,
        };
        assert_eq!(
            unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limited) },
            0
        );
        Self { original }
    }
}

impl Drop for FdLimit {
    fn drop(&mut self) {
        unsafe {
            libc::setrlimit(libc::RLIMIT_NOFILE, &self.original);
        }
    }
}

fn construction_rolls_back() {
    let before = open_fds();

    // One slot: the first pair fails. Three slots: the second pair fails
    // and the first must be closed again.
    for slots in [1, 3] {
        let limit = FdLimit::with_free_slots(slots);
        let result = Pipe::new(Config::default());
        drop(limit);

        match result {
            Err(TransportError::Pipe { .. }) => {}
            Err(e) => panic!("{slots} slots: unexpected error {e}"),
            Ok(_) => panic!("{slots} slots: construction should fail"),
        }
        assert_eq!(open_fds(), before, "{slots} slots: descriptors leaked");
    }
}

fn activation_rolls_back() {
    let mut pipe = Pipe::new(Config::default()).unwrap();
    let before = open_fds();

    // Activation opens the quit pair, then the stream dup, then the reader dup.
    for (slots, operation) in [(1, "quit_pipe"), (2, "descriptor"), (3, "descriptor")] {
        let (sink, _received) = collector();
        let limit = FdLimit::with_free_slots(slots);
        let result = pipe.thread_enter(Arc::new(sink));
        drop(limit);

        match result {
            Err(e) => assert_eq!(e.operation(), operation, "{slots} slots"),
            Ok(_) => panic!("{slots} slots: activation should fail"),
        }
        assert_eq!(open_fds(), before, "{slots} slots: descriptors leaked");
    }

    let (sink, _received) = collector();
    let data = pipe.thread_enter(Arc::new(sink)).unwrap();
    pipe.thread_exit(data);
    assert_eq!(open_fds(), before);
}

#[test]
fn test_exhausted_descriptors_in_child() {
    if std::env::var_os(CHILD_ENV).is_none() {
        return;
    }
    // Slot counting assumes the standard descriptors are taken.
    assert!(open_fds().starts_with(&[0, 1, 2]));

    construction_rolls_back();
    activation_rolls_back();
}

#[test]
fn test_descriptor_exhaustion_leaks_nothing() {
    let exe = std::env::current_exe().unwrap();
    let output = Command::new(exe)
        .args([CHILD_TEST, "--exact", "--test-threads=1", "--nocapture"])
        .env(CHILD_ENV, "1")
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "child failed:\n{stdout}\n{stderr}"
    );
    assert!(stdout.contains("1 passed"), "child ran nothing:\n{stdout}");
}
