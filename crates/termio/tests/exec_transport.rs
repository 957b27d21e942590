//! Exec transport tests against a real child on a pseudo-terminal.

#![cfg(unix)]

mod common;

use std::sync::Arc;

use common::{TIMEOUT, collector, init_tracing};
use termio::{Backend, BackendKind, Exec, ExecConfig, GridSize, ScreenSize};

#[test]
fn test_child_output_reaches_ingest() {
    init_tracing();
    let (sink, mut received) = collector();
    let config = ExecConfig::new("/bin/sh").arg("-c").arg("printf 'ready\\n'; sleep 5");
    let mut backend = Backend::Exec(Exec::new(config));
    backend
        .init_terminal(GridSize::new(80, 24), ScreenSize::default())
        .unwrap();

    let data = backend.thread_enter(Arc::new(sink)).unwrap();
    assert_eq!(data.kind(), BackendKind::Exec);
    assert!(received.wait_for(b"ready"));

    backend.thread_exit(data);
    backend.deinit();
}

#[test]
fn test_queued_input_is_echoed_by_child() {
    init_tracing();
    let (sink, mut received) = collector();
    let mut backend = Backend::Exec(Exec::new(ExecConfig::new("/bin/cat")));
    let mut data = backend.thread_enter(Arc::new(sink)).unwrap();

    backend.queue_write(&mut data, b"ping\r", false).unwrap();
    assert!(data.flush(Some(TIMEOUT)));
    assert!(received.wait_for(b"ping"));

    backend
        .resize(GridSize::new(100, 30), ScreenSize::new(1000, 600))
        .unwrap();
    backend.thread_exit(data);
}

#[test]
fn test_missing_command_fails_to_enter() {
    init_tracing();
    let (sink, _received) = collector();
    let mut backend = Backend::Exec(Exec::new(ExecConfig::new(
        "/nonexistent/termio-integration-command",
    )));
    let err = match backend.thread_enter(Arc::new(sink)) {
        Ok(_) => panic!("spawning a missing command should fail"),
        Err(e) => e,
    };
    assert_eq!(err.operation(), "spawn");
}
