//! One contract over every transport.
//!
//! The rest of the engine drives a [`Backend`] and the [`ThreadData`] it
//! hands out, never a concrete transport.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::config::{GridSize, ScreenSize};
use crate::error::TransportError;
use crate::exec::{Exec, ExecThreadData};
use crate::ingest::Ingest;
use crate::pipe::{Pipe, PipeThreadData};
use crate::write::WriteQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Exec,
    Pipe,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Exec => "exec",
            BackendKind::Pipe => "pipe",
        }
    }
}

pub enum Backend {
    Exec(Exec),
    Pipe(Pipe),
}

pub enum ThreadData {
    Exec(ExecThreadData),
    Pipe(PipeThreadData),
}

impl ThreadData {
    pub fn kind(&self) -> BackendKind {
        match self {
            ThreadData::Exec(_) => BackendKind::Exec,
            ThreadData::Pipe(_) => BackendKind::Pipe,
        }
    }

    pub fn writes(&mut self) -> &mut WriteQueue {
        match self {
            ThreadData::Exec(data) => data.writes(),
            ThreadData::Pipe(data) => data.writes(),
        }
    }

    /// One non-blocking pass over the queued writes.
    pub fn tick(&mut self) -> usize {
        self.writes().tick()
    }

    pub fn flush(&mut self, timeout: Option<Duration>) -> bool {
        self.writes().flush(timeout)
    }

    pub fn reader_finished(&self) -> bool {
        match self {
            ThreadData::Exec(data) => data.reader_finished(),
            ThreadData::Pipe(data) => data.reader_finished(),
        }
    }
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Exec(_) => BackendKind::Exec,
            Backend::Pipe(_) => BackendKind::Pipe,
        }
    }

    fn mismatch(kind: BackendKind, operation: &'static str) -> TransportError {
        TransportError::BackendMismatch {
            backend: kind.as_str(),
            operation,
        }
    }

    pub fn deinit(self) {
        match self {
            Backend::Exec(exec) => exec.deinit(),
            Backend::Pipe(pipe) => pipe.deinit(),
        }
    }

    pub fn init_terminal(
        &mut self,
        grid_size: GridSize,
        screen_size: ScreenSize,
    ) -> Result<(), TransportError> {
        match self {
            Backend::Exec(exec) => exec.init_terminal(grid_size, screen_size),
            Backend::Pipe(pipe) => {
                pipe.init_terminal(grid_size, screen_size);
                Ok(())
            }
        }
    }

    pub fn thread_enter(
        &mut self,
        ingest: Arc<dyn Ingest>,
    ) -> Result<ThreadData, TransportError> {
        match self {
            Backend::Exec(exec) => exec.thread_enter(ingest).map(ThreadData::Exec),
            Backend::Pipe(pipe) => pipe.thread_enter(ingest).map(ThreadData::Pipe),
        }
    }

    /// Blocks until the read thread has exited, then releases `data`.
    pub fn thread_exit(&mut self, data: ThreadData) {
        match (self, data) {
            (Backend::Exec(exec), ThreadData::Exec(data)) => exec.thread_exit(data),
            (Backend::Pipe(pipe), ThreadData::Pipe(data)) => pipe.thread_exit(data),
            (backend, data) => {
                // Dropping the thread data still stops and joins its reader.
                error!(
                    backend = backend.kind().as_str(),
                    data = data.kind().as_str(),
                    "thread_exit called with foreign thread data"
                );
            }
        }
    }

    pub fn focus_gained(
        &mut self,
        data: &mut ThreadData,
        focused: bool,
    ) -> Result<(), TransportError> {
        let kind = self.kind();
        match (self, data) {
            (Backend::Exec(exec), ThreadData::Exec(data)) => exec.focus_gained(data, focused),
            (Backend::Pipe(pipe), ThreadData::Pipe(data)) => pipe.focus_gained(data, focused),
            _ => return Err(Self::mismatch(kind, "focus_gained")),
        }
        Ok(())
    }

    pub fn resize(
        &mut self,
        grid_size: GridSize,
        screen_size: ScreenSize,
    ) -> Result<(), TransportError> {
        match self {
            Backend::Exec(exec) => exec.resize(grid_size, screen_size),
            Backend::Pipe(pipe) => {
                pipe.resize(grid_size, screen_size);
                Ok(())
            }
        }
    }

    /// Queues `bytes` for the outbound side without waiting for the write.
    pub fn queue_write(
        &mut self,
        data: &mut ThreadData,
        bytes: &[u8],
        linefeed: bool,
    ) -> Result<(), TransportError> {
        let kind = self.kind();
        match (self, data) {
            (Backend::Exec(exec), ThreadData::Exec(data)) => {
                exec.queue_write(data, bytes, linefeed);
            }
            (Backend::Pipe(pipe), ThreadData::Pipe(data)) => {
                pipe.queue_write(data, bytes, linefeed);
            }
            _ => return Err(Self::mismatch(kind, "queue_write")),
        }
        Ok(())
    }

    /// No child exists behind a pipe, so only exec reacts.
    pub fn child_exited_abnormally(
        &mut self,
        ingest: &dyn Ingest,
        exit_code: u32,
        runtime: Duration,
    ) {
        match self {
            Backend::Exec(exec) => exec.child_exited_abnormally(ingest, exit_code, runtime),
            Backend::Pipe(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        bytes: Mutex<Vec<u8>>,
    }

    impl Ingest for Recorder {
        fn ingest(&self, data: &[u8]) {
            self.bytes.lock().unwrap().extend_from_slice(data);
        }
    }

    #[test]
    fn test_pipe_backend_ignores_abnormal_exit() {
        let mut backend = Backend::Pipe(Pipe::new(Config::default()).unwrap());
        let recorder = Recorder::default();
        backend.child_exited_abnormally(&recorder, 1, Duration::from_millis(5));
        assert!(recorder.bytes.lock().unwrap().is_empty());
        assert_eq!(backend.kind(), BackendKind::Pipe);
    }

    #[test]
    fn test_exec_backend_reports_abnormal_exit() {
        let mut backend = Backend::Exec(Exec::new(crate::config::ExecConfig::new("false")));
        let recorder = Recorder::default();
        backend.child_exited_abnormally(&recorder, 1, Duration::from_millis(12));
        let text = String::from_utf8(recorder.bytes.lock().unwrap().clone()).unwrap();
        assert!(text.contains("exited with code 1 after 12 ms"));
    }

    #[test]
    fn test_mismatched_thread_data_is_rejected() {
        let mut first = Backend::Pipe(Pipe::new(Config::default()).unwrap());
        let mut data = first.thread_enter(Arc::new(Recorder::default())).unwrap();

        let mut other = Backend::Exec(Exec::new(crate::config::ExecConfig::new("true")));
        let err = other.queue_write(&mut data, b"x", false).unwrap_err();
        assert_eq!(err.operation(), "queue_write");
        assert!(other.focus_gained(&mut data, true).is_err());

        assert!(first.focus_gained(&mut data, true).is_ok());
        first.thread_exit(data);
    }

    #[test]
    fn test_pipe_backend_round_trip() {
        let mut backend = Backend::Pipe(Pipe::new(Config::default()).unwrap());
        backend
            .init_terminal(GridSize::new(80, 24), ScreenSize::new(0, 0))
            .unwrap();
        let mut data = backend.thread_enter(Arc::new(Recorder::default())).unwrap();
        assert_eq!(data.kind(), BackendKind::Pipe);

        backend.queue_write(&mut data, b"hello\rworld", false).unwrap();
        assert_eq!(data.writes().pending(), 1);
        assert!(data.flush(Some(Duration::from_secs(5))));
        assert_eq!(data.writes().pool_in_use(), (0, 0));

        backend.thread_exit(data);
        backend.deinit();
    }
}
