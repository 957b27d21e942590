//! Transport that runs a command behind a pseudo-terminal.
//!
//! Shares the read thread and the pooled write queue with the pipe
//! transport; both run on duplicates of the pty master descriptor.

use std::os::fd::{BorrowedFd, OwnedFd};
use std::sync::Arc;
use std::time::Duration;

use portable_pty::Child;
use portable_pty::CommandBuilder;
use portable_pty::MasterPty;
use portable_pty::PtySize;
use portable_pty::native_pty_system;
use tracing::{debug, warn};

use crate::config::{ExecConfig, GridSize, ScreenSize, saturate_u16};
use crate::error::{SpawnErrorKind, TransportError};
use crate::fd::PipePair;
use crate::ingest::Ingest;
use crate::read_thread::ReadThread;
use crate::write::WriteQueue;

const READER_THREAD_NAME: &str = "termio-exec-reader";

pub struct Exec {
    config: ExecConfig,
    grid_size: GridSize,
    screen_size: ScreenSize,
    master: Option<Box<dyn MasterPty + Send>>,
    child: Option<Box<dyn Child + Send + Sync>>,
}

impl Exec {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            grid_size: GridSize::new(80, 24),
            screen_size: ScreenSize::default(),
            master: None,
            child: None,
        }
    }

    pub fn deinit(mut self) {
        self.reap_child();
    }

    /// Records the size the child will be started with, or applies it to
    /// the running child's pty.
    pub fn init_terminal(
        &mut self,
        grid_size: GridSize,
        screen_size: ScreenSize,
    ) -> Result<(), TransportError> {
        self.resize(grid_size, screen_size)
    }

    /// Window size the kernel reports for the live pty.
    pub fn window_size(&self) -> Option<GridSize> {
        let master = self.master.as_ref()?;
        match master.get_size() {
            Ok(size) => Some(GridSize::new(u32::from(size.cols), u32::from(size.rows))),
            Err(e) => {
                warn!(error = %e, "Failed to read pty size");
                None
            }
        }
    }

    fn pty_size(&self) -> PtySize {
        PtySize {
            rows: saturate_u16(self.grid_size.rows),
            cols: saturate_u16(self.grid_size.columns),
            pixel_width: saturate_u16(self.screen_size.width),
            pixel_height: saturate_u16(self.screen_size.height),
        }
    }

    fn command(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.config.command);
        cmd.args(&self.config.args);

        if let Some(dir) = &self.config.cwd {
            cmd.cwd(dir);
        }

        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        cmd.env("TERM", &self.config.term);
        cmd
    }

    /// Spawns the child on a fresh pty and starts reading from it.
    pub fn thread_enter(
        &mut self,
        ingest: Arc<dyn Ingest>,
    ) -> Result<ExecThreadData, TransportError> {
        let pair = native_pty_system()
            .openpty(self.pty_size())
            .map_err(|e| TransportError::PtyOpen {
                reason: e.to_string(),
            })?;

        let mut child = pair.slave.spawn_command(self.command()).map_err(|e| {
            let kind = e
                .downcast_ref::<std::io::Error>()
                .map_or(SpawnErrorKind::Other, SpawnErrorKind::from_io);
            TransportError::ProcessSpawn {
                reason: e.to_string(),
                kind,
            }
        })?;
        // Only the child may hold the slave, or reads never see EOF.
        drop(pair.slave);

        match start_io(pair.master.as_ref(), self.config.pool_preallocate, ingest) {
            Ok(data) => {
                debug!(
                    pid = ?child.process_id(),
                    command = %self.config.command,
                    "Exec transport thread entered"
                );
                self.master = Some(pair.master);
                self.child = Some(child);
                Ok(data)
            }
            Err(e) => {
                if let Err(kill_err) = child.kill() {
                    warn!(error = %kill_err, "Failed to kill child after setup error");
                }
                let _ = child.wait();
                Err(e)
            }
        }
    }

    /// Stops the reader, then kills and reaps the child.
    pub fn thread_exit(&mut self, mut data: ExecThreadData) {
        data.reader.stop();
        self.reap_child();
        self.master = None;
        debug!("Exec transport thread exited");
    }

    fn reap_child(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if matches!(child.try_wait(), Ok(None)) {
            if let Err(e) = child.kill() {
                warn!(error = %e, "Failed to kill child");
            }
        }
        if let Err(e) = child.wait() {
            warn!(error = %e, "Failed to reap child");
        }
    }

    pub fn focus_gained(&mut self, _data: &mut ExecThreadData, focused: bool) {
        debug!(focused, "Exec transport focus changed");
    }

    pub fn resize(
        &mut self,
        grid_size: GridSize,
        screen_size: ScreenSize,
    ) -> Result<(), TransportError> {
        self.grid_size = grid_size;
        self.screen_size = screen_size;

        let Some(master) = &self.master else {
            return Ok(());
        };
        master
            .resize(self.pty_size())
            .map_err(|e| TransportError::Resize {
                reason: e.to_string(),
            })
    }

    pub fn queue_write(&mut self, data: &mut ExecThreadData, bytes: &[u8], linefeed: bool) {
        data.writes.queue_write(bytes, linefeed);
    }

    /// Tells the user the command died early, through the terminal itself.
    pub fn child_exited_abnormally(
        &mut self,
        ingest: &dyn Ingest,
        exit_code: u32,
        runtime: Duration,
    ) {
        warn!(
            exit_code,
            runtime_ms = runtime.as_millis() as u64,
            command = %self.config.command,
            "Child exited abnormally"
        );
        let notice = format!(
            "\r\n[Process `{}` exited with code {} after {} ms]\r\n",
            self.config.command,
            exit_code,
            runtime.as_millis()
        );
        ingest.ingest(notice.as_bytes());
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.process_id())
    }

    /// Exit code of the child if it has exited.
    pub fn try_wait(&mut self) -> Option<u32> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to poll child status");
                None
            }
        }
    }
}

impl Drop for Exec {
    fn drop(&mut self) {
        self.reap_child();
    }
}

fn start_io(
    master: &(dyn MasterPty + Send),
    segment_len: usize,
    ingest: Arc<dyn Ingest>,
) -> Result<ExecThreadData, TransportError> {
    let quit = PipePair::new().map_err(TransportError::quit_pipe)?;

    let raw = master.as_raw_fd().ok_or_else(|| TransportError::PtyOpen {
        reason: "Failed to get master fd".to_string(),
    })?;
    // The master stays owned by `Exec`; everything below works on duplicates.
    let master_fd: OwnedFd = unsafe { BorrowedFd::borrow_raw(raw) }
        .try_clone_to_owned()
        .map_err(TransportError::descriptor)?;
    let stream = master_fd.try_clone().map_err(TransportError::descriptor)?;
    let writes = WriteQueue::new(stream, segment_len)?;

    let reader = ReadThread::spawn(READER_THREAD_NAME, master_fd, quit, ingest)?;
    Ok(ExecThreadData { writes, reader })
}

/// Worker-thread state of an active exec transport.
pub struct ExecThreadData {
    writes: WriteQueue,
    reader: ReadThread,
}

impl ExecThreadData {
    pub fn writes(&mut self) -> &mut WriteQueue {
        &mut self.writes
    }

    pub fn reader_finished(&self) -> bool {
        self.reader.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pty_size_saturates() {
        let mut exec = Exec::new(ExecConfig::new("true"));
        exec.init_terminal(GridSize::new(100_000, 30), ScreenSize::new(640, 480))
            .unwrap();
        let size = exec.pty_size();
        assert_eq!(size.cols, u16::MAX);
        assert_eq!(size.rows, 30);
        assert_eq!(size.pixel_width, 640);
    }

    #[test]
    fn test_resize_before_enter_only_caches() {
        let mut exec = Exec::new(ExecConfig::new("true"));
        exec.resize(GridSize::new(90, 20), ScreenSize::default()).unwrap();
        assert_eq!(exec.pty_size().cols, 90);
        assert!(exec.pid().is_none());
        assert!(exec.try_wait().is_none());
        assert!(exec.window_size().is_none());
    }

    struct Discard;

    impl Ingest for Discard {
        fn ingest(&self, _data: &[u8]) {}
    }

    #[test]
    fn test_init_terminal_resizes_live_pty() {
        let mut exec = Exec::new(ExecConfig::new("/bin/cat"));
        exec.init_terminal(GridSize::new(80, 24), ScreenSize::default())
            .unwrap();
        let data = exec.thread_enter(Arc::new(Discard)).unwrap();
        assert_eq!(exec.window_size(), Some(GridSize::new(80, 24)));

        exec.init_terminal(GridSize::new(132, 43), ScreenSize::new(1320, 860))
            .unwrap();
        assert_eq!(exec.window_size(), Some(GridSize::new(132, 43)));

        exec.thread_exit(data);
    }

    #[test]
    fn test_spawn_missing_command_reports_error() {

        let mut exec = Exec::new(ExecConfig::new("/nonexistent/termio-test-command"));
        let err = match exec.thread_enter(Arc::new(Discard)) {
            Ok(_) => panic!("spawning a missing command should fail"),
            Err(e) => e,
        };
        assert_eq!(err.operation(), "spawn");
    }
}
