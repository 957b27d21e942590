//! Transport over two plain OS pipes, for embedders that feed terminal data
//! in and drain terminal input out themselves.
//!
//! The embedder writes to the inbound pipe and reads from the outbound one.
//! There is no child process and no signal for size changes, so size
//! updates are reported through the configured resize callback instead.

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{Config, GridSize, ResizeEvent, ScreenSize};
use crate::error::TransportError;
use crate::fd::PipePair;
use crate::ingest::Ingest;
use crate::read_thread::ReadThread;
use crate::write::WriteQueue;

const READER_THREAD_NAME: &str = "termio-pipe-reader";

/// Descriptors the embedder talks to.
#[derive(Debug, Clone, Copy)]
pub struct EmbedderFds<'a> {
    /// Write terminal output here.
    pub inbound: BorrowedFd<'a>,
    /// Read terminal input from here.
    pub outbound: BorrowedFd<'a>,
}

#[derive(Debug)]
pub struct Pipe {
    inbound: PipePair,
    outbound: PipePair,
    grid_size: GridSize,
    screen_size: ScreenSize,
    config: Config,
}

impl Pipe {
    /// Creates both pipe pairs. Nothing is left open if either fails.
    pub fn new(config: Config) -> Result<Self, TransportError> {
        let inbound = PipePair::new().map_err(TransportError::pipe)?;
        let outbound = PipePair::new().map_err(TransportError::pipe)?;
        debug!("Pipe transport created");
        Ok(Self {
            inbound,
            outbound,
            grid_size: GridSize::default(),
            screen_size: ScreenSize::default(),
            config,
        })
    }

    /// Closes all four descriptors.
    pub fn deinit(self) {
        drop(self);
    }

    /// Reports the terminal's starting size to the embedder.
    pub fn init_terminal(&mut self, grid_size: GridSize, screen_size: ScreenSize) {
        self.resize(grid_size, screen_size);
    }

    pub fn resize(&mut self, grid_size: GridSize, screen_size: ScreenSize) {
        self.grid_size = grid_size;
        self.screen_size = screen_size;

        if let Some(callback) = &self.config.resize {
            callback.invoke(ResizeEvent::saturating(grid_size, screen_size));
        }
    }

    pub fn grid_size(&self) -> GridSize {
        self.grid_size
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.screen_size
    }

    pub fn embedder(&self) -> EmbedderFds<'_> {
        EmbedderFds {
            inbound: self.inbound.write.as_fd(),
            outbound: self.outbound.read.as_fd(),
        }
    }

    /// Owned handle on the inbound write end, for writing terminal output.
    pub fn try_clone_inbound_writer(&self) -> io::Result<File> {
        Ok(File::from(self.inbound.write.try_clone()?))
    }

    /// Owned handle on the outbound read end, for reading terminal input.
    pub fn try_clone_outbound_reader(&self) -> io::Result<File> {
        Ok(File::from(self.outbound.read.try_clone()?))
    }

    /// Starts the read thread and sets up the write path for the calling
    /// worker thread.
    pub fn thread_enter(
        &mut self,
        ingest: Arc<dyn Ingest>,
    ) -> Result<PipeThreadData, TransportError> {
        let quit = PipePair::new().map_err(TransportError::quit_pipe)?;

        let stream = self
            .outbound
            .write
            .try_clone()
            .map_err(TransportError::descriptor)?;
        let writes = WriteQueue::new(stream, self.config.pool_preallocate)?;

        let data = self
            .inbound
            .read
            .try_clone()
            .map_err(TransportError::descriptor)?;
        let reader = ReadThread::spawn(READER_THREAD_NAME, data, quit, ingest)?;

        debug!("Pipe transport thread entered");
        Ok(PipeThreadData { writes, reader })
    }

    /// Stops the read thread and waits for it before releasing the thread
    /// data.
    pub fn thread_exit(&mut self, mut data: PipeThreadData) {
        data.reader.stop();
        debug!(
            pending = data.writes.pending(),
            "Pipe transport thread exited"
        );
    }

    pub fn focus_gained(&mut self, _data: &mut PipeThreadData, _focused: bool) {}

    pub fn queue_write(&mut self, data: &mut PipeThreadData, bytes: &[u8], linefeed: bool) {
        data.writes.queue_write(bytes, linefeed);
    }
}

/// Worker-thread state of an active pipe transport.
///
/// Dropping it without [`Pipe::thread_exit`] still stops and joins the read
/// thread.
pub struct PipeThreadData {
    writes: WriteQueue,
    reader: ReadThread,
}

impl PipeThreadData {
    pub fn writes(&mut self) -> &mut WriteQueue {
        &mut self.writes
    }

    pub fn tick(&mut self) -> usize {
        self.writes.tick()
    }

    pub fn flush(&mut self, timeout: Option<Duration>) -> bool {
        self.writes.flush(timeout)
    }

    pub fn reader_finished(&self) -> bool {
        self.reader.is_finished()
    }
}
