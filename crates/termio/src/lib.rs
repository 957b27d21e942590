//! Byte transports between a terminal emulation core and the outside world.
//!
//! Two transports share one contract ([`Backend`]): [`Exec`] runs a command
//! behind a pseudo-terminal, [`Pipe`] exposes a pair of plain OS pipes to an
//! embedder that produces and consumes the bytes itself. Inbound bytes are
//! read on a dedicated thread and handed to an [`Ingest`] implementation;
//! outbound bytes go through a pooled, non-blocking [`WriteQueue`] driven by
//! the worker thread.
//!
//! Unix only: both transports sit directly on `pipe(2)`, `poll(2)` and pty
//! master descriptors.

#![cfg(unix)]
#![deny(clippy::all)]

mod backend;
mod config;
pub mod error;
mod exec;
mod fd;
mod grid;
mod ingest;
mod pipe;
mod pool;
mod read_thread;
mod write;

pub use backend::Backend;
pub use backend::BackendKind;
pub use backend::ThreadData;
pub use config::Config;
pub use config::ExecConfig;
pub use config::ForeignResizeFn;
pub use config::GridSize;
pub use config::ResizeCallback;
pub use config::ResizeEvent;
pub use config::ScreenSize;
pub use config::Userdata;
pub use error::SpawnErrorKind;
pub use error::TransportError;
pub use exec::Exec;
pub use exec::ExecThreadData;
pub use grid::CursorPosition;
pub use grid::Grid;
pub use ingest::Ingest;
pub use pipe::EmbedderFds;
pub use pipe::Pipe;
pub use pipe::PipeThreadData;
pub use pool::DEFAULT_SEGMENT_LEN;
pub use pool::ObjectPool;
pub use pool::PoolIndex;
pub use read_thread::READ_BUF_LEN;
pub use read_thread::ReadThread;
pub use write::WRITE_BUF_LEN;
pub use write::WriteQueue;
pub use write::fill_chunk;

pub type Result<T> = std::result::Result<T, TransportError>;
