//! Transport errors with structured context.
//!
//! Construction and activation failures are returned to callers. Read thread
//! failures are only logged; a dropped queued write is logged and parked on
//! its queue for [`WriteQueue::take_last_error`].
//!
//! [`WriteQueue::take_last_error`]: crate::WriteQueue::take_last_error

use std::io;

use serde_json::{Value, json};
use termio_common::error_codes::{self, ErrorCategory};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnErrorKind {
    NotFound,
    PermissionDenied,
    Other,
}

impl SpawnErrorKind {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SpawnErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => SpawnErrorKind::PermissionDenied,
            _ => SpawnErrorKind::Other,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to create pipe: {reason}")]
    Pipe {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Failed to create quit pipe: {reason}")]
    QuitPipe {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Failed to spawn read thread: {reason}")]
    Spawn {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Failed to prepare descriptor: {reason}")]
    Descriptor {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Failed to open PTY: {reason}")]
    PtyOpen { reason: String },
    #[error("Failed to spawn process: {reason}")]
    ProcessSpawn {
        reason: String,
        kind: SpawnErrorKind,
    },
    #[error("Failed to resize PTY: {reason}")]
    Resize { reason: String },
    #[error("Failed to write: {reason}")]
    Write {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Thread data does not belong to the {backend} backend ({operation})")]
    BackendMismatch {
        backend: &'static str,
        operation: &'static str,
    },
}

impl TransportError {
    pub(crate) fn pipe(source: io::Error) -> Self {
        TransportError::Pipe {
            reason: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn quit_pipe(source: io::Error) -> Self {
        TransportError::QuitPipe {
            reason: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn spawn(source: io::Error) -> Self {
        TransportError::Spawn {
            reason: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn descriptor(source: io::Error) -> Self {
        TransportError::Descriptor {
            reason: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn write(source: io::Error) -> Self {
        TransportError::Write {
            reason: source.to_string(),
            source: Some(source),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            TransportError::Pipe { .. }
            | TransportError::QuitPipe { .. }
            | TransportError::Descriptor { .. } => error_codes::TRANSPORT_INIT,
            TransportError::Spawn { .. } => error_codes::THREAD_SPAWN,
            TransportError::PtyOpen { .. } | TransportError::Resize { .. } => {
                error_codes::PTY_ERROR
            }
            TransportError::ProcessSpawn { kind, .. } => match kind {
                SpawnErrorKind::NotFound => error_codes::COMMAND_NOT_FOUND,
                SpawnErrorKind::PermissionDenied => error_codes::PERMISSION_DENIED,
                SpawnErrorKind::Other => error_codes::PTY_ERROR,
            },
            TransportError::Write { .. } => error_codes::WRITE_FAILED,
            TransportError::BackendMismatch { .. } => error_codes::BACKEND_MISMATCH,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        error_codes::category_for_code(self.code())
    }

    pub fn context(&self) -> Value {
        match self {
            TransportError::BackendMismatch { backend, operation } => json!({
                "operation": operation,
                "backend": backend,
            }),
            TransportError::ProcessSpawn { reason, kind } => json!({
                "operation": self.operation(),
                "reason": reason,
                "kind": format!("{kind:?}"),
            }),
            _ => json!({
                "operation": self.operation(),
                "reason": self.reason(),
            }),
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            TransportError::Pipe { .. } | TransportError::QuitPipe { .. } => {
                "Descriptor allocation failed. Check system resource limits (ulimit -n)."
                    .to_string()
            }
            TransportError::Spawn { .. } => {
                "Could not start the read thread. Check thread limits (ulimit -u).".to_string()
            }
            TransportError::Descriptor { .. } => {
                "Descriptor setup failed. The pipe may already be closed.".to_string()
            }
            TransportError::PtyOpen { .. } => {
                "PTY allocation failed. Check system resource limits (ulimit -n) or try restarting."
                    .to_string()
            }
            TransportError::ProcessSpawn { kind, .. } => match kind {
                SpawnErrorKind::NotFound => {
                    "Command not found. Check if the command exists and is in PATH.".to_string()
                }
                SpawnErrorKind::PermissionDenied => {
                    "Permission denied. Check file permissions.".to_string()
                }
                SpawnErrorKind::Other => {
                    "Process spawn failed. Check command syntax and permissions.".to_string()
                }
            },
            TransportError::Resize { .. } => {
                "Failed to resize terminal. Try again or restart the session.".to_string()
            }
            TransportError::Write { .. } => {
                "Failed to send input. The peer may have closed its end.".to_string()
            }
            TransportError::BackendMismatch { .. } => {
                "Pass the thread data returned by this backend's thread_enter.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Pipe { .. }
                | TransportError::QuitPipe { .. }
                | TransportError::Spawn { .. }
                | TransportError::Write { .. }
        )
    }

    pub fn operation(&self) -> &'static str {
        match self {
            TransportError::Pipe { .. } => "pipe",
            TransportError::QuitPipe { .. } => "quit_pipe",
            TransportError::Spawn { .. } => "spawn_thread",
            TransportError::Descriptor { .. } => "descriptor",
            TransportError::PtyOpen { .. } => "open",
            TransportError::ProcessSpawn { .. } => "spawn",
            TransportError::Resize { .. } => "resize",
            TransportError::Write { .. } => "write",
            TransportError::BackendMismatch { operation, .. } => operation,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            TransportError::Pipe { reason, .. }
            | TransportError::QuitPipe { reason, .. }
            | TransportError::Spawn { reason, .. }
            | TransportError::Descriptor { reason, .. }
            | TransportError::Write { reason, .. } => reason,
            TransportError::PtyOpen { reason }
            | TransportError::Resize { reason }
            | TransportError::ProcessSpawn { reason, .. } => reason,
            TransportError::BackendMismatch { .. } => "thread data variant mismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_pipe_error_keeps_source() {
        let err = TransportError::pipe(io::Error::from_raw_os_error(libc::EMFILE));
        assert!(err.source().is_some());
        assert_eq!(err.code(), error_codes::TRANSPORT_INIT);
        assert_eq!(err.category(), ErrorCategory::External);
        assert!(err.suggestion().contains("ulimit"));
    }

    #[test]
    fn test_spawn_error_kind_maps_code() {
        let err = TransportError::ProcessSpawn {
            reason: "No such file or directory".into(),
            kind: SpawnErrorKind::NotFound,
        };
        assert_eq!(err.code(), error_codes::COMMAND_NOT_FOUND);
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(err.suggestion().contains("not found"));
        assert_eq!(err.context()["kind"], "NotFound");
    }

    #[test]
    fn test_spawn_error_kind_from_io() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(SpawnErrorKind::from_io(&err), SpawnErrorKind::PermissionDenied);
        let err = io::Error::from(io::ErrorKind::Other);
        assert_eq!(SpawnErrorKind::from_io(&err), SpawnErrorKind::Other);
    }

    #[test]
    fn test_error_context() {
        let err = TransportError::Resize {
            reason: "bad size".into(),
        };
        let ctx = err.context();
        assert_eq!(ctx["operation"], "resize");
        assert_eq!(ctx["reason"], "bad size");
    }

    #[test]
    fn test_backend_mismatch() {
        let err = TransportError::BackendMismatch {
            backend: "pipe",
            operation: "queue_write",
        };
        assert_eq!(err.operation(), "queue_write");
        assert_eq!(err.category(), ErrorCategory::InvalidInput);
        assert_eq!(err.context()["backend"], "pipe");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_is_retryable() {
        assert!(TransportError::quit_pipe(io::Error::from_raw_os_error(libc::ENFILE)).is_retryable());
        assert!(
            !TransportError::PtyOpen {
                reason: "x".into()
            }
            .is_retryable()
        );
    }
}
