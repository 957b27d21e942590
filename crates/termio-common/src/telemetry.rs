use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_FILE_ENV: &str = "TERMIO_LOG";

/// Keeps the non-blocking log writer alive; drop it last.
#[derive(Debug)]
pub struct TelemetryGuard {
    worker: Option<WorkerGuard>,
}

impl TelemetryGuard {
    fn disabled() -> Self {
        Self { worker: None }
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }
}

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins over `default_level`. Output is appended to the file named
/// by `TERMIO_LOG` when set, stderr otherwise. Calling this twice is harmless:
/// the second call returns a disabled guard.
pub fn init_tracing(default_level: &str) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (writer, guard) = match log_file_path_from_env() {
        Some(path) => file_writer(&path),
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(writer);

    if subscriber.try_init().is_err() {
        return TelemetryGuard::disabled();
    }

    TelemetryGuard { worker: guard }
}

fn file_writer(path: &Path) -> (BoxMakeWriter, Option<WorkerGuard>) {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        Err(err) => {
            eprintln!(
                "Warning: failed to open log file {}: {}",
                path.display(),
                err
            );
            (BoxMakeWriter::new(std::io::stderr), None)
        }
    }
}

fn log_file_path_from_env() -> Option<PathBuf> {
    std::env::var_os(LOG_FILE_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
