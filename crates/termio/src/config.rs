use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::path::PathBuf;

use crate::pool::DEFAULT_SEGMENT_LEN;

/// Terminal size in cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridSize {
    pub columns: u32,
    pub rows: u32,
}

impl GridSize {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }
}

/// Terminal size in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Dimensions handed to the embedder's resize callback.
///
/// Every field is saturated to `u16::MAX` rather than truncated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeEvent {
    pub columns: u16,
    pub rows: u16,
    pub width: u16,
    pub height: u16,
}

impl ResizeEvent {
    pub fn saturating(grid: GridSize, screen: ScreenSize) -> Self {
        Self {
            columns: saturate_u16(grid.columns),
            rows: saturate_u16(grid.rows),
            width: saturate_u16(screen.width),
            height: saturate_u16(screen.height),
        }
    }
}

pub(crate) fn saturate_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// C-ABI resize hook: columns, rows, pixel width, pixel height, userdata.
pub type ForeignResizeFn = extern "C" fn(u16, u16, u16, u16, *mut c_void);

/// Opaque embedder context passed back verbatim to a foreign callback.
///
/// The pointer is never dereferenced here.
#[derive(Debug, Clone, Copy)]
pub struct Userdata(*mut c_void);

impl Userdata {
    pub fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

// The embedder owns whatever the pointer refers to and promises it may be
// handed back from whichever thread drives resizes.
unsafe impl Send for Userdata {}
unsafe impl Sync for Userdata {}

pub enum ResizeCallback {
    Closure(Box<dyn Fn(ResizeEvent) + Send + Sync>),
    Foreign {
        func: ForeignResizeFn,
        userdata: Userdata,
    },
}

impl ResizeCallback {
    pub fn closure(f: impl Fn(ResizeEvent) + Send + Sync + 'static) -> Self {
        ResizeCallback::Closure(Box::new(f))
    }

    pub fn foreign(func: ForeignResizeFn, userdata: Userdata) -> Self {
        ResizeCallback::Foreign { func, userdata }
    }

    pub(crate) fn invoke(&self, event: ResizeEvent) {
        match self {
            ResizeCallback::Closure(f) => f(event),
            ResizeCallback::Foreign { func, userdata } => func(
                event.columns,
                event.rows,
                event.width,
                event.height,
                userdata.as_ptr(),
            ),
        }
    }
}

impl fmt::Debug for ResizeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeCallback::Closure(_) => f.write_str("ResizeCallback::Closure"),
            ResizeCallback::Foreign { userdata, .. } => f
                .debug_struct("ResizeCallback::Foreign")
                .field("userdata", userdata)
                .finish(),
        }
    }
}

/// Pipe transport configuration. Fixed once the transport is built.
#[derive(Debug)]
pub struct Config {
    pub resize: Option<ResizeCallback>,
    /// Slots per pool segment for write requests and write buffers.
    pub pool_preallocate: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resize: None,
            pool_preallocate: DEFAULT_SEGMENT_LEN,
        }
    }
}

impl Config {
    pub fn with_resize(mut self, callback: ResizeCallback) -> Self {
        self.resize = Some(callback);
        self
    }

    pub fn with_pool_preallocate(mut self, slots: usize) -> Self {
        self.pool_preallocate = slots;
        self
    }
}

/// Exec (pty) transport configuration.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub term: String,
    pub pool_preallocate: usize,
}

impl ExecConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            term: "xterm-256color".to_string(),
            pool_preallocate: DEFAULT_SEGMENT_LEN,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}
