pub const TRANSPORT_INIT: i32 = -32020;
pub const THREAD_SPAWN: i32 = -32021;
pub const PTY_ERROR: i32 = -32008;
pub const WRITE_FAILED: i32 = -32022;
pub const BACKEND_MISMATCH: i32 = -32023;

pub const COMMAND_NOT_FOUND: i32 = -32014;
pub const PERMISSION_DENIED: i32 = -32015;

pub const GENERIC_ERROR: i32 = -32000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    InvalidInput,
    Internal,
    External,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Internal => "internal",
            ErrorCategory::External => "external",
        }
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_found" => Ok(ErrorCategory::NotFound),
            "invalid_input" => Ok(ErrorCategory::InvalidInput),
            "internal" => Ok(ErrorCategory::Internal),
            "external" => Ok(ErrorCategory::External),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub fn category_for_code(code: i32) -> ErrorCategory {
    match code {
        COMMAND_NOT_FOUND => ErrorCategory::NotFound,
        BACKEND_MISMATCH => ErrorCategory::InvalidInput,
        TRANSPORT_INIT | THREAD_SPAWN | PTY_ERROR | WRITE_FAILED | PERMISSION_DENIED => {
            ErrorCategory::External
        }
        _ => ErrorCategory::Internal,
    }
}
