//! Process exit codes
//!
//! Scripts branch on these values; never renumber them.

use bf_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments, malformed remote path or invalid config
    UsageError = 2,
    /// Connection failure or an unexpected status; worth retrying
    NetworkError = 3,
    AuthError = 4,
    /// Missing alias, bucket or file
    NotFound = 5,
    Conflict = 6,
    /// The backend or signer cannot do what was asked
    UnsupportedFeature = 7,
    /// Ctrl+C
    Interrupted = 130,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err.exit_code() {
            2 => Self::UsageError,
            3 => Self::NetworkError,
            4 => Self::AuthError,
            5 => Self::NotFound,
            6 => Self::Conflict,
            7 => Self::UnsupportedFeature,
            _ => Self::GeneralError,
        }
    }
}
