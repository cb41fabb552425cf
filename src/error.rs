//! Protocol error taxonomy for the cloud-sync firmware.
//!
//! Every handler boundary returns exactly one [`ErrorCode`]. The code is
//! serialised verbatim into the acknowledgement payload's `err_code`
//! field, so the discriminants are part of the wire contract and must
//! never be renumbered. All variants are `Copy` so they can be threaded
//! through handlers and acks without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Flat code space (negative = error, 0 = success)
// ---------------------------------------------------------------------------

/// Error codes reported to the cloud in `err_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Payload was not valid JSON, or a required field was missing/null.
    ParseError = -1,
    /// Packet index broke continuity (`index != 0 && index != last + 1`).
    IndexError = -2,
    /// Decoded payload length differs from the declared `pkg_len`.
    LengthError = -3,
    /// The execution consumer rejected the stream.
    ExecuteError = -4,
    FileOpenError = -5,
    FileReadError = -6,
    FileWriteError = -7,
    FileCloseError = -8,
    NoSuchFileOrDirectory = -9,
    FileRemoveError = -10,
    FileListError = -11,
    /// Allocation or base64 decode failure.
    NoMemoryAvailable = -12,
    /// Declared or encoded payload exceeds the configured packet bound.
    PayloadTooLarge = -13,
}

/// Wire value for success.
pub const SUCCESS: i32 = 0;

impl ErrorCode {
    /// The signed wire value of this code.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Map a handler result onto the wire `err_code`.
    pub fn of<T>(result: &core::result::Result<T, ErrorCode>) -> i32 {
        match result {
            Ok(_) => SUCCESS,
            Err(e) => e.code(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError => write!(f, "parse error"),
            Self::IndexError => write!(f, "packet index out of sequence"),
            Self::LengthError => write!(f, "payload length mismatch"),
            Self::ExecuteError => write!(f, "execute failed"),
            Self::FileOpenError => write!(f, "file open failed"),
            Self::FileReadError => write!(f, "file read failed"),
            Self::FileWriteError => write!(f, "file write failed"),
            Self::FileCloseError => write!(f, "file close failed"),
            Self::NoSuchFileOrDirectory => write!(f, "no such file or directory"),
            Self::FileRemoveError => write!(f, "file remove failed"),
            Self::FileListError => write!(f, "directory listing failed"),
            Self::NoMemoryAvailable => write!(f, "out of memory or undecodable payload"),
            Self::PayloadTooLarge => write!(f, "payload exceeds packet bound"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Handler-wide `Result` alias.
pub type Result<T> = core::result::Result<T, ErrorCode>;
