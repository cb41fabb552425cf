//! Port traits: the hexagonal boundary between the sync core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ sync core (dispatcher, worker)
//! ```
//!
//! Driven adapters (MQTT transport, file volumes, NVS, REPL bridge, clock)
//! implement these traits. The sync core consumes them via generics or
//! trait objects, so protocol logic never touches ESP-IDF directly.
//!
//! ## Notes
//!
//! - **StoragePort** writes MUST be atomic; no partial writes on power loss.
//! - **FilePort** handles are closed explicitly; a failed `close` is reported
//!   as its own error kind so the ack can distinguish it from a failed write.
//! - All port errors are typed and callers must handle every variant explicitly.

use crate::config::SyncConfig;
use crate::error::ErrorCode;

// ───────────────────────────────────────────────────────────────
// File port (driven adapter: sync core ↔ mounted volumes)
// ───────────────────────────────────────────────────────────────

/// How a path is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the file must exist.
    Read,
    /// Create or truncate, then write from offset 0.
    Truncate,
    /// Create if missing, then write at the end.
    Append,
}

/// One raw entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// An open byte stream on a volume.
pub trait FileHandle {
    /// Read up to `buf.len()` bytes. Returns 0 at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError>;

    /// Write all of `data` at the current position.
    fn write(&mut self, data: &[u8]) -> Result<(), FileError>;

    /// Seek to an absolute offset. Returns the new position.
    fn seek(&mut self, pos: u64) -> Result<u64, FileError>;

    /// Flush and release the handle.
    fn close(self) -> Result<(), FileError>;
}

/// Path-addressed file storage.
pub trait FilePort {
    type File: FileHandle;

    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File, FileError>;

    /// Size of a regular file in bytes.
    fn size(&self, path: &str) -> Result<u64, FileError>;

    fn exists(&self, path: &str) -> bool;

    fn remove(&self, path: &str) -> Result<(), FileError>;

    /// Atomically replace `to` with `from` (both on the same volume).
    fn rename(&self, from: &str, to: &str) -> Result<(), FileError>;

    /// Raw directory entries, excluding `.` and `..`.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FileError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: sync core ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage (boot-mode flag, broker override, config).
///
/// Write operations MUST be atomic. The ESP-IDF NVS API guarantees this
/// natively; in-memory simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads and persists the sync configuration.
///
/// Implementations MUST validate before persisting and reject invalid
/// ranges with [`ConfigError::ValidationFailed`] rather than clamping.
pub trait ConfigPort {
    /// Returns [`SyncConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SyncConfig, ConfigError>;

    fn save(&self, config: &SyncConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Exec port (driven adapter: sync core → interpreter REPL)
// ───────────────────────────────────────────────────────────────

/// Consumer of remotely pushed source code.
///
/// The adapter feeds bytes into the interpreter's keystroke buffer; the
/// core only decides *when* to interrupt, stream and terminate.
pub trait ExecPort {
    /// Interrupt whatever is running and switch the REPL to raw input.
    fn begin(&mut self) -> Result<(), ErrorCode>;

    /// Append console bytes.
    fn feed(&mut self, data: &[u8]) -> Result<(), ErrorCode>;

    /// Mark end of stream so the REPL executes the buffered program.
    fn finish(&mut self) -> Result<(), ErrorCode>;
}

// ───────────────────────────────────────────────────────────────
// Transport ports (driven adapter: sync core ↔ MQTT client)
// ───────────────────────────────────────────────────────────────

/// Outbound half of the transport. Shared with the read worker.
pub trait Publisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Connection credentials handed to the transport at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

/// Session-level transport control. Disconnects and inbound messages
/// arrive asynchronously on the inbound queue, not through this trait.
///
/// Methods take `&self`: the client is shared with the read worker, so
/// adapters synchronise internally.
pub trait MqttPort: Publisher {
    /// Blocks until the broker accepts the session or the attempt fails.
    fn connect(&self, credentials: &Credentials) -> Result<(), TransportError>;

    fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    fn disconnect(&self);
}

// ───────────────────────────────────────────────────────────────
// Clock / system ports
// ───────────────────────────────────────────────────────────────

/// Wall-clock access.
pub trait ClockPort {
    /// One synchronisation attempt against the network time source.
    /// Returns `true` once the wall clock is trustworthy.
    fn sync_time(&mut self) -> bool;

    /// Seconds since the Unix epoch, `None` before synchronisation.
    fn unix_time(&self) -> Option<u64>;
}

/// Board services used by the worker.
pub trait SystemPort {
    fn free_heap(&self) -> u32;

    /// Blocking delay on the calling task.
    fn delay_ms(&mut self, ms: u32);

    /// Reset the chip. Simulation adapters record the request instead.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: sync core → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`SyncEvent`](super::events::SyncEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::SyncEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`FilePort`] and [`FileHandle`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileError {
    NotFound,
    OpenFailed,
    ReadFailed,
    WriteFailed,
    CloseFailed,
    RemoveFailed,
    ListFailed,
}

impl From<FileError> for ErrorCode {
    fn from(e: FileError) -> Self {
        match e {
            FileError::NotFound => Self::NoSuchFileOrDirectory,
            FileError::OpenFailed => Self::FileOpenError,
            FileError::ReadFailed => Self::FileReadError,
            FileError::WriteFailed => Self::FileWriteError,
            FileError::CloseFailed => Self::FileCloseError,
            FileError::RemoveFailed => Self::FileRemoveError,
            FileError::ListFailed => Self::FileListError,
        }
    }
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from the transport ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    NotConnected,
    ConnectFailed,
    SubscribeFailed,
    PublishFailed,
}

impl core::fmt::Display for FileError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file or directory"),
            Self::OpenFailed => write!(f, "open failed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::CloseFailed => write!(f, "close failed"),
            Self::RemoveFailed => write!(f, "remove failed"),
            Self::ListFailed => write!(f, "list failed"),
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "transport not connected"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PublishFailed => write!(f, "publish failed"),
        }
    }
}
