//! Custom error types for the logger.
//!
//! Each component owns a focused `thiserror` enum describing how it can fail,
//! and `LoggerError` consolidates them for callers that drive a whole session.
//!
//! ## Error Hierarchy
//!
//! - **`ReadFailure`**: the sensor exchange failed (port, timeout, protocol).
//!   Recoverable: the scheduler skips the tick and tries again next interval.
//! - **`CalibrationError`**: the calibration resource is missing or a value in
//!   it does not describe a valid session. Aborts a session before it starts.
//! - **`StorageFault`**: a local file or directory could not be written. Never
//!   recovered, since continuing would silently lose acquired data.
//! - **`SyncFault`**: authentication or transfer against the remote store
//!   failed. Recoverable while logging; fatal only for the initial
//!   authentication of a session.
//! - **`ConfigError`**: the application configuration could not be loaded or
//!   failed validation.
//!
//! By using `#[from]`, `LoggerError` can be created from any of the component
//! errors with the `?` operator.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, LoggerError>;

/// Failure to obtain one register block from the sensor.
#[derive(Error, Debug)]
pub enum ReadFailure {
    /// The serial port could not be opened
    #[error("failed to open serial port '{port}': {source}")]
    Open {
        /// Device path
        port: String,
        /// Underlying error
        #[source]
        source: tokio_serial::Error,
    },

    /// Reading or writing the port failed
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not answer in time
    #[error("no complete response within {timeout_ms} ms")]
    Timeout {
        /// Exchange deadline
        timeout_ms: u64,
    },

    /// The device answered with a Modbus exception
    #[error("device returned Modbus exception code {code:#04x}")]
    Exception {
        /// Modbus exception code
        code: u8,
    },

    /// The response checksum did not match
    #[error("response CRC mismatch (expected {expected:#06x}, got {actual:#06x})")]
    Crc {
        /// CRC computed over the received frame
        expected: u16,
        /// CRC carried by the frame
        actual: u16,
    },

    /// The response frame had the wrong shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Local persistence failure. Always fatal for the running session.
#[derive(Error, Debug)]
pub enum StorageFault {
    /// A period directory could not be created
    #[error("failed to create directory '{}': {source}", .path.display())]
    CreateDir {
        /// Directory being created
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A log file could not be opened for append
    #[error("failed to open '{}': {source}", .path.display())]
    Open {
        /// Log file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A row could not be serialized or written
    #[error("failed to write row to '{}': {source}", .path.display())]
    Write {
        /// Log file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: csv::Error,
    },

    /// Buffered rows could not be flushed
    #[error("failed to flush '{}': {source}", .path.display())]
    Flush {
        /// Log file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Remote publishing failure.
#[derive(Error, Debug)]
pub enum SyncFault {
    /// Credentials could not be obtained
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The store refused an operation
    #[error("remote store rejected '{operation}': {message}")]
    Remote {
        /// Operation name, e.g. `create`
        operation: String,
        /// Reason given by the store
        message: String,
    },

    /// The named object does not exist
    #[error("remote object '{0}' not found")]
    NotFound(String),

    /// The local file to publish could not be read
    #[error("failed to read local file '{}': {source}", .path.display())]
    LocalRead {
        /// Local file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Store-side I/O failed
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store metadata could not be encoded or decoded
    #[error("remote metadata encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Calibration resource problems.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// No calibration has been saved yet
    #[error("calibration settings not found at '{}'; run 'calibrate' first", .0.display())]
    Missing(PathBuf),

    /// A required key is absent
    #[error("calibration key '{0}' is required")]
    MissingKey(&'static str),

    /// A value does not parse or is out of range
    #[error("calibration value for '{key}' is invalid: {reason}")]
    Malformed {
        /// Offending key
        key: String,
        /// What is wrong with the value
        reason: String,
    },

    /// Reading or writing the resource failed
    #[error("calibration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application configuration problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Extraction from the layered sources failed
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Values loaded but are not usable
    #[error("configuration validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Primary error type for a logging session.
#[derive(Error, Debug)]
pub enum LoggerError {
    /// See [`ReadFailure`]
    #[error("sensor read failed: {0}")]
    Read(#[from] ReadFailure),

    /// See [`StorageFault`]
    #[error("storage fault: {0}")]
    Storage(#[from] StorageFault),

    /// See [`SyncFault`]
    #[error("sync fault: {0}")]
    Sync(#[from] SyncFault),

    /// See [`CalibrationError`]
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// See [`ConfigError`]
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LoggerError {
    /// Whether the session can keep running after this error.
    ///
    /// Anything that only affects acquiring the next sample or publishing
    /// remotely is recoverable; anything that risks already-acquired data is not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LoggerError::Read(_) | LoggerError::Sync(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_sync_faults_are_recoverable() {
        let read: LoggerError = ReadFailure::Timeout { timeout_ms: 2000 }.into();
        let sync: LoggerError = SyncFault::Auth("token revoked".into()).into();
        assert!(read.is_recoverable());
        assert!(sync.is_recoverable());
    }

    #[test]
    fn storage_faults_are_fatal() {
        let err: LoggerError = StorageFault::Open {
            path: PathBuf::from("Scanner_Files/01-01-24/01-01-24.csv"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
        .into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("01-01-24.csv"));
    }

    #[test]
    fn missing_calibration_names_the_path() {
        let err = CalibrationError::Missing(PathBuf::from("calibration_settings.txt"));
        let msg = err.to_string();
        assert!(msg.contains("calibration_settings.txt"));
        assert!(msg.contains("calibrate"));
    }
}
