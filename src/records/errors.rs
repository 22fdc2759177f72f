//! Error types for the record store family.
//!
//! Every error carries a stable string code, a class, a human-readable
//! message, optional context details, and the underlying `io::Error` where
//! one exists. Contract-class errors mark caller bugs (a bad index, an
//! all-zero append) but remain ordinary recoverable errors, because
//! collaborators probe bounds dynamically.

use std::fmt;
use std::io;

/// Classifies an error as a caller-contract violation or an environment
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller violated an operation precondition.
    Contract,
    /// The file system or OS reported a failure.
    Io,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Contract => write!(f, "CONTRACT"),
            ErrorClass::Io => write!(f, "IO"),
        }
    }
}

/// Error codes for record store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordsErrorCode {
    /// The table file could not be created or opened.
    RecOpenFailed,
    /// The table file length is not a multiple of the record size.
    RecCorruptLength,
    /// An index outside the valid range was supplied.
    RecOutOfBounds,
    /// An all-zero record was handed to `add`.
    RecInvalidAppend,
    /// An operation was attempted after `close`.
    RecStoreClosed,
    /// A read, write, or truncate against the table file failed.
    RecIoFailure,
    /// The record size is zero, or a caller buffer has the wrong length.
    RecInvalidRecordSize,
}

impl RecordsErrorCode {
    /// Returns the stable string code.
    pub fn code(&self) -> &'static str {
        match self {
            RecordsErrorCode::RecOpenFailed => "REC_OPEN_FAILED",
            RecordsErrorCode::RecCorruptLength => "REC_CORRUPT_LENGTH",
            RecordsErrorCode::RecOutOfBounds => "REC_OUT_OF_BOUNDS",
            RecordsErrorCode::RecInvalidAppend => "REC_INVALID_APPEND",
            RecordsErrorCode::RecStoreClosed => "REC_STORE_CLOSED",
            RecordsErrorCode::RecIoFailure => "REC_IO_FAILURE",
            RecordsErrorCode::RecInvalidRecordSize => "REC_INVALID_RECORD_SIZE",
        }
    }

    /// Returns the error class for this code.
    pub fn class(&self) -> ErrorClass {
        match self {
            RecordsErrorCode::RecOpenFailed => ErrorClass::Io,
            RecordsErrorCode::RecCorruptLength => ErrorClass::Io,
            RecordsErrorCode::RecOutOfBounds => ErrorClass::Contract,
            RecordsErrorCode::RecInvalidAppend => ErrorClass::Contract,
            RecordsErrorCode::RecStoreClosed => ErrorClass::Contract,
            RecordsErrorCode::RecIoFailure => ErrorClass::Io,
            RecordsErrorCode::RecInvalidRecordSize => ErrorClass::Contract,
        }
    }
}

impl fmt::Display for RecordsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Record store error with full context.
#[derive(Debug)]
pub struct RecordsError {
    code: RecordsErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl RecordsError {
    /// The table file could not be created or opened.
    pub fn open_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: RecordsErrorCode::RecOpenFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// The file length is not a multiple of the record size.
    pub fn corrupt_length(file_len: u64, record_size: usize) -> Self {
        Self {
            code: RecordsErrorCode::RecCorruptLength,
            message: "table file length is not a multiple of the record size".to_string(),
            details: Some(format!(
                "file_len: {}, record_size: {}, remainder: {}",
                file_len,
                record_size,
                file_len % record_size as u64
            )),
            source: None,
        }
    }

    /// An index outside [0, bound) (or [0, bound] for put) was supplied.
    pub fn out_of_bounds(op: &str, index: u64, size: u64) -> Self {
        Self {
            code: RecordsErrorCode::RecOutOfBounds,
            message: format!("{}({}) outside bounds ({})", op, index, size),
            details: None,
            source: None,
        }
    }

    /// An all-zero record was handed to `add`.
    pub fn invalid_append() -> Self {
        Self {
            code: RecordsErrorCode::RecInvalidAppend,
            message: "the newest record must not be all zero".to_string(),
            details: None,
            source: None,
        }
    }

    /// An operation was attempted after `close`.
    pub fn store_closed(op: &str) -> Self {
        Self {
            code: RecordsErrorCode::RecStoreClosed,
            message: format!("{} on a closed store", op),
            details: None,
            source: None,
        }
    }

    /// A read, write, or truncate against the table file failed.
    pub fn io_failure(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: RecordsErrorCode::RecIoFailure,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// The record size is zero.
    pub fn zero_record_size() -> Self {
        Self {
            code: RecordsErrorCode::RecInvalidRecordSize,
            message: "record_size must be greater than zero".to_string(),
            details: None,
            source: None,
        }
    }

    /// A caller buffer does not match the record size.
    pub fn buffer_mismatch(got: usize, expected: usize) -> Self {
        Self {
            code: RecordsErrorCode::RecInvalidRecordSize,
            message: "buffer length does not match the record size".to_string(),
            details: Some(format!("buffer_len: {}, record_size: {}", got, expected)),
            source: None,
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> RecordsErrorCode {
        self.code
    }

    /// Returns the error class.
    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional context, if any.
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error marks a caller-contract violation.
    pub fn is_contract_violation(&self) -> bool {
        self.class() == ErrorClass::Contract
    }
}

impl fmt::Display for RecordsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.class(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for RecordsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for record store operations.
pub type RecordsResult<T> = Result<T, RecordsError>;
