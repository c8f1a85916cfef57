use std::io;
use std::result;

use csvc_core::{ConfigError, SyntaxErrorKind};
use thiserror::Error;

use crate::byte_record::{ByteRecord, Position};

/// A type alias for `Result<T, csvc::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur when reading CSV data.
///
/// Every error except `Config` carries the position at which it occurred.
/// Errors from the byte source are reported as-is; all other errors describe
/// a single record, and reading may continue with the next one.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error that occurred while reading CSV data.
    #[error("CSV I/O error at line {}, byte {}: {err}", .pos.line(), .pos.byte())]
    Io {
        /// The position of the next unread byte.
        pos: Position,
        /// The error returned by the byte source.
        #[source]
        err: io::Error,
    },
    /// A UTF-8 decoding error that occured while reading CSV data into Rust
    /// `String`s.
    #[error(
        "CSV parse error: record {} (line {}, byte {}, field {}): {err}",
        .pos.record(), .pos.line(), .pos.byte(), .err.field()
    )]
    Utf8 {
        /// The position of the record in which this error occurred.
        pos: Position,
        /// The corresponding UTF-8 error.
        #[source]
        err: Utf8Error,
    },
    /// Malformed quoting.
    ///
    /// The position points at the offending byte. For an unterminated quoted
    /// field, it points at the quote that opened the field.
    #[error(
        "CSV parse error: record {} (line {}, column {}): {kind}",
        .pos.record(), .pos.line(), .pos.column()
    )]
    Syntax {
        /// The position of the malformed input.
        pos: Position,
        /// What was wrong with it.
        kind: SyntaxErrorKind,
    },
    /// A record had a different number of fields than expected.
    ///
    /// The record itself was fully consumed, so the next read continues with
    /// the record after it.
    #[error(
        "CSV parse error: record {} (line {}, byte {}): found record with {len} \
         fields, but expected {expected_len} fields",
        .pos.record(), .pos.line(), .pos.byte()
    )]
    FieldCountMismatch {
        /// The position of the first byte of the offending record.
        pos: Position,
        /// The expected number of fields in a record.
        expected_len: u64,
        /// The number of fields in the bad record.
        len: u64,
    },
    /// The reader was configured with conflicting options.
    #[error("invalid CSV reader configuration: {0}")]
    Config(ConfigError),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl Error {
    /// Return the position for this error, if one exists.
    ///
    /// Only configuration errors lack a position.
    pub fn position(&self) -> Option<&Position> {
        match *self {
            Error::Io { ref pos, .. } => Some(pos),
            Error::Utf8 { ref pos, .. } => Some(pos),
            Error::Syntax { ref pos, .. } => Some(pos),
            Error::FieldCountMismatch { ref pos, .. } => Some(pos),
            Error::Config(_) => None,
        }
    }

    /// Returns true if this is an I/O error from the byte source.
    pub fn is_io_error(&self) -> bool {
        match *self {
            Error::Io { .. } => true,
            _ => false,
        }
    }

    /// Returns the kind of syntax error, if this is one.
    pub fn syntax_kind(&self) -> Option<SyntaxErrorKind> {
        match *self {
            Error::Syntax { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// A UTF-8 validation error that occurs when attempting to convert a
/// `ByteRecord` into a `StringRecord`.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{err}")]
pub struct FromUtf8Error {
    record: ByteRecord,
    #[source]
    err: Utf8Error,
}

impl FromUtf8Error {
    pub(crate) fn new(record: ByteRecord, err: Utf8Error) -> FromUtf8Error {
        FromUtf8Error { record, err }
    }

    /// Access the underlying `ByteRecord` that failed UTF-8 validation.
    pub fn into_byte_record(self) -> ByteRecord {
        self.record
    }

    /// Access the underlying UTF-8 validation error.
    pub fn utf8_error(&self) -> &Utf8Error {
        &self.err
    }
}

/// A UTF-8 validation error that occurred when attempting to convert a
/// `ByteRecord` into a `StringRecord`.
///
/// The error includes the index of the field that failed validation, and the
/// last byte at which valid UTF-8 was verified.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("invalid UTF-8 in field {field} near byte index {valid_up_to}")]
pub struct Utf8Error {
    /// The field index of a byte record in which UTF-8 validation failed.
    field: usize,
    /// The index into the given field up to which valid UTF-8 was verified.
    valid_up_to: usize,
}

impl Utf8Error {
    pub(crate) fn new(field: usize, valid_up_to: usize) -> Utf8Error {
        Utf8Error { field, valid_up_to }
    }

    /// The field index of a byte record in which UTF-8 validation failed.
    pub fn field(&self) -> usize {
        self.field
    }

    /// The index into the given field up to which valid UTF-8 was verified.
    pub fn valid_up_to(&self) -> usize {
        self.valid_up_to
    }
}
