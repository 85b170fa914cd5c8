use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::result;

use csv_dialect_core::{DialectError, Position};

use crate::byte_record::ByteRecord;

/// A type alias for `Result<T, csv_dialect::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur when reading or writing CSV data.
///
/// Parsing itself never fails: malformed input is always read as *some*
/// sequence of records. What can fail is the configuration, the underlying
/// stream, and the conversion of fields to `str`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error reported by the underlying source or sink.
    #[error("{0}")]
    Io(#[from] io::Error),
    /// The dialect given to a reader or writer failed validation.
    #[error("invalid CSV dialect: {0}")]
    Dialect(#[from] DialectError),
    /// A field could not be decoded as UTF-8 while reading into a
    /// `StringRecord`.
    #[error("{}", utf8_message(.pos, .err))]
    Utf8 {
        /// The position of the record in which this error occurred, if
        /// available.
        pos: Option<Position>,
        /// The corresponding UTF-8 error.
        err: Utf8Error,
    },
}

impl Error {
    /// Returns true if this is an I/O error.
    pub fn is_io_error(&self) -> bool {
        match *self {
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Return the position of the record in which this error occurred, if
    /// one is known.
    pub fn position(&self) -> Option<&Position> {
        match *self {
            Error::Utf8 { pos: Some(ref pos), .. } => Some(pos),
            _ => None,
        }
    }
}

fn utf8_message(pos: &Option<Position>, err: &Utf8Error) -> String {
    match *pos {
        None => format!("CSV parse error: field {}: {}", err.field(), err),
        Some(ref pos) => format!(
            "CSV parse error: record {} (byte {}, line {}, field: {}): {}",
            pos.record(),
            pos.byte(),
            pos.line(),
            err.field(),
            err
        ),
    }
}

/// A UTF-8 validation error that occurs when attempting to convert a
/// `ByteRecord` into a `StringRecord`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FromUtf8Error {
    record: ByteRecord,
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

impl fmt::Display for FromUtf8Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl StdError for FromUtf8Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.err)
    }
}

/// A UTF-8 validation error.
///
/// The error includes the index of the field that failed validation, and the
/// last byte at which valid UTF-8 was verified.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error(
    "invalid utf-8: invalid UTF-8 in field {field} near byte index {valid_up_to}"
)]
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

/// `IntoInnerError` occurs when consuming a `Writer` fails.
///
/// Consuming the `Writer` causes a flush to happen. If the flush fails, then
/// this error is returned, which contains both the original `Writer` and
/// the error that occurred.
///
/// The type parameter `W` is the unconsumed writer.
pub struct IntoInnerError<W> {
    wtr: W,
    err: io::Error,
}

impl<W> IntoInnerError<W> {
    pub(crate) fn new(wtr: W, err: io::Error) -> IntoInnerError<W> {
        IntoInnerError { wtr, err }
    }

    /// Returns the error which caused the call to `into_inner` to fail.
    pub fn error(&self) -> &io::Error {
        &self.err
    }

    /// Returns the underlying writer which generated the error.
    ///
    /// The returned value can be used for error recovery, such as
    /// re-inspecting the buffer.
    pub fn into_inner(self) -> W {
        self.wtr
    }
}

impl<W: std::any::Any> StdError for IntoInnerError<W> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.err)
    }
}

impl<W> fmt::Display for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl<W> fmt::Debug for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.err.fmt(f)
    }
}
