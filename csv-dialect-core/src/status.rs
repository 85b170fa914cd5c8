use core::fmt;

use crate::dialect::DialectError;

const SUCCEEDED: u16 = 1 << 0;
const GOOD: u16 = 1 << 1;
const EOF: u16 = 1 << 2;
const IO_ERROR: u16 = 1 << 3;
const TRUNCATED: u16 = 1 << 4;
const DIALECT_NULL: u16 = 1 << 5;
const DELIMITER_ERROR: u16 = 1 << 6;
const QUOTE_ESCAPE_ERROR: u16 = 1 << 7;

const NAMES: &[(u16, &str)] = &[
    (SUCCEEDED, "succeeded"),
    (GOOD, "good"),
    (EOF, "eof"),
    (IO_ERROR, "io_error"),
    (TRUNCATED, "truncated"),
    (DIALECT_NULL, "dialect_null"),
    (DELIMITER_ERROR, "delimiter_error"),
    (QUOTE_ESCAPE_ERROR, "quote_escape_error"),
];

/// The outcome of a dialect, parser or encoder operation.
///
/// A `Status` is a flat word of independent flags. They are not mutually
/// exclusive: reading the last record of a file that lacks a trailing line
/// terminator, for example, reports both `succeeded` and `eof` alongside the
/// record. This lets a caller distinguish "stop, normal end of data" from
/// "stop, I/O failed" from "configuration rejected" without unwinding.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Status(u16);

impl Status {
    /// A status with no flags set. This represents a failure with no
    /// particular cause.
    pub fn empty() -> Status {
        Status(0)
    }

    /// A status with only the `succeeded` flag set.
    pub fn success() -> Status {
        Status(SUCCEEDED)
    }

    /// Returns true if the operation succeeded.
    pub fn succeeded(&self) -> bool {
        self.has(SUCCEEDED)
    }

    /// Returns true if the operation did not succeed.
    pub fn failed(&self) -> bool {
        !self.succeeded()
    }

    /// Returns true if the underlying stream can still produce or accept
    /// data.
    pub fn is_good(&self) -> bool {
        self.has(GOOD)
    }

    /// Returns true if the end of the underlying stream was reached.
    pub fn is_eof(&self) -> bool {
        self.has(EOF)
    }

    /// Returns true if the underlying stream reported an I/O error.
    pub fn is_io_error(&self) -> bool {
        self.has(IO_ERROR)
    }

    /// Returns true if a field did not fit a fixed capacity buffer.
    ///
    /// The engines in this crate only use growable buffers, so they never
    /// set this flag themselves. It is reserved for callers that plug in
    /// fixed capacity storage.
    pub fn is_truncated(&self) -> bool {
        self.has(TRUNCATED)
    }

    /// Returns true if no dialect was supplied.
    pub fn is_dialect_null(&self) -> bool {
        self.has(DIALECT_NULL)
    }

    /// Returns true if the dialect has no delimiter.
    pub fn is_delimiter_error(&self) -> bool {
        self.has(DELIMITER_ERROR)
    }

    /// Returns true if the dialect's quote and escape configuration cannot
    /// represent a literal quote.
    pub fn is_quote_escape_error(&self) -> bool {
        self.has(QUOTE_ESCAPE_ERROR)
    }

    /// Set the `succeeded` flag.
    pub fn with_succeeded(self) -> Status {
        self.with(SUCCEEDED)
    }

    /// Set the `good` flag.
    pub fn with_good(self) -> Status {
        self.with(GOOD)
    }

    /// Set the `eof` flag.
    pub fn with_eof(self) -> Status {
        self.with(EOF)
    }

    /// Set the `io_error` flag. This also clears `succeeded` and `good`.
    pub fn with_io_error(self) -> Status {
        Status((self.0 | IO_ERROR) & !(SUCCEEDED | GOOD))
    }

    /// Set the `truncated` flag.
    pub fn with_truncated(self) -> Status {
        self.with(TRUNCATED)
    }

    /// Set the `dialect_null` flag.
    pub fn with_dialect_null(self) -> Status {
        self.with(DIALECT_NULL)
    }

    /// Set the `delimiter_error` flag.
    pub fn with_delimiter_error(self) -> Status {
        self.with(DELIMITER_ERROR)
    }

    /// Set the `quote_escape_error` flag.
    pub fn with_quote_escape_error(self) -> Status {
        self.with(QUOTE_ESCAPE_ERROR)
    }

    /// Returns the raw flag word.
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Convert the configuration flags of this status into a result.
    ///
    /// This is how a reader or writer turns the outcome of
    /// [`Dialect::validate`](crate::Dialect::validate) into a construction
    /// failure. I/O flags are ignored.
    pub fn into_dialect_result(self) -> Result<(), DialectError> {
        if self.is_dialect_null() {
            Err(DialectError::NullDialect)
        } else if self.is_delimiter_error() {
            Err(DialectError::UndefinedDelimiter)
        } else if self.is_quote_escape_error() {
            Err(DialectError::QuoteEscape)
        } else {
            Ok(())
        }
    }

    fn has(&self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    fn with(self, flag: u16) -> Status {
        Status(self.0 | flag)
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut set = f.debug_set();
        for &(flag, name) in NAMES {
            if self.has(flag) {
                set.entry(&format_args!("{}", name));
            }
        }
        set.finish()
    }
}
