use core::fmt;

use log::{debug, trace};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::status::Status;

/// The maximum number of bytes in a line terminator.
pub const LINE_TERMINATOR_MAX: usize = 8;

/// The quoting style to use when writing CSV data.
///
/// The reader only looks at this to decide whether a quote character can
/// open a quoted field: under `Never`, quote characters are ordinary data.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum QuoteStyle {
    /// This puts quotes around every field. Always.
    Always,
    /// This puts quotes around fields only when necessary.
    ///
    /// They are necessary when fields contain a quote, delimiter, escape
    /// or line feed/carriage return.
    ///
    /// This is the default.
    Necessary,
    /// This *never* writes quotes.
    ///
    /// Special characters are preceded by the escape character instead,
    /// which is why a dialect using this style must define one.
    Never,
}

impl Default for QuoteStyle {
    fn default() -> QuoteStyle {
        QuoteStyle::Necessary
    }
}

/// The byte sequence a writer emits after every record.
///
/// A line terminator is stored inline, so copying a [`Dialect`] never shares
/// storage with the original. It is at most [`LINE_TERMINATOR_MAX`] bytes
/// long and never contains a NUL byte.
///
/// Readers ignore this setting entirely: any unescaped `\r`, `\n` or `\r\n`
/// ends a record.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct LineTerminator {
    bytes: [u8; LINE_TERMINATOR_MAX],
    len: u8,
}

impl LineTerminator {
    /// Create a line terminator from the given bytes.
    ///
    /// The terminator is cut short at the first NUL byte or after
    /// [`LINE_TERMINATOR_MAX`] bytes, whichever comes first. An empty
    /// terminator is legal, if unusual.
    pub fn new(bytes: &[u8]) -> LineTerminator {
        let len = bytes
            .iter()
            .take(LINE_TERMINATOR_MAX)
            .position(|&b| b == b'\0')
            .unwrap_or_else(|| bytes.len().min(LINE_TERMINATOR_MAX));
        let mut term = LineTerminator { bytes: [0; LINE_TERMINATOR_MAX], len: 0 };
        term.bytes[..len].copy_from_slice(&bytes[..len]);
        term.len = len as u8;
        term
    }

    /// `\r\n`
    pub fn crlf() -> LineTerminator {
        LineTerminator::new(b"\r\n")
    }

    /// `\n`
    pub fn lf() -> LineTerminator {
        LineTerminator::new(b"\n")
    }

    /// The native line ending of the host platform.
    pub fn native() -> LineTerminator {
        if cfg!(windows) {
            LineTerminator::crlf()
        } else {
            LineTerminator::lf()
        }
    }

    /// The bytes of this terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The number of bytes in this terminator.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true if this terminator has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for LineTerminator {
    fn default() -> LineTerminator {
        LineTerminator::native()
    }
}

impl fmt::Debug for LineTerminator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LineTerminator(\"")?;
        for &b in self.as_bytes() {
            write!(f, "{}", core::ascii::escape_default(b))?;
        }
        write!(f, "\")")
    }
}

impl From<Vec<u8>> for LineTerminator {
    fn from(bytes: Vec<u8>) -> LineTerminator {
        LineTerminator::new(&bytes)
    }
}

impl From<LineTerminator> for Vec<u8> {
    fn from(term: LineTerminator) -> Vec<u8> {
        term.as_bytes().to_vec()
    }
}

#[cfg(feature = "serde")]
impl Serialize for LineTerminator {
    fn serialize<S: serde::Serializer>(
        &self,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        self.as_bytes().serialize(ser)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for LineTerminator {
    fn deserialize<D: serde::Deserializer<'de>>(
        de: D,
    ) -> Result<LineTerminator, D::Error> {
        Vec::<u8>::deserialize(de).map(LineTerminator::from)
    }
}

/// An error describing why a [`Dialect`] cannot be used.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DialectError {
    /// No dialect was given.
    #[error("CSV dialect error: no dialect was provided")]
    NullDialect,
    /// The delimiter is undefined.
    #[error("CSV dialect error: the delimiter is undefined")]
    UndefinedDelimiter,
    /// Either quote doubling is disabled or the quote style is `Never`, but
    /// no escape character is defined.
    #[error(
        "CSV dialect error: an escape character is required when quote \
         doubling is disabled or the quote style is 'Never'"
    )]
    QuoteEscape,
}

/// The set of rules for parsing and writing CSV data.
///
/// A `Dialect` is a plain value. Readers and writers take a copy of it when
/// they are built, so changing a dialect afterwards never affects them, and
/// readers and writers built from one dialect can run on separate threads.
///
/// Every setter returns a [`Status`]. Only `set_delimiter` can fail, namely
/// when asked to clear the delimiter.
///
/// The defaults are: a `,` delimiter, a `"` quote, no escape character,
/// quote doubling enabled, [`QuoteStyle::Necessary`], initial spaces kept
/// and the platform's native line terminator.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Dialect {
    delimiter: Option<u8>,
    quote: u8,
    escape: Option<u8>,
    double_quote: bool,
    quote_style: QuoteStyle,
    skip_initial_space: bool,
    line_terminator: LineTerminator,
}

impl Default for Dialect {
    fn default() -> Dialect {
        Dialect {
            delimiter: Some(b','),
            quote: b'"',
            escape: None,
            double_quote: true,
            quote_style: QuoteStyle::default(),
            skip_initial_space: false,
            line_terminator: LineTerminator::default(),
        }
    }
}

impl Dialect {
    /// Create a dialect with the default configuration.
    pub fn new() -> Dialect {
        Dialect::default()
    }

    /// The dialect of CSV files produced by Excel: the defaults, with a
    /// `\r\n` line terminator.
    pub fn excel() -> Dialect {
        let mut d = Dialect::default();
        d.line_terminator = LineTerminator::crlf();
        d
    }

    /// Like [`Dialect::excel`], but tab delimited.
    pub fn excel_tab() -> Dialect {
        let mut d = Dialect::excel();
        d.delimiter = Some(b'\t');
        d
    }

    /// The dialect of CSV files typically produced on Unix systems: every
    /// field quoted and a `\n` line terminator.
    pub fn unix() -> Dialect {
        let mut d = Dialect::default();
        d.quote_style = QuoteStyle::Always;
        d.line_terminator = LineTerminator::lf();
        d
    }

    /// The field delimiter.
    pub fn delimiter(&self) -> Option<u8> {
        self.delimiter
    }

    /// Set the field delimiter.
    ///
    /// Passing `None` fails and leaves the dialect unchanged.
    pub fn set_delimiter(&mut self, delimiter: Option<u8>) -> Status {
        match delimiter {
            None => {
                debug!("refusing to set an undefined delimiter");
                Status::empty().with_delimiter_error()
            }
            Some(b) => {
                trace!("delimiter set to {:?}", b as char);
                self.delimiter = Some(b);
                Status::success()
            }
        }
    }

    /// The quote character.
    pub fn quote(&self) -> u8 {
        self.quote
    }

    /// Set the quote character.
    pub fn set_quote(&mut self, quote: u8) -> Status {
        trace!("quote set to {:?}", quote as char);
        self.quote = quote;
        Status::success()
    }

    /// The escape character, if one is defined.
    pub fn escape(&self) -> Option<u8> {
        self.escape
    }

    /// Set or clear the escape character.
    ///
    /// The escape character marks the byte following it as literal data.
    /// Clearing it is always allowed here, but may leave the dialect in a
    /// state that [`Dialect::validate`] rejects.
    pub fn set_escape(&mut self, escape: Option<u8>) -> Status {
        trace!("escape set to {:?}", escape.map(|b| b as char));
        self.escape = escape;
        Status::success()
    }

    /// Whether a doubled quote inside a quoted field is a literal quote.
    pub fn double_quote(&self) -> bool {
        self.double_quote
    }

    /// Enable or disable quote doubling.
    ///
    /// When disabled, quotes inside quoted fields are escaped with the
    /// escape character instead, which must then be defined.
    pub fn set_double_quote(&mut self, yes: bool) -> Status {
        trace!("double_quote set to {}", yes);
        self.double_quote = yes;
        Status::success()
    }

    /// The quoting style.
    pub fn quote_style(&self) -> QuoteStyle {
        self.quote_style
    }

    /// Set the quoting style.
    pub fn set_quote_style(&mut self, style: QuoteStyle) -> Status {
        trace!("quote_style set to {:?}", style);
        self.quote_style = style;
        Status::success()
    }

    /// Whether spaces immediately following a delimiter are discarded.
    pub fn skip_initial_space(&self) -> bool {
        self.skip_initial_space
    }

    /// Enable or disable discarding spaces at the start of a field.
    pub fn set_skip_initial_space(&mut self, yes: bool) -> Status {
        trace!("skip_initial_space set to {}", yes);
        self.skip_initial_space = yes;
        Status::success()
    }

    /// The line terminator emitted after each written record.
    pub fn line_terminator(&self) -> LineTerminator {
        self.line_terminator
    }

    /// Set the line terminator.
    ///
    /// The bytes are copied, and cut short at the first NUL byte or after
    /// [`LINE_TERMINATOR_MAX`] bytes.
    pub fn set_line_terminator(&mut self, term: &[u8]) -> Status {
        let term = LineTerminator::new(term);
        trace!("line_terminator set to {:?}", term);
        self.line_terminator = term;
        Status::success()
    }

    /// Check that this dialect is usable by a reader or writer.
    ///
    /// A dialect is valid if and only if its delimiter is defined and,
    /// whenever quote doubling is disabled or the quote style is
    /// [`QuoteStyle::Never`], its escape character is defined.
    ///
    /// The line terminator is not checked. It is only used by writers and
    /// an empty terminator is legal.
    pub fn validate(&self) -> Status {
        if self.delimiter.is_none() {
            debug!("dialect has an undefined delimiter");
            return Status::empty().with_delimiter_error();
        }
        let needs_escape =
            !self.double_quote || self.quote_style == QuoteStyle::Never;
        if needs_escape && self.escape.is_none() {
            debug!(
                "dialect needs an escape character (double_quote: {}, \
                 quote_style: {:?})",
                self.double_quote, self.quote_style,
            );
            return Status::empty().with_quote_escape_error();
        }
        Status::success()
    }

    /// Like [`Dialect::validate`], but returns an error describing the
    /// problem.
    pub fn check(&self) -> Result<(), DialectError> {
        self.validate().into_dialect_result()
    }
}

/// Validate an optional dialect.
///
/// This reports `dialect_null` when no dialect is given and otherwise
/// defers to [`Dialect::validate`].
pub fn validate(dialect: Option<&Dialect>) -> Status {
    match dialect {
        None => {
            debug!("no dialect to validate");
            Status::empty().with_dialect_null()
        }
        Some(d) => d.validate(),
    }
}
