use std::fs::File;
use std::io;
use std::path::Path;

use csv_dialect_core::{
    ByteSink, Dialect, Encoder, QuoteStyle, RecordCursor, SliceRecord, Status,
};
use log::{debug, warn};

use crate::byte_record::ByteRecord;
use crate::error::{Error, IntoInnerError, Result};
use crate::stream::{IoSink, Sink, DEFAULT_BUFFER_CAPACITY};

/// Builds a CSV writer with various configuration knobs.
///
/// This builder can be used to tweak the dialect of a CSV writer. Every
/// setter mirrors an attribute of [`Dialect`]. Construction validates the
/// dialect and fails with [`Error::Dialect`] if it is inconsistent.
#[derive(Debug)]
pub struct WriterBuilder {
    dialect: Dialect,
    capacity: usize,
}

impl Default for WriterBuilder {
    fn default() -> WriterBuilder {
        WriterBuilder {
            dialect: Dialect::default(),
            capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl WriterBuilder {
    /// Create a new builder for configuring CSV writing.
    ///
    /// # Example
    ///
    /// ```
    /// use csv_dialect::WriterBuilder;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut wtr = WriterBuilder::new()
    ///     .delimiter(b'\t')
    ///     .line_terminator(b"\n")
    ///     .from_writer(vec![])?;
    /// wtr.write_record(&["a", "b c", "d\te"])?;
    ///
    /// let data = String::from_utf8(wtr.into_inner()?)?;
    /// assert_eq!(data, "a\tb c\t\"d\te\"\n");
    /// # Ok(()) }
    /// ```
    pub fn new() -> WriterBuilder {
        WriterBuilder::default()
    }

    /// Build a CSV writer from this configuration that writes data to the
    /// file at `path`. The file is created if it does not exist and is
    /// truncated otherwise.
    pub fn from_path<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Writer<IoSink<File>>> {
        let path = path.as_ref();
        debug!("opening {} for writing", path.display());
        self.from_writer(File::create(path)?)
    }

    /// Build a CSV writer from this configuration that writes data to `wtr`.
    ///
    /// The writer is buffered automatically.
    pub fn from_writer<W: io::Write>(
        &self,
        wtr: W,
    ) -> Result<Writer<IoSink<W>>> {
        self.from_sink(IoSink::with_capacity(self.capacity, wtr))
    }

    /// Build a CSV writer from this configuration that pushes bytes into an
    /// arbitrary [`Sink`].
    pub fn from_sink<S: Sink>(&self, sink: S) -> Result<Writer<S>> {
        Writer::new(self, sink)
    }

    /// Copy every attribute of the given dialect into this builder.
    pub fn dialect(&mut self, dialect: &Dialect) -> &mut WriterBuilder {
        self.dialect = dialect.clone();
        self
    }

    /// The field delimiter to use when writing CSV.
    ///
    /// The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut WriterBuilder {
        self.dialect.set_delimiter(Some(delimiter));
        self
    }

    /// The quote character to use when writing CSV.
    ///
    /// The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut WriterBuilder {
        self.dialect.set_quote(quote);
        self
    }

    /// The escape character to use when writing CSV.
    ///
    /// This is disabled by default, but must be set when quotes are not
    /// doubled or when the quote style is [`QuoteStyle::Never`].
    pub fn escape(&mut self, escape: Option<u8>) -> &mut WriterBuilder {
        self.dialect.set_escape(escape);
        self
    }

    /// Enable double quote escapes.
    ///
    /// This is enabled by default. When disabled, quotes inside quoted
    /// fields are preceded by the escape character instead.
    pub fn double_quote(&mut self, yes: bool) -> &mut WriterBuilder {
        self.dialect.set_double_quote(yes);
        self
    }

    /// The quoting style to use when writing CSV.
    ///
    /// By default, this is set to [`QuoteStyle::Necessary`], which quotes a
    /// field only when it contains a delimiter, quote, escape or newline.
    pub fn quote_style(&mut self, style: QuoteStyle) -> &mut WriterBuilder {
        self.dialect.set_quote_style(style);
        self
    }

    /// Protect leading spaces from readers that skip them.
    pub fn skip_initial_space(&mut self, yes: bool) -> &mut WriterBuilder {
        self.dialect.set_skip_initial_space(yes);
        self
    }

    /// The byte sequence written after every record.
    ///
    /// The default is the platform's native line ending.
    pub fn line_terminator(&mut self, term: &[u8]) -> &mut WriterBuilder {
        self.dialect.set_line_terminator(term);
        self
    }

    /// Set the capacity (in bytes) of the internal buffer used in the CSV
    /// writer.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut WriterBuilder {
        self.capacity = capacity;
        self
    }
}

/// A CSV writer.
///
/// A writer turns records into CSV text through a [`Sink`], quoting and
/// escaping every field such that a [`Reader`](crate::Reader) built from the
/// same dialect reads the exact same fields back.
///
/// # Example
///
/// ```
/// use csv_dialect::{Dialect, WriterBuilder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut wtr = WriterBuilder::new().dialect(&Dialect::unix()).from_writer(vec![])?;
/// wtr.write_record(&["a", "b,c"])?;
/// wtr.write_record(&["1", "2"])?;
///
/// let data = String::from_utf8(wtr.into_inner()?)?;
/// assert_eq!(data, "\"a\",\"b,c\"\n\"1\",\"2\"\n");
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Writer<S> {
    encoder: Encoder,
    sink: S,
    state: WriterState,
}

#[derive(Debug, Default)]
struct WriterState {
    /// The number of records written.
    records: u64,
    /// Set once `close` was called.
    closed: bool,
    /// The last error reported by the sink.
    err: Option<io::Error>,
}

/// Hands encoded bytes to a `Sink`, keeping its errors for the caller.
struct Capture<'a, S> {
    sink: &'a mut S,
    err: &'a mut Option<io::Error>,
}

impl<'a, S: Sink> ByteSink for Capture<'a, S> {
    fn write_char(&mut self, c: u8) -> io::Result<()> {
        self.sink.write_char(c).map_err(|err| {
            let kind = err.kind();
            *self.err = Some(err);
            io::Error::from(kind)
        })
    }
}

impl Writer<IoSink<File>> {
    /// Create a new CSV writer with the default dialect that writes to the
    /// file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Writer<IoSink<File>>> {
        WriterBuilder::new().from_path(path)
    }
}

impl<S: Sink> Writer<S> {
    fn new(builder: &WriterBuilder, sink: S) -> Result<Writer<S>> {
        let encoder = Encoder::new(&builder.dialect).map_err(|err| {
            debug!("refusing to build writer: {}", err);
            err
        })?;
        debug!("built writer for {:?}", builder.dialect);
        Ok(Writer { encoder, sink, state: WriterState::default() })
    }

    /// Write a single record, reporting the outcome as status flags.
    ///
    /// On success, `succeeded` and `good` are set. If the sink fails, or
    /// this writer was closed, `io_error` is set instead.
    pub fn next_record<T: AsRef<[u8]>>(&mut self, record: &[T]) -> Status {
        self.write_cursor(&mut SliceRecord::new(record))
    }

    /// Write a single record pulled from an arbitrary [`RecordCursor`].
    pub fn write_cursor<C: RecordCursor + ?Sized>(
        &mut self,
        cursor: &mut C,
    ) -> Status {
        if self.state.closed {
            warn!("refusing to write a record to a closed writer");
            self.state.err = Some(closed_error());
            return Status::empty().with_io_error();
        }
        let mut out =
            Capture { sink: &mut self.sink, err: &mut self.state.err };
        let status = self.encoder.encode(cursor, &mut out);
        if status.succeeded() {
            self.state.records += 1;
        }
        status
    }

    /// Write a single record.
    ///
    /// # Example
    ///
    /// ```
    /// use csv_dialect::WriterBuilder;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut wtr = WriterBuilder::new().line_terminator(b"\n").from_writer(vec![])?;
    /// wtr.write_record(&["he said \"hi\"", ""])?;
    /// wtr.write_record(&[""])?;
    ///
    /// let data = String::from_utf8(wtr.into_inner()?)?;
    /// assert_eq!(data, "\"he said \"\"hi\"\"\",\n\"\"\n");
    /// # Ok(()) }
    /// ```
    pub fn write_record<T: AsRef<[u8]>>(&mut self, record: &[T]) -> Result<()> {
        let status = self.next_record(record);
        self.check(status)
    }

    /// Write a single `ByteRecord`.
    pub fn write_byte_record(&mut self, record: &ByteRecord) -> Result<()> {
        let status = self.write_cursor(&mut record.cursor());
        self.check(status)
    }

    /// Flush the contents of the internal buffer to the underlying stream.
    ///
    /// Flushing a closed writer does nothing.
    pub fn flush(&mut self) -> Result<()> {
        if self.state.closed {
            return Ok(());
        }
        self.sink.flush()?;
        Ok(())
    }

    /// Flush and close the underlying sink. For writers built on an
    /// `io::Write`, this drops the stream.
    ///
    /// Every subsequent write fails with an I/O error. Closing an already
    /// closed writer does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.state.closed {
            return Ok(());
        }
        self.state.closed = true;
        debug!("closing writer after {} records", self.state.records);
        self.sink.close()?;
        Ok(())
    }

    /// The number of records written so far.
    pub fn records(&self) -> u64 {
        self.state.records
    }

    /// Return a reference to the underlying sink.
    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    /// Unwrap this writer, returning the underlying sink without flushing
    /// it.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn check(&mut self, status: Status) -> Result<()> {
        if status.is_io_error() {
            let err = self.state.err.take().unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::Other, "CSV record source failed")
            });
            return Err(Error::Io(err));
        }
        Ok(())
    }
}

impl<W: io::Write> Writer<IoSink<W>> {
    /// Flush this writer and return the underlying `io::Write`.
    ///
    /// If flushing fails, the writer is returned inside the error.
    pub fn into_inner(
        self,
    ) -> std::result::Result<W, IntoInnerError<Writer<IoSink<W>>>> {
        let Writer { encoder, sink, state } = self;
        sink.into_inner().map_err(|(err, sink)| {
            IntoInnerError::new(Writer { encoder, sink, state }, err)
        })
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "CSV writer is closed")
}
