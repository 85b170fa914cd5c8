use std::fs::File;
use std::io;
use std::path::Path;

use csv_dialect_core::{
    Dialect, Parser, Position, QuoteStyle, ReadResult, RecordSink, Status,
};
use log::{debug, warn};

use crate::byte_record::ByteRecord;
use crate::error::{Error, Result};
use crate::stream::{IoSource, Signal, Source, DEFAULT_BUFFER_CAPACITY};
use crate::string_record::StringRecord;

/// Builds a CSV reader with various configuration knobs.
///
/// This builder can be used to tweak the dialect of a CSV reader. Every
/// setter mirrors an attribute of [`Dialect`]. Construction validates the
/// dialect and fails with [`Error::Dialect`] if it is inconsistent.
#[derive(Debug)]
pub struct ReaderBuilder {
    dialect: Dialect,
    capacity: usize,
}

impl Default for ReaderBuilder {
    fn default() -> ReaderBuilder {
        ReaderBuilder {
            dialect: Dialect::default(),
            capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ReaderBuilder {
    /// Create a new builder for configuring CSV parsing.
    ///
    /// # Example
    ///
    /// ```
    /// use csv_dialect::{ReaderBuilder, StringRecord};
    ///
    /// # fn main() -> Result<(), csv_dialect::Error> {
    /// let data = "city;country\nBoston;United States\n";
    /// let mut rdr = ReaderBuilder::new()
    ///     .delimiter(b';')
    ///     .from_reader(data.as_bytes())?;
    ///
    /// let mut record = StringRecord::new();
    /// assert!(rdr.read_string_record(&mut record)?);
    /// assert_eq!(record, vec!["city", "country"]);
    /// assert!(rdr.read_string_record(&mut record)?);
    /// assert_eq!(record, vec!["Boston", "United States"]);
    /// assert!(!rdr.read_string_record(&mut record)?);
    /// # Ok(()) }
    /// ```
    pub fn new() -> ReaderBuilder {
        ReaderBuilder::default()
    }

    /// Build a CSV parser from this configuration that reads data from the
    /// file at `path`.
    pub fn from_path<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Reader<IoSource<File>>> {
        let path = path.as_ref();
        debug!("opening {} for reading", path.display());
        self.from_reader(File::open(path)?)
    }

    /// Build a CSV parser from this configuration that reads data from
    /// `rdr`.
    ///
    /// The reader is buffered automatically.
    pub fn from_reader<R: io::Read>(
        &self,
        rdr: R,
    ) -> Result<Reader<IoSource<R>>> {
        self.from_source(IoSource::with_capacity(self.capacity, rdr))
    }

    /// Build a CSV parser from this configuration that pulls bytes from an
    /// arbitrary [`Source`].
    ///
    /// Pair this with [`Reader::next_record_into`] to also choose where the
    /// parsed fields go.
    pub fn from_source<S: Source>(&self, src: S) -> Result<Reader<S>> {
        Reader::new(self, src)
    }

    /// Copy every attribute of the given dialect into this builder.
    pub fn dialect(&mut self, dialect: &Dialect) -> &mut ReaderBuilder {
        self.dialect = dialect.clone();
        self
    }

    /// The field delimiter to use when parsing CSV.
    ///
    /// The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut ReaderBuilder {
        self.dialect.set_delimiter(Some(delimiter));
        self
    }

    /// The quote character to use when parsing CSV.
    ///
    /// The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut ReaderBuilder {
        self.dialect.set_quote(quote);
        self
    }

    /// The escape character to use when parsing CSV.
    ///
    /// Outside of quotes, the escape character makes the next byte literal.
    /// Inside of quotes, it can be used to escape the quote character. This
    /// is disabled by default.
    pub fn escape(&mut self, escape: Option<u8>) -> &mut ReaderBuilder {
        self.dialect.set_escape(escape);
        self
    }

    /// Enable double quote escapes.
    ///
    /// This is enabled by default. When disabled, an escape character must
    /// be set.
    pub fn double_quote(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.set_double_quote(yes);
        self
    }

    /// The quoting style.
    ///
    /// When set to [`QuoteStyle::Never`], quote characters are read as
    /// ordinary data, and an escape character must be set.
    pub fn quote_style(&mut self, style: QuoteStyle) -> &mut ReaderBuilder {
        self.dialect.set_quote_style(style);
        self
    }

    /// Discard spaces immediately following a delimiter.
    pub fn skip_initial_space(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.dialect.set_skip_initial_space(yes);
        self
    }

    /// Set the capacity (in bytes) of the buffer used in the CSV reader.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut ReaderBuilder {
        self.capacity = capacity;
        self
    }
}

/// A CSV reader.
///
/// A reader pulls bytes from a [`Source`] and runs them through the parsing
/// state machine, one record per call. Parsing never fails: malformed data
/// is always read as *some* sequence of records.
///
/// A final record that lacks a line terminator is still returned, as is
/// whatever was assembled before the source reported an error.
#[derive(Debug)]
pub struct Reader<S> {
    parser: Parser,
    src: S,
    state: ReaderState,
}

#[derive(Debug, Default)]
struct ReaderState {
    /// Set once the source is exhausted or failed.
    eof: bool,
    /// Set once `close` was called.
    closed: bool,
    /// The last error reported by the source.
    err: Option<io::Error>,
}

impl Reader<IoSource<File>> {
    /// Create a new CSV reader with the default dialect for the file at
    /// `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Reader<IoSource<File>>> {
        ReaderBuilder::new().from_path(path)
    }
}

impl<S: Source> Reader<S> {
    fn new(builder: &ReaderBuilder, src: S) -> Result<Reader<S>> {
        let parser = Parser::new(&builder.dialect).map_err(|err| {
            debug!("refusing to build reader: {}", err);
            err
        })?;
        debug!("built reader for {:?}", builder.dialect);
        Ok(Reader { parser, src, state: ReaderState::default() })
    }

    /// Read the next record into `record`, reporting the outcome as status
    /// flags.
    ///
    /// When a record was read, `succeeded` is set. It comes with `good` if
    /// more data may follow, or with `eof` if the record was the last one
    /// and was not terminated. When there are no more records, only `eof`
    /// is set and `record` is empty. When the source fails, `io_error` is
    /// set and `record` holds whatever fields were assembled before the
    /// failure.
    pub fn next_record(&mut self, record: &mut ByteRecord) -> Status {
        record.clear();
        self.next_record_into(record)
    }

    /// Read the next record into an arbitrary [`RecordSink`], reporting the
    /// outcome as status flags.
    ///
    /// The sink sees every byte of field content through `append`, the end
    /// of every field through `save_field` and the end of the record through
    /// `save_record`. The flags mean the same as for
    /// [`next_record`](Reader::next_record). A record cut short by an I/O
    /// error is still finished with `save_record`.
    ///
    /// # Example
    ///
    /// ```
    /// use csv_dialect::{ReaderBuilder, RecordSink};
    ///
    /// #[derive(Default)]
    /// struct Widths(Vec<usize>, usize);
    ///
    /// impl RecordSink for Widths {
    ///     fn append(&mut self, _: u8) {
    ///         self.1 += 1;
    ///     }
    ///
    ///     fn save_field(&mut self) {
    ///         self.0.push(self.1);
    ///         self.1 = 0;
    ///     }
    /// }
    ///
    /// # fn main() -> Result<(), csv_dialect::Error> {
    /// let mut rdr = ReaderBuilder::new().from_reader(&b"abc,\"d,e\"\n"[..])?;
    /// let mut widths = Widths::default();
    /// assert!(rdr.next_record_into(&mut widths).succeeded());
    /// assert_eq!(widths.0, vec![3, 3]);
    /// # Ok(()) }
    /// ```
    pub fn next_record_into<R: RecordSink>(&mut self, record: &mut R) -> Status {
        if self.state.closed || self.state.eof {
            return Status::empty().with_eof();
        }
        loop {
            let signal = match self.src.next_char() {
                // NUL is the parser's end-of-input marker, so it cannot be
                // passed through as data.
                Signal::Char(0) => Signal::Error(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "NUL byte in CSV data at byte {}",
                        self.parser.position().byte()
                    ),
                )),
                signal => signal,
            };
            match signal {
                Signal::Char(c) => {
                    if self.parser.feed(c, record) == ReadResult::Record {
                        return Status::success().with_good();
                    }
                }
                Signal::Eof => {
                    self.state.eof = true;
                    return match self.parser.finish(record) {
                        ReadResult::Record => Status::success().with_eof(),
                        _ => Status::empty().with_eof(),
                    };
                }
                Signal::Error(err) => {
                    warn!(
                        "CSV source failed at byte {}: {}",
                        self.parser.position().byte(),
                        err
                    );
                    self.state.eof = true;
                    self.state.err = Some(err);
                    self.parser.finish(record);
                    return Status::empty().with_io_error();
                }
            }
        }
    }

    /// Read a single row into the given byte record. Returns false when no
    /// more records could be read.
    ///
    /// # Example
    ///
    /// ```
    /// use csv_dialect::{ByteRecord, ReaderBuilder};
    ///
    /// # fn main() -> Result<(), csv_dialect::Error> {
    /// let data = "a,b,\"c,d\"\n1,2,3\n";
    /// let mut rdr = ReaderBuilder::new().from_reader(data.as_bytes())?;
    /// let mut record = ByteRecord::new();
    ///
    /// assert!(rdr.read_record(&mut record)?);
    /// assert_eq!(record, vec!["a", "b", "c,d"]);
    /// assert!(rdr.read_record(&mut record)?);
    /// assert_eq!(record, vec!["1", "2", "3"]);
    /// assert!(!rdr.read_record(&mut record)?);
    /// # Ok(()) }
    /// ```
    pub fn read_record(&mut self, record: &mut ByteRecord) -> Result<bool> {
        let status = self.next_record(record);
        if status.is_io_error() {
            return Err(Error::Io(self.take_error()));
        }
        Ok(status.succeeded())
    }

    /// Read a single row into the given string record. Returns false when
    /// no more records could be read.
    ///
    /// If a field is not valid UTF-8, an error is returned and `record` is
    /// left empty.
    pub fn read_string_record(
        &mut self,
        record: &mut StringRecord,
    ) -> Result<bool> {
        let pos = self.position().clone();
        let read_res = self.read_record(record.as_byte_record_mut());
        let utf8_res = match record.as_byte_record().validate() {
            Ok(()) => Ok(()),
            Err(err) => {
                // A string record must never expose invalid UTF-8.
                record.clear();
                Err(err)
            }
        };
        match (read_res, utf8_res) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(Error::Utf8 { pos: Some(pos), err }),
            (Ok(more), Ok(())) => Ok(more),
        }
    }

    /// Returns a borrowed iterator over all records as raw bytes.
    ///
    /// Each item yielded by this iterator is a `Result<ByteRecord, Error>`.
    /// The iterator stops after the first error.
    pub fn byte_records(&mut self) -> ByteRecordsIter<S> {
        ByteRecordsIter { rdr: self, done: false }
    }

    /// Returns a borrowed iterator over all records as strings.
    ///
    /// Each item yielded by this iterator is a `Result<StringRecord, Error>`.
    pub fn records(&mut self) -> StringRecordsIter<S> {
        StringRecordsIter { rdr: self, done: false }
    }

    /// Return the current position of this reader.
    ///
    /// Between calls to the read methods, the record index is the number of
    /// records read so far.
    pub fn position(&self) -> &Position {
        self.parser.position()
    }

    /// Returns true if the source has been exhausted or has failed.
    pub fn is_done(&self) -> bool {
        self.state.eof || self.state.closed
    }

    /// Close the underlying source.
    ///
    /// Every subsequent read reports the end of the data. Closing an already
    /// closed reader does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.state.closed {
            return Ok(());
        }
        self.state.closed = true;
        debug!("closing reader after {} records", self.position().record());
        self.src.close()?;
        Ok(())
    }

    /// Return a reference to the underlying source.
    pub fn get_ref(&self) -> &S {
        &self.src
    }

    /// Unwrap this CSV reader, returning the underlying source.
    ///
    /// Note that any leftover data inside the source's buffer is lost.
    pub fn into_inner(self) -> S {
        self.src
    }

    fn take_error(&mut self) -> io::Error {
        self.state.err.take().unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "CSV source failed")
        })
    }
}

/// A borrowed iterator over records as byte records.
pub struct ByteRecordsIter<'r, S> {
    rdr: &'r mut Reader<S>,
    done: bool,
}

impl<'r, S: Source> ByteRecordsIter<'r, S> {
    /// Return a reference to the underlying CSV reader.
    pub fn reader(&self) -> &Reader<S> {
        &self.rdr
    }
}

impl<'r, S: Source> Iterator for ByteRecordsIter<'r, S> {
    type Item = Result<ByteRecord>;

    fn next(&mut self) -> Option<Result<ByteRecord>> {
        if self.done {
            return None;
        }
        let mut record = ByteRecord::new();
        match self.rdr.read_record(&mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// A borrowed iterator over records as string records.
pub struct StringRecordsIter<'r, S> {
    rdr: &'r mut Reader<S>,
    done: bool,
}

impl<'r, S: Source> StringRecordsIter<'r, S> {
    /// Return a reference to the underlying CSV reader.
    pub fn reader(&self) -> &Reader<S> {
        &self.rdr
    }
}

impl<'r, S: Source> Iterator for StringRecordsIter<'r, S> {
    type Item = Result<StringRecord>;

    fn next(&mut self) -> Option<Result<StringRecord>> {
        if self.done {
            return None;
        }
        let mut record = StringRecord::new();
        match self.rdr.read_string_record(&mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => {
                self.done = true;
                None
            }
            // A UTF-8 failure only spoils one record.
            Err(err @ Error::Utf8 { .. }) => Some(Err(err)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
