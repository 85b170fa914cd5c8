use std::io;

use log::warn;
use memchr::{memchr, memchr2, memchr3};

use crate::dialect::{Dialect, DialectError, LineTerminator, QuoteStyle};
use crate::status::Status;

/// A destination for encoded bytes.
pub trait ByteSink {
    /// Write a single byte.
    fn write_char(&mut self, c: u8) -> io::Result<()>;
}

impl ByteSink for Vec<u8> {
    fn write_char(&mut self, c: u8) -> io::Result<()> {
        self.push(c);
        Ok(())
    }
}

impl<'a, S: ByteSink + ?Sized> ByteSink for &'a mut S {
    fn write_char(&mut self, c: u8) -> io::Result<()> {
        (**self).write_char(c)
    }
}

/// What a [`RecordCursor`] found when asked for the next field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldSignal {
    /// The cursor moved to a field of the given length in bytes.
    Field(usize),
    /// There are no more fields in the record.
    EndOfRecord,
    /// The cursor could not produce the next field.
    Error,
}

/// A cursor over the fields of one record, as consumed by an [`Encoder`].
///
/// A cursor starts before the first field. `next_field` moves it to the
/// start of the following field, `next_char` then walks the bytes of that
/// field and `rewind_field` moves back to the start of it.
pub trait RecordCursor {
    /// The number of fields in the record.
    fn field_count(&self) -> usize;

    /// Move to the next field.
    fn next_field(&mut self) -> FieldSignal;

    /// Move back to the first byte of the current field.
    fn rewind_field(&mut self);

    /// Return the next byte of the current field, if any remain.
    fn next_char(&mut self) -> Option<u8>;

    /// Return all bytes of the current field, if they are stored
    /// contiguously.
    ///
    /// The encoder uses this to scan a field without walking it byte by
    /// byte. The default implementation returns `None`.
    fn field_bytes(&self) -> Option<&[u8]> {
        None
    }
}

/// A [`RecordCursor`] over a slice of fields.
#[derive(Clone, Debug)]
pub struct SliceRecord<'a, T> {
    fields: &'a [T],
    next: usize,
    cur: Option<usize>,
    pos: usize,
}

impl<'a, T: AsRef<[u8]>> SliceRecord<'a, T> {
    /// Create a cursor positioned before the first of the given fields.
    pub fn new(fields: &'a [T]) -> SliceRecord<'a, T> {
        SliceRecord { fields, next: 0, cur: None, pos: 0 }
    }

    fn field(&self) -> &'a [u8] {
        let fields = self.fields;
        match self.cur {
            None => &[],
            Some(i) => fields[i].as_ref(),
        }
    }
}

impl<'a, T: AsRef<[u8]>> RecordCursor for SliceRecord<'a, T> {
    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn next_field(&mut self) -> FieldSignal {
        if self.next >= self.fields.len() {
            self.cur = None;
            return FieldSignal::EndOfRecord;
        }
        self.cur = Some(self.next);
        self.next += 1;
        self.pos = 0;
        FieldSignal::Field(self.field().len())
    }

    fn rewind_field(&mut self) {
        self.pos = 0;
    }

    fn next_char(&mut self) -> Option<u8> {
        let c = self.field().get(self.pos).copied()?;
        self.pos += 1;
        Some(c)
    }

    fn field_bytes(&self) -> Option<&[u8]> {
        self.cur.map(|i| self.fields[i].as_ref())
    }
}

enum Halt {
    Cursor,
    Io(io::Error),
}

impl From<io::Error> for Halt {
    fn from(err: io::Error) -> Halt {
        Halt::Io(err)
    }
}

/// A CSV encoder.
///
/// An encoder turns one record at a time into CSV text. For every field it
/// decides whether quoting is needed and escapes every byte that the
/// dialect treats specially, such that a [`Parser`](crate::Parser)
/// configured with the same dialect reads the exact same fields back.
#[derive(Clone, Debug)]
pub struct Encoder {
    delimiter: u8,
    quote: u8,
    escape: Option<u8>,
    double_quote: bool,
    style: QuoteStyle,
    skip_initial_space: bool,
    term: LineTerminator,
}

impl Encoder {
    /// Create an encoder for the given dialect.
    ///
    /// This fails if the dialect does not validate.
    pub fn new(dialect: &Dialect) -> Result<Encoder, DialectError> {
        dialect.check()?;
        Ok(Encoder {
            delimiter: dialect.delimiter().ok_or(DialectError::UndefinedDelimiter)?,
            quote: dialect.quote(),
            escape: dialect.escape(),
            double_quote: dialect.double_quote(),
            style: dialect.quote_style(),
            skip_initial_space: dialect.skip_initial_space(),
            term: dialect.line_terminator(),
        })
    }

    /// Encode one record, followed by the line terminator.
    ///
    /// On success the returned status has `succeeded` and `good` set. If the
    /// cursor or the sink fails, `io_error` is set instead and the record may
    /// have been partially written.
    pub fn encode<C, S>(&self, cursor: &mut C, sink: &mut S) -> Status
    where
        C: RecordCursor + ?Sized,
        S: ByteSink + ?Sized,
    {
        match self.encode_record(cursor, sink) {
            Ok(()) => Status::success().with_good(),
            Err(Halt::Cursor) => {
                warn!("record cursor failed while encoding");
                Status::empty().with_io_error()
            }
            Err(Halt::Io(err)) => {
                warn!("failed to write encoded record: {}", err);
                Status::empty().with_io_error()
            }
        }
    }

    fn encode_record<C, S>(&self, cursor: &mut C, sink: &mut S) -> Result<(), Halt>
    where
        C: RecordCursor + ?Sized,
        S: ByteSink + ?Sized,
    {
        let count = cursor.field_count();
        let mut first = true;
        loop {
            let len = match cursor.next_field() {
                FieldSignal::Field(len) => len,
                FieldSignal::EndOfRecord => break,
                FieldSignal::Error => return Err(Halt::Cursor),
            };
            if !first {
                sink.write_char(self.delimiter)?;
            }
            first = false;

            let quoted = match self.style {
                QuoteStyle::Always => true,
                QuoteStyle::Never => false,
                // A lone empty field would otherwise read back as a blank
                // line, which is skipped.
                QuoteStyle::Necessary => {
                    (count == 1 && len == 0) || self.should_quote(cursor)
                }
            };
            if quoted {
                sink.write_char(self.quote)?;
            }
            if let Some(field) = cursor.field_bytes() {
                for (i, &c) in field.iter().enumerate() {
                    self.write_byte(c, quoted, i == 0, sink)?;
                }
            } else {
                let mut at_start = true;
                while let Some(c) = cursor.next_char() {
                    self.write_byte(c, quoted, at_start, sink)?;
                    at_start = false;
                }
            }
            if quoted {
                sink.write_char(self.quote)?;
            }
        }
        for &c in self.term.as_bytes() {
            sink.write_char(c)?;
        }
        Ok(())
    }

    /// Returns true if the current field needs quotes under the `Necessary`
    /// style. The cursor is left at the start of the field.
    fn should_quote<C: RecordCursor + ?Sized>(&self, cursor: &mut C) -> bool {
        if let Some(field) = cursor.field_bytes() {
            return self.should_quote_bytes(field);
        }
        let mut at_start = true;
        let mut yes = false;
        while let Some(c) = cursor.next_char() {
            if self.is_special(c) || self.is_leading_space(c, at_start) {
                yes = true;
                break;
            }
            at_start = false;
        }
        cursor.rewind_field();
        yes
    }

    fn should_quote_bytes(&self, field: &[u8]) -> bool {
        if field.first().map_or(false, |&c| self.is_leading_space(c, true)) {
            return true;
        }
        if memchr3(self.delimiter, self.quote, b'\n', field).is_some() {
            return true;
        }
        match self.escape {
            None => memchr(b'\r', field).is_some(),
            Some(esc) => memchr2(esc, b'\r', field).is_some(),
        }
    }

    fn write_byte<S: ByteSink + ?Sized>(
        &self,
        c: u8,
        quoted: bool,
        at_start: bool,
        sink: &mut S,
    ) -> io::Result<()> {
        if quoted {
            if c == self.quote {
                if self.double_quote {
                    sink.write_char(self.quote)?;
                } else if let Some(esc) = self.escape {
                    sink.write_char(esc)?;
                }
            } else if self.escape == Some(c) {
                sink.write_char(c)?;
            }
        } else if self.is_special(c) || self.is_leading_space(c, at_start) {
            if let Some(esc) = self.escape {
                sink.write_char(esc)?;
            }
        }
        sink.write_char(c)
    }

    fn is_special(&self, c: u8) -> bool {
        c == self.delimiter
            || c == self.quote
            || c == b'\n'
            || c == b'\r'
            || self.escape == Some(c)
    }

    fn is_leading_space(&self, c: u8, at_start: bool) -> bool {
        at_start && c == b' ' && self.skip_initial_space
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::str;

    use super::{ByteSink, Encoder, FieldSignal, RecordCursor, SliceRecord};
    use crate::dialect::{Dialect, QuoteStyle};
    use crate::reader::{Parser, ReadResult, RecordSink};

    fn s(b: &[u8]) -> &str {
        str::from_utf8(b).unwrap()
    }

    macro_rules! writes_as {
        ($name:ident, $fields:expr, $expected:expr) => {
            writes_as!($name, $fields, $expected, |d| d);
        };
        ($name:ident, $fields:expr, $expected:expr, $config:expr) => {
            #[test]
            fn $name() {
                let mut dialect = Dialect::default();
                dialect.set_line_terminator(b"\n");
                $config(&mut dialect);
                let enc = Encoder::new(&dialect).unwrap();
                let fields: &[&str] = &$fields;

                let mut out = vec![];
                let st = enc.encode(&mut SliceRecord::new(fields), &mut out);
                assert!(st.succeeded());
                assert_eq!(s(&out), $expected, "contiguous");

                let mut out = vec![];
                let st = enc.encode(&mut ByteWise(SliceRecord::new(fields)), &mut out);
                assert!(st.succeeded());
                assert_eq!(s(&out), $expected, "byte by byte");
            }
        };
    }

    /// Hides the contiguous field bytes so the encoder must scan and rewind.
    struct ByteWise<'a>(SliceRecord<'a, &'a str>);

    impl<'a> RecordCursor for ByteWise<'a> {
        fn field_count(&self) -> usize {
            self.0.field_count()
        }

        fn next_field(&mut self) -> FieldSignal {
            self.0.next_field()
        }

        fn rewind_field(&mut self) {
            self.0.rewind_field()
        }

        fn next_char(&mut self) -> Option<u8> {
            self.0.next_char()
        }
    }

    writes_as!(plain, ["a", "b", "c"], "a,b,c\n");
    writes_as!(empty_record, [], "\n");
    writes_as!(empty_middle, ["a", "", "b"], "a,,b\n");
    writes_as!(empty_trailing, ["a", "b", ""], "a,b,\n");
    writes_as!(lone_empty_field, [""], "\"\"\n");
    writes_as!(two_empty_fields, ["", ""], ",\n");
    writes_as!(minimal_delimiter, ["a", "b,c"], "a,\"b,c\"\n");
    writes_as!(minimal_lf, ["a\nb"], "\"a\nb\"\n");
    writes_as!(minimal_cr, ["a\rb"], "\"a\rb\"\n");
    writes_as!(minimal_space, [" a "], " a \n");
    writes_as!(
        minimal_quote_doubled,
        ["he said \"hi\""],
        "\"he said \"\"hi\"\"\"\n"
    );
    writes_as!(
        minimal_quote_escaped,
        ["a\"b"],
        r#""a\"b""#.to_string() + "\n",
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
            d.set_double_quote(false);
        }
    );
    writes_as!(
        minimal_escape_doubled,
        [r"a\b"],
        r#""a\\b""#.to_string() + "\n",
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
        }
    );
    writes_as!(
        minimal_leading_space_kept,
        [" a", "b"],
        "\" a\",b\n",
        |d: &mut Dialect| {
            d.set_skip_initial_space(true);
        }
    );

    writes_as!(
        always,
        ["a", "", "b c"],
        "\"a\",\"\",\"b c\"\n",
        |d: &mut Dialect| {
            d.set_quote_style(QuoteStyle::Always);
        }
    );
    writes_as!(always_empty_record, [], "\n", |d: &mut Dialect| {
        d.set_quote_style(QuoteStyle::Always);
    });

    writes_as!(
        never_escapes,
        ["a,b", "c\nd", "e\"f", r"g\h"],
        "a\\,b,c\\\nd,e\\\"f,g\\\\h\n",
        |d: &mut Dialect| {
            d.set_quote_style(QuoteStyle::Never);
            d.set_escape(Some(b'\\'));
        }
    );
    writes_as!(
        never_leading_space,
        [" a", "b c"],
        "\\ a,b c\n",
        |d: &mut Dialect| {
            d.set_quote_style(QuoteStyle::Never);
            d.set_escape(Some(b'\\'));
            d.set_skip_initial_space(true);
        }
    );

    writes_as!(delimiter_tab, ["a,b", "c\td"], "a,b\t\"c\td\"\n", |d: &mut Dialect| {
        d.set_delimiter(Some(b'\t'));
    });
    writes_as!(quote_change, ["a'b", "\"c"], "'a''b'\t\"c\n", |d: &mut Dialect| {
        d.set_quote(b'\'');
        d.set_delimiter(Some(b'\t'));
    });
    writes_as!(terminator_crlf, ["a", "b"], "a,b\r\n", |d: &mut Dialect| {
        d.set_line_terminator(b"\r\n");
    });
    writes_as!(terminator_empty, ["a", "b"], "a,b", |d: &mut Dialect| {
        d.set_line_terminator(b"");
    });
    writes_as!(terminator_long, ["a"], "a<EOR>", |d: &mut Dialect| {
        d.set_line_terminator(b"<EOR>");
    });

    #[test]
    fn invalid_dialect_is_rejected() {
        let mut d = Dialect::default();
        d.set_double_quote(false);
        assert!(Encoder::new(&d).is_err());
        d.set_escape(Some(b'\\'));
        assert!(Encoder::new(&d).is_ok());
    }

    struct Broken;

    impl ByteSink for Broken {
        fn write_char(&mut self, _: u8) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "broken pipe"))
        }
    }

    #[test]
    fn sink_error_is_reported() {
        let enc = Encoder::new(&Dialect::default()).unwrap();
        let st = enc.encode(&mut SliceRecord::new(&["a"]), &mut Broken);
        assert!(st.failed());
        assert!(st.is_io_error());
        assert!(!st.is_good());
    }

    struct FailsAfterOne(usize);

    impl RecordCursor for FailsAfterOne {
        fn field_count(&self) -> usize {
            2
        }

        fn next_field(&mut self) -> FieldSignal {
            self.0 += 1;
            if self.0 == 1 {
                FieldSignal::Field(0)
            } else {
                FieldSignal::Error
            }
        }

        fn rewind_field(&mut self) {}

        fn next_char(&mut self) -> Option<u8> {
            None
        }
    }

    #[test]
    fn cursor_error_is_reported() {
        let enc = Encoder::new(&Dialect::default()).unwrap();
        let mut out = vec![];
        let st = enc.encode(&mut FailsAfterOne(0), &mut out);
        assert!(st.is_io_error());
        assert!(out.is_empty());
    }

    #[derive(Default)]
    struct Fields {
        cur: Vec<u8>,
        done: Vec<Vec<u8>>,
    }

    impl RecordSink for Fields {
        fn append(&mut self, c: u8) {
            self.cur.push(c);
        }

        fn save_field(&mut self) {
            self.done.push(std::mem::take(&mut self.cur));
        }
    }

    fn round_trip(dialect: &Dialect, fields: &[&str]) {
        let mut out = vec![];
        let enc = Encoder::new(dialect).unwrap();
        assert!(enc.encode(&mut SliceRecord::new(fields), &mut out).succeeded());

        let mut parser = Parser::new(dialect).unwrap();
        let mut sink = Fields::default();
        let mut records = 0;
        for &b in &out {
            if parser.feed(b, &mut sink) == ReadResult::Record {
                records += 1;
            }
        }
        if parser.finish(&mut sink) == ReadResult::Record {
            records += 1;
        }
        assert_eq!(records, 1, "encoded as {:?}", s(&out));
        let got: Vec<&str> = sink.done.iter().map(|f| s(f)).collect();
        assert_eq!(got, fields, "encoded as {:?}", s(&out));
    }

    #[test]
    fn tricky_fields_round_trip() {
        let fields = &["", " x", "a,b", "\"", "\\", "\r\n", "\n\"\\,"];
        let mut d = Dialect::default();
        d.set_line_terminator(b"\n");
        d.set_escape(Some(b'\\'));
        for &style in &[QuoteStyle::Always, QuoteStyle::Necessary, QuoteStyle::Never] {
            for &dq in &[true, false] {
                for &skip in &[true, false] {
                    d.set_quote_style(style);
                    d.set_double_quote(dq);
                    d.set_skip_initial_space(skip);
                    round_trip(&d, fields);
                }
            }
        }
    }
}
