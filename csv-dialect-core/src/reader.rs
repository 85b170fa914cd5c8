use log::trace;

use crate::dialect::{Dialect, DialectError, QuoteStyle};

/// A consumer of parsed field data.
///
/// The parser never stores field data itself. As it classifies each byte it
/// calls `append` for bytes belonging to the current field, `save_field`
/// once a field is complete and `save_record` once the last field of a
/// record has been saved. Whoever implements this owns the growable field
/// and record buffers.
pub trait RecordSink {
    /// Append one byte to the field currently being assembled.
    fn append(&mut self, c: u8);

    /// Finish the field currently being assembled and add it to the current
    /// record. The next `append` starts a new field.
    fn save_field(&mut self);

    /// Finish the current record. The next `save_field` starts a new
    /// record.
    ///
    /// The default does nothing, for sinks that hand records off some other
    /// way.
    fn save_record(&mut self) {}
}

impl<'a, S: RecordSink + ?Sized> RecordSink for &'a mut S {
    fn append(&mut self, c: u8) {
        (**self).append(c)
    }

    fn save_field(&mut self) {
        (**self).save_field()
    }

    fn save_record(&mut self) {
        (**self).save_record()
    }
}

/// The states of the parsing state machine.
///
/// The machine starts, and ends every record, in `StartRecord`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum State {
    /// Between records. Blank lines are skipped here.
    StartRecord,
    /// At the start of a field, before any of its content.
    StartField,
    /// Just after an escape character outside of quotes.
    EscapedChar,
    /// Inside an unquoted field.
    InField,
    /// Inside a quoted field.
    InQuotedField,
    /// Just after an escape character inside a quoted field.
    EscapeInQuotedField,
    /// Just after a quote inside a quoted field, when quotes are doubled.
    QuoteInQuotedField,
    /// Consuming the line terminator that ended a record.
    EatCrnl,
    /// Just after an escaped `\r` or `\n` outside of quotes.
    AfterEscapedCrnl,
}

/// The result of feeding a byte to the parser.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadResult {
    /// The byte was consumed and the current record is not complete yet.
    InputEmpty,
    /// The byte completed a record. Every field of it has been saved to the
    /// sink.
    Record,
    /// All data has been read and there was no record in progress.
    ///
    /// This is only returned by [`Parser::finish`].
    End,
}

/// The position of the parser in its input.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Position {
    byte: u64,
    line: u64,
    record: u64,
}

impl Position {
    /// Returns a new position at the very start of the input.
    pub fn new() -> Position {
        Position { byte: 0, line: 1, record: 0 }
    }

    /// The number of bytes consumed so far.
    pub fn byte(&self) -> u64 {
        self.byte
    }

    /// The current line, as one plus the number of `\n` bytes seen so far.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The number of records completed so far.
    pub fn record(&self) -> u64 {
        self.record
    }
}

/// The end-of-input marker.
///
/// This is never field data. Feeding it tells the machine that no more
/// bytes follow in the current chunk.
const END: u8 = b'\0';

/// A CSV parser.
///
/// This is a finite state machine that consumes one byte per call to
/// [`Parser::feed`]. Field data is handed to a [`RecordSink`]; the parser
/// only reports when a record is complete.
///
/// Any unescaped `\r`, `\n` or `\r\n` outside of quotes ends a record,
/// regardless of the dialect's line terminator. Blank lines are skipped.
/// When the input is exhausted, call [`Parser::finish`]; it completes any
/// record still in progress, including one whose quoted field was never
/// closed.
///
/// This parser never reports an error. It prefers *a* parse over *no*
/// parse.
#[derive(Clone, Debug)]
pub struct Parser {
    delimiter: u8,
    quote: u8,
    escape: Option<u8>,
    double_quote: bool,
    quoting: bool,
    skip_initial_space: bool,
    state: State,
    pos: Position,
}

impl Parser {
    /// Create a parser for the given dialect.
    ///
    /// This fails if the dialect does not validate.
    pub fn new(dialect: &Dialect) -> Result<Parser, DialectError> {
        dialect.check()?;
        Ok(Parser {
            delimiter: dialect.delimiter().ok_or(DialectError::UndefinedDelimiter)?,
            quote: dialect.quote(),
            escape: dialect.escape(),
            double_quote: dialect.double_quote(),
            quoting: dialect.quote_style() != QuoteStyle::Never,
            skip_initial_space: dialect.skip_initial_space(),
            state: State::StartRecord,
            pos: Position::new(),
        })
    }

    /// Reset the parser such that it behaves as if it had never been used.
    pub fn reset(&mut self) {
        self.state = State::StartRecord;
        self.pos = Position::new();
    }

    /// The current state of the machine.
    pub fn state(&self) -> State {
        self.state
    }

    /// The position of the parser in its input.
    pub fn position(&self) -> &Position {
        &self.pos
    }

    /// Returns true if the parser is between records.
    pub fn is_record_start(&self) -> bool {
        match self.state {
            State::StartRecord | State::EatCrnl => true,
            _ => false,
        }
    }

    /// Feed one byte of input to the parser.
    ///
    /// A NUL byte is treated as the end-of-input marker: outside of quotes
    /// it ends the current record, inside of quotes it is dropped.
    pub fn feed<S: RecordSink>(&mut self, c: u8, sink: &mut S) -> ReadResult {
        self.pos.byte += 1;
        self.pos.line += (c == b'\n') as u64;
        let res = self.transition(c, sink);
        if res == ReadResult::Record {
            self.pos.record += 1;
            sink.save_record();
        }
        res
    }

    /// Tell the parser that no more input follows.
    ///
    /// This returns `Record` if a record was in progress, in which case all
    /// of its fields have been saved to the sink. Otherwise it returns
    /// `End`. Either way, the parser is left in `StartRecord`.
    pub fn finish<S: RecordSink>(&mut self, sink: &mut S) -> ReadResult {
        let mut res = self.transition(END, sink);
        if res != ReadResult::Record && !self.is_record_start() {
            trace!("flushing field left open in {:?} at end of input", self.state);
            sink.save_field();
            res = ReadResult::Record;
        }
        self.state = State::StartRecord;
        if res == ReadResult::Record {
            self.pos.record += 1;
            sink.save_record();
            res
        } else {
            ReadResult::End
        }
    }

    fn transition<S: RecordSink>(&mut self, c: u8, sink: &mut S) -> ReadResult {
        use self::State::*;

        loop {
            match self.state {
                StartRecord => {
                    if c == END {
                        return ReadResult::InputEmpty;
                    } else if is_newline(c) {
                        self.state = EatCrnl;
                        return ReadResult::InputEmpty;
                    }
                    // Anything else starts the first field of a record.
                    self.state = StartField;
                }
                StartField => {
                    if is_boundary(c) {
                        sink.save_field();
                        return self.end_record(c);
                    } else if c == self.quote && self.quoting {
                        self.state = InQuotedField;
                    } else if self.is_escape(c) {
                        self.state = EscapedChar;
                    } else if c == self.delimiter {
                        sink.save_field();
                    } else if c == b' ' && self.skip_initial_space {
                    } else {
                        sink.append(c);
                        self.state = InField;
                    }
                    return ReadResult::InputEmpty;
                }
                EscapedChar => {
                    if is_newline(c) {
                        sink.append(c);
                        self.state = AfterEscapedCrnl;
                    } else {
                        sink.append(if c == END { b'\n' } else { c });
                        self.state = InField;
                    }
                    return ReadResult::InputEmpty;
                }
                AfterEscapedCrnl => {
                    if c == END {
                        return ReadResult::InputEmpty;
                    }
                    self.state = InField;
                }
                InField => {
                    if is_boundary(c) {
                        sink.save_field();
                        return self.end_record(c);
                    } else if self.is_escape(c) {
                        self.state = EscapedChar;
                    } else if c == self.delimiter {
                        sink.save_field();
                        self.state = StartField;
                    } else {
                        sink.append(c);
                    }
                    return ReadResult::InputEmpty;
                }
                InQuotedField => {
                    if c == END {
                    } else if self.is_escape(c) {
                        self.state = EscapeInQuotedField;
                    } else if c == self.quote && self.quoting {
                        self.state = if self.double_quote {
                            QuoteInQuotedField
                        } else {
                            InField
                        };
                    } else {
                        sink.append(c);
                    }
                    return ReadResult::InputEmpty;
                }
                EscapeInQuotedField => {
                    sink.append(if c == END { b'\n' } else { c });
                    self.state = InQuotedField;
                    return ReadResult::InputEmpty;
                }
                QuoteInQuotedField => {
                    if c == self.quote && self.quoting {
                        sink.append(c);
                        self.state = InQuotedField;
                    } else if c == self.delimiter {
                        sink.save_field();
                        self.state = StartField;
                    } else if is_boundary(c) {
                        sink.save_field();
                        return self.end_record(c);
                    } else {
                        sink.append(c);
                        self.state = InField;
                    }
                    return ReadResult::InputEmpty;
                }
                EatCrnl => {
                    if is_newline(c) {
                        return ReadResult::InputEmpty;
                    } else if c == END {
                        self.state = StartRecord;
                        return ReadResult::InputEmpty;
                    }
                    // This byte belongs to the next record.
                    self.state = StartRecord;
                }
            }
        }
    }

    fn end_record(&mut self, c: u8) -> ReadResult {
        self.state =
            if c == END { State::StartRecord } else { State::EatCrnl };
        ReadResult::Record
    }

    fn is_escape(&self, c: u8) -> bool {
        self.escape == Some(c)
    }
}

fn is_newline(c: u8) -> bool {
    c == b'\n' || c == b'\r'
}

fn is_boundary(c: u8) -> bool {
    c == END || is_newline(c)
}

#[cfg(test)]
mod tests {
    use core::str;

    use arrayvec::{ArrayString, ArrayVec};

    use super::{Parser, ReadResult, RecordSink, State};
    use crate::dialect::{Dialect, QuoteStyle};

    type Csv = ArrayVec<Row, 10>;
    type Row = ArrayVec<Field, 10>;
    type Field = ArrayString<20>;

    macro_rules! csv {
        ($([$($field:expr),*]),*) => {{
            #[allow(unused_mut)]
            fn x() -> Csv {
                let mut csv = Csv::new();
                $(
                    let mut row = Row::new();
                    $(
                        row.push(Field::from($field).unwrap());
                    )*
                    csv.push(row);
                )*
                csv
            }
            x()
        }}
    }

    macro_rules! parses_to {
        ($name:ident, $data:expr, $expected:expr) => {
            parses_to!($name, $data, $expected, |d| d);
        };
        ($name:ident, $data:expr, $expected:expr, $config:expr) => {
            #[test]
            fn $name() {
                let mut dialect = Dialect::default();
                $config(&mut dialect);
                let mut parser = Parser::new(&dialect).unwrap();
                let got = parse(&mut parser, $data);
                let expected = $expected;
                assert_eq!(expected, got, "by byte");
            }
        };
    }

    #[derive(Default)]
    struct Collect {
        row: Row,
        field: Vec<u8>,
    }

    impl RecordSink for Collect {
        fn append(&mut self, c: u8) {
            self.field.push(c);
        }

        fn save_field(&mut self) {
            let s = str::from_utf8(&self.field).unwrap();
            self.row.push(Field::from(s).unwrap());
            self.field.clear();
        }
    }

    fn parse(parser: &mut Parser, data: &str) -> Csv {
        let mut csv = Csv::new();
        let mut sink = Collect::default();
        for &b in data.as_bytes() {
            if parser.feed(b, &mut sink) == ReadResult::Record {
                csv.push(std::mem::take(&mut sink.row));
            }
        }
        match parser.finish(&mut sink) {
            ReadResult::Record => csv.push(std::mem::take(&mut sink.row)),
            ReadResult::End => assert!(sink.row.is_empty()),
            ReadResult::InputEmpty => panic!("finish never needs more input"),
        }
        csv
    }

    parses_to!(one_row_one_field, "a", csv![["a"]]);
    parses_to!(one_row_many_fields, "a,b,c", csv![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma, "a,b,", csv![["a", "b", ""]]);
    parses_to!(one_row_one_field_lf, "a\n", csv![["a"]]);
    parses_to!(one_row_many_fields_lf, "a,b,c\n", csv![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma_lf, "a,b,\n", csv![["a", "b", ""]]);
    parses_to!(one_row_one_field_crlf, "a\r\n", csv![["a"]]);
    parses_to!(one_row_many_fields_crlf, "a,b,c\r\n", csv![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma_crlf, "a,b,\r\n", csv![["a", "b", ""]]);
    parses_to!(one_row_one_field_cr, "a\r", csv![["a"]]);
    parses_to!(one_row_many_fields_cr, "a,b,c\r", csv![["a", "b", "c"]]);
    parses_to!(one_row_trailing_comma_cr, "a,b,\r", csv![["a", "b", ""]]);
    parses_to!(one_row_empty_middle, "a,,b", csv![["a", "", "b"]]);

    parses_to!(many_rows_one_field, "a\nb", csv![["a"], ["b"]]);
    parses_to!(
        many_rows_many_fields,
        "a,b,c\nx,y,z",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(
        many_rows_trailing_comma,
        "a,b,\nx,y,",
        csv![["a", "b", ""], ["x", "y", ""]]
    );
    parses_to!(many_rows_one_field_crlf, "a\r\nb\r\n", csv![["a"], ["b"]]);
    parses_to!(
        many_rows_many_fields_crlf,
        "a,b,c\r\nx,y,z\r\n",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );
    parses_to!(
        many_rows_many_fields_cr,
        "a,b,c\rx,y,z\r",
        csv![["a", "b", "c"], ["x", "y", "z"]]
    );

    parses_to!(empty, "", csv![]);
    parses_to!(empty_lines, "\n\n\n\n", csv![]);
    parses_to!(empty_lines_mixed, "\r\n\n\r\n\n", csv![]);
    parses_to!(
        empty_lines_interspersed,
        "\n\na,b\n\n\nx,y\n\n\nm,n\n",
        csv![["a", "b"], ["x", "y"], ["m", "n"]]
    );
    parses_to!(
        empty_lines_interspersed_crlf,
        "\r\n\r\na,b\r\n\r\n\r\nx,y\r\n\r\n\r\nm,n\r\n",
        csv![["a", "b"], ["x", "y"], ["m", "n"]]
    );

    parses_to!(
        quoted_delimiter,
        "a,b,\"c,d\"\n1,2,3\n",
        csv![["a", "b", "c,d"], ["1", "2", "3"]]
    );
    parses_to!(quote_empty, "\"\"", csv![[""]]);
    parses_to!(quote_lf, "\"\"\n", csv![[""]]);
    parses_to!(quote_space, "\" \"", csv![[" "]]);
    parses_to!(quote_inner_space, "\" a \"", csv![[" a "]]);
    parses_to!(quote_outer_space, "  \"a\"  ", csv![["  \"a\"  "]]);
    parses_to!(quote_embedded_lf, "\"a\nb\",c\n", csv![["a\nb", "c"]]);
    parses_to!(quote_embedded_crlf, "\"a\r\nb\"", csv![["a\r\nb"]]);
    parses_to!(
        quote_doubled,
        "\"he said \"\"hi\"\"\"\n",
        csv![["he said \"hi\""]]
    );
    parses_to!(quote_trailing_text, "\"a\"b,c", csv![["ab", "c"]]);
    parses_to!(quote_unterminated, "a,\"bc", csv![["a", "bc"]]);
    parses_to!(
        quote_unterminated_newline,
        "a,\"b\nc",
        csv![["a", "b\nc"]]
    );
    parses_to!(quote_change, "zaz", csv![["a"]], |d: &mut Dialect| {
        d.set_quote(b'z');
    });

    // A quoted field begins when the quote is seen and the style is not
    // `Never`, and only then.
    parses_to!(
        quote_opens_field_unless_never,
        "\"a,b\",c",
        csv![["a,b", "c"]],
        |d: &mut Dialect| {
            d.set_quote_style(QuoteStyle::Always);
        }
    );
    parses_to!(
        quote_style_never_ignores_quotes,
        "\"a,b\",c",
        csv![["\"a", "b\"", "c"]],
        |d: &mut Dialect| {
            d.set_quote_style(QuoteStyle::Never);
            d.set_escape(Some(b'\\'));
        }
    );

    parses_to!(
        quote_no_doubling,
        r#""a\"b""#,
        csv![[r#"a"b"#]],
        |d: &mut Dialect| {
            d.set_double_quote(false);
            d.set_escape(Some(b'\\'));
        }
    );
    parses_to!(
        quote_no_doubling_closes_field,
        r#""a""b""#,
        csv![[r#"a"b""#]],
        |d: &mut Dialect| {
            d.set_double_quote(false);
            d.set_escape(Some(b'\\'));
        }
    );
    parses_to!(
        quote_escapes_with_doubling,
        r#""a\"b""c""#,
        csv![[r#"a"b"c"#]],
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
        }
    );

    parses_to!(
        escape_unquoted,
        r"a\,b,c\\d",
        csv![[r"a,b", r"c\d"]],
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
        }
    );
    parses_to!(
        escape_start_of_field,
        r"\,a,b",
        csv![[",a", "b"]],
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
        }
    );
    parses_to!(
        escape_newline,
        "a\\\nb,c\n",
        csv![["a\nb", "c"]],
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
        }
    );
    parses_to!(
        escape_crlf,
        "a\\\r\\\nb\n",
        csv![["a\r\nb"]],
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
        }
    );
    parses_to!(
        escape_at_end_of_input,
        "a\\",
        csv![["a\n"]],
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
        }
    );
    parses_to!(
        escape_in_quotes_at_end_of_input,
        "\"a\\",
        csv![["a\n"]],
        |d: &mut Dialect| {
            d.set_escape(Some(b'\\'));
        }
    );

    parses_to!(
        skip_initial_space,
        "a,  b, \"c\"",
        csv![["a", "b", "c"]],
        |d: &mut Dialect| {
            d.set_skip_initial_space(true);
        }
    );
    parses_to!(keep_initial_space, "a,  b", csv![["a", "  b"]]);
    parses_to!(
        space_delimiter_wins_over_skipping,
        "a  b \n",
        csv![["a", "", "b", ""]],
        |d: &mut Dialect| {
            d.set_delimiter(Some(b' '));
            d.set_skip_initial_space(true);
        }
    );

    parses_to!(delimiter_tabs, "a\tb", csv![["a", "b"]], |d: &mut Dialect| {
        d.set_delimiter(Some(b'\t'));
    });
    parses_to!(delimiter_weird, "azb", csv![["a", "b"]], |d: &mut Dialect| {
        d.set_delimiter(Some(b'z'));
    });

    // The dialect's line terminator is for writers only.
    parses_to!(
        terminator_ignored,
        "a,b|c\nd",
        csv![["a", "b|c"], ["d"]],
        |d: &mut Dialect| {
            d.set_line_terminator(b"|");
        }
    );

    parses_to!(nul_ends_record, "a,b\0c", csv![["a", "b"], ["c"]]);
    parses_to!(nul_dropped_in_quotes, "\"a\0b\"", csv![["ab"]]);

    #[derive(Default)]
    struct Records {
        records: Vec<Vec<Vec<u8>>>,
        fields: Vec<Vec<u8>>,
        field: Vec<u8>,
    }

    impl RecordSink for Records {
        fn append(&mut self, c: u8) {
            self.field.push(c);
        }

        fn save_field(&mut self) {
            self.fields.push(std::mem::take(&mut self.field));
        }

        fn save_record(&mut self) {
            self.records.push(std::mem::take(&mut self.fields));
        }
    }

    #[test]
    fn save_record_follows_last_field() {
        let mut parser = Parser::new(&Dialect::default()).unwrap();
        let mut sink = Records::default();
        for &b in b"a,b\n\nc" {
            parser.feed(b, &mut sink);
        }
        assert_eq!(sink.records, vec![vec![b"a".to_vec(), b"b".to_vec()]]);
        assert_eq!(parser.finish(&mut sink), ReadResult::Record);
        assert_eq!(parser.finish(&mut sink), ReadResult::End);
        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.records[1], vec![b"c".to_vec()]);
        assert!(sink.fields.is_empty());
    }

    #[test]
    fn record_is_reported_at_line_end() {
        let mut parser = Parser::new(&Dialect::default()).unwrap();
        let mut sink = Collect::default();
        assert_eq!(parser.feed(b'a', &mut sink), ReadResult::InputEmpty);
        assert_eq!(parser.feed(b'\r', &mut sink), ReadResult::Record);
        assert_eq!(parser.state(), State::EatCrnl);
        assert_eq!(parser.feed(b'\n', &mut sink), ReadResult::InputEmpty);
        assert_eq!(parser.feed(b'b', &mut sink), ReadResult::InputEmpty);
        assert_eq!(parser.state(), State::InField);
        assert_eq!(parser.finish(&mut sink), ReadResult::Record);
        assert_eq!(parser.finish(&mut sink), ReadResult::End);
        assert_eq!(sink.row.len(), 2);
    }

    #[test]
    fn finish_on_empty_input() {
        let mut parser = Parser::new(&Dialect::default()).unwrap();
        let mut sink = Collect::default();
        assert_eq!(parser.finish(&mut sink), ReadResult::End);
        assert!(sink.row.is_empty());
    }

    #[test]
    fn invalid_dialect_is_rejected() {
        let mut d = Dialect::default();
        d.set_quote_style(QuoteStyle::Never);
        assert!(Parser::new(&d).is_err());
    }

    #[test]
    fn position_tracking() {
        let mut parser = Parser::new(&Dialect::default()).unwrap();
        let mut sink = Collect::default();
        assert_eq!(1, parser.position().line());

        for &b in b"\n\n\nfoo,bar\n" {
            parser.feed(b, &mut sink);
        }
        assert_eq!(5, parser.position().line());
        assert_eq!(11, parser.position().byte());
        assert_eq!(1, parser.position().record());

        parser.reset();
        assert_eq!(1, parser.position().line());
        assert_eq!(0, parser.position().byte());
        assert_eq!(State::StartRecord, parser.state());
    }

    // Resetting mid-field forgets that we were inside quotes.
    #[test]
    fn reset_works() {
        let mut parser = Parser::new(&Dialect::default()).unwrap();
        let mut sink = Collect::default();
        for &b in b"\"foo" {
            parser.feed(b, &mut sink);
        }
        assert_eq!(parser.state(), State::InQuotedField);
        parser.reset();
        sink.field.clear();

        for &b in b"bar\"" {
            parser.feed(b, &mut sink);
        }
        assert_eq!(parser.finish(&mut sink), ReadResult::Record);
        assert_eq!(&sink.row[0][..], "bar\"");
    }
}
