/*!
`csv-dialect-core` provides the engines behind a dialect-configurable CSV
codec: a character-at-a-time parser and a mirror-image encoder.

Neither engine performs any I/O. The parser is handed one byte at a time and
reports completed fields through the [`RecordSink`] trait, while the encoder
walks a record through the [`RecordCursor`] trait and emits bytes into a
[`ByteSink`]. The `csv-dialect` crate builds readers and writers for files
and arbitrary `io::Read`/`io::Write` streams on top of these.

Both engines are configured by a [`Dialect`]. A reader and a writer must
agree on the exact same dialect for data to round-trip, so both refuse to
be constructed from a dialect that fails [`Dialect::validate`].

# Example: parsing

```
use csv_dialect_core::{Dialect, Parser, ReadResult, RecordSink};

#[derive(Default)]
struct Fields {
    cur: Vec<u8>,
    done: Vec<String>,
}

impl RecordSink for Fields {
    fn append(&mut self, c: u8) {
        self.cur.push(c);
    }

    fn save_field(&mut self) {
        let field = String::from_utf8(std::mem::take(&mut self.cur)).unwrap();
        self.done.push(field);
    }
}

let mut parser = Parser::new(&Dialect::default()).unwrap();
let mut sink = Fields::default();
for &b in b"a,\"b,c\"\n" {
    if parser.feed(b, &mut sink) == ReadResult::Record {
        break;
    }
}
assert_eq!(sink.done, vec!["a", "b,c"]);
```

# Example: encoding

```
use csv_dialect_core::{Dialect, Encoder, SliceRecord};

let mut dialect = Dialect::default();
dialect.set_line_terminator(b"\n");
let encoder = Encoder::new(&dialect).unwrap();

let mut out: Vec<u8> = vec![];
let status = encoder.encode(&mut SliceRecord::new(&["a", "b,c"]), &mut out);
assert!(status.succeeded());
assert_eq!(out, b"a,\"b,c\"\n");
```
*/

#![deny(missing_docs)]

pub use crate::dialect::{
    validate, Dialect, DialectError, LineTerminator, QuoteStyle,
    LINE_TERMINATOR_MAX,
};
pub use crate::reader::{Parser, Position, ReadResult, RecordSink, State};
pub use crate::status::Status;
pub use crate::writer::{
    ByteSink, Encoder, FieldSignal, RecordCursor, SliceRecord,
};

mod dialect;
mod reader;
mod status;
mod writer;
