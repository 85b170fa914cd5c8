/*!
The `csv-dialect` crate reads and writes CSV data in any *dialect*: the
delimiter, quote character, escape character, quote doubling, quoting style,
initial space handling and line terminator are all configurable, and a
reader and writer configured with the same [`Dialect`] round-trip every
record exactly.

# Brief overview

The primary types in this crate are [`Reader`] and [`Writer`], for reading
and writing CSV data respectively. Correspondingly, to support CSV data with
custom dialects, use [`ReaderBuilder`] and [`WriterBuilder`]. Both refuse to
build from a dialect that fails validation, for example one that disables
quote doubling without defining an escape character.

Records are read into a [`ByteRecord`], whose fields are arbitrary bytes, or
a [`StringRecord`], whose fields are validated UTF-8.

Readers and writers pull and push bytes through the [`Source`] and [`Sink`]
traits. Files and anything implementing `io::Read`/`io::Write` are covered
by [`IoSource`] and [`IoSink`]; other byte streams can implement the traits
themselves.

Each read or write has two forms. `next_record` reports its outcome as a
[`Status`], a word of independent flags that tells a normal end of data
apart from an I/O failure without unwinding. `read_record` and
`write_record` turn the same outcome into a `Result`.

The parsing and encoding engines live in the `csv-dialect-core` crate, which
performs no I/O.

# Example

```
use csv_dialect::{ReaderBuilder, WriterBuilder};

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let mut wtr = WriterBuilder::new()
    .delimiter(b'|')
    .escape(Some(b'\\'))
    .double_quote(false)
    .line_terminator(b"\n")
    .from_writer(vec![])?;
wtr.write_record(&["Boston", "he said \"hi\"", "a|b"])?;
let data = wtr.into_inner()?;
assert_eq!(data, b"Boston|\"he said \\\"hi\\\"\"|\"a|b\"\n".to_vec());

let mut rdr = ReaderBuilder::new()
    .delimiter(b'|')
    .escape(Some(b'\\'))
    .double_quote(false)
    .from_reader(&data[..])?;
for result in rdr.records() {
    let record = result?;
    assert_eq!(record, vec!["Boston", "he said \"hi\"", "a|b"]);
}
# Ok(()) }
```
*/

#![deny(missing_docs)]

pub use csv_dialect_core::{
    validate, Dialect, DialectError, FieldSignal, LineTerminator, Position,
    QuoteStyle, RecordCursor, RecordSink, SliceRecord, Status,
    LINE_TERMINATOR_MAX,
};

pub use crate::byte_record::{ByteRecord, ByteRecordCursor, ByteRecordIter};
pub use crate::error::{
    Error, FromUtf8Error, IntoInnerError, Result, Utf8Error,
};
pub use crate::reader::{
    ByteRecordsIter, Reader, ReaderBuilder, StringRecordsIter,
};
pub use crate::stream::{IoSink, IoSource, Signal, Sink, Source};
pub use crate::string_record::{StringRecord, StringRecordIter};
pub use crate::writer::{Writer, WriterBuilder};

mod byte_record;
mod error;
mod reader;
mod stream;
mod string_record;
mod writer;
