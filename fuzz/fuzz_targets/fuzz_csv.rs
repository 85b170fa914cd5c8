#![no_main]

use csv_dialect::{ByteRecord, Dialect, ReaderBuilder, WriterBuilder};
use libfuzzer_sys::fuzz_target;

fn read_all(dialect: &Dialect, data: &[u8]) -> Vec<ByteRecord> {
    let mut rdr = ReaderBuilder::new().dialect(dialect).from_reader(data).unwrap();
    // NUL bytes in the input stop the reader with an error.
    rdr.byte_records().map_while(Result::ok).collect()
}

fn write_all(dialect: &Dialect, records: &[ByteRecord]) -> Vec<u8> {
    let mut wtr = WriterBuilder::new().dialect(dialect).from_writer(vec![]).unwrap();
    for record in records {
        wtr.write_byte_record(record).unwrap();
    }
    wtr.into_inner().unwrap()
}

fuzz_target!(|data: &[u8]| {
    let dialect = Dialect::unix();
    let first = read_all(&dialect, data);
    let written = write_all(&dialect, &first);
    let second = read_all(&dialect, &written);
    assert_eq!(first, second);
});
