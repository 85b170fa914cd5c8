use std::cmp;
use std::fmt;
use std::ops;
use std::result;
use std::str;

use bstr::ByteSlice;
use csv_dialect_core::{FieldSignal, RecordCursor, RecordSink};

use crate::error::Utf8Error;

/// Capacities double while below this size and grow by it linearly above.
const GROWTH_STEP: usize = 64 * 1024;

/// The smallest capacity allocated for a record buffer.
const MIN_CAPACITY: usize = 16;

/// Make room for one more element in `v` under the record growth policy.
fn reserve_one<T>(v: &mut Vec<T>) {
    let cap = v.capacity();
    if v.len() < cap {
        return;
    }
    let extra =
        if cap < GROWTH_STEP { cmp::max(MIN_CAPACITY, cap) } else { GROWTH_STEP };
    v.reserve_exact(extra);
}

/// A single CSV record stored as raw bytes.
///
/// A byte record is the buffer a [`Reader`](crate::Reader) assembles fields
/// into. All fields are stored contiguously in one growable buffer, next to
/// the ending offset of each field. Clearing a record keeps both
/// allocations, so a single record can be reused to read many.
///
/// Both buffers grow by doubling while they are small and linearly by
/// 64 KiB once they are large.
#[derive(Clone, Eq)]
pub struct ByteRecord {
    /// All fields in this record, stored contiguously.
    fields: Vec<u8>,
    /// The location of each field in this record.
    bounds: Bounds,
}

impl PartialEq for ByteRecord {
    fn eq(&self, other: &ByteRecord) -> bool {
        self.iter().eq(other.iter())
    }
}

impl<T: AsRef<[u8]>> PartialEq<[T]> for ByteRecord {
    fn eq(&self, other: &[T]) -> bool {
        self.iter().eq(other.iter().map(|f| f.as_ref()))
    }
}

impl<'a, T: AsRef<[u8]>> PartialEq<[T]> for &'a ByteRecord {
    fn eq(&self, other: &[T]) -> bool {
        (**self).eq(other)
    }
}

impl<T: AsRef<[u8]>> PartialEq<Vec<T>> for ByteRecord {
    fn eq(&self, other: &Vec<T>) -> bool {
        self.eq(&other[..])
    }
}

impl<'a, T: AsRef<[u8]>> PartialEq<Vec<T>> for &'a ByteRecord {
    fn eq(&self, other: &Vec<T>) -> bool {
        (**self).eq(&other[..])
    }
}

impl fmt::Debug for ByteRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields: Vec<_> = self.iter().map(|f| f.as_bstr()).collect();
        write!(f, "ByteRecord({:?})", fields)
    }
}

impl Default for ByteRecord {
    fn default() -> ByteRecord {
        ByteRecord::new()
    }
}

impl ByteRecord {
    /// Create a new empty `ByteRecord`.
    pub fn new() -> ByteRecord {
        ByteRecord::with_capacity(0, 0)
    }

    /// Create a new empty `ByteRecord` with room for `buffer` bytes of field
    /// data and `fields` fields.
    pub fn with_capacity(buffer: usize, fields: usize) -> ByteRecord {
        ByteRecord {
            fields: Vec::with_capacity(buffer),
            bounds: Bounds { ends: Vec::with_capacity(fields) },
        }
    }

    /// Returns an iterator over all fields in this record.
    pub fn iter(&self) -> ByteRecordIter {
        self.into_iter()
    }

    /// Return the field at index `i`.
    ///
    /// If no field at index `i` exists, then this returns `None`.
    pub fn get(&self, i: usize) -> Option<&[u8]> {
        self.bounds.get(i).map(|range| &self.fields[range])
    }

    /// Returns true if and only if this record is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of fields in this record.
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Truncate this record to `n` fields.
    ///
    /// If `n` is greater than the number of fields in this record, then this
    /// has no effect.
    pub fn truncate(&mut self, n: usize) {
        if n < self.len() {
            self.bounds.ends.truncate(n);
            self.fields.truncate(self.bounds.end());
        }
    }

    /// Clear this record so that it has zero fields.
    ///
    /// This keeps the allocated buffers.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.bounds.ends.clear();
    }

    /// Add a new field to this record.
    pub fn push_field(&mut self, field: &[u8]) {
        for &c in field {
            self.append(c);
        }
        self.save_field();
    }

    /// Return the bytes of every field in this record, concatenated.
    pub fn as_slice(&self) -> &[u8] {
        &self.fields
    }

    /// Return a cursor over the fields of this record that can be handed to
    /// an encoder.
    pub fn cursor(&self) -> ByteRecordCursor {
        ByteRecordCursor { rec: self, next: 0, cur: None, pos: 0 }
    }

    /// Validate this record as UTF-8.
    ///
    /// This never modifies the contents of this record.
    pub(crate) fn validate(&self) -> result::Result<(), Utf8Error> {
        // If the entire buffer is ASCII, then we have nothing to fear.
        if self.fields.is_ascii() {
            return Ok(());
        }
        // Otherwise, each field must be checked on its own, since valid
        // UTF-8 may straddle a field boundary.
        for (i, field) in self.iter().enumerate() {
            if let Err(err) = str::from_utf8(field) {
                return Err(Utf8Error::new(i, err.valid_up_to()));
            }
        }
        Ok(())
    }
}

impl RecordSink for ByteRecord {
    fn append(&mut self, c: u8) {
        reserve_one(&mut self.fields);
        self.fields.push(c);
    }

    fn save_field(&mut self) {
        reserve_one(&mut self.bounds.ends);
        self.bounds.ends.push(self.fields.len());
    }
}

/// The bounds of fields in a single record.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Bounds {
    /// The ending index of each field.
    ends: Vec<usize>,
}

impl Bounds {
    /// Returns the bounds of field `i`.
    fn get(&self, i: usize) -> Option<ops::Range<usize>> {
        let end = *self.ends.get(i)?;
        let start = match i.checked_sub(1) {
            None => 0,
            Some(prev) => self.ends[prev],
        };
        Some(ops::Range { start, end })
    }

    /// Return the last position of the last field.
    ///
    /// If there are no fields, this returns `0`.
    fn end(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Returns the number of fields in these bounds.
    fn len(&self) -> usize {
        self.ends.len()
    }
}

impl ops::Index<usize> for ByteRecord {
    type Output = [u8];

    #[inline]
    fn index(&self, i: usize) -> &[u8] {
        match self.get(i) {
            Some(field) => field,
            None => panic!("index {} out of bounds for record of {}", i, self.len()),
        }
    }
}

impl<T: AsRef<[u8]>> From<Vec<T>> for ByteRecord {
    fn from(xs: Vec<T>) -> ByteRecord {
        ByteRecord::from(&xs[..])
    }
}

impl<'a, T: AsRef<[u8]>> From<&'a [T]> for ByteRecord {
    fn from(xs: &'a [T]) -> ByteRecord {
        let mut record = ByteRecord::new();
        for x in xs {
            record.push_field(x.as_ref());
        }
        record
    }
}

impl<'r> IntoIterator for &'r ByteRecord {
    type IntoIter = ByteRecordIter<'r>;
    type Item = &'r [u8];

    #[inline]
    fn into_iter(self) -> ByteRecordIter<'r> {
        ByteRecordIter { r: self, start: 0, i: 0 }
    }
}

/// An iterator over the fields in a byte record.
pub struct ByteRecordIter<'r> {
    r: &'r ByteRecord,
    start: usize,
    i: usize,
}

impl<'r> Iterator for ByteRecordIter<'r> {
    type Item = &'r [u8];

    #[inline]
    fn next(&mut self) -> Option<&'r [u8]> {
        let end = *self.r.bounds.ends.get(self.i)?;
        let field = &self.r.fields[self.start..end];
        self.start = end;
        self.i += 1;
        Some(field)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let x = self.r.len() - self.i;
        (x, Some(x))
    }
}

impl<'r> ExactSizeIterator for ByteRecordIter<'r> {}

/// A [`RecordCursor`] over the fields of a [`ByteRecord`].
#[derive(Clone, Debug)]
pub struct ByteRecordCursor<'r> {
    rec: &'r ByteRecord,
    next: usize,
    cur: Option<usize>,
    pos: usize,
}

impl<'r> ByteRecordCursor<'r> {
    fn field(&self) -> &'r [u8] {
        let rec = self.rec;
        self.cur.and_then(|i| rec.get(i)).unwrap_or(&[])
    }
}

impl<'r> RecordCursor for ByteRecordCursor<'r> {
    fn field_count(&self) -> usize {
        self.rec.len()
    }

    fn next_field(&mut self) -> FieldSignal {
        if self.next >= self.rec.len() {
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
        let c = *self.field().get(self.pos)?;
        self.pos += 1;
        Some(c)
    }

    fn field_bytes(&self) -> Option<&[u8]> {
        self.cur.map(|_| self.field())
    }
}

#[cfg(test)]
mod tests {
    use csv_dialect_core::{FieldSignal, RecordCursor, RecordSink};

    use crate::string_record::StringRecord;

    use super::{ByteRecord, GROWTH_STEP};

    fn b(s: &str) -> &[u8] {
        s.as_bytes()
    }

    #[test]
    fn record_1() {
        let mut rec = ByteRecord::new();
        rec.push_field(b"foo");

        assert_eq!(rec.len(), 1);
        assert_eq!(rec.get(0), Some(b("foo")));
        assert_eq!(rec.get(1), None);
        assert_eq!(rec.get(2), None);
    }

    #[test]
    fn record_2() {
        let mut rec = ByteRecord::new();
        rec.push_field(b"foo");
        rec.push_field(b"quux");

        assert_eq!(rec.len(), 2);
        assert_eq!(rec.get(0), Some(b("foo")));
        assert_eq!(rec.get(1), Some(b("quux")));
        assert_eq!(rec.get(2), None);
    }

    #[test]
    fn empty_record() {
        let rec = ByteRecord::new();

        assert_eq!(rec.len(), 0);
        assert_eq!(rec.get(0), None);
        assert!(rec.is_empty());
    }

    #[test]
    fn empty_surround() {
        let mut rec = ByteRecord::new();
        rec.push_field(b"foo");
        rec.push_field(b"");
        rec.push_field(b"quux");
        rec.push_field(b"");

        assert_eq!(rec.len(), 4);
        assert_eq!(rec.get(0), Some(b("foo")));
        assert_eq!(rec.get(1), Some(b("")));
        assert_eq!(rec.get(2), Some(b("quux")));
        assert_eq!(rec.get(3), Some(b("")));
        assert_eq!(rec.get(4), None);
        assert_eq!(rec, vec!["foo", "", "quux", ""]);
    }

    #[test]
    fn assembled_by_sink() {
        let mut rec = ByteRecord::new();
        for &c in b"ab" {
            rec.append(c);
        }
        rec.save_field();
        rec.save_field();
        rec.append(b'c');
        rec.save_field();
        assert_eq!(rec, vec!["ab", "", "c"]);
        assert_eq!(rec.as_slice(), b"abc");
    }

    #[test]
    fn clear_and_reuse() {
        let mut rec = ByteRecord::from(vec!["foo", "bar"]);
        rec.clear();
        assert!(rec.is_empty());
        rec.push_field(b"baz");
        assert_eq!(rec, vec!["baz"]);
    }

    #[test]
    fn truncate() {
        let mut rec = ByteRecord::from(vec!["a", "bc", "def"]);
        rec.truncate(5);
        assert_eq!(rec.len(), 3);
        rec.truncate(1);
        assert_eq!(rec, vec!["a"]);
        rec.push_field(b"x");
        assert_eq!(rec, vec!["a", "x"]);
    }

    #[test]
    fn growth_doubles_then_steps() {
        let mut rec = ByteRecord::new();
        rec.append(b'x');
        assert_eq!(rec.fields.capacity(), 16);
        for _ in 0..16 {
            rec.append(b'x');
        }
        assert_eq!(rec.fields.capacity(), 32);

        let mut rec = ByteRecord::with_capacity(GROWTH_STEP, 0);
        for _ in 0..GROWTH_STEP + 1 {
            rec.append(b'x');
        }
        assert_eq!(rec.fields.capacity(), 2 * GROWTH_STEP);
        for _ in 0..GROWTH_STEP {
            rec.append(b'x');
        }
        assert_eq!(rec.fields.capacity(), 3 * GROWTH_STEP);
    }

    #[test]
    fn debug_is_readable() {
        let rec = ByteRecord::from(vec![&b"a"[..], &b"\xFF"[..]]);
        assert_eq!(format!("{:?}", rec), r#"ByteRecord(["a", "\xFF"])"#);
    }

    #[test]
    fn cursor_walks_fields() {
        let rec = ByteRecord::from(vec!["ab", ""]);
        let mut cur = rec.cursor();
        assert_eq!(cur.field_count(), 2);
        assert_eq!(cur.next_field(), FieldSignal::Field(2));
        assert_eq!(cur.field_bytes(), Some(b("ab")));
        assert_eq!(cur.next_char(), Some(b'a'));
        assert_eq!(cur.next_char(), Some(b'b'));
        assert_eq!(cur.next_char(), None);
        cur.rewind_field();
        assert_eq!(cur.next_char(), Some(b'a'));
        assert_eq!(cur.next_field(), FieldSignal::Field(0));
        assert_eq!(cur.next_char(), None);
        assert_eq!(cur.next_field(), FieldSignal::EndOfRecord);
        assert_eq!(cur.field_bytes(), None);
    }

    #[test]
    fn utf8_error_1() {
        let mut rec = ByteRecord::new();
        rec.push_field(b"foo");
        rec.push_field(b"b\xFFar");

        let err = StringRecord::from_byte_record(rec).unwrap_err();
        assert_eq!(err.utf8_error().field(), 1);
        assert_eq!(err.utf8_error().valid_up_to(), 1);
    }

    #[test]
    fn utf8_error_2() {
        let mut rec = ByteRecord::new();
        rec.push_field(b"a");
        rec.push_field(b"b");
        rec.push_field(b"xyz\xFF");

        let err = StringRecord::from_byte_record(rec).unwrap_err();
        assert_eq!(err.utf8_error().field(), 2);
        assert_eq!(err.utf8_error().valid_up_to(), 3);
    }

    // A single field on its own isn't valid UTF-8, but the concatenation of
    // all fields is.
    #[test]
    fn utf8_error_straddles_fields() {
        let mut rec = ByteRecord::new();
        rec.push_field(b"a\xc9");
        rec.push_field(b"\x91b");

        let err = StringRecord::from_byte_record(rec).unwrap_err();
        assert_eq!(err.utf8_error().field(), 0);
        assert_eq!(err.utf8_error().valid_up_to(), 1);
    }

    #[test]
    fn utf8_clear_ok() {
        let mut rec = ByteRecord::new();
        rec.push_field(b"\xFF");
        rec.clear();
        assert!(StringRecord::from_byte_record(rec).is_ok());
    }
}
