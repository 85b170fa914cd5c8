use std::fmt;
use std::ops;
use std::result;
use std::str;

use crate::byte_record::{ByteRecord, ByteRecordCursor, ByteRecordIter};
use crate::error::FromUtf8Error;

/// A single CSV record stored as valid UTF-8 bytes.
///
/// A string record permits reading or writing CSV rows that are valid
/// UTF-8. Reading into one fails if any field is not UTF-8.
#[derive(Clone, Eq)]
pub struct StringRecord(ByteRecord);

impl PartialEq for StringRecord {
    fn eq(&self, other: &StringRecord) -> bool {
        self.0 == other.0
    }
}

impl<T: AsRef<[u8]>> PartialEq<Vec<T>> for StringRecord {
    fn eq(&self, other: &Vec<T>) -> bool {
        self.0 == *other
    }
}

impl<T: AsRef<[u8]>> PartialEq<[T]> for StringRecord {
    fn eq(&self, other: &[T]) -> bool {
        self.0 == *other
    }
}

impl fmt::Debug for StringRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields: Vec<&str> = self.iter().collect();
        write!(f, "StringRecord({:?})", fields)
    }
}

impl Default for StringRecord {
    fn default() -> StringRecord {
        StringRecord::new()
    }
}

impl StringRecord {
    /// Create a new empty `StringRecord`.
    pub fn new() -> StringRecord {
        StringRecord(ByteRecord::new())
    }

    /// Create a new empty `StringRecord` with room for `buffer` bytes of
    /// field data and `fields` fields.
    pub fn with_capacity(buffer: usize, fields: usize) -> StringRecord {
        StringRecord(ByteRecord::with_capacity(buffer, fields))
    }

    /// Create a new `StringRecord` from a `ByteRecord`.
    ///
    /// If the given `ByteRecord` does not contain valid UTF-8, then this
    /// returns an error. The error includes the UTF-8 error and the original
    /// `ByteRecord`.
    pub fn from_byte_record(
        record: ByteRecord,
    ) -> result::Result<StringRecord, FromUtf8Error> {
        match record.validate() {
            Ok(()) => Ok(StringRecord(record)),
            Err(err) => Err(FromUtf8Error::new(record, err)),
        }
    }

    /// Returns an iterator over all fields in this record.
    pub fn iter(&self) -> StringRecordIter {
        self.into_iter()
    }

    /// Return the field at index `i`.
    ///
    /// If no field at index `i` exists, then this returns `None`.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.0.get(i).map(|bytes| {
            // This is safe because every string record is UTF-8 validated
            // field by field before it is exposed.
            unsafe { str::from_utf8_unchecked(bytes) }
        })
    }

    /// Returns true if and only if this record is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of fields in this record.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Truncate this record to `n` fields.
    pub fn truncate(&mut self, n: usize) {
        self.0.truncate(n);
    }

    /// Clear this record so that it has zero fields.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Add a new field to this record.
    pub fn push_field(&mut self, field: &str) {
        self.0.push_field(field.as_bytes());
    }

    /// Return the underlying `ByteRecord`.
    pub fn as_byte_record(&self) -> &ByteRecord {
        &self.0
    }

    /// Convert this `StringRecord` into a `ByteRecord`.
    pub fn into_byte_record(self) -> ByteRecord {
        self.0
    }

    /// Return a cursor over the fields of this record that can be handed to
    /// an encoder.
    pub fn cursor(&self) -> ByteRecordCursor {
        self.0.cursor()
    }

    /// Gives the reader mutable access to the underlying bytes.
    ///
    /// Callers must validate the record again before returning it.
    pub(crate) fn as_byte_record_mut(&mut self) -> &mut ByteRecord {
        &mut self.0
    }
}

impl ops::Index<usize> for StringRecord {
    type Output = str;

    #[inline]
    fn index(&self, i: usize) -> &str {
        match self.get(i) {
            Some(field) => field,
            None => panic!("index {} out of bounds for record of {}", i, self.len()),
        }
    }
}

impl<T: AsRef<str>> From<Vec<T>> for StringRecord {
    fn from(xs: Vec<T>) -> StringRecord {
        let mut record = StringRecord::new();
        for x in &xs {
            record.push_field(x.as_ref());
        }
        record
    }
}

impl<'a, T: AsRef<str>> From<&'a [T]> for StringRecord {
    fn from(xs: &'a [T]) -> StringRecord {
        let mut record = StringRecord::new();
        for x in xs {
            record.push_field(x.as_ref());
        }
        record
    }
}

impl<'r> IntoIterator for &'r StringRecord {
    type IntoIter = StringRecordIter<'r>;
    type Item = &'r str;

    #[inline]
    fn into_iter(self) -> StringRecordIter<'r> {
        StringRecordIter(self.0.iter())
    }
}

/// An iterator over the fields in a string record.
pub struct StringRecordIter<'r>(ByteRecordIter<'r>);

impl<'r> Iterator for StringRecordIter<'r> {
    type Item = &'r str;

    #[inline]
    fn next(&mut self) -> Option<&'r str> {
        self.0.next().map(|bytes| {
            // See StringRecord::get for safety argument.
            unsafe { str::from_utf8_unchecked(bytes) }
        })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}
