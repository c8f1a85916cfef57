use std::fmt;
use std::io;
use std::iter::FromIterator;
use std::ops;
use std::result;
use std::str;

use crate::byte_record::{self, ByteRecord, ByteRecordIter, Position};
use crate::error::{Error, FromUtf8Error, Result};
use crate::reader::Reader;

/// A safe function for reading CSV data into a `StringRecord`.
///
/// This relies on the internal representation of `StringRecord`.
#[inline(always)]
pub(crate) fn read<R: io::Read>(
    rdr: &mut Reader<R>,
    record: &mut StringRecord,
) -> Result<bool> {
    // SAFETY: Note that despite the absence of `unsafe` in this function, this
    // code is critical to upholding the safety of other `unsafe` blocks in
    // this module. Namely, after calling `read_byte_record`, it is possible
    // for `record` to contain invalid UTF-8. We check for this in the
    // `validate` method, and if it does have invalid UTF-8, we clear the
    // record. A failed read always leaves the record cleared.
    let read_res = rdr.read_byte_record(&mut record.0);
    let utf8_res = match byte_record::validate(&record.0) {
        Ok(()) => Ok(()),
        Err(err) => {
            // If this record isn't valid UTF-8, then completely wipe it.
            record.0.clear();
            Err(err)
        }
    };
    match (read_res, utf8_res) {
        (Err(err), _) => Err(err),
        (Ok(_), Err(err)) => {
            let pos = rdr.position().clone();
            log::warn!("record {} is not valid UTF-8: {}", pos.record(), err);
            Err(Error::Utf8 { pos, err })
        }
        (Ok(more), Ok(())) => Ok(more),
    }
}

/// A single CSV record stored as valid UTF-8 bytes.
#[derive(Clone, Eq, PartialEq)]
pub struct StringRecord(ByteRecord);

impl Default for StringRecord {
    fn default() -> StringRecord {
        StringRecord::new()
    }
}

impl fmt::Debug for StringRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields: Vec<&str> = self.iter().collect();
        f.debug_struct("StringRecord")
            .field("position", &self.position())
            .field("fields", &fields)
            .finish()
    }
}

impl StringRecord {
    /// Create a new empty `StringRecord`.
    pub fn new() -> StringRecord {
        StringRecord(ByteRecord::new())
    }

    /// Create a new empty `StringRecord` with the given capacity.
    ///
    /// `buffer` refers to the capacity of the buffer used to store the
    /// actual field contents, while `fields` refers to the number of fields
    /// one expects to store.
    pub fn with_capacity(buffer: usize, fields: usize) -> StringRecord {
        StringRecord(ByteRecord::with_capacity(buffer, fields))
    }

    /// Create a new `StringRecord` from a `ByteRecord`.
    ///
    /// Note that this does UTF-8 validation. If the given `ByteRecord` does
    /// not contain valid UTF-8, then this returns an error. The error
    /// includes the UTF-8 error and the original `ByteRecord`.
    pub fn from_byte_record(
        record: ByteRecord,
    ) -> result::Result<StringRecord, FromUtf8Error> {
        match byte_record::validate(&record) {
            Ok(()) => Ok(StringRecord(record)),
            Err(err) => Err(FromUtf8Error::new(record, err)),
        }
    }

    /// Return the field at index `i`.
    ///
    /// If no field at index `i` exists, then this returns `None`.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.0.get(i).map(|bytes| {
            // This is safe because we guarantee that all string records
            // have a valid UTF-8 buffer. It's also safe because we
            // individually check each field for valid UTF-8.
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

    /// Clear this record so that it has zero fields.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Add a new field to this record.
    pub fn push_field(&mut self, field: &str) {
        self.0.push_field(field.as_bytes());
    }

    /// Return the position of this record, if available.
    pub fn position(&self) -> Option<&Position> {
        self.0.position()
    }

    /// Return an iterator over all fields in this record.
    pub fn iter(&self) -> StringRecordIter<'_> {
        StringRecordIter(self.0.iter())
    }

    /// Return a reference to this record's raw `ByteRecord`.
    pub fn as_byte_record(&self) -> &ByteRecord {
        &self.0
    }

    /// Convert this `StringRecord` into a `ByteRecord`.
    pub fn into_byte_record(self) -> ByteRecord {
        self.0
    }
}

impl ops::Index<usize> for StringRecord {
    type Output = str;
    fn index(&self, i: usize) -> &str {
        match self.get(i) {
            Some(field) => field,
            None => panic!(
                "field index {} out of bounds for record with {} fields",
                i,
                self.len()
            ),
        }
    }
}

impl<T: AsRef<[u8]>> PartialEq<[T]> for StringRecord {
    fn eq(&self, other: &[T]) -> bool {
        self.0 == *other
    }
}

impl<T: AsRef<[u8]>> PartialEq<Vec<T>> for StringRecord {
    fn eq(&self, other: &Vec<T>) -> bool {
        self.0 == *other
    }
}

impl<T: AsRef<str>> From<Vec<T>> for StringRecord {
    fn from(xs: Vec<T>) -> StringRecord {
        StringRecord::from_iter(xs)
    }
}

impl<T: AsRef<str>> FromIterator<T> for StringRecord {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> StringRecord {
        let mut record = StringRecord::new();
        for field in iter {
            record.push_field(field.as_ref());
        }
        record
    }
}

impl<'a> IntoIterator for &'a StringRecord {
    type IntoIter = StringRecordIter<'a>;
    type Item = &'a str;
    fn into_iter(self) -> StringRecordIter<'a> {
        self.iter()
    }
}

/// An iterator over the fields in a string record.
pub struct StringRecordIter<'a>(ByteRecordIter<'a>);

impl<'a> Iterator for StringRecordIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.0.next().map(|bytes| {
            // See StringRecord::get for safety argument.
            unsafe { str::from_utf8_unchecked(bytes) }
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<'a> ExactSizeIterator for StringRecordIter<'a> {}
