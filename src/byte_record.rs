use std::cmp;
use std::fmt;
use std::iter::FromIterator;
use std::ops;
use std::result;
use std::str;

use bstr::BStr;
use csvc_core::Location;

use crate::error::Utf8Error;

/// Retrieve the underlying parts of a byte record.
#[inline]
pub(crate) fn as_parts(
    record: &mut ByteRecord,
) -> (&mut Vec<u8>, &mut Vec<usize>) {
    (&mut record.fields, &mut record.bounds.ends)
}

/// Set the number of fields in the given record record.
#[inline]
pub(crate) fn set_len(record: &mut ByteRecord, len: usize) {
    record.bounds.len = len;
}

/// Expand the capacity for storing fields.
#[inline]
pub(crate) fn expand_fields(record: &mut ByteRecord) {
    let new_len = record.fields.len().saturating_mul(2);
    record.fields.resize(cmp::max(4, new_len), 0);
}

/// Expand the capacity for storing field ending positions.
#[inline]
pub(crate) fn expand_ends(record: &mut ByteRecord) {
    record.bounds.expand();
}

/// Validate the given record as UTF-8.
///
/// If it's not UTF-8, return an error.
///
/// This never modifies the contents of this record.
pub(crate) fn validate(record: &ByteRecord) -> result::Result<(), Utf8Error> {
    // If the entire buffer is ASCII, then we have nothing to fear.
    if record.fields[..record.bounds.end()].iter().all(|&b| b <= 0x7F) {
        return Ok(());
    }
    // Otherwise, we must check each field individually to ensure that
    // it's valid UTF-8.
    for (i, field) in record.iter().enumerate() {
        if let Err(err) = str::from_utf8(field) {
            return Err(Utf8Error::new(i, err.valid_up_to()));
        }
    }
    Ok(())
}

/// A position in CSV data.
///
/// A position is used to report errors in CSV data. All positions include the
/// byte offset, line number, column number and record index.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Position {
    byte: u64,
    line: u64,
    column: u64,
    record: u64,
}

impl Default for Position {
    fn default() -> Position {
        Position::new()
    }
}

impl Position {
    /// Returns a new position initialized to the start value.
    pub fn new() -> Position {
        Position { byte: 0, line: 1, column: 1, record: 0 }
    }

    pub(crate) fn from_location(loc: Location, record: u64) -> Position {
        Position {
            byte: loc.byte(),
            line: loc.line(),
            column: loc.column(),
            record,
        }
    }

    /// The byte offset, starting at `0`, of this position.
    pub fn byte(&self) -> u64 {
        self.byte
    }

    /// The line number, starting at `1`, of this position.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The column number, starting at `1`, of this position.
    pub fn column(&self) -> u64 {
        self.column
    }

    /// The record index, starting with the first record at `0`.
    ///
    /// Comment lines and blank lines are not records.
    pub fn record(&self) -> u64 {
        self.record
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "record {} (line {}, column {}, byte {})",
            self.record, self.line, self.column, self.byte
        )
    }
}

/// A single CSV record stored as raw bytes.
///
/// All fields of a record live in one contiguous buffer, so reading many
/// records into the same `ByteRecord` amortizes allocation.
pub struct ByteRecord {
    /// All fields in this record, stored contiguously.
    fields: Vec<u8>,
    /// The number of and location of each field in this record.
    bounds: Bounds,
    /// The position of this record, if it was read by a CSV reader.
    pos: Option<Position>,
}

impl Default for ByteRecord {
    fn default() -> ByteRecord {
        ByteRecord::new()
    }
}

/// Cloning only copies the used portion of the record's buffers.
impl Clone for ByteRecord {
    fn clone(&self) -> ByteRecord {
        ByteRecord {
            fields: self.fields[..self.bounds.end()].to_vec(),
            bounds: Bounds {
                ends: self.bounds.ends().to_vec(),
                len: self.bounds.len,
            },
            pos: self.pos.clone(),
        }
    }
}

impl PartialEq for ByteRecord {
    fn eq(&self, other: &ByteRecord) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ByteRecord {}

impl<T: AsRef<[u8]>> PartialEq<[T]> for ByteRecord {
    fn eq(&self, other: &[T]) -> bool {
        self.iter().eq(other.iter().map(|f| f.as_ref()))
    }
}

impl<T: AsRef<[u8]>> PartialEq<Vec<T>> for ByteRecord {
    fn eq(&self, other: &Vec<T>) -> bool {
        self == other.as_slice()
    }
}

impl fmt::Debug for ByteRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields: Vec<&BStr> = self.iter().map(BStr::new).collect();
        f.debug_struct("ByteRecord")
            .field("position", &self.pos)
            .field("fields", &fields)
            .finish()
    }
}

impl ByteRecord {
    /// Create a new empty `ByteRecord`.
    pub fn new() -> ByteRecord {
        ByteRecord::with_capacity(0, 0)
    }

    /// Create a new empty `ByteRecord` with the given capacity.
    ///
    /// `buffer` refers to the capacity of the buffer used to store the
    /// actual field contents, while `fields` refers to the number of fields
    /// one expects to store.
    pub fn with_capacity(buffer: usize, fields: usize) -> ByteRecord {
        ByteRecord {
            fields: vec![0; buffer],
            bounds: Bounds { ends: vec![0; fields], len: 0 },
            pos: None,
        }
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
        self.bounds.len
    }

    /// Clear this record so that it has zero fields.
    ///
    /// Note that it is not necessary to clear the record to reuse it with
    /// the CSV reader.
    pub fn clear(&mut self) {
        self.bounds.len = 0;
        self.pos = None;
    }

    /// Returns an iterator over all fields in this record.
    pub fn iter(&self) -> ByteRecordIter<'_> {
        ByteRecordIter { r: self, start: 0, i: 0 }
    }

    /// Return all field data in this record as one contiguous slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.fields[..self.bounds.end()]
    }

    /// Add a new field to this record.
    pub fn push_field(&mut self, field: &[u8]) {
        let (s, e) = (self.bounds.end(), self.bounds.end() + field.len());
        while e > self.fields.len() {
            expand_fields(self);
        }
        self.fields[s..e].copy_from_slice(field);
        self.bounds.add(e);
    }

    /// Return the position of this record, if available.
    ///
    /// Records read by a CSV reader always have a position: that of the
    /// first byte of the record.
    pub fn position(&self) -> Option<&Position> {
        self.pos.as_ref()
    }

    /// Set the position of this record.
    pub fn set_position(&mut self, pos: Option<Position>) {
        self.pos = pos;
    }
}

/// The bounds of fields in a single record.
#[derive(Clone, Debug, Default)]
struct Bounds {
    /// The ending index of each field.
    ends: Vec<usize>,
    /// The number of fields in this record.
    ///
    /// Technically, we could drop this field and maintain an invariant that
    /// `ends.len()` is always the number of fields, but the CSV reader writes
    /// into `ends` as a pre-sized scratch buffer.
    len: usize,
}

impl Bounds {
    /// Returns the bounds of field `i`.
    fn get(&self, i: usize) -> Option<ops::Range<usize>> {
        if i >= self.len {
            return None;
        }
        let end = match self.ends.get(i) {
            None => return None,
            Some(&end) => end,
        };
        let start = match i.checked_sub(1).and_then(|i| self.ends.get(i)) {
            None => 0,
            Some(&start) => start,
        };
        Some(ops::Range { start, end })
    }

    /// Returns a slice of ending positions of all fields.
    fn ends(&self) -> &[usize] {
        &self.ends[..self.len]
    }

    /// Return the last position of the last field.
    ///
    /// If there are no fields, this returns `0`.
    #[inline(always)]
    fn end(&self) -> usize {
        self.ends().last().copied().unwrap_or(0)
    }

    /// Expand the capacity for storing field ending positions.
    fn expand(&mut self) {
        let new_len = self.ends.len().saturating_mul(2);
        self.ends.resize(cmp::max(4, new_len), 0);
    }

    /// Add a new field with the given ending position.
    fn add(&mut self, pos: usize) {
        if self.len >= self.ends.len() {
            self.expand();
        }
        self.ends[self.len] = pos;
        self.len += 1;
    }
}

impl ops::Index<usize> for ByteRecord {
    type Output = [u8];
    fn index(&self, i: usize) -> &[u8] {
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

impl<T: AsRef<[u8]>> From<Vec<T>> for ByteRecord {
    fn from(xs: Vec<T>) -> ByteRecord {
        ByteRecord::from_iter(xs)
    }
}

impl<T: AsRef<[u8]>> FromIterator<T> for ByteRecord {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> ByteRecord {
        let mut record = ByteRecord::new();
        for field in iter {
            record.push_field(field.as_ref());
        }
        record
    }
}

impl<'a> IntoIterator for &'a ByteRecord {
    type IntoIter = ByteRecordIter<'a>;
    type Item = &'a [u8];
    fn into_iter(self) -> ByteRecordIter<'a> {
        self.iter()
    }
}

/// An iterator over the fields in a byte record.
pub struct ByteRecordIter<'a> {
    r: &'a ByteRecord,
    start: usize,
    i: usize,
}

impl<'a> Iterator for ByteRecordIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        match self.r.bounds.ends().get(self.i) {
            None => None,
            Some(&end) => {
                let field = &self.r.fields[self.start..end];
                self.start = end;
                self.i += 1;
                Some(field)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.r.len() - self.i;
        (n, Some(n))
    }
}

impl<'a> ExactSizeIterator for ByteRecordIter<'a> {}
