use std::io::{self, BufRead};
use std::mem;

use csvc_core::{
    ReadRecordResult, Reader as CoreReader, ReaderBuilder as CoreReaderBuilder,
};
use log::{debug, trace, warn};

use crate::byte_record::{self, ByteRecord, Position};
use crate::error::{Error, Result};
use crate::string_record::{self, StringRecord};

/// The capacity of the I/O buffer used when none is configured.
const DEFAULT_BUFFER_CAPACITY: usize = 8 * (1 << 10);

/// How a reader treats the number of fields in each record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum FieldCount {
    /// Records may have any number of fields and nothing is remembered.
    Ignore,
    /// The number of fields in the first record is remembered (see
    /// `Reader::expected_len`) but never enforced.
    Detect,
    /// Every record must have as many fields as the first record.
    Consistent,
    /// Every record must have exactly this many fields.
    Exact(usize),
}

impl Default for FieldCount {
    fn default() -> FieldCount {
        FieldCount::Detect
    }
}

/// Builds a CSV reader with various configuration knobs.
///
/// This builder can be used to tweak the field delimiter, quoting, comment
/// handling and field count policy. Once a `ReaderBuilder` is configured, it
/// can be used to build any number of readers; each build validates the
/// configuration.
///
/// With the `serde` feature, a `ReaderBuilder` can also be deserialized, e.g.,
/// from a configuration file. Byte options are written as one character
/// strings and omitted options keep their defaults:
///
/// ```text
/// {"delimiter": ";", "comment": "#", "field_count": {"exact": 3}}
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct ReaderBuilder {
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde_impl::deserialize_byte")
    )]
    delimiter: u8,
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde_impl::deserialize_byte")
    )]
    quote: u8,
    #[cfg_attr(
        feature = "serde",
        serde(deserialize_with = "crate::serde_impl::deserialize_opt_byte")
    )]
    comment: Option<u8>,
    field_count: FieldCount,
    lenient: bool,
    buffer_capacity: usize,
}

impl Default for ReaderBuilder {
    fn default() -> ReaderBuilder {
        ReaderBuilder {
            delimiter: b',',
            quote: b'"',
            comment: None,
            field_count: FieldCount::default(),
            lenient: false,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ReaderBuilder {
    /// Create a new builder for configuring CSV parsing.
    ///
    /// To convert a builder into a reader, call one of the methods starting
    /// with `from_`.
    pub fn new() -> ReaderBuilder {
        ReaderBuilder::default()
    }

    /// Build a CSV parser from this configuration that reads data from `rdr`.
    ///
    /// This returns an error if the configuration is invalid: the delimiter
    /// and quote are equal, the comment byte equals either of them, or any of
    /// them is a line terminator byte.
    pub fn from_reader<R: io::Read>(&self, rdr: R) -> Result<Reader<R>> {
        let core = self.core_builder().build()?;
        Ok(Reader::new(self, core, rdr))
    }

    /// The field delimiter to use when parsing CSV.
    ///
    /// The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut ReaderBuilder {
        self.delimiter = delimiter;
        self
    }

    /// The quote character to use when parsing CSV.
    ///
    /// The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut ReaderBuilder {
        self.quote = quote;
        self
    }

    /// The comment character to use when parsing CSV.
    ///
    /// If the first byte of a line that starts a record is the comment
    /// character (possibly after spaces and tabs), then the entire line is
    /// ignored. Comment characters inside a record are ordinary bytes.
    ///
    /// This is disabled by default.
    pub fn comment(&mut self, comment: Option<u8>) -> &mut ReaderBuilder {
        self.comment = comment;
        self
    }

    /// The policy for the number of fields in each record.
    ///
    /// The default is `FieldCount::Detect`.
    pub fn field_count(&mut self, field_count: FieldCount) -> &mut ReaderBuilder {
        self.field_count = field_count;
        self
    }

    /// Whether to recover from malformed quoting instead of failing.
    ///
    /// When enabled, a quote in an unquoted field is kept as a literal, a
    /// byte following a closing quote continues the field and an unterminated
    /// quoted field at the end of input is accepted.
    ///
    /// This is disabled by default.
    pub fn lenient(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.lenient = yes;
        self
    }

    /// Set the capacity (in bytes) of the buffer used in the CSV reader.
    ///
    /// A capacity of zero is treated as one.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut ReaderBuilder {
        self.buffer_capacity = capacity;
        self
    }

    fn core_builder(&self) -> CoreReaderBuilder {
        let mut builder = CoreReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .comment(self.comment)
            .lenient(self.lenient);
        builder
    }
}

/// A streaming CSV reader.
///
/// The reader pulls bytes from the underlying `io::Read` through a buffer and
/// hands them to the `csvc-core` parser one record at a time. Records can be
/// read into caller provided buffers (`read_record`, `read_byte_record`),
/// into a buffer owned by the reader (`next_record`) or as freshly allocated
/// records (`records`, `read_all`).
///
/// Syntax errors and field count mismatches only affect a single record: the
/// next read continues with the record that follows.
#[derive(Debug)]
pub struct Reader<R> {
    /// The underlying CSV parser.
    core: Box<CoreReader>,
    /// The underlying reader.
    rdr: io::BufReader<R>,
    /// Various state tracking.
    state: ReaderState,
    /// The record handed out by `next_record`.
    record: StringRecord,
}

#[derive(Debug)]
struct ReaderState {
    /// The field count policy.
    field_count: FieldCount,
    /// The number of fields expected in each record, once known.
    expected_len: Option<u64>,
    /// The number of complete records read so far.
    records: u64,
    /// The position of the most recently read record.
    cur_pos: Position,
    /// Whether the end of the CSV data has been reached.
    eof: bool,
    /// Field data of a record interrupted by an I/O error.
    partial_fields: Vec<u8>,
    /// Field ends of a record interrupted by an I/O error.
    partial_ends: Vec<usize>,
}

impl<R: io::Read> Reader<R> {
    /// Create a new CSV parser with a default configuration for the given
    /// reader.
    ///
    /// To customize CSV parsing, use a `ReaderBuilder`.
    pub fn from_reader(rdr: R) -> Reader<R> {
        Reader::new(&ReaderBuilder::new(), CoreReader::new(), rdr)
    }

    fn new(builder: &ReaderBuilder, core: CoreReader, rdr: R) -> Reader<R> {
        debug!(
            "building CSV reader: delimiter={:?}, quote={:?}, comment={:?}, \
             field_count={:?}, lenient={}",
            builder.delimiter as char,
            builder.quote as char,
            builder.comment.map(char::from),
            builder.field_count,
            builder.lenient,
        );
        let expected_len = match builder.field_count {
            FieldCount::Exact(n) => Some(n as u64),
            _ => None,
        };
        let capacity = builder.buffer_capacity.max(1);
        Reader {
            core: Box::new(core),
            rdr: io::BufReader::with_capacity(capacity, rdr),
            state: ReaderState {
                field_count: builder.field_count,
                expected_len,
                records: 0,
                cur_pos: Position::new(),
                eof: false,
                partial_fields: vec![],
                partial_ends: vec![],
            },
            record: StringRecord::new(),
        }
    }

    /// Returns a borrowed iterator over all records as strings.
    ///
    /// Each item yielded is a freshly allocated `StringRecord`. If a record
    /// fails to parse, the error is yielded and iteration continues with the
    /// next record, unless the error came from the underlying reader, in
    /// which case iteration stops.
    pub fn records(&mut self) -> StringRecordsIter<'_, R> {
        StringRecordsIter::new(self)
    }

    /// Returns an owned iterator over all records as strings.
    ///
    /// This is mostly useful when you want to return a CSV iterator or store
    /// it somewhere.
    pub fn into_records(self) -> StringRecordsIntoIter<R> {
        StringRecordsIntoIter::new(self)
    }

    /// Returns a borrowed iterator over all records as raw bytes.
    ///
    /// Unlike `records`, this never returns a UTF-8 error.
    pub fn byte_records(&mut self) -> ByteRecordsIter<'_, R> {
        ByteRecordsIter::new(self)
    }

    /// Read all remaining records.
    ///
    /// Reading stops at the first error, which is returned.
    pub fn read_all(&mut self) -> Result<Vec<StringRecord>> {
        self.records().collect()
    }

    /// Read a single row into the given record. Returns false when no more
    /// records could be read.
    ///
    /// This method is useful when you want to read records as fast as
    /// possible. It's less ergonomic than an iterator, but it permits the
    /// caller to reuse the `StringRecord` allocation, which usually results
    /// in higher throughput.
    ///
    /// If an error is returned, `record` is cleared.
    pub fn read_record(&mut self, record: &mut StringRecord) -> Result<bool> {
        string_record::read(self, record)
    }

    /// Read the next record into a buffer owned by this reader.
    ///
    /// Returns `None` at the end of the CSV data. The returned record is
    /// overwritten by the next read, so it must be copied to be kept.
    pub fn next_record(&mut self) -> Result<Option<&StringRecord>> {
        let mut record = mem::take(&mut self.record);
        let res = string_record::read(self, &mut record);
        self.record = record;
        match res {
            Ok(true) => Ok(Some(&self.record)),
            Ok(false) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Read a single row into the given byte record. Returns false when no
    /// more records could be read.
    ///
    /// This method is useful when you want to read records as fast as
    /// possible. It's less ergonomic than an iterator, but it permits the
    /// caller to reuse the `ByteRecord` allocation, which usually results
    /// in higher throughput.
    ///
    /// If an error is returned, `record` is cleared.
    pub fn read_byte_record(&mut self, record: &mut ByteRecord) -> Result<bool> {
        let result = self.read_byte_record_impl(record);
        match result {
            Ok(true) => {}
            Ok(false) | Err(_) => record.clear(),
        }
        result
    }

    /// Read a byte record from the underlying CSV reader, without accounting
    /// for clearing the record on failure.
    #[inline(always)]
    fn read_byte_record_impl(&mut self, record: &mut ByteRecord) -> Result<bool> {
        record.clear();
        if self.state.eof {
            return Ok(false);
        }
        let (mut outlen, mut endlen) = self.state.restore_partial(record);
        loop {
            let (res, nin, nout, nend) = {
                let input = match self.rdr.fill_buf() {
                    Ok(input) => input,
                    Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {
                        continue
                    }
                    Err(err) => {
                        // The parser is still inside this record, so keep
                        // what it produced so far for the next read.
                        self.state.stash_partial(record, outlen, endlen);
                        let pos = Position::from_location(
                            self.core.location(),
                            self.state.records,
                        );
                        return Err(Error::Io { pos, err });
                    }
                };
                let (fields, ends) = byte_record::as_parts(record);
                self.core.read_record(
                    input,
                    &mut fields[outlen..],
                    &mut ends[endlen..],
                )
            };
            self.rdr.consume(nin);
            outlen += nout;
            endlen += nend;
            match res {
                ReadRecordResult::InputEmpty => continue,
                ReadRecordResult::OutputFull => {
                    byte_record::expand_fields(record);
                    continue;
                }
                ReadRecordResult::OutputEndsFull => {
                    byte_record::expand_ends(record);
                    continue;
                }
                ReadRecordResult::Record => {
                    byte_record::set_len(record, endlen);
                    let pos = Position::from_location(
                        self.core.record_start(),
                        self.state.records,
                    );
                    trace!(
                        "read record {} with {} fields at line {}",
                        pos.record(),
                        record.len(),
                        pos.line()
                    );
                    record.set_position(Some(pos.clone()));
                    self.state.add_record(record.len() as u64, pos)?;
                    return Ok(true);
                }
                ReadRecordResult::Comment => {
                    trace!("skipped comment line {}", self.core.line());
                    outlen = 0;
                    endlen = 0;
                }
                ReadRecordResult::Error(err) => {
                    let pos = Position::from_location(
                        err.location(),
                        self.state.records,
                    );
                    warn!("skipping malformed CSV record: {}", err);
                    return Err(Error::Syntax { pos, kind: err.kind() });
                }
                ReadRecordResult::End => {
                    if !self.state.eof {
                        debug!(
                            "reached end of CSV data after {} records",
                            self.state.records
                        );
                    }
                    self.state.eof = true;
                    return Ok(false);
                }
            }
        }
    }

    /// Return the position of the most recently read record.
    ///
    /// Before any record is read, this is the start of the data.
    pub fn position(&self) -> &Position {
        &self.state.cur_pos
    }

    /// Return the line of the most recently consumed byte.
    ///
    /// Lines are counted from `1`. Line terminators inside quoted fields
    /// count, and `\r\n` counts once.
    pub fn line(&self) -> u64 {
        self.core.line()
    }

    /// The number of fields expected in each record, once known.
    ///
    /// This is `None` until the first record is read, unless the field count
    /// policy is `FieldCount::Exact`. It is always `None` for
    /// `FieldCount::Ignore`.
    pub fn expected_len(&self) -> Option<u64> {
        self.state.expected_len
    }

    /// Returns true if and only if this reader has been exhausted.
    pub fn is_done(&self) -> bool {
        self.state.eof
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.rdr.get_ref()
    }

    /// Returns a mutable reference to the underlying reader.
    ///
    /// Reading from it directly skips over data the CSV parser has not seen.
    pub fn get_mut(&mut self) -> &mut R {
        self.rdr.get_mut()
    }

    /// Unwraps this CSV reader, returning the underlying reader.
    ///
    /// Note that any leftover data inside this reader's internal buffer is
    /// lost.
    pub fn into_inner(self) -> R {
        self.rdr.into_inner()
    }
}

impl ReaderState {
    /// Save the field data of a record whose reading failed with an I/O
    /// error.
    fn stash_partial(
        &mut self,
        record: &mut ByteRecord,
        outlen: usize,
        endlen: usize,
    ) {
        let (fields, ends) = byte_record::as_parts(record);
        self.partial_fields.clear();
        self.partial_fields.extend_from_slice(&fields[..outlen]);
        self.partial_ends.clear();
        self.partial_ends.extend_from_slice(&ends[..endlen]);
    }

    /// Copy stashed field data into `record`, returning the number of field
    /// bytes and field ends restored.
    fn restore_partial(&mut self, record: &mut ByteRecord) -> (usize, usize) {
        let (outlen, endlen) =
            (self.partial_fields.len(), self.partial_ends.len());
        let (fields, ends) = byte_record::as_parts(record);
        if fields.len() < outlen {
            fields.resize(outlen, 0);
        }
        if ends.len() < endlen {
            ends.resize(endlen, 0);
        }
        fields[..outlen].copy_from_slice(&self.partial_fields);
        ends[..endlen].copy_from_slice(&self.partial_ends);
        self.partial_fields.clear();
        self.partial_ends.clear();
        (outlen, endlen)
    }

    /// Record a completed record, checking its length against the field count
    /// policy.
    fn add_record(&mut self, len: u64, pos: Position) -> Result<()> {
        self.records += 1;
        let result = match (self.field_count, self.expected_len) {
            (FieldCount::Ignore, _) => Ok(()),
            (_, None) => {
                self.expected_len = Some(len);
                Ok(())
            }
            (FieldCount::Detect, Some(_)) => Ok(()),
            (_, Some(expected_len)) if expected_len == len => Ok(()),
            (_, Some(expected_len)) => {
                warn!(
                    "record {} (line {}) has {} fields, expected {}",
                    pos.record(),
                    pos.line(),
                    len,
                    expected_len
                );
                Err(Error::FieldCountMismatch {
                    pos: pos.clone(),
                    expected_len,
                    len,
                })
            }
        };
        self.cur_pos = pos;
        result
    }
}

/// An owned iterator over records as strings.
pub struct StringRecordsIntoIter<R> {
    rdr: Reader<R>,
    rec: StringRecord,
    done: bool,
}

impl<R: io::Read> StringRecordsIntoIter<R> {
    fn new(rdr: Reader<R>) -> StringRecordsIntoIter<R> {
        StringRecordsIntoIter { rdr, rec: StringRecord::new(), done: false }
    }

    /// Return a reference to the underlying CSV reader.
    pub fn reader(&self) -> &Reader<R> {
        &self.rdr
    }

    /// Drop this iterator and return the underlying CSV reader.
    pub fn into_reader(self) -> Reader<R> {
        self.rdr
    }
}

impl<R: io::Read> Iterator for StringRecordsIntoIter<R> {
    type Item = Result<StringRecord>;

    fn next(&mut self) -> Option<Result<StringRecord>> {
        if self.done {
            return None;
        }
        match self.rdr.read_record(&mut self.rec) {
            Err(err) => {
                self.done = err.is_io_error();
                Some(Err(err))
            }
            Ok(true) => Some(Ok(self.rec.clone())),
            Ok(false) => {
                self.done = true;
                None
            }
        }
    }
}

/// A borrowed iterator over records as strings.
///
/// The lifetime parameter `'r` refers to the lifetime of the underlying CSV
/// `Reader`.
pub struct StringRecordsIter<'r, R: 'r> {
    rdr: &'r mut Reader<R>,
    rec: StringRecord,
    done: bool,
}

impl<'r, R: io::Read> StringRecordsIter<'r, R> {
    fn new(rdr: &'r mut Reader<R>) -> StringRecordsIter<'r, R> {
        StringRecordsIter { rdr, rec: StringRecord::new(), done: false }
    }

    /// Return a reference to the underlying CSV reader.
    pub fn reader(&self) -> &Reader<R> {
        &self.rdr
    }
}

impl<'r, R: io::Read> Iterator for StringRecordsIter<'r, R> {
    type Item = Result<StringRecord>;

    fn next(&mut self) -> Option<Result<StringRecord>> {
        if self.done {
            return None;
        }
        match self.rdr.read_record(&mut self.rec) {
            Err(err) => {
                self.done = err.is_io_error();
                Some(Err(err))
            }
            Ok(true) => Some(Ok(self.rec.clone())),
            Ok(false) => {
                self.done = true;
                None
            }
        }
    }
}

/// A borrowed iterator over records as raw bytes.
///
/// The lifetime parameter `'r` refers to the lifetime of the underlying CSV
/// `Reader`.
pub struct ByteRecordsIter<'r, R: 'r> {
    rdr: &'r mut Reader<R>,
    rec: ByteRecord,
    done: bool,
}

impl<'r, R: io::Read> ByteRecordsIter<'r, R> {
    fn new(rdr: &'r mut Reader<R>) -> ByteRecordsIter<'r, R> {
        ByteRecordsIter { rdr, rec: ByteRecord::new(), done: false }
    }

    /// Return a reference to the underlying CSV reader.
    pub fn reader(&self) -> &Reader<R> {
        &self.rdr
    }
}

impl<'r, R: io::Read> Iterator for ByteRecordsIter<'r, R> {
    type Item = Result<ByteRecord>;

    fn next(&mut self) -> Option<Result<ByteRecord>> {
        if self.done {
            return None;
        }
        match self.rdr.read_byte_record(&mut self.rec) {
            Err(err) => {
                self.done = err.is_io_error();
                Some(Err(err))
            }
            Ok(true) => Some(Ok(self.rec.clone())),
            Ok(false) => {
                self.done = true;
                None
            }
        }
    }
}
