use core::cmp;
use core::fmt;

use memchr::{memchr, memchr2_iter, memchr3};

/// A pull based CSV record parser.
///
/// This reader parses CSV data using a finite state machine. Callers extract
/// parsed records incrementally using the `read_record` method, feeding it
/// input as it becomes available.
///
/// Note that this CSV reader is somewhat encoding agnostic. The source data
/// needs to be at least ASCII compatible. Any byte can be used as a delimiter,
/// quote or comment byte, although callers probably want to stick to the
/// ASCII subset (`<= 0x7F`).
///
/// # RFC 4180
///
/// [RFC 4180](https://tools.ietf.org/html/rfc4180)
/// is the closest thing to a specification for CSV data. This reader follows
/// it with a few deviations that are common in the wild:
///
/// * CRLF, LF and CR are each treated as a single record terminator.
/// * Records are permitted to be of varying length. (Field count checks are
///   left to the caller.)
/// * Empty lines (that do not include other whitespace) are ignored.
/// * Lines starting with an optional comment byte are ignored.
///
/// # Strict and lenient parsing
///
/// By default, the reader rejects three kinds of malformed input: a quote in
/// an unquoted field, a byte other than a delimiter or terminator after a
/// closing quote, and a quoted field left open at the end of input. After
/// reporting an error, the reader discards the rest of the offending record
/// and continues with the next one. The end of the offending record is the
/// next line terminator outside of a quoted field, where a quote only opens a
/// quoted field right after a delimiter.
///
/// In lenient mode, none of these are errors: a bare quote is kept as a
/// literal byte, a byte following a closing quote continues the field as if
/// it were unquoted and an unterminated quoted field is closed at the end of
/// input.
#[derive(Clone, Debug)]
pub struct Reader {
    /// The current state of the automaton.
    state: NfaState,
    /// The delimiter that separates fields.
    delimiter: u8,
    /// The quotation byte.
    quote: u8,
    /// Lines beginning with this byte are skipped.
    comment: Option<u8>,
    /// Whether to recover from malformed quoting instead of failing.
    lenient: bool,
    /// The position of the next byte to be consumed.
    cur: Cursor,
    /// Where the current (or most recent) record started.
    record_start: Location,
    /// Where the most recent quoted field was opened.
    quote_start: Location,
    /// The current position in the output buffer when reading a record.
    output_pos: usize,
}

impl Default for Reader {
    fn default() -> Reader {
        Reader {
            state: NfaState::StartRecord,
            delimiter: b',',
            quote: b'"',
            comment: None,
            lenient: false,
            cur: Cursor::new(),
            record_start: Location::start(),
            quote_start: Location::start(),
            output_pos: 0,
        }
    }
}

/// Builds a CSV reader with various configuration knobs.
///
/// This builder can be used to tweak the field delimiter, quote and more
/// for parsing CSV. Once a CSV `Reader` is built, its configuration cannot be
/// changed.
#[derive(Debug, Default)]
pub struct ReaderBuilder {
    rdr: Reader,
}

impl ReaderBuilder {
    /// Create a new builder.
    pub fn new() -> ReaderBuilder {
        ReaderBuilder::default()
    }

    /// Build a CSV parser from this configuration.
    ///
    /// This returns an error if the configuration is ambiguous, e.g., when
    /// the delimiter and the quote are the same byte.
    pub fn build(&self) -> Result<Reader, ConfigError> {
        let rdr = &self.rdr;
        if is_newline(rdr.delimiter) {
            return Err(ConfigError::TerminatorByte(rdr.delimiter));
        }
        if is_newline(rdr.quote) {
            return Err(ConfigError::TerminatorByte(rdr.quote));
        }
        if rdr.delimiter == rdr.quote {
            return Err(ConfigError::DelimiterIsQuote(rdr.delimiter));
        }
        if let Some(comment) = rdr.comment {
            if is_newline(comment) {
                return Err(ConfigError::TerminatorByte(comment));
            }
            if comment == rdr.delimiter || comment == rdr.quote {
                return Err(ConfigError::AmbiguousComment(comment));
            }
        }
        let mut rdr = rdr.clone();
        rdr.reset();
        Ok(rdr)
    }

    /// The field delimiter to use when parsing CSV.
    ///
    /// The default is `b','`.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut ReaderBuilder {
        self.rdr.delimiter = delimiter;
        self
    }

    /// The quote character to use when parsing CSV.
    ///
    /// The default is `b'"'`.
    pub fn quote(&mut self, quote: u8) -> &mut ReaderBuilder {
        self.rdr.quote = quote;
        self
    }

    /// The comment character to use when parsing CSV.
    ///
    /// When set, a line whose first byte (ignoring leading spaces and tabs)
    /// is this byte is skipped entirely. A comment is only recognized at the
    /// start of a record, never inside a field.
    ///
    /// By default, no comment byte is recognized.
    pub fn comment(&mut self, comment: Option<u8>) -> &mut ReaderBuilder {
        self.rdr.comment = comment;
        self
    }

    /// Enable lenient handling of malformed quotes.
    ///
    /// This is disabled by default.
    pub fn lenient(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.rdr.lenient = yes;
        self
    }
}

/// The result of parsing at most one record from CSV data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadRecordResult {
    /// The caller provided input was exhausted before the end of a record was
    /// found.
    InputEmpty,
    /// The caller provided output buffer was filled before an entire field
    /// could be written to it.
    OutputFull,
    /// The caller provided output buffer of field end positions was filled
    /// before the next field could be parsed.
    OutputEndsFull,
    /// The end of a record was found.
    Record,
    /// A comment line was skipped.
    ///
    /// Any field data written for the current record must be discarded, since
    /// blanks preceding a comment byte are only known not to be field data
    /// once the comment byte is seen.
    Comment,
    /// The input is malformed. The caller must discard any field data
    /// written for the current record. Parsing can resume by calling
    /// `read_record` again, which skips the remainder of the offending
    /// record, including line terminators inside its quoted fields.
    Error(SyntaxError),
    /// All CSV data has been read.
    ///
    /// This state can only be returned when an empty input buffer is provided
    /// by the caller.
    End,
}

impl ReadRecordResult {
    /// Returns true if and only if a complete record was parsed.
    pub fn is_record(&self) -> bool {
        *self == ReadRecordResult::Record
    }
}

/// The location of a byte in CSV data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Location {
    byte: u64,
    line: u64,
    column: u64,
}

impl Location {
    fn start() -> Location {
        Location { byte: 0, line: 1, column: 1 }
    }

    /// The byte offset, starting at `0`.
    pub fn byte(&self) -> u64 {
        self.byte
    }

    /// The line number, starting at `1`.
    ///
    /// Every `\n`, `\r\n` and `\r` ends a line, including those inside
    /// quoted fields.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The column number within the line, starting at `1`.
    pub fn column(&self) -> u64 {
        self.column
    }
}

/// The kind of a syntax error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyntaxErrorKind {
    /// A quote appeared in an unquoted field.
    BareQuote,
    /// The input ended inside a quoted field.
    UnterminatedQuote,
    /// A byte other than a quote, delimiter or line terminator followed the
    /// closing quote of a quoted field.
    UnexpectedByteAfterQuote,
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SyntaxErrorKind::BareQuote => {
                write!(f, "bare quote in unquoted field")
            }
            SyntaxErrorKind::UnterminatedQuote => {
                write!(f, "unterminated quoted field")
            }
            SyntaxErrorKind::UnexpectedByteAfterQuote => {
                write!(f, "unexpected byte after closing quote")
            }
        }
    }
}

/// A malformed CSV record.
///
/// The location points at the offending byte, except for
/// `UnterminatedQuote`, where it points at the quote that opened the field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyntaxError {
    kind: SyntaxErrorKind,
    location: Location,
}

impl SyntaxError {
    /// The kind of this error.
    pub fn kind(&self) -> SyntaxErrorKind {
        self.kind
    }

    /// Where in the input this error occurred.
    pub fn location(&self) -> Location {
        self.location
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (line {}, column {})",
            self.kind, self.location.line, self.location.column
        )
    }
}

/// An invalid reader configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The delimiter and the quote are the same byte.
    DelimiterIsQuote(u8),
    /// The comment byte is also the delimiter or the quote.
    AmbiguousComment(u8),
    /// `\r` or `\n` was used as a delimiter, quote or comment byte.
    TerminatorByte(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::DelimiterIsQuote(b) => write!(
                f,
                "delimiter and quote must differ, both are {:?}",
                b as char
            ),
            ConfigError::AmbiguousComment(b) => write!(
                f,
                "comment byte {:?} is also the delimiter or the quote",
                b as char
            ),
            ConfigError::TerminatorByte(b) => write!(
                f,
                "{:?} is a record terminator and cannot be configured",
                b as char
            ),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum NfaState {
    StartRecord,
    StartRecordSpace,
    StartField,
    InField,
    InQuotedField,
    InDoubleEscapedQuote,
    EndFieldDelim,
    EndFieldTerm,
    InRecordTerm,
    EndRecord,
    CRLF,
    InComment,
    EndComment,
    Invalid(SyntaxErrorKind),
    Resync,
    ResyncStartField,
    ResyncQuoted,
    ResyncQuotedQuote,
    End,
}

impl Reader {
    /// Create a new CSV reader with a default parser configuration.
    pub fn new() -> Reader {
        Reader::default()
    }

    /// Reset the parser such that it behaves as if it had never been used.
    pub fn reset(&mut self) {
        self.state = NfaState::StartRecord;
        self.cur = Cursor::new();
        self.record_start = Location::start();
        self.quote_start = Location::start();
        self.output_pos = 0;
    }

    /// Return the current line number.
    ///
    /// This is the line of the most recently consumed byte. A line only
    /// begins once its first byte is consumed, so after parsing `a,b\n`, this
    /// is still `1`.
    pub fn line(&self) -> u64 {
        self.cur.line
    }

    /// Return the total number of bytes consumed so far.
    pub fn byte(&self) -> u64 {
        self.cur.byte
    }

    /// Return the location of the first byte of the current record.
    ///
    /// After `read_record` returns `ReadRecordResult::Record`, this is where
    /// that record began.
    pub fn record_start(&self) -> Location {
        self.record_start
    }

    /// Return the location at which the next byte will be consumed.
    pub fn location(&self) -> Location {
        self.cur.next_location()
    }

    /// Parse a single CSV record in `input` and copy field data to `output`.
    ///
    /// This routine requires a caller provided buffer of CSV data as the
    /// `input` and a caller provided buffer, `output`, in which to store field
    /// data extracted from `input`. The field data copied to `output` will
    /// have its quotes unescaped. The end position of each field is written
    /// to `ends`, relative to the start of the record.
    ///
    /// Calling this routine parses at most a single record and returns four
    /// values indicating the state of the parser. The first value, a
    /// `ReadRecordResult`, tells the caller what to do next. For example, if
    /// the entire input was read or if the output buffer was filled before a
    /// full field had been read, then `ReadRecordResult::InputEmpty` or
    /// `ReadRecordResult::OutputFull` is returned, respectively. See the
    /// documentation for `ReadRecordResult` for more details.
    ///
    /// The other three values returned correspond to the number of bytes
    /// read from `input`, written to `output` and written to `ends`,
    /// respectively.
    ///
    /// # Termination
    ///
    /// This reader interprets an empty `input` buffer as an indication that
    /// there is no CSV data left to read. Namely, when the caller has
    /// exhausted all CSV data, the caller should continue to call
    /// `read_record` with an empty input buffer until `ReadRecordResult::End`
    /// is returned.
    pub fn read_record(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        ends: &mut [usize],
    ) -> (ReadRecordResult, usize, usize, usize) {
        if self.state == NfaState::End {
            return (ReadRecordResult::End, 0, 0, 0);
        }
        if input.is_empty() {
            return self.read_record_final(ends);
        }
        if output.is_empty() {
            return (ReadRecordResult::OutputFull, 0, 0, 0);
        }
        if ends.is_empty() {
            return (ReadRecordResult::OutputEndsFull, 0, 0, 0);
        }
        let (mut nin, mut nout, mut nend) = (0, 0, 0);
        let mut state = self.state;
        while nin < input.len() && nout < output.len() && nend < ends.len() {
            let run = self.scan_run(state, &input[nin..], output.len() - nout);
            if run > 0 {
                let bytes = &input[nin..nin + run];
                output[nout..nout + run].copy_from_slice(bytes);
                if state == NfaState::InQuotedField {
                    self.cur.bump_run(bytes);
                } else {
                    self.cur.bump_plain(run as u64);
                }
                nin += run;
                nout += run;
                continue;
            }

            let c = input[nin];
            let (s, i, o) = self.transition(state, c);
            if o {
                output[nout] = c;
                nout += 1;
            }
            if i {
                nin += 1;
                self.cur.bump(c);
            } else if state == NfaState::StartRecord {
                self.record_start = self.cur.next_location();
            }
            if state == NfaState::StartField && s == NfaState::InQuotedField {
                self.quote_start = self.cur.location();
            }
            state = s;
            match state {
                NfaState::Invalid(kind) => {
                    let err = SyntaxError { kind, location: self.cur.location() };
                    self.state = NfaState::Resync;
                    self.output_pos = 0;
                    return (ReadRecordResult::Error(err), nin, nout, nend);
                }
                NfaState::EndFieldDelim => {
                    ends[nend] = self.output_pos + nout;
                    nend += 1;
                }
                NfaState::EndRecord | NfaState::CRLF => {
                    ends[nend] = self.output_pos + nout;
                    nend += 1;
                    self.state = state;
                    self.output_pos = 0;
                    return (ReadRecordResult::Record, nin, nout, nend);
                }
                NfaState::EndComment => {
                    self.state = state;
                    self.output_pos = 0;
                    return (ReadRecordResult::Comment, nin, nout, nend);
                }
                _ => {}
            }
        }
        self.state = state;
        self.output_pos += nout;
        let res = if nin >= input.len() {
            ReadRecordResult::InputEmpty
        } else if nout >= output.len() {
            ReadRecordResult::OutputFull
        } else {
            ReadRecordResult::OutputEndsFull
        };
        (res, nin, nout, nend)
    }

    /// Handle the end of input.
    ///
    /// When reading the final record, the last result the caller got was an
    /// InputEmpty, and while they have everything they need in `output`,
    /// they're missing the end position of the final field in `ends`. We
    /// insert that here, but we must take care to handle the case where
    /// `ends` doesn't have enough space. If it doesn't, then we also can't
    /// transition to the next state.
    fn read_record_final(
        &mut self,
        ends: &mut [usize],
    ) -> (ReadRecordResult, usize, usize, usize) {
        use self::NfaState::*;

        match self.state {
            End | StartRecord | EndRecord | CRLF | EndComment | Resync
            | ResyncStartField | ResyncQuoted | ResyncQuotedQuote
            | Invalid(_) => {
                self.state = End;
                (ReadRecordResult::End, 0, 0, 0)
            }
            InComment => {
                self.state = EndComment;
                self.output_pos = 0;
                (ReadRecordResult::Comment, 0, 0, 0)
            }
            InQuotedField if !self.lenient => {
                self.state = End;
                self.output_pos = 0;
                let err = SyntaxError {
                    kind: SyntaxErrorKind::UnterminatedQuote,
                    location: self.quote_start,
                };
                (ReadRecordResult::Error(err), 0, 0, 0)
            }
            StartRecordSpace | StartField | InField | InQuotedField
            | InDoubleEscapedQuote | EndFieldDelim | EndFieldTerm
            | InRecordTerm => {
                if ends.is_empty() {
                    return (ReadRecordResult::OutputEndsFull, 0, 0, 0);
                }
                ends[0] = self.output_pos;
                self.output_pos = 0;
                self.state = EndRecord;
                (ReadRecordResult::Record, 0, 0, 1)
            }
        }
    }

    /// Returns the length of the longest prefix of `input` (capped at
    /// `room`) made up of bytes that the given state would copy to the
    /// output verbatim without changing state.
    ///
    /// Stepping through such a run one byte at a time would produce exactly
    /// the same output, so this is purely an optimization.
    #[inline(always)]
    fn scan_run(&self, state: NfaState, input: &[u8], room: usize) -> usize {
        let haystack = &input[..cmp::min(input.len(), room)];
        match state {
            NfaState::InField => {
                let end = memchr3(self.delimiter, b'\n', b'\r', haystack)
                    .unwrap_or(haystack.len());
                if self.lenient {
                    end
                } else {
                    memchr(self.quote, &haystack[..end]).unwrap_or(end)
                }
            }
            NfaState::InQuotedField => {
                memchr(self.quote, haystack).unwrap_or(haystack.len())
            }
            _ => 0,
        }
    }

    /// Compute the next state given the current state and an input byte.
    ///
    /// The two booleans returned indicate whether the byte was consumed and
    /// whether it should be copied to the output, respectively. Transitions
    /// that don't consume their byte are epsilon transitions: the same byte
    /// is fed to the next state.
    #[inline(always)]
    fn transition(&self, state: NfaState, c: u8) -> (NfaState, bool, bool) {
        use self::NfaState::*;
        match state {
            End => (End, false, false),
            StartRecord => {
                if is_newline(c) {
                    (StartRecord, true, false)
                } else if self.comment == Some(c) {
                    (InComment, true, false)
                } else if self.comment.is_some() && self.is_blank(c) {
                    (StartRecordSpace, false, false)
                } else {
                    (StartField, false, false)
                }
            }
            StartRecordSpace => {
                if self.comment == Some(c) {
                    (InComment, true, false)
                } else if self.is_blank(c) {
                    (StartRecordSpace, true, true)
                } else {
                    (InField, false, false)
                }
            }
            EndRecord | EndComment => (StartRecord, false, false),
            StartField => {
                if self.quote == c {
                    (InQuotedField, true, false)
                } else if self.delimiter == c {
                    (EndFieldDelim, true, false)
                } else if is_newline(c) {
                    (EndFieldTerm, false, false)
                } else {
                    (InField, true, true)
                }
            }
            EndFieldDelim => (StartField, false, false),
            EndFieldTerm => (InRecordTerm, false, false),
            InField => {
                if self.delimiter == c {
                    (EndFieldDelim, true, false)
                } else if is_newline(c) {
                    (EndFieldTerm, false, false)
                } else if self.quote == c && !self.lenient {
                    (Invalid(SyntaxErrorKind::BareQuote), true, false)
                } else {
                    (InField, true, true)
                }
            }
            InQuotedField => {
                if self.quote == c {
                    (InDoubleEscapedQuote, true, false)
                } else {
                    (InQuotedField, true, true)
                }
            }
            InDoubleEscapedQuote => {
                if self.quote == c {
                    (InQuotedField, true, true)
                } else if self.delimiter == c {
                    (EndFieldDelim, true, false)
                } else if is_newline(c) {
                    (EndFieldTerm, false, false)
                } else if self.lenient {
                    (InField, true, true)
                } else {
                    let kind = SyntaxErrorKind::UnexpectedByteAfterQuote;
                    (Invalid(kind), true, false)
                }
            }
            InRecordTerm => {
                if b'\r' == c {
                    (CRLF, true, false)
                } else {
                    (EndRecord, true, false)
                }
            }
            CRLF => {
                if b'\n' == c {
                    (StartRecord, true, false)
                } else {
                    (StartRecord, false, false)
                }
            }
            InComment => {
                if is_newline(c) {
                    (EndComment, true, false)
                } else {
                    (InComment, true, false)
                }
            }
            Resync => {
                if is_newline(c) {
                    (StartRecord, true, false)
                } else if self.delimiter == c {
                    (ResyncStartField, true, false)
                } else {
                    (Resync, true, false)
                }
            }
            ResyncStartField => {
                if self.quote == c {
                    (ResyncQuoted, true, false)
                } else {
                    (Resync, false, false)
                }
            }
            ResyncQuoted => {
                if self.quote == c {
                    (ResyncQuotedQuote, true, false)
                } else {
                    (ResyncQuoted, true, false)
                }
            }
            ResyncQuotedQuote => {
                if self.quote == c {
                    (ResyncQuoted, true, false)
                } else {
                    (Resync, false, false)
                }
            }
            Invalid(_) => (Resync, false, false),
        }
    }

    /// Whether `c` may precede a comment byte on a comment line.
    fn is_blank(&self, c: u8) -> bool {
        (c == b' ' || c == b'\t') && c != self.delimiter
    }
}

fn is_newline(c: u8) -> bool {
    c == b'\n' || c == b'\r'
}

/// Tracks the byte offset, line and column of consumed input.
///
/// A `\r\n` pair ends a single line. A new line is only started once a byte
/// following a line terminator is consumed.
#[derive(Clone, Copy, Debug)]
struct Cursor {
    /// The number of bytes consumed.
    byte: u64,
    /// The line of the most recently consumed byte.
    line: u64,
    /// The column of the most recently consumed byte.
    column: u64,
    /// Whether the most recently consumed byte terminated a line.
    line_start: bool,
    /// Whether the most recently consumed byte was a `\r`.
    after_cr: bool,
}

impl Cursor {
    fn new() -> Cursor {
        Cursor { byte: 0, line: 1, column: 0, line_start: false, after_cr: false }
    }

    /// The location of the most recently consumed byte.
    fn location(&self) -> Location {
        Location {
            byte: self.byte.saturating_sub(1),
            line: self.line,
            column: cmp::max(1, self.column),
        }
    }

    /// The location of the next byte to be consumed.
    fn next_location(&self) -> Location {
        if self.line_start {
            Location { byte: self.byte, line: self.line + 1, column: 1 }
        } else {
            Location { byte: self.byte, line: self.line, column: self.column + 1 }
        }
    }

    #[inline(always)]
    fn bump(&mut self, c: u8) {
        self.byte += 1;
        if self.after_cr {
            self.after_cr = false;
            if c == b'\n' {
                return;
            }
        }
        if self.line_start {
            self.line += 1;
            self.column = 0;
            self.line_start = false;
        }
        self.column += 1;
        if c == b'\n' {
            self.line_start = true;
        } else if c == b'\r' {
            self.line_start = true;
            self.after_cr = true;
        }
    }

    /// Consume `n` bytes, none of which are line terminators.
    #[inline(always)]
    fn bump_plain(&mut self, n: u64) {
        if n == 0 {
            return;
        }
        self.byte += n;
        self.after_cr = false;
        if self.line_start {
            self.line += 1;
            self.column = 0;
            self.line_start = false;
        }
        self.column += n;
    }

    /// Consume a run of bytes that may contain line terminators.
    fn bump_run(&mut self, bytes: &[u8]) {
        let mut last = 0;
        for i in memchr2_iter(b'\n', b'\r', bytes) {
            self.bump_plain((i - last) as u64);
            self.bump(bytes[i]);
            last = i + 1;
        }
        self.bump_plain((bytes.len() - last) as u64);
    }
}
