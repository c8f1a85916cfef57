use std::cmp;
use std::io;

use csvc::{
    ByteRecord, Error, FieldCount, Reader, ReaderBuilder, StringRecord,
    SyntaxErrorKind,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn parse(data: &str) -> Vec<Vec<String>> {
    parse_with(&ReaderBuilder::new(), data)
}

fn parse_with(builder: &ReaderBuilder, data: &str) -> Vec<Vec<String>> {
    init_logger();
    let mut rdr = builder.from_reader(data.as_bytes()).unwrap();
    rdr.records()
        .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
        .collect()
}

fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter().map(|r| r.iter().map(|f| f.to_string()).collect()).collect()
}

/// Quote a field such that parsing it yields the field back.
fn quote_field(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Reads at most `chunk` bytes at a time from the data given.
struct ChunkReader<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl<'a> io::Read for ChunkReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = cmp::min(self.chunk, cmp::min(buf.len(), self.data.len()));
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Returns its data and then fails every read afterwards.
struct FailingReader<'a> {
    data: &'a [u8],
}

impl<'a> io::Read for FailingReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset",
            ));
        }
        let n = cmp::min(buf.len(), self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Interrupts every other read.
struct InterruptingReader<'a> {
    data: &'a [u8],
    interrupt: bool,
}

impl<'a> io::Read for InterruptingReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.interrupt = !self.interrupt;
        if self.interrupt {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
        }
        let n = cmp::min(1, cmp::min(buf.len(), self.data.len()));
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Plays back a script of reads, each either some data or an error.
struct ScriptedReader<'a> {
    script: Vec<Result<&'a [u8], io::ErrorKind>>,
}

impl<'a> io::Read for ScriptedReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.script.is_empty() {
            return Ok(0);
        }
        match self.script.remove(0) {
            Err(kind) => Err(io::Error::new(kind, "scripted failure")),
            Ok(data) => {
                let n = cmp::min(buf.len(), data.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.script.insert(0, Ok(&data[n..]));
                }
                Ok(n)
            }
        }
    }
}

#[test]
fn plain_lines_split_on_delimiter() {
    let lines = ["a,b,c", "1,22,333", "x y,  z ,tab\there", "single"];
    for &delim in &[b',', b';', b'\t', b'|'] {
        let d = delim as char;
        let data: String = lines
            .iter()
            .map(|l| format!("{}\n", l.replace(',', &d.to_string())))
            .collect();
        let mut builder = ReaderBuilder::new();
        builder.delimiter(delim);
        let expected: Vec<Vec<String>> = lines
            .iter()
            .map(|l| {
                l.replace(',', &d.to_string())
                    .split(d)
                    .map(|f| f.to_string())
                    .collect()
            })
            .collect();
        assert_eq!(parse_with(&builder, &data), expected, "delimiter {:?}", d);
    }
}

#[test]
fn quoted_fields_round_trip() {
    let fields = [
        "plain",
        "with,comma",
        "with\nnewline",
        "with\r\ncrlf",
        "with \"quotes\"",
        "  spaced  ",
        "",
        "\"\"",
        "ends with quote\"",
    ];
    let data: String = fields
        .chunks(3)
        .map(|rec| {
            let quoted: Vec<String> = rec.iter().map(|f| quote_field(f)).collect();
            format!("{}\n", quoted.join(","))
        })
        .collect();
    let expected: Vec<Vec<String>> = fields
        .chunks(3)
        .map(|rec| rec.iter().map(|f| f.to_string()).collect())
        .collect();
    assert_eq!(parse(&data), expected);
}

#[test]
fn line_endings_are_equivalent() {
    let lf = parse("a,\"b\nc\",d\ne,f,g\n");
    let crlf = parse("a,\"b\nc\",d\r\ne,f,g\r\n");
    let cr = parse("a,\"b\nc\",d\re,f,g\r");
    assert_eq!(lf, rows(&[&["a", "b\nc", "d"], &["e", "f", "g"]]));
    assert_eq!(lf, crlf);
    assert_eq!(lf, cr);
}

#[test]
fn fixed_field_count_mismatch() {
    init_logger();
    let mut rdr = ReaderBuilder::new()
        .field_count(FieldCount::Exact(2))
        .from_reader("a,b\n1,2,3\n".as_bytes())
        .unwrap();
    let mut rec = StringRecord::new();

    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec, vec!["a", "b"]);
    match rdr.read_record(&mut rec) {
        Err(Error::FieldCountMismatch { pos, expected_len, len }) => {
            assert_eq!(expected_len, 2);
            assert_eq!(len, 3);
            assert_eq!(pos.line(), 2);
            assert_eq!(pos.column(), 1);
            assert_eq!(pos.byte(), 4);
        }
        res => panic!("expected field count mismatch, got {:?}", res),
    }
    assert!(rec.is_empty());
    assert!(!rdr.read_record(&mut rec).unwrap());
}

#[test]
fn escaped_quotes() {
    assert_eq!(
        parse(r#""She said ""Hello"" and ""Goodbye""""#),
        rows(&[&[r#"She said "Hello" and "Goodbye""#]])
    );
}

#[test]
fn multi_line_quoted_field() {
    let mut rdr =
        Reader::from_reader("field1,\"line1\nline2\",field3\n".as_bytes());
    let rec = rdr.next_record().unwrap().unwrap().clone();
    assert_eq!(rec, vec!["field1", "line1\nline2", "field3"]);
    assert_eq!(rdr.line(), 2);
    assert!(rdr.next_record().unwrap().is_none());
}

#[test]
fn trailing_record_without_terminator() {
    let mut rdr = Reader::from_reader("a,b,c".as_bytes());
    let mut rec = StringRecord::new();
    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec, vec!["a", "b", "c"]);
    assert!(!rdr.read_record(&mut rec).unwrap());
    assert!(rec.is_empty());
}

#[test]
fn empty_input() {
    let mut rdr = Reader::from_reader(io::empty());
    let mut rec = ByteRecord::new();
    assert!(!rdr.read_byte_record(&mut rec).unwrap());
    assert!(rdr.is_done());
    assert_eq!(rdr.read_all().unwrap(), Vec::<StringRecord>::new());
}

#[test]
fn custom_delimiter() {
    let mut builder = ReaderBuilder::new();
    builder.delimiter(b';');
    assert_eq!(parse_with(&builder, "a;b;c\n"), rows(&[&["a", "b", "c"]]));
}

#[test]
fn empty_fields() {
    assert_eq!(parse(",a,,b,\n"), rows(&[&["", "a", "", "b", ""]]));
    assert_eq!(parse(",\n"), rows(&[&["", ""]]));
    assert_eq!(parse("\"\"\n"), rows(&[&[""]]));
}

#[test]
fn blank_lines_are_skipped() {
    assert_eq!(
        parse("\n\na,b\n\r\n\rc,d\n\n"),
        rows(&[&["a", "b"], &["c", "d"]])
    );
}

#[test]
fn whitespace_lines_are_records() {
    assert_eq!(parse("a\n  \nb\n"), rows(&[&["a"], &["  "], &["b"]]));

    let mut builder = ReaderBuilder::new();
    builder.comment(Some(b'#'));
    assert_eq!(
        parse_with(&builder, "a\n \t\nb\n"),
        rows(&[&["a"], &[" \t"], &["b"]])
    );
}

#[test]
fn comment_lines() {
    let mut builder = ReaderBuilder::new();
    builder.comment(Some(b'#'));
    assert_eq!(
        parse_with(&builder, "# header\na,b\n  # indented\n\t#tabbed\nc,d\n#"),
        rows(&[&["a", "b"], &["c", "d"]])
    );
}

#[test]
fn comment_byte_inside_record_is_data() {
    let mut builder = ReaderBuilder::new();
    builder.comment(Some(b'#'));
    assert_eq!(
        parse_with(&builder, "a,#b\n\"x\n#y\",z\n"),
        rows(&[&["a", "#b"], &["x\n#y", "z"]])
    );
}

#[test]
fn comment_lines_keep_record_count() {
    let mut rdr = ReaderBuilder::new()
        .comment(Some(b'#'))
        .from_reader("#c\na\n#c\nb\n".as_bytes())
        .unwrap();
    let recs = rdr.read_all().unwrap();
    let pos: Vec<(u64, u64)> = recs
        .iter()
        .map(|r| {
            let p = r.position().unwrap();
            (p.record(), p.line())
        })
        .collect();
    assert_eq!(pos, vec![(0, 2), (1, 4)]);
}

#[test]
fn bare_quote_strict() {
    init_logger();
    let mut rdr = Reader::from_reader("a,b\nc\"d,e\nf,g\n".as_bytes());
    let results: Vec<_> = rdr.records().collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &vec!["a", "b"]);
    match results[1] {
        Err(Error::Syntax { ref pos, kind: SyntaxErrorKind::BareQuote }) => {
            assert_eq!((pos.line(), pos.column(), pos.byte()), (2, 2, 5));
        }
        ref res => panic!("expected bare quote error, got {:?}", res),
    }
    assert_eq!(results[2].as_ref().unwrap(), &vec!["f", "g"]);
}

#[test]
fn bare_quote_lenient() {
    let mut builder = ReaderBuilder::new();
    builder.lenient(true);
    assert_eq!(
        parse_with(&builder, "a\"b,c\n"),
        rows(&[&["a\"b", "c"]])
    );
}

#[test]
fn unterminated_quote_strict() {
    let mut rdr = Reader::from_reader("x,y\na,\"bc\nd".as_bytes());
    let mut rec = StringRecord::new();
    assert!(rdr.read_record(&mut rec).unwrap());

    let err = rdr.read_record(&mut rec).unwrap_err();
    assert_eq!(err.syntax_kind(), Some(SyntaxErrorKind::UnterminatedQuote));
    let pos = err.position().unwrap();
    assert_eq!((pos.line(), pos.column(), pos.byte()), (2, 3, 6));
    assert!(rec.is_empty());

    assert!(!rdr.read_record(&mut rec).unwrap());
}

#[test]
fn unterminated_quote_lenient() {
    let mut builder = ReaderBuilder::new();
    builder.lenient(true);
    assert_eq!(
        parse_with(&builder, "a,\"bc\nd"),
        rows(&[&["a", "bc\nd"]])
    );
}

#[test]
fn byte_after_quote_strict() {
    let mut rdr = Reader::from_reader("\"a\"b,c\nd,e\n".as_bytes());
    let mut rec = StringRecord::new();

    let err = rdr.read_record(&mut rec).unwrap_err();
    assert_eq!(
        err.syntax_kind(),
        Some(SyntaxErrorKind::UnexpectedByteAfterQuote)
    );
    let pos = err.position().unwrap();
    assert_eq!((pos.line(), pos.column(), pos.byte()), (1, 4, 3));
    assert_eq!(pos.record(), 0);

    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec, vec!["d", "e"]);
    assert_eq!(rec.position().unwrap().record(), 0);
}

#[test]
fn byte_after_quote_lenient() {
    let mut builder = ReaderBuilder::new();
    builder.lenient(true);
    assert_eq!(
        parse_with(&builder, "\"a\"b,c\nd,e\n"),
        rows(&[&["ab", "c"], &["d", "e"]])
    );
}

#[test]
fn read_all_stops_at_first_error() {
    let mut rdr = Reader::from_reader("a\nb\"\nc\n".as_bytes());
    match rdr.read_all() {
        Err(Error::Syntax { kind: SyntaxErrorKind::BareQuote, .. }) => {}
        res => panic!("expected syntax error, got {:?}", res),
    }
    assert_eq!(rdr.read_all().unwrap(), vec![StringRecord::from(vec!["c"])]);
}

#[test]
fn chunked_source() {
    let data = "name,\"note\"\r\n\"a, b\",\"x\"\"y\nz\"\rlast,row";
    let expected =
        rows(&[&["name", "note"], &["a, b", "x\"y\nz"], &["last", "row"]]);
    for chunk in 1..8 {
        let src = ChunkReader { data: data.as_bytes(), chunk };
        let mut rdr = Reader::from_reader(src);
        let got: Vec<Vec<String>> = rdr
            .records()
            .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
            .collect();
        assert_eq!(got, expected, "chunk size {}", chunk);
        assert_eq!(rdr.line(), 4);
    }
}

#[test]
fn interrupted_reads_are_retried() {
    let src = InterruptingReader { data: b"a,b\nc,d\n", interrupt: false };
    let mut rdr = Reader::from_reader(src);
    assert_eq!(
        rdr.read_all().unwrap(),
        vec![StringRecord::from(vec!["a", "b"]), StringRecord::from(vec!["c", "d"])]
    );
}

#[test]
fn source_errors_propagate() {
    init_logger();
    let src = FailingReader { data: b"a,b\nc," };
    let mut rdr = Reader::from_reader(src);
    let results: Vec<_> = rdr.byte_records().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &vec!["a", "b"]);
    match results[1] {
        Err(Error::Io { ref pos, ref err }) => {
            assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
            assert_eq!((pos.line(), pos.column(), pos.byte()), (2, 3, 6));
        }
        ref res => panic!("expected I/O error, got {:?}", res),
    }
    assert!(!rdr.is_done());
}

#[test]
fn byte_records_allow_invalid_utf8() {
    let mut rdr = Reader::from_reader(&b"\xFF,a\n"[..]);
    let recs: Vec<ByteRecord> =
        rdr.byte_records().collect::<Result<_, _>>().unwrap();
    assert_eq!(recs, vec![ByteRecord::from(vec![&b"\xFF"[..], &b"a"[..]])]);
}

#[test]
fn owned_records_are_independent() {
    let mut rdr = Reader::from_reader("first,1\nsecond,22\n".as_bytes());
    let recs: Vec<StringRecord> = rdr.records().map(Result::unwrap).collect();
    assert_eq!(recs[0], vec!["first", "1"]);
    assert_eq!(recs[1], vec!["second", "22"]);
    assert_eq!(recs[0].as_byte_record().as_slice(), b"first1");
}

#[test]
fn error_messages() {
    let mut rdr = Reader::from_reader("ab\"c\n".as_bytes());
    let err = rdr.read_all().unwrap_err();
    assert_eq!(
        err.to_string(),
        "CSV parse error: record 0 (line 1, column 3): \
         bare quote in unquoted field"
    );

    let err = ReaderBuilder::new()
        .comment(Some(b','))
        .from_reader(io::empty())
        .unwrap_err();
    assert!(err.position().is_none());
}

#[test]
fn read_resumes_after_source_error() {
    init_logger();
    let src = ScriptedReader {
        script: vec![
            Ok(&b"a,bc"[..]),
            Err(io::ErrorKind::TimedOut),
            Ok(&b"d\n"[..]),
        ],
    };
    let mut rdr = Reader::from_reader(src);
    let mut rec = StringRecord::new();

    match rdr.read_record(&mut rec) {
        Err(Error::Io { ref err, .. }) => {
            assert_eq!(err.kind(), io::ErrorKind::TimedOut)
        }
        res => panic!("expected I/O error, got {:?}", res),
    }
    assert!(rec.is_empty());

    assert!(rdr.read_record(&mut rec).unwrap());
    assert_eq!(rec, vec!["a", "bcd"]);
    assert_eq!(rec.position().unwrap().record(), 0);
    assert!(!rdr.read_record(&mut rec).unwrap());
}

#[test]
fn resume_after_source_error_with_new_record() {
    let src = ScriptedReader {
        script: vec![
            Ok(&b"x\n\"one,"[..]),
            Err(io::ErrorKind::TimedOut),
            Err(io::ErrorKind::TimedOut),
            Ok(&b"two\",three\n"[..]),
        ],
    };
    let mut rdr = Reader::from_reader(src);
    let mut first = ByteRecord::new();
    assert!(rdr.read_byte_record(&mut first).unwrap());
    assert_eq!(first, vec!["x"]);

    let mut rec = ByteRecord::new();
    assert!(rdr.read_byte_record(&mut rec).unwrap_err().is_io_error());
    assert!(rdr.read_byte_record(&mut rec).unwrap_err().is_io_error());

    let mut fresh = ByteRecord::new();
    assert!(rdr.read_byte_record(&mut fresh).unwrap());
    assert_eq!(fresh, vec!["one,two", "three"]);
}

#[test]
fn syntax_error_skips_quoted_line_terminators() {
    let mut rdr =
        Reader::from_reader("\"a\"b,\"x\nfake,rec\n\"\nnext,row\n".as_bytes());
    let results: Vec<_> = rdr.records().collect();
    assert_eq!(results.len(), 2);
    match results[0] {
        Err(Error::Syntax {
            ref pos,
            kind: SyntaxErrorKind::UnexpectedByteAfterQuote,
        }) => assert_eq!((pos.line(), pos.column()), (1, 4)),
        ref res => panic!("expected syntax error, got {:?}", res),
    }
    let rec = results[1].as_ref().unwrap();
    assert_eq!(rec, &vec!["next", "row"]);
    assert_eq!(rec.position().unwrap().line(), 4);
}
