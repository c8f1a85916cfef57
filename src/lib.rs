/*!
The `csvc` crate provides a fast, streaming CSV record parser with strict
quoting rules and precise error locations.

Records are pulled one at a time from any `io::Read`. Quoted fields may
contain delimiters, line terminators and doubled quotes, and `\n`, `\r\n` and
`\r` all end a record. Every record and every error carries a `Position` with
its byte offset, line, column and record index.

# Example

```
use csvc::{FieldCount, ReaderBuilder};

# fn example() -> csvc::Result<()> {
let data = "\
city,pop
# a comment line
Boston,\"4,628,910\"
\"Concord,
NH\",42695
";
let mut rdr = ReaderBuilder::new()
    .comment(Some(b'#'))
    .field_count(FieldCount::Consistent)
    .from_reader(data.as_bytes())?;

let records = rdr.read_all()?;
assert_eq!(records.len(), 3);
assert_eq!(records[1], vec!["Boston", "4,628,910"]);
assert_eq!(records[2], vec!["Concord,\nNH", "42695"]);
assert_eq!(records[2].position().unwrap().line(), 4);
# Ok(())
# }
# example().unwrap();
```

# Errors

Malformed quoting is an error by default (see `ReaderBuilder::lenient`), as
is a record with the wrong number of fields when a `FieldCount` policy
enforces one. Both kinds of error only spoil a single record: the next read
resumes with the record after it.

```
use csvc::{Error, Reader, SyntaxErrorKind};

let mut rdr = Reader::from_reader("a,b\"c\nd,e\n".as_bytes());
match rdr.records().next() {
    Some(Err(Error::Syntax { pos, kind: SyntaxErrorKind::BareQuote })) => {
        assert_eq!((pos.line(), pos.column()), (1, 4));
    }
    res => panic!("unexpected result: {:?}", res),
}
let rec = rdr.records().next().unwrap().unwrap();
assert_eq!(rec, vec!["d", "e"]);
```

The building blocks are also available without any I/O or allocation in the
`csvc-core` crate.
*/

#![deny(missing_docs)]

pub use csvc_core::{ConfigError, SyntaxErrorKind};

pub use crate::byte_record::{ByteRecord, ByteRecordIter, Position};
pub use crate::error::{Error, FromUtf8Error, Result, Utf8Error};
pub use crate::reader::{
    ByteRecordsIter, FieldCount, Reader, ReaderBuilder, StringRecordsIntoIter,
    StringRecordsIter,
};
pub use crate::string_record::{StringRecord, StringRecordIter};

mod byte_record;
mod error;
mod reader;
#[cfg(feature = "serde")]
mod serde_impl;
mod string_record;
