/*!
`csvc-core` provides a push based CSV record parser with no allocation and
no I/O.

The parser is a state machine over bytes. Callers hand it a chunk of input
along with buffers for decoded field data and field end positions, and it
reports how much of each it used. A higher level crate is expected to manage
the buffers and the byte source; see the `csvc` crate for that.

Quoting follows RFC 4180: a quoted field may contain delimiters, line
terminators and doubled quotes. `\n`, `\r\n` and `\r` are all recognized as
record terminators. By default, grammar violations are reported as
`SyntaxError`s; a lenient mode recovers from them instead.

# Example

```
use csvc_core::{ReadRecordResult, Reader};

let mut rdr = Reader::new();
let mut output = [0; 64];
let mut ends = [0; 8];

let (res, nin, nout, nend) =
    rdr.read_record(b"foo,\"b,ar\"\nquux", &mut output, &mut ends);
assert_eq!(res, ReadRecordResult::Record);
assert_eq!((nin, nout, nend), (11, 7, 2));
assert_eq!(&output[..ends[0]], b"foo");
assert_eq!(&output[ends[0]..ends[1]], b"b,ar");
```
*/

#![deny(missing_docs)]
#![no_std]

pub use crate::reader::{
    ConfigError, Location, ReadRecordResult, Reader, ReaderBuilder,
    SyntaxError, SyntaxErrorKind,
};

mod reader;
