use std::io;
use std::str::Utf8Error;

use httparse;

quick_error! {
    /// Any error that is fatal to a single connection.
    ///
    /// An error of this kind closes the connection it occurred on and is
    /// reported through the logger; it never affects sibling connections
    /// or the reactor itself.
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            display("I/O error: {}", err)
            from()
        }
        ParseError(err: httparse::Error) {
            display("parse error: {:?}", err)
            from()
        }
        ChunkParseError(err: httparse::InvalidChunkSize) {
            display("chunk size parse error: {:?}", err)
            from()
        }
        MissingChunkDelimiter {
            display("chunk data is not terminated by CRLF")
        }
        ContentLengthInvalid {
            display("invalid content-length header")
        }
        DuplicateContentLength {
            display("duplicate content-length header")
        }
        ConflictingFraming {
            display("both content-length and chunked transfer encoding present")
        }
        BadUtf8(err: Utf8Error) {
            display("invalid utf-8 in headers: {}", err)
            from()
        }
        RequestTooLarge {
            display("request is larger than the configured maximum")
        }
    }
}
