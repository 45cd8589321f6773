use std::io::Write;

use crate::headers;
use crate::response::Response;
use crate::tokenizer::Tokenizer;

/// Serialize a materialized response into the connection's write buffer
///
/// The status line is always `HTTP/1.1`; the close semantics of an
/// HTTP/1.0 exchange are carried by the `close` flag instead. Headers
/// are emitted verbatim in their original order, followed by the
/// auto-added ones (see `Response`). A response that carries
/// `Transfer-Encoding: chunked` is framed as a single chunk of the full
/// body plus the zero-length terminator; everything else is framed by
/// `Content-Length`.
pub(crate) fn serialize(response: &Response, close: bool, buf: &mut Tokenizer) {
    // Writes into the buffer are infallible
    write!(buf, "HTTP/1.1 {} {}\r\n",
        response.status(), response.reason()).unwrap();
    let mut has_length = false;
    let mut has_connection = false;
    let mut chunked = false;
    for header in response.headers() {
        if header.is("Content-Length") {
            has_length = true;
        } else if header.is("Transfer-Encoding") {
            if let Some(last) = header.value().split(',').last() {
                if headers::is_chunked(last) {
                    chunked = true;
                }
            }
        } else if header.is("Connection") {
            has_connection = true;
        }
        write!(buf, "{}: {}\r\n", header.name(), header.value()).unwrap();
    }
    if !chunked && !has_length {
        write!(buf, "Content-Length: {}\r\n", response.body().len()).unwrap();
    }
    if close && !has_connection {
        buf.extend(b"Connection: close\r\n");
    }
    buf.extend(b"\r\n");
    if chunked {
        if !response.body().is_empty() {
            write!(buf, "{:x}\r\n", response.body().len()).unwrap();
            buf.extend(response.body());
            buf.extend(b"\r\n");
        }
        buf.extend(b"0\r\n\r\n");
    } else {
        buf.extend(response.body());
    }
}
