use std::cmp;
use std::mem;
use std::str;

use httparse;

use crate::error::Error;
use crate::headers;
use crate::request::{Header, Request};
use crate::tokenizer::Tokenizer;
use crate::version::Version;

/// Number of headers to allocate on the stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers per request
const MAX_HEADERS: usize = 128;

/// A complete request together with its connection-lifetime decision
pub(crate) struct Parsed {
    pub request: Request,
    pub keep_alive: bool,
}

// Everything extracted from the request line and header section. The
// body framing travels separately so that this can be moved through the
// body states unchanged.
struct Head {
    version: Version,
    method: String,
    uri: String,
    headers: Vec<Header>,
    keep_alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    /// A fixed body length set by the `Content-Length` header.
    /// Requests without a body have the value `Fixed(0)`.
    Fixed(u64),
    /// A chunked body set by `Transfer-Encoding: chunked`.
    Chunked,
}

enum State {
    /// Waiting for the request line and the header section
    Head,
    /// Reading a fixed-size body (bytes left)
    FixedBody { head: Head, remaining: usize },
    /// Waiting for a chunk size line
    ChunkSize { head: Head },
    /// Reading chunk data (bytes left in the current chunk)
    ChunkData { head: Head, remaining: usize },
    /// Waiting for the CRLF that terminates chunk data
    ChunkDelimiter { head: Head },
    /// Reading the trailer section of a chunked body
    Trailers { head: Head },
}

/// Incremental HTTP/1.x request parser
///
/// Driven with whatever bytes have arrived; yields a request only once
/// it is complete, consuming its bytes from the buffer as each state
/// completes, and resets for the next pipelined request. Running the
/// parser on a prefix is free: until enough bytes arrive it reports
/// `None`, regardless of how the input is sliced.
///
/// All errors are fatal to the connection that feeds the parser.
pub(crate) struct Parser {
    state: State,
    limit: usize,
    consumed: usize,
    body: Vec<u8>,
    expect_continue: bool,
}

impl Parser {
    /// `limit` caps the total size of one request, head and body
    /// together
    pub fn new(limit: usize) -> Parser {
        Parser {
            state: State::Head,
            limit,
            consumed: 0,
            body: Vec::new(),
            expect_continue: false,
        }
    }

    /// True once per request that carried `Expect: 100-continue`,
    /// starting right after its header section was parsed
    pub fn take_expect_continue(&mut self) -> bool {
        mem::replace(&mut self.expect_continue, false)
    }

    /// Advance over the buffered input as far as possible
    ///
    /// Returns a request once one is complete. The parser is then ready
    /// for the next request; remaining buffered bytes belong to it.
    pub fn parse(&mut self, buf: &mut Tokenizer)
        -> Result<Option<Parsed>, Error>
    {
        use self::State::*;
        loop {
            match mem::replace(&mut self.state, Head) {
                Head => {
                    let parsed = match parse_head(&buf[..])? {
                        Some(parsed) => parsed,
                        None => return self.stall(buf),
                    };
                    let (head, body, expect, bytes) = parsed;
                    buf.consume(bytes);
                    self.consumed = bytes;
                    if expect {
                        self.expect_continue = true;
                    }
                    match body {
                        BodyKind::Chunked => {
                            self.state = ChunkSize { head };
                        }
                        BodyKind::Fixed(0) => {
                            return Ok(Some(self.finish(head)));
                        }
                        BodyKind::Fixed(length) => {
                            if bytes as u64 + length > self.limit as u64 {
                                return Err(Error::RequestTooLarge);
                            }
                            self.body.reserve(length as usize);
                            self.state = FixedBody {
                                head,
                                remaining: length as usize,
                            };
                        }
                    }
                }
                FixedBody { head, remaining } => {
                    let take = cmp::min(remaining, buf.len());
                    self.body.extend_from_slice(&buf[..take]);
                    buf.consume(take);
                    if remaining == take {
                        return Ok(Some(self.finish(head)));
                    }
                    self.state = FixedBody {
                        head,
                        remaining: remaining - take,
                    };
                    return Ok(None);
                }
                ChunkSize { head } => {
                    match httparse::parse_chunk_size(&buf[..])? {
                        httparse::Status::Partial => {
                            self.state = ChunkSize { head };
                            return self.stall(buf);
                        }
                        httparse::Status::Complete((bytes, size)) => {
                            buf.consume(bytes);
                            self.consumed += bytes;
                            if size == 0 {
                                self.state = Trailers { head };
                            } else {
                                let total = self.consumed as u64
                                    + self.body.len() as u64 + size;
                                if total > self.limit as u64 {
                                    return Err(Error::RequestTooLarge);
                                }
                                self.state = ChunkData {
                                    head,
                                    remaining: size as usize,
                                };
                            }
                        }
                    }
                }
                ChunkData { head, remaining } => {
                    let take = cmp::min(remaining, buf.len());
                    self.body.extend_from_slice(&buf[..take]);
                    buf.consume(take);
                    if remaining == take {
                        self.state = ChunkDelimiter { head };
                    } else {
                        self.state = ChunkData {
                            head,
                            remaining: remaining - take,
                        };
                        return Ok(None);
                    }
                }
                ChunkDelimiter { head } => {
                    if buf.len() < 2 {
                        self.state = ChunkDelimiter { head };
                        return Ok(None);
                    }
                    if buf.take(2) != b"\r\n" {
                        return Err(Error::MissingChunkDelimiter);
                    }
                    self.consumed += 2;
                    self.state = ChunkSize { head };
                }
                Trailers { mut head } => {
                    let mut trailers = [httparse::EMPTY_HEADER; MAX_HEADERS];
                    match httparse::parse_headers(&buf[..], &mut trailers)? {
                        httparse::Status::Partial => {
                            self.state = Trailers { head };
                            return self.stall(buf);
                        }
                        httparse::Status::Complete((bytes, parsed)) => {
                            for header in parsed {
                                head.headers.push(Header::new(
                                    header.name,
                                    str::from_utf8(header.value)?,
                                ));
                            }
                            buf.consume(bytes);
                            return Ok(Some(self.finish(head)));
                        }
                    }
                }
            }
        }
    }

    // The current state needs more bytes. If the request has already
    // accumulated up to the limit it can never complete.
    fn stall(&self, buf: &Tokenizer) -> Result<Option<Parsed>, Error> {
        if self.consumed + self.body.len() + buf.len() >= self.limit {
            return Err(Error::RequestTooLarge);
        }
        Ok(None)
    }

    fn finish(&mut self, head: Head) -> Parsed {
        self.consumed = 0;
        let body = mem::replace(&mut self.body, Vec::new());
        Parsed {
            request: Request::new(
                head.version, head.method, head.uri, head.headers, body),
            keep_alive: head.keep_alive,
        }
    }
}

fn parse_head(buf: &[u8])
    -> Result<Option<(Head, BodyKind, bool, usize)>, Error>
{
    let mut stack = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut heap;
    let mut raw = httparse::Request::new(&mut stack);
    let status = match raw.parse(buf) {
        Err(httparse::Error::TooManyHeaders) => {
            heap = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
            raw = httparse::Request::new(&mut heap);
            raw.parse(buf)?
        }
        other => other?,
    };
    let bytes = match status {
        httparse::Status::Complete(bytes) => bytes,
        httparse::Status::Partial => return Ok(None),
    };
    let (head, body, expect) = scan_head(&raw)?;
    Ok(Some((head, body, expect, bytes)))
}

// Implements the body length algorithm for requests:
// http://httpwg.github.io/specs/rfc7230.html#message.body.length
//
// 1. A valid `Transfer-Encoding` header with `chunked` as the last
//    encoding makes the request chunked.
// 2. Otherwise a valid `Content-Length` header gives the length in
//    octets.
// 3. If neither is present the request has an empty body.
//
// A request carrying both framings at once is rejected outright.
fn scan_head(raw: &httparse::Request)
    -> Result<(Head, BodyKind, bool), Error>
{
    // The fields are all present once parse() returned Complete
    let version = match raw.version.unwrap() {
        0 => Version::Http10,
        _ => Version::Http11,
    };
    let mut content_length = None;
    let mut chunked = false;
    let mut close = false;
    let mut keep = false;
    let mut expect = false;
    let mut headers = Vec::with_capacity(raw.headers.len());
    for header in raw.headers.iter() {
        let value = str::from_utf8(header.value)?;
        if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
            if let Some(last) = value.split(',').last() {
                if headers::is_chunked(last) {
                    chunked = true;
                }
            }
        } else if header.name.eq_ignore_ascii_case("Content-Length") {
            if content_length.is_some() {
                return Err(Error::DuplicateContentLength);
            }
            let length = value.trim().parse::<u64>()
                .map_err(|_| Error::ContentLengthInvalid)?;
            content_length = Some(length);
        } else if header.name.eq_ignore_ascii_case("Connection") {
            for part in value.split(',') {
                if headers::is_close(part) {
                    close = true;
                } else if headers::is_keep_alive(part) {
                    keep = true;
                }
            }
        } else if header.name.eq_ignore_ascii_case("Expect") {
            if headers::is_continue(value) {
                expect = true;
            }
        }
        headers.push(Header::new(header.name, value));
    }
    if chunked && content_length.is_some() {
        return Err(Error::ConflictingFraming);
    }
    let keep_alive = match version {
        Version::Http11 => !close,
        Version::Http10 => keep && !close,
    };
    let head = Head {
        version,
        method: raw.method.unwrap().to_string(),
        uri: raw.path.unwrap().to_string(),
        headers,
        keep_alive,
    };
    let body = match content_length {
        _ if chunked => BodyKind::Chunked,
        Some(length) => BodyKind::Fixed(length),
        None => BodyKind::Fixed(0),
    };
    Ok((head, body, expect))
}

#[cfg(test)]
mod test {
    use crate::error::Error;
    use crate::tokenizer::Tokenizer;
    use crate::version::Version;
    use super::{Parsed, Parser};

    fn parse_all(input: &[u8]) -> Result<Vec<Parsed>, Error> {
        let mut parser = Parser::new(65536);
        let mut buf = Tokenizer::new();
        buf.extend(input);
        let mut requests = Vec::new();
        while let Some(parsed) = parser.parse(&mut buf)? {
            requests.push(parsed);
        }
        assert!(buf.is_empty(), "residual bytes after parsing");
        Ok(requests)
    }

    fn parse_one(input: &[u8]) -> Parsed {
        let mut requests = parse_all(input).unwrap();
        assert_eq!(requests.len(), 1);
        requests.pop().unwrap()
    }

    #[test]
    fn minimal_get() {
        let parsed = parse_one(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(parsed.request.method(), "GET");
        assert_eq!(parsed.request.uri(), "/");
        assert_eq!(parsed.request.version(), Version::Http11);
        assert_eq!(parsed.request.header("host"), Some("x"));
        assert_eq!(parsed.request.body(), b"");
        assert!(parsed.keep_alive);
    }

    #[test]
    fn fixed_length_body() {
        let parsed = parse_one(
            b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(parsed.request.body(), b"hello");
    }

    #[test]
    fn pipelined_requests_in_order() {
        let requests = parse_all(concat!(
            "GET /1 HTTP/1.1\r\n\r\n",
            "GET /2 HTTP/1.1\r\n\r\n",
            "GET /3 HTTP/1.1\r\n\r\n").as_bytes()).unwrap();
        let uris: Vec<&str> = requests.iter()
            .map(|p| p.request.uri())
            .collect();
        assert_eq!(uris, ["/1", "/2", "/3"]);
    }

    #[test]
    fn chunked_body() {
        let parsed = parse_one(concat!(
            "POST /upload HTTP/1.1\r\n",
            "Transfer-Encoding: chunked\r\n",
            "\r\n",
            "5\r\nhello\r\n",
            "6\r\n world\r\n",
            "0\r\n\r\n").as_bytes());
        assert_eq!(parsed.request.body(), b"hello world");
    }

    #[test]
    fn chunked_trailers_are_appended_to_headers() {
        let parsed = parse_one(concat!(
            "POST / HTTP/1.1\r\n",
            "Transfer-Encoding: chunked\r\n",
            "\r\n",
            "3\r\nabc\r\n",
            "0\r\n",
            "X-Checksum: 900150983cd24fb0\r\n",
            "\r\n").as_bytes());
        assert_eq!(parsed.request.body(), b"abc");
        assert_eq!(parsed.request.header("x-checksum"),
                   Some("900150983cd24fb0"));
    }

    // Feeding the same stream a byte at a time must produce the same
    // request, no matter where the boundaries fall.
    #[test]
    fn byte_at_a_time() {
        let input = concat!(
            "POST /drip HTTP/1.1\r\n",
            "Transfer-Encoding: chunked\r\n",
            "\r\n",
            "5\r\nhello\r\n",
            "0\r\n\r\n");
        let mut parser = Parser::new(65536);
        let mut buf = Tokenizer::new();
        let mut result = None;
        for (i, byte) in input.bytes().enumerate() {
            buf.extend(&[byte]);
            if let Some(parsed) = parser.parse(&mut buf).unwrap() {
                assert_eq!(i, input.len() - 1);
                result = Some(parsed);
            }
        }
        let parsed = result.expect("request never completed");
        assert_eq!(parsed.request.uri(), "/drip");
        assert_eq!(parsed.request.body(), b"hello");
    }

    #[test]
    fn keep_alive_decision() {
        assert!(parse_one(b"GET / HTTP/1.1\r\n\r\n").keep_alive);
        assert!(!parse_one(
            b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").keep_alive);
        assert!(!parse_one(b"GET / HTTP/1.0\r\n\r\n").keep_alive);
        assert!(parse_one(
            b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").keep_alive);
        assert!(!parse_one(
            b"GET / HTTP/1.0\r\nConnection: keep-alive, close\r\n\r\n")
            .keep_alive);
    }

    #[test]
    fn expect_continue_is_flagged_after_headers() {
        let mut parser = Parser::new(65536);
        let mut buf = Tokenizer::new();
        buf.extend(concat!(
            "POST / HTTP/1.1\r\n",
            "Content-Length: 5\r\n",
            "Expect: 100-continue\r\n",
            "\r\n").as_bytes());
        assert!(parser.parse(&mut buf).unwrap().is_none());
        assert!(parser.take_expect_continue());
        assert!(!parser.take_expect_continue());
        buf.extend(b"hello");
        let parsed = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.request.body(), b"hello");
    }

    #[test]
    fn rejects_unknown_version() {
        assert!(matches!(
            parse_all(b"GET / HTTP/2.0\r\n\r\n"),
            Err(Error::ParseError(_))));
        assert!(matches!(
            parse_all(b"GET / TTMP/1.1\r\n\r\n"),
            Err(Error::ParseError(_))));
    }

    #[test]
    fn rejects_malformed_request_line() {
        assert!(parse_all(b"GET /\r\n\r\n").is_err());
        assert!(parse_all(b"GET / EXTRA HTTP/1.1\r\n\r\n").is_err());
    }

    #[test]
    fn rejects_duplicate_content_length() {
        assert!(matches!(
            parse_all(concat!(
                "POST / HTTP/1.1\r\n",
                "Content-Length: 3\r\n",
                "Content-Length: 3\r\n",
                "\r\nabc").as_bytes()),
            Err(Error::DuplicateContentLength)));
    }

    #[test]
    fn rejects_conflicting_framing() {
        assert!(matches!(
            parse_all(concat!(
                "POST / HTTP/1.1\r\n",
                "Content-Length: 3\r\n",
                "Transfer-Encoding: chunked\r\n",
                "\r\n").as_bytes()),
            Err(Error::ConflictingFraming)));
    }

    #[test]
    fn rejects_bad_chunk_size() {
        assert!(matches!(
            parse_all(concat!(
                "POST / HTTP/1.1\r\n",
                "Transfer-Encoding: chunked\r\n",
                "\r\n",
                "zz\r\n").as_bytes()),
            Err(Error::ChunkParseError(_))));
    }

    #[test]
    fn rejects_missing_crlf_after_chunk_data() {
        assert!(matches!(
            parse_all(concat!(
                "POST / HTTP/1.1\r\n",
                "Transfer-Encoding: chunked\r\n",
                "\r\n",
                "3\r\nabcXX").as_bytes()),
            Err(Error::MissingChunkDelimiter)));
    }

    #[test]
    fn oversized_head_is_fatal() {
        let mut parser = Parser::new(64);
        let mut buf = Tokenizer::new();
        buf.extend(&[b'x'; 64]);
        assert!(matches!(
            parser.parse(&mut buf),
            Err(Error::RequestTooLarge)));
    }

    #[test]
    fn oversized_declared_body_is_fatal() {
        let input = b"POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\n";
        let mut parser = Parser::new(64);
        let mut buf = Tokenizer::new();
        buf.extend(input);
        assert!(matches!(
            parser.parse(&mut buf),
            Err(Error::RequestTooLarge)));
    }

    #[test]
    fn oversized_chunked_body_is_fatal() {
        let mut parser = Parser::new(64);
        let mut buf = Tokenizer::new();
        buf.extend(concat!(
            "POST / HTTP/1.1\r\n",
            "Transfer-Encoding: chunked\r\n",
            "\r\n").as_bytes());
        assert!(parser.parse(&mut buf).unwrap().is_none());
        buf.extend(b"ff\r\n");
        assert!(matches!(
            parser.parse(&mut buf),
            Err(Error::RequestTooLarge)));
    }

    #[test]
    fn leaves_next_request_in_the_buffer() {
        let mut parser = Parser::new(65536);
        let mut buf = Tokenizer::new();
        buf.extend(b"GET /a HTTP/1.1\r\n\r\nGET /b");
        let parsed = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.request.uri(), "/a");
        assert_eq!(&buf[..], b"GET /b");
        assert!(parser.parse(&mut buf).unwrap().is_none());
    }
}
