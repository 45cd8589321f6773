use crate::version::Version;

/// A single HTTP header
///
/// Header names compare case-insensitively; values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    pub fn new<N, V>(name: N, value: V) -> Header
        where N: Into<String>, V: Into<String>,
    {
        Header {
            name: name.into(),
            value: value.into(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn value(&self) -> &str {
        &self.value
    }
    pub(crate) fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A fully received request
///
/// The request is materialized before the handler sees it: the body is
/// complete and chunked framing is already decoded (trailers, if any,
/// are appended to the header list). The value is immutable once handed
/// to the handler.
#[derive(Debug)]
pub struct Request {
    version: Version,
    method: String,
    uri: String,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl Request {
    pub(crate) fn new(version: Version, method: String, uri: String,
        headers: Vec<Header>, body: Vec<u8>)
        -> Request
    {
        Request { version, method, uri, headers, body }
    }

    pub fn version(&self) -> Version {
        self.version
    }
    pub fn method(&self) -> &str {
        &self.method
    }
    /// The request target exactly as it appeared on the request line
    pub fn uri(&self) -> &str {
        &self.uri
    }
    /// Headers in the order they arrived on the wire
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }
    pub fn body(&self) -> &[u8] {
        &self.body
    }
    /// Value of the first header with the given name, compared
    /// case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|h| h.is(name))
            .map(|h| h.value())
    }
}
