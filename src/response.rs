use crate::request::Header;

/// A response produced by the application handler
///
/// The serializer appends at most two headers when they are absent:
/// `Content-Length` (set to the body length, unless the response carries
/// `Transfer-Encoding: chunked`) and `Connection: close` (when the
/// request decided against keep-alive). The value itself is never
/// modified by the server.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: String,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl Response {
    pub fn new<R>(status: u16, reason: R, headers: Vec<Header>, body: Vec<u8>)
        -> Response
        where R: Into<String>,
    {
        Response {
            status,
            reason: reason.into(),
            headers,
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }
    pub fn reason(&self) -> &str {
        &self.reason
    }
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
