use crate::reactor::{Action, Mailbox};
use crate::request::Request;
use crate::response::Response;

/// The application side of the server
///
/// `handle` runs on the reactor thread owning the connection and must
/// not block it: either produce the response before returning, or move
/// the sender somewhere else (a worker pool, another thread) and
/// complete later. The pipeline keeps responses in request order no
/// matter when or where they complete.
///
/// Implemented for plain closures too:
///
/// ```no_run
/// use spindle_http::{Options, Request, Response, ResponseSender, Server};
///
/// let mut server = Server::new(Options::new().done(),
///     |_request: Request, sender: ResponseSender| {
///         sender.send(Response::new(200, "OK", Vec::new(),
///             b"hello".to_vec()));
///     });
/// server.start().unwrap();
/// server.join();
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request, sender: ResponseSender);
}

impl<F> Handler for F
    where F: Fn(Request, ResponseSender) + Send + Sync + 'static,
{
    fn handle(&self, request: Request, sender: ResponseSender) {
        self(request, sender)
    }
}

/// Completion callback for a single request
///
/// Consumed by `send`, so a response cannot be delivered twice for the
/// same request. Dropping the sender without sending leaves the pipeline
/// slot empty; the connection stalls on it until the idle timeout closes
/// it. A sender may outlive its connection; the completion is then
/// quietly discarded.
pub struct ResponseSender {
    mailbox: Mailbox,
    token: usize,
    conn: u64,
    seq: u64,
}

impl ResponseSender {
    pub(crate) fn new(mailbox: Mailbox, token: usize, conn: u64, seq: u64)
        -> ResponseSender
    {
        ResponseSender { mailbox, token, conn, seq }
    }

    /// Deliver the response, from any thread
    pub fn send(self, response: Response) {
        self.mailbox.send(Action::Complete {
            token: self.token,
            conn: self.conn,
            seq: self.seq,
            response,
        });
    }
}
