use std::cmp;
use std::collections::VecDeque;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::panic::{self, AssertUnwindSafe};

use mio::net::TcpStream;

use crate::error::Error;
use crate::handler::{Handler, ResponseSender};
use crate::logger::Logger;
use crate::parser::Parser;
use crate::reactor::{Expiry, Scope};
use crate::response::Response;
use crate::scheduler::TimerToken;
use crate::serializer;
use crate::tokenizer::Tokenizer;

/// Number of requests that may be in flight on one connection before
/// reading pauses
pub(crate) const PIPELINE_DEPTH: usize = 256;

const CONTINUE_LINE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

// One in-flight request. Filled out of order by handler completions,
// drained strictly from the front so responses leave in request order.
struct Slot {
    seq: u64,
    keep_alive: bool,
    response: Option<Response>,
}

/// Per-socket state machine: read buffer -> parser -> handler ->
/// pipeline -> serializer -> write buffer -> socket
///
/// Owned by exactly one reactor for its whole lifetime. The selector is
/// edge-triggered, so both directions are drained until `WouldBlock`
/// and the readiness learned that way (`can_write`) is remembered
/// between events.
pub(crate) struct Connection {
    id: u64,
    token: usize,
    stream: TcpStream,
    peer: SocketAddr,
    input: Tokenizer,
    parser: Parser,
    pipeline: VecDeque<Slot>,
    next_seq: u64,
    output: Tokenizer,
    /// Read side reached end of stream
    eof: bool,
    /// A close-policy response was serialized; drain and close
    half_closed: bool,
    /// Reading is suspended until the pipeline shrinks
    paused: bool,
    can_write: bool,
    timer: TimerToken,
    done: Option<&'static str>,
}

impl Connection {
    pub fn new(id: u64, token: usize, stream: TcpStream, peer: SocketAddr,
        timer: TimerToken, max_request_size: usize)
        -> Connection
    {
        Connection {
            id,
            token,
            stream,
            peer,
            input: Tokenizer::new(),
            parser: Parser::new(max_request_size),
            pipeline: VecDeque::new(),
            next_seq: 0,
            output: Tokenizer::new(),
            eof: false,
            half_closed: false,
            paused: false,
            can_write: false,
            timer,
            done: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
    pub fn timer(&self) -> TimerToken {
        self.timer
    }
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
    /// The reason this connection wants to be closed, once it does
    pub fn done(&self) -> Option<&'static str> {
        self.done
    }

    /// The socket became readable: pull bytes, drive the parser, hand
    /// complete requests to the handler
    pub fn readable(&mut self, scope: &mut Scope) -> Result<(), Error> {
        loop {
            if self.paused || self.half_closed || self.eof {
                break;
            }
            let room = scope.options.max_request_size - self.input.len();
            if room == 0 {
                // The parser either frees the buffer or reports the
                // request as oversized.
                self.advance(scope)?;
                continue;
            }
            let chunk = cmp::min(room, cmp::max(1, scope.options.read_buffer_size));
            match self.input.read_from(&mut self.stream, chunk) {
                Ok(0) => {
                    self.eof = true;
                }
                Ok(_) => self.advance(scope)?,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.flush(scope)
    }

    /// The socket became writable again: drain pending output
    pub fn writable(&mut self, scope: &mut Scope) -> Result<(), Error> {
        self.can_write = true;
        self.flush(scope)
    }

    /// A handler completed the request in slot `seq`
    ///
    /// Runs on the owning reactor thread (the sender posted through the
    /// cross-thread queue). Completions for unknown slots are dropped.
    pub fn complete(&mut self, seq: u64, response: Response,
        scope: &mut Scope)
        -> Result<(), Error>
    {
        match self.pipeline.iter_mut().find(|slot| slot.seq == seq) {
            Some(slot) => slot.response = Some(response),
            None => {
                trace!("connection {}: dropping completion for stale \
                        slot {}", self.id, seq);
                return Ok(());
            }
        }
        self.pump(scope)
    }

    /// Last chance to get buffered responses out during server shutdown
    pub fn final_flush(&mut self) {
        while !self.output.is_empty() {
            match self.output.write_to(&mut self.stream) {
                Ok(0) => break,
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    }

    // Drive the parser over whatever is buffered, spawning handler
    // invocations for each complete request.
    fn advance(&mut self, scope: &mut Scope) -> Result<(), Error> {
        while !self.paused && !self.half_closed {
            let parsed = self.parser.parse(&mut self.input)?;
            if self.parser.take_expect_continue() {
                // Interim response goes out before the body is read,
                // ahead of the final response.
                self.output.extend(CONTINUE_LINE);
            }
            let parsed = match parsed {
                Some(parsed) => parsed,
                None => break,
            };
            self.reschedule(scope);
            if scope.logger.enabled() {
                scope.logger.log("request", &[
                    ("conn", self.id.to_string()),
                    ("method", parsed.request.method().to_string()),
                    ("uri", parsed.request.uri().to_string()),
                    ("version", parsed.request.version().to_string()),
                ]);
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            self.pipeline.push_back(Slot {
                seq,
                keep_alive: parsed.keep_alive,
                response: None,
            });
            if self.pipeline.len() >= PIPELINE_DEPTH {
                self.paused = true;
            }
            let sender = ResponseSender::new(
                scope.mailbox.clone(), self.token, self.id, seq);
            let handler = scope.handler;
            let request = parsed.request;
            if panic::catch_unwind(
                AssertUnwindSafe(|| handler.handle(request, sender))).is_err()
            {
                // The slot stays empty and the idle timeout will
                // eventually close the connection.
                error!("handler panicked; connection {} stalls until \
                        timeout", self.id);
            }
        }
        Ok(())
    }

    // Serialize every response that reached the head of the pipeline.
    fn pump(&mut self, scope: &mut Scope) -> Result<(), Error> {
        while !self.half_closed {
            match self.pipeline.front() {
                Some(slot) if slot.response.is_some() => {}
                _ => break,
            }
            let slot = match self.pipeline.pop_front() {
                Some(slot) => slot,
                None => break,
            };
            let response = match slot.response {
                Some(response) => response,
                None => break,
            };
            let before = self.output.len();
            serializer::serialize(&response, !slot.keep_alive,
                &mut self.output);
            if scope.logger.enabled() {
                scope.logger.log("response", &[
                    ("conn", self.id.to_string()),
                    ("status", response.status().to_string()),
                    ("bytes", (self.output.len() - before).to_string()),
                ]);
            }
            if !slot.keep_alive {
                self.half_closed = true;
            }
        }
        if self.paused && !self.half_closed
            && self.pipeline.len() < PIPELINE_DEPTH
        {
            self.paused = false;
            // Catch up on input that arrived while reading was paused.
            return self.readable(scope);
        }
        self.flush(scope)
    }

    // Drain the write buffer as far as the socket allows. The cursor
    // only moves forward; on a full drain the idle timeout restarts and
    // a half-closed connection is finished off.
    fn flush(&mut self, scope: &mut Scope) -> Result<(), Error> {
        let mut wrote = false;
        while self.can_write && !self.output.is_empty() {
            match self.output.write_to(&mut self.stream) {
                Ok(0) => {
                    return Err(io::Error::from(io::ErrorKind::WriteZero)
                        .into());
                }
                Ok(_) => wrote = true,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.can_write = false;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if wrote && self.output.is_empty() {
            self.reschedule(scope);
            if self.half_closed {
                let _ = self.stream.shutdown(Shutdown::Write);
            }
        }
        self.settle();
        Ok(())
    }

    // Decide whether the connection is finished: everything written and
    // either the final close-policy response went out, or the peer hung
    // up with nothing left to answer.
    fn settle(&mut self) {
        if !self.output.is_empty() {
            return;
        }
        if self.half_closed {
            self.done = Some("response_done");
        } else if self.eof && self.pipeline.is_empty() {
            self.done = Some("eof");
        }
    }

    // Push the idle deadline forward; there is exactly one scheduler
    // entry per connection at any time.
    fn reschedule(&mut self, scope: &mut Scope) {
        scope.scheduler.cancel(self.timer);
        self.timer = scope.scheduler.insert(
            scope.now + scope.options.request_timeout,
            Expiry { token: self.token, conn: self.id },
        );
    }
}
