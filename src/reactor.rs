use std::cmp;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;

use crate::connection::Connection;
use crate::error::Error;
use crate::handler::Handler;
use crate::logger::Logger;
use crate::options::Options;
use crate::response::Response;
use crate::scheduler::Scheduler;

pub(crate) const LISTENER: Token = Token(0);
pub(crate) const WAKER: Token = Token(1);
// Connection tokens start past the two reserved ones
const CONN_START: usize = 2;

const EVENTS_CAPACITY: usize = 1024;

/// Work posted to a reactor from outside its thread: a freshly accepted
/// socket, a handler completion, or the stop signal.
pub(crate) enum Action {
    Register(TcpStream, SocketAddr),
    Complete {
        token: usize,
        conn: u64,
        seq: u64,
        response: Response,
    },
    Stop,
}

/// Sending half of a reactor's cross-thread queue
///
/// The queue is the only state shared across reactor boundaries. Every
/// send wakes the selector, so work posted while the reactor sleeps is
/// picked up immediately, and work posted mid-cycle is observed in the
/// same cycle's drain step.
#[derive(Clone)]
pub(crate) struct Mailbox {
    tx: Sender<Action>,
    waker: Arc<Waker>,
}

impl Mailbox {
    pub fn new(tx: Sender<Action>, waker: Arc<Waker>) -> Mailbox {
        Mailbox { tx, waker }
    }
    pub fn send(&self, action: Action) {
        // A send only fails after the reactor is gone; the action is
        // dropped along with it.
        if self.tx.send(action).is_ok() {
            let _ = self.waker.wake();
        }
    }
}

/// Scheduler task: the idle timeout of one connection
#[derive(Debug, Clone, Copy)]
pub(crate) struct Expiry {
    pub token: usize,
    pub conn: u64,
}

/// What a connection may reach of its reactor while being driven
pub(crate) struct Scope<'a> {
    pub scheduler: &'a mut Scheduler<Expiry>,
    pub options: &'a Options,
    pub handler: &'a dyn Handler,
    pub logger: &'a dyn Logger,
    pub mailbox: &'a Mailbox,
    pub now: Instant,
}

/// A single-threaded event loop owning a set of connections
///
/// One reactor (the first) additionally owns the listening socket and
/// deals accepted connections round-robin to the whole group, itself
/// included, through the cross-thread queues.
pub(crate) struct Reactor {
    index: usize,
    poll: Poll,
    scheduler: Scheduler<Expiry>,
    conns: Slab<Connection>,
    rx: Receiver<Action>,
    peers: Vec<Mailbox>,
    next_peer: usize,
    next_conn: u64,
    listener: Option<TcpListener>,
    options: Arc<Options>,
    handler: Arc<dyn Handler>,
    logger: Arc<dyn Logger>,
}

impl Reactor {
    pub fn new(index: usize, poll: Poll, rx: Receiver<Action>,
        peers: Vec<Mailbox>, listener: Option<TcpListener>,
        options: Arc<Options>, handler: Arc<dyn Handler>,
        logger: Arc<dyn Logger>)
        -> Reactor
    {
        Reactor {
            index,
            poll,
            scheduler: Scheduler::new(),
            conns: Slab::new(),
            rx,
            next_peer: 0,
            // Connection ids are striped across reactors so they stay
            // unique in the logs.
            next_conn: index as u64,
            peers,
            listener,
            options,
            handler,
            logger,
        }
    }

    /// Run until the stop signal or a selector failure
    pub fn run(mut self) {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        debug!("reactor {} running", self.index);
        loop {
            let timeout = self.poll_timeout();
            match self.poll.poll(&mut events, Some(timeout)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                    continue;
                }
                Err(e) => {
                    // Fatal to this reactor only; siblings keep going.
                    error!("reactor {}: selector failure: {}",
                        self.index, e);
                    break;
                }
            }
            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    WAKER => {}
                    token => {
                        let key = token.0 - CONN_START;
                        if event.is_writable() {
                            self.drive(key, |conn, scope| {
                                conn.writable(scope)
                            });
                        }
                        if event.is_readable() || event.is_read_closed() {
                            self.drive(key, |conn, scope| {
                                conn.readable(scope)
                            });
                        }
                    }
                }
            }
            if !self.drain() {
                break;
            }
            self.expire();
        }
        self.shutdown();
    }

    // Sleep until the next deadline, but never longer than the
    // configured resolution.
    fn poll_timeout(&mut self) -> Duration {
        let resolution = self.options.resolution;
        match self.scheduler.next_deadline() {
            Some(deadline) => cmp::min(
                deadline.saturating_duration_since(Instant::now()),
                resolution),
            None => resolution,
        }
    }

    fn accept(&mut self) {
        loop {
            let listener = match self.listener.as_ref() {
                Some(listener) => listener,
                None => return,
            };
            match listener.accept() {
                Ok((stream, peer)) => {
                    let target = self.next_peer;
                    self.next_peer = (self.next_peer + 1) % self.peers.len();
                    if target == self.index {
                        self.register(stream, peer);
                    } else {
                        self.peers[target].send(Action::Register(stream, peer));
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("reactor {}: accept failed: {}", self.index, e);
                    return;
                }
            }
        }
    }

    // Adopt an accepted socket: register it with the selector, start
    // its idle timeout, and log the arrival.
    fn register(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        if self.options.tcp_nodelay {
            let _ = stream.set_nodelay(true);
        }
        let id = self.next_conn;
        self.next_conn += self.peers.len() as u64;
        let entry = self.conns.vacant_entry();
        let key = entry.key();
        if let Err(e) = self.poll.registry().register(&mut stream,
            Token(CONN_START + key),
            Interest::READABLE | Interest::WRITABLE)
        {
            warn!("reactor {}: cannot register connection: {}",
                self.index, e);
            return;
        }
        let timer = self.scheduler.insert(
            Instant::now() + self.options.request_timeout,
            Expiry { token: key, conn: id });
        entry.insert(Connection::new(id, key, stream, peer, timer,
            self.options.max_request_size));
        if self.logger.enabled() {
            self.logger.log("accepted", &[
                ("conn", id.to_string()),
                ("peer", peer.to_string()),
            ]);
        }
    }

    // Run one connection operation and settle the aftermath: errors and
    // finished connections both end in close, everything else keeps the
    // connection registered.
    fn drive<F>(&mut self, key: usize, operation: F)
        where F: FnOnce(&mut Connection, &mut Scope) -> Result<(), Error>
    {
        let verdict = {
            let Reactor {
                ref mut conns,
                ref mut scheduler,
                ref options,
                ref handler,
                ref logger,
                ref peers,
                index,
                ..
            } = *self;
            let conn = match conns.get_mut(key) {
                Some(conn) => conn,
                None => return,
            };
            let mut scope = Scope {
                scheduler,
                options,
                handler: &**handler,
                logger: &**logger,
                mailbox: &peers[index],
                now: Instant::now(),
            };
            match operation(conn, &mut scope) {
                Ok(()) => conn.done(),
                Err(e) => {
                    let event = error_event(&e);
                    if scope.logger.enabled() {
                        scope.logger.log(event, &[
                            ("conn", conn.id().to_string()),
                            ("error", e.to_string()),
                        ]);
                    }
                    Some(event)
                }
            }
        };
        if let Some(reason) = verdict {
            self.close(key, reason);
        }
    }

    // Execute everything foreign threads left in the queue. Returns
    // false once the stop signal is seen.
    fn drain(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(Action::Register(stream, peer)) => {
                    self.register(stream, peer);
                }
                Ok(Action::Complete { token, conn, seq, response }) => {
                    self.complete(token, conn, seq, response);
                }
                Ok(Action::Stop) => return false,
                Err(TryRecvError::Empty)
                | Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn complete(&mut self, key: usize, conn: u64, seq: u64,
        response: Response)
    {
        match self.conns.get(key) {
            Some(c) if c.id() == conn => {}
            _ => {
                // The connection is gone (timeout, error, slab reuse);
                // late completions are dropped on the floor.
                trace!("reactor {}: discarding completion for \
                        connection {}", self.index, conn);
                return;
            }
        }
        self.drive(key, move |c, scope| c.complete(seq, response, scope));
    }

    fn expire(&mut self) {
        let now = Instant::now();
        while let Some(expiry) = self.scheduler.pop_due(now) {
            match self.conns.get(expiry.token) {
                Some(conn) if conn.id() == expiry.conn => {}
                _ => continue,
            }
            if self.logger.enabled() {
                self.logger.log("timeout", &[
                    ("conn", expiry.conn.to_string()),
                ]);
            }
            self.close(expiry.token, "timeout");
        }
    }

    fn close(&mut self, key: usize, reason: &'static str) {
        if !self.conns.contains(key) {
            return;
        }
        let mut conn = self.conns.remove(key);
        self.scheduler.cancel(conn.timer());
        let _ = self.poll.registry().deregister(conn.stream_mut());
        if self.logger.enabled() {
            self.logger.log("closed", &[
                ("conn", conn.id().to_string()),
                ("peer", conn.peer().to_string()),
                ("reason", reason.to_string()),
            ]);
        }
    }

    // Orderly shutdown: flush what is already serialized, then drop
    // everything.
    fn shutdown(&mut self) {
        let keys: Vec<usize> = self.conns.iter().map(|(key, _)| key).collect();
        for key in keys {
            if let Some(conn) = self.conns.get_mut(key) {
                conn.final_flush();
            }
            self.close(key, "shutdown");
        }
        if let Some(mut listener) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut listener);
        }
        debug!("reactor {} stopped", self.index);
    }
}

fn error_event(error: &Error) -> &'static str {
    match *error {
        Error::Io(_) => "io_error",
        Error::RequestTooLarge => "overflow",
        _ => "parse_error",
    }
}
