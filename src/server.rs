use std::cmp;
use std::io;
use std::net::{self, IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::unbounded;
use mio::net::TcpListener;
use mio::{Interest, Poll, Waker};
use socket2::{Domain, Protocol, Socket, Type};

use crate::handler::Handler;
use crate::logger::{DebugLogger, Logger};
use crate::options::Options;
use crate::reactor::{Action, Mailbox, Reactor, LISTENER, WAKER};

/// The server supervisor
///
/// Binds the listening socket once and runs `options.concurrency`
/// reactors, each a single thread multiplexing its own set of
/// connections. The first reactor owns the listener and deals accepted
/// sockets round-robin to the whole group, which keeps the distribution
/// deterministic for a given configuration.
pub struct Server {
    options: Arc<Options>,
    handler: Arc<dyn Handler>,
    logger: Arc<dyn Logger>,
    mailboxes: Vec<Mailbox>,
    threads: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new<H: Handler>(options: Arc<Options>, handler: H) -> Server {
        Server {
            options,
            handler: Arc::new(handler),
            logger: Arc::new(DebugLogger),
            mailboxes: Vec::new(),
            threads: Vec::new(),
            local_addr: None,
        }
    }

    /// Replace the default `DebugLogger`; call before `start()`
    pub fn logger<L: Logger>(&mut self, logger: L) -> &mut Self {
        self.logger = Arc::new(logger);
        self
    }

    /// The bound address, available once `start()` returned
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and spawn the reactor threads
    pub fn start(&mut self) -> io::Result<()> {
        if !self.threads.is_empty() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists,
                "server already started"));
        }
        let std_listener = bind_listener(&self.options)?;
        self.local_addr = Some(std_listener.local_addr()?);
        let mut listener = TcpListener::from_std(std_listener);

        let count = cmp::max(1, self.options.concurrency);
        let mut polls = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        self.mailboxes.clear();
        for _ in 0..count {
            let poll = Poll::new()?;
            let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
            let (tx, rx) = unbounded();
            self.mailboxes.push(Mailbox::new(tx, waker));
            polls.push(poll);
            receivers.push(rx);
        }
        polls[0].registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let mut listener = Some(listener);
        for (index, (poll, rx)) in
            polls.into_iter().zip(receivers).enumerate()
        {
            let reactor = Reactor::new(
                index,
                poll,
                rx,
                self.mailboxes.clone(),
                if index == 0 { listener.take() } else { None },
                self.options.clone(),
                self.handler.clone(),
                self.logger.clone(),
            );
            let thread = thread::Builder::new()
                .name(format!("http-reactor-{}", index))
                .spawn(move || reactor.run())?;
            self.threads.push(thread);
        }
        Ok(())
    }

    /// Ask every reactor to stop
    ///
    /// Already-serialized responses are flushed best-effort, then all
    /// connections and the listener are closed.
    pub fn stop(&self) {
        for mailbox in &self.mailboxes {
            mailbox.send(Action::Stop);
        }
    }

    /// Wait for the reactor threads to finish
    pub fn join(&mut self) {
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                error!("reactor thread panicked");
            }
        }
    }
}

// The listener is created through socket2 so the socket options are
// applied between socket() and bind().
fn bind_listener(options: &Options) -> io::Result<net::TcpListener> {
    let addr = resolve(options)?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM,
        Some(Protocol::TCP))?;
    socket.set_reuse_address(options.reuse_addr)?;
    #[cfg(unix)]
    {
        if options.reuse_port {
            socket.set_reuse_port(true)?;
        }
    }
    socket.bind(&addr.into())?;
    socket.listen(options.accept_length as i32)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn resolve(options: &Options) -> io::Result<SocketAddr> {
    if options.host.is_empty() {
        return Ok(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED), options.port));
    }
    (options.host.as_str(), options.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable,
            "host did not resolve to any address"))
}
