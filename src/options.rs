use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Fine-grained configuration of the HTTP server
///
/// All fields have defaults. Configure with the setter methods and seal
/// the result with `done()`:
///
/// ```
/// use spindle_http::Options;
///
/// let options = Options::new()
///     .port(8080)
///     .concurrency(2)
///     .done();
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) reuse_addr: bool,
    pub(crate) reuse_port: bool,
    pub(crate) accept_length: u32,
    pub(crate) concurrency: usize,
    pub(crate) max_request_size: usize,
    pub(crate) read_buffer_size: usize,
    pub(crate) resolution: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) tcp_nodelay: bool,
}

impl Options {
    /// Create options with the defaults
    pub fn new() -> Options {
        Options {
            host: String::new(),
            port: 8080,
            reuse_addr: true,
            reuse_port: false,
            accept_length: 1024,
            concurrency: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_request_size: 1 << 20,
            read_buffer_size: 16 << 10,
            resolution: Duration::from_millis(100),
            request_timeout: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }

    /// Address to bind to, an empty string means the wildcard address
    pub fn host(&mut self, value: &str) -> &mut Self {
        self.host = value.to_string();
        self
    }

    /// TCP port to listen on
    ///
    /// Port zero binds an ephemeral port; the actual address is available
    /// from `Server::local_addr()` after `start()`.
    pub fn port(&mut self, value: u16) -> &mut Self {
        self.port = value;
        self
    }

    /// Set SO_REUSEADDR on the listening socket
    pub fn reuse_addr(&mut self, value: bool) -> &mut Self {
        self.reuse_addr = value;
        self
    }

    /// Set SO_REUSEPORT on the listening socket (unix only, ignored
    /// elsewhere)
    pub fn reuse_port(&mut self, value: bool) -> &mut Self {
        self.reuse_port = value;
        self
    }

    /// Length of the accept queue of the listening socket
    pub fn accept_length(&mut self, value: u32) -> &mut Self {
        self.accept_length = value;
        self
    }

    /// Number of reactor threads sharing the listening socket
    ///
    /// Values below one are treated as one. Defaults to the number of
    /// available CPUs.
    pub fn concurrency(&mut self, value: usize) -> &mut Self {
        self.concurrency = value;
        self
    }

    /// Hard cap on the number of bytes a single request may occupy,
    /// head and body together
    ///
    /// A request that exceeds the cap closes the connection without a
    /// response, because the request may be only partially received.
    pub fn max_request_size(&mut self, value: usize) -> &mut Self {
        self.max_request_size = value;
        self
    }

    /// Number of bytes read from a socket per read call
    pub fn read_buffer_size(&mut self, value: usize) -> &mut Self {
        self.read_buffer_size = value;
        self
    }

    /// Tick granularity of the timeout scheduler
    ///
    /// This is the upper bound on how long the reactor sleeps when no
    /// deadline is nearer, and therefore on how late a timeout may fire.
    pub fn resolution(&mut self, value: Duration) -> &mut Self {
        self.resolution = value;
        self
    }

    /// Idle timeout of a connection
    ///
    /// The clock restarts on accept, whenever a full request is parsed
    /// and whenever the write buffer drains to the socket.
    pub fn request_timeout(&mut self, value: Duration) -> &mut Self {
        self.request_timeout = value;
        self
    }

    /// Set TCP_NODELAY on accepted sockets
    pub fn tcp_nodelay(&mut self, value: bool) -> &mut Self {
        self.tcp_nodelay = value;
        self
    }

    /// Create an Arc'd options clone to pass to the server constructor
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Arc<Options> {
        Arc::new(self.clone())
    }
}

impl Default for Options {
    fn default() -> Options {
        Options::new()
    }
}
