//! A minimal event-driven HTTP/1.x server
//!
//! Requests and responses are fully materialized in memory, which keeps
//! every buffer bounded and the core small: a handful of reactor
//! threads multiplex non-blocking sockets, an incremental parser turns
//! bytes into complete [`Request`] values, the application [`Handler`]
//! answers through a [`ResponseSender`] from any thread it likes, and
//! pipelined responses always leave in request order.
//!
//! TLS, HTTP/2 and body streaming are out of scope; put a proxy in
//! front if you need them.

#[macro_use] extern crate log;
#[macro_use] extern crate quick_error;

mod connection;
mod error;
mod handler;
mod headers;
mod logger;
mod options;
mod parser;
mod reactor;
mod request;
mod response;
mod scheduler;
mod serializer;
mod server;
mod tokenizer;
mod version;

pub use crate::error::Error;
pub use crate::handler::{Handler, ResponseSender};
pub use crate::logger::{DebugLogger, Logger, NopLogger};
pub use crate::options::Options;
pub use crate::request::{Header, Request};
pub use crate::response::Response;
pub use crate::server::Server;
pub use crate::version::Version;
