//! Host adapter: a small HTTP/1.1 server on the `may` coroutine runtime
//! that feeds requests into a [`ServiceHandler`](crate::service::ServiceHandler).
//!
//! One coroutine serves each connection; the core itself never blocks beyond
//! the request I/O. TLS termination is the embedding host's concern and is
//! not handled here.

mod http_server;
mod request;
mod writer;

pub use http_server::HttpServer;
