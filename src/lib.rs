//! sluice - synchronous HTTP/1.x and WebSocket request engine
//!
//! The engine sits between a transport that already tokenizes the wire
//! (start line, headers, de-chunked body, decoded WebSocket frames) and
//! application handlers. For every connection it assembles requests,
//! dispatches them, and writes responses with a consistent caching and
//! cookie policy.
//!
//! # Features
//!
//! - **Request model** - normalized paths, query maps, path-ordered cookies,
//!   `If-Modified-Since`, keep-alive and gzip negotiation
//! - **Streaming POST bodies** - url-encoded and `multipart/form-data`,
//!   spilling large parts to connection-private temporary files
//! - **Responses** - buffers, files (zero-copy on plain transports) and
//!   chunked streams, each released exactly once
//! - **Typed failures** - [`HttpError`] renders itself, or through an error
//!   handler registered for its [`ErrorKind`]
//! - **WebSocket** - RFC 6455 handshake, ping/pong and close handling
//!
//! # Examples
//!
//! ```
//! use sluice::{
//!     ConnInfo, Engine, Event, Handled, HttpError, Request, RequestHead, Response, StatusCode,
//!     WriteSink,
//! };
//!
//! let engine = Engine::builder()
//!     .handler(|req: &mut Request| -> Handled {
//!         match req.url().segments().collect::<Vec<_>>().as_slice() {
//!             ["api", user, "name"] => Ok(Some(Response::text(StatusCode::Ok, user.to_string()))),
//!             ["api", _, "secret"] => Err(HttpError::Forbidden),
//!             _ => Ok(None),
//!         }
//!     })
//!     .build();
//!
//! let mut conn = engine.connection(ConnInfo::default(), WriteSink::new(Vec::new()));
//! conn.on_event(Event::Head(RequestHead::new("GET", "/api/ada/name", "HTTP/1.1")));
//! conn.on_event(Event::End);
//!
//! let written = conn.into_sink().into_inner().unwrap();
//! assert!(written.ends_with(b"\r\n\r\nada"));
//! ```
//!
//! Advanced configuration:
//! ```
//! use sluice::{limits::{ConnLimits, ReqLimits, RespLimits}, Engine};
//! use std::time::Duration;
//!
//! let engine = Engine::builder()
//!     .connection_limits(ConnLimits {
//!         continue_timeout: Duration::from_secs(10),
//!         max_requests_per_connection: 10_000,
//!         ..ConnLimits::default()
//!     })
//!     .request_limits(ReqLimits {
//!         memory_threshold: 64 * 1024, // Larger in-memory form fields
//!         ..ReqLimits::default()
//!     })
//!     .response_limits(RespLimits {
//!         server_name: "edge".into(),
//!         ..RespLimits::default()
//!     })
//!     .build();
//! ```

pub(crate) mod http {
    pub mod cookie;
    pub mod date;
    pub mod mime;
    pub mod query;
    pub mod url;
    pub mod utf8;

    pub(crate) mod body;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
    pub(crate) mod upload;
    pub(crate) mod websocket;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod engine;
    pub(crate) mod events;
    pub(crate) mod handler;
    pub(crate) mod sink;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::{BoxError, ErrorKind, HttpError},
    http::{
        cookie, date, mime, query,
        request::Request,
        response::{
            write::{BodyWriter, WriteBuffer},
            Body, Handled, Response, ONE_YEAR,
        },
        types::{Header, Method, StatusCode, Version},
        upload::FileUpload,
        url, utf8,
        websocket::Frame,
    },
    server::{
        connection::Connection,
        engine::{Engine, EngineBuilder},
        events::{ConnInfo, Event, RequestHead},
        handler::{ErrorHandler, Handler, WebSocketHandler, WebSocketSession},
        sink::{Sink, WriteSink},
    },
};
