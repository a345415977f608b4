//! Inbound protocol events, as handed over by the transport substrate.
//!
//! The engine never parses wire bytes. The transport tokenizes the start
//! line and header block, de-chunks the body, decodes WebSocket frames,
//! and feeds the results to [`Connection::on_event`](crate::Connection::on_event)
//! one at a time and in arrival order.

use crate::http::{types::Header, websocket::Frame};
use std::net::SocketAddr;

/// Start line and header block of one request.
///
/// # Examples
/// ```
/// use sluice::RequestHead;
///
/// let head = RequestHead::new("GET", "/index.html", "HTTP/1.1")
///     .header("Host", "example.com")
///     .header("Cookie", "session=abc");
/// assert_eq!(head.headers.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<Header>,
}

impl RequestHead {
    #[inline]
    pub fn new<M, T, V>(method: M, target: T, version: V) -> Self
    where
        M: Into<String>,
        T: Into<String>,
        V: Into<String>,
    {
        RequestHead {
            method: method.into(),
            target: target.into(),
            version: version.into(),
            headers: Vec::new(),
        }
    }

    /// Appends a header line.
    #[inline]
    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }
}

/// One protocol event for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start line and headers were received.
    Head(RequestHead),
    /// A piece of the (de-chunked) request body.
    Content(Vec<u8>),
    /// The current message is complete.
    End,
    /// A WebSocket frame on an upgraded connection.
    Frame(Frame),
    /// The transport could not tokenize the input; carries its diagnostic.
    DecodeFailure(String),
}

impl Event {
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Event::Head(_) => "head",
            Event::Content(_) => "content",
            Event::End => "end",
            Event::Frame(_) => "frame",
            Event::DecodeFailure(_) => "decode-failure",
        }
    }
}

/// Facts about the connection that the transport knows and the request
/// model reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnInfo {
    /// Remote address, when the transport has one.
    pub peer: Option<SocketAddr>,
    /// `true` when the transport is encrypted (TLS).
    pub secure: bool,
}
