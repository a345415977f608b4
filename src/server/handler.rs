//! Handler contracts and dispatch.

use crate::{
    errors::{ErrorKind, HttpError},
    http::{
        request::Request,
        response::{Handled, Response},
        websocket::{self, OpCode},
    },
    server::sink::Sink,
};
use std::{collections::HashMap, net::SocketAddr};

/// A request handler.
///
/// Returning `Ok(None)` means "not my request": the next registered handler
/// is tried, and if none answers the client gets `404 Not Found`.
///
/// Closures with the matching signature are handlers too.
///
/// # Examples
/// ```
/// use sluice::{Handled, Handler, Request, Response, StatusCode};
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn handle(&self, req: &mut Request) -> Handled {
///         match req.path() {
///             "/hello" => Ok(Some(Response::text(StatusCode::Ok, "Hello World!"))),
///             _ => Ok(None),
///         }
///     }
/// }
/// ```
/// With a closure:
/// ```
/// use sluice::{Engine, Handled, HttpError, Request, Response, StatusCode};
///
/// let engine = Engine::builder()
///     .handler(|req: &mut Request| -> Handled {
///         match req.query_param("name") {
///             Some(name) => Ok(Some(Response::text(StatusCode::Ok, format!("Hi {name}")))),
///             None => Err(HttpError::bad_request("missing `name`")),
///         }
///     })
///     .build();
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: &mut Request) -> Handled;
}

impl<F> Handler for F
where
    F: Fn(&mut Request) -> Handled + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, req: &mut Request) -> Handled {
        self(req)
    }
}

/// Handler for upgraded WebSocket connections.
///
/// One value serves every connection whose upgrade it
/// [`accepts`](WebSocketHandler::accepts); per-connection details are on
/// the [`WebSocketSession`]. An `Err` from a callback is a protocol error:
/// the connection is closed with status `1002`.
///
/// # Examples
/// ```
/// use sluice::{HttpError, WebSocketHandler, WebSocketSession};
///
/// struct Echo;
///
/// impl WebSocketHandler for Echo {
///     fn accepts(&self, path: &str) -> bool {
///         path == "/echo"
///     }
///
///     fn on_text(&self, session: &mut WebSocketSession<'_>, text: String) -> Result<(), HttpError> {
///         session.send_text(&text)
///     }
/// }
/// ```
pub trait WebSocketHandler: Send + Sync + 'static {
    /// Whether this handler takes the upgrade for the normalized `path`.
    fn accepts(&self, path: &str) -> bool;

    fn on_text(&self, session: &mut WebSocketSession<'_>, text: String) -> Result<(), HttpError>;

    fn on_binary(&self, session: &mut WebSocketSession<'_>, data: Vec<u8>) -> Result<(), HttpError> {
        let _ = (session, data);
        Err(HttpError::bad_request("binary frames are not supported"))
    }

    /// Called once when the session ends by a close frame or a protocol
    /// error. `code` is the close status, if any.
    fn on_close(&self, session: &mut WebSocketSession<'_>, code: Option<u16>) {
        let _ = (session, code);
    }
}

/// An upgraded connection, as seen by a [`WebSocketHandler`] callback.
pub struct WebSocketSession<'a> {
    pub(crate) sink: &'a mut dyn Sink,
    pub(crate) path: &'a str,
    pub(crate) peer: Option<SocketAddr>,
}

impl WebSocketSession<'_> {
    /// Normalized path of the upgrade request.
    #[inline]
    pub fn path(&self) -> &str {
        self.path
    }

    #[inline]
    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    #[inline]
    pub fn send_text(&mut self, text: &str) -> Result<(), HttpError> {
        self.send(OpCode::Text, text.as_bytes())
    }

    #[inline]
    pub fn send_binary(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.send(OpCode::Binary, data)
    }

    pub(crate) fn send(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), HttpError> {
        let mut frame = Vec::with_capacity(payload.len() + 10);
        websocket::encode(opcode, payload, &mut frame);
        self.sink.write_all(&frame)?;
        Ok(self.sink.flush()?)
    }

    pub(crate) fn send_close(&mut self, code: Option<u16>) -> Result<(), HttpError> {
        let mut frame = Vec::with_capacity(4);
        websocket::encode_close(code, "", &mut frame);
        self.sink.write_all(&frame)?;
        Ok(self.sink.flush()?)
    }
}

/// Renders a failure of one kind, taking precedence over
/// [`HttpError::default_response`].
///
/// # Examples
/// ```
/// use sluice::{Engine, ErrorKind, HttpError, Request, Response, StatusCode};
///
/// let engine = Engine::builder()
///     .error_handler(ErrorKind::NotFound, |req: &Request, _: &HttpError| -> Result<Response, HttpError> {
///         Ok(Response::html(StatusCode::NotFound, format!("<h1>{} is gone</h1>", req.path())))
///     })
///     .build();
/// ```
pub trait ErrorHandler: Send + Sync + 'static {
    fn render(&self, req: &Request, err: &HttpError) -> Result<Response, HttpError>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Request, &HttpError) -> Result<Response, HttpError> + Send + Sync + 'static,
{
    #[inline]
    fn render(&self, req: &Request, err: &HttpError) -> Result<Response, HttpError> {
        self(req, err)
    }
}

/// Registered handlers, fixed once the engine is built.
#[derive(Default)]
pub(crate) struct Handlers {
    pub(crate) http: Vec<Box<dyn Handler>>,
    pub(crate) websocket: Vec<Box<dyn WebSocketHandler>>,
    pub(crate) errors: HashMap<ErrorKind, Box<dyn ErrorHandler>>,
}

impl Handlers {
    /// Tries the HTTP handlers in registration order; the first response wins.
    pub(crate) fn dispatch(&self, req: &mut Request) -> Result<Response, HttpError> {
        for handler in &self.http {
            if let Some(resp) = handler.handle(req)? {
                return Ok(resp);
            }
        }
        Err(HttpError::NotFound)
    }

    /// Index of the first WebSocket handler accepting `path`.
    #[inline]
    pub(crate) fn websocket_for(&self, path: &str) -> Option<usize> {
        self.websocket.iter().position(|h| h.accepts(path))
    }

    /// Response for `err`: the registered override, else the default.
    pub(crate) fn render_error(&self, req: &Request, err: &HttpError) -> Response {
        let Some(handler) = self.errors.get(&err.kind()) else {
            return err.default_response();
        };

        match handler.render(req, err) {
            Ok(resp) => resp,
            Err(nested) => {
                tracing::warn!(kind = err.kind().name(), %nested, "error handler failed");
                err.default_response()
            }
        }
    }
}

#[cfg(test)]
mod dispatch_tests {
    use super::*;
    use crate::{tools::*, Handled, StatusCode};

    fn handlers() -> Handlers {
        let mut handlers = Handlers::default();
        handlers.http.push(Box::new(|req: &mut Request| -> Handled {
            match req.path() {
                "/a" => Ok(Some(Response::text(StatusCode::Ok, "first"))),
                "/fail" => Err(HttpError::Forbidden),
                _ => Ok(None),
            }
        }));
        handlers.http.push(Box::new(|req: &mut Request| -> Handled {
            match req.path() {
                "/a" | "/b" => Ok(Some(Response::text(StatusCode::Ok, "second"))),
                _ => Ok(None),
            }
        }));
        handlers
    }

    #[test]
    fn first_response_wins() {
        #[rustfmt::skip]
        let cases = [
            ("/a", Ok("first")),
            ("/b", Ok("second")),
            ("/c", Err(ErrorKind::NotFound)),
            ("/fail", Err(ErrorKind::Forbidden)),
        ];

        let handlers = handlers();
        for (path, expected) in cases {
            let mut req = request("GET", path, &[]);
            let result = handlers.dispatch(&mut req);
            match expected {
                Ok(body) => {
                    let resp = result.unwrap();
                    assert_eq!(resp.content_length(), Some(body.len() as u64), "{path}");
                }
                Err(kind) => assert_eq!(result.unwrap_err().kind(), kind, "{path}"),
            }
        }
    }

    #[test]
    fn error_overrides() {
        let mut handlers = handlers();
        handlers.errors.insert(
            ErrorKind::NotFound,
            Box::new(|_: &Request, _: &HttpError| -> Result<Response, HttpError> {
                Ok(Response::html(StatusCode::NotFound, "<p>nope</p>"))
            }),
        );
        handlers.errors.insert(
            ErrorKind::Forbidden,
            Box::new(|_: &Request, _: &HttpError| -> Result<Response, HttpError> {
                Err(HttpError::internal("broken page"))
            }),
        );

        let req = request("GET", "/", &[]);
        let resp = handlers.render_error(&req, &HttpError::NotFound);
        assert_eq!(resp.content_type(), Some("text/html;charset=utf-8"));

        let resp = handlers.render_error(&req, &HttpError::Forbidden);
        assert_eq!(resp.status(), StatusCode::Forbidden);
        assert_eq!(resp.content_type(), Some("text/plain;charset=utf-8"));

        let resp = handlers.render_error(&req, &HttpError::bad_request("x"));
        assert_eq!(resp.status(), StatusCode::BadRequest);
    }

    #[test]
    fn websocket_matching() {
        struct Only(&'static str);

        impl WebSocketHandler for Only {
            fn accepts(&self, path: &str) -> bool {
                path == self.0
            }

            fn on_text(&self, _: &mut WebSocketSession<'_>, _: String) -> Result<(), HttpError> {
                Ok(())
            }
        }

        let mut handlers = Handlers::default();
        handlers.websocket.push(Box::new(Only("/chat")));
        handlers.websocket.push(Box::new(Only("/feed")));

        assert_eq!(handlers.websocket_for("/chat"), Some(0));
        assert_eq!(handlers.websocket_for("/feed"), Some(1));
        assert_eq!(handlers.websocket_for("/other"), None);
    }

    #[test]
    fn session_frames() {
        let mut sink = MemorySink::default();
        let mut session = WebSocketSession {
            sink: &mut sink,
            path: "/chat",
            peer: None,
        };

        session.send_text("hi").unwrap();
        session.send_binary(&[1, 2]).unwrap();
        session.send_close(Some(1000)).unwrap();
        assert_eq!(session.path(), "/chat");

        assert_eq!(
            sink.written,
            [&[0x81, 2, b'h', b'i'][..], &[0x82, 2, 1, 2], &[0x88, 2, 0x03, 0xE8]].concat()
        );
        assert_eq!(sink.flushes, 3);
    }
}
