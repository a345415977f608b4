use crate::{
    errors::ErrorKind,
    limits::{ConnLimits, ReqLimits, RespLimits},
    server::{
        connection::Connection,
        events::ConnInfo,
        handler::{ErrorHandler, Handler, Handlers, WebSocketHandler},
        sink::Sink,
    },
};
use std::{fmt, sync::Arc};

/// Read-only state shared by every connection of an engine.
pub(crate) struct Shared {
    pub(crate) handlers: Handlers,
    pub(crate) req_limits: ReqLimits,
    pub(crate) conn_limits: ConnLimits,
    pub(crate) resp_limits: RespLimits,
}

/// The configured request engine.
///
/// Handlers, error handlers and limits are fixed by [`EngineBuilder::build`]
/// and shared read-only by all connections. Cloning is cheap.
///
/// # Examples
/// ```
/// use sluice::{ConnInfo, Engine, Handled, Request, Response, StatusCode, WriteSink};
///
/// let engine = Engine::builder()
///     .handler(|req: &mut Request| -> Handled {
///         match req.path() {
///             "/" => Ok(Some(Response::html(StatusCode::Ok, "<h1>Home</h1>"))),
///             _ => Ok(None),
///         }
///     })
///     .build();
///
/// // One state machine per accepted connection
/// let conn = engine.connection(ConnInfo::default(), WriteSink::new(Vec::new()));
/// assert!(!conn.is_closed());
/// ```
#[derive(Clone)]
pub struct Engine(pub(crate) Arc<Shared>);

impl Engine {
    /// Creates a new builder for configuring the engine.
    #[inline(always)]
    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            handlers: Handlers::default(),
            request_limits: None,
            connection_limits: None,
            response_limits: None,
        }
    }

    /// Starts the assembly state machine of a new connection.
    #[inline]
    pub fn connection<S: Sink>(&self, info: ConnInfo, sink: S) -> Connection<S> {
        Connection::new(self, info, sink)
    }

    #[inline]
    pub fn request_limits(&self) -> &ReqLimits {
        &self.0.req_limits
    }

    #[inline]
    pub fn connection_limits(&self) -> &ConnLimits {
        &self.0.conn_limits
    }

    #[inline]
    pub fn response_limits(&self) -> &RespLimits {
        &self.0.resp_limits
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = &self.0.handlers;
        f.debug_struct("Engine")
            .field("handlers", &handlers.http.len())
            .field("websocket_handlers", &handlers.websocket.len())
            .field("error_handlers", &handlers.errors.keys().collect::<Vec<_>>())
            .field("request_limits", &self.0.req_limits)
            .field("connection_limits", &self.0.conn_limits)
            .field("response_limits", &self.0.resp_limits)
            .finish()
    }
}

/// Builder for configuring and creating [`Engine`] instances.
///
/// Handlers are tried in the order they were added.
pub struct EngineBuilder {
    handlers: Handlers,

    request_limits: Option<ReqLimits>,
    connection_limits: Option<ConnLimits>,
    response_limits: Option<RespLimits>,
}

impl EngineBuilder {
    /// Adds an HTTP handler after the ones already registered.
    #[inline(always)]
    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        self.handlers.http.push(Box::new(handler));
        self
    }

    /// Adds a WebSocket handler after the ones already registered.
    #[inline(always)]
    pub fn websocket_handler<H: WebSocketHandler>(mut self, handler: H) -> Self {
        self.handlers.websocket.push(Box::new(handler));
        self
    }

    /// Overrides the rendering of one failure kind. A later registration
    /// for the same kind replaces the earlier one.
    #[inline(always)]
    pub fn error_handler<H: ErrorHandler>(mut self, kind: ErrorKind, handler: H) -> Self {
        self.handlers.errors.insert(kind, Box::new(handler));
        self
    }

    /// Configures request parsing and body decoding limits.
    ///
    /// # Examples
    /// ```
    /// use sluice::{limits::ReqLimits, Engine};
    ///
    /// let engine = Engine::builder()
    ///     .request_limits(ReqLimits {
    ///         max_body_size: 1024 * 1024,
    ///         ..ReqLimits::default() // Required line
    ///     })
    ///     .build();
    /// assert_eq!(engine.request_limits().max_body_size, 1024 * 1024);
    /// ```
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Configures per-connection limits.
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures response writing.
    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// Freezes the configuration.
    #[inline]
    pub fn build(self) -> Engine {
        Engine(Arc::new(Shared {
            handlers: self.handlers,
            req_limits: self.request_limits.unwrap_or_default(),
            conn_limits: self.connection_limits.unwrap_or_default(),
            resp_limits: self.response_limits.unwrap_or_default(),
        }))
    }
}
