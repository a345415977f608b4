//! Request assembly state machine, one per connection.

use crate::{
    errors::{self, fallback, HttpError},
    http::{
        body::PostDecoder,
        date,
        request::Request,
        response::{Response, Sent},
        types::{Method, StatusCode, Version},
        websocket::{self, Frame, OpCode, CLOSE_PROTOCOL_ERROR},
    },
    server::{
        engine::{Engine, Shared},
        events::{ConnInfo, Event, RequestHead},
        handler::WebSocketSession,
        sink::Sink,
    },
};
use std::{fs::File, io, mem, sync::Arc, time::Instant};

enum State {
    Idle,
    /// Head received; the message has no body worth decoding.
    Headers {
        request: Request,
        deadline: Option<Instant>,
    },
    /// POST body in progress.
    Body {
        request: Request,
        decoder: PostDecoder,
        deadline: Option<Instant>,
    },
    /// The request failed mid-body and was answered; the rest of its body
    /// is discarded.
    Draining,
    WebSocket {
        handler: usize,
        path: String,
    },
    Closed,
}

impl State {
    const fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Headers { .. } => "headers",
            State::Body { .. } => "body",
            State::Draining => "draining",
            State::WebSocket { .. } => "websocket",
            State::Closed => "closed",
        }
    }

    const fn deadline(&self) -> Option<Instant> {
        match self {
            State::Headers { deadline, .. } | State::Body { deadline, .. } => *deadline,
            _ => None,
        }
    }
}

/// The assembly state machine of one connection.
///
/// The transport feeds it [`Event`]s in arrival order; responses go out
/// through the connection's [`Sink`]. Request-scoped resources (decoders,
/// temporary files) live inside the current state and are released on
/// every transition out of it, whatever the reason.
///
/// # Examples
/// ```
/// use sluice::{ConnInfo, Engine, Event, Handled, Request, RequestHead, Response, StatusCode, WriteSink};
///
/// let engine = Engine::builder()
///     .handler(|_: &mut Request| -> Handled { Ok(Some(Response::text(StatusCode::Ok, "pong"))) })
///     .build();
///
/// let mut conn = engine.connection(ConnInfo::default(), WriteSink::new(Vec::new()));
/// conn.on_event(Event::Head(RequestHead::new("GET", "/ping", "HTTP/1.1")));
/// conn.on_event(Event::End);
///
/// let written = conn.into_sink().into_inner().unwrap();
/// assert!(written.starts_with(b"HTTP/1.1 200 OK\r\n"));
/// assert!(written.ends_with(b"pong"));
/// ```
pub struct Connection<S: Sink> {
    engine: Arc<Shared>,
    info: ConnInfo,
    sink: S,
    state: State,
    served: usize,
}

impl<S: Sink> Connection<S> {
    #[inline]
    pub(crate) fn new(engine: &Engine, info: ConnInfo, sink: S) -> Self {
        Connection {
            engine: Arc::clone(&engine.0),
            info,
            sink,
            state: State::Idle,
            served: 0,
        }
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Releases the request in flight, if any, and returns the sink.
    #[inline]
    pub fn into_sink(mut self) -> S {
        self.state = State::Closed;
        self.sink
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    #[inline]
    pub fn is_websocket(&self) -> bool {
        matches!(self.state, State::WebSocket { .. })
    }

    /// Number of responses completed on this connection.
    #[inline]
    pub fn requests_served(&self) -> usize {
        self.served
    }

    /// When [`poll_timeout`](Self::poll_timeout) should next be called.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.deadline()
    }
}

// Events from the transport
impl<S: Sink> Connection<S> {
    /// Processes one inbound event.
    pub fn on_event(&mut self, event: Event) {
        let state = mem::replace(&mut self.state, State::Closed);

        self.state = match (state, event) {
            (State::Closed, event) => {
                tracing::debug!(event = event.name(), "event on a closed connection");
                State::Closed
            }
            (State::Idle, Event::Head(head)) => self.on_head(head),

            (State::Headers { request, deadline }, Event::Content(bytes)) => {
                tracing::debug!(len = bytes.len(), "ignoring body of a non-POST request");
                State::Headers { request, deadline }
            }
            (State::Headers { request, .. }, Event::End) => self.complete(request),

            (
                State::Body {
                    mut request,
                    mut decoder,
                    deadline,
                },
                Event::Content(bytes),
            ) => match decoder.feed(&bytes, &mut request) {
                Ok(()) => State::Body {
                    request,
                    decoder,
                    deadline,
                },
                Err(err) => {
                    drop(decoder);
                    self.reject_body(request, err)
                }
            },
            (State::Body { mut request, decoder, .. }, Event::End) => {
                match decoder.finish(&mut request) {
                    Ok(()) => self.complete(request),
                    Err(err) => self.respond(request, Err(err)),
                }
            }

            (State::Draining, Event::Content(_)) => State::Draining,
            (State::Draining, Event::End) => State::Idle,

            (State::WebSocket { handler, path }, Event::Frame(frame)) => {
                self.on_frame(handler, path, frame)
            }
            (State::WebSocket { handler, path }, event) => {
                let err = HttpError::bad_request(format!("unexpected {} event", event.name()));
                self.websocket_error(handler, &path, err)
            }

            (state, Event::DecodeFailure(reason)) => {
                tracing::debug!(state = state.name(), %reason, "undecodable input");
                drop(state);
                self.abort(fallback::BAD_REQUEST)
            }
            (state, event) => {
                tracing::debug!(
                    state = state.name(),
                    event = event.name(),
                    "event out of sequence"
                );
                drop(state);
                self.abort(fallback::BAD_REQUEST)
            }
        };
    }

    /// Checks the `100 Continue` deadline. Returns `true` when it expired:
    /// the request was dropped, `408` sent and the connection closed.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        match self.state.deadline() {
            Some(deadline) if now >= deadline => {
                tracing::debug!("request body did not arrive after 100-continue");
                self.state = State::Closed;
                self.state = self.abort(fallback::REQUEST_TIMEOUT);
                true
            }
            _ => false,
        }
    }

    /// The transport failed while reading or writing.
    pub fn on_transport_error(&mut self, err: io::Error) {
        let state = mem::replace(&mut self.state, State::Closed);

        if errors::is_disconnect(err.kind()) {
            tracing::debug!(%err, state = state.name(), "client disconnected");
        } else {
            tracing::error!(%err, state = state.name(), "transport failure");
            if matches!(state, State::Headers { .. } | State::Body { .. } | State::Draining) {
                self.write_fallback(fallback::INTERNAL_ERROR);
            }
        }

        drop(state);
        self.sink.close();
    }

    /// The peer went away. Everything is released, nothing is written.
    pub fn on_disconnect(&mut self) {
        let state = mem::replace(&mut self.state, State::Closed);
        if !matches!(state, State::Idle | State::Closed) {
            tracing::debug!(state = state.name(), "disconnected mid-request");
        }
        drop(state);
        self.sink.close();
    }
}

// HTTP
impl<S: Sink> Connection<S> {
    fn on_head(&mut self, head: RequestHead) -> State {
        let engine = Arc::clone(&self.engine);

        let request = match Request::from_head(head, &self.info, &engine.req_limits) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(%err, "rejecting request head");
                return self.abort(fallback::BAD_REQUEST);
            }
        };

        let mut deadline = None;
        if request.expects_continue() {
            if let Err(err) = self.write_continue() {
                return self.transport_failure(err);
            }
            deadline = Some(Instant::now() + engine.conn_limits.continue_timeout);
        }

        if request.method() != Method::Post {
            return State::Headers { request, deadline };
        }

        match PostDecoder::new(request.content_type(), &engine.req_limits) {
            Ok(decoder) => State::Body {
                request,
                decoder,
                deadline,
            },
            Err(err) => self.reject_body(request, err),
        }
    }

    fn write_continue(&mut self) -> io::Result<()> {
        self.sink
            .write_all(StatusCode::Continue.to_first_line(Version::Http11))?;
        self.sink.write_all(b"\r\n")?;
        self.sink.flush()
    }

    fn complete(&mut self, mut request: Request) -> State {
        let engine = Arc::clone(&self.engine);

        if websocket::is_upgrade_request(&request) {
            if let Some(handler) = engine.handlers.websocket_for(request.path()) {
                return self.upgrade(request, handler);
            }
        }

        let result = engine.handlers.dispatch(&mut request);
        self.respond(request, result)
    }

    // Answers a request whose body could not be decoded; its remaining
    // content events are skipped.
    fn reject_body(&mut self, request: Request, err: HttpError) -> State {
        match self.respond(request, Err(err)) {
            State::Idle => State::Draining,
            state => state,
        }
    }

    /// Sends the outcome of a request and releases it.
    fn respond(&mut self, mut request: Request, result: Result<Response, HttpError>) -> State {
        let engine = Arc::clone(&self.engine);

        if self.served + 1 >= engine.conn_limits.max_requests_per_connection {
            request.force_close();
        }

        let (outcome, wrote) = match result {
            Ok(resp) => self.send(&request, resp),
            Err(err) => (Err(err), false),
        };
        let (outcome, wrote) = match outcome {
            Err(err) if !wrote && !err.is_disconnect() => {
                err.log();
                let resp = engine.handlers.render_error(&request, &err);
                self.send(&request, resp)
            }
            outcome => (outcome, wrote),
        };

        request.release_uploads();
        self.served += 1;

        match outcome {
            Ok(sent) => {
                self.access_log(&request, &sent);
                match sent.keep_alive && self.sink.is_open() {
                    true => State::Idle,
                    false => {
                        self.sink.close();
                        State::Closed
                    }
                }
            }
            Err(err) if err.is_disconnect() => {
                tracing::debug!(%err, "client disconnected");
                self.sink.close();
                State::Closed
            }
            Err(err) => {
                tracing::error!(%err, "failed to send response");
                if !wrote {
                    self.write_fallback(fallback::INTERNAL_ERROR);
                }
                self.sink.close();
                State::Closed
            }
        }
    }

    // Also reports whether any byte reached the sink.
    fn send(&mut self, request: &Request, mut resp: Response) -> (Result<Sent, HttpError>, bool) {
        let mut tracked = Tracked {
            inner: &mut self.sink,
            written: 0,
        };
        let result = resp.send(request, &mut tracked, &self.engine.resp_limits);
        (result, tracked.written > 0)
    }

    fn abort(&mut self, response: &[u8]) -> State {
        self.write_fallback(response);
        self.sink.close();
        State::Closed
    }

    fn write_fallback(&mut self, response: &[u8]) {
        let result = self
            .sink
            .write_all(response)
            .and_then(|()| self.sink.flush());
        if let Err(err) = result {
            match errors::is_disconnect(err.kind()) {
                true => tracing::debug!(%err, "client disconnected"),
                false => tracing::error!(%err, "failed to send fallback response"),
            }
        }
    }

    fn transport_failure(&mut self, err: io::Error) -> State {
        match errors::is_disconnect(err.kind()) {
            true => tracing::debug!(%err, "client disconnected"),
            false => tracing::error!(%err, "write failed"),
        }
        self.sink.close();
        State::Closed
    }

    fn access_log(&self, request: &Request, sent: &Sent) {
        if is_favicon(request.path()) {
            return;
        }

        let addr = self
            .info
            .peer
            .map_or_else(|| "-".to_owned(), |peer| peer.ip().to_string());
        let method = match request.is_head() {
            true => "HEAD",
            false => request.method().as_str(),
        };

        tracing::info!(
            target: "sluice::access",
            "{addr} - - [{}] \"{method} {} {}\" {} {}",
            date::format_clf(date::now_secs()),
            request.url().raw(),
            request.version().as_str(),
            sent.status.as_u16(),
            sent.length,
        );
    }
}

// WebSocket
impl<S: Sink> Connection<S> {
    fn upgrade(&mut self, request: Request, handler: usize) -> State {
        let accept = match websocket::check_handshake(&request) {
            Ok(accept) => accept,
            Err(err) => {
                tracing::warn!(%err, path = request.path(), "websocket handshake rejected");
                return self.respond(request, Err(err));
            }
        };

        let head = websocket::switching_protocols(&accept);
        if let Err(err) = self.sink.write_all(&head).and_then(|()| self.sink.flush()) {
            return self.transport_failure(err);
        }

        tracing::debug!(path = request.path(), "websocket session started");
        State::WebSocket {
            handler,
            path: request.path().to_owned(),
        }
    }

    fn on_frame(&mut self, index: usize, path: String, frame: Frame) -> State {
        let engine = Arc::clone(&self.engine);
        let handler = &engine.handlers.websocket[index];
        let mut session = WebSocketSession {
            sink: &mut self.sink,
            path: &path,
            peer: self.info.peer,
        };

        let result = match frame {
            Frame::Text(text) => handler.on_text(&mut session, text),
            Frame::Binary(data) => handler.on_binary(&mut session, data),
            Frame::Ping(data) => session.send(OpCode::Pong, &data),
            Frame::Pong(_) => Ok(()),
            Frame::Close { code, .. } => {
                handler.on_close(&mut session, code);
                if let Err(err) = session.send_close(code) {
                    tracing::debug!(%err, "close frame not delivered");
                }
                self.sink.close();
                return State::Closed;
            }
            frame @ Frame::Continuation(_) => Err(HttpError::bad_request(format!(
                "unexpected {} frame",
                frame.name()
            ))),
        };

        match result {
            Ok(()) => State::WebSocket {
                handler: index,
                path,
            },
            Err(err) => self.websocket_error(index, &path, err),
        }
    }

    fn websocket_error(&mut self, index: usize, path: &str, err: HttpError) -> State {
        if err.is_disconnect() {
            tracing::debug!(%err, path, "client disconnected");
            self.sink.close();
            return State::Closed;
        }

        tracing::warn!(%err, path, "websocket protocol error");
        let engine = Arc::clone(&self.engine);
        let mut session = WebSocketSession {
            sink: &mut self.sink,
            path,
            peer: self.info.peer,
        };

        engine.handlers.websocket[index].on_close(&mut session, Some(CLOSE_PROTOCOL_ERROR));
        if let Err(err) = session.send_close(Some(CLOSE_PROTOCOL_ERROR)) {
            tracing::debug!(%err, "close frame not delivered");
        }
        self.sink.close();
        State::Closed
    }
}

fn is_favicon(path: &str) -> bool {
    let leaf = path.rsplit('/').next().unwrap_or(path);
    let Some((stem, ext)) = leaf.rsplit_once('.') else {
        return false;
    };

    stem.eq_ignore_ascii_case("favicon")
        && ["ico", "png", "gif", "jpg", "jpeg", "apng"]
            .iter()
            .any(|e| ext.eq_ignore_ascii_case(e))
}

/// Counts the bytes that reached the inner sink.
struct Tracked<'a> {
    inner: &'a mut dyn Sink,
    written: u64,
}

impl Sink for Tracked<'_> {
    #[inline]
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    #[inline]
    fn send_file(&mut self, file: &mut File, len: u64) -> io::Result<()> {
        self.inner.send_file(file, len)?;
        self.written += len;
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    #[inline]
    fn close(&mut self) {
        self.inner.close();
    }

    #[inline]
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::{
        errors::ErrorKind,
        limits::{ConnLimits, ReqLimits},
        tools::*,
        Handled,
    };
    use std::{
        io::Read,
        path::PathBuf,
        sync::Mutex,
        time::Duration,
    };

    fn routes(req: &mut Request) -> Handled {
        match req.path() {
            "/hello" => Ok(Some(Response::text(StatusCode::Ok, "Hello World!"))),
            "/echo" => {
                let name = req.post_param("name").unwrap_or("-");
                Ok(Some(Response::text(StatusCode::Ok, name.to_owned())))
            }
            "/query" => {
                let values = req.query_params("x").join(",");
                Ok(Some(Response::text(StatusCode::Ok, format!("{} {values}", req.path()))))
            }
            "/reject" => Err(HttpError::bad_request("missing id")),
            "/boom" => Err(HttpError::internal("database is down")),
            "/go" => Err(HttpError::redirect("/hello")),
            "/broken" => Ok(Some(Response::stream(StatusCode::Ok, "text/plain", Broken))),
            _ => Ok(None),
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk vanished"))
        }
    }

    fn connection() -> Connection<MemorySink> {
        Engine::builder()
            .handler(routes)
            .build()
            .connection(ConnInfo::default(), MemorySink::default())
    }

    fn get(conn: &mut Connection<impl Sink>, target: &str) {
        conn.on_event(Event::Head(RequestHead::new("GET", target, "HTTP/1.1")));
        conn.on_event(Event::End);
    }

    #[test]
    fn keep_alive_sequence() {
        let mut conn = connection();
        get(&mut conn, "/hello");
        get(&mut conn, "/a/b/../../query?x=1&x=2");

        let responses = responses(&conn.sink().written);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].1, b"Hello World!");
        assert_eq!(responses[1].1, b"/query 1,2");
        assert!(!conn.is_closed());
        assert_eq!(conn.requests_served(), 2);
    }

    #[test]
    fn no_handler_gives_cached_404() {
        let mut conn = connection();
        get(&mut conn, "/missing");

        let (head, body) = split_response(&conn.sink().written);
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert_eq!(header_value(&head, "cache-control"), Some("max-age=300"));
        assert_eq!(body, b"Not Found");
        assert!(!conn.is_closed());
    }

    #[test]
    fn bad_request_keeps_connection() {
        let mut conn = connection();
        get(&mut conn, "/reject");
        get(&mut conn, "/hello");

        let responses = responses(&conn.sink().written);
        assert_eq!(responses.len(), 2);
        assert!(responses[0].0.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(header_value(&responses[0].0, "connection").is_none());
        assert_eq!(responses[0].1, b"Bad Request -- missing id");
        assert_eq!(responses[1].1, b"Hello World!");
        assert!(!conn.is_closed());
        assert!(!conn.sink().closed);
    }

    #[test]
    fn malformed_multipart_is_drained() {
        let mut conn = connection();
        let head = RequestHead::new("POST", "/echo", "HTTP/1.1")
            .header("Content-Type", "multipart/form-data; boundary=XyZ");
        conn.on_event(Event::Head(head));
        conn.on_event(Event::Content(
            b"--XyZ\r\nContent-Disposition: form-data\r\n\r\n1\r\n--XyZ--".to_vec(),
        ));
        conn.on_event(Event::Content(b"trailing".to_vec()));
        conn.on_event(Event::End);
        get(&mut conn, "/hello");

        let responses = responses(&conn.sink().written);
        assert_eq!(responses.len(), 2);
        assert!(responses[0].0.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert_eq!(responses[1].1, b"Hello World!");
        assert!(!conn.is_closed());
    }

    #[test]
    fn internal_error_closes() {
        let mut conn = connection();
        get(&mut conn, "/boom");

        let (head, body) = split_response(&conn.sink().written);
        assert!(head.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert_eq!(header_value(&head, "connection"), Some("close"));
        assert_eq!(body, b"Internal Server Error");
        assert!(conn.is_closed());
        assert!(conn.sink().closed);
    }

    #[test]
    fn redirect() {
        let mut conn = connection();
        get(&mut conn, "/go");

        let (head, body) = split_response(&conn.sink().written);
        assert!(head.starts_with("HTTP/1.1 302 Found\r\n"));
        assert_eq!(header_value(&head, "location"), Some("/hello"));
        assert!(body.is_empty());
    }

    #[test]
    fn error_handler_override() {
        let mut conn = Engine::builder()
            .handler(routes)
            .error_handler(ErrorKind::NotFound, |req: &Request, _: &HttpError| -> Result<Response, HttpError> {
                Ok(Response::html(StatusCode::NotFound, format!("<p>{}</p>", req.path())))
            })
            .build()
            .connection(ConnInfo::default(), MemorySink::default());
        get(&mut conn, "/nope");

        let (head, body) = split_response(&conn.sink().written);
        assert_eq!(header_value(&head, "content-type"), Some("text/html;charset=utf-8"));
        assert_eq!(body, b"<p>/nope</p>");
    }

    #[test]
    fn head_request() {
        let mut conn = connection();
        conn.on_event(Event::Head(RequestHead::new("HEAD", "/hello", "HTTP/1.1")));
        conn.on_event(Event::End);

        let (head, body) = split_response(&conn.sink().written);
        assert_eq!(header_value(&head, "content-length"), Some("12"));
        assert!(body.is_empty());
    }

    #[test]
    fn malformed_input() {
        #[rustfmt::skip]
        let cases = [
            vec![Event::Head(RequestHead::new("BREW", "/", "HTTP/1.1"))],
            vec![Event::Head(RequestHead::new("GET", "/../etc", "HTTP/1.1"))],
            vec![Event::Head(RequestHead::new("GET", "/", "HTTP/3.0"))],
            vec![Event::Head(RequestHead::new("GET", "/", "HTTP/1.1").header("Cookie", "=x"))],
            vec![Event::DecodeFailure("bad chunk size".into())],
            vec![Event::Content(b"stray".to_vec())],
            vec![Event::Head(RequestHead::new("GET", "/", "HTTP/1.1")), Event::Frame(Frame::Pong(vec![]))],
        ];

        for events in cases {
            let mut conn = connection();
            for event in events.clone() {
                conn.on_event(event);
            }
            assert_eq!(conn.sink().written, fallback::BAD_REQUEST, "{events:?}");
            assert!(conn.is_closed());
            assert!(conn.sink().closed);

            // Later events are ignored.
            get(&mut conn, "/hello");
            assert_eq!(conn.sink().written, fallback::BAD_REQUEST);
        }
    }

    #[test]
    fn max_requests_per_connection() {
        let mut conn = Engine::builder()
            .handler(routes)
            .connection_limits(ConnLimits {
                max_requests_per_connection: 2,
                ..ConnLimits::default()
            })
            .build()
            .connection(ConnInfo::default(), MemorySink::default());

        get(&mut conn, "/hello");
        assert!(!conn.is_closed());
        get(&mut conn, "/hello");
        assert!(conn.is_closed());

        let responses = responses(&conn.sink().written);
        assert_eq!(header_value(&responses[0].0, "connection"), None);
        assert_eq!(header_value(&responses[1].0, "connection"), Some("close"));
    }

    #[test]
    fn failure_after_head_sends_nothing_more() {
        let mut conn = connection();
        get(&mut conn, "/broken");

        let written = &conn.sink().written;
        let (head, body) = split_response(written);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(body.is_empty());
        assert!(conn.is_closed());
    }

    #[test]
    fn static_500_when_responses_fail() {
        let mut conn = Engine::builder()
            .handler(routes)
            .build()
            .connection(ConnInfo::default(), MemorySink::failing_writes(2, io::ErrorKind::Other));
        get(&mut conn, "/hello");

        assert_eq!(conn.sink().written, fallback::INTERNAL_ERROR);
        assert!(conn.is_closed());
    }

    #[test]
    fn disconnect_during_send() {
        let mut conn = Engine::builder()
            .handler(routes)
            .build()
            .connection(ConnInfo::default(), MemorySink::failing_after(0, io::ErrorKind::ConnectionReset));
        get(&mut conn, "/hello");

        assert!(conn.sink().written.is_empty());
        assert!(conn.is_closed());
    }

    #[test]
    fn transport_errors() {
        #[rustfmt::skip]
        let cases = [
            (io::ErrorKind::ConnectionReset, &b""[..]),
            (io::ErrorKind::Other, fallback::INTERNAL_ERROR),
        ];

        for (kind, written) in cases {
            let mut conn = connection();
            conn.on_event(Event::Head(RequestHead::new("GET", "/hello", "HTTP/1.1")));
            conn.on_transport_error(io::Error::from(kind));

            assert_eq!(conn.sink().written, written, "{kind:?}");
            assert!(conn.is_closed());
            assert!(conn.sink().closed);
        }

        let mut conn = connection();
        conn.on_event(Event::Head(RequestHead::new("GET", "/hello", "HTTP/1.1")));
        conn.on_disconnect();
        assert!(conn.sink().written.is_empty());
        assert!(conn.is_closed());
    }

    #[test]
    fn continue_timeout() {
        let mut conn = Engine::builder()
            .handler(routes)
            .connection_limits(ConnLimits {
                continue_timeout: Duration::from_secs(5),
                ..ConnLimits::default()
            })
            .build()
            .connection(ConnInfo::default(), MemorySink::default());

        let head = RequestHead::new("POST", "/echo", "HTTP/1.1")
            .header("Expect", "100-continue")
            .header("Content-Type", "application/x-www-form-urlencoded");
        conn.on_event(Event::Head(head));
        assert_eq!(conn.sink().written, b"HTTP/1.1 100 Continue\r\n\r\n");

        let deadline = conn.next_deadline().unwrap();
        assert!(!conn.poll_timeout(deadline - Duration::from_secs(1)));
        conn.on_event(Event::Content(b"name=par".to_vec()));
        assert!(conn.poll_timeout(deadline));

        assert_eq!(
            conn.sink().written,
            [&b"HTTP/1.1 100 Continue\r\n\r\n"[..], fallback::REQUEST_TIMEOUT].concat()
        );
        assert!(conn.is_closed());
        assert!(conn.next_deadline().is_none());
    }

    #[test]
    fn continue_then_body() {
        let mut conn = connection();
        let head = RequestHead::new("POST", "/echo", "HTTP/1.1").header("Expect", "100-continue");
        conn.on_event(Event::Head(head));
        conn.on_event(Event::Content(b"name=Ada+L".to_vec()));
        conn.on_event(Event::Content(b"ovelace".to_vec()));
        conn.on_event(Event::End);

        assert!(conn.next_deadline().is_none());
        let written = &conn.sink().written;
        let (_, body) = split_response(&written[b"HTTP/1.1 100 Continue\r\n\r\n".len()..]);
        assert_eq!(body, b"Ada Lovelace");
    }

    #[test]
    fn get_body_is_ignored() {
        let mut conn = connection();
        conn.on_event(Event::Head(RequestHead::new("GET", "/echo", "HTTP/1.1")));
        conn.on_event(Event::Content(b"name=x".to_vec()));
        conn.on_event(Event::End);

        let (_, body) = split_response(&conn.sink().written);
        assert_eq!(body, b"-");
    }

    #[test]
    fn oversized_body_is_drained() {
        let mut conn = Engine::builder()
            .handler(routes)
            .request_limits(ReqLimits {
                max_body_size: 8,
                ..ReqLimits::default()
            })
            .build()
            .connection(ConnInfo::default(), MemorySink::default());

        conn.on_event(Event::Head(RequestHead::new("POST", "/echo", "HTTP/1.1")));
        conn.on_event(Event::Content(b"name=0123456789".to_vec()));
        conn.on_event(Event::Content(b"more".to_vec()));
        conn.on_event(Event::End);
        get(&mut conn, "/hello");

        let responses = responses(&conn.sink().written);
        assert!(responses[0].0.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert_eq!(responses[1].1, b"Hello World!");
        assert!(!conn.is_closed());
    }

    #[test]
    fn multipart_upload_released_after_handler() {
        let seen: Arc<Mutex<Option<PathBuf>>> = Arc::default();
        let seen_by_handler = Arc::clone(&seen);

        let mut conn = Engine::builder()
            .handler(move |req: &mut Request| -> Handled {
                let upload = req.file_upload("file").ok_or(HttpError::NotFound)?;
                let path = upload.path().map(|p| p.to_path_buf());
                assert!(path.as_ref().is_some_and(|p| p.exists()));
                *seen_by_handler.lock().unwrap() = path;

                let text = format!(
                    "{} {} {}",
                    req.post_param("title").unwrap_or("-"),
                    upload.filename(),
                    upload.len(),
                );
                Ok(Some(Response::text(StatusCode::Ok, text)))
            })
            .build()
            .connection(ConnInfo::default(), MemorySink::default());

        let body = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            hello\r\n\
            --XyZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file contents\r\n\
            --XyZ--\r\n";
        let head = RequestHead::new("POST", "/upload", "HTTP/1.1")
            .header("Content-Type", "multipart/form-data; boundary=XyZ");

        conn.on_event(Event::Head(head));
        for chunk in body.as_bytes().chunks(7) {
            conn.on_event(Event::Content(chunk.to_vec()));
        }
        conn.on_event(Event::End);

        let (_, body) = split_response(&conn.sink().written);
        assert_eq!(body, b"hello a.txt 13");

        let path = seen.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn stream_body_released() {
        let drops = DropCounter::new();
        let reader = drops.reader(b"streamed");
        let reader = Mutex::new(Some(reader));

        let mut conn = Engine::builder()
            .handler(move |_: &mut Request| -> Handled {
                let reader = reader.lock().unwrap().take().ok_or(HttpError::NotFound)?;
                Ok(Some(Response::stream(StatusCode::Ok, "text/plain", reader)))
            })
            .build()
            .connection(ConnInfo::default(), MemorySink::default());
        get(&mut conn, "/");

        assert_eq!(drops.count(), 1);
        let (_, body) = split_response(&conn.sink().written);
        assert_eq!(body, b"8\r\nstreamed\r\n0\r\n\r\n");
    }

    #[test]
    fn favicons() {
        #[rustfmt::skip]
        let cases = [
            ("/favicon.ico", true), ("/img/FAVICON.PNG", true), ("/favicon.apng", true),
            ("/favicon.svg", false), ("/favicon", false), ("/my-favicon.ico", false),
        ];

        for (path, expected) in cases {
            assert_eq!(is_favicon(path), expected, "{path}");
        }
    }

    #[test]
    fn tracked_counts_bytes() {
        let mut sink = MemorySink::default();
        let mut tracked = Tracked {
            inner: &mut sink,
            written: 0,
        };
        tracked.write_all(b"abc").unwrap();
        assert_eq!(tracked.written, 3);

        let mut failing = MemorySink::failing_writes(1, io::ErrorKind::Other);
        let mut tracked = Tracked {
            inner: &mut failing,
            written: 0,
        };
        assert!(tracked.write_all(b"abc").is_err());
        assert_eq!(tracked.written, 0);
    }
}
