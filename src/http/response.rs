//! Response model, header policy and body delivery.

use crate::{
    errors::HttpError,
    http::{
        cookie::SetCookie,
        date, mime,
        request::{Request, STREAM_ID_HEADER},
        types::{is_header_safe, Header, StatusCode, Version},
    },
    limits::RespLimits,
    server::sink::Sink,
    BodyWriter, WriteBuffer,
};
use std::{
    fmt,
    fs::File,
    io::{self, Read},
    path::Path,
    time::UNIX_EPOCH,
};

/// Result of a handler: a response, `None` to let the next handler try,
/// or a failure rendered by the error handlers.
pub type Handled = Result<Option<Response>, HttpError>;

/// Upper bound of [`Response::set_max_age`] and of cookie lifetimes.
pub const ONE_YEAR: i64 = 31_536_000;

/// Response payload.
///
/// Owned by the [`Response`]; file handles and streams are closed when
/// the response is closed or dropped.
pub enum Body {
    Empty,
    Buffer(Vec<u8>),
    File { file: File, len: u64 },
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Body::File { len, .. } => f.debug_struct("File").field("len", len).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(u64),
    Chunked,
}

/// What [`Response::send`] put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Sent {
    pub(crate) status: StatusCode,
    /// Body bytes written.
    pub(crate) length: u64,
    pub(crate) keep_alive: bool,
}

/// HTTP response returned by a handler.
///
/// The header block is computed once, at send time, from the response
/// and the request it answers:
///
/// 1. `server`, `date`, `accept-encoding`
/// 2. `x-http2-stream-id` when the request carried one
/// 3. `connection`, when the version default needs overriding
/// 4. custom headers, then `set-cookie` lines
/// 5. caching: `200` gets `last-modified` and `max-age` (or no-cache when
///    the max-age is `0`); `304` echoes `If-Modified-Since`; `404` is
///    cached for a short interval; everything else is no-cache
/// 6. `content-type`, then `content-length` or `transfer-encoding: chunked`,
///    then `content-encoding: gzip` for pre-compressed content
///
/// # Examples
/// ```
/// use sluice::{Response, StatusCode};
///
/// let mut resp = Response::text(StatusCode::Ok, "Hello World!");
/// resp.add_header("x-powered-by", "sluice")
///     .set_max_age(60)
///     .set_cookie("visited", "1", Some("/"), 3600, true);
/// assert_eq!(resp.status(), StatusCode::Ok);
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    content_type: Option<String>,
    gzip: bool,
    last_modified: i64,
    max_age: i64,
    headers: Vec<Header>,
    cookies: Vec<SetCookie>,
    close: bool,
    body: Option<Body>,
}

// Constructors
impl Response {
    #[inline]
    fn new(status: StatusCode, content_type: Option<String>, body: Body) -> Self {
        Response {
            status,
            content_type,
            gzip: false,
            last_modified: 0,
            max_age: 0,
            headers: Vec::new(),
            cookies: Vec::new(),
            close: false,
            body: Some(body),
        }
    }

    /// A response without content.
    #[inline]
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, None, Body::Empty)
    }

    /// In-memory content.
    #[inline]
    pub fn buffer<C: Into<String>>(status: StatusCode, content_type: C, bytes: Vec<u8>) -> Self {
        Self::new(status, Some(content_type.into()), Body::Buffer(bytes))
    }

    /// Content assembled with a [`BodyWriter`].
    ///
    /// # Examples
    /// ```
    /// use sluice::{Response, StatusCode};
    /// use std::io::Write;
    ///
    /// let resp = Response::buffer_with(StatusCode::Ok, "text/plain", |w| {
    ///     w.write("total: ");
    ///     w.write(42u32);
    ///     write!(w, " ({}%)", 7).unwrap();
    /// });
    /// assert_eq!(resp.content_length(), Some(14));
    /// ```
    pub fn buffer_with<C, F>(status: StatusCode, content_type: C, f: F) -> Self
    where
        C: Into<String>,
        F: FnOnce(&mut BodyWriter),
    {
        let mut bytes = Vec::new();
        f(&mut BodyWriter(&mut bytes));
        Self::buffer(status, content_type, bytes)
    }

    /// `text/plain` content in UTF-8.
    #[inline]
    pub fn text<T: Into<String>>(status: StatusCode, text: T) -> Self {
        Self::buffer(status, "text/plain;charset=utf-8", text.into().into_bytes())
    }

    /// `text/html` content in UTF-8.
    #[inline]
    pub fn html<T: Into<String>>(status: StatusCode, html: T) -> Self {
        Self::buffer(status, "text/html;charset=utf-8", html.into().into_bytes())
    }

    /// `302 Found` to `location`.
    #[inline]
    pub fn redirect<L: Into<String>>(location: L) -> Self {
        let mut resp = Self::empty(StatusCode::Found);
        resp.add_header("location", location.into());
        resp
    }

    /// Content read from `reader`, always sent chunked.
    #[inline]
    pub fn stream<C, R>(status: StatusCode, content_type: C, reader: R) -> Self
    where
        C: Into<String>,
        R: Read + Send + 'static,
    {
        Self::new(status, Some(content_type.into()), Body::Stream(Box::new(reader)))
    }

    /// Serves the file at `path`.
    ///
    /// Fails with [`NotFound`](HttpError::NotFound) for missing, hidden
    /// (`.name`) and non-regular files, and with
    /// [`NotModified`](HttpError::NotModified) when the client's cached
    /// copy is current. The content type comes from the extension.
    pub fn file<P: AsRef<Path>>(req: &Request, path: P) -> Result<Self, HttpError> {
        let path = path.as_ref();

        let leaf = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or(HttpError::NotFound)?;
        if leaf.starts_with('.') {
            return Err(HttpError::NotFound);
        }

        let meta = std::fs::metadata(path).map_err(|_| HttpError::NotFound)?;
        if !meta.is_file() {
            return Err(HttpError::NotFound);
        }

        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs() as i64);
        if !req.content_modified(last_modified) {
            return Err(HttpError::NotModified);
        }

        let file = File::open(path).map_err(|_| HttpError::NotFound)?;
        let ext = mime::extension(leaf);
        let content_type = ext
            .as_deref()
            .and_then(mime::from_extension)
            .map(mime::with_charset);

        let mut resp = Self::new(
            StatusCode::Ok,
            content_type,
            Body::File {
                file,
                len: meta.len(),
            },
        );
        resp.last_modified = last_modified;

        if let Some(ext) = ext.as_deref() {
            resp.gzip = mime::is_gzipped(ext);
        }
        let leaf = leaf.to_ascii_lowercase();
        if ext.as_deref().is_some_and(mime::is_font) || leaf == "font.css" || leaf == "fonts.css" {
            resp.add_header("access-control-allow-origin", "*");
        }
        Ok(resp)
    }
}

// Public API
impl Response {
    #[inline(always)]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[inline]
    pub fn set_content_type<C: Into<String>>(&mut self, content_type: C) -> &mut Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Marks the content as gzip-compressed already (`content-encoding: gzip`).
    #[inline]
    pub fn set_gzipped(&mut self, gzipped: bool) -> &mut Self {
        self.gzip = gzipped;
        self
    }

    #[inline(always)]
    pub const fn is_gzipped(&self) -> bool {
        self.gzip
    }

    /// Size of the content if known up front; `None` means chunked.
    pub fn content_length(&self) -> Option<u64> {
        match self.body.as_ref()? {
            Body::Empty => Some(0),
            Body::Buffer(bytes) => Some(bytes.len() as u64),
            Body::File { len, .. } => Some(*len),
            Body::Stream(_) => None,
        }
    }

    /// Adds a header line. Values that would break the header block are
    /// dropped (with a warning) when the response is sent, and so are
    /// `content-length`, `transfer-encoding` and `connection`, which the
    /// response computes itself.
    #[inline]
    pub fn add_header<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        self.headers.push(Header::new(name, value));
        self
    }

    #[inline]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Last-modified time in epoch seconds; `0` means unknown.
    #[inline]
    pub fn set_last_modified(&mut self, epoch_secs: i64) -> &mut Self {
        self.last_modified = epoch_secs;
        self
    }

    #[inline(always)]
    pub const fn last_modified(&self) -> i64 {
        self.last_modified
    }

    /// Cache lifetime of a `200` response in seconds. `0` disables caching,
    /// a negative value means one year, larger values are capped at a year.
    #[inline]
    pub fn set_max_age(&mut self, secs: i64) -> &mut Self {
        self.max_age = match secs < 0 {
            true => ONE_YEAR,
            false => secs.min(ONE_YEAR),
        };
        self
    }

    #[inline(always)]
    pub const fn max_age(&self) -> i64 {
        self.max_age
    }

    /// Sets a cookie; a later cookie with the same name replaces it.
    ///
    /// A negative `max_age` means one year. `Secure` is added automatically
    /// when the request arrived over an encrypted transport.
    pub fn set_cookie<N, V>(
        &mut self,
        name: N,
        value: V,
        path: Option<&str>,
        max_age: i64,
        http_only: bool,
    ) -> &mut Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        let cookie = SetCookie {
            name: name.into(),
            value: value.into(),
            path: path.map(str::to_owned),
            max_age: match max_age < 0 {
                true => ONE_YEAR,
                false => max_age,
            },
            http_only,
            secure: false,
        };

        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
        self
    }

    /// Expires the cookie `name` on the client, reusing the path of the
    /// request's highest-priority cookie with that name. Does nothing if
    /// the request carries no such cookie.
    pub fn delete_cookie(&mut self, req: &Request, name: &str) -> &mut Self {
        if let Some(cookie) = req.cookie(name) {
            let path = cookie.path().map(str::to_owned);
            self.set_cookie(name, "", path.as_deref(), 0, false);
        }
        self
    }

    #[inline]
    pub fn cookies(&self) -> &[SetCookie] {
        &self.cookies
    }

    /// Forces the connection to close after this response.
    #[inline]
    pub fn close_connection(&mut self) -> &mut Self {
        self.close = true;
        self
    }

    /// Releases the body: buffers are freed, files and streams closed.
    /// Safe to call any number of times.
    #[inline]
    pub fn close(&mut self) {
        self.body = None;
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }
}

// Sending
impl Response {
    /// Keep-alive decision for the response to `req`.
    #[inline]
    pub(crate) fn keep_alive(&self, req: &Request) -> bool {
        req.is_keep_alive() && !self.close && self.status != StatusCode::InternalServerError
    }

    /// Writes head and body to `sink`, then closes the body. The sink is
    /// flushed, and closed when the connection is not kept alive.
    pub(crate) fn send(
        &mut self,
        req: &Request,
        sink: &mut dyn Sink,
        limits: &RespLimits,
    ) -> Result<Sent, HttpError> {
        let keep_alive = self.keep_alive(req);
        let written = self.write_to(req, sink, limits, keep_alive);
        self.close();

        let length = written?;
        sink.flush()?;
        if !keep_alive {
            sink.close();
        }

        Ok(Sent {
            status: self.status,
            length,
            keep_alive,
        })
    }

    fn write_to(
        &mut self,
        req: &Request,
        sink: &mut dyn Sink,
        limits: &RespLimits,
        keep_alive: bool,
    ) -> io::Result<u64> {
        let framing = self.framing(req.is_secure());
        let head = self.head(req, limits, keep_alive, framing);
        sink.write_all(&head)?;

        if req.is_head() {
            return Ok(0);
        }

        match (self.body.as_mut(), framing) {
            (None | Some(Body::Empty), _) => Ok(0),
            (Some(Body::Buffer(bytes)), _) => {
                sink.write_all(bytes)?;
                Ok(bytes.len() as u64)
            }
            (Some(Body::File { file, len }), Framing::Length(_)) => {
                sink.send_file(file, *len)?;
                Ok(*len)
            }
            (Some(Body::File { file, len }), Framing::Chunked) => {
                write_chunked(&mut file.take(*len), sink, limits.chunk_size)
            }
            (Some(Body::Stream(reader)), _) => write_chunked(reader, sink, limits.chunk_size),
        }
    }

    // Encrypted transports cannot send files zero-copy
    fn framing(&self, secure: bool) -> Framing {
        match self.body.as_ref() {
            None | Some(Body::Empty) => Framing::Length(0),
            Some(Body::Buffer(bytes)) => Framing::Length(bytes.len() as u64),
            Some(Body::File { .. }) if secure => Framing::Chunked,
            Some(Body::File { len, .. }) => Framing::Length(*len),
            Some(Body::Stream(_)) => Framing::Chunked,
        }
    }

    fn head(&self, req: &Request, limits: &RespLimits, keep_alive: bool, framing: Framing) -> Vec<u8> {
        let now = date::now_secs();
        let mut buf = Vec::with_capacity(limits.head_capacity);

        buf.extend_from_slice(self.status.to_first_line(req.version()));
        header(&mut buf, "server", &limits.server_name);
        header(&mut buf, "date", date::format(now));
        header(&mut buf, "accept-encoding", "gzip");

        if let Some(id) = req.stream_id() {
            header(&mut buf, STREAM_ID_HEADER, id);
        }
        if let Some(value) = connection_header(req.version(), keep_alive) {
            header(&mut buf, "connection", value);
        }

        for h in &self.headers {
            if is_computed_header(&h.name) {
                tracing::warn!(name = %h.name, "skipping header computed by the engine");
                continue;
            }
            match is_header_safe(&h.name) && is_header_safe(&h.value) && !h.name.contains(':') {
                true => header(&mut buf, &h.name, &h.value),
                false => tracing::warn!(name = %h.name.escape_debug(), "skipping unsafe response header"),
            }
        }
        for cookie in &self.cookies {
            match cookie.is_valid() {
                true => header(&mut buf, "set-cookie", cookie.encode(req.is_secure())),
                false => tracing::warn!(name = %cookie.name.escape_debug(), "skipping invalid cookie"),
            }
        }

        match self.status {
            StatusCode::Ok => {
                if self.last_modified > 0 {
                    header(&mut buf, "last-modified", date::format(self.last_modified));
                }
                match self.max_age {
                    0 => no_cache(&mut buf),
                    max_age => {
                        buf.write("cache-control: max-age=");
                        buf.write(max_age);
                        buf.write("\r\n");
                        header(&mut buf, "expires", date::format(now + max_age));
                    }
                }
            }
            StatusCode::NotModified => {
                if let Some(ims) = req.if_modified_since_raw() {
                    header(&mut buf, "last-modified", ims);
                }
            }
            StatusCode::NotFound => {
                buf.write("cache-control: max-age=");
                buf.write(limits.not_found_max_age);
                buf.write("\r\n");
                header(
                    &mut buf,
                    "expires",
                    date::format(now + limits.not_found_max_age as i64),
                );
            }
            _ => no_cache(&mut buf),
        }

        header(
            &mut buf,
            "content-type",
            self.content_type.as_deref().unwrap_or(mime::OCTET_STREAM),
        );
        match framing {
            Framing::Length(len) => {
                buf.write("content-length: ");
                buf.write(len);
                buf.write("\r\n");
            }
            Framing::Chunked => header(&mut buf, "transfer-encoding", "chunked"),
        }
        if self.gzip {
            header(&mut buf, "content-encoding", "gzip");
        }

        buf.write("\r\n");
        buf
    }
}

impl Drop for Response {
    #[inline]
    fn drop(&mut self) {
        self.close();
    }
}

#[inline]
fn header<V: WriteBuffer>(buf: &mut Vec<u8>, name: &str, value: V) {
    buf.write(name);
    buf.write(": ");
    buf.write(value);
    buf.write("\r\n");
}

#[inline]
fn no_cache(buf: &mut Vec<u8>) {
    header(buf, "cache-control", "no-cache, no-store, must-revalidate");
    header(buf, "pragma", "no-cache");
    header(buf, "expires", "0");
}

// Framing and connection headers come from the response itself
#[inline]
fn is_computed_header(name: &str) -> bool {
    ["content-length", "transfer-encoding", "connection"]
        .iter()
        .any(|computed| name.eq_ignore_ascii_case(computed))
}

#[inline(always)]
const fn connection_header(version: Version, keep_alive: bool) -> Option<&'static str> {
    match (version, keep_alive) {
        (Version::Http11, true) => None,
        (Version::Http11, false) => Some("close"),
        (Version::Http10, true) => Some("keep-alive"),
        (Version::Http10, false) => Some("close"),
        // Connection-specific headers are not allowed in HTTP/2
        (Version::Http2, _) => None,
    }
}

fn write_chunked(reader: &mut dyn Read, sink: &mut dyn Sink, chunk_size: usize) -> io::Result<u64> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut frame = Vec::with_capacity(buf.len() + 16);
    let mut total = 0;

    loop {
        let n = read_full(reader, &mut buf)?;
        if n == 0 {
            break;
        }

        frame.clear();
        frame.extend_from_slice(format!("{n:x}\r\n").as_bytes());
        frame.extend_from_slice(&buf[..n]);
        frame.extend_from_slice(b"\r\n");
        sink.write_all(&frame)?;
        total += n as u64;
    }

    sink.write_all(b"0\r\n\r\n")?;
    Ok(total)
}

// Fills `buf` unless the reader runs dry first
pub(crate) fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

trait WriteExt {
    fn write<T: WriteBuffer>(&mut self, value: T);
}

impl WriteExt for Vec<u8> {
    #[inline(always)]
    fn write<T: WriteBuffer>(&mut self, value: T) {
        value.write_to(self);
    }
}

pub mod write {
    use std::{borrow::Cow, sync::Arc};

    /// Writer for constructing a response body in memory.
    /// Used in [`Response::buffer_with`](super::Response::buffer_with).
    ///
    /// # Examples
    ///
    /// With [WriteBuffer]:
    /// ```
    /// use sluice::{Response, StatusCode};
    ///
    /// let resp = Response::buffer_with(StatusCode::Ok, "text/html", |w| {
    ///     w.write("<p>");
    ///     w.write(123);
    ///     w.write(true);
    ///     w.write("</p>");
    /// });
    /// # assert_eq!(resp.content_length(), Some(14));
    /// ```
    /// With [std::io::Write]:
    /// ```
    /// use sluice::{Response, StatusCode};
    /// use std::io::Write;
    ///
    /// let resp = Response::buffer_with(StatusCode::Ok, "text/plain", |w| {
    ///     write!(w, "{} - {} = {}", 6, 2, 4).unwrap();
    /// });
    /// # assert_eq!(resp.content_length(), Some(9));
    /// ```
    #[derive(Debug)]
    pub struct BodyWriter<'a>(pub(crate) &'a mut Vec<u8>);

    impl BodyWriter<'_> {
        /// Appends content to the body.
        #[inline]
        pub fn write<T: WriteBuffer>(&mut self, value: T) {
            value.write_to(self.0);
        }
    }

    impl std::io::Write for BodyWriter<'_> {
        #[inline]
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        #[inline]
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Trait for writing values into a byte buffer without intermediate
    /// allocations.
    ///
    /// Implemented for strings, bytes, booleans, chars and integers.
    /// Floating-point numbers are left out on purpose: their formatting is
    /// a presentation decision for the caller.
    ///
    /// # Example
    /// ```
    /// use sluice::WriteBuffer;
    ///
    /// struct Celsius(i32);
    ///
    /// impl WriteBuffer for Celsius {
    ///     fn write_to(&self, buffer: &mut Vec<u8>) {
    ///         self.0.write_to(buffer);
    ///         buffer.extend_from_slice("°C".as_bytes());
    ///     }
    /// }
    /// ```
    pub trait WriteBuffer {
        /// Writes the value's representation directly to the buffer.
        fn write_to(&self, buffer: &mut Vec<u8>);
    }

    macro_rules! impl_write_buffer {
        (bytes, $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let closure = $conn;
                    closure(self, buffer);
                }
            })*
        };
        (number($type:ty), $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(*self as $type, buffer);
                }
            })*
        };
    }

    impl<T: WriteBuffer + ?Sized> WriteBuffer for &T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl_write_buffer! {
        bytes, |value: &str, buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value.as_bytes());
        } => str, String, Box<str>, Cow<'_, str>, Arc<str>
    }
    impl_write_buffer! {
        bytes, |value: &[u8], buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value);
        } => [u8], Vec<u8>, Box<[u8]>, Cow<'_, [u8]>, Arc<[u8]>
    }
    impl<const N: usize> WriteBuffer for [u8; N] {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self);
        }
    }
    impl_write_buffer! {
        number(u128), write_u128 => u8, u16, u32, u64, u128, usize
    }
    impl_write_buffer! {
        number(i128), write_i128 => i8, i16, i32, i64, i128, isize
    }
    impl WriteBuffer for bool {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(match self {
                true => b"true",
                false => b"false",
            });
        }
    }
    impl WriteBuffer for char {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            let mut buf = [0u8; 4];
            buffer.extend_from_slice(self.encode_utf8(&mut buf).as_bytes());
        }
    }

    #[inline]
    const fn number_to_bytes(mut n: u128) -> ([u8; 39], usize) {
        let mut buffer = [b'0'; 39];
        let mut i = 39;

        if n == 0 {
            return (buffer, 38);
        }

        while n > 0 {
            i -= 1;
            buffer[i] = b'0' + (n % 10) as u8;
            n /= 10;
        }

        (buffer, i)
    }

    #[inline(always)]
    fn write_u128(value: u128, buffer: &mut Vec<u8>) {
        let (arr, start) = number_to_bytes(value);
        buffer.extend_from_slice(&arr[start..]);
    }

    #[inline(always)]
    fn write_i128(value: i128, buffer: &mut Vec<u8>) {
        if value < 0 {
            buffer.push(b'-');
        }
        let (arr, start) = number_to_bytes(value.unsigned_abs());
        buffer.extend_from_slice(&arr[start..]);
    }

    #[cfg(test)]
    mod write_tests {
        use super::*;

        #[test]
        fn values() {
            let mut buf = Vec::new();
            "a".write_to(&mut buf);
            0u8.write_to(&mut buf);
            1234567usize.write_to(&mut buf);
            (-42i64).write_to(&mut buf);
            i128::MIN.write_to(&mut buf);
            true.write_to(&mut buf);
            'é'.write_to(&mut buf);
            b"!!".write_to(&mut buf);

            assert_eq!(
                std::str::from_utf8(&buf).unwrap(),
                "a01234567-42-170141183460469231731687303715884105728trueé!!"
            );
        }
    }
}



#[cfg(test)]
mod file_tests {
    use super::*;
    use crate::{errors::ErrorKind, tools::*};
    use std::path::PathBuf;

    struct Fixture(PathBuf);

    impl Fixture {
        fn new(name: &str, content: &[u8]) -> Self {
            let dir = std::env::temp_dir().join(format!("sluice-files-{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            std::fs::write(&path, content).unwrap();
            Fixture(path)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn zero_copy_on_plain_transport() {
        let fixture = Fixture::new("page.html", b"<h1>hi</h1>");
        let req = request("GET", "/page.html", &[]);

        let mut resp = Response::file(&req, &fixture.0).unwrap();
        assert_eq!(resp.content_type(), Some("text/html;charset=utf-8"));
        assert!(resp.last_modified() > 0);

        let mut sink = MemorySink::default();
        resp.send(&req, &mut sink, &RespLimits::default()).unwrap();
        assert_eq!(sink.files_sent, 1);

        let (head, body) = split_response(&sink.written);
        assert_eq!(header_value(&head, "content-length"), Some("11"));
        assert!(header_value(&head, "last-modified").is_some());
        assert_eq!(body, b"<h1>hi</h1>");
    }

    #[test]
    fn chunked_on_secure_transport() {
        let fixture = Fixture::new("data.json", b"{\"a\":1}");
        let req = request_secure("GET", "/data.json");

        let mut resp = Response::file(&req, &fixture.0).unwrap();
        let mut sink = MemorySink::default();
        resp.send(&req, &mut sink, &RespLimits::default()).unwrap();
        assert_eq!(sink.files_sent, 0);

        let (head, body) = split_response(&sink.written);
        assert_eq!(header_value(&head, "transfer-encoding"), Some("chunked"));
        assert_eq!(body, b"7\r\n{\"a\":1}\r\n0\r\n\r\n");
    }

    #[test]
    fn svgz_and_fonts() {
        let svgz = Fixture::new("icon.svgz", b"\x1f\x8b");
        let font = Fixture::new("face.woff2", b"wOF2");
        let req = request("GET", "/", &[]);

        let resp = Response::file(&req, &svgz.0).unwrap();
        assert!(resp.is_gzipped());
        assert_eq!(resp.content_type(), Some("image/svg+xml"));

        let resp = Response::file(&req, &font.0).unwrap();
        assert!(!resp.is_gzipped());
        assert_eq!(resp.headers(), [Header::new("access-control-allow-origin", "*")]);
    }

    #[test]
    fn not_found_and_not_modified() {
        let hidden = Fixture::new(".secret", b"x");
        let plain = Fixture::new("plain.txt", b"x");
        let req = request("GET", "/", &[]);

        #[rustfmt::skip]
        let cases = [
            (hidden.0.clone(), ErrorKind::NotFound),
            (plain.0.with_file_name("missing.txt"), ErrorKind::NotFound),
            (std::env::temp_dir(), ErrorKind::NotFound),
        ];
        for (path, kind) in cases {
            assert_eq!(Response::file(&req, &path).unwrap_err().kind(), kind, "{path:?}");
        }

        let later = date::format(date::now_secs() + 3600);
        let req = request("GET", "/", &[("If-Modified-Since", later.as_str())]);
        assert_eq!(
            Response::file(&req, &plain.0).unwrap_err().kind(),
            ErrorKind::NotModified
        );

        let earlier = date::format(1);
        let req = request("GET", "/", &[("If-Modified-Since", earlier.as_str())]);
        assert_eq!(Response::file(&req, &plain.0).unwrap().status(), StatusCode::Ok);
    }
}
