use crate::{
    errors::HttpError,
    http::{
        cookie::{Cookie, CookieJar},
        date,
        types::{contains_token, Header},
        upload::FileUpload,
        url::{QueryMap, Url},
    },
    limits::ReqLimits,
    server::events::{ConnInfo, RequestHead},
    Method, Version,
};
use std::{collections::HashMap, net::SocketAddr};

/// Header carrying the stream identifier of a multiplexed (HTTP/2) request.
pub(crate) const STREAM_ID_HEADER: &str = "x-http2-stream-id";

/// One HTTP request, built once its head has been received.
///
/// Everything except the POST maps is fixed at construction. The POST
/// maps fill up while the body streams in and are complete when the
/// handler is called.
///
/// # Derived fields
///
/// | Field                 | Source                                                       |
/// |-----------------------|--------------------------------------------------------------|
/// | [`method`]            | start line; `HEAD` becomes `GET` with [`is_head`] set        |
/// | [`url`]               | start line target, normalized                                |
/// | [`is_keep_alive`]     | version default, overridden by `Connection`                  |
/// | [`cookie`]            | all `Cookie` headers; malformed syntax fails the request     |
/// | [`if_modified_since`] | `If-Modified-Since`; an unparsable date counts as absent     |
/// | [`stream_id`]         | `x-http2-stream-id`, set by multiplexing transports          |
///
/// [`method`]: Request::method
/// [`url`]: Request::url
/// [`is_keep_alive`]: Request::is_keep_alive
/// [`cookie`]: Request::cookie
/// [`if_modified_since`]: Request::if_modified_since
/// [`stream_id`]: Request::stream_id
/// [`is_head`]: Request::is_head
#[derive(Debug)]
pub struct Request {
    method: Method,
    is_head: bool,
    url: Url,
    version: Version,
    keep_alive: bool,
    expects_continue: bool,

    headers: Vec<Header>,
    accept_gzip: bool,
    if_modified_since: i64,
    cookies: CookieJar,

    post_params: HashMap<String, String>,
    file_uploads: HashMap<String, FileUpload>,

    stream_id: Option<String>,
    client_addr: Option<SocketAddr>,
    secure: bool,
    received_at: u64,
}

impl Request {
    /// Builds the request model from a received head.
    pub(crate) fn from_head(
        head: RequestHead,
        info: &ConnInfo,
        limits: &ReqLimits,
    ) -> Result<Self, HttpError> {
        let received_at = date::now_millis();

        let method = Method::from_bytes(head.method.as_bytes())?;
        let version = Version::from_bytes(head.version.as_bytes())?;

        if head.headers.len() > limits.max_headers {
            return Err(HttpError::bad_request("too many headers"));
        }
        for header in &head.headers {
            if header.name.is_empty() {
                return Err(HttpError::bad_request("empty header name"));
            }
        }

        let url = match head.target.as_str() {
            "" => Url::parse("/", limits.max_query_params)?,
            target => Url::parse(target, limits.max_query_params)?,
        };

        let cookies = CookieJar::parse(
            head.headers
                .iter()
                .filter(|h| h.name.eq_ignore_ascii_case("cookie"))
                .map(|h| h.value.as_str()),
            limits.max_cookies,
        )?;

        let mut request = Request {
            method: match method {
                Method::Head => Method::Get,
                other => other,
            },
            is_head: method == Method::Head,
            url,
            version,
            keep_alive: version.default_keep_alive(),
            expects_continue: false,

            headers: head.headers,
            accept_gzip: false,
            if_modified_since: 0,
            cookies,

            post_params: HashMap::new(),
            file_uploads: HashMap::new(),

            stream_id: None,
            client_addr: info.peer,
            secure: info.secure,
            received_at,
        };
        request.extract_headers();
        Ok(request)
    }

    fn extract_headers(&mut self) {
        if let Some(value) = self.header("connection") {
            if contains_token(value, "close") {
                self.keep_alive = false;
            } else if contains_token(value, "keep-alive") {
                self.keep_alive = true;
            }
        }

        self.accept_gzip = self
            .header("accept-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"));

        self.if_modified_since = self
            .header("if-modified-since")
            .and_then(date::parse)
            .unwrap_or(0);

        self.expects_continue = self
            .header("expect")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"));

        self.stream_id = self.header(STREAM_ID_HEADER).map(str::to_owned);
    }
}

// Public API
impl Request {
    /// Request method; `HEAD` requests report [`Method::Get`].
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// `true` when the client sent `HEAD`: the response body is suppressed.
    #[inline(always)]
    pub const fn is_head(&self) -> bool {
        self.is_head
    }

    #[inline(always)]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Normalized path, see [`Url::path`].
    #[inline(always)]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    #[inline(always)]
    pub const fn version(&self) -> Version {
        self.version
    }

    #[inline(always)]
    pub const fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[inline(always)]
    pub(crate) const fn expects_continue(&self) -> bool {
        self.expects_continue
    }

    /// `true` when the request arrived over an encrypted transport.
    #[inline(always)]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    #[inline(always)]
    pub const fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Milliseconds since the Unix epoch at which the head was received.
    #[inline(always)]
    pub const fn received_at(&self) -> u64 {
        self.received_at
    }

    /// Stream identifier of a multiplexed request.
    #[inline(always)]
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// Returns the first header value with case-insensitive name matching
    /// (per [RFC 7230](https://tools.ietf.org/html/rfc7230#section-3.2)).
    /// Uses linear search.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All header lines in arrival order.
    #[inline(always)]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// `Host`, or the `:authority` pseudo-header of an HTTP/2 request.
    #[inline]
    pub fn host(&self) -> Option<&str> {
        self.header("host").or_else(|| self.header(":authority"))
    }

    #[inline]
    pub fn accept(&self) -> Option<&str> {
        self.header("accept")
    }

    #[inline]
    pub fn accept_charset(&self) -> Option<&str> {
        self.header("accept-charset")
    }

    #[inline]
    pub fn accept_language(&self) -> Option<&str> {
        self.header("accept-language")
    }

    /// `true` when `Accept-Encoding` mentions gzip.
    #[inline(always)]
    pub const fn accepts_gzip(&self) -> bool {
        self.accept_gzip
    }

    #[inline]
    pub fn referer(&self) -> Option<&str> {
        self.header("referer")
    }

    #[inline]
    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    #[inline]
    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }

    #[inline]
    pub fn x_requested_with(&self) -> Option<&str> {
        self.header("x-requested-with")
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Raw `If-Modified-Since` value.
    #[inline]
    pub fn if_modified_since_raw(&self) -> Option<&str> {
        self.header("if-modified-since")
    }

    /// `If-Modified-Since` in epoch seconds, `0` when absent or unparsable.
    #[inline(always)]
    pub const fn if_modified_since(&self) -> i64 {
        self.if_modified_since
    }

    /// Whether a resource last modified at `last_modified` (epoch seconds)
    /// is newer than the client's cached copy. Unknown timestamps (`0`)
    /// always count as modified.
    ///
    /// HTTP dates have one-second granularity, so equal timestamps mean
    /// not modified.
    #[inline]
    pub const fn content_modified(&self, last_modified: i64) -> bool {
        if last_modified == 0 || self.if_modified_since == 0 {
            true
        } else {
            last_modified > self.if_modified_since
        }
    }

    /// The highest-priority cookie called `name`: longest path first,
    /// newest first among equal paths.
    #[inline]
    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    #[inline]
    pub fn cookie_value(&self, name: &str) -> Option<&str> {
        self.cookie(name).map(Cookie::value)
    }

    /// Every cookie called `name`, in priority order.
    #[inline]
    pub fn all_cookies(&self, name: &str) -> &[Cookie] {
        self.cookies.get_all(name)
    }

    #[inline(always)]
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// First value of query parameter `name`.
    #[inline]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.url.query(name)
    }

    /// Every value of query parameter `name`, in order.
    #[inline]
    pub fn query_params(&self, name: &str) -> &[String] {
        self.url.query_all(name)
    }

    #[inline]
    pub fn query_map(&self) -> &QueryMap {
        self.url.query_map()
    }

    /// Value of the POST attribute `name`.
    #[inline]
    pub fn post_param(&self, name: &str) -> Option<&str> {
        self.post_params.get(name).map(String::as_str)
    }

    #[inline]
    pub fn post_param_names(&self) -> impl Iterator<Item = &str> {
        self.post_params.keys().map(String::as_str)
    }

    #[inline]
    pub fn file_upload(&self, name: &str) -> Option<&FileUpload> {
        self.file_uploads.get(name)
    }

    /// Removes the upload from the request. The caller now owns the
    /// temporary file and its deletion.
    #[inline]
    pub fn take_file_upload(&mut self, name: &str) -> Option<FileUpload> {
        self.file_uploads.remove(name)
    }

    #[inline]
    pub fn file_upload_names(&self) -> impl Iterator<Item = &str> {
        self.file_uploads.keys().map(String::as_str)
    }
}

// Body decoding and cleanup
impl Request {
    #[inline]
    pub(crate) fn post_param_count(&self) -> usize {
        self.post_params.len() + self.file_uploads.len()
    }

    #[inline]
    pub(crate) fn set_post_param(&mut self, name: String, value: String) {
        self.post_params.insert(name, value);
    }

    /// Stores an upload; an upload already stored under the same field is
    /// released.
    pub(crate) fn set_file_upload(&mut self, upload: FileUpload) {
        if let Some(mut old) = self.file_uploads.insert(upload.field.clone(), upload) {
            old.release();
        }
    }

    /// Deletes every upload still owned by the request.
    pub(crate) fn release_uploads(&mut self) {
        for (_, mut upload) in self.file_uploads.drain() {
            upload.release();
        }
    }

    #[inline]
    pub(crate) fn force_close(&mut self) {
        self.keep_alive = false;
    }
}
