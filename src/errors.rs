//! Typed request failures and their HTTP rendering.
//!
//! Every stage of request processing returns `Result<_, HttpError>`. A
//! failure knows its [`ErrorKind`], the kind knows its status code and its
//! default message, and the connection renders it through a registered
//! error handler or [`HttpError::default_response`].

use crate::http::{cookie::CookieError, response::Response, types::StatusCode, utf8::Utf8Error};
use std::{backtrace::Backtrace, io};

/// Boxed cause carried by [`HttpError::Internal`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure that ends the processing of one request.
///
/// Redirects and `304 Not Modified` are failures too: they short-circuit a
/// handler the same way errors do, but render as ordinary responses.
///
/// # Examples
/// ```
/// use sluice::{ErrorKind, HttpError, StatusCode};
///
/// let err = HttpError::bad_request("missing field `name`");
/// assert_eq!(err.kind(), ErrorKind::BadRequest);
/// assert_eq!(err.kind().status(), StatusCode::BadRequest);
/// assert_eq!(err.message(), "Bad Request -- missing field `name`");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Bad Request{}", detail(.0))]
    BadRequest(Option<String>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not Found")]
    NotFound,

    #[error("Redirect to {location}")]
    Redirect { location: String, permanent: bool },

    #[error("Not Modified")]
    NotModified,

    #[error("Request Timeout")]
    RequestTimeout,

    #[error("Payload Too Large")]
    PayloadTooLarge,

    #[error("Upgrade Required")]
    UpgradeRequired,

    #[error("Internal Server Error: {cause}")]
    Internal {
        #[source]
        cause: BoxError,
        backtrace: Box<Backtrace>,
    },
}

fn detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(" -- {detail}"),
        None => String::new(),
    }
}

impl HttpError {
    #[inline]
    pub fn bad_request<D: Into<String>>(detail: D) -> Self {
        HttpError::BadRequest(Some(detail.into()))
    }

    /// Wraps a local failure, capturing a backtrace.
    #[inline]
    pub fn internal<E: Into<BoxError>>(cause: E) -> Self {
        HttpError::Internal {
            cause: cause.into(),
            backtrace: Box::new(Backtrace::capture()),
        }
    }

    /// A `302 Found` redirect.
    #[inline]
    pub fn redirect<L: Into<String>>(location: L) -> Self {
        HttpError::Redirect {
            location: location.into(),
            permanent: false,
        }
    }

    /// A `301 Moved Permanently` redirect.
    #[inline]
    pub fn permanent_redirect<L: Into<String>>(location: L) -> Self {
        HttpError::Redirect {
            location: location.into(),
            permanent: true,
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            HttpError::BadRequest(_) => ErrorKind::BadRequest,
            HttpError::Unauthorized => ErrorKind::Unauthorized,
            HttpError::Forbidden => ErrorKind::Forbidden,
            HttpError::NotFound => ErrorKind::NotFound,
            HttpError::Redirect { .. } => ErrorKind::Redirect,
            HttpError::NotModified => ErrorKind::NotModified,
            HttpError::RequestTimeout => ErrorKind::RequestTimeout,
            HttpError::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            HttpError::UpgradeRequired => ErrorKind::UpgradeRequired,
            HttpError::Internal { .. } => ErrorKind::InternalServerError,
        }
    }

    /// Status code of the default rendering.
    #[inline]
    pub const fn status(&self) -> StatusCode {
        match self {
            HttpError::Redirect {
                permanent: true, ..
            } => StatusCode::MovedPermanently,
            _ => self.kind().status(),
        }
    }

    /// Text of the default error page.
    pub fn message(&self) -> String {
        match self {
            HttpError::BadRequest(Some(detail)) => {
                format!("{} -- {detail}", ErrorKind::BadRequest.message())
            }
            _ => self.kind().message(),
        }
    }

    /// `true` when the peer went away: such failures are not worth a
    /// response or an error log.
    pub fn is_disconnect(&self) -> bool {
        match self {
            HttpError::Internal { cause, .. } => cause
                .downcast_ref::<io::Error>()
                .is_some_and(|err| is_disconnect(err.kind())),
            _ => false,
        }
    }

    /// Renders the failure without any per-kind override.
    pub fn default_response(&self) -> Response {
        match self {
            HttpError::Redirect { location, .. } => {
                let mut resp = Response::empty(self.status());
                resp.add_header("location", location.as_str());
                resp
            }
            HttpError::NotModified => Response::empty(StatusCode::NotModified),
            HttpError::UpgradeRequired => {
                let mut resp = Response::text(self.status(), self.message());
                resp.add_header("sec-websocket-version", "13");
                resp
            }
            _ => Response::text(self.status(), self.message()),
        }
    }

    /// Emits the log event for this failure, if its kind deserves one.
    pub(crate) fn log(&self) {
        match self {
            HttpError::Internal { cause, backtrace } => {
                tracing::error!(%cause, %backtrace, "internal server error");
            }
            err if !err.kind().is_lightweight() => {
                tracing::warn!(kind = err.kind().name(), "{err}");
            }
            _ => {}
        }
    }
}

#[inline]
pub(crate) fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionAborted
    )
}

impl From<io::Error> for HttpError {
    #[inline]
    fn from(err: io::Error) -> Self {
        HttpError::internal(err)
    }
}

impl From<CookieError> for HttpError {
    #[inline]
    fn from(err: CookieError) -> Self {
        HttpError::bad_request(err.to_string())
    }
}

impl From<Utf8Error> for HttpError {
    #[inline]
    fn from(err: Utf8Error) -> Self {
        HttpError::bad_request(err.to_string())
    }
}

macro_rules! error_kinds {
    ($($name:ident => $status:ident, $lightweight:literal;)+) => {
        /// Fieldless discriminant of [`HttpError`], used as the key of the
        /// error-handler registry.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorKind { $(
            #[doc = concat!("Renders as `", stringify!($status), "` by default")]
            $name,
        )+ }

        impl ErrorKind {
            /// Identifier of the kind, e.g. `"NotFound"`.
            pub const fn name(&self) -> &'static str {
                match self { $(
                    ErrorKind::$name => stringify!($name),
                )+ }
            }

            pub const fn status(&self) -> StatusCode {
                match self { $(
                    ErrorKind::$name => StatusCode::$status,
                )+ }
            }

            /// Lightweight failures are expected on the hot path: no
            /// backtrace and no log event.
            pub const fn is_lightweight(&self) -> bool {
                match self { $(
                    ErrorKind::$name => $lightweight,
                )+ }
            }
        }
    };
}

error_kinds! {
    BadRequest => BadRequest, true;
    Unauthorized => Unauthorized, false;
    Forbidden => Forbidden, false;
    NotFound => NotFound, true;
    Redirect => Found, true;
    NotModified => NotModified, true;
    RequestTimeout => RequestTimeout, false;
    PayloadTooLarge => PayloadTooLarge, false;
    UpgradeRequired => UpgradeRequired, false;
    InternalServerError => InternalServerError, false;
}

impl ErrorKind {
    /// Human-readable default message derived from [`name`](Self::name).
    ///
    /// # Examples
    /// ```
    /// use sluice::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::InternalServerError.message(), "Internal Server Error");
    /// assert_eq!(ErrorKind::NotFound.message(), "Not Found");
    /// ```
    #[inline]
    pub fn message(&self) -> String {
        humanize(self.name())
    }
}

/// Splits an identifier into words at lowercase→uppercase transitions and
/// strips a trailing `Exception`/`Rejection` word.
pub(crate) fn humanize(name: &str) -> String {
    let mut words: Vec<&str> = Vec::new();
    let mut start = 0;

    let bytes = name.as_bytes();
    for i in 1..bytes.len() {
        if bytes[i - 1].is_ascii_lowercase() && bytes[i].is_ascii_uppercase() {
            words.push(&name[start..i]);
            start = i;
        }
    }
    words.push(&name[start..]);

    if words.len() > 1 && matches!(words.last(), Some(&("Exception" | "Rejection"))) {
        words.pop();
    }
    words.join(" ")
}

/// Prebuilt responses for failures that cannot go through a
/// [`Response`]: no request was assembled, or rendering the real
/// response failed.
pub(crate) mod fallback {
    macro_rules! static_responses {
        ($($name:ident: $status:literal, $len:literal => $body:literal;)+) => {$(
            pub(crate) const $name: &[u8] = concat!(
                "HTTP/1.1 ", $status, "\r\n",
                "content-type: text/plain;charset=utf-8\r\n",
                "cache-control: no-cache, no-store, must-revalidate\r\n",
                "pragma: no-cache\r\n",
                "expires: 0\r\n",
                "connection: close\r\n",
                "content-length: ", $len, "\r\n",
                "\r\n",
                $body
            ).as_bytes();
        )+};
    }

    static_responses! {
        BAD_REQUEST: "400 Bad Request", "11" => "Bad Request";
        REQUEST_TIMEOUT: "408 Request Timeout", "15" => "Request Timeout";
        INTERNAL_ERROR: "500 Internal Server Error", "21" => "Internal Server Error";
    }
}

#[cfg(test)]
mod errors_tests {
    use super::*;

    #[test]
    fn humanize_names() {
        #[rustfmt::skip]
        let cases = [
            ("InternalServerError", "Internal Server Error"),
            ("NotFound", "Not Found"),
            ("BadRequest", "Bad Request"),
            ("ForbiddenException", "Forbidden"),
            ("UnauthorizedRejection", "Unauthorized"),
            ("Exception", "Exception"),
            ("Redirect", "Redirect"),
        ];

        for (name, expected) in cases {
            assert_eq!(humanize(name), expected);
        }
    }

    #[test]
    fn kinds() {
        #[rustfmt::skip]
        let cases = [
            (HttpError::BadRequest(None), ErrorKind::BadRequest, 400, true),
            (HttpError::Unauthorized, ErrorKind::Unauthorized, 401, false),
            (HttpError::Forbidden, ErrorKind::Forbidden, 403, false),
            (HttpError::NotFound, ErrorKind::NotFound, 404, true),
            (HttpError::redirect("/a"), ErrorKind::Redirect, 302, true),
            (HttpError::permanent_redirect("/a"), ErrorKind::Redirect, 301, true),
            (HttpError::NotModified, ErrorKind::NotModified, 304, true),
            (HttpError::RequestTimeout, ErrorKind::RequestTimeout, 408, false),
            (HttpError::PayloadTooLarge, ErrorKind::PayloadTooLarge, 413, false),
            (HttpError::UpgradeRequired, ErrorKind::UpgradeRequired, 426, false),
            (HttpError::internal("boom"), ErrorKind::InternalServerError, 500, false),
        ];

        for (err, kind, status, lightweight) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(kind.is_lightweight(), lightweight);
        }
    }

    #[test]
    fn messages() {
        assert_eq!(HttpError::BadRequest(None).message(), "Bad Request");
        assert_eq!(HttpError::bad_request("no").message(), "Bad Request -- no");
        assert_eq!(HttpError::bad_request("no").to_string(), "Bad Request -- no");
        assert_eq!(HttpError::NotFound.message(), "Not Found");
        assert_eq!(HttpError::internal("boom").message(), "Internal Server Error");
        assert_eq!(
            HttpError::internal("boom").to_string(),
            "Internal Server Error: boom"
        );
    }

    #[test]
    fn disconnects() {
        #[rustfmt::skip]
        let cases = [
            (io::ErrorKind::ConnectionReset, true),
            (io::ErrorKind::BrokenPipe, true),
            (io::ErrorKind::ConnectionAborted, true),
            (io::ErrorKind::PermissionDenied, false),
            (io::ErrorKind::UnexpectedEof, false),
        ];

        for (kind, expected) in cases {
            let err = HttpError::from(io::Error::new(kind, "peer"));
            assert_eq!(err.kind(), ErrorKind::InternalServerError);
            assert_eq!(err.is_disconnect(), expected, "{kind:?}");
        }
        assert!(!HttpError::NotFound.is_disconnect());
    }

    #[test]
    fn conversions() {
        let err = HttpError::from(CookieError::Malformed("empty name"));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(err.message().contains("empty name"));

        let err = HttpError::from(Utf8Error::Incomplete);
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn fallback_lengths() {
        let cases = [
            (fallback::BAD_REQUEST, "Bad Request"),
            (fallback::REQUEST_TIMEOUT, "Request Timeout"),
            (fallback::INTERNAL_ERROR, "Internal Server Error"),
        ];

        for (bytes, body) in cases {
            let text = std::str::from_utf8(bytes).unwrap();
            let (head, rest) = text.split_once("\r\n\r\n").unwrap();

            assert_eq!(rest, body);
            assert!(head.contains(&format!("content-length: {}", body.len())));
            assert!(head.contains("connection: close"));
        }
    }
}
