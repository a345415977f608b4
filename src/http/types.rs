#![allow(rustdoc::bare_urls)]

//! Core HTTP protocol types

use crate::errors::HttpError;

// METHOD

/// HTTP request methods
///
/// # References
///
/// - [RFC 7231, Section 4](https://datatracker.ietf.org/doc/html/rfc7231#section-4)
/// - [RFC 5789](https://datatracker.ietf.org/doc/html/rfc5789) (PATCH method)
///
/// # Disabled methods
///
/// * `TRACE` - disabled for security reasons
/// * `CONNECT` - disabled because it is no longer needed
///
/// `HEAD` requests are dispatched as [`Method::Get`] with
/// [`Request::is_head`](crate::Request::is_head) set, so a handler written
/// for `GET` serves both.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method - transfer a current representation of the target resource
    Get,
    /// PUT method - replace all current representations of the target resource
    Put,
    /// POST method - perform resource-specific processing on the request payload
    Post,
    /// HEAD method - same as GET but without response body
    Head,
    /// PATCH method - apply partial modifications to a resource
    Patch,
    /// DELETE method - remove all current representations of the target resource
    Delete,
    /// OPTIONS method - describe the communication options for the target resource
    Options,
}

impl Method {
    #[inline]
    pub(crate) fn from_bytes(src: &[u8]) -> Result<Self, HttpError> {
        match src {
            b"GET" => Ok(Method::Get),
            b"PUT" => Ok(Method::Put),
            b"POST" => Ok(Method::Post),
            b"HEAD" => Ok(Method::Head),
            b"PATCH" => Ok(Method::Patch),
            b"DELETE" => Ok(Method::Delete),
            b"OPTIONS" => Ok(Method::Options),
            _ => Err(HttpError::bad_request("unsupported method")),
        }
    }

    /// Returns the method token as sent on the wire.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

// VERSION

/// HTTP protocol version
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/1.0 - [RFC 1945](https://tools.ietf.org/html/rfc1945)
    Http10,

    /// HTTP/1.1 - [RFC 7230](https://tools.ietf.org/html/rfc7230) and related
    Http11,

    /// HTTP/2 - the transport substrate translates frames into the same
    /// event stream as HTTP/1.1 and tags each request with a stream id
    Http2,
}

impl Version {
    #[inline]
    pub(crate) fn from_bytes(src: &[u8]) -> Result<Self, HttpError> {
        match src {
            b"HTTP/1.1" => Ok(Self::Http11),
            b"HTTP/1.0" => Ok(Self::Http10),
            b"HTTP/2" | b"HTTP/2.0" => Ok(Self::Http2),
            _ => Err(HttpError::bad_request("unsupported protocol version")),
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
            Version::Http2 => "HTTP/2.0",
        }
    }

    /// Whether connections stay open by default for this version.
    #[inline]
    pub(crate) const fn default_keep_alive(&self) -> bool {
        !matches!(self, Version::Http10)
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $name:ident = ($num:expr, $str:expr);
    )+) => {
        /// HTTP status codes
        ///
        /// Represents valid HTTP status codes as defined in
        /// [RFC 9110](https://datatracker.ietf.org/doc/html/rfc9110#section-15) and other standards.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $name = $num,
        )+ }

        impl StatusCode {
            // Returns the HTTP first line as bytes (e.g., `b"HTTP/1.1 200 OK\r\n"`).
            // HTTP/2 heads are written in HTTP/1.1 form for the substrate to re-frame.
            #[inline]
            pub(crate) const fn to_first_line(&self, version: Version) -> &'static [u8] {
                match (self, version) { $(
                    (StatusCode::$name, Version::Http10) => {
                        concat!("HTTP/1.0 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                    (StatusCode::$name, _) => {
                        concat!("HTTP/1.1 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                )+ }
            }

            /// Returns the reason phrase (e.g., `"Not Found"`).
            #[inline]
            pub const fn reason(&self) -> &'static str {
                match self { $(
                    StatusCode::$name => $str,
                )+ }
            }

            /// Returns the numeric code.
            #[inline]
            pub const fn as_u16(&self) -> u16 {
                *self as u16
            }
        }
    }
}

set_status_codes! {
    Continue = (100, "Continue");
    SwitchingProtocols = (101, "Switching Protocols");

    Ok = (200, "OK");
    Created = (201, "Created");
    Accepted = (202, "Accepted");
    NoContent = (204, "No Content");
    PartialContent = (206, "Partial Content");

    MovedPermanently = (301, "Moved Permanently");
    Found = (302, "Found");
    SeeOther = (303, "See Other");
    NotModified = (304, "Not Modified");
    TemporaryRedirect = (307, "Temporary Redirect");
    PermanentRedirect = (308, "Permanent Redirect");

    BadRequest = (400, "Bad Request");
    Unauthorized = (401, "Unauthorized");
    Forbidden = (403, "Forbidden");
    NotFound = (404, "Not Found");
    MethodNotAllowed = (405, "Method Not Allowed");
    NotAcceptable = (406, "Not Acceptable");
    RequestTimeout = (408, "Request Timeout");
    Conflict = (409, "Conflict");
    Gone = (410, "Gone");
    LengthRequired = (411, "Length Required");
    PreconditionFailed = (412, "Precondition Failed");
    PayloadTooLarge = (413, "Payload Too Large");
    UriTooLong = (414, "URI Too Long");
    UnsupportedMediaType = (415, "Unsupported Media Type");
    RangeNotSatisfiable = (416, "Range Not Satisfiable");
    ExpectationFailed = (417, "Expectation Failed");
    ImaTeapot = (418, "I'm a teapot");
    UnprocessableEntity = (422, "Unprocessable Entity");
    UpgradeRequired = (426, "Upgrade Required");
    TooManyRequests = (429, "Too Many Requests");
    RequestHeaderFieldsTooLarge = (431, "Request Header Fields Too Large");

    InternalServerError = (500, "Internal Server Error");
    NotImplemented = (501, "Not Implemented");
    BadGateway = (502, "Bad Gateway");
    ServiceUnavailable = (503, "Service Unavailable");
    GatewayTimeout = (504, "Gateway Timeout");
    HttpVersionNotSupported = (505, "HTTP Version Not Supported");
}

// HEADER

/// One header line, as tokenized by the transport substrate.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    #[inline]
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Header {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Returns `true` if `value` can be written into a header line without
/// breaking the framing (no CR, LF or NUL).
#[inline]
pub(crate) fn is_header_safe(value: &str) -> bool {
    !value.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0))
}

/// Returns `true` if a comma-separated header value contains `token`
/// (case-insensitive), e.g. `keep-alive, Upgrade` contains `upgrade`.
#[inline]
pub(crate) fn contains_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn method_from_bytes() {
        #[rustfmt::skip]
        let cases: [(&[u8], Option<Method>); 9] = [
            (b"GET", Some(Method::Get)),       (b"PUT", Some(Method::Put)),
            (b"POST", Some(Method::Post)),     (b"HEAD", Some(Method::Head)),
            (b"PATCH", Some(Method::Patch)),   (b"DELETE", Some(Method::Delete)),
            (b"OPTIONS", Some(Method::Options)),
            (b"TRACE", None),                  (b"get", None),
        ];

        for (src, expected) in cases {
            assert_eq!(Method::from_bytes(src).ok(), expected);
            if let Some(method) = expected {
                assert_eq!(method.as_str().as_bytes(), src);
            }
        }
    }

    #[test]
    fn version_from_bytes() {
        let cases: [(&[u8], Option<Version>); 5] = [
            (b"HTTP/1.1", Some(Version::Http11)),
            (b"HTTP/1.0", Some(Version::Http10)),
            (b"HTTP/2", Some(Version::Http2)),
            (b"HTTP/2.0", Some(Version::Http2)),
            (b"HTTP/0.9", None),
        ];

        for (src, expected) in cases {
            assert_eq!(Version::from_bytes(src).ok(), expected);
        }
    }

    #[test]
    fn first_line() {
        let cases = [
            (StatusCode::Ok, Version::Http11, "HTTP/1.1 200 OK\r\n"),
            (StatusCode::NotFound, Version::Http10, "HTTP/1.0 404 Not Found\r\n"),
            (StatusCode::Found, Version::Http2, "HTTP/1.1 302 Found\r\n"),
            (StatusCode::NotModified, Version::Http11, "HTTP/1.1 304 Not Modified\r\n"),
        ];

        for (status, version, line) in cases {
            assert_eq!(status.to_first_line(version), line.as_bytes());
        }
        assert_eq!(StatusCode::UpgradeRequired.as_u16(), 426);
        assert_eq!(StatusCode::RequestTimeout.reason(), "Request Timeout");
    }

    #[test]
    fn header_helpers() {
        assert!(is_header_safe("text/plain; charset=utf-8"));
        assert!(!is_header_safe("evil\r\nset-cookie: a=b"));

        assert!(contains_token("keep-alive, Upgrade", "upgrade"));
        assert!(contains_token("Upgrade", "upgrade"));
        assert!(!contains_token("upgrade-insecure", "upgrade"));
    }
}
