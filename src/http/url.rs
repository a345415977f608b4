//! Request-target parsing: path normalization and the query-parameter map.

use crate::{
    errors::HttpError,
    http::{
        query::{self, Query},
        utf8::{self, Utf8Error},
    },
};
use memchr::memchr2;
use std::collections::HashMap;

/// Decoded query parameters: key → values in order of appearance.
pub type QueryMap = HashMap<String, Vec<String>>;

/// A parsed request target.
///
/// # Components
///
/// - **Raw**: the target exactly as received (e.g., `/a/b/../c?x=1&x=2`)
/// - **Path**: normalized and re-escaped path (e.g., `/a/c`)
/// - **Query**: decoded parameters (e.g., `{x: ["1", "2"]}`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    raw: String,
    path: String,
    query: QueryMap,
}

impl Url {
    /// Parses and normalizes `target`, decoding at most `max_params` query
    /// parameters.
    ///
    /// # Examples
    /// ```
    /// use sluice::url::Url;
    ///
    /// let url = Url::parse("/a/b/../c?x=1&x=2", 16).unwrap();
    /// assert_eq!(url.path(), "/a/c");
    /// assert_eq!(url.query_all("x"), ["1", "2"]);
    ///
    /// assert!(Url::parse("/../etc/passwd", 16).is_err());
    /// ```
    pub fn parse(target: &str, max_params: usize) -> Result<Self, HttpError> {
        let bytes = target.as_bytes();
        let end = memchr::memchr(b'#', bytes).unwrap_or(bytes.len());

        let (path, query) = match memchr::memchr(b'?', &bytes[..end]) {
            Some(pos) => (&target[..pos], Some(&bytes[pos + 1..end])),
            None => (&target[..end], None),
        };

        let query = match query {
            Some(query) => Query::parse::<QueryMap>(query, max_params).map_err(|err| match err {
                query::Error::OverLimit(_) => HttpError::bad_request("too many query parameters"),
                query::Error::Encoding(_) => HttpError::bad_request("invalid query encoding"),
            })?,
            None => QueryMap::new(),
        };

        Ok(Self {
            raw: target.to_owned(),
            path: normalize_path(path)?,
            query,
        })
    }

    /// The target as received, before any decoding.
    #[inline]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The normalized path: starts with `/`, no empty, `.` or `..`
    /// segments, each segment percent-escaped in canonical form.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Escaped path segments of the normalized path.
    ///
    /// For `/api/users/123` yields `"api"`, `"users"`, `"123"`.
    #[inline]
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// First value of the query parameter `key`.
    #[inline]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key)?.first().map(String::as_str)
    }

    /// All values of the query parameter `key`, empty if absent.
    #[inline]
    pub fn query_all(&self, key: &str) -> &[String] {
        self.query.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn query_map(&self) -> &QueryMap {
        &self.query
    }
}

/// Resolves `.`, `..` and empty segments of `path` and re-escapes what is
/// left. Fails when `..` would climb above the root or a segment does not
/// decode to UTF-8.
pub fn normalize_path(path: &str) -> Result<String, HttpError> {
    let path = match path {
        "" => "/",
        _ => path,
    };
    if !path.starts_with('/') {
        return Err(HttpError::bad_request("request target must start with '/'"));
    }

    let mut segments: Vec<String> = Vec::new();
    for part in path.split('/').skip(1) {
        let segment = unescape(part.as_bytes(), false)
            .map_err(|_| HttpError::bad_request("invalid path encoding"))?;

        match segment.as_str() {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(HttpError::bad_request("attempt to navigate above root"));
                }
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Ok("/".to_owned());
    }

    let mut normalized = String::with_capacity(path.len());
    for segment in &segments {
        normalized.push('/');
        escape_into(segment, &mut normalized);
    }
    Ok(normalized)
}

#[inline]
const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[inline]
const fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_')
}

/// Percent-decodes `src` and converts the result from UTF-8.
///
/// An escape that is not followed by two hex digits is dropped: a
/// truncated `%` at the end loses only the `%`, an invalid `%zz` loses all
/// three characters. Non-ASCII input bytes are dropped as well.
/// With `plus_as_space`, `+` decodes to a space (query and form encoding).
pub fn unescape(src: &[u8], plus_as_space: bool) -> Result<String, Utf8Error> {
    if memchr2(b'%', b'+', src).is_none() && src.is_ascii() {
        return utf8::decode(src);
    }

    let mut buf = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'%' if i + 2 < src.len() => {
                if let (Some(hi), Some(lo)) = (hex_value(src[i + 1]), hex_value(src[i + 2])) {
                    buf.push(hi << 4 | lo);
                }
                i += 3;
                continue;
            }
            b'%' => {}
            b'+' if plus_as_space => buf.push(b' '),
            byte if byte.is_ascii() => buf.push(byte),
            _ => {}
        }
        i += 1;
    }

    utf8::decode(&buf)
}

/// Percent-escapes every byte of the UTF-8 form of `segment` except
/// `[A-Za-z0-9._-]`, using lowercase hex.
#[inline]
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    escape_into(segment, &mut out);
    out
}

fn escape_into(segment: &str, out: &mut String) {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    for &byte in segment.as_bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0x0f) as usize] as char);
        }
    }
}
