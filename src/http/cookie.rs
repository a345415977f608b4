//! Request cookie decoding, same-name ordering, and `Set-Cookie` encoding.
//!
//! Several cookies may share a name when a client holds them for different
//! paths. Within one name the jar keeps them in decreasing path length
//! (a cookie without a path counts as longest) with the most recently added
//! entry first among equals, so the first entry is the most specific one
//! even for clients that send them in arbitrary order.

use std::{cmp::Reverse, collections::HashMap};

/// One cookie as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
}

impl Cookie {
    #[inline]
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
        }
    }

    #[inline]
    pub fn with_path<P: Into<String>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Path from a legacy `$Path` attribute, if the client sent one.
    #[inline]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[inline]
    fn path_rank(&self) -> usize {
        self.path.as_ref().map_or(usize::MAX, String::len)
    }
}

/// Why a `Cookie` header was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("malformed cookie header: {0}")]
    Malformed(&'static str),
    #[error("too many cookies: limit={0}")]
    TooMany(usize),
}

/// Cookies of one request, grouped by name.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    by_name: HashMap<String, Vec<Cookie>>,
}

impl CookieJar {
    /// Decodes every `Cookie` header value and orders each name's group.
    /// Any malformed header fails the whole jar.
    ///
    /// # Examples
    /// ```
    /// use sluice::cookie::CookieJar;
    ///
    /// let jar = CookieJar::parse(["session=a; $Path=/app", "session=b"], 16).unwrap();
    /// assert_eq!(jar.get("session").unwrap().value(), "b"); // no path sorts first
    /// assert_eq!(jar.get_all("session").len(), 2);
    ///
    /// assert!(CookieJar::parse(["session"], 16).is_err());
    /// ```
    pub fn parse<'a, I>(headers: I, limit: usize) -> Result<Self, CookieError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut jar = Self::default();
        let mut count = 0;

        for header in headers {
            for cookie in decode(header)? {
                count += 1;
                if count > limit {
                    return Err(CookieError::TooMany(limit));
                }
                jar.by_name
                    .entry(cookie.name.clone())
                    .or_default()
                    .push(cookie);
            }
        }

        jar.by_name.values_mut().for_each(order_group);
        Ok(jar)
    }

    /// The highest-priority cookie called `name`.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.by_name.get(name)?.first()
    }

    /// Every cookie called `name`, highest priority first.
    #[inline]
    pub fn get_all(&self, name: &str) -> &[Cookie] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates over the groups, one per distinct name.
    #[inline]
    pub fn groups(&self) -> impl Iterator<Item = &[Cookie]> {
        self.by_name.values().map(Vec::as_slice)
    }

    /// Number of distinct names.
    #[inline]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// Newest first among equal path lengths: reverse arrival order, then a
// stable sort on decreasing path length.
#[inline]
fn order_group(group: &mut Vec<Cookie>) {
    group.reverse();
    group.sort_by_key(|cookie| Reverse(cookie.path_rank()));
}

/// Strictly decodes one `Cookie` header value.
///
/// Pairs are separated by `;` with optional whitespace. Names must be
/// tokens and values cookie-octets, optionally double-quoted. Legacy
/// attributes are recognised: `$Path` sets the path of the preceding
/// cookie, other `$`-names are ignored.
pub fn decode(header: &str) -> Result<Vec<Cookie>, CookieError> {
    let mut cookies: Vec<Cookie> = Vec::new();

    let trimmed = header.trim_matches(is_space);
    if trimmed.is_empty() {
        return Ok(cookies);
    }
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);

    for pair in trimmed.split(';') {
        let pair = pair.trim_matches(is_space);
        if pair.is_empty() {
            return Err(CookieError::Malformed("empty cookie pair"));
        }

        let (name, value) = pair
            .split_once('=')
            .ok_or(CookieError::Malformed("cookie without '='"))?;
        let name = name.trim_end_matches(is_space);
        let value = unquote(value.trim_start_matches(is_space))?;

        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(CookieError::Malformed("invalid cookie name"));
        }

        if let Some(attribute) = name.strip_prefix('$') {
            if attribute.eq_ignore_ascii_case("path") {
                let last = cookies
                    .last_mut()
                    .ok_or(CookieError::Malformed("$Path before any cookie"))?;
                last.path = Some(value.to_owned());
            }
            continue;
        }

        if !value.bytes().all(is_cookie_octet) {
            return Err(CookieError::Malformed("invalid cookie value"));
        }
        cookies.push(Cookie::new(name, value));
    }

    Ok(cookies)
}

#[inline]
fn unquote(value: &str) -> Result<&str, CookieError> {
    match value.strip_prefix('"') {
        Some(rest) => rest
            .strip_suffix('"')
            .ok_or(CookieError::Malformed("unterminated quoted value")),
        None => Ok(value),
    }
}

#[inline]
const fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

#[inline]
const fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        )
}

#[inline]
const fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

/// A cookie to be set by a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    /// Seconds; `0` deletes the cookie on the client.
    pub max_age: i64,
    pub http_only: bool,
    pub secure: bool,
}

impl SetCookie {
    /// `true` when the cookie can be encoded without breaking the header.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && self.name.bytes().all(is_token_byte)
            && self.value.bytes().all(is_cookie_octet)
            && self
                .path
                .as_deref()
                .map_or(true, |p| p.bytes().all(|b| (0x20..0x7F).contains(&b) && b != b';'))
    }

    /// Encodes the header value, with `secure` forced on when `force_secure`.
    ///
    /// # Examples
    /// ```
    /// use sluice::cookie::SetCookie;
    ///
    /// let cookie = SetCookie {
    ///     name: "id".into(),
    ///     value: "42".into(),
    ///     path: Some("/".into()),
    ///     max_age: 60,
    ///     http_only: true,
    ///     secure: false,
    /// };
    /// assert_eq!(cookie.encode(true), "id=42; Path=/; Max-Age=60; HttpOnly; Secure");
    /// ```
    pub fn encode(&self, force_secure: bool) -> String {
        let mut out = String::with_capacity(self.name.len() + self.value.len() + 48);

        out.push_str(&self.name);
        out.push('=');
        out.push_str(&self.value);
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        out.push_str("; Max-Age=");
        out.push_str(&self.max_age.max(0).to_string());
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure || force_secure {
            out.push_str("; Secure");
        }
        out
    }
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    fn names_values(cookies: &[Cookie]) -> Vec<(&str, &str, Option<&str>)> {
        cookies
            .iter()
            .map(|c| (c.name(), c.value(), c.path()))
            .collect()
    }

    #[test]
    fn basic() {
        #[rustfmt::skip]
        let cases: [(&str, &[(&str, &str, Option<&str>)]); 7] = [
            ("", &[]),
            ("a=1", &[("a", "1", None)]),
            ("a=1; b=2", &[("a", "1", None), ("b", "2", None)]),
            ("a=1;b=2;", &[("a", "1", None), ("b", "2", None)]),
            ("a=\"quoted\"", &[("a", "quoted", None)]),
            ("empty=", &[("empty", "", None)]),
            ("$Version=1; s=x; $Path=/app; $Domain=example.com", &[("s", "x", Some("/app"))]),
        ];

        for (header, expected) in cases {
            let cookies = decode(header).unwrap();
            assert_eq!(names_values(&cookies), expected, "{header}");
        }
    }

    #[test]
    fn malformed() {
        let cases = [
            "novalue",
            "a=1;;b=2",
            "=value",
            "bad name=1",
            "a=has space",
            "a=com,ma",
            "a=back\\slash",
            "a=\"open",
            "$Path=/x; a=1",
            "a(b)=1",
        ];

        for header in cases {
            assert!(decode(header).is_err(), "{header}");
        }
    }
}
