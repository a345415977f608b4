//! `application/x-www-form-urlencoded` parser with flexible collection support.
//!
//! Used for URL query strings and for url-encoded POST bodies.

use crate::http::{url, utf8::Utf8Error};
use memchr::memchr;
use std::collections::HashMap;

/// URL query string / form body parser.
///
/// Keys and values are percent-decoded with `+` read as a space, and must
/// be valid UTF-8. Parameters with an empty key are skipped; a key without
/// `=` gets an empty value.
///
/// # Examples
/// ```rust
/// use sluice::query::Query;
/// use std::collections::HashMap;
///
/// // Parse into Vec (preserves order)
/// let query = b"name=john&age=25&city";
/// let vec_params: Vec<(String, String)> = Query::parse(query, 10).unwrap();
/// assert_eq!(vec_params.len(), 3);
/// assert_eq!(vec_params[2], ("city".to_string(), String::new()));
///
/// // Parse into a multi-map (keeps every value)
/// let map: HashMap<String, Vec<String>> = Query::parse(b"tag=a&tag=b+c", 10).unwrap();
/// assert_eq!(map["tag"], ["a", "b c"]);
///
/// // Handle limits
/// let result = Query::parse::<Vec<(String, String)>>(b"a=1&b=2", 1);
/// assert!(result.is_err()); // Exceeds limit of 1 parameter
/// ```
pub struct Query;

impl Query {
    /// Parses a query string into a new collection.
    ///
    /// # Arguments
    /// - `query`: Raw bytes of the query string
    ///   (handles optional leading `?` automatically, so `?a=1` and `a=1` are equivalent)
    /// - `limit`: Maximum number of parameters to parse
    #[inline]
    pub fn parse<C: QueryCollector>(query: &[u8], limit: usize) -> Result<C, Error> {
        let mut result = C::with_capacity(limit.min(16));
        Self::parse_into(&mut result, query, limit)?;
        Ok(result)
    }

    /// Parses a query string into an existing collection.
    ///
    /// The limit counts parameters parsed by this call, so repeated keys
    /// count every time they occur.
    ///
    /// # Examples
    /// ```
    /// use sluice::query::Query;
    ///
    /// // Reuse collection for multiple parses
    /// let mut collector: Vec<(String, String)> = Vec::new();
    ///
    /// Query::parse_into(&mut collector, b"a=1&b=2", 10).unwrap();
    /// Query::parse_into(&mut collector, b"c=3&d=%40", 10).unwrap();
    /// assert_eq!(collector.len(), 4); // parameters are appended
    /// assert_eq!(collector[3].1, "@");
    /// ```
    pub fn parse_into<C: QueryCollector>(
        result: &mut C,
        query: &[u8],
        limit: usize,
    ) -> Result<(), Error> {
        let data = match query.first() {
            Some(b'?') => &query[1..],
            _ => query,
        };

        let mut count = 0;
        let mut start = 0;
        while start < data.len() {
            // Find next '&' or end of string
            let end = memchr(b'&', &data[start..])
                .map(|pos| start + pos)
                .unwrap_or(data.len());

            if let Some((key, value)) = Self::parse_pair(&data[start..end])? {
                if count >= limit {
                    return Err(Error::OverLimit(limit));
                }
                count += 1;
                result.add_param(key, value);
            }
            start = end + 1;
        }

        Ok(())
    }

    /// Decodes one `key=value` segment. Returns `None` for an empty key.
    pub(crate) fn parse_pair(segment: &[u8]) -> Result<Option<(String, String)>, Error> {
        let split = memchr(b'=', segment).unwrap_or(segment.len());

        let key = &segment[..split];
        if key.is_empty() {
            return Ok(None);
        }
        let value = match split < segment.len() {
            true => &segment[split + 1..], // Has value after '='
            false => b"",                  // No value (key only)
        };

        Ok(Some((
            url::unescape(key, true)?,
            url::unescape(value, true)?,
        )))
    }
}

/// A trait for types that can collect parsed query parameters.
///
/// # Examples
/// ```rust
/// use sluice::query::QueryCollector;
///
/// struct KeysOnly(Vec<String>);
///
/// impl QueryCollector for KeysOnly {
///     fn add_param(&mut self, key: String, _: String) {
///         self.0.push(key);
///     }
///
///     fn with_capacity(capacity: usize) -> Self {
///         KeysOnly(Vec::with_capacity(capacity))
///     }
/// }
/// ```
pub trait QueryCollector
where
    Self: Sized,
{
    /// Adds a decoded parameter to the collection.
    fn add_param(&mut self, key: String, value: String);

    /// Creates a new collection with the specified capacity.
    fn with_capacity(capacity: usize) -> Self;
}

// Preserves parameter order
impl QueryCollector for Vec<(String, String)> {
    #[inline]
    fn add_param(&mut self, key: String, value: String) {
        self.push((key, value));
    }

    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }
}

// Keeps every value of a repeated key
impl QueryCollector for HashMap<String, Vec<String>> {
    #[inline]
    fn add_param(&mut self, key: String, value: String) {
        self.entry(key).or_default().push(value);
    }

    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity(capacity)
    }
}

// Last value wins
impl QueryCollector for HashMap<String, String> {
    #[inline]
    fn add_param(&mut self, key: String, value: String) {
        self.insert(key, value);
    }

    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity(capacity)
    }
}

/// Error types that can occur during query parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The number of parameters exceeded the specified limit.
    #[error("query parameter limit exceeded: limit={0}")]
    OverLimit(usize),

    /// A key or value did not decode to UTF-8.
    #[error("query parameter is not valid UTF-8: {0}")]
    Encoding(#[from] Utf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn basic() {
        let cases = ["a=1&b=2", "?a=1&b=2"];

        for line in cases {
            let params: Vec<(String, String)> = Query::parse(line.as_bytes(), 8).unwrap();
            assert_eq!(pairs(&params), [("a", "1"), ("b", "2")]);
        }
    }

    #[test]
    fn full() {
        let line = b"flag&empty=&=val&&key=value";
        let params: Vec<(String, String)> = Query::parse(line, 10).unwrap();

        assert_eq!(pairs(&params), [("flag", ""), ("empty", ""), ("key", "value")]);
    }

    #[test]
    fn decoding() {
        #[rustfmt::skip]
        let cases: [(&[u8], (&str, &str)); 5] = [
            (b"q=a+b", ("q", "a b")),
            (b"e=user%40example.com", ("e", "user@example.com")),
            (b"k%20ey=v", ("k ey", "v")),
            (b"u=%C3%BC", ("u", "ü")),
            (b"bad=%zz!", ("bad", "!")),
        ];

        for (line, expected) in cases {
            let params: Vec<(String, String)> = Query::parse(line, 4).unwrap();
            assert_eq!(pairs(&params), [expected]);
        }
    }

    #[test]
    fn multi_map() {
        let map: HashMap<String, Vec<String>> = Query::parse(b"x=1&y=2&x=3", 8).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["x"], ["1", "3"]);
        assert_eq!(map["y"], ["2"]);
    }

    #[test]
    fn last_wins() {
        let map: HashMap<String, String> = Query::parse(b"x=1&x=2", 8).unwrap();
        assert_eq!(map["x"], "2");
    }

    #[test]
    fn limit_error() {
        assert_eq!(
            Query::parse::<Vec<(String, String)>>(b"a&a", 1),
            Err(Error::OverLimit(1))
        );
        // Repeated keys still count against the limit.
        assert!(Query::parse::<HashMap<String, Vec<String>>>(b"a=1&a=2&a=3", 2).is_err());
    }

    #[test]
    fn encoding_error() {
        assert!(matches!(
            Query::parse::<Vec<(String, String)>>(b"a=%ff", 4),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn empty() {
        for line in [&b""[..], b"?", b"&&"] {
            let params: Vec<(String, String)> = Query::parse(line, 4).unwrap();
            assert!(params.is_empty());
        }
    }
}
