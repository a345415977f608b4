//! Engine configuration limits and timeouts
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Memory exhaustion through huge or unterminated bodies
//! - Disk exhaustion through abandoned uploads
//! - Parameter and cookie flooding
//! - Clients that announce a body with `Expect: 100-continue` and never send it
//!
//! Request-scoped resources (buffers and temporary files) are bounded by
//! [`ReqLimits`] and always released when the request ends, whatever the
//! outcome.
//!
//! # Examples
//!
//! ```
//! use sluice::{Engine, limits::{ConnLimits, ReqLimits}};
//! use std::time::Duration;
//!
//! let engine = Engine::builder()
//!     .request_limits(ReqLimits {
//!         max_body_size: 64 * 1024 * 1024, // Large uploads
//!         ..ReqLimits::default()
//!     })
//!     .connection_limits(ConnLimits {
//!         continue_timeout: Duration::from_secs(10),
//!         ..ConnLimits::default()
//!     })
//!     .build();
//! # drop(engine);
//! ```

use std::{path::PathBuf, time::Duration};

/// Limits applied while assembling one request.
///
/// # Trade-off Considerations
///
/// - **Small limits**: less memory and disk per connection, but may reject
///   legitimate forms and uploads
/// - **Large limits**: handles big uploads, at the cost of more disk and
///   memory held by slow or hostile clients
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum number of query parameters (default: `1024`)
    ///
    /// Every `key=value` pair counts, repeated keys included.
    pub max_query_params: usize,

    /// Maximum number of header lines per request (default: `100`)
    pub max_headers: usize,

    /// Maximum number of cookies over all `Cookie` headers (default: `64`)
    pub max_cookies: usize,

    /// Size above which a form attribute is spilled to disk (default: `16 KiB`)
    ///
    /// Attribute values below this size stay in memory. File uploads always
    /// go to disk.
    pub memory_threshold: usize,

    /// Maximum size of a POST body (default: `8 MiB`)
    ///
    /// Exceeding it fails the request with
    /// [`413`](crate::StatusCode::PayloadTooLarge).
    pub max_body_size: usize,

    /// Maximum size of the header block of one multipart part (default: `8 KiB`)
    pub max_part_header_size: usize,

    /// Directory for temporary upload files (default: `None`)
    ///
    /// `None` uses [`std::env::temp_dir`].
    pub temp_dir: Option<PathBuf>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            max_query_params: 1024,
            max_headers: 100,
            max_cookies: 64,

            memory_threshold: 16 * 1024,
            max_body_size: 8 * 1024 * 1024,
            max_part_header_size: 8 * 1024,
            temp_dir: None,

            _priv: (),
        }
    }
}

/// Connection-level limits and timeouts
///
/// Default values balance resource usage and tolerance for slow clients.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Time allowed for the body after `100 Continue` was sent (default: `30 seconds`)
    ///
    /// The transport calls [`Connection::poll_timeout`](crate::Connection::poll_timeout)
    /// from its timer. A message still incomplete at the deadline has its
    /// resources released and the client gets `408 Request Timeout` before
    /// the connection is closed.
    pub continue_timeout: Duration,

    /// Maximum number of requests served per connection (default: unlimited)
    ///
    /// The response to the last allowed request carries `connection: close`.
    pub max_requests_per_connection: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            continue_timeout: Duration::from_secs(30),
            max_requests_per_connection: usize::MAX,

            _priv: (),
        }
    }
}

/// Configuration for writing responses.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Value of the `server` header (default: `"sluice"`)
    pub server_name: String,

    /// Unit of chunked transfer for file and stream bodies (default: `8192 B`)
    pub chunk_size: usize,

    /// Cache lifetime of `404 Not Found` responses, in seconds (default: `300`)
    ///
    /// Lets browsers and proxies absorb repeated requests for missing
    /// resources.
    pub not_found_max_age: u64,

    /// Initial capacity of the response head buffer (default: `1024 B`)
    pub head_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            server_name: "sluice".to_owned(),
            chunk_size: 8192,
            not_found_max_age: 300,
            head_capacity: 1024,

            _priv: (),
        }
    }
}
