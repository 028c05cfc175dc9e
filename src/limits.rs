//! Server configuration limits and timeouts
//!
//! # Conservative defaults
//!
//! Default limits are chosen so that a misbehaving or hostile client
//! cannot hold resources forever:
//! - every socket read and write has a deadline
//! - idle keep-alive connections are reaped
//! - request heads are bounded in line length and header count
//! - the number of live connections is capped
//!
//! # Examples
//!
//! ```no_run
//! use birb::{handler_fn, limits::{ConnLimits, ReqLimits, ServerLimits}, Server};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Server::builder()
//!         .port(8080)
//!         .handler(handler_fn(|_, resp| Box::pin(async move { resp.write("Hello!").await })))
//!         .server_limits(ServerLimits {
//!             max_connections: 5000,
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             keep_alive_timeout: Duration::from_secs(30),
//!             max_requests_per_connection: 10_000,
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 32,
//!             ..ReqLimits::default()
//!         })
//!         .build()?
//!         .launch()
//!         .await;
//!
//!     Ok(())
//! }
//! ```

use std::time::Duration;

/// Controls admission of new connections.
///
/// # Connection management
/// ```text
///      [------------]
///      [ Tcp accept ]
///      [------------]
///            ||
///            \/
///  /---------------------\   No   [-------------------]
///  | Free connection slot | =====> [ 503, then close    ]
///  \---------------------/        [-------------------]
///            || Yes
///            \/
///  [---------------------------]
///  [ Spawn one task per socket ]
///  [---------------------------]
/// ```
///
/// The accept loop never waits for a slot: a socket arriving while all
/// slots are taken is answered by a short-lived task and dropped.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum number of connections served at the same time (default: `1024`).
    pub max_connections: usize,

    /// Listen backlog passed to the OS when the server binds its own
    /// socket (default: `1024`).
    ///
    /// Ignored when a ready listener is supplied to the builder.
    pub backlog: i32,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            backlog: 1024,

            _priv: (),
        }
    }
}

/// Connection-level limits and timeouts
///
/// Controls individual TCP connection behavior including timeouts,
/// lifetime, and request limits.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum time to wait for any single socket read while a request is
    /// being received (default: `10 seconds`).
    ///
    /// Also bounds the wait for the first request on a fresh connection.
    /// Expiry closes the connection.
    pub socket_read_timeout: Duration,

    /// Maximum time for any single socket write or flush (default: `10 seconds`).
    pub socket_write_timeout: Duration,

    /// How long an idle keep-alive connection may wait for its next
    /// request (default: `5 seconds`).
    ///
    /// Expiry is a normal close, not an error.
    pub keep_alive_timeout: Duration,

    /// Maximum number of requests served over one connection (default: `1000`).
    ///
    /// The last allowed response carries `Connection: close`.
    pub max_requests_per_connection: usize,

    /// Maximum age of a connection (default: `10 minutes`).
    ///
    /// Checked between requests; an exchange in progress is never cut short.
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(10),
            socket_write_timeout: Duration::from_secs(10),
            keep_alive_timeout: Duration::from_secs(5),
            max_requests_per_connection: 1000,
            connection_lifetime: Duration::from_secs(600),

            _priv: (),
        }
    }
}

/// Limits applied while reading a request.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum length of the request line, any header line and any chunk
    /// size line, excluding the line terminator (default: `8 KiB`).
    pub line_size: usize,

    /// Maximum number of header lines (default: `100`).
    pub header_count: usize,

    /// Capacity of the per-connection read buffer (default: `8 KiB`).
    pub read_buffer: usize,

    /// How many unread body bytes the server discards after a handler
    /// returns so the connection can be reused (default: `64 KiB`).
    ///
    /// A larger remainder closes the connection instead.
    pub drain_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            line_size: 8 * 1024,
            header_count: 100,
            read_buffer: 8 * 1024,
            drain_size: 64 * 1024,

            _priv: (),
        }
    }
}

/// Sizing of the buffers that hold serialized response heads.
///
/// # Buffer management
///
/// Head buffers are pooled and shared between connections. A buffer starts
/// with `default_capacity`; if a response with unusually many headers grows
/// it past `max_capacity`, it is released instead of being returned to the
/// pool.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial capacity of a head buffer (default: `1 KiB`).
    pub default_capacity: usize,
    /// Capacity above which a buffer is not reused (default: `8 KiB`).
    pub max_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 1024,
            max_capacity: 8 * 1024,

            _priv: (),
        }
    }
}
