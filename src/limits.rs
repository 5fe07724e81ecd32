//! Host-side limits and timeouts
//!
//! These bound what the TCP [`Server`](crate::Server) accepts before a request
//! ever reaches the [`App`](crate::App). Every struct has public fields and
//! a [`Default`] impl; override with struct-update syntax.
//!
//! # Examples
//!
//! ```no_run
//! use maestro_web::{limits::{ConnLimits, ReqLimits, ServerLimits}, App, Server, Settings};
//! use tokio::net::TcpListener;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
//!         .app(App::new(Settings::default()))
//!         .server_limits(ServerLimits {
//!             max_connections: 500,
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             body_size: 1024 * 1024,
//!             ..ReqLimits::default()
//!         })
//!         .build()
//!         .unwrap()
//!         .launch()
//!         .await;
//! }
//! ```

use std::time::Duration;

/// Controls server-level concurrency and overload behavior.
///
/// # Connection management
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  \/
/// [--------------]   No    /----------------\   Yes  [-------------]
/// [ Add to queue ] <====== | Queue is full? | =====> [ Sending 503 ]
/// [--------------]         \----------------/        [-------------]
///        ||
///        \/
/// [--------]   Yes   /-------------------------\   No   [------]
/// [ Worker ] <====== | Is there a free worker? | =====> [ Wait ]
/// [--------]         \-------------------------/        [------]
/// ```
///
/// Workers are spawned once in [`ServerBuilder::build`](crate::ServerBuilder::build)
/// and poll the queue with the configured `wait_strategy`.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker tasks, i.e. connections processed at once (default: `100`).
    pub max_connections: usize,

    /// Maximum number of accepted connections waiting for a worker (default: `250`).
    ///
    /// Connections arriving while the queue is full are answered with
    /// [`503`](crate::StatusCode::ServiceUnavailable).
    pub max_pending_connections: usize,

    /// How idle workers wait for the queue (default: `Sleep(50µs)`).
    pub wait_strategy: WaitStrategy,

    /// Tasks dedicated to answering overflow connections with `503` (default: `1`).
    ///
    /// Set to 0 to close overflow connections without a response.
    pub count_503_handlers: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            count_503_handlers: 1,

            _priv: (),
        }
    }
}

/// Strategy for worker tasks when the queue is empty.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Uses [`tokio::task::yield_now()`]. Keeps latency lowest at the cost of a busy CPU.
    Yield,
    /// Uses [`tokio::time::sleep()`] with the given pause.
    Sleep(Duration),
}

/// Per-connection timeouts.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum wait for the next chunk of the request (default: `2 seconds`).
    ///
    /// Stalled clients are dropped without a response.
    pub socket_read_timeout: Duration,

    /// Maximum time for writing the finalized response (default: `3 seconds`).
    pub socket_write_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(2),
            socket_write_timeout: Duration::from_secs(3),

            _priv: (),
        }
    }
}

/// Limits on the size of one inbound request.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum size of the request line plus headers (default: `8 KB`).
    ///
    /// Larger heads are answered with
    /// [`431`](crate::StatusCode::RequestHeaderFieldsTooLarge).
    pub head_size: usize,

    /// Maximum number of header lines (default: `32`).
    pub header_count: usize,

    /// Maximum `Content-Length` accepted (default: `64 KB`).
    ///
    /// Larger bodies are answered with [`413`](crate::StatusCode::PayloadTooLarge)
    /// before the body is read.
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            head_size: 8 * 1024,
            header_count: 32, // browsers send 10-12
            body_size: 64 * 1024,

            _priv: (),
        }
    }
}
