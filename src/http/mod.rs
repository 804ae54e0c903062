//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, body buffering, request ID)
//!     → request.rs (method, decoded path, query, headers, attributes)
//!     → [application dispatch]
//!     → response.rs (lifecycle: building → header sent → ended)
//!     → sink.rs (head, body chunks, close)
//!     → Send to client
//! ```

pub mod accept;
pub mod body;
pub mod context;
pub mod cookie;
pub mod date;
pub mod mime;
pub mod request;
pub mod response;
pub mod server;
pub mod sink;

pub use context::RouteContext;
pub use cookie::{Cookie, CookieJar};
pub use request::Request;
pub use response::{LifecycleState, Response};
pub use server::{HttpServer, X_REQUEST_ID};
pub use sink::{BufferedSink, OutputSink, ResponseHead};
