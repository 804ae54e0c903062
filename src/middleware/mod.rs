//! Stock middleware.
//!
//! # Data Flow
//! ```text
//! app.middleware(cookie_parser())
//! app.middleware(session(MemoryStore::new()))
//! app.middleware(body_parser())
//!     → each is an ordinary route with the `*` method selector
//!     → returns false after decorating the request or response
//!     → returns true only when it answered the request itself
//! ```
//!
//! # Design Decisions
//! - Every middleware is a function returning a handler closure, so its
//!   configuration and caches live in the closure
//! - Server-wide caches use `DashMap` with check-then-fill; a duplicate fill
//!   under a race is accepted

pub mod auth;
pub mod body_parser;
pub mod chained;
pub mod cookie_parser;
pub mod favicon;
pub mod logger;
pub mod method_override;
pub mod renderer;
pub mod response_time;
pub mod session;
pub mod static_files;

pub use auth::{basic_auth, token_auth};
pub use body_parser::{body_parser, json_body_parser, urlencoded_body_parser};
pub use chained::chained;
pub use cookie_parser::cookie_parser;
pub use favicon::favicon;
pub use logger::logger;
pub use method_override::{header_method_override, method_override};
pub use renderer::renderer;
pub use response_time::response_time;
pub use session::{session, CookieStore, MemoryStore, Session, SessionHandle, SessionStore};
pub use static_files::static_files;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::app::App;
    use crate::http::context::RouteContext;
    use crate::http::request::Request;
    use crate::http::response::Response;
    use crate::http::sink::BufferedSink;

    /// A context over a fresh application and an in-memory sink.
    pub fn context(req: Request) -> (RouteContext, BufferedSink) {
        context_with(App::new(), req)
    }

    pub fn context_with(app: App, req: Request) -> (RouteContext, BufferedSink) {
        let sink = BufferedSink::new();
        let ctx = RouteContext::new(Arc::new(app), req, Response::new(sink.clone()));
        (ctx, sink)
    }
}
