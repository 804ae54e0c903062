//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (before traffic):
//!     (method, path spec, handler)
//!     → pattern.rs (compile spec into anchored regex + capture slots)
//!     → route.rs (bind method selector and handler)
//!     → router.rs (append; position = priority)
//!
//! Dispatch (per request):
//!     RouteContext
//!     → router.rs walks routes from the start (or a resume index)
//!     → route.rs tests method + path, decodes captures, runs mappers
//!     → handler returns true (stop) / false (continue) / Err (abort)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable at runtime
//! - First matching route whose handler returns true wins
//! - Middleware is an ordinary route with the `*` method selector

pub mod pattern;
pub mod route;
pub mod router;

pub use pattern::{PathPattern, WILDCARD_KEY};
pub use route::{Handler, ParamMapper, ParamMappers, Route, ANY_METHOD};
pub use router::{Dispatch, Router};
