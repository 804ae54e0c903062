//! Expressway: an Express-style web application framework.
//!
//! An application is an ordered list of routes. Every request walks that
//! list; each matching handler may decorate the exchange and pass it on, or
//! finish it. Middleware are ordinary handlers installed for every method
//! and path.
//!
//! ```text
//!   hyper ──▶ http::server ──▶ App::handle ──▶ routing::Router
//!                                   │               │
//!                                   │               ▼
//!                                   │      handler(RouteContext)
//!                                   │        │   req: Request
//!                                   │        │   res: Response ──▶ OutputSink
//!                                   ▼        ▼
//!                             error handler / 404
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod net;
pub mod observability;
pub mod routing;
pub mod view;

pub use app::App;
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use http::{HttpServer, Request, Response, RouteContext};
pub use lifecycle::Shutdown;
