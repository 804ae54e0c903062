//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listen_ssl(port, ssl_port)
//!     → tls.rs (certificate and key loading)
//!     → axum-server rustls acceptor
//!     → Hand off to the same router as the plain listener
//! ```

pub mod tls;

pub use tls::load_tls_config;
