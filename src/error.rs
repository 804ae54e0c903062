//! Error taxonomy and the default error handler.
//!
//! # Responsibilities
//! - Classify every failure a handler can raise
//! - Map each class to an outward HTTP status
//! - Finish the response for a failed request
//!
//! # Design Decisions
//! - One enum for the whole crate; handlers propagate with `?`
//! - The dispatcher never recovers locally; it hands the failure to exactly
//!   one application-wide handler
//! - `Status` is the application-declared kind and carries its own code

use axum::http::StatusCode;

use crate::http::context::RouteContext;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A route, file or other resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request carried illegal input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller is not allowed to access the resource.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// The operation is not supported.
    #[error("not implemented: {0}")]
    Unsupported(String),

    /// Application-declared failure with an explicit status code.
    #[error("{message}")]
    Status { code: u16, message: String },

    /// A path segment could not be percent-decoded into UTF-8.
    #[error("invalid percent-encoding in {0:?}")]
    Decode(String),

    /// A route pattern could not be compiled.
    #[error("invalid route pattern {spec:?}: {source}")]
    Pattern {
        spec: String,
        #[source]
        source: regex::Error,
    },

    /// A view resolved to a file that does not exist.
    #[error("view not found: {0}")]
    ViewNotFound(String),

    /// No template engine is registered for the view's extension.
    #[error("no renderer registered for extension {0:?}")]
    NoEngine(String),

    /// A template engine failed.
    #[error("render failed: {0}")]
    Render(String),

    /// A lifecycle operation was attempted in the wrong state.
    #[error("response {0}")]
    ResponseState(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Unclassified failure.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Build an application-declared error.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Error::Status {
            code,
            message: message.into(),
        }
    }

    /// Structured "missing parameter" condition raised by `require_params`.
    pub fn missing_parameter(name: &str) -> Self {
        Error::status(400, format!("Missing parameter: {}", name))
    }

    /// The outward status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) | Error::ViewNotFound(_) => StatusCode::NOT_FOUND,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            Error::BadRequest(_) | Error::Decode(_) => StatusCode::BAD_REQUEST,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            Error::Status { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-wide error handler.
///
/// Receives the failure and the exchange it happened in. It must finish the
/// response; one that doesn't leaves the connection without an answer.
pub type ErrorHandler = std::sync::Arc<dyn Fn(Error, &mut RouteContext) + Send + Sync>;

/// The handler installed when the application does not provide one.
pub fn default_error_handler(err: Error, ctx: &mut RouteContext) {
    tracing::warn!(
        method = %ctx.req.method(),
        path = %ctx.req.path(),
        error = %err,
        "Error thrown handling request"
    );

    let result = if !ctx.res.is_building() {
        ctx.res.end()
    } else {
        match err {
            Error::Status { code, message } => {
                ctx.res.set_status(code);
                if message.is_empty() {
                    ctx.res.send_status(code)
                } else {
                    ctx.res.send_text(&message)
                }
            }
            other => ctx.send_error_response(other.status_code().as_u16()),
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Failed to write error response");
    }
}
