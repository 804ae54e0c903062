//! Request logging.

use tracing::info;

use crate::error::Result;
use crate::http::context::RouteContext;

/// Log one line per finished request.
pub fn logger() -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    |ctx| {
        let method = ctx.req.method().to_uppercase();
        let path = ctx.req.path().to_string();
        let started = ctx.req.start_time();
        ctx.res.on_end(move |res| {
            info!(
                method = %method,
                path = %path,
                status = res.status(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Request completed"
            );
        });
        Ok(false)
    }
}
