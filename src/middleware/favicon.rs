//! Serve `/favicon.ico` from memory.

use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::http::context::RouteContext;

/// Default client cache lifetime: one day.
pub const DEFAULT_MAX_AGE_SECS: u64 = 86_400;

/// Load the icon at `path` once and serve it for `/favicon.ico`.
pub fn favicon(
    path: impl AsRef<Path>,
    max_age_secs: Option<u64>,
) -> io::Result<impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static> {
    let icon: Arc<[u8]> = std::fs::read(path)?.into();
    let cache_control = format!(
        "public, max-age={}",
        max_age_secs.unwrap_or(DEFAULT_MAX_AGE_SECS)
    );
    Ok(move |ctx: &mut RouteContext| {
        if ctx.req.path() != "/favicon.ico" {
            return Ok(false);
        }
        ctx.res.content_type("image/x-icon")?;
        ctx.res.set_header("Cache-Control", &cache_control)?;
        ctx.res.send_bytes(&icon)?;
        Ok(true)
    })
}
