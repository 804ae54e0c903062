//! HTTP method override for clients limited to GET and POST.
//!
//! The replaced method is kept in the `originalMethod` request attribute.

use tracing::debug;

use crate::error::Result;
use crate::http::context::RouteContext;

pub const DEFAULT_PARAM: &str = "_method";
pub const DEFAULT_HEADER: &str = "X-HTTP-Method-Override";

/// Take the method from a request parameter, `_method` by default.
pub fn method_override(
    key: Option<&str>,
) -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    let key = key.unwrap_or(DEFAULT_PARAM).to_string();
    move |ctx| {
        if let Some(method) = ctx.req.param_str(&key) {
            apply(ctx, &method);
        }
        Ok(false)
    }
}

/// Take the method from a request header, `X-HTTP-Method-Override` by default.
pub fn header_method_override(
    header: Option<&str>,
) -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    let header = header.unwrap_or(DEFAULT_HEADER).to_string();
    move |ctx| {
        if let Some(method) = ctx.req.header(&header).map(str::to_string) {
            apply(ctx, &method);
        }
        Ok(false)
    }
}

fn apply(ctx: &mut RouteContext, method: &str) {
    let method = method.trim();
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return;
    }
    debug!(from = %ctx.req.method(), to = %method, "Overriding request method");
    ctx.req.set_method(method);
}
