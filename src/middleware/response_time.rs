//! Response time header.

use tracing::debug;

use crate::error::Result;
use crate::http::context::RouteContext;

pub const DEFAULT_HEADER: &str = "X-Response-Time";

/// Stamp the time spent before the head was committed, as `<n>ms`.
pub fn response_time(
    header: Option<&str>,
) -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    let header = header.unwrap_or(DEFAULT_HEADER).to_string();
    move |ctx| {
        let header = header.clone();
        let started = ctx.req.start_time();
        ctx.res.on_header(move |res| {
            let value = format!("{}ms", started.elapsed().as_millis());
            if let Err(e) = res.set_header(&header, &value) {
                debug!(header = %header, error = %e, "Could not set response time");
            }
        });
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Request;
    use crate::middleware::testing::context;

    #[test]
    fn stamps_default_header() {
        let (mut ctx, sink) = context(Request::builder("GET", "/").build().unwrap());
        response_time(None)(&mut ctx).unwrap();
        ctx.res.send_text("hi").unwrap();
        let value = sink.header("x-response-time").unwrap();
        assert!(value.ends_with("ms"));
        assert!(value.trim_end_matches("ms").parse::<u64>().is_ok());
    }

    #[test]
    fn custom_header_name() {
        let (mut ctx, sink) = context(Request::builder("GET", "/").build().unwrap());
        response_time(Some("X-Elapsed"))(&mut ctx).unwrap();
        ctx.res.send_status(204).unwrap();
        assert!(sink.header("x-elapsed").is_some());
        assert!(sink.header("x-response-time").is_none());
    }
}
