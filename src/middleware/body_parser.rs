//! Request body parsers.
//!
//! Each parser runs only when no body has been parsed yet and the content
//! type is absent or its own. Parse failures are logged and skipped.

use tracing::debug;

use crate::error::Result;
use crate::http::body::{Body, JsonBody, UrlEncodedBody};
use crate::http::context::RouteContext;

fn wants(ctx: &RouteContext, marker: &str) -> bool {
    if ctx.req.body().is_some() || ctx.req.raw_body().is_empty() {
        return false;
    }
    match ctx.req.content_type() {
        Some(ct) => ct.to_ascii_lowercase().contains(marker),
        None => true,
    }
}

fn parse_json(ctx: &mut RouteContext) {
    if !wants(ctx, "json") {
        return;
    }
    match JsonBody::parse(ctx.req.raw_body()) {
        Ok(body) => ctx.req.set_body(body),
        Err(e) => debug!(path = %ctx.req.path(), error = %e, "Body is not JSON"),
    }
}

fn parse_urlencoded(ctx: &mut RouteContext) {
    if !wants(ctx, "x-www-form-urlencoded") {
        return;
    }
    let body = UrlEncodedBody::parse(ctx.req.raw_body());
    if body.is_empty() {
        debug!(path = %ctx.req.path(), "Body is not a form");
    } else {
        ctx.req.set_body(body);
    }
}

/// Parse JSON bodies.
pub fn json_body_parser() -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    |ctx| {
        parse_json(ctx);
        Ok(false)
    }
}

/// Parse `application/x-www-form-urlencoded` bodies.
pub fn urlencoded_body_parser() -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static
{
    |ctx| {
        parse_urlencoded(ctx);
        Ok(false)
    }
}

/// JSON first, then URL-encoded.
pub fn body_parser() -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    |ctx| {
        parse_json(ctx);
        parse_urlencoded(ctx);
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Request;
    use crate::middleware::testing::context;
    use serde_json::json;

    fn post(content_type: Option<&str>, body: &str) -> Request {
        let mut builder = Request::builder("POST", "/");
        if let Some(ct) = content_type {
            builder = builder.header("Content-Type", ct);
        }
        builder.body(body.to_string()).build().unwrap()
    }

    #[test]
    fn parses_json() {
        let (mut ctx, _) = context(post(Some("application/json"), r#"{"a": 1}"#));
        assert!(!body_parser()(&mut ctx).unwrap());
        assert_eq!(ctx.req.body_value("a"), Some(json!(1)));
    }

    #[test]
    fn parses_form() {
        let (mut ctx, _) = context(post(
            Some("application/x-www-form-urlencoded"),
            "name=ada&lang=rust",
        ));
        body_parser()(&mut ctx).unwrap();
        assert_eq!(ctx.req.body().unwrap().as_str("lang").as_deref(), Some("rust"));
    }

    #[test]
    fn untyped_body_falls_through_to_form() {
        let (mut ctx, _) = context(post(None, "a=1"));
        body_parser()(&mut ctx).unwrap();
        assert_eq!(ctx.req.body_value("a"), Some(json!("1")));
    }

    #[test]
    fn mismatched_type_is_skipped() {
        let (mut ctx, _) = context(post(Some("text/plain"), "a=1"));
        body_parser()(&mut ctx).unwrap();
        assert!(ctx.req.body().is_none());

        let (mut ctx, _) = context(post(Some("application/json"), "{broken"));
        json_body_parser()(&mut ctx).unwrap();
        assert!(ctx.req.body().is_none());
    }

    #[test]
    fn existing_body_is_kept() {
        let (mut ctx, _) = context(post(None, r#"{"a": 1}"#));
        json_body_parser()(&mut ctx).unwrap();
        urlencoded_body_parser()(&mut ctx).unwrap();
        assert_eq!(ctx.req.body_value("a"), Some(json!(1)));
    }
}
