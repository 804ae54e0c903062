//! Cookie header parsing.

use crate::error::Result;
use crate::http::context::RouteContext;
use crate::http::cookie::CookieJar;
use crate::http::request::COOKIES_ATTR;

/// Parse every `Cookie` header into the `cookies` attribute.
pub fn cookie_parser() -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    |ctx| {
        let header = ctx
            .req
            .headers()
            .get_all("cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        let jar = CookieJar::from_header(&header);
        ctx.req.attributes_mut().insert(COOKIES_ATTR, jar);
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Request;
    use crate::middleware::testing::context;

    #[test]
    fn populates_jar() {
        let req = Request::builder("GET", "/")
            .header("Cookie", "a=1; b=2")
            .header("Cookie", "a=3")
            .build()
            .unwrap();
        let (mut ctx, _) = context(req);
        cookie_parser()(&mut ctx).unwrap();
        assert_eq!(ctx.req.cookie("a"), Some("1"));
        assert_eq!(ctx.req.cookie("b"), Some("2"));
        assert_eq!(ctx.req.cookies().len(), 3);
    }

    #[test]
    fn no_header_gives_empty_jar() {
        let (mut ctx, _) = context(Request::builder("GET", "/").build().unwrap());
        cookie_parser()(&mut ctx).unwrap();
        assert!(ctx.req.cookies().is_empty());
    }
}
