//! Handler composition.

use crate::error::Result;
use crate::http::context::RouteContext;
use crate::routing::Handler;

/// Run `handlers` in order until one finishes the request.
pub fn chained(
    handlers: Vec<Handler>,
) -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    move |ctx| {
        for handler in &handlers {
            if handler(ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::http::request::Request;
    use crate::middleware::testing::context;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn stops_at_first_true() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = |handled: bool| -> Handler {
            let calls = calls.clone();
            Arc::new(move |_: &mut RouteContext| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(handled)
            })
        };
        let chain = chained(vec![counter(false), counter(true), counter(true)]);

        let (mut ctx, _) = context(Request::builder("GET", "/").build().unwrap());
        assert!(chain(&mut ctx).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn propagates_errors() {
        let failing: Handler = Arc::new(|_: &mut RouteContext| Err(Error::Forbidden("x".into())));
        let chain = chained(vec![failing]);
        let (mut ctx, _) = context(Request::builder("GET", "/").build().unwrap());
        assert!(matches!(chain(&mut ctx), Err(Error::Forbidden(_))));
    }
}
