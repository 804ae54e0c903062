//! A single installed route.
//!
//! # Responsibilities
//! - Bind a method selector, a compiled path pattern and a handler
//! - Answer "does this request match" with decoded parameters
//! - Run application parameter mappers over captured values
//!
//! # Design Decisions
//! - Method comparison is against the lower-cased request method; `*` is any
//! - A mapper returning `None` drops the key but keeps the match
//! - Decoding failures abort the match with `Error::Decode`

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::http::context::RouteContext;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::routing::pattern::PathPattern;

/// Method selector matching every request method.
pub const ANY_METHOD: &str = "*";

/// A route or middleware handler.
///
/// Returns `Ok(true)` when the request is fully handled and dispatch should
/// stop, `Ok(false)` to keep walking the route list.
pub type Handler = Arc<dyn Fn(&mut RouteContext) -> Result<bool> + Send + Sync>;

/// Transforms a decoded path parameter before it reaches handlers.
pub type ParamMapper =
    Arc<dyn Fn(&Request, &mut Response, &str) -> Result<Option<Value>> + Send + Sync>;

/// Parameter mappers keyed by parameter name.
pub type ParamMappers = HashMap<String, ParamMapper>;

/// A compiled (method, path pattern, handler) binding.
#[derive(Clone)]
pub struct Route {
    method: String,
    pattern: PathPattern,
    handler: Handler,
}

impl Route {
    /// Compile `path` and bind it to `method` and `handler`.
    pub fn new(method: &str, path: &str, handler: Handler) -> Result<Self> {
        Ok(Self {
            method: method.to_ascii_lowercase(),
            pattern: PathPattern::compile(path)?,
            handler,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Match the request against this route.
    ///
    /// Returns `Ok(None)` on no match and the resolved parameters otherwise.
    pub fn matches(
        &self,
        req: &Request,
        res: &mut Response,
        mappers: &ParamMappers,
    ) -> Result<Option<Map<String, Value>>> {
        if self.method != ANY_METHOD && self.method != req.method() {
            return Ok(None);
        }
        let Some(captures) = self.pattern.captures(req.path()) else {
            return Ok(None);
        };

        let mut params = Map::new();
        for (slot, raw) in captures {
            let decoded = percent_decode_str(raw)
                .decode_utf8()
                .map_err(|_| Error::Decode(raw.to_string()))?;

            match mappers.get(&slot.name) {
                Some(mapper) => {
                    if let Some(mapped) = mapper(req, res, &decoded)? {
                        params.insert(slot.name.clone(), mapped);
                    }
                }
                None => {
                    params.insert(slot.name.clone(), Value::String(decoded.into_owned()));
                }
            }
        }
        Ok(Some(params))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.pattern.spec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::sink::BufferedSink;

    fn noop() -> Handler {
        Arc::new(|_: &mut RouteContext| Ok(true))
    }

    fn request(method: &str, uri: &str) -> Request {
        Request::builder(method, uri).build().unwrap()
    }

    fn response() -> Response {
        Response::new(BufferedSink::new())
    }

    #[test]
    fn method_must_match_unless_any() {
        let route = Route::new("GET", "/users/:id", noop()).unwrap();
        let mappers = ParamMappers::new();
        assert_eq!(route.method(), "get");

        let hit = route
            .matches(&request("GET", "/users/7"), &mut response(), &mappers)
            .unwrap();
        assert_eq!(hit.unwrap()["id"], "7");

        let miss = route
            .matches(&request("POST", "/users/7"), &mut response(), &mappers)
            .unwrap();
        assert!(miss.is_none());

        let any = Route::new(ANY_METHOD, "/users/:id", noop()).unwrap();
        assert!(any
            .matches(&request("DELETE", "/users/7"), &mut response(), &mappers)
            .unwrap()
            .is_some());
    }

    #[test]
    fn captures_are_percent_decoded() {
        let route = Route::new("get", "/tags/:tag", noop()).unwrap();
        let req = request("GET", "/tags/caf%25C3%25A9");
        let params = route
            .matches(&req, &mut response(), &ParamMappers::new())
            .unwrap()
            .unwrap();
        // the transport decodes once, the route decodes the capture again
        assert_eq!(params["tag"], "café");
    }

    #[test]
    fn invalid_utf8_in_capture_is_fatal() {
        let route = Route::new("get", "/tags/:tag", noop()).unwrap();
        let req = request("GET", "/tags/%25FF");
        let err = route
            .matches(&req, &mut response(), &ParamMappers::new())
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn mapper_transforms_value() {
        let route = Route::new("get", "/users/:id", noop()).unwrap();
        let mut mappers = ParamMappers::new();
        mappers.insert(
            "id".into(),
            Arc::new(|_: &Request, _: &mut Response, v: &str| {
                Ok(v.parse::<i64>().ok().map(Value::from))
            }),
        );

        let params = route
            .matches(&request("GET", "/users/12"), &mut response(), &mappers)
            .unwrap()
            .unwrap();
        assert_eq!(params["id"], 12);
    }

    #[test]
    fn mapper_returning_none_suppresses_key_but_still_matches() {
        let route = Route::new("get", "/users/:id", noop()).unwrap();
        let mut mappers = ParamMappers::new();
        mappers.insert(
            "id".into(),
            Arc::new(|_: &Request, _: &mut Response, _: &str| Ok(None)),
        );

        let params = route
            .matches(&request("GET", "/users/abc"), &mut response(), &mappers)
            .unwrap()
            .unwrap();
        assert!(!params.contains_key("id"));
    }

    #[test]
    fn mapper_error_propagates() {
        let route = Route::new("get", "/users/:id", noop()).unwrap();
        let mut mappers = ParamMappers::new();
        mappers.insert(
            "id".into(),
            Arc::new(|_: &Request, _: &mut Response, v: &str| {
                Err(Error::NotFound(format!("user {}", v)))
            }),
        );

        let err = route
            .matches(&request("GET", "/users/9"), &mut response(), &mappers)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn last_wildcard_wins() {
        let route = Route::new("get", "/*/files/*", noop()).unwrap();
        let params = route
            .matches(
                &request("GET", "/alice/files/a.txt"),
                &mut response(),
                &ParamMappers::new(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params["*"], "a.txt");
    }
}
