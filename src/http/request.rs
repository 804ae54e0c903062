//! Inbound request view.
//!
//! # Responsibilities
//! - Hold the method, decoded path, query, headers and raw body of one request
//! - Resolve parameters in precedence order: path, body, query
//! - Negotiate content types against the `Accept` header
//! - Carry the attribute slots that middleware populates (body, cookies, session)
//!
//! # Design Decisions
//! - Built once by the transport; only attributes, params and the method
//!   (for method override) change afterwards
//! - The path is percent-decoded strictly; invalid input is a bad request
//! - Attribute values are typed; lookups downcast by the caller's type

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use axum::http::Version;
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::http::accept::{self, MediaRange};
use crate::http::body::Body;
use crate::http::cookie::CookieJar;
use crate::middleware::session::SessionHandle;

/// Attribute key for the parsed body.
pub const BODY_ATTR: &str = "body";
/// Attribute key for the parsed cookie jar.
pub const COOKIES_ATTR: &str = "cookies";
/// Attribute key for the session handle.
pub const SESSION_ATTR: &str = "session";
/// Attribute key for the method before an override.
pub const ORIGINAL_METHOD_ATTR: &str = "originalMethod";
/// Attribute key for an authenticated user name.
pub const USER_ATTR: &str = "user";

static EMPTY_JAR: CookieJar = CookieJar::EMPTY;

/// Free-form typed attribute map populated by middleware.
#[derive(Default)]
pub struct Attributes {
    map: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.map.insert(key.into(), Box::new(value));
    }

    /// Value under `key` if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.map.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.map.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

/// One inbound HTTP request.
#[derive(Debug)]
pub struct Request {
    method: String,
    url: String,
    path: String,
    query: Vec<(String, String)>,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    raw_body: Bytes,
    start_time: Instant,
    attributes: Attributes,
    params: Map<String, Value>,
    route_index: Option<usize>,
}

impl Request {
    /// Start building a request for `method` and a request target such as
    /// `/users/1?expand=true`.
    pub fn builder(method: &str, target: &str) -> RequestBuilder {
        RequestBuilder {
            method: method.to_string(),
            target: target.to_string(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            remote_addr: None,
            body: Bytes::new(),
            error: None,
        }
    }

    /// Lower-cased method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Replace the method, remembering the first original one.
    pub fn set_method(&mut self, method: &str) {
        if !self.attributes.contains(ORIGINAL_METHOD_ATTR) {
            let original = self.method.clone();
            self.attributes.insert(ORIGINAL_METHOD_ATTR, original);
        }
        self.method = method.to_ascii_lowercase();
    }

    /// The request target as received.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The percent-decoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First query-string value for `key`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every query-string value for `key`.
    pub fn query_all(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// First value of a header, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the media type of `Content-Type` equals `content_type`,
    /// ignoring parameters and case.
    pub fn is_type(&self, content_type: &str) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.eq_ignore_ascii_case(content_type.trim()))
    }

    /// Media type of `Content-Type` without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Remote IP address of the peer.
    pub fn ip(&self) -> Option<IpAddr> {
        self.remote_addr.map(|a| a.ip())
    }

    /// When the transport constructed this request.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// The buffered request body bytes.
    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Parsed body, if a body parser ran.
    pub fn body(&self) -> Option<&dyn Body> {
        self.attributes
            .get::<Arc<dyn Body>>(BODY_ATTR)
            .map(|b| b.as_ref())
    }

    pub fn set_body(&mut self, body: impl Body + 'static) {
        let body: Arc<dyn Body> = Arc::new(body);
        self.attributes.insert(BODY_ATTR, body);
    }

    /// Parsed body field.
    pub fn body_value(&self, key: &str) -> Option<Value> {
        self.body().and_then(|b| b.get(key))
    }

    /// Cookies parsed by the cookie middleware; empty when it did not run.
    pub fn cookies(&self) -> &CookieJar {
        self.attributes
            .get::<CookieJar>(COOKIES_ATTR)
            .unwrap_or(&EMPTY_JAR)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(|c| c.value())
    }

    /// The session installed by the session middleware.
    pub fn session(&self) -> Result<SessionHandle> {
        match self.attributes.get::<SessionHandle>(SESSION_ATTR) {
            Some(handle) => Ok(handle.clone()),
            None => {
                tracing::warn!(
                    path = %self.path,
                    "No session was found, is the session middleware installed?"
                );
                Err(Error::Internal("no session middleware installed".into()))
            }
        }
    }

    /// Resolved path parameters.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Merge a route match into the resolved parameters, replacing
    /// identically-named earlier values.
    pub fn merge_params(&mut self, params: Map<String, Value>) {
        self.params.extend(params);
    }

    /// Index of the route that matched last.
    pub fn route_index(&self) -> Option<usize> {
        self.route_index
    }

    pub fn set_route_index(&mut self, index: usize) {
        self.route_index = Some(index);
    }

    /// Look up a parameter: path, then body, then query. Nulls are skipped.
    pub fn param(&self, key: &str) -> Option<Value> {
        self.params
            .get(key)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| self.body_value(key))
            .or_else(|| self.query(key).map(|v| Value::String(v.to_string())))
    }

    /// [`param`](Self::param) rendered as a string.
    pub fn param_str(&self, key: &str) -> Option<String> {
        self.param(key).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Fail with a 400 naming the first absent parameter.
    pub fn require_params(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|n| self.param(n).is_none()) {
            Some(missing) => Err(Error::missing_parameter(missing)),
            None => Ok(()),
        }
    }

    /// Bind the named parameters into a typed record.
    ///
    /// Every field must resolve through [`param`](Self::param); a value that
    /// does not fit the record's field type is a bad request.
    pub fn data<T: DeserializeOwned>(&self, fields: &[&str]) -> Result<T> {
        self.require_params(fields)?;
        let record: Map<String, Value> = fields
            .iter()
            .filter_map(|f| self.param(f).map(|v| (f.to_string(), v)))
            .collect();
        serde_json::from_value(Value::Object(record)).map_err(|e| Error::BadRequest(e.to_string()))
    }

    /// Parsed `Accept` header, highest quality first.
    pub fn accepted(&self) -> Vec<MediaRange> {
        self.headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(accept::parse_accept)
            .unwrap_or_default()
    }

    /// Whether the client accepts `content_type` (a MIME type or short name).
    pub fn accepts(&self, content_type: &str) -> bool {
        accept::accepts(&self.accepted(), content_type)
    }

    /// The first candidate matching the client's most preferred type.
    pub fn accepts_any<'c>(&self, candidates: &[&'c str]) -> Option<&'c str> {
        accept::negotiate(&self.accepted(), candidates)
    }
}

/// Builder for [`Request`]. Header errors surface from [`build`](Self::build).
#[derive(Debug)]
pub struct RequestBuilder {
    method: String,
    target: String,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: Bytes,
    error: Option<Error>,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.error
                    .get_or_insert(Error::BadRequest(format!("invalid header {}", name)));
            }
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let (raw_path, raw_query) = match self.target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (self.target.as_str(), ""),
        };
        let path = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|_| Error::BadRequest(format!("invalid path encoding: {}", raw_path)))?
            .into_owned();
        let path = if path.is_empty() { "/".to_string() } else { path };
        let query = url::form_urlencoded::parse(raw_query.as_bytes())
            .into_owned()
            .collect();

        Ok(Request {
            method: self.method.to_ascii_lowercase(),
            url: self.target,
            path,
            query,
            version: self.version,
            headers: self.headers,
            remote_addr: self.remote_addr,
            raw_body: self.body,
            start_time: Instant::now(),
            attributes: Attributes::default(),
            params: Map::new(),
            route_index: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::{JsonBody, UrlEncodedBody};
    use serde::Deserialize;
    use serde_json::json;

    fn get(target: &str) -> Request {
        Request::builder("GET", target).build().unwrap()
    }

    #[test]
    fn splits_and_decodes_target() {
        let req = get("/a%20b/c?x=1&y=two+words&x=2");
        assert_eq!(req.method(), "get");
        assert_eq!(req.path(), "/a b/c");
        assert_eq!(req.query("x"), Some("1"));
        assert_eq!(req.query_all("x"), ["1", "2"]);
        assert_eq!(req.query("y"), Some("two words"));
        assert_eq!(req.url(), "/a%20b/c?x=1&y=two+words&x=2");
    }

    #[test]
    fn rejects_invalid_path_encoding() {
        let err = Request::builder("GET", "/%FF").build().unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn param_precedence_is_path_body_query() {
        let mut req = get("/users/1?id=3&only_query=q");
        req.set_body(JsonBody::new(json!({"id": 2, "only_body": "b"})));
        req.merge_params(json!({"id": "1"}).as_object().cloned().unwrap());

        assert_eq!(req.param("id"), Some(json!("1")));
        assert_eq!(req.param("only_body"), Some(json!("b")));
        assert_eq!(req.param("only_query"), Some(json!("q")));
        assert_eq!(req.param("nothing"), None);
    }

    #[test]
    fn merge_overwrites_earlier_match() {
        let mut req = get("/");
        req.merge_params(json!({"a": "1", "b": "1"}).as_object().cloned().unwrap());
        req.merge_params(json!({"b": "2"}).as_object().cloned().unwrap());
        assert_eq!(req.params()["a"], "1");
        assert_eq!(req.params()["b"], "2");
    }

    #[test]
    fn require_params_names_first_missing() {
        let req = get("/?a=1");
        assert!(req.require_params(&["a"]).is_ok());
        match req.require_params(&["a", "b", "c"]) {
            Err(Error::Status { code: 400, message }) => {
                assert_eq!(message, "Missing parameter: b")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn binds_typed_record() {
        #[derive(Deserialize)]
        struct Signup {
            name: String,
            plan: String,
        }

        let mut req = Request::builder("POST", "/signup?plan=pro").build().unwrap();
        req.set_body(UrlEncodedBody::parse(b"name=ada"));
        let signup: Signup = req.data(&["name", "plan"]).unwrap();
        assert_eq!(signup.name, "ada");
        assert_eq!(signup.plan, "pro");

        assert!(req.data::<Signup>(&["name", "plan", "email"]).is_err());
    }

    #[test]
    fn accept_negotiation() {
        let req = Request::builder("GET", "/")
            .header("Accept", "text/html;q=0.8, application/json")
            .build()
            .unwrap();
        assert_eq!(req.accepts_any(&["json", "html"]), Some("json"));
        assert!(req.accepts("html"));

        let req = Request::builder("GET", "/")
            .header("Accept", "application/json")
            .build()
            .unwrap();
        assert!(!req.accepts("html"));
        assert!(!get("/").accepts("html"));
    }

    #[test]
    fn content_type_check_ignores_parameters() {
        let req = Request::builder("POST", "/")
            .header("Content-Type", "application/json; charset=utf-8")
            .build()
            .unwrap();
        assert!(req.is_type("application/json"));
        assert!(!req.is_type("text/plain"));
    }

    #[test]
    fn cookies_absent_without_parser() {
        let mut req = get("/");
        assert!(req.cookie("sid").is_none());
        req.attributes_mut()
            .insert(COOKIES_ATTR, CookieJar::from_header("sid=42"));
        assert_eq!(req.cookie("sid"), Some("42"));
    }

    #[test]
    fn session_without_middleware_fails() {
        assert!(matches!(get("/").session(), Err(Error::Internal(_))));
    }

    #[test]
    fn method_override_keeps_original() {
        let mut req = Request::builder("POST", "/").build().unwrap();
        req.set_method("DELETE");
        req.set_method("PUT");
        assert_eq!(req.method(), "put");
        assert_eq!(
            req.attributes().get::<String>(ORIGINAL_METHOD_ATTR).map(String::as_str),
            Some("post")
        );
    }
}
