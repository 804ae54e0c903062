//! The per-request exchange handed to handlers.
//!
//! # Responsibilities
//! - Own the request, the response and a handle to the application
//! - Provide the senders that need both sides: JSON (with JSONP), views,
//!   files with conditional GET, and status pages
//!
//! # Design Decisions
//! - Status pages prefer an `errors/<code>` view for HTML clients and fall
//!   back to a bare status; failures on that path are logged, never raised
//! - File metadata is read once; the body streams in fixed-size chunks

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, DATE, IF_MODIFIED_SINCE, LAST_MODIFIED};
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::app::{App, JSONP_NAME_SETTING, JSONP_SETTING};
use crate::error::Result;
use crate::http::date::{format_http_date, parse_http_date};
use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::Response;

/// Request, response and application for one exchange.
#[derive(Debug)]
pub struct RouteContext {
    pub req: Request,
    pub res: Response,
    pub app: Arc<App>,
}

impl RouteContext {
    pub fn new(app: Arc<App>, req: Request, res: Response) -> Self {
        Self { req, res, app }
    }

    /// Serialize `value` and send it as JSON.
    ///
    /// When JSONP is enabled and the callback query parameter is present the
    /// payload is wrapped in a call and sent as JavaScript.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let body = serde_json::to_string(value)?;
        match self.jsonp_callback() {
            Some(callback) => {
                self.res
                    .set_header_if_absent(CONTENT_TYPE.as_str(), "application/javascript")?;
                self.res.send_text(&format!("{}({})", callback, body))
            }
            None => self.res.send_json_text(&body),
        }
    }

    fn jsonp_callback(&self) -> Option<String> {
        if !self.app.enabled(JSONP_SETTING) {
            return None;
        }
        let key = self.app.setting_str(JSONP_NAME_SETTING).unwrap_or("callback");
        let callback: String = self
            .req
            .query(key)?
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'))
            .collect();
        (!callback.is_empty()).then_some(callback)
    }

    /// Render a view and send it as HTML.
    pub fn render(&mut self, view: &str, data: Value) -> Result<()> {
        let html = self.render_to_string(view, data)?;
        self.res.send_html(&html)
    }

    /// Render a view to text without sending it.
    ///
    /// The context is layered, later entries winning: application locals,
    /// `settings`, response locals, `request`, then `data`.
    pub fn render_to_string(&self, view: &str, data: Value) -> Result<String> {
        let mut context = self.app.locals().clone();
        context.insert("settings".into(), Value::Object(self.app.settings().clone()));
        context.extend(self.res.locals().clone());
        context.insert("request".into(), self.request_summary());
        if let Value::Object(data) = data {
            context.extend(data);
        }
        self.app.render_view(view, &context)
    }

    fn request_summary(&self) -> Value {
        let query: Map<String, Value> = self
            .req
            .query_pairs()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        json!({
            "method": self.req.method(),
            "path": self.req.path(),
            "url": self.req.url(),
            "query": query,
            "params": self.req.params(),
        })
    }

    /// Send a file, honouring `If-Modified-Since`.
    ///
    /// A missing path (or a directory) is a bare 404.
    pub fn send_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => return self.res.send_status(404),
        };
        let modified = DateTime::<Utc>::from(metadata.modified()?);
        let modified = modified.with_nanosecond(0).unwrap_or(modified);

        let since = self.req.header(IF_MODIFIED_SINCE.as_str()).and_then(parse_http_date);
        if since.is_some_and(|since| modified <= since) {
            return self.res.send_status(304);
        }

        let res = &mut self.res;
        res.set_header_if_absent(CONTENT_LENGTH.as_str(), &metadata.len().to_string())?;
        res.set_header_if_absent(DATE.as_str(), &format_http_date(Utc::now()))?;
        res.set_header_if_absent(LAST_MODIFIED.as_str(), &format_http_date(modified))?;
        res.set_header_if_absent(CONTENT_TYPE.as_str(), mime::from_path(path))?;

        if self.req.method() == "head" {
            return self.res.end();
        }
        let file = File::open(path)?;
        self.res.write_from(file)?;
        self.res.end()
    }

    /// Send a status page for `code`.
    pub fn send_error_response(&mut self, code: u16) -> Result<()> {
        self.res.set_status(code);
        if self.req.accepts("html") {
            match self.render(&format!("errors/{}", code), Value::Null) {
                Ok(()) => return Ok(()),
                Err(e) => debug!(code, error = %e, "No error page rendered"),
            }
        }
        self.res.send_status(code)
    }

    pub fn ok(&mut self) -> Result<()> {
        self.send_error_response(200)
    }

    pub fn bad_request(&mut self) -> Result<()> {
        self.send_error_response(400)
    }

    pub fn forbidden(&mut self) -> Result<()> {
        self.send_error_response(403)
    }

    pub fn not_found(&mut self) -> Result<()> {
        self.send_error_response(404)
    }

    pub fn unacceptable(&mut self) -> Result<()> {
        self.send_error_response(406)
    }

    pub fn conflict(&mut self) -> Result<()> {
        self.send_error_response(409)
    }

    pub fn internal_server_error(&mut self) -> Result<()> {
        self.send_error_response(500)
    }

    pub fn not_implemented(&mut self) -> Result<()> {
        self.send_error_response(501)
    }
}
