//! Response lifecycle.
//!
//! # Responsibilities
//! - Buffer status and headers until the head is committed
//! - Commit the head exactly once, then stream body bytes, then close
//! - Notify header and end observers exactly once each
//! - Provide the plain senders (text, html, bytes, json text, redirects)
//!
//! # Design Decisions
//! - States run `Building → HeaderSent → Ended` and never go back
//! - Header observers run while headers are still mutable; writing or ending
//!   from inside one is an error
//! - Mutations after the freeze are dropped with a warning, not an error
//! - The output channel is opened on first use, never earlier

use std::fmt;
use std::io::{self, Read};

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, DATE, LOCATION, SET_COOKIE,
};
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::http::cookie::Cookie;
use crate::http::date::format_http_date;
use crate::http::sink::{OutputSink, ResponseHead};

/// Chunk size for streamed bodies.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Runs at the header event; may still rewrite status and headers.
pub type HeaderObserver = Box<dyn FnOnce(&mut Response) + Send>;

/// Runs once the response has ended.
pub type EndObserver = Box<dyn FnOnce(&Response) + Send>;

type SinkOpener = Box<dyn FnOnce() -> io::Result<Box<dyn OutputSink>> + Send>;

/// Where a response is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Building,
    HeaderSent,
    Ended,
}

enum Output {
    Idle(SinkOpener),
    Open(Box<dyn OutputSink>),
    Closed,
}

/// Outbound response for one request.
pub struct Response {
    status: u16,
    headers: HeaderMap,
    locals: Map<String, Value>,
    state: LifecycleState,
    committing: bool,
    output: Output,
    header_observers: Vec<HeaderObserver>,
    end_observers: Vec<EndObserver>,
}

impl Response {
    /// A response writing to `sink`.
    pub fn new(sink: impl OutputSink + 'static) -> Self {
        Self::lazy(move || Ok(Box::new(sink) as Box<dyn OutputSink>))
    }

    /// A response whose output channel is produced on first use.
    pub fn lazy(
        opener: impl FnOnce() -> io::Result<Box<dyn OutputSink>> + Send + 'static,
    ) -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            locals: Map::new(),
            state: LifecycleState::Building,
            committing: false,
            output: Output::Idle(Box::new(opener)),
            header_observers: Vec::new(),
            end_observers: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_building(&self) -> bool {
        self.state == LifecycleState::Building
    }

    /// Whether the head has been committed.
    pub fn headers_sent(&self) -> bool {
        self.state != LifecycleState::Building
    }

    pub fn is_ended(&self) -> bool {
        self.state == LifecycleState::Ended
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        if self.ensure_mutable("status") {
            self.status = code;
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Set a header, replacing existing values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(name, value)?;
        if self.ensure_mutable(name.as_str()) {
            self.headers.insert(name, value);
        }
        Ok(())
    }

    /// Add a header value, keeping existing ones.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(name, value)?;
        if self.ensure_mutable(name.as_str()) {
            self.headers.append(name, value);
        }
        Ok(())
    }

    pub fn remove_header(&mut self, name: &str) {
        if self.ensure_mutable(name) {
            self.headers.remove(name);
        }
    }

    /// Set a header only when it is not present yet.
    pub fn set_header_if_absent(&mut self, name: &str, value: &str) -> Result<()> {
        if self.headers.contains_key(name) {
            return Ok(());
        }
        self.set_header(name, value)
    }

    pub fn content_type(&mut self, content_type: &str) -> Result<()> {
        self.set_header(CONTENT_TYPE.as_str(), content_type)
    }

    pub fn cookie(&mut self, cookie: &Cookie) -> Result<()> {
        self.append_header(SET_COOKIE.as_str(), &cookie.to_string())
    }

    /// Expire a cookie on the client.
    pub fn clear_cookie(&mut self, name: &str) -> Result<()> {
        self.cookie(&Cookie::new(name, "").path("/").max_age(0))
    }

    /// Template context specific to this response.
    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.locals
    }

    /// Register a header observer. Ignored once the head is committed.
    pub fn on_header(&mut self, observer: impl FnOnce(&mut Response) + Send + 'static) {
        if self.headers_sent() && !self.committing {
            warn!("Header observer registered after headers were sent");
            return;
        }
        self.header_observers.push(Box::new(observer));
    }

    /// Register an end observer. Ignored once the response has ended.
    pub fn on_end(&mut self, observer: impl FnOnce(&Response) + Send + 'static) {
        if self.is_ended() {
            warn!("End observer registered after the response ended");
            return;
        }
        self.end_observers.push(Box::new(observer));
    }

    /// Commit status and headers. A no-op once committed.
    pub fn send_head(&mut self) -> Result<()> {
        if self.state != LifecycleState::Building {
            return Ok(());
        }
        if self.committing {
            return Err(Error::ResponseState("written to from a header observer"));
        }

        self.committing = true;
        loop {
            let observers = std::mem::take(&mut self.header_observers);
            if observers.is_empty() {
                break;
            }
            for observer in observers {
                observer(self);
            }
        }
        self.committing = false;

        if !self.headers.contains_key(DATE) {
            let date = HeaderValue::try_from(format_http_date(Utc::now()))
                .map_err(|e| Error::Internal(e.to_string()))?;
            self.headers.insert(DATE, date);
        }
        self.state = LifecycleState::HeaderSent;

        let head = ResponseHead {
            status: self.status,
            headers: self.headers.clone(),
        };
        self.channel()?.write_head(&head)?;
        Ok(())
    }

    /// Write body bytes, committing the head first if needed.
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if self.is_ended() {
            return Err(Error::ResponseState("already ended"));
        }
        self.send_head()?;
        if !chunk.is_empty() {
            self.channel()?.write_body(chunk)?;
        }
        Ok(())
    }

    /// Stream a reader into the body in fixed-size chunks.
    pub fn write_from(&mut self, mut reader: impl Read) -> Result<u64> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.write(&buf[..n])?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Finish the response. Later calls do nothing.
    ///
    /// The end observers fire even when committing or closing failed; the
    /// failure is still returned.
    pub fn end(&mut self) -> Result<()> {
        if self.is_ended() {
            return Ok(());
        }
        if self.committing {
            return Err(Error::ResponseState("ended from a header observer"));
        }

        let mut result = self.send_head();
        if result.is_ok() {
            result = self
                .channel()
                .and_then(|sink| sink.close().map_err(Error::from));
        }
        self.output = Output::Closed;
        self.state = LifecycleState::Ended;

        for observer in std::mem::take(&mut self.end_observers) {
            observer(self);
        }
        result
    }

    /// Send a bodyless response with `code`.
    pub fn send_status(&mut self, code: u16) -> Result<()> {
        self.set_status(code);
        if !self.headers_sent() {
            if (100..200).contains(&code) || code == 204 || code == 304 {
                self.remove_header(CONTENT_LENGTH.as_str());
            } else {
                self.set_header(CONTENT_LENGTH.as_str(), "0")?;
            }
        }
        self.end()
    }

    /// Send plain text; `Content-Type` defaults to `text/plain`.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.set_header_if_absent(CONTENT_TYPE.as_str(), "text/plain; charset=UTF-8")?;
        self.send_payload(text.as_bytes())
    }

    /// Send an HTML document; `Content-Type` defaults to `text/html`.
    pub fn send_html(&mut self, html: &str) -> Result<()> {
        self.set_header_if_absent(CONTENT_TYPE.as_str(), "text/html; charset=UTF-8")?;
        self.send_payload(html.as_bytes())
    }

    /// Send raw bytes; `Content-Type` defaults to `application/octet-stream`.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.set_header_if_absent(CONTENT_TYPE.as_str(), "application/octet-stream")?;
        self.send_payload(bytes)
    }

    /// Send an already serialized JSON document.
    pub fn send_json_text(&mut self, json: &str) -> Result<()> {
        self.set_header_if_absent(CONTENT_TYPE.as_str(), "application/json")?;
        self.send_payload(json.as_bytes())
    }

    /// Temporary (302) redirect.
    pub fn redirect(&mut self, url: &str) -> Result<()> {
        self.redirect_with(url, 302)
    }

    /// Permanent (301) redirect.
    pub fn redirect_permanent(&mut self, url: &str) -> Result<()> {
        self.redirect_with(url, 301)
    }

    fn redirect_with(&mut self, url: &str, code: u16) -> Result<()> {
        self.set_header(LOCATION.as_str(), url)?;
        self.send_status(code)
    }

    fn send_payload(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.headers_sent() {
            self.set_header(CONTENT_LENGTH.as_str(), &bytes.len().to_string())?;
        }
        self.write(bytes)?;
        self.end()
    }

    fn ensure_mutable(&self, what: &str) -> bool {
        if self.state == LifecycleState::Building {
            return true;
        }
        warn!(field = what, "Response headers already sent, change ignored");
        false
    }

    fn channel(&mut self) -> Result<&mut dyn OutputSink> {
        if matches!(self.output, Output::Idle(_)) {
            if let Output::Idle(open) = std::mem::replace(&mut self.output, Output::Closed) {
                self.output = Output::Open(open()?);
            }
        }
        match &mut self.output {
            Output::Open(sink) => Ok(sink.as_mut()),
            _ => Err(Error::ResponseState("output channel is closed")),
        }
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::Internal(format!("invalid header name {:?}", name)))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| Error::Internal(format!("invalid value for header {}", name)))?;
    Ok((header_name, header_value))
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("state", &self.state)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
