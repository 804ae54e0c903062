//! Output channel contract between the response and the transport.
//!
//! The response writes the head exactly once, then body chunks in order,
//! then closes. `close` must tolerate repeated calls.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::HeaderMap;

/// Status line and headers frozen at the header event.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
}

/// Raw output channel for one response.
pub trait OutputSink: Send {
    fn write_head(&mut self, head: &ResponseHead) -> io::Result<()>;
    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct Captured {
    head: Option<ResponseHead>,
    body: Vec<u8>,
    closes: usize,
}

/// In-memory sink. Clones share the captured output, so a test can keep one
/// handle while the response owns the other.
#[derive(Debug, Clone, Default)]
pub struct BufferedSink {
    inner: Arc<Mutex<Captured>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Captured> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The head, once written.
    pub fn head(&self) -> Option<ResponseHead> {
        self.lock().head.clone()
    }

    pub fn status(&self) -> Option<u16> {
        self.lock().head.as_ref().map(|h| h.status)
    }

    /// A header value from the written head.
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .head
            .as_ref()
            .and_then(|h| h.headers.get(name))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn body(&self) -> Vec<u8> {
        self.lock().body.clone()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.lock().body).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closes > 0
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }
}

impl OutputSink for BufferedSink {
    fn write_head(&mut self, head: &ResponseHead) -> io::Result<()> {
        let mut captured = self.lock();
        if captured.head.is_some() {
            return Err(io::Error::new(io::ErrorKind::Other, "head already written"));
        }
        captured.head = Some(head.clone());
        Ok(())
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut captured = self.lock();
        if captured.closes > 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        captured.body.extend_from_slice(chunk);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.lock().closes += 1;
        Ok(())
    }
}
