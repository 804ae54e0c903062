//! Session middleware and its stores.
//!
//! # Data Flow
//! ```text
//! session(store)
//!     → store.load(request)          (once per request)
//!     → attributes["session"] = handle
//!     → handler mutates through req.session()
//!     → header observer: store.save(session, response)
//! ```
//!
//! # Design Decisions
//! - Saving happens while the head is being committed so the store can still
//!   set cookies
//! - Unchanged sessions are never saved
//! - An emptied session is deleted rather than stored

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::http::context::RouteContext;
use crate::http::cookie::{Cookie, CookieJar};
use crate::http::request::{Request, SESSION_ATTR};
use crate::http::response::Response;

/// Shared handle to the session of one request.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Key/value data attached to a client across requests.
#[derive(Debug, Clone, Default)]
pub struct Session {
    id: Option<String>,
    data: Map<String, Value>,
    changed: bool,
}

impl Session {
    /// A session restored by a store.
    pub fn restore(id: Option<String>, data: Map<String, Value>) -> Self {
        Self {
            id,
            data,
            changed: false,
        }
    }

    /// Store-assigned identifier, if the store uses one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
        self.changed = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    /// Drop every value; the store deletes the session on save.
    pub fn clear(&mut self) {
        if !self.data.is_empty() || self.id.is_some() {
            self.changed = true;
        }
        self.data.clear();
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

/// Persistence for sessions.
pub trait SessionStore: Send + Sync {
    /// Restore the session for a request, or start an empty one.
    fn load(&self, req: &Request) -> Session;

    /// Persist a changed session, setting whatever cookies it needs.
    fn save(&self, session: &Session, res: &mut Response) -> Result<()>;
}

/// Install a session on every request.
pub fn session<S>(store: S) -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static
where
    S: SessionStore + 'static,
{
    let store = Arc::new(store);
    move |ctx| {
        let handle: SessionHandle = Arc::new(Mutex::new(store.load(&ctx.req)));
        ctx.req.attributes_mut().insert(SESSION_ATTR, handle.clone());

        let store = store.clone();
        ctx.res.on_header(move |res| {
            let session = handle.lock().unwrap_or_else(PoisonError::into_inner);
            if !session.is_changed() {
                return;
            }
            if let Err(e) = store.save(&session, res) {
                warn!(error = %e, "Failed to save session");
            }
        });
        Ok(false)
    }
}

/// Read a cookie whether or not the cookie parser ran.
fn request_cookie(req: &Request, name: &str) -> Option<String> {
    if let Some(value) = req.cookie(name) {
        return Some(value.to_string());
    }
    let header = req.header("cookie")?;
    CookieJar::from_header(header)
        .get(name)
        .map(|c| c.value().to_string())
}

/// Server-wide in-memory store keyed by a random session-id cookie.
#[derive(Clone)]
pub struct MemoryStore {
    cookie_name: String,
    sessions: Arc<DashMap<String, Map<String, Value>>>,
}

impl MemoryStore {
    pub const DEFAULT_COOKIE: &'static str = "_expressway_sid";

    pub fn new() -> Self {
        Self::with_cookie(Self::DEFAULT_COOKIE)
    }

    pub fn with_cookie(name: impl Into<String>) -> Self {
        Self {
            cookie_name: name.into(),
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("cookie_name", &self.cookie_name)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, req: &Request) -> Session {
        let Some(id) = request_cookie(req, &self.cookie_name) else {
            return Session::default();
        };
        match self.sessions.get(&id) {
            Some(data) => Session::restore(Some(id), data.clone()),
            None => {
                debug!(session_id = %id, "Unknown session id");
                Session::default()
            }
        }
    }

    fn save(&self, session: &Session, res: &mut Response) -> Result<()> {
        if session.is_empty() {
            if let Some(id) = session.id() {
                self.sessions.remove(id);
                res.clear_cookie(&self.cookie_name)?;
            }
            return Ok(());
        }

        match session.id() {
            Some(id) => {
                self.sessions.insert(id.to_string(), session.data().clone());
            }
            None => {
                let id = Uuid::new_v4().to_string();
                self.sessions.insert(id.clone(), session.data().clone());
                res.cookie(&Cookie::new(&self.cookie_name, id).path("/").http_only(true))?;
            }
        }
        Ok(())
    }
}

/// Stores the whole session in a cookie as percent-encoded JSON.
#[derive(Debug, Clone)]
pub struct CookieStore {
    cookie_name: String,
    max_age: i64,
}

impl CookieStore {
    pub const DEFAULT_COOKIE: &'static str = "_expressway_session";
    pub const DEFAULT_MAX_AGE: i64 = 86_400;

    pub fn new() -> Self {
        Self {
            cookie_name: Self::DEFAULT_COOKIE.to_string(),
            max_age: Self::DEFAULT_MAX_AGE,
        }
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = seconds;
        self
    }
}

impl Default for CookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for CookieStore {
    fn load(&self, req: &Request) -> Session {
        let Some(raw) = request_cookie(req, &self.cookie_name) else {
            return Session::default();
        };
        let decoded = percent_decode_str(&raw).decode_utf8_lossy();
        match serde_json::from_str::<Map<String, Value>>(&decoded) {
            Ok(data) => Session::restore(None, data),
            Err(e) => {
                debug!(error = %e, "Discarding unreadable session cookie");
                Session::default()
            }
        }
    }

    fn save(&self, session: &Session, res: &mut Response) -> Result<()> {
        let cookie = if session.is_empty() {
            Cookie::new(&self.cookie_name, "").path("/").max_age(0)
        } else {
            let json = serde_json::to_string(session.data())?;
            let value = utf8_percent_encode(&json, NON_ALPHANUMERIC).to_string();
            Cookie::new(&self.cookie_name, value)
                .path("/")
                .http_only(true)
                .max_age(self.max_age)
        };
        res.cookie(&cookie)
    }
}
