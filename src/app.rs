//! The application: settings, routes and the request entry point.
//!
//! # Responsibilities
//! - Register routes and middleware in priority order
//! - Hold settings, template locals, parameter mappers and view engines
//! - Answer each request: dispatch, 404 fallback, error hand-off
//!
//! # Design Decisions
//! - Built mutably at startup, then shared read-only behind an `Arc`
//! - Exactly one error handler per application, injected rather than global
//! - A failing handler is never retried or recovered locally

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::ServerConfig;
use crate::error::{default_error_handler, Error, ErrorHandler, Result};
use crate::http::context::RouteContext;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::observability::metrics;
use crate::routing::{Dispatch, Handler, ParamMappers, Route, Router, ANY_METHOD};
use crate::view::{self, Engine};

/// Directory views are resolved against.
pub const VIEWS_SETTING: &str = "views";
/// Default template extension.
pub const VIEW_ENGINE_SETTING: &str = "view engine";
/// Enables JSONP responses from `json`.
pub const JSONP_SETTING: &str = "jsonp callback";
/// Query parameter carrying the JSONP callback name.
pub const JSONP_NAME_SETTING: &str = "jsonp callback name";

/// An HTTP application.
pub struct App {
    router: Router,
    settings: Map<String, Value>,
    locals: Map<String, Value>,
    mappers: ParamMappers,
    engines: HashMap<String, Arc<dyn Engine>>,
    error_handler: ErrorHandler,
}

impl App {
    pub fn new() -> Self {
        let mut settings = Map::new();
        settings.insert(VIEWS_SETTING.into(), Value::from("views/"));
        settings.insert(JSONP_NAME_SETTING.into(), Value::from("callback"));

        Self {
            router: Router::new(),
            settings,
            locals: Map::new(),
            mappers: ParamMappers::new(),
            engines: HashMap::new(),
            error_handler: Arc::new(default_error_handler),
        }
    }

    /// An application seeded with settings from configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut app = Self::new();
        app.set(VIEWS_SETTING, config.views.root.clone());
        if let Some(engine) = &config.views.engine {
            app.set(VIEW_ENGINE_SETTING, engine.clone());
        }
        app.set(JSONP_SETTING, config.jsonp.enabled);
        app.set(JSONP_NAME_SETTING, config.jsonp.callback_name.clone());
        for (key, value) in &config.settings {
            match serde_json::to_value(value) {
                Ok(value) => {
                    app.set(key, value);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unrepresentable setting"),
            }
        }
        app
    }

    // Settings

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.settings.insert(name.to_string(), value.into());
        self
    }

    pub fn setting(&self, name: &str) -> Option<&Value> {
        self.settings.get(name)
    }

    pub fn setting_str(&self, name: &str) -> Option<&str> {
        self.settings.get(name).and_then(Value::as_str)
    }

    pub fn enable(&mut self, feature: &str) -> &mut Self {
        self.set(feature, true)
    }

    pub fn disable(&mut self, feature: &str) -> &mut Self {
        self.set(feature, false)
    }

    /// Whether a setting is `true`. Missing settings are disabled.
    pub fn enabled(&self, feature: &str) -> bool {
        matches!(self.settings.get(feature), Some(Value::Bool(true)))
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// Values visible to every rendered view.
    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.locals
    }

    // Collaborators

    /// Map a path parameter before handlers see it.
    ///
    /// Returning `Ok(None)` drops the parameter without failing the match.
    pub fn param<F>(&mut self, name: &str, mapper: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response, &str) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.mappers.insert(name.to_string(), Arc::new(mapper));
        self
    }

    /// Register a template engine for a file extension.
    pub fn engine(&mut self, extension: &str, engine: impl Engine + 'static) -> &mut Self {
        self.engines.insert(
            extension.trim_start_matches('.').to_string(),
            Arc::new(engine),
        );
        self
    }

    /// Replace the error handler.
    pub fn error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Error, &mut RouteContext) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    // Registration

    /// Append a route. Registration order is dispatch priority.
    pub fn install<F>(&mut self, method: &str, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.router.install(Route::new(method, path, handler)?);
        Ok(self)
    }

    /// Middleware for every request.
    pub fn middleware<F>(&mut self, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install(ANY_METHOD, "*", handler)
    }

    /// Middleware for requests matching `path`.
    pub fn middleware_at<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install(ANY_METHOD, path, handler)
    }

    pub fn all<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install(ANY_METHOD, path, handler)
    }

    pub fn get<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install("get", path, handler)
    }

    pub fn post<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install("post", path, handler)
    }

    pub fn put<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install("put", path, handler)
    }

    pub fn patch<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install("patch", path, handler)
    }

    pub fn delete<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install("delete", path, handler)
    }

    pub fn head<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static,
    {
        self.install("head", path, handler)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    // Views

    /// Map a view name to its template file under the views root.
    ///
    /// Fails with `NoEngine` when no engine handles the extension. The file
    /// itself is not checked.
    pub fn resolve_view(&self, name: &str) -> Result<view::ResolvedView> {
        let root = Path::new(self.setting_str(VIEWS_SETTING).unwrap_or("views/"));
        let resolved = view::resolve(root, name, self.setting_str(VIEW_ENGINE_SETTING))?;
        if !self.engines.contains_key(&resolved.extension) {
            return Err(Error::NoEngine(resolved.extension));
        }
        Ok(resolved)
    }

    /// Resolve and render a view with a prepared context.
    pub fn render_view(&self, name: &str, context: &Map<String, Value>) -> Result<String> {
        let resolved = self.resolve_view(name)?;
        let engine = self
            .engines
            .get(&resolved.extension)
            .ok_or_else(|| Error::NoEngine(resolved.extension.clone()))?;
        if !resolved.path.is_file() {
            return Err(Error::ViewNotFound(resolved.path.display().to_string()));
        }
        engine.render(&resolved.path, context)
    }

    // Dispatch

    /// Answer one request. The response's end observers fire once it is done.
    pub fn handle(self: &Arc<Self>, req: Request, mut res: Response) {
        let method = req.method().to_string();
        let started = req.start_time();
        res.on_end(move |res| metrics::record_request(&method, res.status(), started));

        let mut ctx = RouteContext::new(Arc::clone(self), req, res);
        self.dispatch(&mut ctx);
    }

    /// Walk every route for this exchange.
    pub fn dispatch(&self, ctx: &mut RouteContext) {
        self.dispatch_from(ctx, 0);
    }

    /// Walk the routes starting at `start`, e.g. after an internal forward.
    pub fn dispatch_from(&self, ctx: &mut RouteContext, start: usize) {
        match self.router.dispatch_from(ctx, start, &self.mappers) {
            Dispatch::Handled(index) => {
                tracing::trace!(index, path = %ctx.req.path(), "Request handled");
            }
            Dispatch::Unhandled => {
                if let Err(e) = ctx.not_found() {
                    (self.error_handler)(e, ctx);
                }
            }
            Dispatch::Failed(e) => (self.error_handler)(e, ctx),
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.router.len())
            .field("settings", &self.settings)
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::sink::BufferedSink;
    use serde_json::json;
    use std::sync::Mutex;

    fn run(app: App, req: Request) -> BufferedSink {
        let sink = BufferedSink::new();
        Arc::new(app).handle(req, Response::new(sink.clone()));
        sink
    }

    fn get(target: &str) -> Request {
        Request::builder("GET", target).build().unwrap()
    }

    #[test]
    fn dispatch_stops_at_first_handled() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut app = App::new();
        for (name, handled) in [("r1", false), ("r2", true), ("r3", true)] {
            let calls = calls.clone();
            app.all("/x", move |ctx| {
                calls.lock().unwrap().push(name);
                if handled {
                    ctx.res.send_text(name)?;
                }
                Ok(handled)
            })
            .unwrap();
        }

        let sink = run(app, get("/x"));
        assert_eq!(*calls.lock().unwrap(), ["r1", "r2"]);
        assert_eq!(sink.body_string(), "r2");
    }

    #[test]
    fn registration_order_beats_specificity() {
        let mut app = App::new();
        app.get("*", |ctx| {
            ctx.res.send_text("wildcard")?;
            Ok(true)
        })
        .unwrap();
        app.get("/exact", |ctx| {
            ctx.res.send_text("exact")?;
            Ok(true)
        })
        .unwrap();

        assert_eq!(run(app, get("/exact")).body_string(), "wildcard");
    }

    #[test]
    fn no_match_is_404() {
        let mut app = App::new();
        app.post("/only-post", |_| Ok(true)).unwrap();
        app.middleware(|_| Ok(false)).unwrap();

        let sink = run(app, get("/only-post"));
        assert_eq!(sink.status(), Some(404));
        assert!(sink.is_closed());
    }

    #[test]
    fn errors_map_to_status() {
        let mut app = App::new();
        app.get("/missing", |_| Err(Error::NotFound("thing".into())))
            .unwrap();
        app.get("/boom", |_| Err(Error::Internal("boom".into())))
            .unwrap();
        app.get("/teapot", |_| Err(Error::status(418, "short and stout")))
            .unwrap();
        let app = Arc::new(app);

        let send = |target: &str| {
            let sink = BufferedSink::new();
            app.handle(get(target), Response::new(sink.clone()));
            sink
        };

        let sink = send("/missing");
        assert_eq!(sink.status(), Some(404));
        assert!(sink.is_closed());

        let sink = send("/boom");
        assert_eq!(sink.status(), Some(500));
        assert!(sink.is_closed());

        let sink = send("/teapot");
        assert_eq!(sink.status(), Some(418));
        assert_eq!(sink.body_string(), "short and stout");
    }

    #[test]
    fn failure_stops_the_walk() {
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();
        let mut app = App::new();
        app.middleware(|_| Err(Error::Forbidden("nope".into()))).unwrap();
        app.get("/", move |_| {
            *flag.lock().unwrap() = true;
            Ok(true)
        })
        .unwrap();

        let sink = run(app, get("/"));
        assert_eq!(sink.status(), Some(403));
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn custom_error_handler_is_used() {
        let mut app = App::new();
        app.error_handler(|err, ctx| {
            let _ = ctx.res.set_status(599).send_text(&format!("custom: {}", err));
        });
        app.get("/", |_| Err(Error::BadRequest("bad".into())))
            .unwrap();

        let sink = run(app, get("/"));
        assert_eq!(sink.status(), Some(599));
        assert_eq!(sink.body_string(), "custom: bad request: bad");
    }

    #[test]
    fn path_params_reach_handlers_and_mappers_apply() {
        let mut app = App::new();
        app.param("id", |_, _, raw| {
            raw.parse::<i64>()
                .map(|n| Some(Value::from(n)))
                .map_err(|_| Error::BadRequest(format!("not a number: {}", raw)))
        });
        app.get("/users/:id", |ctx| {
            let id = ctx.req.param("id");
            ctx.json(&json!({ "id": id }))?;
            Ok(true)
        })
        .unwrap();
        let app = Arc::new(app);

        let sink = BufferedSink::new();
        app.handle(get("/users/42"), Response::new(sink.clone()));
        assert_eq!(sink.body_string(), r#"{"id":42}"#);

        let sink = BufferedSink::new();
        app.handle(get("/users/abc"), Response::new(sink.clone()));
        assert_eq!(sink.status(), Some(400));
    }

    #[test]
    fn middleware_params_are_overwritten_by_later_match() {
        let mut app = App::new();
        app.middleware_at("/files/*", |_| Ok(false)).unwrap();
        app.get("/files/:name", |ctx| {
            let wildcard = ctx.req.param_str("*").unwrap_or_default();
            let name = ctx.req.param_str("name").unwrap_or_default();
            ctx.res.send_text(&format!("{}|{}", wildcard, name))?;
            Ok(true)
        })
        .unwrap();

        assert_eq!(run(app, get("/files/a.txt")).body_string(), "a.txt|a.txt");
    }

    #[test]
    fn resumed_dispatch_skips_earlier_routes() {
        let mut app = App::new();
        app.get("/", |ctx| {
            ctx.res.send_text("first")?;
            Ok(true)
        })
        .unwrap();
        app.get("/", |ctx| {
            ctx.res.send_text("second")?;
            Ok(true)
        })
        .unwrap();
        let app = Arc::new(app);

        let sink = BufferedSink::new();
        let mut ctx = RouteContext::new(app.clone(), get("/"), Response::new(sink.clone()));
        app.dispatch_from(&mut ctx, 1);
        assert_eq!(sink.body_string(), "second");
        assert_eq!(ctx.req.route_index(), Some(1));
    }

    #[test]
    fn settings_round_trip() {
        let mut app = App::new();
        assert_eq!(app.setting_str(VIEWS_SETTING), Some("views/"));
        assert!(!app.enabled(JSONP_SETTING));
        app.enable(JSONP_SETTING);
        assert!(app.enabled(JSONP_SETTING));
        app.disable(JSONP_SETTING);
        assert!(!app.enabled(JSONP_SETTING));
        app.set("title", "demo");
        assert_eq!(app.setting("title"), Some(&json!("demo")));
    }

    #[test]
    fn render_view_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new();
        app.set(VIEWS_SETTING, dir.path().to_string_lossy().into_owned());

        assert!(matches!(
            app.render_view("index", &Map::new()),
            Err(Error::NoEngine(_))
        ));

        app.set(VIEW_ENGINE_SETTING, "html");
        assert!(matches!(
            app.render_view("index", &Map::new()),
            Err(Error::NoEngine(ext)) if ext == "html"
        ));

        app.engine("html", crate::view::PlaceholderEngine::new());
        assert!(matches!(
            app.render_view("index", &Map::new()),
            Err(Error::ViewNotFound(_))
        ));
    }
}
