//! Expressway demo server.
//!
//! Serves a small application from a TOML configuration:
//!
//! ```text
//! GET  /                 greeting
//! GET  /hello/:name      JSON greeting
//! POST /echo             echoes the parsed body as JSON
//! GET  /visits           per-session visit counter
//! GET  /static/*         files under ./public
//! *    /pages/*          views rendered by path
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde_json::{json, Value};

use expressway::config::{load_config, ServerConfig};
use expressway::lifecycle::signals::shutdown_on_signal;
use expressway::middleware::{
    body_parser, cookie_parser, logger, method_override, renderer, response_time, session,
    static_files, MemoryStore,
};
use expressway::observability::{logging, metrics};
use expressway::view::PlaceholderEngine;
use expressway::{App, HttpServer};

#[derive(Parser)]
#[command(name = "expressway")]
#[command(about = "Express-style web application server", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for plain HTTP; overrides the configured bind address port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Also serve HTTPS on this port (requires a [tls] section).
    #[arg(long)]
    ssl_port: Option<u16>,

    /// Directory served under /static.
    #[arg(long, default_value = "public")]
    public: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    logging::init(&config.observability)?;

    tracing::info!("expressway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let app = build_app(&config, cli.public)?;
    let server = HttpServer::new(app, config);
    tokio::spawn(shutdown_on_signal(server.shutdown()));

    let port = match cli.port {
        Some(port) => port,
        None => server.config().listener.bind_address.parse::<SocketAddr>()?.port(),
    };
    match cli.ssl_port.or(server.config().tls.as_ref().map(|tls| tls.port)) {
        Some(ssl_port) => server.listen_ssl(port, ssl_port).await?,
        None => server.listen(port).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_app(config: &ServerConfig, public: PathBuf) -> expressway::Result<App> {
    let mut app = App::from_config(config);
    app.engine("html", PlaceholderEngine::new());
    app.locals_mut().insert("site".into(), Value::from("expressway"));

    app.middleware(logger())?
        .middleware(response_time(None))?
        .middleware(cookie_parser())?
        .middleware(session(MemoryStore::new()))?
        .middleware(body_parser())?
        .middleware(method_override(None))?;

    app.get("/", |ctx| {
        ctx.res.send_text("Welcome to expressway")?;
        Ok(true)
    })?
    .get("/hello/:name", |ctx| {
        let name = ctx.req.param_str("name").unwrap_or_default();
        ctx.json(&json!({ "hello": name }))?;
        Ok(true)
    })?
    .post("/echo", |ctx| {
        let body = ctx.req.body().map(|b| b.as_native()).unwrap_or(Value::Null);
        ctx.json(&body)?;
        Ok(true)
    })?
    .get("/visits", |ctx| {
        let visits = {
            let handle = ctx.req.session()?;
            let mut session = handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let visits = session.get("visits").and_then(Value::as_i64).unwrap_or(0) + 1;
            session.set("visits", visits);
            visits
        };
        ctx.json(&json!({ "visits": visits }))?;
        Ok(true)
    })?
    .get("/static/*", static_files(public))?
    .all("/pages/*", renderer())?;

    Ok(app)
}
