//! End-to-end tests through the axum transport.

use expressway::config::ServerConfig;
use expressway::http::X_REQUEST_ID;
use expressway::middleware::{body_parser, cookie_parser, session, static_files, MemoryStore};
use expressway::{App, Error};
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

fn demo_app() -> App {
    let mut app = App::new();
    app.middleware(body_parser())
        .unwrap()
        .get("/users/:id", |ctx| {
            let id = ctx.req.param_str("id").unwrap_or_default();
            ctx.json(&json!({ "id": id }))?;
            Ok(true)
        })
        .unwrap()
        .post("/echo", |ctx| {
            let body = ctx.req.body().map(|b| b.as_native()).unwrap_or(Value::Null);
            ctx.json(&body)?;
            Ok(true)
        })
        .unwrap()
        .get("/teapot", |_| Err(Error::status(418, "short and stout")))
        .unwrap()
        .get("/stream", |ctx| {
            for i in 0..3 {
                ctx.res.write(format!("chunk{};", i).as_bytes())?;
            }
            ctx.res.end()?;
            Ok(true)
        })
        .unwrap();
    app
}

#[tokio::test]
async fn routes_with_parameters() {
    let server = common::spawn(demo_app()).await;
    let client = common::client();

    let res = client.get(server.url("/users/a%20b")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("date"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "id": "a b" }));

    let res = client.get(server.url("/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn parses_bodies() {
    let server = common::spawn(demo_app()).await;
    let client = common::client();

    let res = client
        .post(server.url("/echo"))
        .json(&json!({ "name": "ada", "tags": [1, 2] }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "name": "ada", "tags": [1, 2] }));

    let res = client
        .post(server.url("/echo"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("lang=rust&lang=kotlin&x=1")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "lang": ["rust", "kotlin"], "x": "1" }));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn application_errors_reach_the_client() {
    let server = common::spawn(demo_app()).await;
    let res = common::client().get(server.url("/teapot")).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 418);
    assert_eq!(res.text().await.unwrap(), "short and stout");
    server.stop().await.unwrap();
}

#[tokio::test]
async fn streams_chunked_bodies() {
    let server = common::spawn(demo_app()).await;
    let res = common::client().get(server.url("/stream")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "chunk0;chunk1;chunk2;");
    server.stop().await.unwrap();
}

#[tokio::test]
async fn assigns_and_propagates_request_ids() {
    let server = common::spawn(demo_app()).await;
    let client = common::client();

    let res = client.get(server.url("/users/1")).send().await.unwrap();
    let id = res.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap();
    assert_eq!(id.len(), 36);

    let res = client
        .get(server.url("/users/1"))
        .header(X_REQUEST_ID, "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers().get(X_REQUEST_ID).unwrap(), "trace-me");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let mut config = ServerConfig::default();
    config.limits.max_body_size = 16;
    let server = common::spawn_with(demo_app(), config).await;

    let res = common::client()
        .post(server.url("/echo"))
        .body(vec![b'x'; 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn handler_panic_becomes_server_error() {
    let mut app = App::new();
    app.get("/boom", |_| panic!("handler exploded")).unwrap();
    let server = common::spawn(app).await;

    let res = common::client().get(server.url("/boom")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn sessions_survive_requests() {
    let mut app = App::new();
    app.middleware(cookie_parser())
        .unwrap()
        .middleware(session(MemoryStore::new()))
        .unwrap()
        .get("/count", |ctx| {
            let count = {
                let handle = ctx.req.session()?;
                let mut session = handle.lock().unwrap();
                let count = session.get("count").and_then(Value::as_i64).unwrap_or(0) + 1;
                session.set("count", count);
                count
            };
            ctx.res.send_text(&count.to_string())?;
            Ok(true)
        })
        .unwrap();
    let server = common::spawn(app).await;
    let client = common::client();

    let res = client.get(server.url("/count")).send().await.unwrap();
    let cookie = res.headers().get("set-cookie").unwrap().to_str().unwrap();
    let pair = cookie.split(';').next().unwrap().to_string();
    assert_eq!(res.text().await.unwrap(), "1");

    let res = client
        .get(server.url("/count"))
        .header("Cookie", &pair)
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "2");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn serves_static_files_with_conditional_get() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("site.css"), "h1{}").unwrap();

    let mut app = App::new();
    app.get("/assets/*", static_files(dir.path())).unwrap();
    let server = common::spawn(app).await;
    let client = common::client();

    let res = client.get(server.url("/assets/site.css")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("content-type").unwrap(), "text/css");
    let modified = res.headers().get("last-modified").unwrap().clone();
    assert_eq!(res.text().await.unwrap(), "h1{}");

    let res = client
        .get(server.url("/assets/site.css"))
        .header("If-Modified-Since", modified)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_MODIFIED);

    let res = client.get(server.url("/assets/missing.css")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn stop_ends_the_server() {
    let server = common::spawn(demo_app()).await;
    let addr = server.addr;
    server.stop().await.unwrap();
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
