//! Full invocation round trips through the runtime.

use std::fs;
use std::io::Read;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tempfile::TempDir;

use hoist_config::{Config, ConfigLoader};
use hoist_relay::ProcessState;
use hoist_runtime::{Handler, Runtime};

fn site() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>Home</h1>").unwrap();
    fs::create_dir(dir.path().join("static")).unwrap();
    fs::write(dir.path().join("static/app.js"), "console.log(1)").unwrap();
    fs::write(
        dir.path().join("logo.png"),
        [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
    )
    .unwrap();
    fs::write(
        dir.path().join("page.html"),
        format!("<html><body>{}</body></html>", "<p>hello world</p>".repeat(200)),
    )
    .unwrap();
    dir
}

fn config(dir: &TempDir, extra: &Value) -> Config {
    let mut document = json!({
        "type": "static",
        "static": {"dir": dir.path()},
    });
    if let (Some(target), Some(extra)) = (document.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    ConfigLoader::new()
        .with_string(&document.to_string(), "json")
        .unwrap()
        .load()
        .unwrap()
}

fn runtime(dir: &TempDir, extra: &Value) -> Runtime {
    Runtime::new(config(dir, extra)).unwrap()
}

fn event(method: &str, path: &str, headers: &Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "httpMethod": method,
        "path": path,
        "headers": headers,
        "body": null,
        "isBase64Encoded": false,
        "requestContext": {
            "stage": "production",
            "requestId": "req-1",
            "identity": {"sourceIp": "203.0.113.9"}
        }
    }))
    .unwrap()
}

async fn invoke(runtime: &Runtime, event: &[u8]) -> Value {
    serde_json::from_slice(&runtime.handle(event).await).unwrap()
}

async fn get(runtime: &Runtime, path: &str) -> Value {
    invoke(runtime, &event("GET", path, &json!({}))).await
}

#[tokio::test]
async fn test_static_index() {
    let dir = site();
    let runtime = runtime(&dir, &json!({}));

    let result = get(&runtime, "/").await;
    assert_eq!(result["statusCode"], 200);
    assert_eq!(result["body"], "<h1>Home</h1>");
    assert_eq!(result["isBase64Encoded"], false);
    assert!(result["headers"]["Content-Type"]
        .as_str()
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(result["headers"]["X-Request-Id"], "req-1");
}

#[tokio::test]
async fn test_missing_file_gets_error_page() {
    let dir = site();
    let runtime = runtime(&dir, &json!({}));

    let result = get(&runtime, "/missing").await;
    assert_eq!(result["statusCode"], 404);
    assert_eq!(result["headers"]["Content-Type"], "text/html; charset=utf-8");
    assert!(result["body"].as_str().unwrap().contains("Not Found"));
    assert!(result["body"].as_str().unwrap().contains("req-1"));
}

#[tokio::test]
async fn test_error_page_from_directory() {
    let dir = site();
    let pages = TempDir::new().unwrap();
    fs::write(pages.path().join("4xx.html"), "<p>{{status}} {{status_text}}</p>").unwrap();
    let runtime = runtime(&dir, &json!({"error_pages": {"dir": pages.path()}}));

    let result = get(&runtime, "/missing").await;
    assert_eq!(result["statusCode"], 404);
    assert_eq!(result["body"], "<p>404 Not Found</p>");
}

#[tokio::test]
async fn test_error_pages_disabled() {
    let dir = site();
    let runtime = runtime(&dir, &json!({"error_pages": {"disable": true}}));

    let result = get(&runtime, "/missing").await;
    assert_eq!(result["statusCode"], 404);
    let body: Value = serde_json::from_str(result["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["request_id"], "req-1");
}

#[tokio::test]
async fn test_malformed_event_is_400() {
    let dir = site();
    let runtime = runtime(
        &dir,
        &json!({"headers": [{"pattern": "/**", "response": {"X-Frame-Options": "DENY"}}]}),
    );

    let result = invoke(&runtime, br#"{"path": "/"}"#).await;
    assert_eq!(result["statusCode"], 400);
    assert!(result["headers"]["X-Frame-Options"].is_null());
    assert!(!result["headers"]["X-Request-Id"].as_str().unwrap().is_empty());

    let body: Value = serde_json::from_str(result["body"].as_str().unwrap()).unwrap();
    assert_eq!(body["error"], "decode");

    let garbage = invoke(&runtime, b"{not json").await;
    assert_eq!(garbage["statusCode"], 400);
}

#[tokio::test]
async fn test_redirect() {
    let dir = site();
    let runtime = runtime(
        &dir,
        &json!({"redirects": [{"pattern": "/old/:id", "location": "/new/:id", "status": 301}]}),
    );

    for _ in 0..2 {
        let result = get(&runtime, "/old/42").await;
        assert_eq!(result["statusCode"], 301);
        assert_eq!(result["headers"]["Location"], "/new/42");
        assert_eq!(result["body"], "");
    }
}

#[tokio::test]
async fn test_cors_preflight() {
    let dir = site();
    let runtime = runtime(
        &dir,
        &json!({"cors": {"allowed_origins": ["https://a.com"]}}),
    );

    let result = invoke(
        &runtime,
        &event(
            "OPTIONS",
            "/api/x",
            &json!({"Origin": "https://a.com", "Access-Control-Request-Method": "POST"}),
        ),
    )
    .await;

    assert_eq!(result["statusCode"], 204);
    assert_eq!(
        result["headers"]["Access-Control-Allow-Origin"],
        "https://a.com"
    );
    assert_eq!(result["body"], "");
    assert!(result["headers"]["X-Request-Id"].is_null());
}

#[tokio::test]
async fn test_cors_preflight_skips_application() {
    let config: Config = ConfigLoader::new()
        .with_string(
            r#"{"type": "server", "proxy": {"command": "exit 3"},
                "cors": {"allowed_origins": ["https://a.com"]}}"#,
            "json",
        )
        .unwrap()
        .load()
        .unwrap();
    let runtime = Runtime::new(config).unwrap();

    let result = invoke(
        &runtime,
        &event(
            "OPTIONS",
            "/api/x",
            &json!({"Origin": "https://a.com", "Access-Control-Request-Method": "POST"}),
        ),
    )
    .await;
    assert_eq!(result["statusCode"], 204);
    assert_eq!(
        result["headers"]["Access-Control-Allow-Origin"],
        "https://a.com"
    );

    let Handler::Server(relay) = runtime.handler() else {
        panic!("expected a server handler");
    };
    assert_eq!(relay.launch_count(), 0);
    assert_eq!(relay.state(), ProcessState::Stopped);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_header_rule_scope() {
    let dir = site();
    let runtime = runtime(
        &dir,
        &json!({"headers": [{"pattern": "/api/*", "response": {"X-Test": "1"}}]}),
    );

    let api = get(&runtime, "/api/users").await;
    assert_eq!(api["headers"]["X-Test"], "1");

    let asset = get(&runtime, "/static/app.js").await;
    assert_eq!(asset["statusCode"], 200);
    assert!(asset["headers"]["X-Test"].is_null());
}

#[tokio::test]
async fn test_multi_value_headers() {
    let dir = site();
    let runtime = runtime(
        &dir,
        &json!({"headers": [
            {"pattern": "/**", "response": {"Link": "</a.css>; rel=preload"}},
            {"pattern": "/**", "response": {"Link": "</b.js>; rel=preload"}}
        ]}),
    );

    let result = get(&runtime, "/").await;
    assert_eq!(result["headers"]["Link"], "</b.js>; rel=preload");
    assert_eq!(
        result["multiValueHeaders"]["Link"],
        json!(["</a.css>; rel=preload", "</b.js>; rel=preload"])
    );
}

#[tokio::test]
async fn test_binary_file_is_base64() {
    let dir = site();
    let runtime = runtime(&dir, &json!({}));

    let result = get(&runtime, "/logo.png").await;
    assert_eq!(result["statusCode"], 200);
    assert_eq!(result["isBase64Encoded"], true);
    assert_eq!(
        BASE64_STANDARD
            .decode(result["body"].as_str().unwrap())
            .unwrap(),
        vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]
    );
}

#[tokio::test]
async fn test_inject_then_compress() {
    let dir = site();
    let runtime = runtime(
        &dir,
        &json!({"inject": [{"pattern": "/page.html", "position": "body-end", "value": "<script>x</script>"}]}),
    );

    let plain = get(&runtime, "/page.html").await;
    assert!(plain["body"]
        .as_str()
        .unwrap()
        .ends_with("<script>x</script></body></html>"));

    let compressed = invoke(
        &runtime,
        &event("GET", "/page.html", &json!({"Accept-Encoding": "gzip"})),
    )
    .await;
    assert_eq!(compressed["isBase64Encoded"], true);
    assert_eq!(compressed["headers"]["Content-Encoding"], "gzip");

    let bytes = BASE64_STANDARD
        .decode(compressed["body"].as_str().unwrap())
        .unwrap();
    let mut html = String::new();
    flate2::read::GzDecoder::new(&bytes[..])
        .read_to_string(&mut html)
        .unwrap();
    assert!(html.ends_with("<script>x</script></body></html>"));
}

#[tokio::test]
async fn test_server_startup_failure_is_502_page() {
    let config: Config = ConfigLoader::new()
        .with_string(
            r#"{"type": "server", "proxy": {"command": "exit 3", "startup_timeout": "5s",
                "restarts": {"max_restarts": 0, "window": "60s"}}}"#,
            "json",
        )
        .unwrap()
        .load()
        .unwrap();
    let runtime = Runtime::new(config).unwrap();

    let result = get(&runtime, "/anything").await;
    assert_eq!(result["statusCode"], 502);
    assert_eq!(result["headers"]["Content-Type"], "text/html; charset=utf-8");
    assert!(result["body"].as_str().unwrap().contains("req-1"));

    runtime.shutdown().await;
}
