//! Echo server used by the relay integration tests.
//!
//! Listens on `$PORT` and answers every request with a JSON description of
//! it. A few paths change behaviour:
//!
//! - `/crash` exits without answering
//! - `/exit-after` answers, then exits shortly after
//! - `/sleep/<ms>` waits before answering
//!
//! `RELAY_ECHO_STARTUP_DELAY_MS` delays the bind.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    if let Some(delay) = std::env::var("RELAY_ECHO_STARTUP_DELAY_MS")
        .ok()
        .and_then(|d| d.parse().ok())
    {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let service = service_fn(handle);
            let _ = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });
    }
}

async fn handle(request: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = request.uri().path().to_string();

    if path == "/crash" {
        std::process::exit(1);
    }
    if let Some(ms) = path.strip_prefix("/sleep/").and_then(|ms| ms.parse().ok()) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    if path == "/exit-after" {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::process::exit(0);
        });
    }

    let method = request.method().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let body = request
        .into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();

    let echo = serde_json::json!({
        "method": method,
        "path": path,
        "query": query,
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
        "pid": std::process::id(),
        "env": {
            "HOIST_STAGE": std::env::var("HOIST_STAGE").ok(),
            "HOIST_COMMIT": std::env::var("HOIST_COMMIT").ok(),
            "GREETING": std::env::var("GREETING").ok(),
        },
    });

    let response = Response::builder()
        .header("Content-Type", "application/json")
        .header("X-Echo", "1")
        .header("X-Echo", "2")
        .body(Full::new(Bytes::from(echo.to_string())))
        .unwrap_or_default();
    Ok(response)
}
