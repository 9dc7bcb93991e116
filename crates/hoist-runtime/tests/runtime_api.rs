//! The invocation loop against an in-process fake of the runtime API.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use hoist_config::{Config, ProjectType};
use hoist_runtime::runtime_api::{self, RuntimeApiClient, AWS_REQUEST_ID_HEADER};
use hoist_runtime::Runtime;

/// A request the fake API received.
#[derive(Debug)]
struct Posted {
    path: String,
    body: Bytes,
}

struct FakeApi {
    events: Mutex<VecDeque<(String, Vec<u8>)>>,
    posted: mpsc::UnboundedSender<Posted>,
}

async fn serve(
    api: Arc<FakeApi>,
    request: hyper::Request<Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let path = request.uri().path().to_string();

    if request.method() == Method::GET && path.ends_with("/invocation/next") {
        let next = api.events.lock().unwrap().pop_front();
        let Some((id, event)) = next else {
            // Nothing queued: hold the long poll open.
            return std::future::pending().await;
        };
        return Ok(hyper::Response::builder()
            .header(AWS_REQUEST_ID_HEADER, id)
            .body(Full::new(Bytes::from(event)))
            .unwrap());
    }

    let body = request.into_body().collect().await.unwrap().to_bytes();
    api.posted.send(Posted { path, body }).unwrap();
    Ok(hyper::Response::builder()
        .status(StatusCode::ACCEPTED)
        .body(Full::new(Bytes::new()))
        .unwrap())
}

async fn start(events: Vec<(&str, Value)>) -> (SocketAddr, mpsc::UnboundedReceiver<Posted>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let api = Arc::new(FakeApi {
        events: Mutex::new(
            events
                .into_iter()
                .map(|(id, event)| (id.to_string(), serde_json::to_vec(&event).unwrap()))
                .collect(),
        ),
        posted: tx,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let api = api.clone();
            tokio::spawn(async move {
                let service = service_fn(move |request| serve(api.clone(), request));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    (addr, rx)
}

fn static_runtime() -> Runtime {
    Runtime::new(Config {
        project_type: ProjectType::Static,
        static_files: hoist_config::StaticSettings {
            dir: "/nonexistent/hoist/root".into(),
            ..Default::default()
        },
        ..Config::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_loop_posts_each_result_until_shutdown() {
    let (addr, mut posted) = start(vec![
        ("aws-1", json!({"httpMethod": "GET", "path": "/a"})),
        ("aws-2", json!({"path": "/no-method"})),
    ])
    .await;
    let client = RuntimeApiClient::new(&addr.to_string()).unwrap();
    let runtime = static_runtime();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let collect = async move {
        let first = posted.recv().await.unwrap();
        let second = posted.recv().await.unwrap();
        stop_tx.send(()).unwrap();
        (first, second)
    };
    let shutdown = async move {
        let _ = stop_rx.await;
    };

    let (outcome, (first, second)) =
        tokio::join!(runtime_api::run(&client, &runtime, shutdown), collect);
    outcome.unwrap();

    assert_eq!(first.path, "/2018-06-01/runtime/invocation/aws-1/response");
    let first: Value = serde_json::from_slice(&first.body).unwrap();
    assert_eq!(first["statusCode"], 404);

    assert_eq!(second.path, "/2018-06-01/runtime/invocation/aws-2/response");
    let second: Value = serde_json::from_slice(&second.body).unwrap();
    assert_eq!(second["statusCode"], 400);
}

#[tokio::test]
async fn test_init_error_report() {
    let (addr, mut posted) = start(Vec::new()).await;
    let client = RuntimeApiClient::new(&addr.to_string()).unwrap();

    client
        .send_init_error("Runtime.InitError", "proxy.command is required")
        .await
        .unwrap();

    let report = posted.recv().await.unwrap();
    assert_eq!(report.path, "/2018-06-01/runtime/init/error");
    let body: Value = serde_json::from_slice(&report.body).unwrap();
    assert_eq!(body["errorType"], "Runtime.InitError");
    assert_eq!(body["errorMessage"], "proxy.command is required");
}

#[tokio::test]
async fn test_unreachable_api_ends_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = RuntimeApiClient::new(&addr.to_string()).unwrap();
    let runtime = static_runtime();
    let result = runtime_api::run(&client, &runtime, std::future::pending()).await;
    assert!(result.is_err());
}
