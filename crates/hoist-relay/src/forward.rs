//! Loopback forwarding.
//!
//! Translates a canonical request into an HTTP/1.1 call against the
//! application on `127.0.0.1:<port>` and reads the full response back.

use std::time::Duration;

use http::{HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::Client;

use hoist_core::{Request, Response};

use crate::error::RelayError;

/// Connection-scoped headers that never cross the relay.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Returns `true` for headers that must not be forwarded.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// HTTP client bound to the loopback interface.
#[derive(Debug, Clone)]
pub(crate) struct Forwarder {
    client: Client,
    timeout: Duration,
}

impl Forwarder {
    pub(crate) fn new(timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::Client(format!("failed to create client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// Sends `request` to the application on `port`.
    pub(crate) async fn forward(&self, port: u16, request: &Request) -> Result<Response, RelayError> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::time::timeout(self.timeout, self.exchange(port, request))
            .await
            .map_err(|_| RelayError::Timeout { timeout_ms })?
    }

    async fn exchange(&self, port: u16, request: &Request) -> Result<Response, RelayError> {
        let url = format!("http://127.0.0.1:{port}{}", request.path_and_query());
        let mut builder = self.client.request(request.method().clone(), url);

        for (name, value) in request.headers().iter() {
            if is_hop_by_hop(name) {
                continue;
            }
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                tracing::debug!(header = name, "dropping header that is not valid HTTP");
                continue;
            };
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let upstream = builder
            .send()
            .await
            .map_err(|e| RelayError::from_transport(&e))?;

        let mut response = Response::new(upstream.status());
        for (name, value) in upstream.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            response
                .headers
                .append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }

        response.body = upstream
            .bytes()
            .await
            .map_err(|e| RelayError::from_transport(&e))?;
        Ok(response)
    }
}
