//! Client for the platform runtime API.
//!
//! The runtime long-polls `invocation/next`, hands the event to the
//! [`Runtime`], and posts the result to `invocation/{id}/response`.
//! Failures during cold start are reported to `init/error`.

use std::future::Future;

use bytes::Bytes;
use reqwest::StatusCode;

use crate::dispatcher::Runtime;
use crate::error::{RuntimeError, RuntimeResult};

/// Environment variable holding the runtime API `host:port`.
pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

/// Runtime API version segment.
pub const API_VERSION: &str = "2018-06-01";

/// Header carrying the platform request id of an invocation.
pub const AWS_REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";

/// Header naming the error type on error reports.
pub const ERROR_TYPE_HEADER: &str = "lambda-runtime-function-error-type";

/// One pending invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Platform request id, used to post the result.
    pub request_id: String,
    /// Raw event body.
    pub event: Bytes,
}

/// Runtime API client.
#[derive(Debug, Clone)]
pub struct RuntimeApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl RuntimeApiClient {
    /// Creates a client for `endpoint` (`host:port`).
    pub fn new(endpoint: &str) -> RuntimeResult<Self> {
        // Long polls must not time out.
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            client,
            base_url: format!("http://{endpoint}/{API_VERSION}/runtime"),
        })
    }

    /// Creates a client from [`RUNTIME_API_ENV`].
    pub fn from_env() -> RuntimeResult<Self> {
        let endpoint = std::env::var(RUNTIME_API_ENV)
            .map_err(|_| RuntimeError::MissingEndpoint(RUNTIME_API_ENV))?;
        Self::new(&endpoint)
    }

    /// Waits for the next invocation.
    pub async fn next_invocation(&self) -> RuntimeResult<Invocation> {
        let response = self
            .client
            .get(format!("{}/invocation/next", self.base_url))
            .send()
            .await?;
        check_status("invocation/next", response.status())?;

        let request_id = response
            .headers()
            .get(AWS_REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(RuntimeError::MissingRequestId(AWS_REQUEST_ID_HEADER))?;
        let event = response.bytes().await?;

        Ok(Invocation { request_id, event })
    }

    /// Posts the encoded result of an invocation.
    pub async fn send_response(&self, request_id: &str, body: Vec<u8>) -> RuntimeResult<()> {
        let endpoint = format!("invocation/{request_id}/response");
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        check_status(&endpoint, response.status())
    }

    /// Reports a cold-start failure.
    pub async fn send_init_error(&self, error_type: &str, message: &str) -> RuntimeResult<()> {
        let body = serde_json::json!({
            "errorType": error_type,
            "errorMessage": message,
        });
        let response = self
            .client
            .post(format!("{}/init/error", self.base_url))
            .header(ERROR_TYPE_HEADER, error_type)
            .json(&body)
            .send()
            .await?;
        check_status("init/error", response.status())
    }
}

fn check_status(endpoint: &str, status: StatusCode) -> RuntimeResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(RuntimeError::UnexpectedStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Processes invocations until `shutdown` resolves or the runtime API
/// fails.
///
/// A failed result post is logged and the loop continues; a failed poll
/// ends the loop with the error.
pub async fn run<F>(client: &RuntimeApiClient, runtime: &Runtime, shutdown: F) -> RuntimeResult<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let invocation = tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!("shutdown requested, leaving invocation loop");
                return Ok(());
            }
            next = client.next_invocation() => next?,
        };

        tracing::debug!(aws_request_id = %invocation.request_id, "received invocation");
        let result = runtime.handle(&invocation.event).await;
        if let Err(e) = client.send_response(&invocation.request_id, result).await {
            tracing::error!(
                aws_request_id = %invocation.request_id,
                error = %e,
                "failed to post invocation response"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let client = RuntimeApiClient::new("127.0.0.1:9001").unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:9001/2018-06-01/runtime");
    }

    #[test]
    fn test_check_status() {
        assert!(check_status("invocation/next", StatusCode::OK).is_ok());
        assert!(check_status("init/error", StatusCode::ACCEPTED).is_ok());
        assert!(matches!(
            check_status("invocation/next", StatusCode::INTERNAL_SERVER_ERROR),
            Err(RuntimeError::UnexpectedStatus { status: 500, .. })
        ));
    }
}
