//! Per-invocation request handling.
//!
//! One [`Runtime`] is built per warm instance and shared by every
//! invocation. For each event it:
//!
//! 1. decodes the event (a malformed event is answered with 400 and nothing
//!    else runs)
//! 2. runs the request phase of the rule pipeline, which may answer early
//! 3. dispatches to the application process or the static resolver
//! 4. runs the response phase
//! 5. substitutes an error page for 4xx and 5xx responses
//! 6. sets `X-Request-Id` (except on request-phase answers, which carry
//!    only what their stage set) and encodes the result
//!
//! [`Runtime::handle`] never fails.

use std::time::Instant;

use metrics::{counter, histogram};
use tracing::Instrument;

use hoist_config::{Config, ProjectType};
use hoist_core::{HoistError, Request, RequestId, Response};
use hoist_relay::Relay;
use hoist_rules::{Flow, Pipeline};
use hoist_static::{Resolver, TextTypes};

use crate::adapter;
use crate::error_pages::ErrorPages;

/// Response header carrying the invocation request id.
pub const REQUEST_ID_RESPONSE_HEADER: &str = "X-Request-Id";

/// Where requests go after the request phase.
#[derive(Debug, Clone)]
pub enum Handler {
    /// Forward to the supervised application process.
    Server(Relay),
    /// Serve files from the document root.
    Static(Resolver),
}

impl Handler {
    /// Project type this handler serves.
    pub fn project_type(&self) -> ProjectType {
        match self {
            Self::Server(_) => ProjectType::Server,
            Self::Static(_) => ProjectType::Static,
        }
    }
}

/// Builder for [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    config: Config,
    stage: Option<String>,
    commit: Option<String>,
}

impl RuntimeBuilder {
    /// Stage exported to the application process.
    #[must_use]
    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Commit exported to the application process.
    #[must_use]
    pub fn commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Builds the runtime. Rules are compiled here; a malformed rule fails
    /// the build.
    pub fn build(self) -> Result<Runtime, HoistError> {
        let config = self.config;
        let handler = match config.project_type {
            ProjectType::Server => {
                let mut relay = Relay::builder(config.proxy.clone())
                    .envs(config.environment.clone());
                if let Some(stage) = self.stage {
                    relay = relay.stage(stage);
                }
                if let Some(commit) = self.commit {
                    relay = relay.commit(commit);
                }
                Handler::Server(relay.build()?)
            }
            ProjectType::Static => Handler::Static(Resolver::from_config(&config.static_files)),
        };
        Runtime::with_handler(&config, handler)
    }
}

/// The invocation handler for one warm instance.
#[derive(Debug)]
pub struct Runtime {
    name: String,
    handler: Handler,
    pipeline: Pipeline,
    error_pages: ErrorPages,
    text_types: TextTypes,
}

impl Runtime {
    /// Starts building a runtime from `config`.
    pub fn builder(config: Config) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            stage: None,
            commit: None,
        }
    }

    /// Builds a runtime with the handler selected by `config.project_type`.
    pub fn new(config: Config) -> Result<Self, HoistError> {
        Self::builder(config).build()
    }

    /// Builds a runtime around an existing handler.
    pub fn with_handler(config: &Config, handler: Handler) -> Result<Self, HoistError> {
        let pipeline = Pipeline::from_config(config)?;
        tracing::info!(
            name = %config.name,
            project_type = %handler.project_type(),
            stages = pipeline.stage_count(),
            "runtime ready"
        );

        Ok(Self {
            name: config.name.clone(),
            handler,
            pipeline,
            error_pages: ErrorPages::from_config(&config.error_pages),
            text_types: TextTypes::new(&config.static_files.text_types),
        })
    }

    /// Project name from the configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The request handler.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Handles one invocation event and returns the encoded result.
    pub async fn handle(&self, event: &[u8]) -> Vec<u8> {
        let start = Instant::now();

        let response = match adapter::decode(event) {
            Ok(request) => {
                let span = tracing::info_span!(
                    "invocation",
                    request_id = %request.request_id(),
                    method = %request.method(),
                    path = %request.path(),
                );
                self.handle_request(request).instrument(span).await
            }
            Err(e) => {
                let request_id = RequestId::generate();
                tracing::warn!(request_id = %request_id, error = %e, "rejected malformed event");
                e.into_response(&request_id)
                    .with_header(REQUEST_ID_RESPONSE_HEADER, request_id.as_str())
            }
        };

        let elapsed = start.elapsed();
        counter!("hoist_invocations_total", "status" => response.status.as_u16().to_string())
            .increment(1);
        histogram!("hoist_invocation_duration_seconds").record(elapsed.as_secs_f64());

        adapter::encode(&response)
    }

    /// Runs a decoded request through the pipeline, the handler and error
    /// page substitution.
    pub async fn handle_request(&self, request: Request) -> Response {
        let start = Instant::now();
        let request_id = request.request_id().clone();

        let response = match self.pipeline.run_request(request) {
            Flow::Continue(request) => {
                let response = self.dispatch(&request).await;
                let response = self.pipeline.run_response(&request, response);
                let mut response = self.error_pages.apply(response, &request_id);
                response
                    .headers
                    .insert(REQUEST_ID_RESPONSE_HEADER, request_id.as_str());
                response
            }
            Flow::ShortCircuit(response) => {
                tracing::debug!(status = response.status.as_u16(), "answered in request phase");
                self.error_pages.apply(response, &request_id)
            }
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if response.status.is_server_error() {
            tracing::warn!(status = response.status.as_u16(), duration_ms, "invocation failed");
        } else {
            tracing::info!(status = response.status.as_u16(), duration_ms, "invocation complete");
        }
        response
    }

    async fn dispatch(&self, request: &Request) -> Response {
        match &self.handler {
            Handler::Server(relay) => match relay.forward(request).await {
                Ok(mut response) => {
                    response.binary = adapter::is_binary(&response, &self.text_types);
                    response
                }
                Err(e) => {
                    let error = HoistError::from(e);
                    tracing::error!(
                        error = %error,
                        category = error.category(),
                        "relay failed"
                    );
                    error.into_response(request.request_id())
                }
            },
            Handler::Static(resolver) => resolver.resolve(request),
        }
    }

    /// Stops the application process, if any. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Handler::Server(relay) = &self.handler {
            relay.shutdown().await;
        }
    }
}
