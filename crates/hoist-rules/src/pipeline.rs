//! Ordered rule pipeline.
//!
//! The pipeline has two phases around dispatch. Request stages run before
//! the handler and may replace the request or answer on its behalf.
//! Response stages run after the handler, each taking the response by value
//! and handing on a possibly new one.
//!
//! ## Stage Order
//!
//! Request phase:
//!
//! 1. **CORS preflight** - answers `OPTIONS` preflights with 204
//! 2. **Header rules** - appends configured request headers
//!
//! Response phase:
//!
//! 1. **Header rules** - removes, then appends configured response headers
//! 2. **Redirects** - first matching rule replaces the response
//! 3. **Inject** - inserts snippets into HTML
//! 4. **CORS** - adds allow-origin and friends
//! 5. **Compression** - gzip or brotli per `Accept-Encoding`
//!
//! A [`Flow::ShortCircuit`] ends its phase: the remaining stages of that
//! phase are skipped. In the request phase it also skips dispatch and the
//! whole response phase.

use std::sync::Arc;

use hoist_config::Config;
use hoist_core::{Request, Response};

use crate::error::RuleError;
use crate::stages::{
    CompressionStage, CorsStage, HeaderRules, InjectRules, RedirectRules,
};

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T> {
    /// Hand the value to the next stage.
    Continue(T),
    /// Stop the phase and answer with this response.
    ShortCircuit(Response),
}

/// A stage that runs before dispatch.
pub trait RequestStage: Send + Sync + 'static {
    /// Stage name, for logs and introspection.
    fn name(&self) -> &'static str;

    /// Inspect or replace the request.
    fn on_request(&self, request: Request) -> Flow<Request>;
}

/// A stage that runs after dispatch.
pub trait ResponseStage: Send + Sync + 'static {
    /// Stage name, for logs and introspection.
    fn name(&self) -> &'static str;

    /// Transform the response. `request` is the request that was dispatched.
    fn on_response(&self, request: &Request, response: Response) -> Flow<Response>;
}

/// A type-erased request stage.
pub type BoxedRequestStage = Arc<dyn RequestStage>;

/// A type-erased response stage.
pub type BoxedResponseStage = Arc<dyn ResponseStage>;

/// The two-phase stage list.
///
/// Built once per warm instance and shared by reference across concurrent
/// invocations; stages hold no per-request state.
#[derive(Clone, Default)]
pub struct Pipeline {
    request_stages: Vec<BoxedRequestStage>,
    response_stages: Vec<BoxedResponseStage>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Creates a pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Builds the standard pipeline from configuration.
    ///
    /// Every rule is checked here; a malformed rule fails the build.
    pub fn from_config(config: &Config) -> Result<Self, RuleError> {
        let headers = Arc::new(HeaderRules::from_config(&config.headers)?);
        let redirects = RedirectRules::from_config(&config.redirects)?;
        let inject = InjectRules::from_config(&config.inject)?;
        let cors = config
            .cors
            .as_ref()
            .map(CorsStage::from_config)
            .map(Arc::new);

        let mut builder = Self::builder();

        if let Some(cors) = &cors {
            builder = builder.request_stage(cors.clone());
        }
        builder = builder
            .request_stage(headers.clone())
            .response_stage(headers)
            .response_stage(Arc::new(redirects))
            .response_stage(Arc::new(inject));
        if let Some(cors) = cors {
            builder = builder.response_stage(cors);
        }
        if config.compression.enable {
            builder = builder.response_stage(Arc::new(CompressionStage::from_config(
                &config.compression,
            )?));
        }

        let pipeline = builder.build();
        tracing::debug!(stages = ?pipeline.stage_names(), "rule pipeline built");
        Ok(pipeline)
    }

    /// Runs the request phase.
    pub fn run_request(&self, mut request: Request) -> Flow<Request> {
        for stage in &self.request_stages {
            match stage.on_request(request) {
                Flow::Continue(next) => request = next,
                Flow::ShortCircuit(response) => {
                    tracing::debug!(stage = stage.name(), "request phase short-circuited");
                    return Flow::ShortCircuit(response);
                }
            }
        }
        Flow::Continue(request)
    }

    /// Runs the response phase and returns the final response.
    pub fn run_response(&self, request: &Request, mut response: Response) -> Response {
        for stage in &self.response_stages {
            match stage.on_response(request, response) {
                Flow::Continue(next) => response = next,
                Flow::ShortCircuit(replacement) => {
                    tracing::debug!(stage = stage.name(), "response phase short-circuited");
                    return replacement;
                }
            }
        }
        response
    }

    /// Names of all stages in execution order, request phase first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.request_stages
            .iter()
            .map(|s| s.name())
            .chain(self.response_stages.iter().map(|s| s.name()))
            .collect()
    }

    /// Total number of stages.
    pub fn stage_count(&self) -> usize {
        self.request_stages.len() + self.response_stages.len()
    }
}

/// Builder for a [`Pipeline`] with a custom stage list.
#[derive(Default)]
pub struct PipelineBuilder {
    request_stages: Vec<BoxedRequestStage>,
    response_stages: Vec<BoxedResponseStage>,
}

impl PipelineBuilder {
    /// Appends a request-phase stage.
    pub fn request_stage(mut self, stage: BoxedRequestStage) -> Self {
        self.request_stages.push(stage);
        self
    }

    /// Appends a response-phase stage.
    pub fn response_stage(mut self, stage: BoxedResponseStage) -> Self {
        self.response_stages.push(stage);
        self
    }

    /// Finishes the pipeline.
    pub fn build(self) -> Pipeline {
        Pipeline {
            request_stages: self.request_stages,
            response_stages: self.response_stages,
        }
    }
}
