//! # Hoist Rules
//!
//! Declarative rules applied around every dispatched request.
//!
//! ```text
//! Request → CORS preflight → Request headers → Handler
//!                                                 ↓
//! Response ← Compression ← CORS ← Inject ← Redirects ← Response headers
//! ```
//!
//! Rules are declared in the configuration, compiled once into a
//! [`Pipeline`] at cold start, and then evaluated without locks or
//! per-request state. A malformed rule is a [`RuleError`] at build time;
//! evaluation itself never fails.
//!
//! Rule paths are globs (see [`PathPattern`]). All matching header and
//! inject rules apply in declared order; for redirects the first match wins.
//!
//! ## Example
//!
//! ```
//! use hoist_config::{Config, HeaderRuleConfig};
//! use hoist_core::{Request, Response};
//! use hoist_rules::{Flow, Pipeline};
//! use http::{Method, StatusCode};
//!
//! let mut config = Config::default();
//! config.headers.push(HeaderRuleConfig {
//!     pattern: "/api/*".to_string(),
//!     request: Default::default(),
//!     response: [("X-Test".to_string(), "1".to_string())].into_iter().collect(),
//!     remove: Vec::new(),
//! });
//!
//! let pipeline = Pipeline::from_config(&config).unwrap();
//! let request = Request::builder(Method::GET, "/api/users").build();
//!
//! let Flow::Continue(request) = pipeline.run_request(request) else { unreachable!() };
//! let response = pipeline.run_response(&request, Response::new(StatusCode::OK));
//! assert_eq!(response.header("x-test"), Some("1"));
//! ```

#![doc(html_root_url = "https://docs.rs/hoist-rules/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod pattern;
pub mod pipeline;
pub mod stages;

pub use error::RuleError;
pub use pattern::{Captures, PathPattern};
pub use pipeline::{
    BoxedRequestStage, BoxedResponseStage, Flow, Pipeline, PipelineBuilder, RequestStage,
    ResponseStage,
};
