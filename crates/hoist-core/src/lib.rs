//! # Hoist Core
//!
//! Core types shared by every Hoist crate.
//!
//! This crate provides the canonical, platform-independent representation of
//! an HTTP exchange used by the relay and the rules pipeline:
//!
//! - [`Request`] - Immutable canonical request decoded from an invocation event
//! - [`Response`] - Canonical response that pipeline stages transform
//! - [`Headers`] - Ordered, case-insensitive header multimap
//! - [`QueryParams`] - Ordered query parameter multimap
//! - [`RequestId`] - Correlation identifier for an invocation
//! - [`HoistError`] - Error taxonomy with HTTP status mapping
//!
//! # Example
//!
//! ```
//! use hoist_core::{Request, Response};
//! use http::{Method, StatusCode};
//!
//! let request = Request::builder(Method::GET, "/api/users")
//!     .header("Accept", "application/json")
//!     .query("page", "2")
//!     .build();
//!
//! assert_eq!(request.headers().get("accept"), Some("application/json"));
//!
//! let response = Response::new(StatusCode::OK).with_body("hello");
//! assert_eq!(response.body.as_ref(), b"hello");
//! ```

#![doc(html_root_url = "https://docs.rs/hoist-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
pub mod message;

pub use context::{RequestId, SourceContext};
pub use error::{ErrorResponse, HoistError, HoistResult, TIMEOUT_HEADER};
pub use message::{base_content_type, Headers, QueryParams, Request, RequestBuilder, Response};

/// Header carrying the invocation request id on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
