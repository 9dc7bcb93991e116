//! # Hoist Runtime
//!
//! Turns serverless invocation events into HTTP requests for a web
//! application and turns its responses back into invocation results.
//!
//! - [`adapter`] decodes events into canonical requests and encodes
//!   responses
//! - [`Runtime`] runs each request through the rule pipeline and the
//!   configured [`Handler`], then applies [`ErrorPages`]
//! - [`runtime_api`] polls the platform for invocations
//! - [`logging`] installs the structured log subscriber
//!
//! # Example
//!
//! ```no_run
//! use hoist_config::{Config, ProjectType};
//! use hoist_runtime::Runtime;
//!
//! # async fn example() -> Result<(), hoist_core::HoistError> {
//! let config = Config {
//!     project_type: ProjectType::Static,
//!     ..Config::default()
//! };
//! let runtime = Runtime::new(config)?;
//!
//! let result = runtime
//!     .handle(br#"{"httpMethod": "GET", "path": "/"}"#)
//!     .await;
//! println!("{}", String::from_utf8_lossy(&result));
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hoist-runtime/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod adapter;
mod dispatcher;
mod error;
mod error_pages;
pub mod logging;
pub mod runtime_api;

pub use dispatcher::{Handler, Runtime, RuntimeBuilder, REQUEST_ID_RESPONSE_HEADER};
pub use error::{RuntimeError, RuntimeResult};
pub use error_pages::{ErrorPages, DEFAULT_TEMPLATE};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
