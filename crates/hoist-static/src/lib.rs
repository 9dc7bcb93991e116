//! # Hoist Static
//!
//! Static file resolver used when the project type is `static`.
//!
//! - [`Resolver`] maps request paths onto files under a document root, with
//!   index documents, an optional SPA fallback and conditional GET
//! - [`TextTypes`] decides which content types travel as text; everything
//!   else is flagged binary
//!
//! # Example
//!
//! ```no_run
//! use hoist_core::Request;
//! use hoist_static::Resolver;
//! use http::Method;
//!
//! let resolver = Resolver::new("./public").spa_fallback("index.html");
//! let response = resolver.resolve(&Request::builder(Method::GET, "/").build());
//! println!("{}", response.status);
//! ```

#![doc(html_root_url = "https://docs.rs/hoist-static/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod mime;
mod resolver;

pub use error::StaticFileError;
pub use mime::{content_type_for_extension, TextTypes, DEFAULT_TEXT_TYPES};
pub use resolver::Resolver;
