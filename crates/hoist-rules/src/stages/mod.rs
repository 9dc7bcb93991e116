//! Rule stages.
//!
//! - [`cors`] - preflight answers and allow-origin headers (both phases)
//! - [`headers`] - request and response header rules (both phases)
//! - [`redirect`] - first-match redirects (response phase, short-circuits)
//! - [`inject`] - HTML snippet injection (response phase)
//! - [`compression`] - gzip and brotli (response phase)

pub mod compression;
pub mod cors;
pub mod headers;
pub mod inject;
pub mod redirect;

pub use compression::{Algorithm, CompressionStage};
pub use cors::{AllowedOrigins, CorsStage};
pub use headers::HeaderRules;
pub use inject::{InjectPosition, InjectRules};
pub use redirect::RedirectRules;
