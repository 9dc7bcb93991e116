//! # Hoist Relay
//!
//! Runs the application as a child process on a loopback port and relays
//! canonical requests to it.
//!
//! - [`Relay`] starts the process on first use, probes it for readiness,
//!   forwards requests with a per-request timeout and restarts it after a
//!   crash while the [`RestartBudget`] allows
//! - [`ProcessState`] is the observable lifecycle of the process
//! - [`Relay::shutdown`] drains in-flight requests and terminates the
//!   process group
//!
//! The child gets `PORT`, `HOIST_STAGE`, `HOIST_COMMIT` and the configured
//! environment. Its stdout and stderr are inherited.

#![doc(html_root_url = "https://docs.rs/hoist-relay/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod budget;
mod error;
mod forward;
pub mod probe;
mod state;
mod supervisor;

pub use budget::RestartBudget;
pub use error::RelayError;
pub use forward::{is_hop_by_hop, HOP_BY_HOP_HEADERS};
pub use state::ProcessState;
pub use supervisor::{Relay, RelayBuilder, COMMIT_ENV, PORT_ENV, STAGE_ENV};
