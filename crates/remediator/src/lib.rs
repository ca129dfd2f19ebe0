//! Autonomous pod remediation controller core.
//!
//! Watches pod lifecycle events in a namespace, classifies container
//! failures (crash loops, OOM kills, image pull failures), requests a
//! diagnosis from an external analysis service, and conditionally mutates
//! the failing pod: strategic merge patch first, delete-and-recreate with
//! client-side field merge as the fallback.

pub mod classifier;
pub mod config;
pub mod diagnosis;
pub mod diagnostics;
pub mod error;
pub mod inflight;
pub mod pods;
pub mod remediate;
pub mod watch;

pub use config::RemediatorConfig;
pub use error::{Error, Result};
pub use pods::{KubePods, PodIdentity, PodOps};
pub use remediate::Context;
pub use watch::{Dispatcher, WatchSupervisor};
