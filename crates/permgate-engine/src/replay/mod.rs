//! NDJSON scenario replay.
//!
//! A scenario is a sequence of runtime arrivals and user actions, one JSON
//! object per line. Replaying it against an [`Arbiter`](crate::arbiter::Arbiter)
//! backed by the in-memory collaborators gives a reproducible trace of queue
//! states and outbound calls.

mod driver;
mod script;

pub use driver::{ReplayReport, ReplaySnapshot, Replayer};
pub use script::{ReplayError, ScriptOp, parse_script, read_script};
