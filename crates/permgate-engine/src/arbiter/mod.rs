//! Permission request arbitration.
//!
//! Owns the typed queues, deferral buffer, group gate and cooldown map, and
//! routes runtime callbacks and UI decisions through them.

mod deferral;
mod engine;
mod focus;
mod gate;
mod host;
mod queue;
mod types;

pub use deferral::DeferralBuffer;
pub use engine::Arbiter;
pub use gate::{GateStatus, GroupGate};
pub use host::{FocusHost, HostError, WalletRuntime};
pub use queue::{Drained, Opened, TypedQueue};
pub use types::{Admission, ArbiterError, ArbiterEvent, GrantOptions, QueueSnapshot};
