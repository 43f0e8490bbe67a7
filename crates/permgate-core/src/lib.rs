//! `permgate` Core Library
//!
//! Shared functionality for the permission arbitration engine:
//! - Request model for the six wallet permission request kinds
//! - Group decision normalization and coverage matching
//! - Cooldown keys and suppression tracking
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod config;
pub mod cooldown;
pub mod decision;
pub mod error;
pub mod request;
pub mod tracing_init;

pub use config::{ArbiterSettings, Config};
pub use cooldown::{CooldownTracker, cooldown_key, normalize_originator};
pub use decision::{GroupDecision, ProtocolAllowance, build_decision, is_covered};
pub use error::{Error, Result};
pub use request::{GroupedPermissions, Request, RequestKind};
