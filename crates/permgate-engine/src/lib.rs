//! permgate Engine Library
//!
//! Arbitrates permission requests raised by a wallet runtime:
//! - Per-kind review queues with focus borrowing
//! - Group gate that defers narrow requests during a grouped negotiation
//! - Coverage-based release of deferred requests
//! - Cooldown suppression of repeated group prompts
//! - NDJSON scenario replay for driving the engine without a UI

pub mod arbiter;
pub mod replay;
pub mod testing;
