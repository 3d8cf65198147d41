//! Shared utilities for timeboxd
//!
//! This crate provides:
//! - ID types (SessionId, ClientId)
//! - Time utilities (monotonic time, duration formatting)
//! - Rate limiting helpers
//! - Default paths for the control socket and data directory

mod ids;
mod paths;
mod rate_limit;
mod time;

pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
