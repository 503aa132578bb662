//! Policy evaluation engine for the Warden governance layer.
//!
//! Renders allow/warn/deny decisions for proposed tool calls from an
//! ordered rule list, with glob/regex target matching, temporal windows,
//! and durable sliding-window rate limits.

pub mod classifier;
pub mod engine;
pub mod matcher;
pub mod presets;
pub mod rate_limit;

pub use classifier::{Classification, Classifier};
pub use engine::PolicyEngine;
pub use rate_limit::{RateCheck, RateLimiter};
