//! HTTP middleware

mod metrics;
mod rate_limit;

pub use metrics::track_metrics;
pub use rate_limit::{create_rate_limiter, rate_limit_middleware};
