//! Robots.txt handling: policy parsing and a per-host TTL cache with
//! single-flight fetching.

mod cache;
mod parser;

pub use cache::{CachedPolicy, RobotsCache};
pub use parser::RobotsPolicy;
