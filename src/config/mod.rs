//! Configuration: TOML loading, validation and the recognised option set.
//!
//! A minimal config only needs `seeds`; every other option carries the
//! documented default.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    Config, CrawlerConfig, DedupConfig, OutputConfig, PolitenessConfig, RenderMode, ScopeConfig,
    Strategy, UserAgentConfig,
};
pub use validation::validate;
