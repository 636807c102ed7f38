//! Settings for hevcify
//!
//! External tool names, the encode target (codec, CRF, output marker and
//! container), the video suffixes a scan accepts and progress tuning. Loaded
//! from TOML, then overridden by `HEVCIFY_*` environment variables.

pub mod config;

pub use config::*;
