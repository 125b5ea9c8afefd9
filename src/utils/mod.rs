//! Utility modules for the EPG aggregator
//!
//! Small, dependency-light helpers shared by the fetcher, the catalog and the
//! refresh coordinator.

pub mod channel_similarity;
pub mod cron_helper;
pub mod decompression;
pub mod http;
pub mod url;

pub use channel_similarity::token_set_ratio;
pub use cron_helper::{next_run, normalize_cron_expression, parse_schedule};
pub use decompression::StreamingDecoder;
