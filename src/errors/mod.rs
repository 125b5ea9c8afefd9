//! Centralized error handling for the EPG aggregator
//!
//! Errors are grouped by the layer that raises them:
//!
//! - **Fetch Errors**: HTTP transfer failures, timeouts, decompression and I/O
//!   problems while downloading a remote listing
//! - **Catalog Errors**: query misuse and malformed serialized records
//! - **Schedule Errors**: refresh schedule API misuse
//!
//! # Usage
//!
//! ```rust
//! use skyq_epg::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for fetcher Results
pub type FetchResult<T> = Result<T, FetchError>;

/// Convenience type alias for catalog Results
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Convenience type alias for scheduling Results
pub type ScheduleResult<T> = Result<T, ScheduleError>;
