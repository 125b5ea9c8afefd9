//! EPG channel aggregator
//!
//! Builds one channel catalog from a Sky Q box's REST service list and any
//! number of remote XMLTV listings, keeps the listings refreshed on cron
//! schedules, and answers channel lookups over a small JSON API.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod ingestor;
pub mod models;
pub mod sources;
pub mod utils;
pub mod web;
