//! Listing ingestion: fetching, parsing, scheduling
//!
//! - [`fetcher`]: resumable, decompressing download of remote documents
//! - [`ingest_epg`]: one XMLTV refresh cycle (fetch → parse → merge)
//! - [`ingest_device`]: one-shot channel load from the box's REST API
//! - [`scheduler`]: cron-driven [`RefreshCoordinator`]
//! - [`state_manager`]: per-listing refresh phase tracking and events
//! - [`executor`]: the owned task tracker everything background runs on

pub mod executor;
pub mod fetcher;
pub mod ingest_device;
pub mod ingest_epg;
pub mod scheduler;
pub mod state_manager;

pub use executor::BackgroundExecutor;
pub use fetcher::{FetchOptions, RemoteDocumentFetcher};
pub use ingest_device::DeviceIngestor;
pub use ingest_epg::EpgIngestor;
pub use scheduler::RefreshCoordinator;
pub use state_manager::{RefreshEventReceiver, RefreshStateManager};
