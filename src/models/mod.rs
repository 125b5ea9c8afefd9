use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod channel;
pub mod listing;

pub use channel::{
    keys, merge_channels, AttrValue, ChannelRecord, ChannelSources, XmltvChannel,
};
pub use listing::{ListingSource, ListingState};

/// Where a listing is in its refresh lifecycle
///
/// `Failed` is not terminal: the next scheduled tick starts a new cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPhase {
    Idle,
    Scheduled,
    Running,
    Failed,
}

/// Finer grained step reported while a cycle runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStep {
    Downloading,
    Parsing,
    Merging,
    Completed,
    Error,
}

/// Who asked for a refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshTrigger {
    Scheduler,
    Manual,
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshTrigger::Scheduler => write!(f, "scheduler"),
            RefreshTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Progress event broadcast while a listing refreshes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshEvent {
    pub listing_url: String,
    pub phase: RefreshPhase,
    pub step: Option<RefreshStep>,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Per-listing status kept by the state manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub listing_url: String,
    pub phase: RefreshPhase,
    pub triggered_by: Option<RefreshTrigger>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub failure_count: u32,
    pub completed_cycles: u64,
}

/// Result of a single fetch of a remote document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub local_path: std::path::PathBuf,
    pub last_modified: Option<DateTime<Utc>>,
    /// Bytes received over the wire
    pub bytes_received: u64,
    /// Bytes written to the local file after decompression
    pub bytes_written: u64,
    pub requests: u32,
    pub decompressed: bool,
}

/// Outcome of applying XMLTV fragments to the catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmltvApplyReport {
    /// Fragments merged into at least one known channel
    pub applied: usize,
    /// Fragments whose display names matched no known channel
    pub dropped: usize,
}

/// Summary of one completed fetch-and-merge cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub listing_url: String,
    pub fetch: FetchOutcome,
    pub channels_parsed: usize,
    pub apply: XmltvApplyReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// What happened when a cycle was requested
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// A cycle for the same listing was already in flight
    Skipped,
}

/// Introspection view of one registered schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInfo {
    pub listing_url: String,
    pub cron_spec: String,
    pub next_run_at: Option<DateTime<Utc>>,
    pub phase: RefreshPhase,
}

/// Outcome of loading channel data from the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLoadReport {
    pub summaries: usize,
    pub details_loaded: usize,
    pub details_failed: usize,
}
