//! Per-listing refresh state machine
//!
//! Tracks `Idle → Scheduled → Running → (Idle | Failed)` for every listing
//! and broadcasts a [`RefreshEvent`] on each transition. The `Running`
//! phase doubles as the at-most-one-cycle guard: [`try_start_cycle`]
//! refuses to enter it twice.
//!
//! [`try_start_cycle`]: RefreshStateManager::try_start_cycle

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

use crate::models::{
    ListingSource, RefreshEvent, RefreshPhase, RefreshStatus, RefreshStep, RefreshTrigger,
};

pub type RefreshEventSender = broadcast::Sender<RefreshEvent>;
pub type RefreshEventReceiver = broadcast::Receiver<RefreshEvent>;

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct TrackedListing {
    status: RefreshStatus,
    /// Schedule removed while a cycle was running; drop the entry when it ends
    retired: bool,
}

#[derive(Clone)]
pub struct RefreshStateManager {
    states: Arc<RwLock<HashMap<String, TrackedListing>>>,
    events_tx: RefreshEventSender,
}

impl RefreshStateManager {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> RefreshEventReceiver {
        self.events_tx.subscribe()
    }

    /// Register a listing as scheduled
    pub async fn mark_scheduled(&self, listing: &ListingSource) {
        let mut states = self.states.write().await;
        let tracked = states
            .entry(listing.key().to_string())
            .or_insert_with(|| TrackedListing {
                status: blank_status(listing),
                retired: false,
            });
        tracked.retired = false;
        if tracked.status.phase != RefreshPhase::Running {
            tracked.status.phase = RefreshPhase::Scheduled;
        }
        let phase = tracked.status.phase;
        drop(states);

        self.emit(listing, phase, None, "Schedule registered".to_string());
    }

    /// Enter `Running`; returns false if a cycle is already running
    pub async fn try_start_cycle(&self, listing: &ListingSource, trigger: RefreshTrigger) -> bool {
        let mut states = self.states.write().await;
        let tracked = states
            .entry(listing.key().to_string())
            .or_insert_with(|| TrackedListing {
                status: blank_status(listing),
                retired: false,
            });

        if tracked.status.phase == RefreshPhase::Running {
            debug!(
                "Cycle for {} already running; {} trigger skipped",
                listing.url(),
                trigger
            );
            return false;
        }

        tracked.status.phase = RefreshPhase::Running;
        tracked.status.triggered_by = Some(trigger);
        tracked.status.last_started_at = Some(Utc::now());
        drop(states);

        self.emit(
            listing,
            RefreshPhase::Running,
            Some(RefreshStep::Downloading),
            format!("Refresh started ({trigger})"),
        );
        true
    }

    /// Broadcast progress inside a running cycle
    pub fn report_step(&self, listing: &ListingSource, step: RefreshStep, message: impl Into<String>) {
        self.emit(listing, RefreshPhase::Running, Some(step), message.into());
    }

    /// Leave `Running`, landing in `Idle` on success or `Failed` on error
    pub async fn finish_cycle(&self, listing: &ListingSource, result: Result<String, String>) {
        let mut states = self.states.write().await;
        let Some(tracked) = states.get_mut(listing.key()) else {
            return;
        };

        tracked.status.last_finished_at = Some(Utc::now());
        let (phase, step, message) = match result {
            Ok(message) => {
                tracked.status.phase = RefreshPhase::Idle;
                tracked.status.last_error = None;
                tracked.status.completed_cycles += 1;
                (RefreshPhase::Idle, RefreshStep::Completed, message)
            }
            Err(error) => {
                tracked.status.phase = RefreshPhase::Failed;
                tracked.status.failure_count += 1;
                tracked.status.last_error = Some(error.clone());
                (RefreshPhase::Failed, RefreshStep::Error, error)
            }
        };

        if tracked.retired {
            trace!("Dropping state for retired listing {}", listing.url());
            states.remove(listing.key());
        }
        drop(states);

        self.emit(listing, phase, Some(step), message);
    }

    /// Forget a listing whose schedule was removed
    ///
    /// A running cycle keeps its entry until it finishes so the
    /// at-most-one guard still holds for a quick re-add.
    pub async fn forget(&self, listing: &ListingSource) {
        let mut states = self.states.write().await;
        match states.get_mut(listing.key()) {
            Some(tracked) if tracked.status.phase == RefreshPhase::Running => {
                tracked.retired = true;
            }
            Some(_) => {
                states.remove(listing.key());
            }
            None => {}
        }
    }

    pub async fn status(&self, listing: &ListingSource) -> Option<RefreshStatus> {
        let states = self.states.read().await;
        states.get(listing.key()).map(|t| t.status.clone())
    }

    pub async fn phase(&self, listing: &ListingSource) -> RefreshPhase {
        let states = self.states.read().await;
        states
            .get(listing.key())
            .map(|t| t.status.phase)
            .unwrap_or(RefreshPhase::Idle)
    }

    pub async fn all_statuses(&self) -> Vec<RefreshStatus> {
        let states = self.states.read().await;
        states.values().map(|t| t.status.clone()).collect()
    }

    fn emit(
        &self,
        listing: &ListingSource,
        phase: RefreshPhase,
        step: Option<RefreshStep>,
        message: String,
    ) {
        // No subscribers is fine
        let _ = self.events_tx.send(RefreshEvent {
            listing_url: listing.url().to_string(),
            phase,
            step,
            message,
            at: Utc::now(),
        });
    }
}

impl Default for RefreshStateManager {
    fn default() -> Self {
        Self::new()
    }
}

fn blank_status(listing: &ListingSource) -> RefreshStatus {
    RefreshStatus {
        listing_url: listing.url().to_string(),
        phase: RefreshPhase::Idle,
        triggered_by: None,
        last_started_at: None,
        last_finished_at: None,
        last_error: None,
        failure_count: 0,
        completed_cycles: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> ListingSource {
        ListingSource::new("http://example.com/epg.xml", "cache").unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_and_events() {
        let manager = RefreshStateManager::new();
        let mut events = manager.subscribe();
        let listing = listing();

        manager.mark_scheduled(&listing).await;
        assert_eq!(manager.phase(&listing).await, RefreshPhase::Scheduled);

        assert!(manager.try_start_cycle(&listing, RefreshTrigger::Manual).await);
        assert!(!manager.try_start_cycle(&listing, RefreshTrigger::Scheduler).await);

        manager
            .finish_cycle(&listing, Err("peer timed out".to_string()))
            .await;
        let status = manager.status(&listing).await.unwrap();
        assert_eq!(status.phase, RefreshPhase::Failed);
        assert_eq!(status.failure_count, 1);

        // Failed is not terminal
        assert!(manager.try_start_cycle(&listing, RefreshTrigger::Scheduler).await);
        manager.finish_cycle(&listing, Ok("done".to_string())).await;
        let status = manager.status(&listing).await.unwrap();
        assert_eq!(status.phase, RefreshPhase::Idle);
        assert_eq!(status.completed_cycles, 1);
        assert_eq!(status.last_error, None);

        let first = events.recv().await.unwrap();
        assert_eq!(first.phase, RefreshPhase::Scheduled);
        assert_eq!(first.listing_url, "http://example.com/epg.xml");
    }

    #[tokio::test]
    async fn test_forget_waits_for_running_cycle() {
        let manager = RefreshStateManager::new();
        let listing = listing();

        assert!(manager.try_start_cycle(&listing, RefreshTrigger::Manual).await);
        manager.forget(&listing).await;
        assert_eq!(manager.phase(&listing).await, RefreshPhase::Running);

        manager.finish_cycle(&listing, Ok("done".to_string())).await;
        assert!(manager.status(&listing).await.is_none());
    }
}
