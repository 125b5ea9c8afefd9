//! Cron-driven refresh coordinator
//!
//! Each scheduled listing gets a ticker task that sleeps until the next cron
//! slot and then hands a refresh cycle to the [`BackgroundExecutor`]. Cycles
//! run as their own tracked tasks, so removing a schedule only stops future
//! ticks and never aborts a cycle already in flight. The state manager's
//! `Running` guard skips a tick that arrives while the previous cycle for the
//! same listing is still going.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::executor::BackgroundExecutor;
use super::ingest_epg::EpgIngestor;
use super::state_manager::RefreshEventReceiver;
use crate::errors::{AppError, AppResult, ScheduleError};
use crate::models::{CycleOutcome, ListingSource, RefreshTrigger, ScheduleInfo};
use crate::utils::cron_helper::{next_run, parse_schedule};
use crate::utils::url::validate_listing_url;

struct ScheduleEntry {
    listing: Arc<ListingSource>,
    cron_spec: String,
    schedule: Schedule,
    cancel: CancellationToken,
    ticker: JoinHandle<()>,
}

pub struct RefreshCoordinator {
    entries: Mutex<HashMap<String, ScheduleEntry>>,
    ingestor: EpgIngestor,
    executor: BackgroundExecutor,
}

impl RefreshCoordinator {
    pub fn new(ingestor: EpgIngestor, executor: BackgroundExecutor) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ingestor,
            executor,
        }
    }

    /// Progress events for every listing
    pub fn subscribe(&self) -> RefreshEventReceiver {
        self.ingestor.state_manager().subscribe()
    }

    /// Register a recurring refresh for `listing`
    ///
    /// With `run_now` one cycle is started immediately in the background
    /// instead of waiting for the first slot.
    pub async fn add_schedule(
        &self,
        listing: Arc<ListingSource>,
        cron_spec: &str,
        run_now: bool,
    ) -> AppResult<()> {
        let schedule =
            parse_schedule(cron_spec).map_err(|message| ScheduleError::invalid(cron_spec, message))?;

        let mut entries = self.entries.lock().await;
        if entries.contains_key(listing.key()) {
            return Err(ScheduleError::Duplicate {
                url: listing.url().to_string(),
            }
            .into());
        }

        let cancel = self.executor.shutdown_token().child_token();
        let ticker = self
            .executor
            .spawn(run_ticker(
                Arc::clone(&listing),
                schedule.clone(),
                cancel.clone(),
                self.ingestor.clone(),
                self.executor.clone(),
            ))
            .ok_or_else(|| AppError::internal("refresh coordinator is shutting down"))?;

        self.ingestor.state_manager().mark_scheduled(&listing).await;
        info!(
            "Scheduled listing {} with '{}' (next run {})",
            listing.url(),
            cron_spec,
            format_next(next_run(&schedule, &Utc::now()))
        );

        entries.insert(
            listing.key().to_string(),
            ScheduleEntry {
                listing: Arc::clone(&listing),
                cron_spec: cron_spec.trim().to_string(),
                schedule,
                cancel,
                ticker,
            },
        );
        drop(entries);

        if run_now {
            debug!("Running initial refresh of {}", listing.url());
            spawn_cycle(
                &self.executor,
                self.ingestor.clone(),
                listing,
                RefreshTrigger::Scheduler,
            );
        }
        Ok(())
    }

    /// Stop future ticks for `listing`; a cycle already running finishes
    pub async fn remove_schedule(&self, listing: &ListingSource) -> AppResult<()> {
        let entry = self
            .entries
            .lock()
            .await
            .remove(listing.key())
            .ok_or_else(|| ScheduleError::NotFound {
                url: listing.url().to_string(),
            })?;

        entry.cancel.cancel();
        if let Err(e) = entry.ticker.await {
            warn!("Ticker for {} ended abnormally: {}", listing.url(), e);
        }
        self.ingestor.state_manager().forget(listing).await;

        info!("Removed schedule for listing {}", listing.url());
        Ok(())
    }

    /// Registered schedules, ordered by URL
    pub async fn list_schedules(&self) -> Vec<ScheduleInfo> {
        let now = Utc::now();
        let snapshot: Vec<(Arc<ListingSource>, String, Option<DateTime<Utc>>)> = {
            let entries = self.entries.lock().await;
            entries
                .values()
                .map(|e| {
                    (
                        Arc::clone(&e.listing),
                        e.cron_spec.clone(),
                        next_run(&e.schedule, &now),
                    )
                })
                .collect()
        };

        let mut infos = Vec::with_capacity(snapshot.len());
        for (listing, cron_spec, next_run_at) in snapshot {
            infos.push(ScheduleInfo {
                listing_url: listing.url().to_string(),
                cron_spec,
                next_run_at,
                phase: self.ingestor.state_manager().phase(&listing).await,
            });
        }
        infos.sort_by(|a, b| a.listing_url.cmp(&b.listing_url));
        infos
    }

    /// The scheduled listing for `url`, if any
    pub async fn listing_by_url(&self, url: &str) -> Option<Arc<ListingSource>> {
        let key = validate_listing_url(url).ok()?.as_str().to_lowercase();
        let entries = self.entries.lock().await;
        entries.get(&key).map(|e| Arc::clone(&e.listing))
    }

    /// Run one cycle for a scheduled listing now, waiting for it to finish
    pub async fn trigger_now(&self, listing: &ListingSource) -> AppResult<CycleOutcome> {
        let listing = {
            let entries = self.entries.lock().await;
            entries
                .get(listing.key())
                .map(|e| Arc::clone(&e.listing))
                .ok_or_else(|| ScheduleError::NotFound {
                    url: listing.url().to_string(),
                })?
        };
        self.ingestor
            .refresh_with_trigger(&listing, RefreshTrigger::Manual)
            .await
    }

    /// Stop all tickers, then let in-flight cycles drain within `grace`
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let entries: Vec<ScheduleEntry> = self.entries.lock().await.drain().map(|(_, e)| e).collect();
        info!("Stopping {} refresh schedules", entries.len());

        for entry in &entries {
            entry.cancel.cancel();
        }
        for entry in entries {
            if let Err(e) = entry.ticker.await {
                warn!("Ticker for {} ended abnormally: {}", entry.listing.url(), e);
            }
        }

        self.executor.shutdown(grace).await
    }
}

/// Sleep until each cron slot and start a cycle, until cancelled
async fn run_ticker(
    listing: Arc<ListingSource>,
    schedule: Schedule,
    cancel: CancellationToken,
    ingestor: EpgIngestor,
    executor: BackgroundExecutor,
) {
    let mut after = Utc::now();
    loop {
        let Some(slot) = next_run(&schedule, &after) else {
            info!("Schedule for {} has no further fire times", listing.url());
            return;
        };
        let wait = (slot - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Ticker for {} cancelled", listing.url());
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // Slots missed while this task was delayed are skipped, not replayed
        after = slot.max(Utc::now());

        if !spawn_cycle(
            &executor,
            ingestor.clone(),
            Arc::clone(&listing),
            RefreshTrigger::Scheduler,
        ) {
            return;
        }
    }
}

/// Hand a cycle to the executor; false once shutdown has begun
fn spawn_cycle(
    executor: &BackgroundExecutor,
    ingestor: EpgIngestor,
    listing: Arc<ListingSource>,
    trigger: RefreshTrigger,
) -> bool {
    let url = listing.url().to_string();
    if executor.spawn(run_cycle(ingestor, listing, trigger)).is_none() {
        warn!("Not starting {} refresh of {}: shutting down", trigger, url);
        return false;
    }
    true
}

/// One cycle with every error contained at this boundary
async fn run_cycle(ingestor: EpgIngestor, listing: Arc<ListingSource>, trigger: RefreshTrigger) {
    match ingestor.refresh_with_trigger(&listing, trigger).await {
        Ok(CycleOutcome::Completed(report)) => info!(
            "Refreshed {}: {} channels parsed, {} applied, {} dropped",
            listing.url(),
            report.channels_parsed,
            report.apply.applied,
            report.apply.dropped
        ),
        Ok(CycleOutcome::Skipped) => {}
        // Already logged and recorded by the ingestor; the schedule keeps running
        Err(_) => {}
    }
}

fn format_next(next: Option<DateTime<Utc>>) -> String {
    next.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}
