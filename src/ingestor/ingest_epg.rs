//! XMLTV refresh cycle: fetch → parse → merge
//!
//! The parse stage only ever reads a file the fetcher has finished and
//! atomically renamed into place, so a cycle never merges a half-written
//! document.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::catalog::ChannelCatalog;
use crate::errors::{AppError, AppResult};
use crate::ingestor::fetcher::RemoteDocumentFetcher;
use crate::ingestor::state_manager::RefreshStateManager;
use crate::models::{
    CycleOutcome, CycleReport, ListingSource, RefreshStep, RefreshTrigger, XmltvChannel,
};
use crate::sources::xmltv::read_channels;

#[derive(Clone)]
pub struct EpgIngestor {
    fetcher: Arc<RemoteDocumentFetcher>,
    catalog: Arc<ChannelCatalog>,
    state_manager: RefreshStateManager,
}

impl EpgIngestor {
    pub fn new(
        fetcher: Arc<RemoteDocumentFetcher>,
        catalog: Arc<ChannelCatalog>,
        state_manager: RefreshStateManager,
    ) -> Self {
        Self {
            fetcher,
            catalog,
            state_manager,
        }
    }

    pub fn state_manager(&self) -> &RefreshStateManager {
        &self.state_manager
    }

    /// Run one guarded cycle for `listing`
    ///
    /// Returns [`CycleOutcome::Skipped`] if a cycle for the same listing is
    /// already running. Errors are recorded in the state manager and logged
    /// with the listing URL before being returned.
    pub async fn refresh_with_trigger(
        &self,
        listing: &ListingSource,
        trigger: RefreshTrigger,
    ) -> AppResult<CycleOutcome> {
        if !self.state_manager.try_start_cycle(listing, trigger).await {
            info!(
                "Skipping {} refresh of {}: previous cycle still running",
                trigger,
                listing.url()
            );
            return Ok(CycleOutcome::Skipped);
        }

        let result = self.run_cycle(listing).await;
        match &result {
            Ok(report) => {
                self.state_manager
                    .finish_cycle(
                        listing,
                        Ok(format!(
                            "Completed - {} channels parsed, {} applied, {} dropped",
                            report.channels_parsed, report.apply.applied, report.apply.dropped
                        )),
                    )
                    .await;
            }
            Err(e) => {
                error!("Refresh of listing {} failed: {}", listing.url(), e);
                self.state_manager
                    .finish_cycle(listing, Err(e.to_string()))
                    .await;
            }
        }

        result.map(CycleOutcome::Completed)
    }

    async fn run_cycle(&self, listing: &ListingSource) -> AppResult<CycleReport> {
        let started_at = Utc::now();

        self.state_manager
            .report_step(listing, RefreshStep::Downloading, "Downloading listing");
        let fetch = self.fetcher.fetch(listing).await?;

        self.state_manager
            .report_step(listing, RefreshStep::Parsing, "Parsing channels");
        let channels = self.parse_listing(listing).await?;
        let channels_parsed = channels.len();

        self.state_manager.report_step(
            listing,
            RefreshStep::Merging,
            format!("Merging {channels_parsed} channels"),
        );
        let apply = self
            .catalog
            .apply_xmltv(channels, listing.icon_base_url())
            .await;

        let report = CycleReport {
            listing_url: listing.url().to_string(),
            fetch,
            channels_parsed,
            apply,
            started_at,
            finished_at: Utc::now(),
        };
        debug!("Cycle report for {}: {:?}", listing.url(), report);
        Ok(report)
    }

    /// Read channel fragments from a completed download
    pub async fn parse_listing(&self, listing: &ListingSource) -> AppResult<Vec<XmltvChannel>> {
        if !listing.is_downloaded().await {
            return Err(AppError::validation(format!(
                "Listing {} has not been downloaded",
                listing.url()
            )));
        }
        read_channels(listing.local_path().to_path_buf()).await
    }
}
