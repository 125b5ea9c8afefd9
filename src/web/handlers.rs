//! HTTP request handlers
//!
//! Handlers stay thin: they extract parameters, call the catalog or the
//! refresh coordinator, and hand the result to [`handle_result`].

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::responses::{created, handle_error, handle_result, ok};
use super::AppState;
use crate::catalog::SearchOptions;
use crate::errors::AppResult;
use crate::models::{AttrValue, ChannelRecord, CycleOutcome, CycleReport, ListingSource};
use crate::utils::cron_helper::{next_run, parse_schedule};

/// JSON view of a catalog record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelView {
    pub sid: Option<String>,
    pub number: Option<String>,
    pub title: Option<String>,
    pub quality: Option<String>,
    pub xmltv_id: Option<String>,
    pub icon_url: Option<String>,
    pub timeshifted: bool,
    /// Which feeds contributed to this record
    pub sources: String,
    pub attributes: BTreeMap<String, Value>,
}

impl From<&ChannelRecord> for ChannelView {
    fn from(record: &ChannelRecord) -> Self {
        let attributes = record
            .attributes()
            .iter()
            .map(|(name, value)| (name.clone(), attr_to_json(value)))
            .collect();

        Self {
            sid: record.sid().map(str::to_string),
            number: record.number().map(str::to_string),
            title: record.title().map(str::to_string),
            quality: record.quality().map(str::to_string),
            xmltv_id: record.xmltv_id().map(str::to_string),
            icon_url: record.xmltv_icon_url().map(|u| u.to_string()),
            timeshifted: record.is_timeshifted(),
            sources: record.sources().to_string(),
            attributes,
        }
    }
}

fn attr_to_json(value: &AttrValue) -> Value {
    match value {
        AttrValue::Null => Value::Null,
        AttrValue::Text(s) => Value::String(s.clone()),
        AttrValue::Integer(i) => Value::from(*i),
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Url(u) => Value::String(u.to_string()),
    }
}

fn views(records: &[Arc<ChannelRecord>]) -> Vec<ChannelView> {
    records.iter().map(|r| ChannelView::from(r.as_ref())).collect()
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub channels: usize,
    pub schedules: usize,
    pub dropped_fragments: u64,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Response {
    ok(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        channels: state.catalog.len().await,
        schedules: state.coordinator.list_schedules().await.len(),
        dropped_fragments: state.catalog.dropped_fragment_count(),
    })
}

/// GET /api/v1/channels/{sid}
pub async fn get_channel(State(state): State<AppState>, Path(sid): Path<String>) -> Response {
    let result = state
        .catalog
        .find_by_identifier(&sid)
        .await
        .map(|record| ChannelView::from(record.as_ref()))
        .map_err(Into::into);
    handle_result::<ChannelView>(result)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSearchQuery {
    pub name: String,
    #[serde(default)]
    pub fuzzy: bool,
    pub timeshifted: Option<bool>,
    pub quality: Option<String>,
    pub limit: Option<usize>,
}

impl ChannelSearchQuery {
    fn options(&self) -> SearchOptions {
        let defaults = SearchOptions::default();
        SearchOptions {
            fuzzy_match: self.fuzzy,
            include_timeshifted: self.timeshifted.unwrap_or(defaults.include_timeshifted),
            quality: self.quality.clone().filter(|q| !q.is_empty()),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

/// GET /api/v1/channels?name=...
pub async fn search_channels(
    State(state): State<AppState>,
    Query(query): Query<ChannelSearchQuery>,
) -> Response {
    let result = state
        .catalog
        .search(&query.name, &query.options())
        .await
        .map(|records| views(&records))
        .map_err(Into::into);
    handle_result::<Vec<ChannelView>>(result)
}

/// GET /api/v1/schedules
pub async fn list_schedules(State(state): State<AppState>) -> Response {
    ok(state.coordinator.list_schedules().await)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduleRequest {
    pub url: String,
    pub cron: Option<String>,
    #[serde(default)]
    pub run_now: bool,
    pub icon_base_url: Option<String>,
}

/// POST /api/v1/schedules
pub async fn create_schedule(
    State(state): State<AppState>,
    Json(request): Json<CreateScheduleRequest>,
) -> Response {
    let cron = request
        .cron
        .clone()
        .unwrap_or_else(|| state.default_cron.clone());

    let result: AppResult<_> = async {
        let mut listing = ListingSource::new(&request.url, state.listing_dir.clone())?;
        if let Some(base) = request.icon_base_url.as_deref() {
            listing = listing.with_icon_base_url(base)?;
        }
        let url = listing.url().to_string();
        state
            .coordinator
            .add_schedule(Arc::new(listing), &cron, request.run_now)
            .await?;
        Ok(url)
    }
    .await;

    match result {
        Ok(url) => {
            info!("Schedule created via API: {} ({})", url, cron);
            let next_run_at = parse_schedule(&cron)
                .ok()
                .and_then(|s| next_run(&s, &chrono::Utc::now()));
            created(serde_json::json!({
                "listing_url": url,
                "cron_spec": cron,
                "next_run_at": next_run_at,
            }))
        }
        Err(e) => handle_error(e),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingQuery {
    pub url: String,
}

/// DELETE /api/v1/schedules?url=...
pub async fn delete_schedule(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Response {
    let result: AppResult<String> = async {
        let listing = ListingSource::new(&query.url, state.listing_dir.clone())?;
        state.coordinator.remove_schedule(&listing).await?;
        Ok(listing.url().to_string())
    }
    .await;

    match result {
        Ok(url) => {
            info!("Schedule removed via API: {}", url);
            ok(serde_json::json!({ "listing_url": url, "removed": true }))
        }
        Err(e) => handle_error(e),
    }
}

/// Body of a manual refresh response
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RefreshResponse {
    Completed { report: CycleReport },
    Skipped,
}

impl From<CycleOutcome> for RefreshResponse {
    fn from(outcome: CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Completed(report) => Self::Completed { report },
            CycleOutcome::Skipped => Self::Skipped,
        }
    }
}

/// POST /api/v1/schedules/refresh?url=...
///
/// Runs one cycle inline and answers once it has finished.
pub async fn refresh_schedule(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Response {
    let result: AppResult<RefreshResponse> = async {
        let listing = ListingSource::new(&query.url, state.listing_dir.clone())?;
        let outcome = state.coordinator.trigger_now(&listing).await?;
        Ok(outcome.into())
    }
    .await;
    handle_result(result)
}
