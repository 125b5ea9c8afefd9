//! In-memory channel catalog
//!
//! The catalog owns the current set of [`ChannelRecord`]s. Records are held
//! behind `Arc` and are never mutated: every upsert or merge builds a new
//! record and swaps the `Arc` in a single write under the catalog lock, so
//! readers always see either the old or the new record, never a mix.
//!
//! Device payloads are keyed by `sid`. XMLTV fragments share no key with the
//! device, so they are correlated by case-insensitive display-name equality
//! and can only augment channels the device already announced.

pub mod snapshot;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::errors::{AppResult, CatalogError, CatalogResult};
use crate::models::{ChannelRecord, XmltvApplyReport, XmltvChannel};
use crate::utils::channel_similarity::token_set_ratio;

pub use snapshot::{CatalogSnapshot, SNAPSHOT_VERSION};

/// Default number of results returned by [`ChannelCatalog::search`]
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Options for [`ChannelCatalog::search`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Rank by token-set similarity instead of exact title equality
    pub fuzzy_match: bool,
    /// Keep `+1` style channels in the results
    pub include_timeshifted: bool,
    /// Only channels whose quality (`sf`) matches, case-insensitively
    pub quality: Option<String>,
    /// Maximum number of results; must be at least 1
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fuzzy_match: false,
            include_timeshifted: true,
            quality: None,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

#[derive(Default)]
struct CatalogState {
    records: Vec<Arc<ChannelRecord>>,
    by_sid: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl CatalogState {
    fn name_key(record: &ChannelRecord) -> Option<String> {
        record.title().map(str::to_lowercase)
    }

    fn insert(&mut self, sid: String, record: ChannelRecord) {
        let idx = self.records.len();
        if let Some(name) = Self::name_key(&record) {
            self.by_name.entry(name).or_default().push(idx);
        }
        self.records.push(Arc::new(record));
        self.by_sid.insert(sid, idx);
    }

    /// Swap the record at `idx`, keeping the name index in step
    fn replace(&mut self, idx: usize, record: ChannelRecord) -> Arc<ChannelRecord> {
        let old_name = Self::name_key(&self.records[idx]);
        let new_name = Self::name_key(&record);

        if old_name != new_name {
            if let Some(name) = old_name {
                if let Some(indices) = self.by_name.get_mut(&name) {
                    indices.retain(|&i| i != idx);
                    if indices.is_empty() {
                        self.by_name.remove(&name);
                    }
                }
            }
            if let Some(name) = new_name {
                let indices = self.by_name.entry(name).or_default();
                indices.push(idx);
                indices.sort_unstable();
            }
        }

        let record = Arc::new(record);
        self.records[idx] = Arc::clone(&record);
        record
    }

    fn upsert(&mut self, sid: &str, record: ChannelRecord) {
        match self.by_sid.get(sid).copied() {
            Some(idx) => {
                let merged = self.records[idx].merge(&record);
                self.replace(idx, merged);
            }
            None => self.insert(sid.to_string(), record),
        }
    }
}

/// Thread-safe catalog of channel records
#[derive(Default)]
pub struct ChannelCatalog {
    state: RwLock<CatalogState>,
    dropped_fragments: AtomicU64,
}

impl ChannelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// All records in insertion order
    pub async fn channels(&self) -> Vec<Arc<ChannelRecord>> {
        self.state.read().await.records.clone()
    }

    /// Insert or merge device summary payloads, keyed by `sid`
    ///
    /// A payload for a known sid is merged into the existing record so data
    /// from details and XMLTV survives a summary reload. Payloads without a
    /// sid are skipped. Returns the number of records inserted or updated.
    pub async fn upsert_from_device_summary(&self, payloads: &[Map<String, Value>]) -> usize {
        let mut state = self.state.write().await;
        let mut upserted = 0;

        for payload in payloads {
            let record = ChannelRecord::from_device_summary(payload);
            let Some(sid) = record.sid().map(str::to_string) else {
                warn!("Skipping device summary without a sid: {:?}", payload);
                continue;
            };
            state.upsert(&sid, record);
            upserted += 1;
        }

        debug!(
            "Upserted {} device summaries; catalog now holds {} channels",
            upserted,
            state.records.len()
        );
        upserted
    }

    /// Layer a device detail payload onto the channel with `sid`
    pub async fn merge_detail(
        &self,
        sid: &str,
        payload: &Value,
    ) -> CatalogResult<Arc<ChannelRecord>> {
        let mut state = self.state.write().await;
        let idx = *state
            .by_sid
            .get(sid)
            .ok_or_else(|| CatalogError::not_found(sid))?;

        let updated = ChannelRecord::from_device_detail(&state.records[idx], payload);
        trace!("Merged detail for channel {}", sid);
        Ok(state.replace(idx, updated))
    }

    /// Merge XMLTV channel fragments into matching channels
    ///
    /// A fragment matches every record whose title equals one of its display
    /// names, ignoring case. Fragments that match nothing are dropped: XMLTV
    /// data only augments channels already known from the device. Drops are
    /// counted in [`dropped_fragment_count`](Self::dropped_fragment_count).
    pub async fn apply_xmltv<I>(&self, fragments: I, base_url: &Url) -> XmltvApplyReport
    where
        I: IntoIterator<Item = XmltvChannel>,
    {
        let mut state = self.state.write().await;
        let mut report = XmltvApplyReport::default();

        for fragment in fragments {
            let mut matched: Vec<usize> = fragment
                .display_names
                .iter()
                .filter_map(|name| state.by_name.get(&name.to_lowercase()))
                .flatten()
                .copied()
                .collect();
            matched.sort_unstable();
            matched.dedup();

            if matched.is_empty() {
                debug!(
                    "Dropping XMLTV channel '{}' ({:?}): no device channel with that name",
                    fragment.id, fragment.display_names
                );
                report.dropped += 1;
                continue;
            }

            let incoming = ChannelRecord::from_xmltv_element(&fragment, base_url);
            for idx in matched {
                let merged = state.records[idx].merge(&incoming);
                state.replace(idx, merged);
            }
            report.applied += 1;
        }

        self.dropped_fragments
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        info!(
            "Applied {} XMLTV channels to the catalog ({} dropped without a match)",
            report.applied, report.dropped
        );
        report
    }

    /// Total XMLTV fragments dropped for lack of a matching channel
    pub fn dropped_fragment_count(&self) -> u64 {
        self.dropped_fragments.load(Ordering::Relaxed)
    }

    /// Look up a channel by `sid`
    pub async fn find_by_identifier(&self, id: &str) -> CatalogResult<Arc<ChannelRecord>> {
        let state = self.state.read().await;
        state
            .by_sid
            .get(id)
            .map(|&idx| Arc::clone(&state.records[idx]))
            .ok_or_else(|| CatalogError::not_found(id))
    }

    /// Search channels by name, closest match first
    ///
    /// Filters are applied before ranking. Without `fuzzy_match` a channel
    /// matches only if its title equals `name` exactly (case-sensitive).
    pub async fn search(
        &self,
        name: &str,
        options: &SearchOptions,
    ) -> CatalogResult<Vec<Arc<ChannelRecord>>> {
        if options.limit < 1 {
            return Err(CatalogError::invalid_argument(
                "limit",
                format!("must be at least 1, got {}", options.limit),
            ));
        }

        let state = self.state.read().await;
        if state.records.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }

        let quality = options.quality.as_deref().map(str::to_lowercase);
        let candidates = state.records.iter().filter(|record| {
            (options.include_timeshifted || !record.is_timeshifted())
                && quality.as_deref().is_none_or(|wanted| {
                    record
                        .quality()
                        .is_some_and(|q| q.to_lowercase() == wanted)
                })
        });

        let results = if options.fuzzy_match {
            let mut scored: Vec<(f64, &Arc<ChannelRecord>)> = candidates
                .filter_map(|record| {
                    let title = record.title()?;
                    let score = token_set_ratio(name, title);
                    (score > 0.0).then_some((score, record))
                })
                .collect();
            // Stable sort keeps catalog order among equal scores
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));
            scored
                .into_iter()
                .take(options.limit)
                .map(|(_, record)| Arc::clone(record))
                .collect()
        } else {
            candidates
                .filter(|record| record.title() == Some(name))
                .take(options.limit)
                .cloned()
                .collect()
        };

        Ok(results)
    }

    /// Capture the current records as a serializable snapshot
    pub async fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state.read().await;
        CatalogSnapshot::new(
            state
                .records
                .iter()
                .map(|record| ChannelRecord::clone(record))
                .collect(),
        )
    }

    /// Replace the whole catalog with the records of `snapshot`
    ///
    /// Records without a sid cannot be addressed and are skipped. Returns
    /// the number of records restored.
    pub async fn restore(&self, snapshot: CatalogSnapshot) -> usize {
        let mut fresh = CatalogState::default();
        for record in snapshot.channels {
            match record.sid().map(str::to_string) {
                Some(sid) => fresh.upsert(&sid, record),
                None => warn!("Skipping snapshot record without a sid: {}", record),
            }
        }

        let restored = fresh.records.len();
        *self.state.write().await = fresh;
        info!("Restored {} channels from snapshot", restored);
        restored
    }

    /// Write the catalog to `path` atomically
    pub async fn save_snapshot(&self, path: &Path) -> AppResult<usize> {
        let snapshot = self.snapshot().await;
        let count = snapshot.channels.len();
        snapshot.save(path).await?;
        info!("Saved {} channels to {}", count, path.display());
        Ok(count)
    }

    /// Replace the catalog with the snapshot stored at `path`
    ///
    /// A malformed snapshot fails the call and leaves the catalog untouched.
    pub async fn load_snapshot(&self, path: &Path) -> AppResult<usize> {
        let snapshot = CatalogSnapshot::load(path).await?;
        Ok(self.restore(snapshot).await)
    }
}
