//! Catalog snapshot persistence
//!
//! A snapshot is a versioned JSON document holding every channel record in
//! its tagged serialized form. Saving goes through a temp file and a rename
//! so a crash mid-write never leaves a truncated snapshot behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::errors::{AppResult, CatalogError};
use crate::models::ChannelRecord;

/// Snapshot format version written by this build
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized catalog state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub channels: Vec<ChannelRecord>,
}

impl CatalogSnapshot {
    pub fn new(channels: Vec<ChannelRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            channels,
        }
    }

    pub fn to_json(&self) -> Result<String, CatalogError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CatalogError::malformed(format!("failed to serialize snapshot: {e}")))
    }

    /// Decode a snapshot, rejecting unknown versions and malformed records
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| CatalogError::malformed(format!("invalid snapshot: {e}")))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CatalogError::malformed(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Write atomically to `path`, creating parent directories as needed
    pub async fn save(&self, path: &Path) -> AppResult<()> {
        let json = self.to_json()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Snapshot written to {}", path.display());
        Ok(())
    }

    pub async fn load(path: &Path) -> AppResult<Self> {
        let json = fs::read_to_string(path).await?;
        Ok(Self::from_json(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChannelCatalog;
    use serde_json::json;

    fn record(sid: &str, title: &str) -> ChannelRecord {
        ChannelRecord::from_device_summary(json!({"sid": sid, "t": title}).as_object().unwrap())
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("catalog.json");

        let snapshot = CatalogSnapshot::new(vec![record("2002", "BBC One Lon")]);
        snapshot.save(&path).await.unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = CatalogSnapshot::load(&path).await.unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_catalog_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let source = ChannelCatalog::new();
        source.restore(CatalogSnapshot::new(vec![
            record("2002", "BBC One Lon"),
            record("2862", "UCB Ireland"),
        ]))
        .await;
        assert_eq!(source.save_snapshot(&path).await.unwrap(), 2);

        let target = ChannelCatalog::new();
        assert_eq!(target.load_snapshot(&path).await.unwrap(), 2);
        assert_eq!(
            *target.find_by_identifier("2862").await.unwrap(),
            *source.find_by_identifier("2862").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_malformed_snapshot_leaves_catalog_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let bad = json!({
            "version": SNAPSHOT_VERSION,
            "saved_at": "2024-01-01T00:00:00Z",
            "channels": [{"attributes": {}, "sources": 1}]
        });
        std::fs::write(&path, bad.to_string()).unwrap();

        let catalog = ChannelCatalog::new();
        catalog
            .restore(CatalogSnapshot::new(vec![record("1", "Kept")]))
            .await;

        let err = catalog.load_snapshot(&path).await.unwrap_err();
        assert!(matches!(
            err,
            crate::errors::AppError::Catalog(CatalogError::MalformedRecord { .. })
        ));
        assert!(catalog.find_by_identifier("1").await.is_ok());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let json = json!({
            "version": 99,
            "saved_at": "2024-01-01T00:00:00Z",
            "channels": []
        });
        assert!(CatalogSnapshot::from_json(&json.to_string()).is_err());
    }
}
