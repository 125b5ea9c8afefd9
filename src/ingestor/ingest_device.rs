//! Device channel load: summaries first, then per-channel details

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::ChannelCatalog;
use crate::errors::AppResult;
use crate::models::DeviceLoadReport;
use crate::sources::device::DeviceClient;

/// Detail requests allowed in flight at once
pub const DEFAULT_DETAIL_CONCURRENCY: usize = 8;

pub struct DeviceIngestor {
    client: DeviceClient,
    catalog: Arc<ChannelCatalog>,
    detail_concurrency: usize,
}

impl DeviceIngestor {
    pub fn new(client: DeviceClient, catalog: Arc<ChannelCatalog>) -> Self {
        Self {
            client,
            catalog,
            detail_concurrency: DEFAULT_DETAIL_CONCURRENCY,
        }
    }

    pub fn with_detail_concurrency(mut self, concurrency: usize) -> Self {
        self.detail_concurrency = concurrency.max(1);
        self
    }

    /// Load every channel summary, then layer each channel's details on top
    ///
    /// A failed summary request fails the load. A failed detail request is
    /// logged and counted; the channel keeps its summary data.
    pub async fn load_channels(&self) -> AppResult<DeviceLoadReport> {
        let services = self.client.fetch_services().await?;
        let summaries = self.catalog.upsert_from_device_summary(&services).await;

        let sids: Vec<String> = services
            .iter()
            .filter_map(|s| s.get("sid"))
            .filter_map(|sid| match sid {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect();

        let mut report = DeviceLoadReport {
            summaries,
            ..Default::default()
        };

        let client = &self.client;
        let mut details = stream::iter(sids)
            .map(|sid| async move {
                let detail = client.fetch_service_detail(&sid).await;
                (sid, detail)
            })
            .buffer_unordered(self.detail_concurrency);

        while let Some((sid, detail)) = details.next().await {
            let merged = match detail {
                Ok(payload) => self
                    .catalog
                    .merge_detail(&sid, &payload)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match merged {
                Ok(_) => report.details_loaded += 1,
                Err(e) => {
                    warn!("Failed to load details for channel {}: {}", sid, e);
                    report.details_failed += 1;
                }
            }
        }

        info!(
            "Loaded {} channels from device {} ({} details, {} failed)",
            report.summaries,
            self.client.base_url(),
            report.details_loaded,
            report.details_failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelSources;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_load_channels_tolerates_detail_failures() {
        let router = Router::new()
            .route(
                "/as/services",
                get(|| async {
                    Json(json!({"services": [
                        {"sid": "2002", "c": "101", "t": "BBC One Lon", "sf": "sd"},
                        {"sid": "2862", "c": "0214", "t": "UCB Ireland", "sf": "au"}
                    ]}))
                }),
            )
            .route(
                "/as/services/details/{sid}",
                get(|Path(sid): Path<String>| async move {
                    if sid == "2862" {
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    } else {
                        Json(json!({"details": {"isbroadcasting": true}})).into_response()
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let client = DeviceClient::new(
            "127.0.0.1",
            addr.port(),
            Duration::from_secs(5),
            "skyq-epg-test",
        )
        .unwrap();
        let catalog = Arc::new(ChannelCatalog::new());
        let ingestor = DeviceIngestor::new(client, Arc::clone(&catalog));

        let report = ingestor.load_channels().await.unwrap();
        assert_eq!(
            report,
            DeviceLoadReport {
                summaries: 2,
                details_loaded: 1,
                details_failed: 1
            }
        );

        let bbc = catalog.find_by_identifier("2002").await.unwrap();
        assert!(bbc.sources().contains(ChannelSources::DEVICE_DETAIL));
        let ucb = catalog.find_by_identifier("2862").await.unwrap();
        assert_eq!(ucb.sources(), ChannelSources::DEVICE_SUMMARY);
    }

    #[tokio::test]
    async fn test_numeric_sids_get_details() {
        let router = Router::new()
            .route(
                "/as/services",
                get(|| async {
                    Json(json!({"services": [
                        {"sid": 2002, "c": "101", "t": "BBC One Lon"}
                    ]}))
                }),
            )
            .route(
                "/as/services/details/{sid}",
                get(|Path(sid): Path<String>| async move {
                    Json(json!({"details": {"detail_sid": sid}}))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let client =
            DeviceClient::new("127.0.0.1", addr.port(), Duration::from_secs(5), "skyq-epg-test")
                .unwrap();
        let catalog = Arc::new(ChannelCatalog::new());
        let report = DeviceIngestor::new(client, Arc::clone(&catalog))
            .load_channels()
            .await
            .unwrap();
        assert_eq!(report.summaries, 1);
        assert_eq!(report.details_loaded, 1);

        let bbc = catalog.find_by_identifier("2002").await.unwrap();
        assert_eq!(bbc.text("detail_sid"), Some("2002"));
    }
}
