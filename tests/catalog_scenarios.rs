mod common;

use serde_json::{json, Map, Value};
use skyq_epg::catalog::{ChannelCatalog, SearchOptions};
use skyq_epg::errors::CatalogError;
use skyq_epg::models::{ChannelSources, XmltvChannel};
use skyq_epg::sources::XmltvChannelReader;
use tempfile::TempDir;
use url::Url;

fn services(value: Value) -> Vec<Map<String, Value>> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

async fn device_catalog() -> ChannelCatalog {
    let catalog = ChannelCatalog::new();
    let loaded = catalog
        .upsert_from_device_summary(&services(json!([
            {"sid": "2002", "c": "101", "t": "BBC One Lon", "sf": "sd"},
            {"sid": "2862", "c": "876", "t": "UCB Ireland", "sf": "sd"},
        ])))
        .await;
    assert_eq!(loaded, 2);
    catalog
}

fn sample_fragments() -> Vec<XmltvChannel> {
    XmltvChannelReader::from_reader(common::SAMPLE_XMLTV.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[tokio::test]
async fn test_lookup_after_device_load() {
    let catalog = device_catalog().await;

    let record = catalog.find_by_identifier("2002").await.unwrap();
    assert_eq!(record.title(), Some("BBC One Lon"));
    assert_eq!(record.get("t").and_then(|v| v.as_str()), Some("BBC One Lon"));
    assert_eq!(record.sources(), ChannelSources::DEVICE_SUMMARY);

    let err = catalog.find_by_identifier("9999").await.unwrap_err();
    assert_eq!(err, CatalogError::not_found("9999"));
}

#[tokio::test]
async fn test_xmltv_listing_augments_matching_channel() {
    let catalog = device_catalog().await;
    let base = Url::parse("http://example.com/epg/feed.xml").unwrap();

    let report = catalog.apply_xmltv(sample_fragments(), &base).await;
    assert_eq!(report.applied, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(catalog.dropped_fragment_count(), 1);

    let record = catalog.find_by_identifier("2002").await.unwrap();
    assert_eq!(record.xmltv_id(), Some("f3932e75f691561adbe3b68a5c4c3a8e"));
    assert_eq!(record.sid(), Some("2002"));
    assert_eq!(record.title(), Some("BBC One Lon"));
    assert_eq!(
        record.xmltv_icon_url().map(Url::as_str),
        Some("http://example.com/logos/bbc_one.png")
    );
    assert!(record.sources().contains(ChannelSources::XMLTV));

    let untouched = catalog.find_by_identifier("2862").await.unwrap();
    assert_eq!(untouched.xmltv_id(), None);
}

#[tokio::test]
async fn test_fuzzy_search_prefers_closest_title() {
    let catalog = ChannelCatalog::new();
    catalog
        .upsert_from_device_summary(&services(json!([
            {"sid": "2076", "t": "BBC News"},
            {"sid": "2002", "t": "BBC One Lon"},
            {"sid": "2862", "t": "UCB Ireland"},
        ])))
        .await;

    let options = SearchOptions {
        fuzzy_match: true,
        limit: 1,
        ..SearchOptions::default()
    };
    let results = catalog.search("BBC One", &options).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].sid(), Some("2002"));

    let exact = catalog
        .search("bbc one lon", &SearchOptions::default())
        .await
        .unwrap();
    assert!(exact.is_empty());
}

#[tokio::test]
async fn test_search_filters_timeshift_and_quality() {
    let catalog = ChannelCatalog::new();
    catalog
        .upsert_from_device_summary(&services(json!([
            {"sid": "1", "t": "Sky Cinema Action", "sf": "hd"},
            {"sid": "2", "t": "Sky Cinema Action+1", "sf": "hd", "timeshifted": true},
            {"sid": "3", "t": "Sky Cinema Action", "sf": "sd"},
        ])))
        .await;

    let options = SearchOptions {
        fuzzy_match: true,
        include_timeshifted: false,
        quality: Some("HD".to_string()),
        limit: 10,
    };
    let results = catalog.search("Sky Cinema Action", &options).await.unwrap();
    let sids: Vec<_> = results.iter().filter_map(|r| r.sid()).collect();
    assert_eq!(sids, vec!["1"]);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("catalog.json");

    let catalog = device_catalog().await;
    let base = Url::parse("http://example.com/epg/feed.xml").unwrap();
    catalog.apply_xmltv(sample_fragments(), &base).await;
    assert_eq!(catalog.save_snapshot(&path).await.unwrap(), 2);

    let restored = ChannelCatalog::new();
    assert_eq!(restored.load_snapshot(&path).await.unwrap(), 2);

    let record = restored.find_by_identifier("2002").await.unwrap();
    assert_eq!(record.xmltv_id(), Some("f3932e75f691561adbe3b68a5c4c3a8e"));
    assert_eq!(
        record.sources(),
        ChannelSources::DEVICE_SUMMARY | ChannelSources::XMLTV
    );

    let found = restored
        .search("UCB Ireland", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}
