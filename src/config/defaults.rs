//! Configuration default values

// Device defaults
pub const DEFAULT_DEVICE_HOST: &str = "127.0.0.1";
pub const DEFAULT_DEVICE_REST_PORT: u16 = 9006;
pub const DEFAULT_DEVICE_TIMEOUT: &str = "60s";
pub const DEFAULT_DETAIL_CONCURRENCY: usize = 8;

// Storage defaults
pub const DEFAULT_LISTING_DIR: &str = ".epg_data";
pub const DEFAULT_SNAPSHOT_PATH: &str = ".epg_data/catalog.json";

// Fetch defaults
pub const DEFAULT_CHUNK_SIZE: u64 = 256 * 1024;
pub const DEFAULT_FETCH_TIMEOUT: &str = "60s";

// Runtime defaults
pub const DEFAULT_SHUTDOWN_GRACE: &str = "10s";

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8090;

// Listing defaults
pub const DEFAULT_UPDATE_CRON: &str = "0 3 * * *";
