//! REST client for the set-top box channel endpoints
//!
//! The box serves two small JSON documents: the channel list at
//! `/as/services` and per-channel details at `/as/services/details/{sid}`.
//! Neither supports ranges, so these are plain one-shot requests rather than
//! going through the resumable fetcher.

use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::errors::{AppError, AppResult, FetchError, FetchResult};
use crate::utils::url::{join_path, normalize_base_url};

/// Channel list endpoint
pub const REST_SERVICES_PATH: &str = "/as/services";
/// Channel detail endpoint prefix; the sid is appended
pub const REST_SERVICE_DETAIL_PATH: &str = "/as/services/details/";
/// Default REST port on the box
pub const DEFAULT_REST_PORT: u16 = 9006;

/// One-shot HTTP client for the device's channel endpoints
#[derive(Debug, Clone)]
pub struct DeviceClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl DeviceClient {
    /// Create a client for the box at `host:port`
    pub fn new(host: &str, port: u16, timeout: Duration, user_agent: &str) -> AppResult<Self> {
        let base_url = normalize_base_url(&format!("{host}:{port}"))
            .map_err(|e| AppError::configuration(format!("Invalid device address: {e}")))?;
        Self::with_base_url(base_url, timeout, user_agent)
    }

    /// Create a client against an explicit base URL
    pub fn with_base_url(base_url: Url, timeout: Duration, user_agent: &str) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        debug!("Device client initialised for {}", base_url);
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the channel summary list
    ///
    /// The box wraps the list in a `services` member; a bare array is
    /// accepted too. Entries that are not JSON objects are skipped.
    pub async fn fetch_services(&self) -> FetchResult<Vec<Map<String, Value>>> {
        let body = self.get_json(REST_SERVICES_PATH).await?;
        let url = self.endpoint_string(REST_SERVICES_PATH);

        let list = match &body {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("services") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(FetchError::Decode {
                        url,
                        message: "response has no 'services' list".to_string(),
                    })
                }
            },
            _ => {
                return Err(FetchError::Decode {
                    url,
                    message: "response is neither an object nor a list".to_string(),
                })
            }
        };

        let services: Vec<_> = list
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect();
        debug!("Device returned {} channel summaries", services.len());
        Ok(services)
    }

    /// Fetch the detail payload for one channel
    pub async fn fetch_service_detail(&self, sid: &str) -> FetchResult<Value> {
        self.get_json(&format!("{REST_SERVICE_DETAIL_PATH}{sid}")).await
    }

    async fn get_json(&self, path: &str) -> FetchResult<Value> {
        let url = join_path(&self.base_url, path)
            .map_err(|e| FetchError::transfer(self.endpoint_string(path), e.to_string()))?;
        let url_str = url.to_string();

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(&url_str, self.timeout)
            } else {
                FetchError::from_reqwest(&url_str, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(
                &url_str,
                status.as_u16(),
                format!("HTTP {status}"),
            ));
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(&url_str, self.timeout)
            } else {
                FetchError::Decode {
                    url: url_str.clone(),
                    message: e.to_string(),
                }
            }
        })
    }

    fn endpoint_string(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}
