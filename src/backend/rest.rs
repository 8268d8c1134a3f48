//! HTTP backend for a PostgREST-style API.
//!
//! Collections map to `{base}/rest/v1/{table}` endpoints authenticated with
//! an API key. The API has no push channel, so `subscribe` degrades to a
//! polling change feed: the collection body is hashed at an interval and a
//! coalesced update event is emitted when it changes.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{header, Client};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::utils::lock;

use super::{Backend, BackendError, BackendResult, ChangeAction, ChangeEvent};

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Capacity of the per-table change-event channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Backend implementation over a PostgREST-style HTTP API.
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl RestBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        poll_interval: Duration,
    ) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            poll_interval,
            channels: Mutex::new(HashMap::new()),
            pollers: Mutex::new(Vec::new()),
        })
    }

    /// Build a backend from the loaded configuration. Both the base URL
    /// and the API key must be present.
    pub fn from_config(config: &crate::config::Config) -> BackendResult<Self> {
        let base_url = config.backend_url.as_deref().ok_or_else(|| {
            BackendError::InvalidResponse("backend_url is not configured".to_string())
        })?;
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            BackendError::InvalidResponse("api_key is not configured".to_string())
        })?;
        Self::new(base_url, api_key, config.poll_interval())
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_headers(&self) -> BackendResult<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(&self.api_key).map_err(|_| {
            BackendError::InvalidResponse("API key contains invalid header characters".to_string())
        })?;
        let bearer = header::HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| {
                BackendError::InvalidResponse(
                    "API key contains invalid header characters".to_string(),
                )
            })?;
        headers.insert("apikey", key);
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Check if a response is successful, returning Ok(Some(response)) for
    /// success, Ok(None) for rate limit (should retry), or Err otherwise.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> BackendResult<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::from_status(status, &body))
        }
    }

    /// Send a request, retrying rate-limited responses with exponential
    /// backoff.
    async fn execute(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> BackendResult<reqwest::Response> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().headers(self.auth_headers()?).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(BackendError::RateLimited);
                    }
                    warn!(retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    /// Unwrap a `return=representation` response into a single record.
    fn first_row(value: Value) -> Option<Value> {
        match value {
            Value::Array(mut rows) => {
                if rows.is_empty() {
                    None
                } else {
                    Some(rows.remove(0))
                }
            }
            Value::Null => None,
            other => Some(other),
        }
    }
}

#[async_trait::async_trait]
impl Backend for RestBackend {
    async fn read_collection(&self, table: &str) -> BackendResult<Vec<Value>> {
        let url = format!("{}?select=*", self.table_url(table));
        let response = self.execute(|| self.client.get(&url)).await?;
        Ok(response.json().await?)
    }

    async fn insert_record(&self, table: &str, payload: Value) -> BackendResult<Value> {
        let url = self.table_url(table);
        let response = self
            .execute(|| {
                self.client
                    .post(&url)
                    .header("Prefer", "return=representation")
                    .json(&payload)
            })
            .await?;

        let body: Value = response.json().await?;
        Self::first_row(body).ok_or_else(|| {
            BackendError::InvalidResponse("insert returned no record".to_string())
        })
    }

    async fn update_record(&self, table: &str, id: i64, payload: Value) -> BackendResult<Value> {
        let url = format!("{}?id=eq.{}", self.table_url(table), id);
        let response = self
            .execute(|| {
                self.client
                    .patch(&url)
                    .header("Prefer", "return=representation")
                    .json(&payload)
            })
            .await?;

        let body: Value = response.json().await?;
        Self::first_row(body).ok_or(BackendError::MissingRecord {
            table: table.to_string(),
            id,
        })
    }

    fn subscribe(&self, table: &str) -> BackendResult<broadcast::Receiver<ChangeEvent>> {
        let mut channels = lock(&self.channels);
        if let Some(sender) = channels.get(table) {
            return Ok(sender.subscribe());
        }

        let (sender, receiver) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        channels.insert(table.to_string(), sender.clone());
        drop(channels);

        let url = format!("{}?select=*", self.table_url(table));
        let headers = self.auth_headers()?;
        let client = self.client.clone();
        let interval = self.poll_interval;
        let table_name = table.to_string();

        let handle = tokio::spawn(async move {
            let mut last_digest: Option<u64> = None;
            loop {
                tokio::time::sleep(interval).await;

                let response = match client.get(&url).headers(headers.clone()).send().await {
                    Ok(r) if r.status().is_success() => r,
                    Ok(r) => {
                        debug!(table = %table_name, status = %r.status(), "change poll failed");
                        continue;
                    }
                    Err(e) => {
                        debug!(table = %table_name, error = %e, "change poll failed");
                        continue;
                    }
                };
                let body = match response.text().await {
                    Ok(b) => b,
                    Err(e) => {
                        debug!(table = %table_name, error = %e, "change poll body unreadable");
                        continue;
                    }
                };

                let mut hasher = DefaultHasher::new();
                body.hash(&mut hasher);
                let digest = hasher.finish();

                // The poll cannot attribute the change to one record, so a
                // single coalesced update event stands in for all of them.
                if last_digest.is_some() && last_digest != Some(digest) {
                    let _ = sender.send(ChangeEvent {
                        table: table_name.clone(),
                        action: ChangeAction::Update,
                        record_id: None,
                    });
                }
                last_digest = Some(digest);
            }
        });
        lock(&self.pollers).push(handle);

        Ok(receiver)
    }
}

impl Drop for RestBackend {
    fn drop(&mut self) {
        for handle in lock(&self.pollers).drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_url() {
        let backend =
            RestBackend::new("https://api.example.com/", "key", Duration::from_secs(15))
                .expect("client");
        assert_eq!(
            backend.table_url("projects"),
            "https://api.example.com/rest/v1/projects"
        );
    }

    #[test]
    fn test_first_row() {
        assert_eq!(
            RestBackend::first_row(json!([{ "id": 1 }, { "id": 2 }])),
            Some(json!({ "id": 1 }))
        );
        assert_eq!(RestBackend::first_row(json!([])), None);
        assert_eq!(RestBackend::first_row(Value::Null), None);
        assert_eq!(
            RestBackend::first_row(json!({ "id": 3 })),
            Some(json!({ "id": 3 }))
        );
    }
}
