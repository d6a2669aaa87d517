//! Content-store transport for the persistent document
//!
//! The whole of persistent state is one JSON document versioned by its
//! content SHA. The transport contract is deliberately small: fetch the
//! current document, or put a new revision conditioned on the SHA last
//! observed. Everything else (merging, caching, key layout) lives in the
//! [`Store`](super::Store) facade.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::StoreError;

/// Per-call timeout for store transport requests
const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(25);

/// Write retry policy: attempts, initial backoff, backoff cap
const WRITE_ATTEMPTS: u32 = 3;
const BACKOFF_INITIAL_MS: u64 = 700;
const BACKOFF_CAP_MS: u64 = 15_000;

/// A fetched document revision
#[derive(Debug, Clone)]
pub struct DocumentRevision {
    pub doc: Map<String, Value>,
    pub sha: String,
}

/// Transport contract for the single versioned store document
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the current revision. `None` means the document does not exist
    /// yet; the caller starts from an empty map with no precondition.
    async fn fetch(&self) -> Result<Option<DocumentRevision>, StoreError>;

    /// Put a new revision. `prev_sha` is the precondition: when it no longer
    /// matches the remote head this returns [`StoreError::Conflict`] and the
    /// caller must re-fetch and merge.
    async fn put(
        &self,
        doc: &Map<String, Value>,
        prev_sha: Option<&str>,
        message: &str,
    ) -> Result<String, StoreError>;
}

/// GitHub contents-API implementation of the transport
pub struct GithubContentStore {
    http: HttpClient,
    url: String,
    branch: String,
    token: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: Option<String>,
    sha: String,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

impl GithubContentStore {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let http = HttpClient::builder()
            .timeout(STORE_CALL_TIMEOUT)
            .user_agent(concat!("atcwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: format!(
                "https://api.github.com/repos/{}/contents/{}",
                config.github_repo,
                config.store_path()
            ),
            branch: config.github_branch.clone(),
            token: config.github_token.clone(),
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
    }

    /// Backoff for a retryable write failure, honouring Retry-After when the
    /// server sent one.
    fn backoff_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
        let millis = match retry_after {
            Some(secs) => secs.saturating_mul(1000),
            None => BACKOFF_INITIAL_MS.saturating_mul(1 << attempt),
        };
        Duration::from_millis(millis.min(BACKOFF_CAP_MS))
    }
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

fn decode_document(encoded: &str) -> Result<Map<String, Value>, StoreError> {
    // The transport wraps the file in base64 with embedded newlines
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| StoreError::Corrupt(format!("base64 decode failed: {}", e)))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Corrupt(format!(
            "expected a JSON object at the document root, got {}",
            match other {
                Value::Array(_) => "an array",
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                Value::Bool(_) => "a bool",
                _ => "null",
            }
        ))),
        Err(e) => Err(StoreError::Corrupt(e.to_string())),
    }
}

#[async_trait]
impl ContentStore for GithubContentStore {
    async fn fetch(&self) -> Result<Option<DocumentRevision>, StoreError> {
        let response = self
            .authed(self.http.get(&self.url))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: ContentsResponse = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Transport(e.to_string()))?;
                let encoded = body.content.unwrap_or_default();
                let doc = decode_document(&encoded)?;
                Ok(Some(DocumentRevision { doc, sha: body.sha }))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(StoreError::Transport(format!(
                "fetch returned unexpected status {}",
                status
            ))),
        }
    }

    async fn put(
        &self,
        doc: &Map<String, Value>,
        prev_sha: Option<&str>,
        message: &str,
    ) -> Result<String, StoreError> {
        let serialized =
            serde_json::to_vec(&Value::Object(doc.clone())).map_err(|e| StoreError::Fatal(e.to_string()))?;

        let mut body = serde_json::json!({
            "message": message,
            "content": BASE64.encode(&serialized),
            "branch": self.branch,
        });
        if let Some(sha) = prev_sha {
            body["sha"] = Value::String(sha.to_string());
        }

        let mut attempt = 0;
        loop {
            let response = self
                .authed(self.http.put(&self.url))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            match status {
                StatusCode::OK | StatusCode::CREATED => {
                    let parsed: PutResponse = response
                        .json()
                        .await
                        .map_err(|e| StoreError::Transport(e.to_string()))?;
                    return Ok(parsed.content.sha);
                }
                // Precondition failure. 422 is how the contents API reports a
                // stale or missing SHA; both mean someone else won the write.
                StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                    return Err(StoreError::Conflict);
                }
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    if attempt >= WRITE_ATTEMPTS {
                        return Err(StoreError::Fatal(format!(
                            "store write still rate limited after {} attempts",
                            attempt
                        )));
                    }
                    let delay = Self::backoff_delay(attempt - 1, retry_after_secs(&response));
                    log::warn!("store write got {}, retrying in {:?}", status, delay);
                    tokio::time::sleep(delay).await;
                }
                status if status.is_server_error() => {
                    attempt += 1;
                    if attempt >= WRITE_ATTEMPTS {
                        return Err(StoreError::Fatal(format!(
                            "store write failed with {} after {} attempts",
                            status, attempt
                        )));
                    }
                    let delay = Self::backoff_delay(attempt - 1, retry_after_secs(&response));
                    log::warn!("store write got {}, retrying in {:?}", status, delay);
                    tokio::time::sleep(delay).await;
                }
                status => {
                    return Err(StoreError::Fatal(format!(
                        "store write returned unexpected status {}",
                        status
                    )));
                }
            }
        }
    }
}
