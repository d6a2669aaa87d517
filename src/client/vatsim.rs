//! Live VATSIM API client implementation

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;

use super::{AtcSession, MemberProfile, NetworkApi, OnlineController};
use crate::config::Config;
use crate::error::FetchError;

/// Per-call timeout for data-plane requests
const DATA_CALL_TIMEOUT: Duration = Duration::from_secs(25);

/// Courtesy pacing for the member API
const RATE_LIMIT_PER_SECOND: u32 = 10;

/// VATSIM API client
pub struct VatsimClient {
    http: HttpClient,
    data_url: String,
    api_base: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl VatsimClient {
    /// Create a new client from the service configuration
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = HttpClient::builder()
            .timeout(DATA_CALL_TIMEOUT)
            .user_agent(concat!("atcwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let quota = Quota::per_second(
            NonZeroU32::new(RATE_LIMIT_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            http,
            data_url: config.vatsim_data_url.clone(),
            api_base: config.vatsim_api_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, FetchError> {
        self.rate_limiter.until_ready().await;

        let response = self.http.get(url).send().await.map_err(FetchError::from)?;

        let status = response.status();
        match status {
            StatusCode::OK => response.json::<T>().await.map_err(|e| {
                FetchError::InvalidResponse(format!("Failed to parse response: {}", e))
            }),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(url.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(FetchError::RateLimited(retry_after))
            }
            status if status.is_server_error() => {
                Err(FetchError::ServerError(format!("status {}", status)))
            }
            status => Err(FetchError::InvalidResponse(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl NetworkApi for VatsimClient {
    async fn online_controllers(&self) -> Result<Vec<OnlineController>, FetchError> {
        #[derive(Deserialize)]
        struct DataFeed {
            controllers: Vec<OnlineController>,
        }

        let feed: DataFeed = self.get_json(&self.data_url).await?;
        Ok(feed.controllers)
    }

    async fn member_exists(&self, cid: &str) -> Result<bool, FetchError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/members/{}", self.api_base, cid);
        let response = self.http.get(&url).send().await.map_err(FetchError::from)?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_server_error() => {
                Err(FetchError::ServerError(format!("status {}", status)))
            }
            status => Err(FetchError::InvalidResponse(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }

    async fn member_profile(&self, cid: &str) -> Result<Option<MemberProfile>, FetchError> {
        let url = format!("{}/ratings/{}/", self.api_base, cid);
        match self.get_json::<MemberProfile>(&url).await {
            Ok(profile) => Ok(Some(profile)),
            Err(FetchError::NotFound(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    async fn atc_sessions(
        &self,
        cid: &str,
        start: NaiveDate,
    ) -> Result<Vec<AtcSession>, FetchError> {
        #[derive(Deserialize)]
        struct SessionsResponse {
            items: Vec<AtcSession>,
        }

        let url = format!(
            "{}/ratings/{}/atcsessions/?start={}",
            self.api_base,
            cid,
            start.format("%Y-%m-%d")
        );
        let response: SessionsResponse = self.get_json(&url).await?;
        Ok(response.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::from_lookup(|name| match name {
            "GITHUB_REPO" => Some("vatpac/roster-store".to_string()),
            "GITHUB_TOKEN" => Some("tok".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = VatsimClient::new(&test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn test_api_base_trailing_slash_stripped() {
        let config = Config::from_lookup(|name| match name {
            "GITHUB_REPO" => Some("vatpac/roster-store".to_string()),
            "GITHUB_TOKEN" => Some("tok".to_string()),
            "VATSIM_API_URL" => Some("https://api.example.test/api/".to_string()),
            _ => None,
        })
        .unwrap();
        let client = VatsimClient::new(&config).unwrap();
        assert_eq!(client.api_base, "https://api.example.test/api");
    }
}
