//! VATSIM network API client

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub mod budget;
#[cfg(test)]
pub mod mock;
pub mod vatsim;

#[cfg(test)]
pub use mock::MockNetworkClient;
pub use vatsim::VatsimClient;

/// Network API client trait
///
/// One implementation talks to the live network; tests use a scripted mock.
/// All methods are single-attempt with a per-call timeout: a transient miss
/// is retried on a later tick, never inline.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Snapshot of controllers currently connected to the network
    async fn online_controllers(&self) -> Result<Vec<OnlineController>, FetchError>;

    /// Whether a member account exists
    async fn member_exists(&self, cid: &str) -> Result<bool, FetchError>;

    /// Member profile (rating, registration, division). `None` when the
    /// member does not exist.
    async fn member_profile(&self, cid: &str) -> Result<Option<MemberProfile>, FetchError>;

    /// ATC sessions for a member since `start`, newest last
    async fn atc_sessions(
        &self,
        cid: &str,
        start: NaiveDate,
    ) -> Result<Vec<AtcSession>, FetchError>;
}

/// A controller connected to the network, as reported by the data feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineController {
    /// Member CID (numeric on the wire)
    pub cid: u64,

    /// Position callsign, e.g. `ML-APP_CTR`
    pub callsign: String,

    /// Primary frequency (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,

    /// Display name (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl OnlineController {
    /// ATIS connections are broadcast placeholders, not controlling sessions
    pub fn is_atis(&self) -> bool {
        self.callsign.to_uppercase().ends_with("_ATIS")
    }
}

/// Member profile from the ratings endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberProfile {
    /// Member CID
    pub id: u64,

    /// Controller rating (numeric; 2 = S1)
    pub rating: i32,

    /// Display name (optional, may be withheld)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Registration date, ISO 8601 (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reg_date: Option<String>,

    /// Division identifier (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
}

/// One ATC session from the activity endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtcSession {
    /// Position callsign for the session
    pub callsign: String,

    /// Session start, ISO 8601
    pub start: String,

    /// Session end, ISO 8601; absent while the session is still open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// Minutes on callsign, a decimal string on the wire
    #[serde(rename = "minutes_on_callsign")]
    pub minutes_on_callsign: String,
}

impl AtcSession {
    /// Session duration in minutes (0 when the wire value is malformed)
    pub fn minutes(&self) -> f64 {
        self.minutes_on_callsign.parse().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atis_detection() {
        let atis = OnlineController {
            cid: 1234567,
            callsign: "ML_ATIS".to_string(),
            frequency: None,
            name: None,
        };
        let ctr = OnlineController {
            cid: 1234567,
            callsign: "ML-APP_CTR".to_string(),
            frequency: Some("129.400".to_string()),
            name: None,
        };
        assert!(atis.is_atis());
        assert!(!ctr.is_atis());
    }

    #[test]
    fn test_atis_detection_case_insensitive() {
        let atis = OnlineController {
            cid: 1,
            callsign: "ml_atis".to_string(),
            frequency: None,
            name: None,
        };
        assert!(atis.is_atis());
    }

    #[test]
    fn test_session_minutes_parse() {
        let session = AtcSession {
            callsign: "SY_TWR".to_string(),
            start: "2025-05-01T09:00:00Z".to_string(),
            end: Some("2025-05-01T11:00:00Z".to_string()),
            minutes_on_callsign: "120.5".to_string(),
        };
        assert!((session.minutes() - 120.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_session_minutes_malformed_is_zero() {
        let session = AtcSession {
            callsign: "SY_TWR".to_string(),
            start: "2025-05-01T09:00:00Z".to_string(),
            end: None,
            minutes_on_callsign: "n/a".to_string(),
        };
        assert_eq!(session.minutes(), 0.0);
    }
}
