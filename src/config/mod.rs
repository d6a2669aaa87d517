//! Configuration management for atcwatch
//!
//! All configuration is environment-driven: the service runs from cron or a
//! supervisor, never from an interactive session, so there is no profile file.

use serde::Serialize;

use crate::error::{ConfigError, Result};

/// Default branch holding the store document
const DEFAULT_BRANCH: &str = "main";

/// Default directory for the store document within the repository
const DEFAULT_DIR: &str = "cf-cache";

/// Default bind address for the API server
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// VATSIM live network data feed (v3)
const DEFAULT_DATA_URL: &str = "https://data.vatsim.net/v3/vatsim-data.json";

/// VATSIM member/session API base
const DEFAULT_API_URL: &str = "https://api.vatsim.net/api";

/// Application configuration
///
/// The token is deliberately excluded from serialization so a debug dump of
/// the config never leaks it.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Content-store repository in `owner/name` form
    pub github_repo: String,

    /// Branch holding the store document
    pub github_branch: String,

    /// Directory within the repository for `store.json`
    pub github_dir: String,

    /// API token for the content store
    #[serde(skip_serializing)]
    pub github_token: String,

    /// CORS allow-origin for the HTTP API
    pub allowed_origin: String,

    /// Bind address for `serve`
    pub listen_addr: String,

    /// Live network data feed URL
    pub vatsim_data_url: String,

    /// Member/session API base URL
    pub vatsim_api_url: String,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup (for testing)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String> {
            match lookup(name) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(ConfigError::MissingVar(name).into()),
            }
        };
        let optional =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let config = Self {
            github_repo: required("GITHUB_REPO")?,
            github_branch: optional("GITHUB_BRANCH", DEFAULT_BRANCH),
            github_dir: optional("GITHUB_DIR", DEFAULT_DIR),
            github_token: required("GITHUB_TOKEN")?,
            allowed_origin: optional("ALLOWED_ORIGIN", "*"),
            listen_addr: optional("LISTEN_ADDR", DEFAULT_LISTEN_ADDR),
            vatsim_data_url: optional("VATSIM_DATA_URL", DEFAULT_DATA_URL),
            vatsim_api_url: optional("VATSIM_API_URL", DEFAULT_API_URL),
        };
        config.validate()?;
        Ok(config)
    }

    /// Path of the store document within the repository
    pub fn store_path(&self) -> String {
        format!("{}/store.json", self.github_dir.trim_matches('/'))
    }

    fn validate(&self) -> Result<()> {
        if self.github_repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(ConfigError::Invalid(format!(
                "GITHUB_REPO must be in owner/name form, got '{}'",
                self.github_repo
            ))
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn load(vars: &HashMap<String, String>) -> Result<Config> {
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let vars = env(&[("GITHUB_REPO", "vatpac/roster-store"), ("GITHUB_TOKEN", "tok")]);
        let config = load(&vars).unwrap();

        assert_eq!(config.github_branch, "main");
        assert_eq!(config.github_dir, "cf-cache");
        assert_eq!(config.allowed_origin, "*");
        assert_eq!(config.store_path(), "cf-cache/store.json");
    }

    #[test]
    fn test_missing_repo_fails() {
        let vars = env(&[("GITHUB_TOKEN", "tok")]);
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("GITHUB_REPO"));
    }

    #[test]
    fn test_missing_token_fails() {
        let vars = env(&[("GITHUB_REPO", "vatpac/roster-store")]);
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_blank_required_var_treated_as_missing() {
        let vars = env(&[("GITHUB_REPO", "  "), ("GITHUB_TOKEN", "tok")]);
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_malformed_repo_rejected() {
        let vars = env(&[("GITHUB_REPO", "just-a-name"), ("GITHUB_TOKEN", "tok")]);
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("owner/name"));
    }

    #[test]
    fn test_overrides_respected() {
        let vars = env(&[
            ("GITHUB_REPO", "vatpac/roster-store"),
            ("GITHUB_TOKEN", "tok"),
            ("GITHUB_BRANCH", "staging"),
            ("GITHUB_DIR", "state"),
            ("ALLOWED_ORIGIN", "https://dashboard.example.org"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.github_branch, "staging");
        assert_eq!(config.store_path(), "state/store.json");
        assert_eq!(config.allowed_origin, "https://dashboard.example.org");
    }

    #[test]
    fn test_token_never_serialized() {
        let vars = env(&[("GITHUB_REPO", "vatpac/roster-store"), ("GITHUB_TOKEN", "sekrit")]);
        let config = load(&vars).unwrap();
        let dump = serde_json::to_string(&config).unwrap();
        assert!(!dump.contains("sekrit"));
    }
}
