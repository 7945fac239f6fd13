//! Engine and security configuration.
//!
//! Plain data with serde camelCase loading, so external config files map
//! straight onto these structs. Every field is defaulted; loading and file
//! discovery belong to the embedding application.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Preset strictness for the security pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Relaxed,
    #[default]
    Standard,
    Strict,
}

/// Per-source request throttling. A zero `requests_per_minute` disables
/// rate limiting entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub burst_limit: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_limit: 10,
        }
    }
}

/// Configuration for the security validation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    pub enabled: bool,
    /// Stop batch interception at the first blocked call.
    pub strict_mode: bool,
    /// Scan injected content in addition to tool inputs.
    pub content_filter: bool,
    /// Run the malicious-pattern detector.
    pub malicious_detection: bool,
    /// Record an audit entry per validated request.
    pub audit_logging: bool,
    pub allowed_domains: Vec<String>,
    pub blocked_paths: Vec<String>,
    pub rate_limiting: RateLimitSettings,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict_mode: false,
            content_filter: true,
            malicious_detection: true,
            audit_logging: true,
            allowed_domains: default_allowed_domains(),
            blocked_paths: default_blocked_paths(),
            rate_limiting: RateLimitSettings::default(),
        }
    }
}

fn default_allowed_domains() -> Vec<String> {
    [
        "wikipedia.org",
        "britannica.com",
        "arxiv.org",
        "github.com",
        "docs.rs",
        "reuters.com",
        "apnews.com",
    ]
    .map(String::from)
    .to_vec()
}

fn default_blocked_paths() -> Vec<String> {
    [
        "/etc",
        "/sys",
        "/proc",
        "/dev",
        "/boot",
        "~/.ssh",
        "~/.aws",
        "~/.gnupg",
        ".env",
    ]
    .map(String::from)
    .to_vec()
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfiguration {
    pub max_concurrent_tools: usize,
    pub tool_timeout_secs: u64,
    pub context_token_budget: usize,
    pub context_compression_threshold: f64,
    pub queue_capacity: usize,
    pub queue_backpressure_threshold: usize,
    pub confirmation_timeout_secs: u64,
    pub security_level: SecurityLevel,
    pub security: SecurityConfig,
}

impl Default for AgentConfiguration {
    fn default() -> Self {
        Self {
            max_concurrent_tools: 4,
            tool_timeout_secs: 120,
            context_token_budget: crate::context::DEFAULT_TOKEN_BUDGET,
            context_compression_threshold: crate::context::DEFAULT_THRESHOLD_RATIO,
            queue_capacity: 256,
            queue_backpressure_threshold: 192,
            confirmation_timeout_secs: 30,
            security_level: SecurityLevel::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl AgentConfiguration {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Strict interception: the explicit flag or the Strict preset.
    pub fn is_strict(&self) -> bool {
        self.security.strict_mode || self.security_level == SecurityLevel::Strict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfiguration::default();

        assert_eq!(config.max_concurrent_tools, 4);
        assert_eq!(config.tool_timeout(), Duration::from_secs(120));
        assert_eq!(config.confirmation_timeout(), Duration::from_secs(30));
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.queue_backpressure_threshold, 192);
        assert_eq!(config.context_token_budget, 128_000);
        assert!(!config.is_strict());

        assert!(config.security.enabled);
        assert!(config.security.audit_logging);
        assert!(!config.security.allowed_domains.is_empty());
        assert!(!config.security.blocked_paths.is_empty());
        assert_eq!(config.security.rate_limiting.requests_per_minute, 60);
    }

    #[test]
    fn test_partial_camel_case_deserialization() {
        let json = r#"{
            "maxConcurrentTools": 1,
            "securityLevel": "strict",
            "security": { "allowedDomains": ["example.org"] }
        }"#;

        let config: AgentConfiguration = serde_json::from_str(json).unwrap();

        assert_eq!(config.max_concurrent_tools, 1);
        assert_eq!(config.security_level, SecurityLevel::Strict);
        assert!(config.is_strict());
        assert_eq!(config.security.allowed_domains, vec!["example.org"]);
        // Unspecified fields keep their defaults.
        assert_eq!(config.tool_timeout_secs, 120);
        assert!(config.security.malicious_detection);
    }

    #[test]
    fn test_strict_flag_follows_either_source() {
        let mut config = AgentConfiguration::default();
        assert!(!config.is_strict());

        config.security.strict_mode = true;
        assert!(config.is_strict());

        config.security.strict_mode = false;
        config.security_level = SecurityLevel::Strict;
        assert!(config.is_strict());
    }
}
