//! Security request and response types.
//!
//! A `SecurityRequest` describes one action about to happen (tool call,
//! file access, network fetch, content injection). The validator answers
//! with a `SecurityResponse`; denial is a result, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of action is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityRequestKind {
    ToolExecution,
    FileAccess,
    NetworkRequest,
    ContentInjection,
}

/// One action submitted for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRequest {
    pub kind: SecurityRequestKind,
    /// Tool being invoked, for tool execution requests.
    pub tool_name: Option<String>,
    /// Tool input payload, for tool execution requests.
    pub input: Option<Value>,
    /// Target of the action: a path, a URL, or the injected content.
    pub target: Option<String>,
    /// Producer of the request; also the rate-limiting key.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl SecurityRequest {
    pub fn tool_execution(
        tool_name: impl Into<String>,
        input: Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind: SecurityRequestKind::ToolExecution,
            tool_name: Some(tool_name.into()),
            input: Some(input),
            target: None,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn file_access(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind: SecurityRequestKind::FileAccess,
            tool_name: None,
            input: None,
            target: Some(path.into()),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn network_request(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind: SecurityRequestKind::NetworkRequest,
            tool_name: None,
            input: None,
            target: Some(url.into()),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn content_injection(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            kind: SecurityRequestKind::ContentInjection,
            tool_name: None,
            input: None,
            target: Some(content.into()),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Risk severity, ordered from `Low` to `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn value(&self) -> u8 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
            RiskLevel::Critical => 4,
        }
    }
}

impl PartialOrd for RiskLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value().cmp(&other.value())
    }
}

/// Category of a detected risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    FileAccess,
    NetworkAccess,
    MaliciousCode,
    RateLimit,
    ToolAdvice,
    InvalidRequest,
}

/// A single detected risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRisk {
    pub level: RiskLevel,
    pub kind: RiskKind,
    pub description: String,
    /// What the action would compromise if it went through.
    pub impact: String,
}

impl SecurityRisk {
    pub fn new(
        level: RiskLevel,
        kind: RiskKind,
        description: impl Into<String>,
        impact: impl Into<String>,
    ) -> Self {
        Self {
            level,
            kind,
            description: description.into(),
            impact: impact.into(),
        }
    }
}

/// Aggregated verdict across all validation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityResponse {
    pub allowed: bool,
    pub warnings: Vec<String>,
    pub risks: Vec<SecurityRisk>,
    pub mitigations: Vec<String>,
}

impl SecurityResponse {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            warnings: Vec::new(),
            risks: Vec::new(),
            mitigations: Vec::new(),
        }
    }

    pub fn deny(risk: SecurityRisk) -> Self {
        Self {
            allowed: false,
            warnings: Vec::new(),
            risks: vec![risk],
            mitigations: Vec::new(),
        }
    }

    /// Most severe risk recorded, if any.
    pub fn highest_risk(&self) -> Option<RiskLevel> {
        self.risks.iter().map(|r| r.level).max()
    }

    pub fn has_risk_kind(&self, kind: RiskKind) -> bool {
        self.risks.iter().any(|r| r.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
    }

    #[test]
    fn test_highest_risk() {
        let mut response = SecurityResponse::allow();
        assert_eq!(response.highest_risk(), None);

        response.risks.push(SecurityRisk::new(
            RiskLevel::Medium,
            RiskKind::RateLimit,
            "throttled",
            "downstream service exhaustion",
        ));
        response.risks.push(SecurityRisk::new(
            RiskLevel::Critical,
            RiskKind::MaliciousCode,
            "eval detected",
            "arbitrary code execution",
        ));

        assert_eq!(response.highest_risk(), Some(RiskLevel::Critical));
        assert!(response.has_risk_kind(RiskKind::MaliciousCode));
        assert!(!response.has_risk_kind(RiskKind::FileAccess));
    }

    #[test]
    fn test_request_constructors() {
        let req = SecurityRequest::tool_execution("web_fetch", json!({"url": "https://a.io"}), "agent");
        assert_eq!(req.kind, SecurityRequestKind::ToolExecution);
        assert_eq!(req.tool_name.as_deref(), Some("web_fetch"));

        let req = SecurityRequest::file_access("/tmp/draft.md", "tool");
        assert_eq!(req.kind, SecurityRequestKind::FileAccess);
        assert_eq!(req.target.as_deref(), Some("/tmp/draft.md"));
        assert!(req.tool_name.is_none());
    }

    #[test]
    fn test_risk_kind_serializes_snake_case() {
        let risk = SecurityRisk::new(
            RiskLevel::High,
            RiskKind::MaliciousCode,
            "eval",
            "arbitrary code execution",
        );
        let value = serde_json::to_value(&risk).unwrap();
        assert_eq!(value["kind"], "malicious_code");
        assert_eq!(value["level"], "high");
        assert_eq!(value["impact"], "arbitrary code execution");
    }
}
