//! Six-layer security validator.
//!
//! Runs every request through the full layer pipeline and aggregates the
//! verdicts: a request is allowed only when no layer denied it. The sixth
//! layer ([`AuditAggregationLayer`]) summarizes risks and produces the
//! audit entry; the log is append-only and in memory.
//!
//! Malformed requests never error out of `validate`; they convert to a
//! conservative deny with an `invalid_request` risk.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::config::SecurityConfig;

use super::layers::{
    DomainAllowLayer, LayerResult, MaliciousContentLayer, PathBlockLayer, RateLimitLayer,
    SecurityLayer, ToolAdviceLayer,
};
use super::request::{
    RiskKind, RiskLevel, SecurityRequest, SecurityRequestKind, SecurityResponse, SecurityRisk,
};

/// One line of the audit trail, recorded per validated request.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: SecurityRequestKind,
    pub tool_name: Option<String>,
    pub source: String,
    pub allowed: bool,
    pub risk_count: usize,
    pub highest_risk: Option<RiskLevel>,
}

/// Final pipeline stage: summarizes accumulated risks and builds the
/// audit entry. Never denies.
pub struct AuditAggregationLayer;

impl AuditAggregationLayer {
    pub fn name(&self) -> &'static str {
        "audit_aggregation"
    }

    fn finalize(&self, request: &SecurityRequest, response: &mut SecurityResponse) -> AuditEntry {
        let highest = response.highest_risk();
        if let Some(level) = highest {
            if response.allowed {
                response.warnings.push(format!(
                    "{} risk(s) noted, highest severity {:?}",
                    response.risks.len(),
                    level
                ));
            }
        }

        AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: request.kind,
            tool_name: request.tool_name.clone(),
            source: request.source.clone(),
            allowed: response.allowed,
            risk_count: response.risks.len(),
            highest_risk: highest,
        }
    }
}

fn malformed_reason(request: &SecurityRequest) -> Option<String> {
    if request.source.trim().is_empty() {
        return Some("request source is empty".to_string());
    }

    let missing_target = request
        .target
        .as_deref()
        .map(|t| t.trim().is_empty())
        .unwrap_or(true);

    match request.kind {
        SecurityRequestKind::ToolExecution => {
            let missing_tool = request
                .tool_name
                .as_deref()
                .map(|t| t.trim().is_empty())
                .unwrap_or(true);
            missing_tool.then(|| "tool execution request without a tool name".to_string())
        }
        SecurityRequestKind::FileAccess => {
            missing_target.then(|| "file access request without a path".to_string())
        }
        SecurityRequestKind::NetworkRequest => {
            missing_target.then(|| "network request without a URL".to_string())
        }
        SecurityRequestKind::ContentInjection => {
            request.target.is_none().then(|| "content injection request without content".to_string())
        }
    }
}

/// The security pipeline. Construct once and share; all methods take
/// `&self`.
pub struct SecurityValidator {
    config: SecurityConfig,
    layers: Vec<Box<dyn SecurityLayer>>,
    aggregation: AuditAggregationLayer,
    audit_log: Mutex<Vec<AuditEntry>>,
}

impl SecurityValidator {
    pub fn new(config: SecurityConfig) -> Self {
        let layers: Vec<Box<dyn SecurityLayer>> = vec![
            Box::new(DomainAllowLayer),
            Box::new(PathBlockLayer),
            Box::new(MaliciousContentLayer),
            Box::new(RateLimitLayer::new()),
            Box::new(ToolAdviceLayer),
        ];

        Self {
            config,
            layers,
            aggregation: AuditAggregationLayer,
            audit_log: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Pipeline layer names, in execution order.
    pub fn layer_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.layers.iter().map(|l| l.name()).collect();
        names.push(self.aggregation.name());
        names
    }

    /// Validate one request. Always returns a response and always records
    /// exactly one audit entry (unless audit logging is off).
    pub fn validate(&self, request: &SecurityRequest) -> SecurityResponse {
        if let Some(problem) = malformed_reason(request) {
            tracing::warn!(kind = ?request.kind, problem = %problem, "malformed security request");
            let mut response = SecurityResponse::deny(SecurityRisk::new(
                RiskLevel::High,
                RiskKind::InvalidRequest,
                problem,
                "unvalidated action slipping past the pipeline",
            ));
            let entry = self.aggregation.finalize(request, &mut response);
            self.push_audit(entry);
            return response;
        }

        let mut response = SecurityResponse::allow();

        if self.config.enabled {
            for layer in &self.layers {
                let result = layer.validate(request, &self.config);
                if !result.passed {
                    tracing::warn!(
                        layer = layer.name(),
                        source = %request.source,
                        "security layer denied request"
                    );
                }
                absorb(&mut response, result);
            }
        }

        let entry = self.aggregation.finalize(request, &mut response);
        self.push_audit(entry);
        response
    }

    fn push_audit(&self, entry: AuditEntry) {
        if !self.config.audit_logging {
            return;
        }
        tracing::debug!(
            source = %entry.source,
            allowed = entry.allowed,
            risk_count = entry.risk_count,
            "audit entry recorded"
        );
        self.audit_log.lock().push(entry);
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit_log.lock().clone()
    }

    pub fn clear_audit_log(&self) {
        self.audit_log.lock().clear();
    }
}

fn absorb(response: &mut SecurityResponse, result: LayerResult) {
    response.allowed &= result.passed;
    response.warnings.extend(result.warnings);
    response.risks.extend(result.risks);
    response.mitigations.extend(result.mitigations);
}
