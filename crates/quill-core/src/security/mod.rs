//! Security validation pipeline
//!
//! ## Layers (fixed order)
//! - `DomainAllowLayer` - network targets against the domain allow list
//! - `PathBlockLayer` - file targets against the blocked path list
//! - `MaliciousContentLayer` - code-injection and exfiltration patterns
//! - `RateLimitLayer` - per-source token buckets
//! - `ToolAdviceLayer` - substitution advice for deprecated/raw tools
//! - `AuditAggregationLayer` - risk summary and audit entry
//!
//! Denial is a structured [`SecurityResponse`], never an error.

pub mod layers;
pub mod request;
pub mod validator;

pub use layers::{
    DomainAllowLayer, LayerAction, LayerResult, MaliciousContentLayer, PathBlockLayer,
    RateLimitLayer, SecurityLayer, ToolAdviceLayer,
};
pub use request::{
    RiskKind, RiskLevel, SecurityRequest, SecurityRequestKind, SecurityResponse, SecurityRisk,
};
pub use validator::{AuditAggregationLayer, AuditEntry, SecurityValidator};
