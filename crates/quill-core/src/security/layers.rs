//! Validation layers.
//!
//! Each layer inspects one aspect of a [`SecurityRequest`] and returns an
//! independent verdict; the validator runs every layer and aggregates. The
//! first five layers live here; aggregation and audit sit with the
//! validator itself.

use std::collections::HashMap;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::SecurityConfig;

use super::request::{RiskKind, RiskLevel, SecurityRequest, SecurityRequestKind, SecurityRisk};

/// What a layer wants done with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerAction {
    Allow,
    Warn,
    Sanitize,
    Deny,
}

/// Verdict of a single layer.
#[derive(Debug, Clone)]
pub struct LayerResult {
    pub passed: bool,
    pub action: LayerAction,
    pub warnings: Vec<String>,
    pub risks: Vec<SecurityRisk>,
    pub mitigations: Vec<String>,
}

impl LayerResult {
    pub fn allow() -> Self {
        Self {
            passed: true,
            action: LayerAction::Allow,
            warnings: Vec::new(),
            risks: Vec::new(),
            mitigations: Vec::new(),
        }
    }

    pub fn warn(warning: impl Into<String>) -> Self {
        Self {
            passed: true,
            action: LayerAction::Warn,
            warnings: vec![warning.into()],
            risks: Vec::new(),
            mitigations: Vec::new(),
        }
    }

    pub fn deny(risk: SecurityRisk) -> Self {
        Self {
            passed: false,
            action: LayerAction::Deny,
            warnings: Vec::new(),
            risks: vec![risk],
            mitigations: Vec::new(),
        }
    }

    pub fn with_mitigation(mut self, mitigation: impl Into<String>) -> Self {
        self.mitigations.push(mitigation.into());
        self
    }
}

/// A single validation layer. Layers are synchronous and side-effect free
/// apart from their own bookkeeping (rate buckets).
pub trait SecurityLayer: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, request: &SecurityRequest, config: &SecurityConfig) -> LayerResult;
}

// ── Layer 1: domain allow-list ─────────────────────────────────────────

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>\\]+"#).unwrap());

fn extract_host(raw: &str) -> Option<String> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    Url::parse(&candidate)
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}

fn domain_allowed(host: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|domain| {
        let domain = domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

/// Tools whose input parameters become network destinations. Editor and
/// file tools can mention URLs freely (citations in article text).
fn network_capable_tool(tool: &str) -> bool {
    matches!(tool, "web_fetch" | "web_search" | "shell" | "fetch" | "http_get")
}

/// Denies network targets whose host is not on the configured allow list.
/// Embedded URLs in tool inputs are only checked for network-capable
/// tools; prose handed to an editor tool may cite any URL.
pub struct DomainAllowLayer;

impl SecurityLayer for DomainAllowLayer {
    fn name(&self) -> &'static str {
        "domain_allow"
    }

    fn validate(&self, request: &SecurityRequest, config: &SecurityConfig) -> LayerResult {
        let mut hosts = Vec::new();

        if request.kind == SecurityRequestKind::NetworkRequest {
            if let Some(target) = &request.target {
                match extract_host(target) {
                    Some(host) => hosts.push(host),
                    None => {
                        return LayerResult::deny(SecurityRisk::new(
                            RiskLevel::High,
                            RiskKind::NetworkAccess,
                            format!("network target '{}' is not a parseable URL", target),
                            "request to an unvalidated network destination",
                        ));
                    }
                }
            }
        }

        let scans_input = request.kind == SecurityRequestKind::ToolExecution
            && request
                .tool_name
                .as_deref()
                .is_some_and(network_capable_tool);
        if scans_input {
            if let Some(input) = &request.input {
                let rendered = input.to_string();
                for found in URL_PATTERN.find_iter(&rendered) {
                    if let Some(host) = extract_host(found.as_str()) {
                        hosts.push(host);
                    }
                }
            }
        }

        for host in hosts {
            if !domain_allowed(&host, &config.allowed_domains) {
                return LayerResult::deny(SecurityRisk::new(
                    RiskLevel::High,
                    RiskKind::NetworkAccess,
                    format!("domain '{}' is not on the allow list", host),
                    "data exfiltration to an unapproved host",
                ))
                .with_mitigation(format!(
                    "add '{}' to allowedDomains or fetch from an approved source",
                    host
                ));
            }
        }

        LayerResult::allow()
    }
}

// ── Layer 2: path block-list ───────────────────────────────────────────

fn collect_path_fields(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let key = key.to_ascii_lowercase();
                if let Value::String(s) = nested {
                    if key.contains("path") || key == "file" || key == "directory" || key == "dest"
                    {
                        out.push(s.clone());
                    }
                }
                collect_path_fields(nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_path_fields(item, out);
            }
        }
        _ => {}
    }
}

fn blocked_prefix<'a>(path: &str, blocked: &'a [String]) -> Option<&'a str> {
    blocked.iter().map(String::as_str).find(|entry| {
        if entry.starts_with('/') || entry.starts_with('~') {
            path.starts_with(entry)
        } else if entry.contains('/') {
            path.contains(entry)
        } else {
            // Bare names match whole path components only, so `.env`
            // blocks `config/.env` but not `development.env`.
            path.split('/').any(|component| component == *entry)
        }
    })
}

/// Denies file targets under any blocked prefix, including path fields
/// buried in tool inputs.
pub struct PathBlockLayer;

impl SecurityLayer for PathBlockLayer {
    fn name(&self) -> &'static str {
        "path_block"
    }

    fn validate(&self, request: &SecurityRequest, config: &SecurityConfig) -> LayerResult {
        let mut paths = Vec::new();

        if request.kind == SecurityRequestKind::FileAccess {
            if let Some(target) = &request.target {
                paths.push(target.clone());
            }
        }
        if let Some(input) = &request.input {
            collect_path_fields(input, &mut paths);
        }

        for path in &paths {
            if let Some(entry) = blocked_prefix(path, &config.blocked_paths) {
                return LayerResult::deny(SecurityRisk::new(
                    RiskLevel::High,
                    RiskKind::FileAccess,
                    format!("path '{}' matches blocked entry '{}'", path, entry),
                    "exposure of system or credential files",
                ))
                .with_mitigation("work inside the workspace or request an explicit override");
            }
        }

        LayerResult::allow()
    }
}

// ── Layer 3: malicious content ─────────────────────────────────────────

static EVAL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\beval\s*\(").unwrap());
static DYNAMIC_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bnew\s+Function\s*\(|\bexec(Sync)?\s*\(").unwrap());
static PROCESS_SPAWN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)child_process|subprocess\.(run|call|Popen)|os\.system\s*\(").unwrap());
static SECRET_ENV_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)process\.env\.\w*(key|secret|token|password)\w*").unwrap());
static DECODE_EXEC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)eval\s*\(\s*atob|base64\s+(-d|--decode)[^|]*\|\s*(sh|bash)").unwrap()
});
static NETWORK_PIPE_TO_SHELL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(curl|wget)\b[^|]*\|\s*(sh|bash)\b").unwrap());
static DESTRUCTIVE_RM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\brm\s+-(?:[a-z]*r[a-z]*f|[a-z]*f[a-z]*r)").unwrap());

fn malicious_reason(text: &str) -> Option<(RiskLevel, &'static str, &'static str)> {
    if EVAL_PATTERN.is_match(text) && SECRET_ENV_PATTERN.is_match(text) {
        return Some((
            RiskLevel::Critical,
            "dynamic eval over environment secrets",
            "credential disclosure through executed code",
        ));
    }
    if EVAL_PATTERN.is_match(text) {
        return Some((
            RiskLevel::High,
            "dynamic eval of runtime input",
            "arbitrary code execution",
        ));
    }
    if DYNAMIC_CODE_PATTERN.is_match(text) {
        return Some((
            RiskLevel::High,
            "dynamic code construction",
            "arbitrary code execution",
        ));
    }
    if PROCESS_SPAWN_PATTERN.is_match(text) {
        return Some((
            RiskLevel::High,
            "process spawning from request content",
            "uncontrolled process execution",
        ));
    }
    if SECRET_ENV_PATTERN.is_match(text) {
        return Some((
            RiskLevel::High,
            "environment secret access",
            "credential disclosure",
        ));
    }
    if DECODE_EXEC_PATTERN.is_match(text) {
        return Some((
            RiskLevel::High,
            "decode-and-execute chain",
            "obfuscated code execution",
        ));
    }
    if NETWORK_PIPE_TO_SHELL_PATTERN.is_match(text) {
        return Some((
            RiskLevel::High,
            "network script piped to shell",
            "remote code execution",
        ));
    }
    if DESTRUCTIVE_RM_PATTERN.is_match(text) {
        return Some((
            RiskLevel::High,
            "destructive recursive delete",
            "irreversible loss of workspace files",
        ));
    }
    None
}

/// Scans request content for code-injection and exfiltration patterns.
pub struct MaliciousContentLayer;

impl SecurityLayer for MaliciousContentLayer {
    fn name(&self) -> &'static str {
        "malicious_content"
    }

    fn validate(&self, request: &SecurityRequest, config: &SecurityConfig) -> LayerResult {
        if !config.malicious_detection {
            return LayerResult::allow();
        }
        if request.kind == SecurityRequestKind::ContentInjection && !config.content_filter {
            return LayerResult::allow();
        }

        let mut text = String::new();
        if let Some(target) = &request.target {
            text.push_str(target);
            text.push('\n');
        }
        if let Some(input) = &request.input {
            text.push_str(&input.to_string());
        }
        if text.is_empty() {
            return LayerResult::allow();
        }

        match malicious_reason(&text) {
            Some((level, reason, impact)) => {
                tracing::warn!(
                    source = %request.source,
                    reason,
                    "malicious pattern detected"
                );
                LayerResult::deny(SecurityRisk::new(
                    level,
                    RiskKind::MaliciousCode,
                    reason,
                    impact,
                ))
                .with_mitigation("remove the flagged construct before retrying")
            }
            None => LayerResult::allow(),
        }
    }
}

// ── Layer 4: rate limiting ─────────────────────────────────────────────

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-source token bucket. Burst size caps the bucket; refill rate comes
/// from `requestsPerMinute`. Zero requests per minute disables the layer.
pub struct RateLimitLayer {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl Default for RateLimitLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitLayer {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl SecurityLayer for RateLimitLayer {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn validate(&self, request: &SecurityRequest, config: &SecurityConfig) -> LayerResult {
        let settings = &config.rate_limiting;
        if settings.requests_per_minute == 0 {
            return LayerResult::allow();
        }

        let per_second = f64::from(settings.requests_per_minute) / 60.0;
        let burst = f64::from(settings.burst_limit.max(1));
        let now = Instant::now();

        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(request.source.clone())
            .or_insert(TokenBucket {
                tokens: burst,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * per_second).min(burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            LayerResult::allow()
        } else {
            LayerResult::deny(SecurityRisk::new(
                RiskLevel::Medium,
                RiskKind::RateLimit,
                format!("rate limit exceeded for source '{}'", request.source),
                "resource exhaustion of downstream services",
            ))
            .with_mitigation("back off and retry after a few seconds")
        }
    }
}

// ── Layer 5: tool substitution advice ──────────────────────────────────

fn deprecated_replacement(tool: &str) -> Option<&'static str> {
    match tool {
        "bash" | "exec" | "run_command" => Some("shell"),
        "fetch" | "http_get" => Some("web_fetch"),
        "search" => Some("web_search"),
        _ => None,
    }
}

fn shell_advice(command: &str) -> Option<&'static str> {
    let trimmed = command.trim_start();
    if trimmed.starts_with("grep ") || trimmed.contains("| grep ") {
        return Some("search_files handles pattern search without a shell round-trip");
    }
    if trimmed.starts_with("cat ") {
        return Some("read_file returns file contents directly");
    }
    if trimmed.starts_with("curl ") || trimmed.starts_with("wget ") {
        return Some("web_fetch performs validated fetches");
    }
    None
}

/// Advises sanctioned substitutes for deprecated tool names and raw shell
/// usage. Never denies.
pub struct ToolAdviceLayer;

impl SecurityLayer for ToolAdviceLayer {
    fn name(&self) -> &'static str {
        "tool_advice"
    }

    fn validate(&self, request: &SecurityRequest, _config: &SecurityConfig) -> LayerResult {
        if request.kind != SecurityRequestKind::ToolExecution {
            return LayerResult::allow();
        }
        let Some(tool) = request.tool_name.as_deref() else {
            return LayerResult::allow();
        };

        if let Some(replacement) = deprecated_replacement(tool) {
            return LayerResult::warn(format!(
                "tool '{}' is deprecated, use '{}' instead",
                tool, replacement
            ))
            .with_mitigation(format!("switch to the '{}' tool", replacement));
        }

        if tool == "shell" {
            let command = request
                .input
                .as_ref()
                .and_then(|v| v.get("command"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if let Some(advice) = shell_advice(command) {
                return LayerResult::warn(advice).with_mitigation(advice);
            }
        }

        LayerResult::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> SecurityConfig {
        SecurityConfig::default()
    }

    #[test]
    fn test_domain_layer_allows_listed_and_subdomains() {
        let layer = DomainAllowLayer;
        let cfg = config();

        let req = SecurityRequest::network_request("https://wikipedia.org/wiki/Rust", "agent");
        assert!(layer.validate(&req, &cfg).passed);

        let req = SecurityRequest::network_request("https://en.wikipedia.org/wiki/Rust", "agent");
        assert!(layer.validate(&req, &cfg).passed);
    }

    #[test]
    fn test_domain_layer_denies_unlisted_host() {
        let layer = DomainAllowLayer;
        let result = layer.validate(
            &SecurityRequest::network_request("https://evil.example.net/payload", "agent"),
            &config(),
        );

        assert!(!result.passed);
        assert_eq!(result.action, LayerAction::Deny);
        assert_eq!(result.risks[0].kind, RiskKind::NetworkAccess);
        assert!(result.risks[0].impact.contains("exfiltration"));
    }

    #[test]
    fn test_domain_layer_scans_network_tool_input_urls() {
        let layer = DomainAllowLayer;
        let req = SecurityRequest::tool_execution(
            "web_fetch",
            json!({"url": "https://sketchy.example.io/x"}),
            "agent",
        );

        let result = layer.validate(&req, &config());
        assert!(!result.passed);
    }

    #[test]
    fn test_domain_layer_ignores_citation_urls_in_editor_input() {
        let layer = DomainAllowLayer;
        let req = SecurityRequest::tool_execution(
            "edit_article",
            json!({
                "path": "drafts/article.md",
                "content": "According to https://www.nytimes.com/2026/tech-report, usage grew."
            }),
            "agent",
        );

        let result = layer.validate(&req, &config());
        assert!(result.passed);
        assert_eq!(result.action, LayerAction::Allow);
    }

    #[test]
    fn test_path_layer_blocks_prefixes_and_input_fields() {
        let layer = PathBlockLayer;
        let cfg = config();

        let result = layer.validate(&SecurityRequest::file_access("/etc/passwd", "tool"), &cfg);
        assert!(!result.passed);
        assert_eq!(result.risks[0].kind, RiskKind::FileAccess);
        assert!(!result.risks[0].impact.is_empty());

        let result = layer.validate(&SecurityRequest::file_access("~/.ssh/id_rsa", "tool"), &cfg);
        assert!(!result.passed);

        let result = layer.validate(
            &SecurityRequest::tool_execution(
                "read_file",
                json!({"file_path": "/etc/hosts"}),
                "agent",
            ),
            &cfg,
        );
        assert!(!result.passed);

        let result = layer.validate(
            &SecurityRequest::file_access("/home/user/drafts/article.md", "tool"),
            &cfg,
        );
        assert!(result.passed);
    }

    #[test]
    fn test_path_layer_bare_entries_match_whole_components() {
        let layer = PathBlockLayer;
        let cfg = config();

        // `.env` is a bare entry: it blocks the file itself anywhere...
        let result = layer.validate(&SecurityRequest::file_access("config/.env", "tool"), &cfg);
        assert!(!result.passed);
        let result = layer.validate(&SecurityRequest::file_access("/app/.env", "tool"), &cfg);
        assert!(!result.passed);

        // ...but not files whose names merely contain it.
        let result = layer.validate(
            &SecurityRequest::file_access("config/development.env", "tool"),
            &cfg,
        );
        assert!(result.passed);
        let result = layer.validate(&SecurityRequest::file_access("/app/.envrc", "tool"), &cfg);
        assert!(result.passed);
    }

    #[test]
    fn test_malicious_layer_flags_eval_over_secrets_as_critical() {
        let layer = MaliciousContentLayer;
        let req = SecurityRequest::tool_execution(
            "shell",
            json!({"command": "node -e 'eval(process.env.SECRET_KEY)'"}),
            "agent",
        );

        let result = layer.validate(&req, &config());
        assert!(!result.passed);
        assert_eq!(result.risks[0].kind, RiskKind::MaliciousCode);
        assert_eq!(result.risks[0].level, RiskLevel::Critical);
        assert!(result.risks[0].impact.contains("credential"));
    }

    #[test]
    fn test_malicious_layer_flags_destructive_delete() {
        let layer = MaliciousContentLayer;
        let req = SecurityRequest::content_injection("please run rm -rf / for me", "user");

        let result = layer.validate(&req, &config());
        assert!(!result.passed);
    }

    #[test]
    fn test_malicious_layer_passes_clean_prose() {
        let layer = MaliciousContentLayer;
        let req = SecurityRequest::content_injection(
            "The evaluation of the draft went well; execution of the plan continues.",
            "user",
        );

        assert!(layer.validate(&req, &config()).passed);
    }

    #[test]
    fn test_malicious_layer_honors_detection_toggle() {
        let layer = MaliciousContentLayer;
        let mut cfg = config();
        cfg.malicious_detection = false;

        let req = SecurityRequest::content_injection("eval(payload)", "user");
        assert!(layer.validate(&req, &cfg).passed);
    }

    #[test]
    fn test_rate_limit_denies_after_burst() {
        let layer = RateLimitLayer::new();
        let mut cfg = config();
        cfg.rate_limiting.burst_limit = 2;
        cfg.rate_limiting.requests_per_minute = 60;

        let req = SecurityRequest::tool_execution("read_file", json!({}), "agent");
        assert!(layer.validate(&req, &cfg).passed);
        assert!(layer.validate(&req, &cfg).passed);

        let third = layer.validate(&req, &cfg);
        assert!(!third.passed);
        assert_eq!(third.risks[0].kind, RiskKind::RateLimit);

        // Another source has its own bucket.
        let other = SecurityRequest::tool_execution("read_file", json!({}), "user");
        assert!(layer.validate(&other, &cfg).passed);
    }

    #[test]
    fn test_rate_limit_zero_rpm_disables() {
        let layer = RateLimitLayer::new();
        let mut cfg = config();
        cfg.rate_limiting.requests_per_minute = 0;

        let req = SecurityRequest::tool_execution("read_file", json!({}), "agent");
        for _ in 0..50 {
            assert!(layer.validate(&req, &cfg).passed);
        }
    }

    #[test]
    fn test_advice_layer_warns_without_denying() {
        let layer = ToolAdviceLayer;
        let cfg = config();

        let result = layer.validate(
            &SecurityRequest::tool_execution("bash", json!({"command": "ls"}), "agent"),
            &cfg,
        );
        assert!(result.passed);
        assert_eq!(result.action, LayerAction::Warn);
        assert!(result.warnings[0].contains("shell"));

        let result = layer.validate(
            &SecurityRequest::tool_execution(
                "shell",
                json!({"command": "grep intro drafts/article.md"}),
                "agent",
            ),
            &cfg,
        );
        assert!(result.passed);
        assert!(!result.warnings.is_empty());

        let result = layer.validate(
            &SecurityRequest::tool_execution("read_file", json!({"path": "a.md"}), "agent"),
            &cfg,
        );
        assert_eq!(result.action, LayerAction::Allow);
    }
}
