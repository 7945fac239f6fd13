//! Repeated tool failure detection.
//!
//! Tracks error signatures across tool results and produces a fail-fast
//! diagnostic when the same tool keeps failing the same way, so the loop
//! does not burn iterations retrying a dead end. Any success clears the
//! counters (the agent recovered).

use std::collections::HashMap;

use crate::tools::ToolExecutionResult;

/// Identical failures tolerated before the diagnostic fires.
pub const REPEATED_FAILURE_THRESHOLD: usize = 2;

/// Per-engine failure bookkeeping.
#[derive(Debug, Default)]
pub struct FailureTracker {
    counters: HashMap<String, usize>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one tool result. Returns a diagnostic once the same
    /// tool+error signature has been seen often enough.
    pub fn observe(&mut self, tool_name: &str, result: &ToolExecutionResult) -> Option<String> {
        if result.success {
            self.counters.clear();
            return None;
        }

        let error = result.error.as_deref().unwrap_or("unknown error");
        let signature = format!(
            "{}|{}|{}",
            tool_name,
            classify_error(error),
            fingerprint(error)
        );

        let count = self
            .counters
            .entry(signature)
            .and_modify(|c| *c += 1)
            .or_insert(1);

        if *count >= REPEATED_FAILURE_THRESHOLD {
            Some(format!(
                "Stopping tool loop: '{}' failed {} times with the same '{}' error. A different approach is needed.",
                tool_name,
                *count,
                classify_error(error)
            ))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }
}

fn classify_error(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("unknown tool") {
        "unknown_tool"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "timeout"
    } else if lower.contains("canceled") || lower.contains("cancelled") {
        "canceled"
    } else if lower.contains("blocked") || lower.contains("denied") {
        "denied"
    } else if lower.contains("invalid") || lower.contains("missing field") {
        "invalid_parameters"
    } else {
        "tool_error"
    }
}

fn fingerprint(message: &str) -> String {
    let mut compact = message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    compact.make_ascii_lowercase();
    compact.chars().take(160).collect()
}
