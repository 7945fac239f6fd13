//! Token-budget context compression.
//!
//! When the estimated footprint of the session context crosses the
//! configured share of the token budget, the compressor evicts the least
//! valuable research, dialogue, and reference items until the footprint
//! fits again. Protected fields (article, outline, goals, preferences) are
//! carried over untouched.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::article::{ArticleContext, DialogueEntry, ReferenceArticle, ResearchItem};

/// Default model context window in tokens.
pub const DEFAULT_TOKEN_BUDGET: usize = 128_000;

/// Share of the budget that triggers compression.
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.92;

/// Most recent dialogue turns that are never evicted.
const RECENT_DIALOGUE_KEPT: usize = 4;

/// Flat per-item overhead on top of the word estimate.
const ITEM_OVERHEAD_TOKENS: usize = 4;

/// Rough tokens-per-word average for English prose.
const TOKENS_PER_WORD: f64 = 1.3;

/// Recency decays linearly to zero over this window.
const RECENCY_WINDOW_HOURS: f64 = 24.0;

const WEIGHT_RELEVANCE: f64 = 0.5;
const WEIGHT_RECENCY: f64 = 0.3;
const WEIGHT_REFERENCES: f64 = 0.2;

/// Estimate the token count of a piece of text from its word count.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * TOKENS_PER_WORD).ceil() as usize
}

/// Estimate the full context footprint, protected fields included.
pub fn estimate_context(ctx: &ArticleContext) -> usize {
    let mut total = 0;

    if let Some(article) = &ctx.current_article {
        total += estimate_tokens(article) + ITEM_OVERHEAD_TOKENS;
    }
    if let Some(outline) = &ctx.active_outline {
        total += estimate_tokens(outline) + ITEM_OVERHEAD_TOKENS;
    }
    for goal in &ctx.writing_goals {
        total += estimate_tokens(goal) + ITEM_OVERHEAD_TOKENS;
    }
    for (key, value) in &ctx.user_preferences {
        total += estimate_tokens(key) + estimate_tokens(value) + ITEM_OVERHEAD_TOKENS;
    }
    for item in &ctx.research_material {
        total += research_cost(item);
    }
    for entry in &ctx.dialogue_history {
        total += dialogue_cost(entry);
    }
    for article in &ctx.reference_articles {
        total += reference_cost(article);
    }

    total
}

fn research_cost(item: &ResearchItem) -> usize {
    estimate_tokens(&item.topic) + estimate_tokens(&item.content) + ITEM_OVERHEAD_TOKENS
}

fn dialogue_cost(entry: &DialogueEntry) -> usize {
    estimate_tokens(&entry.content) + ITEM_OVERHEAD_TOKENS
}

fn reference_cost(article: &ReferenceArticle) -> usize {
    estimate_tokens(&article.title) + estimate_tokens(&article.content) + ITEM_OVERHEAD_TOKENS
}

fn age_hours(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds().max(0) as f64 / 3_600_000.0
}

fn recency_score(age_hours: f64) -> f64 {
    (1.0 - age_hours / RECENCY_WINDOW_HOURS).clamp(0.0, 1.0)
}

/// Report for a single compression pass.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionResult {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    /// Fraction of tokens removed, 0.0 when nothing was evicted.
    pub compression_ratio: f64,
    pub items_removed: usize,
    pub compression_time: Duration,
}

/// Running totals across all compression passes.
#[derive(Debug, Clone, Serialize)]
pub struct CompressorStats {
    pub total_compressions: u64,
    pub average_ratio: f64,
    pub average_time: Duration,
}

/// Compressed context plus the pass report.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub context: ArticleContext,
    pub result: CompressionResult,
}

#[derive(Debug, Clone, Copy)]
enum Pool {
    Research,
    Dialogue,
    Reference,
}

struct Candidate {
    pool: Pool,
    index: usize,
    score: f64,
    cost: usize,
}

/// Evicts low-value context items once the token estimate crosses the
/// threshold. Scores combine relevance, recency, and reference count;
/// dialogue is scored by recency alone.
pub struct ContextCompressor {
    token_budget: usize,
    threshold_ratio: f64,
    total_compressions: u64,
    ratio_sum: f64,
    time_sum: Duration,
}

impl Default for ContextCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextCompressor {
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_TOKEN_BUDGET, DEFAULT_THRESHOLD_RATIO)
    }

    /// Build with an explicit budget. The ratio is clamped to 0.5..=0.95 so
    /// compression can neither fire constantly nor wait for overflow.
    pub fn with_budget(token_budget: usize, threshold_ratio: f64) -> Self {
        Self {
            token_budget,
            threshold_ratio: threshold_ratio.clamp(0.5, 0.95),
            total_compressions: 0,
            ratio_sum: 0.0,
            time_sum: Duration::ZERO,
        }
    }

    /// Token count at which compression kicks in.
    pub fn threshold_tokens(&self) -> usize {
        (self.token_budget as f64 * self.threshold_ratio) as usize
    }

    pub fn should_compress(&self, ctx: &ArticleContext) -> bool {
        estimate_context(ctx) > self.threshold_tokens()
    }

    /// Run a compression pass. Under-threshold input is returned unchanged
    /// with a zero ratio.
    pub fn compress(&mut self, ctx: &ArticleContext) -> CompressionOutcome {
        let started = Instant::now();
        let original_tokens = estimate_context(ctx);
        let threshold = self.threshold_tokens();

        if original_tokens <= threshold {
            let result = CompressionResult {
                original_tokens,
                compressed_tokens: original_tokens,
                compression_ratio: 0.0,
                items_removed: 0,
                compression_time: started.elapsed(),
            };
            self.record(&result);
            return CompressionOutcome {
                context: ctx.clone(),
                result,
            };
        }

        let now = Utc::now();
        let mut candidates: Vec<Candidate> = Vec::with_capacity(ctx.evictable_len());

        for (index, item) in ctx.research_material.iter().enumerate() {
            let references = f64::from(item.reference_count.min(10)) / 10.0;
            let score = WEIGHT_RELEVANCE * item.relevance_score
                + WEIGHT_RECENCY * recency_score(age_hours(now, item.created_at))
                + WEIGHT_REFERENCES * references;
            candidates.push(Candidate {
                pool: Pool::Research,
                index,
                score,
                cost: research_cost(item),
            });
        }

        // The most recent turns stay put; only older dialogue is a candidate.
        let dialogue_cutoff = ctx.dialogue_history.len().saturating_sub(RECENT_DIALOGUE_KEPT);
        for (index, entry) in ctx.dialogue_history.iter().take(dialogue_cutoff).enumerate() {
            candidates.push(Candidate {
                pool: Pool::Dialogue,
                index,
                score: recency_score(age_hours(now, entry.timestamp)),
                cost: dialogue_cost(entry),
            });
        }

        for (index, article) in ctx.reference_articles.iter().enumerate() {
            let score = WEIGHT_RELEVANCE * article.relevance_score
                + WEIGHT_RECENCY * recency_score(age_hours(now, article.added_at));
            candidates.push(Candidate {
                pool: Pool::Reference,
                index,
                score,
                cost: reference_cost(article),
            });
        }

        candidates.sort_by(|a, b| a.score.total_cmp(&b.score));

        let mut projected = original_tokens;
        let mut evict_research: HashSet<usize> = HashSet::new();
        let mut evict_dialogue: HashSet<usize> = HashSet::new();
        let mut evict_reference: HashSet<usize> = HashSet::new();

        for candidate in &candidates {
            if projected <= threshold {
                break;
            }
            projected = projected.saturating_sub(candidate.cost);
            match candidate.pool {
                Pool::Research => evict_research.insert(candidate.index),
                Pool::Dialogue => evict_dialogue.insert(candidate.index),
                Pool::Reference => evict_reference.insert(candidate.index),
            };
        }

        let items_removed = evict_research.len() + evict_dialogue.len() + evict_reference.len();

        let mut compressed = ctx.clone();
        compressed.research_material = filter_indexed(compressed.research_material, &evict_research);
        compressed.dialogue_history = filter_indexed(compressed.dialogue_history, &evict_dialogue);
        compressed.reference_articles =
            filter_indexed(compressed.reference_articles, &evict_reference);

        let compressed_tokens = estimate_context(&compressed);
        let compression_ratio = if original_tokens > 0 {
            1.0 - compressed_tokens as f64 / original_tokens as f64
        } else {
            0.0
        };

        let result = CompressionResult {
            original_tokens,
            compressed_tokens,
            compression_ratio,
            items_removed,
            compression_time: started.elapsed(),
        };

        tracing::info!(
            original_tokens,
            compressed_tokens,
            items_removed,
            "context compressed"
        );

        self.record(&result);
        CompressionOutcome {
            context: compressed,
            result,
        }
    }

    fn record(&mut self, result: &CompressionResult) {
        self.total_compressions += 1;
        self.ratio_sum += result.compression_ratio;
        self.time_sum += result.compression_time;
    }

    pub fn stats(&self) -> CompressorStats {
        let (average_ratio, average_time) = if self.total_compressions > 0 {
            (
                self.ratio_sum / self.total_compressions as f64,
                self.time_sum.div_f64(self.total_compressions as f64),
            )
        } else {
            (0.0, Duration::ZERO)
        };

        CompressorStats {
            total_compressions: self.total_compressions,
            average_ratio,
            average_time,
        }
    }
}

fn filter_indexed<T>(items: Vec<T>, evict: &HashSet<usize>) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !evict.contains(index))
        .map(|(_, item)| item)
        .collect()
}
