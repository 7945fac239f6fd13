//! Writing-session context and compression
//!
//! - `ArticleContext` - article, outline, goals, preferences, and the
//!   evictable research/dialogue/reference pools
//! - `ContextCompressor` - token-budget eviction with running stats

pub mod article;
pub mod compressor;

pub use article::{
    ArticleContext, ContextMutation, DialogueEntry, DialogueRole, ReferenceArticle, ResearchItem,
};
pub use compressor::{
    estimate_context, estimate_tokens, CompressionOutcome, CompressionResult, CompressorStats,
    ContextCompressor, DEFAULT_THRESHOLD_RATIO, DEFAULT_TOKEN_BUDGET,
};
