//! Writing-session context.
//!
//! `ArticleContext` holds everything the assistant knows about the current
//! writing session. The article, outline, goals, and preferences are
//! protected state and survive compression untouched; research, dialogue,
//! and reference pools are evictable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker role in the dialogue history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueRole {
    User,
    Assistant,
    System,
}

/// A research note gathered for the current piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchItem {
    pub id: String,
    pub topic: String,
    pub content: String,
    /// How relevant this note is to the piece, 0.0 to 1.0.
    pub relevance_score: f64,
    /// Times the note has been pulled into a draft or answer.
    pub reference_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ResearchItem {
    pub fn new(topic: impl Into<String>, content: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            content: content.into(),
            relevance_score: relevance_score.clamp(0.0, 1.0),
            reference_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// One turn of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueEntry {
    pub role: DialogueRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl DialogueEntry {
    pub fn new(role: DialogueRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A published article kept around for style or factual reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceArticle {
    pub title: String,
    pub content: String,
    pub relevance_score: f64,
    pub added_at: DateTime<Utc>,
}

/// Mutations applied to the context through `ContextUpdate` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextMutation {
    SetArticle { content: String },
    SetOutline { outline: String },
    SetGoals { goals: Vec<String> },
    SetPreference { key: String, value: String },
    AddResearch { item: ResearchItem },
    AddDialogue { entry: DialogueEntry },
    AddReference { article: ReferenceArticle },
}

/// Full session context. Owned and mutated by the engine; everyone else
/// sees snapshots.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArticleContext {
    // Protected: carried through compression byte for byte.
    pub current_article: Option<String>,
    pub active_outline: Option<String>,
    pub writing_goals: Vec<String>,
    pub user_preferences: HashMap<String, String>,

    // Evictable pools.
    pub research_material: Vec<ResearchItem>,
    pub dialogue_history: Vec<DialogueEntry>,
    pub reference_articles: Vec<ReferenceArticle>,
}

impl ArticleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single mutation.
    pub fn apply(&mut self, mutation: ContextMutation) {
        match mutation {
            ContextMutation::SetArticle { content } => {
                self.current_article = Some(content);
            }
            ContextMutation::SetOutline { outline } => {
                self.active_outline = Some(outline);
            }
            ContextMutation::SetGoals { goals } => {
                self.writing_goals = goals;
            }
            ContextMutation::SetPreference { key, value } => {
                self.user_preferences.insert(key, value);
            }
            ContextMutation::AddResearch { item } => {
                self.research_material.push(item);
            }
            ContextMutation::AddDialogue { entry } => {
                self.dialogue_history.push(entry);
            }
            ContextMutation::AddReference { article } => {
                self.reference_articles.push(article);
            }
        }
    }

    pub fn add_dialogue(&mut self, role: DialogueRole, content: impl Into<String>) {
        self.dialogue_history.push(DialogueEntry::new(role, content));
    }

    /// Bump a research note's reference count. Returns false when the id
    /// is unknown.
    pub fn mark_referenced(&mut self, research_id: &str) -> bool {
        match self
            .research_material
            .iter_mut()
            .find(|item| item.id == research_id)
        {
            Some(item) => {
                item.reference_count += 1;
                true
            }
            None => false,
        }
    }

    /// Count of evictable items across all pools.
    pub fn evictable_len(&self) -> usize {
        self.research_material.len() + self.dialogue_history.len() + self.reference_articles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_mutations() {
        let mut ctx = ArticleContext::new();

        ctx.apply(ContextMutation::SetArticle {
            content: "Draft one".into(),
        });
        ctx.apply(ContextMutation::SetGoals {
            goals: vec!["clarity".into(), "800 words".into()],
        });
        ctx.apply(ContextMutation::SetPreference {
            key: "tone".into(),
            value: "conversational".into(),
        });
        ctx.apply(ContextMutation::AddResearch {
            item: ResearchItem::new("rust queues", "notes", 0.8),
        });

        assert_eq!(ctx.current_article.as_deref(), Some("Draft one"));
        assert_eq!(ctx.writing_goals.len(), 2);
        assert_eq!(ctx.user_preferences.get("tone").unwrap(), "conversational");
        assert_eq!(ctx.research_material.len(), 1);
    }

    #[test]
    fn test_relevance_is_clamped() {
        let item = ResearchItem::new("t", "c", 7.5);
        assert_eq!(item.relevance_score, 1.0);

        let item = ResearchItem::new("t", "c", -0.5);
        assert_eq!(item.relevance_score, 0.0);
    }

    #[test]
    fn test_mark_referenced() {
        let mut ctx = ArticleContext::new();
        let item = ResearchItem::new("sources", "notes", 0.5);
        let id = item.id.clone();
        ctx.apply(ContextMutation::AddResearch { item });

        assert!(ctx.mark_referenced(&id));
        assert!(ctx.mark_referenced(&id));
        assert_eq!(ctx.research_material[0].reference_count, 2);
        assert!(!ctx.mark_referenced("missing"));
    }
}
