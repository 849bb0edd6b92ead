//! Candidate article topics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_CATEGORY: &str = "general";
const MAX_SLUG_LEN: usize = 48;

/// A candidate subject for an article.
///
/// Produced by an external discovery process (or from free text on the
/// command line). Treated as read-only once the board starts voting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub category: String,
    /// Ranked relevance from discovery; higher is more relevant.
    #[serde(default)]
    pub relevance: f64,
    #[serde(default)]
    pub notes: String,
}

impl Topic {
    pub fn new(id: impl Into<String>, title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: category.into(),
            relevance: 0.0,
            notes: String::new(),
        }
    }

    /// Build a topic from free text, deriving a unique slug identifier.
    pub fn from_text(text: &str, category: Option<&str>) -> Self {
        let title = text.trim();
        let slug = slugify(title);
        let suffix = Uuid::new_v4().simple().to_string();
        let id = if slug.is_empty() {
            format!("topic-{}", &suffix[..8])
        } else {
            format!("{}-{}", slug, &suffix[..8])
        };
        Self::new(id, title, category.unwrap_or(DEFAULT_CATEGORY))
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = relevance;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Lowercase ASCII slug, words joined by `-`, capped in length.
fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
            if slug.len() >= MAX_SLUG_LEN {
                break;
            }
        } else {
            pending_dash = true;
        }
    }
    slug
}
