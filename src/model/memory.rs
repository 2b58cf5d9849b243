//! Memory entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored user memory, as read from the memory store.
///
/// Only `content`, `category`, and `manually_added` matter to the mentor;
/// the rest is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub category: MemoryCategory,
    #[serde(default)]
    pub manually_added: bool,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user_review: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_visibility() -> String {
    "private".to_string()
}

impl Memory {
    /// A generated memory with the given content and defaults elsewhere.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            category: MemoryCategory::default(),
            manually_added: false,
            visibility: default_visibility(),
            tags: Vec::new(),
            user_review: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn manual(mut self) -> Self {
        self.manually_added = true;
        self.category = MemoryCategory::Manual;
        self
    }

    pub fn category(mut self, category: MemoryCategory) -> Self {
        self.category = category;
        self
    }
}

/// Canonical memory categories.
///
/// The store still holds historical labels; they are folded into this set
/// when read. Unknown labels become `System`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum MemoryCategory {
    #[default]
    System,
    Interesting,
    Manual,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Interesting => "interesting",
            Self::Manual => "manual",
        }
    }

    /// Map a stored label, canonical or legacy, onto the canonical set.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "interesting" | "hobbies" | "lifestyle" | "interests" | "skills" | "learnings" => {
                Self::Interesting
            }
            "manual" => Self::Manual,
            // system, core, habits, work, other, and anything unrecognized
            _ => Self::System,
        }
    }
}

impl From<String> for MemoryCategory {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_labels_fold_into_canonical_set() {
        assert_eq!(MemoryCategory::from_label("core"), MemoryCategory::System);
        assert_eq!(MemoryCategory::from_label("hobbies"), MemoryCategory::Interesting);
        assert_eq!(MemoryCategory::from_label("Lifestyle"), MemoryCategory::Interesting);
        assert_eq!(MemoryCategory::from_label("work"), MemoryCategory::System);
        assert_eq!(MemoryCategory::from_label("manual"), MemoryCategory::Manual);
        assert_eq!(MemoryCategory::from_label("no-such-thing"), MemoryCategory::System);
    }

    #[test]
    fn deserializes_legacy_label_from_store_payload() {
        let memory: Memory = serde_json::from_str(
            r#"{"content": "Plays chess on weekends", "category": "hobbies", "manually_added": false}"#,
        )
        .unwrap();
        assert_eq!(memory.category, MemoryCategory::Interesting);
        assert_eq!(memory.visibility, "private");

        let round = serde_json::to_value(&memory).unwrap();
        assert_eq!(round["category"], "interesting");
    }
}
