//! Knowledge retrieval seam and an in-memory, exact-match knowledge base.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::loader::LoadError;
use crate::schema::knowledge::KnowledgeFilters;

/// Resolves knowledge-directive filters into passage text.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Passages matching `filters`, in the order they should be inserted.
    async fn lookup(&self, filters: &KnowledgeFilters) -> anyhow::Result<Vec<String>>;
}

/// A stored knowledge passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category1: String,
    #[serde(default)]
    pub category2: String,
    #[serde(default)]
    pub category3: String,
    pub text: String,
}

impl Passage {
    /// True when every present filter lists this passage's value.
    pub fn matches(&self, filters: &KnowledgeFilters) -> bool {
        field_matches(&filters.id, &self.id)
            && field_matches(&filters.category1, &self.category1)
            && field_matches(&filters.category2, &self.category2)
            && field_matches(&filters.category3, &self.category3)
            && field_matches(&filters.names, &self.name)
    }
}

fn field_matches(filter: &Option<Vec<String>>, value: &str) -> bool {
    match filter {
        Some(allowed) => allowed.iter().any(|a| a == value),
        None => true,
    }
}

/// Passages held in memory. Lookup is a plain filter in insertion order;
/// nothing is ranked.
#[derive(Debug, Clone, Default)]
pub struct MemoryKnowledgeBase {
    passages: Vec<Passage>,
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, passage: Passage) {
        self.passages.push(passage);
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Text of every matching passage.
    pub fn find(&self, filters: &KnowledgeFilters) -> Vec<String> {
        self.passages
            .iter()
            .filter(|p| p.matches(filters))
            .map(|p| p.text.clone())
            .collect()
    }

    /// Parse a list of passages from a RON string.
    pub fn parse_ron(input: &str) -> Result<Self, LoadError> {
        let passages: Vec<Passage> = ron::from_str(input)?;
        Ok(Self { passages })
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, LoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }
}

#[async_trait]
impl KnowledgeSource for MemoryKnowledgeBase {
    async fn lookup(&self, filters: &KnowledgeFilters) -> anyhow::Result<Vec<String>> {
        Ok(self.find(filters))
    }
}
