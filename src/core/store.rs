//! Template storage seam and its in-memory implementation.

use async_trait::async_trait;
use std::path::Path;

use crate::core::loader::{load_ron_files_from_dir, LoadError};
use crate::schema::template::{PlaceholderDefinition, TemplateRecord, TemplateRef};

/// Source of template text and placeholder declarations.
///
/// Production deployments back this with their relational store; the
/// engine only ever reads through it.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Raw template text, or `None` when no template matches.
    async fn get_plain_template(&self, reference: &TemplateRef) -> anyhow::Result<Option<String>>;

    /// Placeholders declared for the template. Empty when none are declared.
    async fn get_placeholders_for_prompt_template(
        &self,
        reference: &TemplateRef,
    ) -> anyhow::Result<Vec<PlaceholderDefinition>>;
}

/// Template records held in memory, loadable from RON.
///
/// RON shape:
/// ```ron
/// [
///     (
///         id: "summarize",
///         name: "summarize",
///         category: "docs",
///         text: "Summarize {{doc}}",
///         placeholders: [(name: "doc", required: true)],
///     ),
/// ]
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    records: Vec<TemplateRecord>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, replacing any record with the same id.
    pub fn insert(&mut self, record: TemplateRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn get(&self, reference: &TemplateRef) -> Option<&TemplateRecord> {
        self.records.iter().find(|r| r.matches(reference))
    }

    pub fn records(&self) -> &[TemplateRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge another store into this one. Records from `other` override
    /// records in `self` with the same id.
    pub fn merge(&mut self, other: MemoryTemplateStore) {
        for record in other.records {
            self.insert(record);
        }
    }

    /// Parse a template library from a RON string.
    pub fn parse_ron(input: &str) -> Result<Self, LoadError> {
        let records: Vec<TemplateRecord> = ron::from_str(input)?;
        let mut store = Self::new();
        for record in records {
            store.insert(record);
        }
        Ok(store)
    }

    /// Load a template library from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Self, LoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Load every `.ron` library in a directory, later files overriding
    /// earlier ones.
    pub fn load_dir(dir: &Path) -> Result<Self, LoadError> {
        let mut store = Self::new();
        load_ron_files_from_dir(dir, |path| {
            store.merge(Self::load_from_ron(path)?);
            Ok::<(), LoadError>(())
        })?;
        Ok(store)
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn get_plain_template(&self, reference: &TemplateRef) -> anyhow::Result<Option<String>> {
        Ok(self.get(reference).map(|r| r.text.clone()))
    }

    async fn get_placeholders_for_prompt_template(
        &self,
        reference: &TemplateRef,
    ) -> anyhow::Result<Vec<PlaceholderDefinition>> {
        Ok(self
            .get(reference)
            .map(|r| r.placeholders.clone())
            .unwrap_or_default())
    }
}
