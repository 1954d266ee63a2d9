use serde::{Deserialize, Serialize};

/// Filters handed to the knowledge collaborator. `None` means the
/// attribute was absent from the directive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category1: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category2: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category3: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
}

impl KnowledgeFilters {
    /// True when no attribute was recognized at all.
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.category1.is_none()
            && self.category2.is_none()
            && self.category3.is_none()
            && self.names.is_none()
    }
}

/// One `{{#knowledgebase ...}}` occurrence found in block text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeQuery {
    /// The exact directive text, replaced in place after retrieval.
    pub full_match: String,
    #[serde(flatten)]
    pub filters: KnowledgeFilters,
}
