use serde::{Deserialize, Serialize};
use std::fmt;

/// How a caller names a stored template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateRef {
    Id(String),
    Name { name: String, category: String },
}

impl TemplateRef {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn name(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self::Name {
            name: name.into(),
            category: category.into(),
        }
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id '{}'", id),
            Self::Name { name, category } => {
                write!(f, "name '{}' in category '{}'", name, category)
            }
        }
    }
}

/// A placeholder declared for a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderDefinition {
    pub name: String,
    #[serde(default, alias = "defaultValue")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl PlaceholderDefinition {
    pub fn optional(name: impl Into<String>, default_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: Some(default_value.into()),
            required: false,
        }
    }

    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: None,
            required: true,
        }
    }
}

/// A stored template together with its placeholder declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub text: String,
    #[serde(default)]
    pub placeholders: Vec<PlaceholderDefinition>,
}

impl TemplateRecord {
    pub fn matches(&self, reference: &TemplateRef) -> bool {
        match reference {
            TemplateRef::Id(id) => &self.id == id,
            TemplateRef::Name { name, category } => {
                &self.name == name && &self.category == category
            }
        }
    }
}
