use serde::{Deserialize, Serialize};

/// Name given to the implicit block that closes every template.
pub const DEFAULT_OUTPUT_VAR: &str = "output";

/// How a block's reply is stored in the variable bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// Raw reply text.
    #[default]
    Text,
    /// Reply parsed as JSON.
    Json,
}

impl OutputType {
    /// Parse the value of an `output_type=` attribute.
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// One ordered execution segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Unresolved block text, verbatim from the template.
    pub template: String,
    pub output_var_name: String,
    pub forget: bool,
    pub output_type: OutputType,
}

impl Block {
    /// The implicit trailing block: `output`, kept, plain text.
    pub fn trailing(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            output_var_name: DEFAULT_OUTPUT_VAR.to_string(),
            forget: false,
            output_type: OutputType::Text,
        }
    }
}
