//! Placeholder resolution: `{{name}}` substitution and required-value checks.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::core::directive::{tokenize, Token};
use crate::schema::template::PlaceholderDefinition;
use crate::schema::value::VariableBag;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("required placeholder '{0}' has no value and no default")]
    MissingRequired(String),
}

/// Declared default values, keyed by placeholder name.
pub type Defaults = FxHashMap<String, String>;

/// Collect the default values of the given definitions.
pub fn defaults_from(definitions: &[PlaceholderDefinition]) -> Defaults {
    definitions
        .iter()
        .filter_map(|d| {
            d.default_value
                .as_ref()
                .map(|value| (d.name.clone(), value.clone()))
        })
        .collect()
}

/// If a tag body is a placeholder token, return its name.
///
/// A placeholder is a single word, optionally padded with whitespace, that
/// does not start with `#` or `/` (those are directives).
pub fn placeholder_name(body: &str) -> Option<&str> {
    let name = body.trim();
    let is_word = !name.is_empty()
        && !name.starts_with('#')
        && !name.starts_with('/')
        && !name.contains(|c: char| c.is_whitespace() || c == '{' || c == '}');
    is_word.then_some(name)
}

/// Replace every placeholder token in `text`.
///
/// Lookup order: `values`, then `defaults`, then the empty string.
/// Directive tags and anything that is not a placeholder are copied through.
pub fn resolve(text: &str, values: &VariableBag, defaults: &Defaults) -> String {
    let mut out = String::with_capacity(text.len());
    for token in tokenize(text) {
        let name = match token {
            Token::Tag { body, .. } => placeholder_name(body),
            Token::Text(_) => None,
        };
        match name {
            Some(name) => {
                if let Some(value) = values.get(name) {
                    out.push_str(&value.as_prompt_text());
                } else if let Some(default) = defaults.get(name) {
                    out.push_str(default);
                }
            }
            None => out.push_str(token.raw()),
        }
    }
    out
}

/// Distinct placeholder names referenced by `text`, in first-use order.
pub fn referenced_placeholders(text: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut names = Vec::new();
    for token in tokenize(text) {
        if let Token::Tag { body, .. } = token {
            if let Some(name) = placeholder_name(body) {
                if seen.insert(name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

/// Fail on the first required placeholder that has neither a supplied
/// value nor a default.
pub fn validate_required(
    definitions: &[PlaceholderDefinition],
    supplied: &FxHashMap<String, String>,
) -> Result<(), PlaceholderError> {
    match definitions
        .iter()
        .find(|d| d.required && d.default_value.is_none() && !supplied.contains_key(&d.name))
    {
        Some(missing) => Err(PlaceholderError::MissingRequired(missing.name.clone())),
        None => Ok(()),
    }
}
