//! WASM bindings for prompt-chain: powers the in-browser template playground.
//!
//! Everything crosses the boundary as JSON strings.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

use prompt_chain::core::generation::{EchoGenerator, Generator, ScriptedGenerator};
use prompt_chain::core::grammar;
use prompt_chain::core::knowledge;
use prompt_chain::core::placeholder::{self, Defaults};
use prompt_chain::core::retrieval::MemoryKnowledgeBase;
use prompt_chain::schema::template::PlaceholderDefinition;
use prompt_chain::{PromptEngine, VariableBag, VariableValue};

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------
fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

fn string_map(json: &str) -> Result<FxHashMap<String, String>, JsError> {
    if json.trim().is_empty() {
        return Ok(FxHashMap::default());
    }
    serde_json::from_str(json).map_err(|e| JsError::new(&format!("Invalid values JSON: {e}")))
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

/// Split a template into blocks. Returns a JSON array of blocks.
#[wasm_bindgen(js_name = parseBlocks)]
pub fn parse_blocks(template: &str) -> Result<String, JsError> {
    let blocks = grammar::parse_blocks(template).map_err(|e| JsError::new(&e.to_string()))?;
    to_json(&blocks)
}

/// Knowledge directives found in `text`, as a JSON array of queries.
#[wasm_bindgen(js_name = parseKnowledgebaseQueries)]
pub fn parse_knowledgebase_queries(text: &str) -> Result<String, JsError> {
    to_json(&knowledge::parse_knowledgebase_queries(text))
}

/// Placeholder names used by `text`, as a JSON array.
#[wasm_bindgen(js_name = referencedPlaceholders)]
pub fn referenced_placeholders(text: &str) -> Result<String, JsError> {
    to_json(&placeholder::referenced_placeholders(text))
}

/// Resolve placeholders in `text` from a JSON object of string values.
#[wasm_bindgen(js_name = resolvePlaceholders)]
pub fn resolve_placeholders(text: &str, values_json: &str) -> Result<String, JsError> {
    let values: VariableBag = string_map(values_json)?
        .into_iter()
        .map(|(name, value)| (name, VariableValue::Text(value)))
        .collect();
    Ok(placeholder::resolve(text, &values, &Defaults::default()))
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Run `template` without a model.
///
/// `values_json` is a JSON object of placeholder values, `replies_json` a
/// JSON array of canned replies (one per block; empty means echo) and
/// `knowledge_ron` an optional RON passage list. Returns the generation
/// result as JSON.
#[wasm_bindgen(js_name = previewTemplate)]
pub async fn preview_template(
    template: String,
    values_json: String,
    replies_json: String,
    knowledge_ron: String,
) -> Result<String, JsError> {
    let supplied = string_map(&values_json)?;
    let replies: Vec<String> = if replies_json.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&replies_json)
            .map_err(|e| JsError::new(&format!("Invalid replies JSON: {e}")))?
    };

    let generator: Arc<dyn Generator> = if replies.is_empty() {
        Arc::new(EchoGenerator::new())
    } else {
        Arc::new(ScriptedGenerator::new(replies))
    };
    let mut builder = PromptEngine::builder().with_generator(generator);
    if !knowledge_ron.trim().is_empty() {
        let base = MemoryKnowledgeBase::parse_ron(&knowledge_ron)
            .map_err(|e| JsError::new(&format!("Knowledge parse error: {e}")))?;
        builder = builder.with_knowledge(Arc::new(base));
    }
    let engine = builder
        .build()
        .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;

    let definitions: Vec<PlaceholderDefinition> = Vec::new();
    let result = engine
        .run_template(&template, &definitions, &supplied)
        .await
        .map_err(|e| JsError::new(&format!("Run error: {e}")))?;
    to_json(&result)
}
