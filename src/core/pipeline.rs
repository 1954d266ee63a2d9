//! The top-level prompt pipeline: template reference in, generation result out.
//!
//! Looks the template up, validates required placeholders, parses the
//! blocks once and hands them to the block executor.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::core::executor::{
    BlockExecutor, ExecutionError, GenerationResult, DEFAULT_PASSAGE_SEPARATOR,
};
use crate::core::generation::Generator;
use crate::core::grammar::{parse_blocks, TemplateError};
use crate::core::loader::LoadError;
use crate::core::placeholder::{defaults_from, validate_required, PlaceholderError};
use crate::core::retrieval::{KnowledgeSource, MemoryKnowledgeBase};
use crate::core::store::{MemoryTemplateStore, TemplateStore};
use crate::schema::template::{PlaceholderDefinition, TemplateRef};
use crate::schema::value::{VariableBag, VariableValue};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("placeholder error: {0}")]
    Placeholder(#[from] PlaceholderError),
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("template not found: {0}")]
    TemplateNotFound(TemplateRef),
    #[error("template store error: {0}")]
    Store(anyhow::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("no generator configured")]
    MissingGenerator,
    #[error("no template store configured")]
    MissingStore,
}

impl From<LoadError> for PipelineError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Io(e) => PipelineError::Io(e),
            LoadError::Ron(e) => PipelineError::Ron(e),
        }
    }
}

/// A request to run a stored template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub template_ref: TemplateRef,
    #[serde(default)]
    pub users_placeholders: FxHashMap<String, String>,
}

impl GenerationRequest {
    pub fn new(template_ref: TemplateRef) -> Self {
        Self {
            template_ref,
            users_placeholders: FxHashMap::default(),
        }
    }

    /// Supply a placeholder value.
    pub fn with_placeholder(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.users_placeholders.insert(name.into(), value.into());
        self
    }
}

/// The prompt engine. Built via `PromptEngine::builder()`.
///
/// Holds only shared, read-only collaborators, so one engine can serve any
/// number of concurrent runs.
pub struct PromptEngine {
    store: Option<Arc<dyn TemplateStore>>,
    knowledge: Option<Arc<dyn KnowledgeSource>>,
    generator: Arc<dyn Generator>,
    passage_separator: String,
}

/// Builder for constructing a `PromptEngine`.
pub struct PromptEngineBuilder {
    store: Option<Arc<dyn TemplateStore>>,
    templates_paths: Vec<PathBuf>,
    knowledge: Option<Arc<dyn KnowledgeSource>>,
    knowledge_path: Option<PathBuf>,
    generator: Option<Arc<dyn Generator>>,
    passage_separator: String,
}

impl PromptEngine {
    pub fn builder() -> PromptEngineBuilder {
        PromptEngineBuilder {
            store: None,
            templates_paths: Vec::new(),
            knowledge: None,
            knowledge_path: None,
            generator: None,
            passage_separator: DEFAULT_PASSAGE_SEPARATOR.to_string(),
        }
    }

    /// Run a stored template with the caller's placeholder values.
    #[instrument(skip_all, fields(template = %request.template_ref))]
    pub async fn text_generation_by_prompt_template(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, PipelineError> {
        let store = self.store.as_deref().ok_or(PipelineError::MissingStore)?;

        let text = store
            .get_plain_template(&request.template_ref)
            .await
            .map_err(PipelineError::Store)?
            .ok_or_else(|| PipelineError::TemplateNotFound(request.template_ref.clone()))?;
        let definitions = store
            .get_placeholders_for_prompt_template(&request.template_ref)
            .await
            .map_err(PipelineError::Store)?;

        self.run_template(&text, &definitions, &request.users_placeholders)
            .await
    }

    /// Run template text directly, without a store lookup.
    pub async fn run_template(
        &self,
        text: &str,
        definitions: &[PlaceholderDefinition],
        supplied: &FxHashMap<String, String>,
    ) -> Result<GenerationResult, PipelineError> {
        validate_required(definitions, supplied)?;
        let blocks = parse_blocks(text)?;
        let defaults = defaults_from(definitions);
        let seed: VariableBag = supplied
            .iter()
            .map(|(name, value)| (name.clone(), VariableValue::Text(value.clone())))
            .collect();

        info!(blocks = blocks.len(), supplied = supplied.len(), "run started");
        let result = BlockExecutor::new(self.generator.as_ref(), &defaults)
            .with_knowledge(self.knowledge.as_deref())
            .with_passage_separator(&self.passage_separator)
            .run(&blocks, seed)
            .await?;
        info!(
            last_output = %result.last_output_var_name,
            messages = result.messages.len(),
            "run finished"
        );
        Ok(result)
    }
}

impl PromptEngineBuilder {
    /// Use an existing template store. Overrides any template files.
    pub fn with_store(mut self, store: Arc<dyn TemplateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Load every `.ron` template library in `path`.
    pub fn templates_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.templates_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Load a single `.ron` template library.
    pub fn templates_file(mut self, path: impl AsRef<Path>) -> Self {
        self.templates_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Load knowledge passages from a `.ron` file.
    pub fn knowledge_file(mut self, path: impl AsRef<Path>) -> Self {
        self.knowledge_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Text placed between passages retrieved for one directive.
    pub fn passage_separator(mut self, separator: impl Into<String>) -> Self {
        self.passage_separator = separator.into();
        self
    }

    pub fn build(self) -> Result<PromptEngine, PipelineError> {
        let generator = self.generator.ok_or(PipelineError::MissingGenerator)?;

        // Template files, later ones overriding earlier records.
        let store = match self.store {
            Some(store) => Some(store),
            None if self.templates_paths.is_empty() => None,
            None => {
                let mut merged = MemoryTemplateStore::new();
                for path in &self.templates_paths {
                    let loaded = if path.is_dir() {
                        MemoryTemplateStore::load_dir(path)?
                    } else {
                        MemoryTemplateStore::load_from_ron(path)?
                    };
                    merged.merge(loaded);
                }
                Some(Arc::new(merged) as Arc<dyn TemplateStore>)
            }
        };

        let knowledge = match (self.knowledge, self.knowledge_path) {
            (Some(knowledge), _) => Some(knowledge),
            (None, Some(path)) => {
                let base = MemoryKnowledgeBase::load_from_ron(&path)?;
                Some(Arc::new(base) as Arc<dyn KnowledgeSource>)
            }
            (None, None) => None,
        };

        Ok(PromptEngine {
            store,
            knowledge,
            generator,
            passage_separator: self.passage_separator,
        })
    }
}
