//! Prompt Chain: template-driven orchestration of chained language-model calls.
//!
//! A single authored template is split into ordered blocks at
//! `{{#break ...}}` directives. Each block has its placeholders and
//! `{{#knowledgebase ...}}` directives resolved, is sent to a generation
//! service together with the conversation so far, and has the reply captured
//! into a named variable.

pub mod core;
pub mod schema;

pub use crate::core::executor::{BlockTrace, GenerationResult};
pub use crate::core::generation::{generator_fn, EchoGenerator, Generator, ScriptedGenerator};
pub use crate::core::pipeline::{GenerationRequest, PipelineError, PromptEngine};
pub use crate::core::retrieval::{KnowledgeSource, MemoryKnowledgeBase};
pub use crate::core::store::{MemoryTemplateStore, TemplateStore};
pub use crate::schema::message::{Message, Role};
pub use crate::schema::template::{PlaceholderDefinition, TemplateRef};
pub use crate::schema::value::{VariableBag, VariableValue};
