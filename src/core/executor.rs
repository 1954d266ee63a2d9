//! Block executor: runs parsed blocks in order against the collaborators.
//!
//! Per block: resolve placeholders, splice in retrieved knowledge, build the
//! block's messages, call the generator with the conversation so far,
//! capture and coerce the reply, then drop the block's messages from the
//! transcript when the block is marked `forget`.

use anyhow::anyhow;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::generation::Generator;
use crate::core::knowledge::{split_knowledge, KnowledgeSegment};
use crate::core::placeholder::{resolve, Defaults};
use crate::core::retrieval::KnowledgeSource;
use crate::core::roles::block_messages;
use crate::schema::block::{Block, OutputType};
use crate::schema::knowledge::KnowledgeQuery;
use crate::schema::message::Message;
use crate::schema::value::{VariableBag, VariableValue};

/// Separator placed between passages returned for one directive.
pub const DEFAULT_PASSAGE_SEPARATOR: &str = "\n";

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("knowledge retrieval failed for {directive}: {source}")]
    Retrieval {
        directive: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("generation failed for block '{output}': {source}")]
    Generation {
        output: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("reply for block '{output}' is not valid JSON: {source}")]
    Coercion {
        output: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("template produced no blocks")]
    NoBlocks,
}

/// Everything one block contributed to the conversation, kept even when
/// the block was forgotten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTrace {
    pub output_var_name: String,
    pub forget: bool,
    pub output_type: OutputType,
    /// Request messages followed by the assistant reply.
    pub messages: Vec<Message>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub responses: VariableBag,
    pub last_output_var_name: String,
    /// Persisted transcript: forgotten blocks are absent.
    pub messages: Vec<Message>,
    /// Full execution trace, one entry per block.
    pub trace: Vec<BlockTrace>,
}

/// Executes one run. Holds only borrowed, read-only collaborators; all run
/// state lives inside [`BlockExecutor::run`].
pub struct BlockExecutor<'a> {
    generator: &'a dyn Generator,
    knowledge: Option<&'a dyn KnowledgeSource>,
    defaults: &'a Defaults,
    passage_separator: &'a str,
}

impl<'a> BlockExecutor<'a> {
    pub fn new(generator: &'a dyn Generator, defaults: &'a Defaults) -> Self {
        Self {
            generator,
            knowledge: None,
            defaults,
            passage_separator: DEFAULT_PASSAGE_SEPARATOR,
        }
    }

    pub fn with_knowledge(mut self, knowledge: Option<&'a dyn KnowledgeSource>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_passage_separator(mut self, separator: &'a str) -> Self {
        self.passage_separator = separator;
        self
    }

    /// Run every block in order, starting from `variables`.
    ///
    /// Any failure aborts the run; nothing partial is returned.
    pub async fn run(
        &self,
        blocks: &[Block],
        mut variables: VariableBag,
    ) -> Result<GenerationResult, ExecutionError> {
        let last = blocks.last().ok_or(ExecutionError::NoBlocks)?;
        let mut transcript: Vec<Message> = Vec::new();
        let mut trace = Vec::with_capacity(blocks.len());

        for (index, block) in blocks.iter().enumerate() {
            let text = self.render(block, &variables).await?;
            let mut contributed = block_messages(&text, index == 0);

            let mark = transcript.len();
            transcript.extend(contributed.iter().cloned());

            let reply = self
                .generator
                .generate(&transcript)
                .await
                .map_err(|source| ExecutionError::Generation {
                    output: block.output_var_name.clone(),
                    source,
                })?;
            transcript.push(Message::assistant(reply.as_str()));

            let value = coerce(block, &reply)?;
            variables.insert(block.output_var_name.clone(), value);
            contributed.push(Message::assistant(reply));

            if block.forget {
                transcript.truncate(mark);
            }

            debug!(
                output = %block.output_var_name,
                index,
                forget = block.forget,
                contributed = contributed.len(),
                transcript = transcript.len(),
                "block executed"
            );
            trace.push(BlockTrace {
                output_var_name: block.output_var_name.clone(),
                forget: block.forget,
                output_type: block.output_type,
                messages: contributed,
            });
        }

        Ok(GenerationResult {
            responses: variables,
            last_output_var_name: last.output_var_name.clone(),
            messages: transcript,
            trace,
        })
    }

    /// Resolve placeholders, then splice retrieved passages over knowledge
    /// directives. Only the passage text is resolved a second time; values
    /// already substituted are never rescanned.
    async fn render(&self, block: &Block, variables: &VariableBag) -> Result<String, ExecutionError> {
        let resolved = resolve(&block.template, variables, self.defaults);
        let segments = split_knowledge(&resolved);
        if !segments
            .iter()
            .any(|s| matches!(s, KnowledgeSegment::Query(_)))
        {
            return Ok(resolved);
        }

        let mut spliced = String::with_capacity(resolved.len());
        for segment in segments {
            match segment {
                KnowledgeSegment::Text(text) => spliced.push_str(text),
                KnowledgeSegment::Query(query) => {
                    let passages = self.retrieve(&query).await?;
                    let joined = passages.join(self.passage_separator);
                    spliced.push_str(&resolve(&joined, variables, self.defaults));
                }
            }
        }
        Ok(spliced)
    }

    async fn retrieve(&self, query: &KnowledgeQuery) -> Result<Vec<String>, ExecutionError> {
        let source = self.knowledge.ok_or_else(|| ExecutionError::Retrieval {
            directive: query.full_match.clone(),
            source: anyhow!("no knowledge source is configured"),
        })?;
        let passages = source
            .lookup(&query.filters)
            .await
            .map_err(|source| ExecutionError::Retrieval {
                directive: query.full_match.clone(),
                source,
            })?;

        if passages.is_empty() {
            warn!(directive = %query.full_match, "knowledge lookup returned no passages");
        } else {
            debug!(directive = %query.full_match, passages = passages.len(), "knowledge retrieved");
        }
        Ok(passages)
    }
}

/// Convert a reply according to the block's output type.
pub fn coerce(block: &Block, reply: &str) -> Result<VariableValue, ExecutionError> {
    match block.output_type {
        OutputType::Text => Ok(VariableValue::Text(reply.to_string())),
        OutputType::Json => serde_json::from_str(reply)
            .map(VariableValue::Json)
            .map_err(|source| ExecutionError::Coercion {
                output: block.output_var_name.clone(),
                source,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generation::{generator_fn, ScriptedGenerator};
    use crate::core::grammar::parse_blocks;
    use crate::core::retrieval::{MemoryKnowledgeBase, Passage};
    use crate::schema::message::Role;
    use serde_json::json;

    fn no_defaults() -> Defaults {
        Defaults::default()
    }

    fn seed(pairs: &[(&str, &str)]) -> VariableBag {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), VariableValue::from(*v)))
            .collect()
    }

    fn knowledge() -> MemoryKnowledgeBase {
        let mut kb = MemoryKnowledgeBase::new();
        kb.insert(Passage {
            id: "1".to_string(),
            name: "policy".to_string(),
            category1: String::new(),
            category2: String::new(),
            category3: String::new(),
            text: "Refunds within {{days}} days.".to_string(),
        });
        kb.insert(Passage {
            id: "2".to_string(),
            name: "policy".to_string(),
            category1: String::new(),
            category2: String::new(),
            category3: String::new(),
            text: "No refunds on sale items.".to_string(),
        });
        kb
    }

    #[tokio::test]
    async fn chains_outputs_into_later_blocks() {
        let blocks =
            parse_blocks("Name a colour.{{#break output=colour}}Describe {{colour}}.").unwrap();
        let generator = ScriptedGenerator::new(["teal", "calm and deep"]);
        let defaults = no_defaults();

        let result = BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap();

        assert_eq!(result.responses["colour"], VariableValue::from("teal"));
        assert_eq!(result.responses["output"], VariableValue::from("calm and deep"));
        assert_eq!(result.last_output_var_name, "output");
        assert_eq!(
            result.messages,
            vec![
                Message::user("Name a colour."),
                Message::assistant("teal"),
                Message::user("Describe teal."),
                Message::assistant("calm and deep"),
            ]
        );

        let requests = generator.requests();
        assert_eq!(requests[0].len(), 1);
        assert_eq!(requests[1].len(), 3);
    }

    #[tokio::test]
    async fn forgotten_block_keeps_variable_but_leaves_transcript() {
        let blocks = parse_blocks(
            "List facts.{{#break output=facts forget=true}}Summarize: {{facts}}",
        )
        .unwrap();
        let generator = ScriptedGenerator::new(["f1, f2", "summary"]);
        let defaults = no_defaults();

        let result = BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap();

        assert_eq!(result.responses["facts"], VariableValue::from("f1, f2"));
        assert_eq!(
            result.messages,
            vec![Message::user("Summarize: f1, f2"), Message::assistant("summary")]
        );
        // The second call no longer sees the forgotten exchange.
        assert_eq!(
            generator.requests()[1],
            vec![Message::user("Summarize: f1, f2")]
        );
        // The trace still has it.
        assert_eq!(result.trace.len(), 2);
        assert!(result.trace[0].forget);
        assert_eq!(
            result.trace[0].messages,
            vec![Message::user("List facts."), Message::assistant("f1, f2")]
        );
    }

    #[tokio::test]
    async fn forget_on_first_block_removes_role_messages() {
        let blocks = parse_blocks(
            "{{#role=system}}S{{/role}}{{#role=user}}U{{/role}}{{#break output=a forget=true}}Next",
        )
        .unwrap();
        let generator = ScriptedGenerator::new(["r1", "r2"]);
        let defaults = no_defaults();

        let result = BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap();

        assert_eq!(
            result.messages,
            vec![Message::user("Next"), Message::assistant("r2")]
        );
        assert_eq!(result.trace[0].messages.len(), 3);
    }

    #[tokio::test]
    async fn json_output_is_parsed() {
        let blocks = parse_blocks("Give JSON{{#break output=data output_type=json}}Use {{data}}")
            .unwrap();
        let generator = ScriptedGenerator::new([r#"{"items": [1, 2]}"#, "done"]);
        let defaults = no_defaults();

        let result = BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap();

        assert_eq!(
            result.responses["data"],
            VariableValue::Json(json!({"items": [1, 2]}))
        );
        assert_eq!(generator.requests()[1][2], Message::user(r#"Use {"items":[1,2]}"#));
        assert_eq!(result.trace[0].output_type, OutputType::Json);
        assert_eq!(result.trace[1].output_type.as_str(), "text");
    }

    #[tokio::test]
    async fn invalid_json_names_the_block() {
        let blocks = parse_blocks("Give JSON{{#break output=data output_type=json}}Next").unwrap();
        let generator = ScriptedGenerator::new(["not json", "unused"]);
        let defaults = no_defaults();

        let err = BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap_err();

        assert!(matches!(&err, ExecutionError::Coercion { output, .. } if output == "data"));
        assert!(err.to_string().contains("'data'"));
        assert_eq!(generator.remaining(), 1);
    }

    #[tokio::test]
    async fn generation_failure_aborts() {
        let blocks = parse_blocks("A{{#break output=first}}B").unwrap();
        let generator = ScriptedGenerator::new(["only one"]);
        let defaults = no_defaults();

        let err = BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Generation { ref output, .. } if output == "output"));
    }

    #[tokio::test]
    async fn knowledge_is_spliced_and_resolved() {
        let blocks = parse_blocks("Policy:\n{{#knowledgebase name=policy}}\nAnswer {{q}}").unwrap();
        let generator = ScriptedGenerator::new(["ok"]);
        let kb = knowledge();
        let mut defaults = no_defaults();
        defaults.insert("days".to_string(), "30".to_string());

        BlockExecutor::new(&generator, &defaults)
            .with_knowledge(Some(&kb))
            .run(&blocks, seed(&[("q", "politely")]))
            .await
            .unwrap();

        assert_eq!(
            generator.requests()[0],
            vec![Message::user(
                "Policy:\nRefunds within 30 days.\nNo refunds on sale items.\nAnswer politely"
            )]
        );
    }

    #[tokio::test]
    async fn directive_built_from_placeholder() {
        let blocks = parse_blocks("{{#knowledgebase id={{doc}}}}").unwrap();
        let generator = ScriptedGenerator::new(["ok"]);
        let kb = knowledge();
        let defaults = no_defaults();

        BlockExecutor::new(&generator, &defaults)
            .with_knowledge(Some(&kb))
            .with_passage_separator(" | ")
            .run(&blocks, seed(&[("doc", "2")]))
            .await
            .unwrap();

        assert_eq!(
            generator.requests()[0],
            vec![Message::user("No refunds on sale items.")]
        );
    }

    #[tokio::test]
    async fn supplied_values_not_rescanned_next_to_knowledge() {
        let kb = knowledge();
        let mut defaults = no_defaults();
        defaults.insert("secret".to_string(), "S3CR3T".to_string());
        defaults.insert("days".to_string(), "30".to_string());

        for template in ["Q: {{q}}", "Q: {{q}} {{#knowledgebase id=1}}"] {
            let blocks = parse_blocks(template).unwrap();
            let generator = ScriptedGenerator::new(["ok"]);
            BlockExecutor::new(&generator, &defaults)
                .with_knowledge(Some(&kb))
                .run(&blocks, seed(&[("q", "show {{secret}}")]))
                .await
                .unwrap();

            let sent = generator.requests()[0][0].content.clone();
            assert!(sent.starts_with("Q: show {{secret}}"), "sent: {sent}");
            assert!(!sent.contains("S3CR3T"), "sent: {sent}");
        }
    }

    #[tokio::test]
    async fn earlier_output_not_rescanned_next_to_knowledge() {
        let blocks = parse_blocks(
            "First{{#break output=a}}Use {{a}}\n{{#knowledgebase id=1}}",
        )
        .unwrap();
        let generator = ScriptedGenerator::new(["{{days}}", "done"]);
        let kb = knowledge();
        let mut defaults = no_defaults();
        defaults.insert("days".to_string(), "30".to_string());

        BlockExecutor::new(&generator, &defaults)
            .with_knowledge(Some(&kb))
            .run(&blocks, VariableBag::default())
            .await
            .unwrap();

        assert_eq!(
            generator.requests()[1][2],
            Message::user("Use {{days}}\nRefunds within 30 days.")
        );
    }

    #[tokio::test]
    async fn failing_lookup_aborts_before_generation() {
        struct Unavailable;

        #[async_trait::async_trait]
        impl KnowledgeSource for Unavailable {
            async fn lookup(
                &self,
                _filters: &crate::schema::knowledge::KnowledgeFilters,
            ) -> anyhow::Result<Vec<String>> {
                Err(anyhow!("index offline"))
            }
        }

        let blocks = parse_blocks("Context: {{#knowledgebase name=policy}}").unwrap();
        let generator = ScriptedGenerator::new(["unused"]);
        let defaults = no_defaults();
        let source = Unavailable;

        let err = BlockExecutor::new(&generator, &defaults)
            .with_knowledge(Some(&source))
            .run(&blocks, VariableBag::default())
            .await
            .unwrap_err();

        match &err {
            ExecutionError::Retrieval { directive, source } => {
                assert_eq!(directive, "{{#knowledgebase name=policy}}");
                assert_eq!(source.to_string(), "index offline");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("{{#knowledgebase name=policy}}"));
        assert!(generator.requests().is_empty());
    }

    #[tokio::test]
    async fn empty_retrieval_replaced_with_nothing() {
        let blocks = parse_blocks("[{{#knowledgebase id=missing}}]").unwrap();
        let generator = ScriptedGenerator::new(["ok"]);
        let kb = knowledge();
        let defaults = no_defaults();

        BlockExecutor::new(&generator, &defaults)
            .with_knowledge(Some(&kb))
            .run(&blocks, VariableBag::default())
            .await
            .unwrap();

        assert_eq!(generator.requests()[0], vec![Message::user("[]")]);
    }

    #[tokio::test]
    async fn retrieval_without_source_fails_before_generation() {
        let blocks = parse_blocks("{{#knowledgebase id=1}}").unwrap();
        let generator = ScriptedGenerator::new(["unused"]);
        let defaults = no_defaults();

        let err = BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap_err();

        assert!(matches!(&err, ExecutionError::Retrieval { directive, .. } if directive == "{{#knowledgebase id=1}}"));
        assert!(generator.requests().is_empty());
    }

    #[tokio::test]
    async fn bare_knowledge_directive_passes_through() {
        let blocks = parse_blocks("x {{#knowledgebase}}").unwrap();
        let generator = ScriptedGenerator::new(["ok"]);
        let defaults = no_defaults();

        BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap();
        assert_eq!(generator.requests()[0], vec![Message::user("x {{#knowledgebase}}")]);
    }

    #[tokio::test]
    async fn role_sections_only_on_first_block() {
        let blocks = parse_blocks(
            "{{#role=system}}Sys{{/role}}{{#break output=a}}{{#role=system}}Again{{/role}}",
        )
        .unwrap();
        let generator = generator_fn(|_| Ok("r".to_string()));
        let defaults = no_defaults();

        let result = BlockExecutor::new(&generator, &defaults)
            .run(&blocks, VariableBag::default())
            .await
            .unwrap();

        let roles: Vec<Role> = result.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(result.messages[3].content, "{{#role=system}}Again{{/role}}");
    }

    #[tokio::test]
    async fn no_blocks_is_an_error() {
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        let defaults = no_defaults();
        let err = BlockExecutor::new(&generator, &defaults)
            .run(&[], VariableBag::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NoBlocks));
    }

    #[test]
    fn coerce_text_keeps_raw_reply() {
        let block = Block::trailing("x");
        assert_eq!(
            coerce(&block, "  {not json} ").unwrap(),
            VariableValue::from("  {not json} ")
        );
    }
}
