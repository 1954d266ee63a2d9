//! Template grammar: splitting a template into blocks at `{{#break ...}}`
//! directives.

use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::warn;

use crate::core::directive::{directive_args, parse_attributes, tokenize, Token};
use crate::schema::block::{Block, OutputType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Duplicate output variable name {0} was found in Template.")]
    DuplicateOutputVariable(String),
}

/// Attributes of a well-formed `{{#break ...}}` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakDirective {
    pub output: String,
    pub forget: bool,
    pub output_type: OutputType,
}

impl BreakDirective {
    /// Parse a tag body as a break directive.
    ///
    /// Syntax: `#break output=NAME [forget=true|false] [output_type=text|json]`,
    /// attributes in any order. Returns `None` when `output` is missing, an
    /// attribute is unknown or repeated, or a value is out of range; callers
    /// keep such tags as literal text.
    pub fn parse(body: &str) -> Option<Self> {
        let args = directive_args(body, "break")?;

        let mut output: Option<String> = None;
        let mut forget: Option<bool> = None;
        let mut output_type: Option<OutputType> = None;

        for (key, value) in parse_attributes(args)? {
            let repeated = match key {
                "output" => output.replace(value.to_string()).is_some(),
                "forget" => forget.replace(parse_bool(value)?).is_some(),
                "output_type" => output_type
                    .replace(OutputType::from_attr(value)?)
                    .is_some(),
                _ => return None,
            };
            if repeated {
                return None;
            }
        }

        Some(BreakDirective {
            output: output?,
            forget: forget.unwrap_or(false),
            output_type: output_type.unwrap_or_default(),
        })
    }

    fn into_block(self, template: String) -> Block {
        Block {
            template,
            output_var_name: self.output,
            forget: self.forget,
            output_type: self.output_type,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// True when a tag body starts like a break directive but does not parse.
pub fn is_malformed_break(body: &str) -> bool {
    directive_args(body, "break").is_some() && BreakDirective::parse(body).is_none()
}

/// Split a template into ordered blocks.
///
/// Each segment before a break directive becomes a block carrying that
/// directive's attributes. The trailing segment, even when empty, becomes
/// the implicit `output` block. Segment text is kept verbatim.
pub fn parse_blocks(template: &str) -> Result<Vec<Block>, TemplateError> {
    let mut blocks = Vec::new();
    let mut segment = String::new();

    for token in tokenize(template) {
        match token {
            Token::Text(text) => segment.push_str(text),
            Token::Tag { raw, body } => match BreakDirective::parse(body) {
                Some(directive) => {
                    blocks.push(directive.into_block(std::mem::take(&mut segment)));
                }
                None => {
                    if is_malformed_break(body) {
                        warn!(directive = raw, "malformed break directive kept as text");
                    }
                    segment.push_str(raw);
                }
            },
        }
    }
    blocks.push(Block::trailing(segment));

    ensure_unique_outputs(&blocks)?;
    Ok(blocks)
}

fn ensure_unique_outputs(blocks: &[Block]) -> Result<(), TemplateError> {
    let mut seen = FxHashSet::default();
    for block in blocks {
        if !seen.insert(block.output_var_name.as_str()) {
            return Err(TemplateError::DuplicateOutputVariable(
                block.output_var_name.clone(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(template: &str, name: &str, forget: bool, output_type: OutputType) -> Block {
        Block {
            template: template.to_string(),
            output_var_name: name.to_string(),
            forget,
            output_type,
        }
    }

    #[test]
    fn plain_text_is_one_block() {
        let blocks = parse_blocks("plain text").unwrap();
        assert_eq!(
            blocks,
            vec![block("plain text", "output", false, OutputType::Text)]
        );
    }

    #[test]
    fn single_break_splits_in_two() {
        let blocks = parse_blocks("A{{#break output=var1}}B").unwrap();
        assert_eq!(
            blocks,
            vec![
                block("A", "var1", false, OutputType::Text),
                block("B", "output", false, OutputType::Text),
            ]
        );
    }

    #[test]
    fn duplicate_output_name_rejected() {
        let err = parse_blocks("A{{#break output=var1}}B{{#break output=var1}}C").unwrap_err();
        assert_eq!(err, TemplateError::DuplicateOutputVariable("var1".to_string()));
        assert_eq!(
            err.to_string(),
            "Duplicate output variable name var1 was found in Template."
        );
    }

    #[test]
    fn explicit_output_name_clashes_with_trailing_block() {
        let err = parse_blocks("A{{#break output=output}}B").unwrap_err();
        assert_eq!(err, TemplateError::DuplicateOutputVariable("output".to_string()));
    }

    #[test]
    fn attributes_in_any_order() {
        let blocks =
            parse_blocks("A{{#break output_type=json forget=true output=facts}}B").unwrap();
        assert_eq!(blocks[0], block("A", "facts", true, OutputType::Json));
    }

    #[test]
    fn explicit_defaults() {
        let blocks = parse_blocks("A{{#break output=a forget=false output_type=text}}").unwrap();
        assert_eq!(blocks[0], block("A", "a", false, OutputType::Text));
    }

    #[test]
    fn trailing_block_kept_when_empty() {
        let blocks = parse_blocks("A{{#break output=a}}").unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], block("", "output", false, OutputType::Text));
    }

    #[test]
    fn segments_are_not_trimmed() {
        let blocks = parse_blocks("  A \n{{#break output=a}}\n B ").unwrap();
        assert_eq!(blocks[0].template, "  A \n");
        assert_eq!(blocks[1].template, "\n B ");
    }

    #[test]
    fn other_tags_stay_in_segment() {
        let blocks =
            parse_blocks("{{#role=system}}Hi {{name}}{{/role}}{{#break output=greet}}Next").unwrap();
        assert_eq!(blocks[0].template, "{{#role=system}}Hi {{name}}{{/role}}");
        assert_eq!(blocks[1].template, "Next");
    }

    #[test]
    fn break_with_whitespace_inside_tag() {
        let blocks = parse_blocks("A{{ #break   output=a   forget=true }}B").unwrap();
        assert_eq!(blocks[0], block("A", "a", true, OutputType::Text));
    }

    // Malformed break directives pass through as literal text. The exact
    // policy here still needs product clarification.

    #[test]
    fn unterminated_break_is_literal() {
        let blocks = parse_blocks("A{{#break output=a B").unwrap();
        assert_eq!(blocks, vec![block("A{{#break output=a B", "output", false, OutputType::Text)]);
    }

    #[test]
    fn break_without_output_is_literal() {
        let blocks = parse_blocks("A{{#break forget=true}}B").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].template, "A{{#break forget=true}}B");
    }

    #[test]
    fn break_with_bad_values_is_literal() {
        for input in [
            "A{{#break output=a forget=yes}}B",
            "A{{#break output=a output_type=xml}}B",
            "A{{#break output=a colour=red}}B",
            "A{{#break output=a output=b}}B",
            "A{{#break output}}B",
        ] {
            let blocks = parse_blocks(input).unwrap();
            assert_eq!(blocks.len(), 1, "input: {input}");
            assert_eq!(blocks[0].template, input);
        }
    }

    #[test]
    fn breakfast_is_not_a_break() {
        assert!(!is_malformed_break("#breakfast output=a"));
        assert!(is_malformed_break("#break forget=true"));
        assert!(!is_malformed_break("#break output=a"));
    }
}
