//! Knowledge directive grammar: `{{#knowledgebase ...}}`.

use crate::core::directive::{directive_args, tokenize, Token};
use crate::schema::knowledge::{KnowledgeFilters, KnowledgeQuery};

/// Block text split around knowledge directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeSegment<'a> {
    /// Text copied through unchanged, including directives with no
    /// recognized attribute.
    Text(&'a str),
    Query(KnowledgeQuery),
}

/// Split `text` into literal runs and knowledge queries, in document order.
pub fn split_knowledge(text: &str) -> Vec<KnowledgeSegment<'_>> {
    tokenize(text)
        .into_iter()
        .map(|token| match token {
            Token::Tag { raw, body } => match parse_directive(raw, body) {
                Some(query) => KnowledgeSegment::Query(query),
                None => KnowledgeSegment::Text(raw),
            },
            Token::Text(text) => KnowledgeSegment::Text(text),
        })
        .collect()
}

/// Extract every knowledge directive from `text`, in document order.
///
/// Syntax: `#knowledgebase [id=a,b] [category1=..] [category2=..]
/// [category3=..] [name=..]`, any subset, any order. Unknown attributes and
/// items without `=` are ignored. A directive with no recognized attribute
/// yields no query at all.
pub fn parse_knowledgebase_queries(text: &str) -> Vec<KnowledgeQuery> {
    split_knowledge(text)
        .into_iter()
        .filter_map(|segment| match segment {
            KnowledgeSegment::Query(query) => Some(query),
            KnowledgeSegment::Text(_) => None,
        })
        .collect()
}

fn parse_directive(raw: &str, body: &str) -> Option<KnowledgeQuery> {
    let args = directive_args(body, "knowledgebase")?;
    let mut filters = KnowledgeFilters::default();

    for (key, value) in args.split_whitespace().filter_map(|item| item.split_once('=')) {
        let slot = match key {
            "id" => &mut filters.id,
            "category1" => &mut filters.category1,
            "category2" => &mut filters.category2,
            "category3" => &mut filters.category3,
            "name" => &mut filters.names,
            _ => continue,
        };
        *slot = Some(split_list(value));
    }

    if filters.is_empty() {
        return None;
    }
    Some(KnowledgeQuery {
        full_match: raw.to_string(),
        filters,
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
