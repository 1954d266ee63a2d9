//! Directive tokenizer: one sequential scan of template text into literal
//! runs and `{{ ... }}` tags, shared by every template grammar.

/// A slice of template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Literal text, emitted as-is.
    Text(&'a str),
    /// A `{{ ... }}` tag. `raw` includes the braces, `body` does not.
    Tag { raw: &'a str, body: &'a str },
}

impl<'a> Token<'a> {
    /// The exact source text of this token.
    pub fn raw(&self) -> &'a str {
        match *self {
            Token::Text(text) => text,
            Token::Tag { raw, .. } => raw,
        }
    }
}

/// Split `input` into tokens.
///
/// A tag opens at `{{` and closes at the first following `}}`. When another
/// `{{` appears before that `}}`, the outer `{{` is literal and scanning
/// resumes at the inner one, so `{{#knowledgebase id={{doc}}}}` yields the
/// literal `{{#knowledgebase id=`, the tag `{{doc}}` and the literal `}}`.
/// An unterminated `{{` is literal. Joining every token's `raw` text gives
/// back `input` unchanged.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = input[cursor..].find("{{") {
        let open = cursor + offset;
        let body_start = open + 2;
        let rest = &input[body_start..];

        let Some(close) = rest.find("}}") else {
            break;
        };

        if let Some(inner) = rest[..close].find("{{") {
            cursor = body_start + inner;
            continue;
        }

        if open > text_start {
            tokens.push(Token::Text(&input[text_start..open]));
        }
        let end = body_start + close + 2;
        tokens.push(Token::Tag {
            raw: &input[open..end],
            body: &rest[..close],
        });
        text_start = end;
        cursor = end;
    }

    if text_start < input.len() {
        tokens.push(Token::Text(&input[text_start..]));
    }

    tokens
}

/// If `body` is the body of a `#<keyword>` directive, return its argument
/// text (trimmed). `#break` matches `break`, `#breakfast` does not.
pub fn directive_args<'a>(body: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = body.trim_start().strip_prefix('#')?.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Parse whitespace-separated `key=value` pairs.
///
/// Returns `None` when any item lacks `=` or has an empty key or value.
pub fn parse_attributes(args: &str) -> Option<Vec<(&str, &str)>> {
    args.split_whitespace()
        .map(|item| {
            let (key, value) = item.split_once('=')?;
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key, value))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejoin(tokens: &[Token<'_>]) -> String {
        tokens.iter().map(|t| t.raw()).collect()
    }

    #[test]
    fn literal_only() {
        let tokens = tokenize("Hello, world.");
        assert_eq!(tokens, vec![Token::Text("Hello, world.")]);
    }

    #[test]
    fn tag_between_text() {
        let tokens = tokenize("Hi {{name}}!");
        assert_eq!(
            tokens,
            vec![
                Token::Text("Hi "),
                Token::Tag {
                    raw: "{{name}}",
                    body: "name"
                },
                Token::Text("!"),
            ]
        );
    }

    #[test]
    fn adjacent_tags() {
        let tokens = tokenize("{{#role=system}}{{x}}{{/role}}");
        assert_eq!(tokens.len(), 3);
        assert!(matches!(tokens[0], Token::Tag { body: "#role=system", .. }));
        assert!(matches!(tokens[1], Token::Tag { body: "x", .. }));
        assert!(matches!(tokens[2], Token::Tag { body: "/role", .. }));
    }

    #[test]
    fn unterminated_tag_is_literal() {
        let input = "before {{#break output=a";
        let tokens = tokenize(input);
        assert_eq!(tokens, vec![Token::Text(input)]);
    }

    #[test]
    fn nested_open_makes_outer_literal() {
        let input = "{{#knowledgebase id={{doc}}}}";
        let tokens = tokenize(input);
        assert_eq!(
            tokens,
            vec![
                Token::Text("{{#knowledgebase id="),
                Token::Tag {
                    raw: "{{doc}}",
                    body: "doc"
                },
                Token::Text("}}"),
            ]
        );
        assert_eq!(rejoin(&tokens), input);
    }

    #[test]
    fn single_braces_are_text() {
        let input = r#"Return {"a": {"b": 1}} please"#;
        let tokens = tokenize(input);
        assert_eq!(tokens, vec![Token::Text(input)]);
    }

    #[test]
    fn rejoin_reproduces_input() {
        for input in [
            "",
            "{{",
            "}}",
            "{{}}",
            "a {{{b}}} c",
            "{{{{x}}",
            "x {{#break output=a}} y {{#knowledgebase name=n}} é {{z}}",
        ] {
            assert_eq!(rejoin(&tokenize(input)), input, "input: {input:?}");
        }
    }

    #[test]
    fn directive_args_requires_word_boundary() {
        assert_eq!(directive_args("#break output=a", "break"), Some("output=a"));
        assert_eq!(directive_args("#break", "break"), Some(""));
        assert_eq!(directive_args(" #break  x=y ", "break"), Some("x=y"));
        assert_eq!(directive_args("#breakfast", "break"), None);
        assert_eq!(directive_args("break output=a", "break"), None);
    }

    #[test]
    fn attributes_parse_pairs() {
        assert_eq!(
            parse_attributes("output=a forget=true"),
            Some(vec![("output", "a"), ("forget", "true")])
        );
        assert_eq!(parse_attributes(""), Some(vec![]));
        assert_eq!(parse_attributes("output"), None);
        assert_eq!(parse_attributes("output="), None);
        assert_eq!(parse_attributes("=a"), None);
    }
}
