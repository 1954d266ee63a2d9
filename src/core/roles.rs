//! Role sections: `{{#role=system}}...{{/role}}` markers in the first block.

use crate::core::directive::{tokenize, Token};
use crate::schema::message::{Message, Role};

enum Marker {
    Open(Role),
    Close,
}

fn marker(body: &str) -> Option<Result<Marker, ()>> {
    let body = body.trim();
    if body == "/role" {
        return Some(Ok(Marker::Close));
    }
    let value = body.strip_prefix("#role=")?;
    Some(Role::from_marker(value.trim()).map(Marker::Open).ok_or(()))
}

/// True when `body` is a role open or close marker, valid or not.
pub fn is_role_marker(body: &str) -> bool {
    marker(body).is_some()
}

/// Split text into one message per role section, in order.
///
/// Section contents are trimmed. When no `user` section is present, the
/// text outside the sections (trimmed, possibly empty) becomes a trailing
/// user message. Returns `None` when the text has no sections or they are
/// malformed: unknown role, nested or unterminated section, stray close.
pub fn split_role_sections(text: &str) -> Option<Vec<Message>> {
    let mut messages = Vec::new();
    let mut outside = String::new();
    let mut open: Option<(Role, String)> = None;

    for token in tokenize(text) {
        let found = match token {
            Token::Tag { body, .. } => marker(body),
            Token::Text(_) => None,
        };
        match found {
            Some(Err(())) => return None,
            Some(Ok(Marker::Open(role))) => {
                if open.is_some() {
                    return None;
                }
                open = Some((role, String::new()));
            }
            Some(Ok(Marker::Close)) => {
                let (role, content) = open.take()?;
                messages.push(Message::new(role, content.trim()));
            }
            None => match open.as_mut() {
                Some((_, content)) => content.push_str(token.raw()),
                None => outside.push_str(token.raw()),
            },
        }
    }

    if open.is_some() || messages.is_empty() {
        return None;
    }
    if !messages.iter().any(|m| m.role == Role::User) {
        messages.push(Message::user(outside.trim()));
    }
    Some(messages)
}

/// Messages contributed by a block's resolved text.
///
/// Only the first block may use role sections; every other block, and a
/// first block without valid sections, sends its full text as one user
/// message.
pub fn block_messages(text: &str, first_block: bool) -> Vec<Message> {
    if first_block {
        if let Some(messages) = split_role_sections(text) {
            return messages;
        }
    }
    vec![Message::user(text)]
}
