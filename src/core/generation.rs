//! Generation seam plus scripted, echo and closure-backed generators.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::schema::message::Message;

/// A language-model call: the conversation so far in, one assistant reply out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> anyhow::Result<String>;
}

/// Generator backed by a plain function. Build with [`generator_fn`].
pub struct FnGenerator<F>(F);

/// Wrap a function as a [`Generator`].
pub fn generator_fn<F>(f: F) -> FnGenerator<F>
where
    F: Fn(&[Message]) -> anyhow::Result<String> + Send + Sync,
{
    FnGenerator(f)
}

#[async_trait]
impl<F> Generator for FnGenerator<F>
where
    F: Fn(&[Message]) -> anyhow::Result<String> + Send + Sync,
{
    async fn generate(&self, messages: &[Message]) -> anyhow::Result<String> {
        (self.0)(messages)
    }
}

/// Replies from a fixed queue and records every conversation it was sent.
/// Fails once the queue is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every conversation received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replies not yet handed out.
    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, messages: &[Message]) -> anyhow::Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator has no replies left"))
    }
}

/// Replies with the content of the last non-empty message, optionally
/// prefixed. Useful for previewing templates without a model.
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator {
    prefix: String,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, messages: &[Message]) -> anyhow::Result<String> {
        let last = messages
            .iter()
            .rev()
            .find(|m| !m.content.is_empty())
            .ok_or_else(|| anyhow!("nothing to echo"))?;
        Ok(format!("{}{}", self.prefix, last.content))
    }
}
