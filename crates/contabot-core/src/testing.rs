//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::lookup::ExcerptSource;
use crate::providers::{ChatMessage, LlmProvider, SamplingConfig};

/// Scripted reply of a [`ScriptedProvider`]
pub enum Reply {
    Text(String),
    Fail(String),
    Hang,
}

/// Provider that replays queued replies and records every request
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, SamplingConfig)>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Reply::Text(t.to_string())).collect())
    }

    pub fn calls(&self) -> Vec<(Vec<ChatMessage>, SamplingConfig)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn chat(&self, messages: &[ChatMessage], sampling: &SamplingConfig) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), *sampling));
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(err)) => Err(anyhow!("{}", err)),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow!("hang elapsed"))
            }
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

/// Excerpt source returning a fixed string
pub struct StaticExcerpt(pub String);

#[async_trait]
impl ExcerptSource for StaticExcerpt {
    async fn search(&self, _query: &str) -> String {
        self.0.clone()
    }
}
