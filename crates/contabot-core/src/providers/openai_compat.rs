//! OpenAI-compatible provider for Groq and similar endpoints
//!
//! Reuses the OpenAI wire format with a configurable base URL.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::openai::OpenAiProvider;
use super::types::{ChatMessage, LlmProvider, SamplingConfig};

/// OpenAI-compatible provider. Wraps [`OpenAiProvider`] with a custom name
pub struct OpenAiCompatProvider {
    inner: OpenAiProvider,
    name: String,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// - `name`: human-readable label (e.g. "groq")
    /// - `base_url`: the endpoint root, without the `/v1` suffix
    ///   (e.g. `https://api.groq.com/openai`)
    pub fn new(
        name: String,
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            inner: OpenAiProvider::new(api_key, model, base_url, timeout)?,
            name,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn chat(&self, messages: &[ChatMessage], sampling: &SamplingConfig) -> Result<String> {
        self.inner.chat(messages, sampling).await
    }
}
