//! Language-model backends
//!
//! Two interchangeable backends sit behind the [`LlmProvider`] trait. The
//! backend is chosen once, at construction, through [`build_provider`].

pub mod openai;
pub mod openai_compat;
pub mod types;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{Result, WorkflowError};

pub use openai::OpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use types::{ChatMessage, ChatRole, LlmProvider, SamplingConfig};

/// Which backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Groq,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
        }
    }

    /// Environment variable holding this backend's API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
        }
    }

    pub fn default_settings(&self) -> ProviderSettings {
        match self {
            Self::OpenAi => ProviderSettings {
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                base_url: "https://api.openai.com".to_string(),
                timeout: Duration::from_secs(60),
            },
            Self::Groq => ProviderSettings {
                api_key: String::new(),
                model: "llama3-70b-8192".to_string(),
                base_url: "https://api.groq.com/openai".to_string(),
                timeout: Duration::from_secs(60),
            },
        }
    }
}

impl FromStr for ProviderKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            other => Err(WorkflowError::Configuration(format!(
                "unsupported provider: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for one backend
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &if self.api_key.is_empty() { "(empty)" } else { "***" })
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Construct the backend for `kind`
pub fn build_provider(kind: ProviderKind, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>> {
    info!("Initializing {} provider with model {}", kind, settings.model);
    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            settings.api_key.clone(),
            settings.model.clone(),
            settings.base_url.clone(),
            settings.timeout,
        )?),
        ProviderKind::Groq => Arc::new(OpenAiCompatProvider::new(
            kind.as_str().to_string(),
            settings.api_key.clone(),
            settings.model.clone(),
            settings.base_url.clone(),
            settings.timeout,
        )?),
    };
    Ok(provider)
}
