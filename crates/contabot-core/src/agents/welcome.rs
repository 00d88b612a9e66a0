//! Welcome agent: first node of every fresh conversation.
//!
//! Classifies the user's intent with a temperature-0 model call constrained to
//! a two-field JSON object, grounded on an excerpt of the Contabilizei site.
//! Unparseable output never escapes this module: it becomes the default
//! "general" result. Only backend transport failures are returned as errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WorkflowError};
use crate::lookup::ExcerptSource;
use crate::providers::{ChatMessage, LlmProvider, SamplingConfig};
use crate::types::{IntentLabel, IntentResult, NodeId, NodeUpdate, RoutingState};
use crate::workflow::Node;

use super::preview;

/// Response shown when the model output cannot be parsed
pub const MALFORMED_RESPONSE: &str = "Desculpe, não entendi sua solicitação.";

const CLASSIFIER_PROMPT: &str = "Você é um assistente da Contabilizei.\n\
Classifique a intenção do usuário:\n \
• abrir empresa/CNPJ  -> intent = abrir_empresa\n \
• outro assunto       -> intent = geral\n\n\
Responda em JSON puro compatível com:\n\
{\"response\": <texto>, \"intent\": <string>}";

/// JSON shape the model is asked to emit
#[derive(Debug, Deserialize)]
struct RawIntent {
    response: String,
    intent: String,
}

impl IntentResult {
    /// Safe default substituted for malformed model output
    pub fn fallback() -> Self {
        Self {
            response_text: MALFORMED_RESPONSE.to_string(),
            intent_label: IntentLabel::General,
        }
    }
}

/// Intent classifier backed by a language model
pub struct IntentClassifier {
    provider: Arc<dyn LlmProvider>,
    sampling: SamplingConfig,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tokens: u32, timeout: Duration) -> Self {
        info!(
            "Initializing IntentClassifier with {} provider ({})",
            provider.provider_name(),
            provider.model()
        );
        Self {
            provider,
            sampling: SamplingConfig::deterministic(max_tokens),
            timeout,
        }
    }

    /// Classify `message` using `context_excerpt` as grounding.
    ///
    /// Malformed output and timeouts yield [`IntentResult::fallback`]; a
    /// failing backend is returned as [`WorkflowError::Provider`].
    pub async fn classify(&self, message: &str, context_excerpt: &str) -> Result<IntentResult> {
        let messages = build_messages(message, context_excerpt);

        let raw = match tokio::time::timeout(self.timeout, self.provider.chat(&messages, &self.sampling)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(WorkflowError::Provider(e)),
            Err(_) => {
                warn!(
                    "Classifier call exceeded {:?}, treating as malformed response",
                    self.timeout
                );
                return Ok(IntentResult::fallback());
            }
        };
        debug!("Raw LLM output: {}...", preview(&raw, 120));

        match parse_intent_output(&raw) {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Failed to parse LLM JSON: {}", e);
                Ok(IntentResult::fallback())
            }
        }
    }
}

/// System instruction, site excerpt, then the raw user input
fn build_messages(message: &str, context_excerpt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CLASSIFIER_PROMPT),
        ChatMessage::system(format!("Trechos do site:\n{context_excerpt}")),
        ChatMessage::user(message),
    ]
}

/// Parse the model's JSON reply.
///
/// Tolerates prose or code fences around the object. A label outside the
/// closed set is logged and mapped to [`IntentLabel::General`], keeping the
/// model's text.
fn parse_intent_output(text: &str) -> Result<IntentResult> {
    let start = text
        .find('{')
        .ok_or_else(|| WorkflowError::MalformedOutput("no JSON object found".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| WorkflowError::MalformedOutput("no closing brace found".to_string()))?;

    let raw: RawIntent = serde_json::from_str(&text[start..=end])
        .map_err(|e| WorkflowError::MalformedOutput(e.to_string()))?;

    let intent_label = match IntentLabel::parse(&raw.intent) {
        Ok(label) => label,
        Err(e) => {
            warn!("{}; routing to the general path", e);
            IntentLabel::General
        }
    };

    Ok(IntentResult {
        response_text: raw.response,
        intent_label,
    })
}

/// Graph node wrapping the classifier and its excerpt source
pub struct WelcomeAgent {
    classifier: IntentClassifier,
    excerpts: Arc<dyn ExcerptSource>,
}

impl WelcomeAgent {
    pub fn new(classifier: IntentClassifier, excerpts: Arc<dyn ExcerptSource>) -> Self {
        Self {
            classifier,
            excerpts,
        }
    }
}

#[async_trait]
impl Node for WelcomeAgent {
    fn id(&self) -> NodeId {
        NodeId::IntentClassifier
    }

    async fn run(&self, state: &RoutingState) -> Result<NodeUpdate> {
        info!("Processing welcome message: {}...", preview(&state.message, 60));

        let excerpt = self.excerpts.search(&state.message).await;
        debug!("Website excerpt retrieved: {}...", preview(&excerpt, 120));

        let result = self.classifier.classify(&state.message, &excerpt).await?;
        let next_node = result.intent_label.next_node();
        info!(
            "Intent detected: {} -> next node: {}",
            result.intent_label.wire_label(),
            next_node
        );

        Ok(NodeUpdate::respond(result.response_text, next_node))
    }
}
