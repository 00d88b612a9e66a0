//! Company-opening specialist.
//!
//! Answers with the process steps, government fees and the document
//! checklist. Always names itself as the next node so the presentation layer
//! keeps the upload panel on screen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Result, WorkflowError};
use crate::providers::{ChatMessage, LlmProvider, SamplingConfig};
use crate::types::{NodeId, NodeUpdate, RoutingState};
use crate::workflow::Node;

use super::preview;

/// Documents required to open a company, in display order
pub const REQUIRED_DOCUMENTS: [&str; 5] = [
    "RG e CPF do(s) proprietário(s)",
    "Comprovante de endereço atualizado",
    "Certidão de casamento (se aplicável)",
    "Cópia do IPTU ou documento com inscrição imobiliária",
    "Registro em conselho profissional (se exigido pela atividade)",
];

/// Shown when the specialist fails for any reason
pub const SPECIALIST_APOLOGY: &str = "Desculpe, ocorreu um erro ao processar sua solicitação.";

/// Shown when there is no message to answer
pub const NOT_UNDERSTOOD: &str = "Desculpe, não entendi sua mensagem.";

/// Bullet list of [`REQUIRED_DOCUMENTS`]
pub fn document_checklist() -> String {
    REQUIRED_DOCUMENTS
        .iter()
        .map(|doc| format!("- {doc}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn system_prompt() -> String {
    format!(
        "Você é um consultor especializado em abertura de empresas na Contabilizei. \
         Em tom profissional e objetivo, apresente de forma sucinta as etapas do processo, \
         detalhe as taxas governamentais obrigatórias e liste os documentos necessários:\n{}",
        document_checklist()
    )
}

/// Specialist responder backed by a language model
pub struct SpecialistResponder {
    provider: Arc<dyn LlmProvider>,
    sampling: SamplingConfig,
    timeout: Duration,
}

impl SpecialistResponder {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tokens: u32, timeout: Duration) -> Self {
        info!(
            "Initializing SpecialistResponder with {} provider ({})",
            provider.provider_name(),
            provider.model()
        );
        Self {
            provider,
            sampling: SamplingConfig::deterministic(max_tokens),
            timeout,
        }
    }

    /// Answer `message` with the fixed company-opening prompt
    pub async fn respond(&self, message: &str) -> Result<String> {
        let messages = [ChatMessage::system(system_prompt()), ChatMessage::user(message)];

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, &self.sampling))
            .await
            .map_err(|_| WorkflowError::Timeout(self.timeout))??;

        debug!("LLM response: {}...", preview(&response, 120));
        Ok(response)
    }
}

/// Graph node for the specialist. Errors are tagged with this node's id so
/// the manager can answer with [`SPECIALIST_APOLOGY`] and keep routing sticky.
pub struct CompanyOpeningAgent {
    responder: SpecialistResponder,
}

impl CompanyOpeningAgent {
    pub fn new(responder: SpecialistResponder) -> Self {
        Self { responder }
    }
}

#[async_trait]
impl Node for CompanyOpeningAgent {
    fn id(&self) -> NodeId {
        NodeId::SpecialistResponder
    }

    async fn run(&self, state: &RoutingState) -> Result<NodeUpdate> {
        if state.message.trim().is_empty() {
            warn!("No message found in state");
            return Ok(NodeUpdate::respond(NOT_UNDERSTOOD, NodeId::SpecialistResponder));
        }

        info!(
            "Processing company opening message: {}...",
            preview(&state.message, 60)
        );
        let response = self.responder.respond(&state.message).await?;

        Ok(NodeUpdate::respond(response, NodeId::SpecialistResponder))
    }
}
