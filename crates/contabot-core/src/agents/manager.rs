//! Agent manager: wires the agents into the routing graph and runs turns

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::{Result, WorkflowError};
use crate::lookup::{ContentLookup, ExcerptSource, LookupSettings};
use crate::providers::{LlmProvider, ProviderKind, ProviderSettings, build_provider};
use crate::types::{ConversationTurn, NodeId, RoutingState, TurnOutcome};
use crate::workflow::{StateGraph, WorkflowGraph, route_after_classification};

use super::company_opening::{CompanyOpeningAgent, SPECIALIST_APOLOGY, SpecialistResponder};
use super::preview;
use super::welcome::{IntentClassifier, WelcomeAgent};

/// Returned for any failure outside the specialist
pub const FALLBACK_RESPONSE: &str = "Desculpe, ocorreu um erro no processamento.";

/// Returned when the graph finished without producing text
pub const NO_RESPONSE: &str = "Nenhuma resposta foi produzida.";

/// Tuning for the model calls made during a turn
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound on each model call, on top of the HTTP client timeout
    pub llm_timeout: Duration,
    pub max_tokens: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(60),
            max_tokens: 1024,
        }
    }
}

/// Coordinates the agent nodes. Stateless across turns: the routing decision
/// of each turn is returned in its [`TurnOutcome`].
pub struct AgentManager {
    graph: WorkflowGraph,
    provider_name: String,
    model: String,
}

impl AgentManager {
    /// Build the manager around an existing provider and excerpt source
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        excerpts: Arc<dyn ExcerptSource>,
        config: &ManagerConfig,
    ) -> Result<Self> {
        info!("Initializing AgentManager");
        let provider_name = provider.provider_name().to_string();
        let model = provider.model().to_string();

        let welcome = WelcomeAgent::new(
            IntentClassifier::new(provider.clone(), config.max_tokens, config.llm_timeout),
            excerpts,
        );
        let company_opening = CompanyOpeningAgent::new(SpecialistResponder::new(
            provider,
            config.max_tokens,
            config.llm_timeout,
        ));

        let graph = StateGraph::new()
            .add_node(Arc::new(welcome))
            .add_node(Arc::new(company_opening))
            .add_conditional_edges(NodeId::IntentClassifier, route_after_classification)
            .add_edge(NodeId::SpecialistResponder, NodeId::Terminal)
            .set_entry_point(NodeId::IntentClassifier)
            .compile()?;

        debug!("All agents initialized successfully");
        Ok(Self {
            graph,
            provider_name,
            model,
        })
    }

    /// Build the selected backend and the live site lookup, then the manager.
    ///
    /// An unsupported selector or invalid settings fail here, before any turn.
    pub fn from_settings(
        kind: ProviderKind,
        provider: &ProviderSettings,
        lookup: &LookupSettings,
        config: &ManagerConfig,
    ) -> Result<Self> {
        let provider = build_provider(kind, provider)?;
        let lookup = ContentLookup::new(lookup)?;
        Self::new(provider, Arc::new(lookup), config)
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one turn from the intent classifier. Never fails.
    pub async fn run(&self, message: &str, chat_history: &[ConversationTurn]) -> TurnOutcome {
        self.run_from(NodeId::IntentClassifier, message, chat_history)
            .await
    }

    /// Run one turn starting at `entry`. `Terminal` starts at the classifier.
    ///
    /// Failures are logged and collapsed: a failing specialist answers with
    /// [`SPECIALIST_APOLOGY`] and stays sticky, anything else answers with
    /// [`FALLBACK_RESPONSE`] and routes to the terminal.
    pub async fn run_from(
        &self,
        entry: NodeId,
        message: &str,
        chat_history: &[ConversationTurn],
    ) -> TurnOutcome {
        info!(
            "Processing message: {}... (entry={}, history={})",
            preview(message, 50),
            entry,
            chat_history.len()
        );

        let mut state = RoutingState::new(message, chat_history.to_vec());
        if entry != NodeId::Terminal {
            state.next_node = entry;
        }

        match self.graph.invoke(state).await {
            Ok(state) => {
                info!("Message processed, next node: {}", state.next_node);
                TurnOutcome {
                    response: state.response.unwrap_or_else(|| NO_RESPONSE.to_string()),
                    next_node: state.next_node,
                }
            }
            Err(e) => {
                error!("Error processing message: {}", e);
                Self::collapse(&e)
            }
        }
    }

    fn collapse(err: &WorkflowError) -> TurnOutcome {
        match err.node() {
            Some(NodeId::SpecialistResponder) => TurnOutcome {
                response: SPECIALIST_APOLOGY.to_string(),
                next_node: NodeId::SpecialistResponder,
            },
            _ => TurnOutcome {
                response: FALLBACK_RESPONSE.to_string(),
                next_node: NodeId::Terminal,
            },
        }
    }
}
