//! contabot-core - intent routing for the Contabilizei assistant
//!
//! This crate provides:
//! - A two-node routing graph: a welcome agent that classifies intent and a
//!   company-opening specialist with sticky routing
//! - OpenAI and Groq chat backends behind one provider trait
//! - Keyword lookup over the Contabilizei site used as classification context
//! - An agent manager that runs a turn and never surfaces raw errors

pub mod agents;
pub mod error;
pub mod lookup;
pub mod providers;
pub mod types;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use agents::company_opening::{REQUIRED_DOCUMENTS, document_checklist};
pub use agents::{AgentManager, ManagerConfig};
pub use error::{Result, WorkflowError};
pub use lookup::{ContentLookup, ExcerptSource, LookupSettings, NOTHING_FOUND};
pub use providers::{LlmProvider, ProviderKind, ProviderSettings, build_provider};
pub use types::{
    Conversation, ConversationTurn, IntentLabel, IntentResult, NodeId, Role, RoutingState,
    TurnOutcome,
};
pub use workflow::{StateGraph, WorkflowGraph};
