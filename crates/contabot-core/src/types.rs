//! Shared types for contabot-core

use serde::{Deserialize, Serialize};

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in the chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only chat history.
///
/// Turns cannot be edited or removed individually; `clear` drops the whole
/// conversation and is reserved for the explicit "clear conversation" action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Identifier of a node in the routing graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    IntentClassifier,
    SpecialistResponder,
    Terminal,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentClassifier => "intent_classifier",
            Self::SpecialistResponder => "specialist_responder",
            Self::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified purpose of a user message. Decoded only through
/// [`IntentLabel::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentLabel {
    /// The user wants to open a company / get a CNPJ
    OpenCompany,
    /// Anything else
    General,
}

impl IntentLabel {
    /// Label the model is instructed to emit
    pub fn wire_label(&self) -> &'static str {
        match self {
            Self::OpenCompany => "abrir_empresa",
            Self::General => "geral",
        }
    }

    /// Parse a model-emitted label. Labels outside the closed set are an error.
    pub fn parse(label: &str) -> crate::error::Result<Self> {
        match label.trim().to_lowercase().as_str() {
            "abrir_empresa" | "open_company" => Ok(Self::OpenCompany),
            "geral" | "general" => Ok(Self::General),
            other => Err(crate::error::WorkflowError::UnknownIntent(other.to_string())),
        }
    }

    /// Node that handles this intent next
    pub fn next_node(&self) -> NodeId {
        match self {
            Self::OpenCompany => NodeId::SpecialistResponder,
            Self::General => NodeId::Terminal,
        }
    }
}

/// Result of a single classification call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentResult {
    pub response_text: String,
    pub intent_label: IntentLabel,
}

/// Working state of one turn through the graph
#[derive(Debug, Clone)]
pub struct RoutingState {
    pub message: String,
    pub chat_history: Vec<ConversationTurn>,
    pub response: Option<String>,
    pub next_node: NodeId,
}

impl RoutingState {
    /// Fresh state for an incoming message, entering at the classifier
    pub fn new(message: impl Into<String>, chat_history: Vec<ConversationTurn>) -> Self {
        Self {
            message: message.into(),
            chat_history,
            response: None,
            next_node: NodeId::IntentClassifier,
        }
    }

    /// Merge a node's output into the state
    pub fn apply(&mut self, update: NodeUpdate) {
        if let Some(response) = update.response {
            self.response = Some(response);
        }
        self.next_node = update.next_node;
    }
}

/// Output of a node: optional response text plus the routing field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpdate {
    pub response: Option<String>,
    pub next_node: NodeId,
}

impl NodeUpdate {
    pub fn respond(response: impl Into<String>, next_node: NodeId) -> Self {
        Self {
            response: Some(response.into()),
            next_node,
        }
    }
}

/// What a completed turn hands back to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub response: String,
    pub next_node: NodeId,
}

impl TurnOutcome {
    /// Whether the presentation layer should show the document-upload panel
    pub fn wants_upload(&self) -> bool {
        self.next_node == NodeId::SpecialistResponder
    }
}
