//! Interactive terminal chat, one session per process

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use contabot_core::{AgentManager, Conversation, ConversationTurn, NodeId, ProviderKind, TurnOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ContabotConfig;

/// Upload slots shown while the company-opening specialist is active
pub const UPLOAD_SLOTS: [&str; 5] = [
    "RG e CPF do(s) proprietário(s)",
    "Comprovante de endereço atualizado",
    "Certidão de casamento (se aplicável)",
    "Cópia do IPTU/inscrição imobiliária",
    "Registro em conselho profissional (se exigido pela atividade)",
];

/// File extensions accepted by the upload slots
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["pdf", "jpg", "png"];

const BUSY_INDICATOR: &str = "Pensando...";

const GREETING: &str = "Olá! Sou o assistente virtual da Contabilizei. Como posso ajudar?";

const HELP: &str = "\
Comandos:
  /upload <n> <arquivo>   anexa um documento ao item n da lista
  /provider <nome>        troca o modelo (openai ou groq)
  /clear                  apaga a conversa
  /help                   mostra esta ajuda
  /quit                   sai";

/// Build the manager for `kind` from the loaded config
pub fn build_manager(config: &ContabotConfig, kind: ProviderKind) -> Result<AgentManager> {
    let manager = AgentManager::from_settings(
        kind,
        &config.provider_settings(kind),
        &config.lookup_settings(),
        &config.manager_config(),
    )?;
    Ok(manager)
}

/// State of one chat session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    conversation: Conversation,
    last_route: NodeId,
    uploads: BTreeMap<usize, PathBuf>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            conversation: Conversation::new(),
            last_route: NodeId::Terminal,
            uploads: BTreeMap::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn last_route(&self) -> NodeId {
        self.last_route
    }

    /// Node the next turn starts at. Once the specialist has answered, later
    /// turns go straight back to it.
    pub fn entry_node(&self) -> NodeId {
        match self.last_route {
            NodeId::SpecialistResponder => NodeId::SpecialistResponder,
            _ => NodeId::IntentClassifier,
        }
    }

    pub fn shows_upload(&self) -> bool {
        self.last_route == NodeId::SpecialistResponder
    }

    /// Append the user message and the assistant reply, and keep the route
    pub fn record_turn(&mut self, message: &str, outcome: &TurnOutcome) {
        self.conversation.push(ConversationTurn::user(message));
        self.conversation
            .push(ConversationTurn::assistant(outcome.response.clone()));
        self.last_route = outcome.next_node;
    }

    /// Drop the conversation, routing and attachments
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.last_route = NodeId::Terminal;
        self.uploads.clear();
    }

    /// Attach `path` to the 1-based upload `slot`. Returns the slot label.
    pub fn attach(&mut self, slot: &str, path: &Path) -> Result<&'static str> {
        let index: usize = slot
            .parse()
            .ok()
            .filter(|n| (1..=UPLOAD_SLOTS.len()).contains(n))
            .ok_or_else(|| anyhow!("item inválido '{}': use um número de 1 a {}", slot, UPLOAD_SLOTS.len()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            bail!(
                "formato não aceito: {} (aceitos: {})",
                path.display(),
                ACCEPTED_EXTENSIONS.join(", ")
            );
        }
        if !path.is_file() {
            bail!("arquivo não encontrado: {}", path.display());
        }

        self.uploads.insert(index, path.to_path_buf());
        Ok(UPLOAD_SLOTS[index - 1])
    }

    /// Document checklist with the attachment status of each slot
    pub fn upload_panel(&self) -> String {
        let mut panel = format!(
            "Envie seus documentos com /upload <n> <arquivo> ({}):",
            ACCEPTED_EXTENSIONS.join(", ")
        );
        for (i, label) in UPLOAD_SLOTS.iter().enumerate() {
            let status = match self.uploads.get(&(i + 1)) {
                Some(path) => format!("enviado: {}", path.display()),
                None => "pendente".to_string(),
            };
            panel.push_str(&format!("\n  {}. {} [{}]", i + 1, label, status));
        }
        panel
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Empty,
    Message(String),
    Clear,
    Provider(String),
    Upload { slot: String, path: PathBuf },
    Help,
    Quit,
    Invalid(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if !line.starts_with('/') {
        return Command::Message(line.to_string());
    }

    let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match name {
        "/clear" => Command::Clear,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        "/provider" if !rest.is_empty() => Command::Provider(rest.to_string()),
        "/provider" => Command::Invalid("uso: /provider <openai|groq>".to_string()),
        "/upload" => match rest.split_once(char::is_whitespace) {
            Some((slot, path)) if !path.trim().is_empty() => Command::Upload {
                slot: slot.to_string(),
                path: PathBuf::from(path.trim()),
            },
            _ => Command::Invalid("uso: /upload <n> <arquivo>".to_string()),
        },
        other => Command::Invalid(format!("comando desconhecido: {other} (veja /help)")),
    }
}

/// Whether the REPL keeps reading after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Terminal chat loop around an [`AgentManager`]
pub struct Shell {
    config: ContabotConfig,
    kind: ProviderKind,
    manager: AgentManager,
    session: Session,
}

impl Shell {
    pub fn new(config: ContabotConfig, kind: ProviderKind) -> Result<Self> {
        let manager = build_manager(&config, kind)?;
        Ok(Self::with_manager(config, kind, manager))
    }

    pub fn with_manager(config: ContabotConfig, kind: ProviderKind, manager: AgentManager) -> Self {
        let session = Session::new();
        info!("Started session {}", session.id);
        Self {
            config,
            kind,
            manager,
            session,
        }
    }

    /// Read lines from stdin until `/quit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        let mut out = std::io::stdout();
        writeln!(
            out,
            "Contabot ({} / {}) - digite /help para ver os comandos\n",
            self.manager.provider_name(),
            self.manager.model()
        )?;
        writeln!(out, "Contabot: {GREETING}")?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            write!(out, "\nVocê: ")?;
            out.flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if self.handle_line(&line, &mut out).await? == Flow::Quit {
                break;
            }
        }

        info!(
            "Session {} ended after {} turns ({}s)",
            self.session.id,
            self.session.conversation().len() / 2,
            (Utc::now() - self.session.started_at).num_seconds()
        );
        Ok(())
    }

    /// Handle one input line, writing everything shown to the user to `out`
    pub async fn handle_line(&mut self, line: &str, out: &mut impl Write) -> Result<Flow> {
        match parse_command(line) {
            Command::Empty => {}
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Invalid(msg) => writeln!(out, "{msg}")?,
            Command::Clear => {
                self.session.clear();
                writeln!(out, "Conversa apagada.")?;
            }
            Command::Provider(name) => match self.switch_provider(&name) {
                Ok(()) => writeln!(
                    out,
                    "Usando {} ({}).",
                    self.manager.provider_name(),
                    self.manager.model()
                )?,
                Err(e) => {
                    warn!("Provider switch failed: {:#}", e);
                    writeln!(out, "Não foi possível trocar o modelo: {e:#}")?;
                }
            },
            Command::Upload { slot, path } => {
                if !self.session.shows_upload() {
                    writeln!(out, "O envio de documentos fica disponível durante a abertura de empresa.")?;
                } else {
                    match self.session.attach(&slot, &path) {
                        Ok(label) => {
                            info!("Attached {} to '{}'", path.display(), label);
                            writeln!(out, "Documento anexado: {label}")?;
                        }
                        Err(e) => writeln!(out, "{e}")?,
                    }
                }
            }
            Command::Message(message) => {
                let outcome = self.ask(&message, out).await?;
                writeln!(out, "Contabot: {}", outcome.response)?;
                if self.session.shows_upload() {
                    writeln!(out, "\n{}", self.session.upload_panel())?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn ask(&mut self, message: &str, out: &mut impl Write) -> Result<TurnOutcome> {
        let entry = self.session.entry_node();
        debug!(
            "Running turn from {} (last route {})",
            entry,
            self.session.last_route()
        );

        write!(out, "{BUSY_INDICATOR}")?;
        out.flush()?;
        let outcome = self
            .manager
            .run_from(entry, message, self.session.conversation().turns())
            .await;
        write!(out, "\r\x1b[2K")?;

        self.session.record_turn(message, &outcome);
        Ok(outcome)
    }

    /// Rebuild the manager for another backend. The conversation is kept.
    fn switch_provider(&mut self, name: &str) -> Result<()> {
        let kind = self.config.provider_kind(Some(name))?;
        if kind == self.kind {
            return Ok(());
        }
        self.manager = build_manager(&self.config, kind)?;
        self.kind = kind;
        info!("Switched provider to {}", kind);
        Ok(())
    }
}
