use anyhow::{Context, Result};
use contabot_core::{LookupSettings, ManagerConfig, ProviderKind, ProviderSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContabotConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend selector: "openai" or "groq"
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Upper bound on each model call during a turn
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,
    #[serde(default = "default_groq")]
    pub groq: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: default_openai(),
            groq: default_groq(),
        }
    }
}

fn default_openai() -> ProviderConfig {
    ProviderConfig::from_settings(&ProviderKind::OpenAi.default_settings())
}

fn default_groq() -> ProviderConfig {
    ProviderConfig::from_settings(&ProviderKind::Groq.default_settings())
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    /// Empty means the provider's default endpoint
    #[serde(default)]
    pub base_url: String,
    /// Empty means the provider's default model
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            request_timeout_secs: settings.timeout.as_secs(),
        }
    }

    fn fill_defaults(&mut self, kind: ProviderKind) {
        let defaults = kind.default_settings();
        if self.base_url.trim().is_empty() {
            self.base_url = defaults.base_url;
        }
        if self.model.trim().is_empty() {
            self.model = defaults.model;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default = "default_lookup_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_lookup_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            url: default_lookup_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_lookup_timeout_secs(),
        }
    }
}

fn default_lookup_url() -> String {
    contabot_core::lookup::DEFAULT_SOURCE_URL.to_string()
}
fn default_user_agent() -> String {
    contabot_core::lookup::BROWSER_USER_AGENT.to_string()
}
fn default_lookup_timeout_secs() -> u64 {
    15
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".contabot")
}

impl ContabotConfig {
    /// Load the config file. A missing default file means built-in defaults;
    /// a missing file passed with `--config` is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        if custom_path.is_none() && !path.exists() {
            info!(
                "No config at {}, using built-in defaults (run `contabot init` to create one)",
                path.display()
            );
            return Ok(Self::default());
        }

        // Refuse configs readable by group/other; they may hold API keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Parse config text, expanding allowlisted `${VAR}` references first
    pub fn parse(content: &str) -> Result<Self> {
        let raw: toml::Value = toml::from_str(content)?;
        for kind in [ProviderKind::OpenAi, ProviderKind::Groq] {
            let key = raw
                .get("providers")
                .and_then(|p| p.get(kind.as_str()))
                .and_then(|p| p.get("api_key"))
                .and_then(|k| k.as_str())
                .unwrap_or_default();
            if is_hardcoded_secret(key) {
                warn!(
                    "{} API key is hardcoded in config file. For security, use environment variables: api_key = \"${{{}}}\"",
                    kind,
                    kind.api_key_env()
                );
            }
        }

        let expanded = expand_env_vars(content);
        let mut config: Self = toml::from_str(&expanded)?;
        config.providers.openai.fill_defaults(ProviderKind::OpenAi);
        config.providers.groq.fill_defaults(ProviderKind::Groq);

        Ok(config)
    }

    /// The configured backend, or `override_name` when given
    pub fn provider_kind(&self, override_name: Option<&str>) -> Result<ProviderKind> {
        let name = override_name.unwrap_or(&self.llm.provider);
        Ok(name.parse::<ProviderKind>()?)
    }

    /// Settings for `kind`, falling back to the provider's environment
    /// variable when no key is configured
    pub fn provider_settings(&self, kind: ProviderKind) -> ProviderSettings {
        let cfg = match kind {
            ProviderKind::OpenAi => &self.providers.openai,
            ProviderKind::Groq => &self.providers.groq,
        };

        let api_key = if cfg.api_key.is_empty() {
            std::env::var(kind.api_key_env()).unwrap_or_default()
        } else {
            cfg.api_key.clone()
        };
        if api_key.is_empty() {
            warn!("No API key configured for {} (set {})", kind, kind.api_key_env());
        }

        ProviderSettings {
            api_key,
            model: cfg.model.clone(),
            base_url: cfg.base_url.clone(),
            timeout: Duration::from_secs(cfg.request_timeout_secs),
        }
    }

    pub fn lookup_settings(&self) -> LookupSettings {
        LookupSettings {
            url: self.lookup.url.clone(),
            user_agent: self.lookup.user_agent.clone(),
            timeout: Duration::from_secs(self.lookup.timeout_secs),
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            llm_timeout: Duration::from_secs(self.llm.timeout_secs),
            max_tokens: self.llm.max_tokens,
        }
    }

    /// Copy with API keys masked, for display
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        cfg.providers.openai.api_key = mask_secret(&cfg.providers.openai.api_key);
        cfg.providers.groq.api_key = mask_secret(&cfg.providers.groq.api_key);
        cfg
    }
}

/// A non-empty value that is not a single `${VAR}` reference
fn is_hardcoded_secret(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !(value.starts_with("${") && value.ends_with('}'))
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &["OPENAI_API_KEY", "GROQ_API_KEY", "HOME", "USER"];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = ContabotConfig::default();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.timeout_secs, 60);
        assert_eq!(cfg.providers.openai.model, "gpt-4o-mini");
        assert_eq!(cfg.providers.groq.model, "llama3-70b-8192");
        assert_eq!(cfg.lookup.url, "https://www.contabilizei.com.br");
    }

    #[test]
    fn test_parse_partial_config_fills_defaults() {
        let cfg = ContabotConfig::parse(
            r#"
[llm]
provider = "groq"

[providers.groq]
base_url = "https://api.groq.com/openai"
model = "llama-3.3-70b-versatile"
"#,
        )
        .unwrap();
        assert_eq!(cfg.llm.provider, "groq");
        assert_eq!(cfg.llm.max_tokens, 1024);
        assert_eq!(cfg.providers.groq.model, "llama-3.3-70b-versatile");
        assert_eq!(cfg.providers.groq.request_timeout_secs, 60);
        assert_eq!(cfg.providers.openai.model, "gpt-4o-mini");
        assert_eq!(cfg.lookup.timeout_secs, 15);
    }

    #[test]
    fn test_provider_section_with_only_key_uses_defaults() {
        let cfg = ContabotConfig::parse(
            r#"
[providers.groq]
api_key = "${GROQ_API_KEY}"
"#,
        )
        .unwrap();
        assert_eq!(cfg.providers.groq.base_url, "https://api.groq.com/openai");
        assert_eq!(cfg.providers.groq.model, "llama3-70b-8192");
        assert_eq!(cfg.providers.groq.request_timeout_secs, 60);

        let settings = cfg.provider_settings(ProviderKind::Groq);
        assert_eq!(settings.base_url, "https://api.groq.com/openai");
    }

    #[test]
    fn test_hardcoded_secret_detection() {
        assert!(is_hardcoded_secret("gsk_live_value"));
        assert!(is_hardcoded_secret("prefix-${GROQ_API_KEY}"));
        assert!(!is_hardcoded_secret(""));
        assert!(!is_hardcoded_secret("${GROQ_API_KEY}"));
        assert!(!is_hardcoded_secret("${USER}"));
    }

    #[test]
    fn test_provider_kind_selection() {
        let cfg = ContabotConfig::default();
        assert_eq!(cfg.provider_kind(None).unwrap(), ProviderKind::OpenAi);
        assert_eq!(cfg.provider_kind(Some("groq")).unwrap(), ProviderKind::Groq);

        let mut cfg = ContabotConfig::default();
        cfg.llm.provider = "cohere".to_string();
        let err = cfg.provider_kind(None).unwrap_err();
        assert!(err.to_string().contains("unsupported provider"));
    }

    #[test]
    fn test_provider_settings_prefers_configured_key() {
        let mut cfg = ContabotConfig::default();
        cfg.providers.groq.api_key = "gsk_configured".to_string();
        let settings = cfg.provider_settings(ProviderKind::Groq);
        assert_eq!(settings.api_key, "gsk_configured");
        assert_eq!(settings.base_url, "https://api.groq.com/openai");
        assert_eq!(settings.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_manager_and_lookup_settings() {
        let mut cfg = ContabotConfig::default();
        cfg.llm.timeout_secs = 5;
        cfg.lookup.timeout_secs = 3;
        assert_eq!(cfg.manager_config().llm_timeout, Duration::from_secs(5));
        assert_eq!(cfg.lookup_settings().timeout, Duration::from_secs(3));
        assert_eq!(cfg.lookup_settings().url, cfg.lookup.url);
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-abcdefghijkl"), "sk-...ijkl");
    }

    #[test]
    fn test_debug_and_redacted_hide_keys() {
        let mut cfg = ContabotConfig::default();
        cfg.providers.openai.api_key = "sk-supersecretvalue".to_string();
        assert!(!format!("{:?}", cfg).contains("supersecret"));
        let shown = toml::to_string_pretty(&cfg.redacted()).unwrap();
        assert!(!shown.contains("supersecret"));
        assert!(shown.contains("sk-...alue"));
    }

    #[test]
    fn test_expand_env_vars_skips_unlisted() {
        let out = expand_env_vars("key = \"${SOME_RANDOM_SECRET}\"");
        assert_eq!(out, "key = \"${SOME_RANDOM_SECRET}\"");
    }

    #[test]
    fn test_expand_env_vars_expands_allowlisted() {
        let home = std::env::var("HOME").unwrap_or_default();
        let out = expand_env_vars("dir = \"${HOME}/x\"");
        assert_eq!(out, format!("dir = \"{home}/x\""));
    }

    #[test]
    fn test_load_missing_custom_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = Some(dir.path().join("nope.toml"));
        assert!(ContabotConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm]\nprovider = \"groq\"\ntimeout_secs = 10").unwrap();
        let cfg = ContabotConfig::load(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "groq");
        assert_eq!(cfg.llm.timeout_secs, 10);
    }

    #[cfg(unix)]
    #[test]
    fn test_load_rejects_world_readable_config() {
        use std::os::unix::fs::PermissionsExt;
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = ContabotConfig::load(&Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("permissive"));
    }

    #[test]
    fn test_default_config_template_parses() {
        let cfg = ContabotConfig::parse(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.providers.groq.model, "llama3-70b-8192");
    }
}
