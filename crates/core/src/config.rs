//! Configuration management for Conductor.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Config files (.conductor/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with most state stored in `.conductor/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the agent factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 3] = ["ollama", "command", "dry-run"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .conductor/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log output format ("pretty" or "json")
    pub log_format: LogFormat,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Agent backend settings
    pub agent: AgentConfig,

    /// Scheduling policy for runs
    pub orchestration: OrchestrationConfig,

    /// Directories (relative to the workspace) searched for documents
    pub document_dirs: Vec<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse a log format name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Agent backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Active provider ("ollama", "command", "dry-run")
    pub provider: String,

    /// Default model identifier, overridden by a document's `model` hint
    pub model: String,

    /// Ollama endpoint settings
    #[serde(default)]
    pub ollama: OllamaSettings,

    /// External command settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSettings>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            ollama: OllamaSettings::default(),
            command: None,
        }
    }
}

/// Ollama endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaSettings {
    pub endpoint: String,

    /// HTTP timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            timeout: None,
        }
    }
}

/// External command settings.
///
/// `{role}` and `{model}` in `args` are replaced per dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSettings {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

/// Scheduling policy for runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Halt the whole run on the first failed step
    #[serde(default)]
    pub strict: bool,

    /// Per-step dispatch timeout; `None` is unbounded
    #[serde(rename = "stepTimeoutSecs", default)]
    pub step_timeout_secs: Option<u64>,

    /// Maximum steps dispatched at once within a phase
    #[serde(rename = "maxConcurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            step_timeout_secs: None,
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    agent: Option<AgentConfig>,
    orchestration: Option<OrchestrationConfig>,
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    documents: Option<DocumentsSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    format: Option<LogFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentsSection {
    #[serde(default)]
    dirs: Vec<PathBuf>,
}

/// CLI-level overrides applied on top of file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub verbose: bool,
    pub no_color: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            log_format: LogFormat::Pretty,
            verbose: false,
            no_color: false,
            agent: AgentConfig::default(),
            orchestration: OrchestrationConfig::default(),
            document_dirs: default_document_dirs(),
        }
    }
}

fn default_document_dirs() -> Vec<PathBuf> {
    [".conductor/workflows", ".conductor/commands", ".conductor/agents"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

impl AppConfig {
    /// Load configuration from defaults, the YAML config file and environment variables.
    ///
    /// Environment variables:
    /// - `CONDUCTOR_WORKSPACE`: Override workspace path
    /// - `CONDUCTOR_CONFIG`: Path to config file
    /// - `CONDUCTOR_PROVIDER`: Agent provider
    /// - `CONDUCTOR_MODEL`: Model identifier
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_with(&ConfigOverrides::default())
    }

    /// Load configuration, letting CLI overrides pick the workspace and config file.
    pub fn load_with(overrides: &ConfigOverrides) -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("CONDUCTOR_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }
        if let Some(ref workspace) = overrides.workspace {
            config.workspace = workspace.clone();
        }

        if let Ok(config_file) = std::env::var("CONDUCTOR_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }
        if let Some(ref config_file) = overrides.config_file {
            config.config_file = Some(config_file.clone());
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.conductor_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("CONDUCTOR_PROVIDER") {
            config.agent.provider = provider;
        }

        if let Ok(model) = std::env::var("CONDUCTOR_MODEL") {
            config.agent.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config.with_overrides(overrides.clone()))
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        tracing::debug!("Merging config file {:?}", path);

        Ok(self.merge(config_file))
    }

    fn merge(&self, file: ConfigFile) -> Self {
        let mut result = self.clone();

        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = format;
            }
        }

        if let Some(agent) = file.agent {
            result.agent = agent;
        }

        if let Some(orchestration) = file.orchestration {
            result.orchestration = orchestration;
        }

        if let Some(documents) = file.documents {
            if !documents.dirs.is_empty() {
                result.document_dirs = documents.dirs;
            }
        }

        result
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(workspace) = overrides.workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = overrides.config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = overrides.provider {
            self.agent.provider = provider;
        }

        if let Some(model) = overrides.model {
            self.agent.model = model;
        }

        if let Some(log_level) = overrides.log_level {
            self.log_level = Some(log_level);
        }

        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }

        if overrides.verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .conductor directory.
    pub fn conductor_dir(&self) -> PathBuf {
        self.workspace.join(".conductor")
    }

    /// Document directories resolved against the workspace.
    pub fn document_search_paths(&self) -> Vec<PathBuf> {
        self.document_dirs
            .iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir.clone()
                } else {
                    self.workspace.join(dir)
                }
            })
            .collect()
    }

    /// Validate configuration for the active provider and scheduling policy.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.agent.provider.as_str();

        if !KNOWN_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if provider == "command" {
            match self.agent.command {
                Some(ref cmd) if !cmd.program.trim().is_empty() => {}
                _ => {
                    return Err(AppError::Config(
                        "Provider 'command' requires agent.command.program".to_string(),
                    ))
                }
            }
        }

        if self.orchestration.max_concurrency == 0 {
            return Err(AppError::Config(
                "orchestration.maxConcurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
