//! Command-line flags, the optional TOML file, and how they combine.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use github_agent_core::AgentConfig;
use github_agent_mcp::McpServerConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::bootstrap::{BootstrapOptions, FallbackPolicy};

const DEFAULT_REQUIRED_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file named on the command line does not exist.
    #[error("configuration file not found at {path:?}")]
    NotFound {
        /// The missing file.
        path: PathBuf,
    },
    /// A file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid TOML for this program.
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        /// The file being parsed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },
    /// The API key of the selected provider is not set.
    #[error("environment variable `{var}` is not set")]
    MissingApiKey {
        /// The variable holding the key.
        var: &'static str,
    },
    /// A setting has an unusable value.
    #[error("invalid value for `{field}`: {message}")]
    InvalidValue {
        /// The offending setting.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// The hosted model service to talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The Anthropic Messages API.
    #[default]
    Anthropic,
    /// An OpenAI-compatible chat completions API.
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAI,
}

impl ProviderKind {
    /// The variable holding the API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
        }
    }

    /// The variable that may override the base URL.
    pub fn base_url_var(self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_BASE_URL",
            ProviderKind::OpenAI => "OPENAI_BASE_URL",
        }
    }
}

/// Command-line flags. They take precedence over the configuration file.
#[derive(Debug, Default, Parser)]
#[command(name = "github-agent", version, about = "Talk to GitHub in plain language")]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Model provider.
    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,
    /// Model name.
    #[arg(long)]
    pub model: Option<String>,
    /// Base URL of the model API.
    #[arg(long)]
    pub base_url: Option<String>,
    /// Maximum number of tool execution phases per turn.
    #[arg(long)]
    pub max_iterations: Option<usize>,
    /// Which startup failures switch to tool-less mode.
    #[arg(long, value_enum)]
    pub fallback: Option<FallbackPolicy>,
    /// Start without the tool server.
    #[arg(long)]
    pub no_tools: bool,
    /// Read the system prompt from a file.
    #[arg(long)]
    pub system_prompt_file: Option<PathBuf>,
}

/// The configuration file as written.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// The `[agent]` table.
    pub agent: AgentSection,
    /// The `[model]` table.
    pub model: ModelSection,
    /// The `[server]` table.
    pub server: ServerSection,
}

/// The `[agent]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSection {
    /// See [`AgentConfig::max_iterations`].
    pub max_iterations: Option<usize>,
    /// Replaces the built-in system prompt.
    pub system_prompt: Option<String>,
    /// See [`FallbackPolicy`].
    pub fallback: Option<FallbackPolicy>,
    /// See [`BootstrapOptions::require_tools`].
    pub require_tools: Option<bool>,
}

/// The `[model]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    /// Model provider.
    pub provider: Option<ProviderKind>,
    /// Model name.
    pub model: Option<String>,
    /// Base URL of the model API.
    pub base_url: Option<String>,
    /// Output token limit, used by Anthropic only.
    pub max_tokens: Option<u32>,
}

/// The `[server]` table. Unset fields keep the [`McpServerConfig`] defaults.
#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// See [`McpServerConfig::name`].
    pub name: Option<String>,
    /// See [`McpServerConfig::command`].
    pub command: Option<String>,
    /// See [`McpServerConfig::args`].
    pub args: Option<Vec<String>>,
    /// See [`McpServerConfig::env`].
    pub env: Option<BTreeMap<String, String>>,
    /// See [`McpServerConfig::workdir`].
    pub workdir: Option<PathBuf>,
    /// See [`McpServerConfig::startup_timeout_secs`].
    pub startup_timeout_secs: Option<u64>,
    /// Variables that must be set before launching.
    pub required_env: Option<Vec<String>>,
}

impl ServerSection {
    fn into_mcp_config(self) -> McpServerConfig {
        let defaults = McpServerConfig::default();
        McpServerConfig {
            name: self.name.unwrap_or(defaults.name),
            command: self.command.unwrap_or(defaults.command),
            args: self.args.unwrap_or(defaults.args),
            env: self.env.unwrap_or(defaults.env),
            workdir: self.workdir.or(defaults.workdir),
            startup_timeout_secs: self
                .startup_timeout_secs
                .or(defaults.startup_timeout_secs),
        }
    }
}

impl Debug for ServerSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSection")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field(
                "env",
                &self.env.as_ref().map(|env| env.keys().collect::<Vec<_>>()),
            )
            .field("workdir", &self.workdir)
            .field("startup_timeout_secs", &self.startup_timeout_secs)
            .field("required_env", &self.required_env)
            .finish()
    }
}

impl FileConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "reading configuration file");
        let content = read_file(path)?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything needed to build a model provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelSettings {
    /// Which provider to use.
    pub provider: ProviderKind,
    /// Model name; the provider's default when unset.
    pub model: Option<String>,
    /// Base URL; the provider's default when unset.
    pub base_url: Option<String>,
    /// Output token limit.
    pub max_tokens: Option<u32>,
    /// The API key.
    pub api_key: String,
}

impl Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// The resolved configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Loop settings. An empty system prompt means the built-in one.
    pub agent: AgentConfig,
    /// See [`FallbackPolicy`].
    pub fallback: FallbackPolicy,
    /// Skip the tool server and start tool-less.
    pub no_tools: bool,
    /// Model provider settings.
    pub model: ModelSettings,
    /// Tool server settings.
    pub bootstrap: BootstrapOptions,
}

impl Settings {
    /// Loads the file named by `cli` (if any) and resolves against the
    /// process environment.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file, |var| std::env::var(var).ok())
    }

    /// Combines flags, file and environment, flags winning.
    pub fn resolve(
        cli: &Cli,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let FileConfig {
            agent,
            model,
            mut server,
        } = file;

        let provider = cli.provider.or(model.provider).unwrap_or_default();
        let api_key_var = provider.api_key_var();
        let api_key = env(api_key_var)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey { var: api_key_var })?;

        let model_name = cli.model.clone().or(model.model);
        if model_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(invalid("model.model", "must not be empty"));
        }
        let base_url = cli
            .base_url
            .clone()
            .or(model.base_url)
            .or_else(|| env(provider.base_url_var()));
        if let Some(url) = &base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid(
                    "model.base_url",
                    format!("`{url}` is not an http(s) URL"),
                ));
            }
        }

        let system_prompt = match &cli.system_prompt_file {
            Some(path) => read_file(path)?,
            None => agent.system_prompt.unwrap_or_default(),
        };
        let max_iterations = cli
            .max_iterations
            .or(agent.max_iterations)
            .unwrap_or(AgentConfig::DEFAULT_MAX_ITERATIONS);

        let required_env = server
            .required_env
            .take()
            .unwrap_or_else(|| vec![DEFAULT_REQUIRED_ENV.to_owned()]);
        let server = server.into_mcp_config();
        if server.command.trim().is_empty() {
            return Err(invalid("server.command", "must not be empty"));
        }

        Ok(Settings {
            agent: AgentConfig {
                max_iterations,
                system_prompt,
            },
            fallback: cli.fallback.or(agent.fallback).unwrap_or_default(),
            no_tools: cli.no_tools,
            model: ModelSettings {
                provider,
                model: model_name,
                base_url,
                max_tokens: model.max_tokens,
                api_key,
            },
            bootstrap: BootstrapOptions {
                server,
                required_env,
                require_tools: agent.require_tools.unwrap_or(true),
            },
        })
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        message: message.into(),
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn env(var: &str) -> Option<String> {
        match var {
            "ANTHROPIC_API_KEY" => Some("sk-ant-test".to_owned()),
            "OPENAI_API_KEY" => Some("sk-test".to_owned()),
            _ => None,
        }
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings =
            Settings::resolve(&Cli::default(), FileConfig::default(), env)
                .unwrap();
        assert_eq!(settings.model.provider, ProviderKind::Anthropic);
        assert_eq!(settings.model.api_key, "sk-ant-test");
        assert_eq!(settings.agent.max_iterations, 5);
        assert!(settings.agent.system_prompt.is_empty());
        assert_eq!(settings.fallback, FallbackPolicy::Any);
        assert!(settings.bootstrap.require_tools);
        assert_eq!(
            settings.bootstrap.required_env,
            ["GITHUB_PERSONAL_ACCESS_TOKEN"]
        );
        assert_eq!(settings.bootstrap.server, McpServerConfig::default());
    }

    #[test]
    fn test_file_and_flags() {
        let file = write_config(
            r#"
[agent]
max_iterations = 3
fallback = "unreachable"
require_tools = false

[model]
provider = "openai"
model = "gpt-4o-mini"
base_url = "https://example.com/v1"

[server]
command = "github-mcp-server"
args = ["stdio"]
required_env = []

[server.env]
GITHUB_TOOLSETS = "repos,issues"
"#,
        );
        let cli = Cli::try_parse_from([
            "github-agent",
            "--config",
            file.path().to_str().unwrap(),
            "--max-iterations",
            "8",
            "--fallback",
            "never",
        ])
        .unwrap();
        let file_config = FileConfig::load(cli.config.as_deref().unwrap()).unwrap();
        let settings = Settings::resolve(&cli, file_config, env).unwrap();

        assert_eq!(settings.agent.max_iterations, 8);
        assert_eq!(settings.fallback, FallbackPolicy::Never);
        assert_eq!(settings.model.provider, ProviderKind::OpenAI);
        assert_eq!(settings.model.api_key, "sk-test");
        assert_eq!(settings.model.model.as_deref(), Some("gpt-4o-mini"));
        assert!(!settings.bootstrap.require_tools);
        assert!(settings.bootstrap.required_env.is_empty());
        assert_eq!(settings.bootstrap.server.command, "github-mcp-server");
        assert_eq!(settings.bootstrap.server.args, ["stdio"]);
        assert_eq!(settings.bootstrap.server.name, "github");
        assert_eq!(
            settings.bootstrap.server.env.get("GITHUB_TOOLSETS").map(String::as_str),
            Some("repos,issues")
        );
    }

    #[test]
    fn test_system_prompt_file() {
        let prompt = write_config("You only answer in haiku.");
        let cli = Cli {
            system_prompt_file: Some(prompt.path().to_path_buf()),
            ..Default::default()
        };
        let settings = Settings::resolve(&cli, FileConfig::default(), env).unwrap();
        assert_eq!(settings.agent.system_prompt, "You only answer in haiku.");

        let cli = Cli {
            system_prompt_file: Some(PathBuf::from("/definitely/not/here.md")),
            ..Default::default()
        };
        let err = Settings::resolve(&cli, FileConfig::default(), env).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_errors() {
        let err = Settings::resolve(&Cli::default(), FileConfig::default(), |_| None)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingApiKey {
                var: "ANTHROPIC_API_KEY"
            }
        ));

        let cli = Cli {
            base_url: Some("ftp://example.com".to_owned()),
            ..Default::default()
        };
        let err = Settings::resolve(&cli, FileConfig::default(), env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "model.base_url", .. }));

        let file = write_config("[agent]\nfallback = \"sometimes\"\n");
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let file = write_config("[agnet]\nmax_iterations = 1\n");
        assert!(FileConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_api_key_redacted() {
        let settings =
            Settings::resolve(&Cli::default(), FileConfig::default(), env)
                .unwrap();
        let printed = format!("{settings:?}");
        assert!(!printed.contains("sk-ant-test"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_server_env_redacted() {
        let file = write_config(
            r#"
[server.env]
GITHUB_PERSONAL_ACCESS_TOKEN = "github_pat_SECRET123"
"#,
        );
        let file_config = FileConfig::load(file.path()).unwrap();
        assert!(!format!("{file_config:?}").contains("github_pat_SECRET123"));

        let settings = Settings::resolve(&Cli::default(), file_config, env).unwrap();
        assert_eq!(
            settings
                .bootstrap
                .server
                .env
                .get("GITHUB_PERSONAL_ACCESS_TOKEN")
                .map(String::as_str),
            Some("github_pat_SECRET123")
        );
        let printed = format!("{settings:?}");
        assert!(!printed.contains("github_pat_SECRET123"));
        assert!(printed.contains("GITHUB_PERSONAL_ACCESS_TOKEN"));
    }

    #[test]
    fn test_server_table() {
        let file = write_config("[server]\nstartup_timeout_secs = 30\n");
        let file_config = FileConfig::load(file.path()).unwrap();
        let settings = Settings::resolve(&Cli::default(), file_config, env).unwrap();
        assert_eq!(settings.bootstrap.server.startup_timeout_secs, Some(30));
        assert_eq!(settings.bootstrap.server.command, "docker");
        assert_eq!(
            settings.bootstrap.server.args,
            McpServerConfig::default().args
        );

        let file = write_config("[server]\ncomand = \"github-mcp-server\"\n");
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let file = write_config("[server]\ncommand = \"  \"\n");
        let file_config = FileConfig::load(file.path()).unwrap();
        let err = Settings::resolve(&Cli::default(), file_config, env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "server.command", .. }));
    }
}
