//! Multi-tier TOML configuration for Tandem.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tandem_types::{ConfigError, ToolFormat};

/// The default Anthropic API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// The default max tokens for a response.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Resolved configuration for a Tandem session.
#[derive(Debug, Clone)]
pub struct TandemConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_base_url: String,
    pub stream: bool,
    pub no_confirm: bool,
    pub tool_format: ToolFormat,
    /// Token budget for prepared context; derived from the model when unset.
    pub context_budget: Option<u64>,
    pub logs_dir: PathBuf,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub paths: PathSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSettings {
    pub stream: Option<bool>,
    pub no_confirm: Option<bool>,
    pub tool_format: Option<ToolFormat>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSettings {
    pub budget: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    pub logs_dir: Option<PathBuf>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub stream: Option<bool>,
    pub no_confirm: Option<bool>,
    pub tool_format: Option<ToolFormat>,
}

impl TandemConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (~/.tandem/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::load_with_env(overrides, |key| std::env::var(key).ok())
    }

    /// [`TandemConfig::load`] with an explicit environment lookup.
    pub fn load_with_env(
        overrides: CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_dir = env("TANDEM_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_config_dir);
        let settings = load_settings_file(&config_dir.join("config.toml"));

        // Resolve API key: CLI > env > config file
        let api_key = overrides
            .api_key
            .or_else(|| env("ANTHROPIC_API_KEY"))
            .or(settings.api.api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: "api_key (set ANTHROPIC_API_KEY or add to ~/.tandem/config.toml)".into(),
            })?;

        let model = overrides
            .model
            .or_else(|| env("TANDEM_MODEL"))
            .or(settings.api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = settings.api.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.max_tokens".into(),
                message: "must be greater than zero".into(),
            });
        }

        let api_base_url = env("ANTHROPIC_API_BASE_URL")
            .or(settings.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let logs_dir = env("TANDEM_LOGS_DIR")
            .map(PathBuf::from)
            .or(settings.paths.logs_dir)
            .unwrap_or_else(|| config_dir.join("logs"));

        Ok(TandemConfig {
            api_key,
            model,
            max_tokens,
            api_base_url,
            stream: overrides.stream.or(settings.chat.stream).unwrap_or(true),
            no_confirm: overrides
                .no_confirm
                .or(settings.chat.no_confirm)
                .unwrap_or(false),
            tool_format: overrides
                .tool_format
                .or(settings.chat.tool_format)
                .unwrap_or_default(),
            context_budget: settings.context.budget,
            logs_dir,
            config_dir,
        })
    }
}

/// Get the default Tandem config directory path (~/.tandem/).
pub fn default_config_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tandem")
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn write_config(dir: &Path, toml_str: &str) {
        std::fs::write(dir.join("config.toml"), toml_str).unwrap();
    }

    #[test]
    fn settings_toml_parse() {
        let toml_str = r#"
[api]
model = "claude-opus-4-6"
max_tokens = 4096

[chat]
stream = false
tool_format = "tool"

[context]
budget = 50000
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.api.model.as_deref(), Some("claude-opus-4-6"));
        assert_eq!(settings.api.max_tokens, Some(4096));
        assert_eq!(settings.chat.stream, Some(false));
        assert_eq!(settings.chat.tool_format, Some(ToolFormat::Tool));
        assert_eq!(settings.context.budget, Some(50_000));
        assert!(settings.paths.logs_dir.is_none());
    }

    #[test]
    fn defaults_with_only_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = TandemConfig::load_with_env(
            CliOverrides::default(),
            env_from(&[
                ("TANDEM_CONFIG_DIR", dir.path().to_str().unwrap()),
                ("ANTHROPIC_API_KEY", "sk-env"),
            ]),
        )
        .unwrap();
        assert_eq!(config.api_key, "sk-env");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(config.stream);
        assert!(!config.no_confirm);
        assert_eq!(config.tool_format, ToolFormat::Markdown);
        assert_eq!(config.logs_dir, dir.path().join("logs"));
    }

    #[test]
    fn precedence_cli_over_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "[api]\napi_key = \"sk-file\"\nmodel = \"file-model\"\n\n[chat]\nstream = false\n",
        );
        let env = env_from(&[
            ("TANDEM_CONFIG_DIR", dir.path().to_str().unwrap()),
            ("TANDEM_MODEL", "env-model"),
        ]);

        let config = TandemConfig::load_with_env(CliOverrides::default(), &env).unwrap();
        assert_eq!(config.api_key, "sk-file");
        assert_eq!(config.model, "env-model");
        assert!(!config.stream);

        let overrides = CliOverrides {
            model: Some("cli-model".into()),
            stream: Some(true),
            ..CliOverrides::default()
        };
        let config = TandemConfig::load_with_env(overrides, &env).unwrap();
        assert_eq!(config.model, "cli-model");
        assert!(config.stream);
    }

    #[test]
    fn missing_api_key_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TandemConfig::load_with_env(
            CliOverrides::default(),
            env_from(&[("TANDEM_CONFIG_DIR", dir.path().to_str().unwrap())]),
        );
        assert!(matches!(result, Err(ConfigError::MissingKey { .. })));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[api\nmodel = ");
        let config = TandemConfig::load_with_env(
            CliOverrides {
                api_key: Some("sk-cli".into()),
                ..CliOverrides::default()
            },
            env_from(&[("TANDEM_CONFIG_DIR", dir.path().to_str().unwrap())]),
        )
        .unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn logs_dir_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[paths]\nlogs_dir = \"/from/file\"\n");
        let config = TandemConfig::load_with_env(
            CliOverrides::default(),
            env_from(&[
                ("TANDEM_CONFIG_DIR", dir.path().to_str().unwrap()),
                ("ANTHROPIC_API_KEY", "sk"),
                ("TANDEM_LOGS_DIR", "/from/env"),
            ]),
        )
        .unwrap();
        assert_eq!(config.logs_dir, PathBuf::from("/from/env"));
    }
}
