//! Configuration management with XDG paths
//!
//! ~/.config/draftpane/config.json       - Endpoint preset, overrides
//! ~/.config/draftpane/credentials.json  - Stored API key (0600)
//! ~/.local/state/draftpane/             - Log file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::{CompletionConfig, RequestShape};

const APP_NAME: &str = "draftpane";

/// Get config directory (~/.config/draftpane/)
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Could not determine config directory")?;
    Ok(base.join(APP_NAME))
}

/// Get state directory (~/.local/state/draftpane/)
pub fn state_dir() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .context("Could not determine state directory")?;
    Ok(base.join(APP_NAME))
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Get credentials file path
pub fn credentials_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("credentials.json"))
}

/// Ensure all directories exist
pub fn ensure_dirs() -> Result<()> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(state_dir()?)?;
    Ok(())
}

/// Endpoint presets, one per historical flavour of the pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Single-string completions endpoint, 20s timeout
    Legacy,
    /// Chat messages endpoint, 30s timeout
    #[default]
    Chat,
    /// Chat messages endpoint with a larger budget, 60s timeout
    ChatLong,
}

impl Preset {
    pub fn all() -> &'static [Preset] {
        &[Preset::Legacy, Preset::Chat, Preset::ChatLong]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Legacy => "legacy",
            Preset::Chat => "chat",
            Preset::ChatLong => "chat-long",
        }
    }

    pub fn parse(s: &str) -> Option<Preset> {
        Preset::all().iter().copied().find(|p| p.name() == s)
    }

    /// Completion settings for this preset
    pub fn completion(&self) -> CompletionConfig {
        match self {
            Preset::Legacy => CompletionConfig {
                endpoint_url: "https://api.deepseek-chat.com/v1/completions".into(),
                model: "deepseek-chat".into(),
                max_tokens: 1024,
                temperature: 0.7,
                timeout: Duration::from_secs(20),
                request_shape: RequestShape::Legacy,
            },
            Preset::Chat => CompletionConfig {
                endpoint_url: "https://api.deepseek.com/v1/chat/completions".into(),
                model: "deepseek-chat".into(),
                max_tokens: 2048,
                temperature: 0.7,
                timeout: Duration::from_secs(30),
                request_shape: RequestShape::Chat,
            },
            Preset::ChatLong => CompletionConfig {
                endpoint_url: "https://api.deepseek.com/v1/chat/completions".into(),
                model: "deepseek-chat".into(),
                max_tokens: 4096,
                temperature: 0.7,
                timeout: Duration::from_secs(60),
                request_shape: RequestShape::Chat,
            },
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Endpoint preset the overrides below apply on top of
    #[serde(default)]
    pub preset: Preset,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Request timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Document the pane inserts into
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_path: Option<PathBuf>,
}

impl Config {
    /// Load config from disk, or return defaults
    pub fn load() -> Result<Self> {
        ensure_dirs()?;
        let path = config_path()?;

        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        let path = config_path()?;

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Preset values with explicit overrides applied
    pub fn completion(&self) -> CompletionConfig {
        let mut cfg = self.preset.completion();
        if let Some(url) = &self.endpoint_url {
            cfg.endpoint_url = url.clone();
        }
        if let Some(model) = &self.model {
            cfg.model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            cfg.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            cfg.temperature = temperature;
        }
        if let Some(ms) = self.timeout_ms {
            cfg.timeout = Duration::from_millis(ms);
        }
        cfg
    }

    pub fn document_path(&self) -> PathBuf {
        self.document_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("draft.txt"))
    }

    /// Set a field from its CLI name
    pub fn set(&mut self, field: &str, value: &str) -> Result<()> {
        match field {
            "preset" => {
                self.preset = Preset::parse(value).with_context(|| {
                    format!("Unknown preset: {}. Valid presets: legacy, chat, chat-long", value)
                })?;
            }
            "endpoint" | "endpoint_url" => self.endpoint_url = Some(value.to_string()),
            "model" => self.model = Some(value.to_string()),
            "max_tokens" => {
                self.max_tokens = Some(value.parse().context("max_tokens must be an integer")?)
            }
            "temperature" => {
                self.temperature = Some(value.parse().context("temperature must be a number")?)
            }
            "timeout_ms" => {
                self.timeout_ms = Some(value.parse().context("timeout_ms must be an integer")?)
            }
            "document" | "document_path" => self.document_path = Some(PathBuf::from(value)),
            _ => anyhow::bail!(
                "Unknown config field: {}. Valid fields: preset, endpoint, model, max_tokens, temperature, timeout_ms, document",
                field
            ),
        }
        Ok(())
    }
}
