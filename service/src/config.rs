use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::overlay::Presentation;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI texting assistant. You will be given a list of text messages between the user (indicated by 'Message I sent:'), and other people (indicated by their names or simply 'Message I received:'). You may also receive a screenshot of the conversation. Your job is to suggest the next message the user should send. Match the tone and style of the conversation. The user may request the message start or end with a certain prefix (both could be parts of a longer word) . The user may quote a specific message. In this case, make sure your suggestions are about the quoted message.\nOutput the suggested text only. Do not output anything else. Do not surround output with quotation marks";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CoreplyConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
    #[serde(default)]
    pub apps: AppsConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl CoreplyConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&resolve_config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let raw = fs::read_to_string(config_path)
                .with_context(|| format!("failed to read config file {}", config_path.display()))?;
            let parsed: CoreplyConfig = toml::from_str(&raw)
                .with_context(|| format!("failed to parse TOML from {}", config_path.display()))?;
            return Ok(parsed);
        }

        Ok(CoreplyConfig::default())
    }
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("COREPLY_CONFIG") {
        return Path::new(&path).to_path_buf();
    }

    if let Some(base) = dirs::config_dir() {
        return base.join("coreply").join("config.toml");
    }

    Path::new("/tmp/coreply.toml").to_path_buf()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    Hosted,
    Custom,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_kind")]
    pub kind: ApiKind,
    #[serde(default = "default_api_url")]
    pub url: String,
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub hosted_key: String,
    #[serde(default = "default_hosted_endpoint")]
    pub hosted_endpoint: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            kind: default_api_kind(),
            url: default_api_url(),
            key: String::new(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            hosted_key: String::new(),
            hosted_endpoint: default_hosted_endpoint(),
        }
    }
}

impl ApiConfig {
    /// Base URL with exactly one trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}/", self.url.trim_end_matches('/'))
    }

    pub fn is_fim(&self) -> bool {
        self.url.trim_end_matches('/').ends_with("/fim")
    }

    /// The configured prompt, or the built-in one when left blank.
    pub fn effective_system_prompt(&self) -> &str {
        if self.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            &self.system_prompt
        }
    }
}

fn default_api_kind() -> ApiKind {
    ApiKind::Hosted
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    1.0
}

fn default_hosted_endpoint() -> String {
    "https://coreply.p.nadles.com/completion/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestConfig {
    /// Master switch.
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_transcript_debounce_ms")]
    pub transcript_debounce_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub show_errors: bool,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            debounce_ms: default_debounce_ms(),
            transcript_debounce_ms: default_transcript_debounce_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            show_errors: false,
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_enable() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    360
}

fn default_transcript_debounce_ms() -> u64 {
    500
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_cache_capacity() -> usize {
    512
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppsConfig {
    /// Packages the user enabled suggestions for.
    #[serde(default)]
    pub selected: Vec<String>,
}

impl AppsConfig {
    pub fn selected_set(&self) -> HashSet<String> {
        self.selected.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_presentation")]
    pub presentation: Presentation,
    #[serde(default = "default_text_size_px")]
    pub default_text_size_px: f32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            presentation: default_presentation(),
            default_text_size_px: default_text_size_px(),
        }
    }
}

fn default_presentation() -> Presentation {
    Presentation::Both
}

fn default_text_size_px() -> f32 {
    48.0
}

/// Shared, atomically replaceable configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<CoreplyConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: CoreplyConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<CoreplyConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, config: CoreplyConfig) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }
}
