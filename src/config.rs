use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fs_util::default_state_dir;
use crate::secrets::{Service, load_api_key};

/// Top-level configuration loaded from TOML.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TattvaConfig {
    pub completion: CompletionConfig,
    pub memory: MemoryConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    7300
}
fn default_bind() -> String {
    "127.0.0.1".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Used for conversational topics.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Used for Spirituality and Science/Technology topics.
    #[serde(default = "default_reflective_temperature")]
    pub reflective_temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
    #[serde(default)]
    pub feedback_weights: FeedbackWeights,
    #[serde(default = "default_max_history_tokens")]
    pub max_history_tokens: u32,
    /// Name used for the assistant turn tag in the prompt.
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    /// File holding the instruction block; a short built-in block is used
    /// when unset.
    #[serde(default)]
    pub instructions_path: Option<PathBuf>,
    /// Let a positive sentiment score pick the playful tone when no tone
    /// keyword matched.
    #[serde(default)]
    pub tone_sentiment: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            reflective_temperature: default_reflective_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            stop: default_stop(),
            feedback_weights: FeedbackWeights::default(),
            max_history_tokens: default_max_history_tokens(),
            assistant_name: default_assistant_name(),
            instructions_path: None,
            tone_sentiment: false,
        }
    }
}

fn default_endpoint() -> String {
    "https://infer.e2enetworks.net/project/p-5067/endpoint/is-5279/v1/completions".into()
}
fn default_model() -> String {
    "peft-model".into()
}
fn default_max_tokens() -> u32 {
    320
}
fn default_temperature() -> f32 {
    0.75
}
fn default_reflective_temperature() -> f32 {
    0.6
}
fn default_top_p() -> f32 {
    0.9
}
fn default_top_k() -> u32 {
    50
}
fn default_stop() -> Vec<String> {
    ["### User:", "### AI:", "### Tattva:", "Example Interaction:"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_max_history_tokens() -> u32 {
    100
}
fn default_assistant_name() -> String {
    "Tattva".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackWeights {
    pub thumbs_up: f32,
    pub thumbs_down: f32,
}

impl Default for FeedbackWeights {
    fn default() -> Self {
        Self {
            thumbs_up: 1.2,
            thumbs_down: 0.8,
        }
    }
}

/// Where the prompt context comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Last N turns of the conversation log.
    #[default]
    History,
    /// Similarity recall from the semantic memory store.
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_history_window")]
    pub history_window: u32,
    #[serde(default)]
    pub context: ContextSource,
    #[serde(default)]
    pub semantic_enabled: bool,
    #[serde(default = "default_recall_top_k")]
    pub recall_top_k: u32,
    #[serde(default = "default_prefer_primary")]
    pub prefer_primary: bool,
    /// Vector namespace and key prefix. When unset, an id is generated once
    /// and kept in [`user_id_path`](Self::user_id_path).
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub primary_index: Option<RemoteIndexConfig>,
    #[serde(default)]
    pub local_index: LocalIndexConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            history_window: default_history_window(),
            context: ContextSource::default(),
            semantic_enabled: false,
            recall_top_k: default_recall_top_k(),
            prefer_primary: default_prefer_primary(),
            user_id: None,
            embedding: EmbeddingConfig::default(),
            primary_index: None,
            local_index: LocalIndexConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// `user_id` next to the conversation log.
    pub fn user_id_path(&self) -> PathBuf {
        self.log_path
            .parent()
            .map_or_else(|| PathBuf::from("user_id"), |dir| dir.join("user_id"))
    }
}

fn default_log_path() -> PathBuf {
    default_state_dir().join("conversation_log.json")
}
fn default_history_window() -> u32 {
    3
}
fn default_recall_top_k() -> u32 {
    3
}
fn default_prefer_primary() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "hashing" (local, offline) or "http" (OpenAI-compatible endpoint).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            endpoint: None,
            model: default_embedding_model(),
            dimension: default_dimension(),
            api_key: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".into()
}
fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".into()
}
fn default_dimension() -> usize {
    384
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteIndexConfig {
    pub url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalIndexConfig {
    #[serde(default = "default_local_index_enabled")]
    pub enabled: bool,
    /// Persist the local index here after every upsert; in-memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for LocalIndexConfig {
    fn default() -> Self {
        Self {
            enabled: default_local_index_enabled(),
            path: None,
        }
    }
}

fn default_local_index_enabled() -> bool {
    true
}

/// Load configuration from file or use defaults.
///
/// Search order:
/// 1. `TATTVA_CONFIG` env var
/// 2. `~/.tattva/config.toml`
/// 3. Zero-config defaults (no file needed)
pub fn load() -> anyhow::Result<TattvaConfig> {
    load_from(&config_path())
}

/// Load configuration from an explicit path, falling back to defaults when
/// the file does not exist.
pub fn load_from(path: &Path) -> anyhow::Result<TattvaConfig> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let config: TattvaConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;
        info!("loaded config from {}", path.display());
        config
    } else {
        info!("no config file found, using zero-config defaults");
        TattvaConfig::default()
    };

    resolve_api_keys(&mut config);
    validate(&config)?;
    Ok(config)
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TATTVA_CONFIG") {
        return PathBuf::from(path);
    }
    default_state_dir().join("config.toml")
}

/// Write the config as TOML. API keys are never written.
pub fn save_to_path(config: &TattvaConfig, path: &Path) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("failed to serialize config: {e}"))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", parent.display()))?;
    }
    std::fs::write(path, content)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
    info!("saved config to {}", path.display());
    Ok(())
}

/// Resolve API keys: config file, then environment, then credential store.
fn resolve_api_keys(config: &mut TattvaConfig) {
    fn resolve(slot: &mut Option<String>, service: Service) {
        if slot.is_none() {
            *slot = std::env::var(service.env_var())
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| load_api_key(service));
        }
    }

    resolve(&mut config.completion.api_key, Service::Completion);
    resolve(&mut config.memory.embedding.api_key, Service::Embedding);
    if let Some(index) = config.memory.primary_index.as_mut() {
        resolve(&mut index.api_key, Service::Index);
    }
}

/// Validate the config and return clear error messages.
pub fn validate(config: &TattvaConfig) -> anyhow::Result<()> {
    let completion = &config.completion;
    url::Url::parse(&completion.endpoint).map_err(|e| {
        anyhow::anyhow!("invalid completion.endpoint '{}': {e}", completion.endpoint)
    })?;

    if completion.max_tokens == 0 {
        anyhow::bail!("completion.max_tokens must be > 0");
    }
    for (name, value) in [
        ("completion.temperature", completion.temperature),
        ("completion.reflective_temperature", completion.reflective_temperature),
    ] {
        if !(0.0..=2.0).contains(&value) {
            anyhow::bail!("{name} must be between 0.0 and 2.0, got {value}");
        }
    }
    if !(completion.top_p > 0.0 && completion.top_p <= 1.0) {
        anyhow::bail!("completion.top_p must be in (0.0, 1.0], got {}", completion.top_p);
    }

    let memory = &config.memory;
    if memory.history_window == 0 {
        anyhow::bail!("memory.history_window must be > 0");
    }
    if memory.recall_top_k == 0 {
        anyhow::bail!("memory.recall_top_k must be > 0");
    }
    if memory.context == ContextSource::Semantic && !memory.semantic_enabled {
        anyhow::bail!("memory.context = \"semantic\" requires memory.semantic_enabled = true");
    }

    let valid_embedders = ["hashing", "http"];
    if !valid_embedders.contains(&memory.embedding.provider.as_str()) {
        anyhow::bail!(
            "invalid embedding provider '{}': must be one of {:?}",
            memory.embedding.provider,
            valid_embedders
        );
    }
    if memory.embedding.dimension == 0 {
        anyhow::bail!("memory.embedding.dimension must be > 0");
    }

    Ok(())
}
