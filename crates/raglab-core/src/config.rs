//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`,
//! `config.<env>.toml` and `APP_*` env vars (`__` separates nested keys, so
//! `APP_RETRIEVAL__TOP_K=8` sets `retrieval.top_k`). Paths may use `~` and
//! `${VAR}`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::{ChunkParams, ChunkingMethod, RetrievalMethod};

pub const MAX_TOP_K: usize = 20;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    /// Load from the working directory, picking the environment from `RUST_ENV`.
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    pub fn load_from(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name: env_name.to_string() };
        config.settings()?;
        Ok(config)
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The full typed configuration, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.store.uri.trim().is_empty() {
            return Err(Error::InvalidConfig("store.uri must not be empty".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be at least 1".into()));
        }
        if self.chunking.methods.is_empty() {
            return Err(Error::InvalidConfig("chunking.methods must name at least one method".into()));
        }
        self.retrieval.validate().map_err(|e| Error::InvalidConfig(e.user_message().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub uri: String,
}

impl Default for StoreSettings {
    fn default() -> Self { Self { uri: "~/.raglab/store".to_string() } }
}

impl StoreSettings {
    pub fn resolved_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.uri) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Directory holding `tokenizer.json`, `config.json` and the weights.
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub batch_size: usize,
    pub use_fake: bool,
    pub fake_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self { Self { model_dir: None, max_len: 256, batch_size: 16, use_fake: false, fake_dim: 384 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub methods: Vec<ChunkingMethod>,
    #[serde(flatten)]
    pub params: ChunkParams,
}

impl Default for ChunkingSettings {
    fn default() -> Self { Self { methods: vec![ChunkingMethod::Recursive], params: ChunkParams::default() } }
}

/// Retrieval options passed to the orchestrator per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub methods: Vec<RetrievalMethod>,
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self { Self { methods: vec![RetrievalMethod::Dense], top_k: 5 } }
}

impl RetrievalConfig {
    pub fn new(methods: impl IntoIterator<Item = RetrievalMethod>, top_k: usize) -> Self {
        Self { methods: methods.into_iter().collect(), top_k }
    }

    /// Enabled methods, deduplicated, in evaluation order.
    pub fn enabled(&self) -> Vec<RetrievalMethod> {
        RetrievalMethod::ALL.into_iter().filter(|m| self.methods.contains(m)).collect()
    }

    pub fn is_enabled(&self, method: RetrievalMethod) -> bool { self.methods.contains(&method) }

    /// Result budget: `top_k` slots per enabled method.
    pub fn result_budget(&self) -> usize { self.top_k * self.enabled().len() }

    pub fn validate(&self) -> Result<(), Error> {
        if self.methods.is_empty() {
            return Err(Error::invalid_input("enable at least one retrieval method"));
        }
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(Error::invalid_input(format!("top_k must be between 1 and {MAX_TOP_K}, got {}", self.top_k)));
        }
        Ok(())
    }
}

/// Expand a user-provided path string: leading `~`, then `${VAR}` / `$VAR`.
/// The result is not canonicalized.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Absolute paths pass through; relative ones are joined onto `base`.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
