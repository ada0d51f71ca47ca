
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

pub const ENV_VECTOR_STORE_URI: &str = "VECTOR_STORE_URI";
pub const ENV_ATLAS_CLUSTER_URI: &str = "MONGODB_ATLAS_CLUSTER_URI";
pub const ENV_DB_NAME: &str = "DB_NAME";
pub const ENV_COLLECTION_NAME: &str = "COLLECTION_NAME";
pub const ENV_INDEX_NAME: &str = "ATLAS_VECTOR_SEARCH_INDEX_NAME";
pub const ENV_GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_GROQ_VISION_API_KEY: &str = "GROQ_VISION_API_KEY";
pub const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";
pub const ENV_OLLAMA_PORT: &str = "OLLAMA_PORT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
    #[serde(skip)]
    pub api_keys: ApiKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
    /// Zero disables the request timeout
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "all-minilm:l6-v2".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_seconds: 0,
        }
    }
}

/// Hosted chat-completion and vision settings (Groq, OpenAI-compatible)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub temperature: f32,
    /// Zero disables the request timeout
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1/".to_string(),
            chat_model: "llama-3.3-70b-versatile".to_string(),
            vision_model: "llama-3.2-11b-vision-preview".to_string(),
            temperature: 0.1,
            timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Dot,
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::L2 => write!(f, "l2"),
            Self::Dot => write!(f, "dot"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URI; falls back to `<base_dir>/vectors` when unset
    pub uri: Option<String>,
    pub db_name: String,
    pub collection_name: String,
    pub index_name: String,
    pub distance: DistanceMetric,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            db_name: "rag_chatbot".to_string(),
            collection_name: "pdf_embeddings".to_string(),
            index_name: "vector_index".to_string(),
            distance: DistanceMetric::Cosine,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
        }
    }
}

/// Secrets are only ever read from the environment and never serialized
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub groq: Option<String>,
    pub groq_vision: Option<String>,
}

impl ApiKeys {
    /// Key for the vision model, falling back to the chat key
    #[inline]
    pub fn vision(&self) -> Option<&str> {
        self.groq_vision.as_deref().or(self.groq.as_deref())
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ApiKeys")
            .field("groq", &redact(&self.groq))
            .field("groq_vision", &redact(&self.groq_vision))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid chunk size: {0} (must be between 100 and 8192)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid store setting {0}: cannot be empty")]
    EmptyStoreName(&'static str),
    #[error(
        "Unsupported vector store URI scheme '{0}://': expected a local path or a LanceDB URI (s3://, gs://, az://, db://)"
    )]
    UnsupportedStoreScheme(String),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            llm: LlmConfig::default(),
            store: StoreConfig::default(),
            chunking: ChunkingConfig::default(),
            server: ServerConfig::default(),
            base_dir: Self::config_dir().unwrap_or_else(|_| PathBuf::from(".pdf-rag")),
            api_keys: ApiKeys::default(),
        }
    }
}

impl Config {
    /// Default configuration directory (`~/.pdf-rag`)
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".pdf-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("pdf-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load configuration from the default directory, applying environment overrides
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = Self::config_dir().context("Failed to locate configuration directory")?;
        Self::load(dir)
    }

    /// Load `config.toml` from `config_dir` (defaults when absent), then apply
    /// environment overrides and validate
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load_file(config_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok());

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load only the file layer, without environment overrides
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        Ok(config)
    }

    /// Apply environment-sourced settings on top of the file values
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(uri) = non_empty(ENV_VECTOR_STORE_URI).or_else(|| non_empty(ENV_ATLAS_CLUSTER_URI))
        {
            self.store.uri = Some(uri);
        }
        if let Some(db_name) = non_empty(ENV_DB_NAME) {
            self.store.db_name = db_name;
        }
        if let Some(collection) = non_empty(ENV_COLLECTION_NAME) {
            self.store.collection_name = collection;
        }
        if let Some(index) = non_empty(ENV_INDEX_NAME) {
            self.store.index_name = index;
        }
        if let Some(host) = non_empty(ENV_OLLAMA_HOST) {
            if let Err(e) = self.ollama.set_endpoint(&host) {
                warn!("Ignoring {}: {}", ENV_OLLAMA_HOST, e);
            }
        }
        if let Some(port) = non_empty(ENV_OLLAMA_PORT).and_then(|p| p.parse().ok()) {
            self.ollama.port = port;
        }

        self.api_keys.groq = non_empty(ENV_GROQ_API_KEY);
        self.api_keys.groq_vision = non_empty(ENV_GROQ_VISION_API_KEY);
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.llm.validate()?;
        self.store.validate()?;
        self.validate_chunking_config()?;
        self.server.socket_addr()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=8192).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    /// Resolved vector store URI, including the database namespace
    #[inline]
    pub fn store_uri(&self) -> String {
        let base = self.store.uri.clone().unwrap_or_else(|| {
            self.get_base_dir()
                .join("vectors")
                .to_string_lossy()
                .into_owned()
        });

        // LanceDB Cloud URIs name the database themselves
        if base.starts_with("db://") {
            return base;
        }

        format!("{}/{}", base.trim_end_matches('/'), self.store.db_name)
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url = self.ollama_url()?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    /// Accepts the forms Ollama itself reads from `OLLAMA_HOST`: `host`,
    /// `host:port` and `scheme://host[:port]`. A bare host keeps the current
    /// port; a URL without one gets its scheme's default port.
    #[inline]
    pub fn set_endpoint(&mut self, endpoint: &str) -> Result<(), ConfigError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        let has_scheme = endpoint.contains("://");
        let with_scheme = if has_scheme {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };

        let url =
            Url::parse(&with_scheme).map_err(|_| ConfigError::InvalidUrl(endpoint.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConfigError::InvalidUrl(endpoint.to_string()))?;

        self.protocol = url.scheme().to_string();
        self.host = host.to_string();
        let port = if has_scheme {
            url.port_or_known_default()
        } else {
            url.port()
        };
        if let Some(port) = port {
            self.port = port;
        }
        Ok(())
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl LlmConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.vision_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.vision_model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }

    /// Base URL normalized with a trailing slash so endpoint joins keep the path
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let normalized = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        Url::parse(&normalized).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }

    #[inline]
    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_vision_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.vision_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(())
    }
}

/// URI schemes LanceDB can open; anything without `://` is a local path
const STORE_SCHEMES: &[&str] = &["file", "memory", "s3", "s3+ddb", "gs", "az", "abfs", "abfss", "db"];

impl StoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((scheme, _)) = self.uri.as_deref().and_then(|uri| uri.split_once("://")) {
            if !STORE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::UnsupportedStoreScheme(scheme.to_string()));
            }
        }
        if self.db_name.trim().is_empty() {
            return Err(ConfigError::EmptyStoreName("db_name"));
        }
        if self.collection_name.trim().is_empty() {
            return Err(ConfigError::EmptyStoreName("collection_name"));
        }
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::EmptyStoreName("index_name"));
        }
        Ok(())
    }
}

impl ServerConfig {
    #[inline]
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind.clone()))
    }
}
