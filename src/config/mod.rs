// Configuration management module
// TOML file settings layered with environment overrides

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ApiKeys, Config, ConfigError, DistanceMetric, LlmConfig, OllamaConfig, ServerConfig,
    StoreConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
