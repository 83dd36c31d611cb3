//! Configuration management

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use senone_acoustic::ModelConfig;
use senone_endpoint::EndpointConfig;
use senone_frontend::FrontendConfig;
use senone_search::{PhoneLoopConfig, SearchConfig, WordLoopConfig};
use senone_trainer::TrainerConfig;

/// Graph and pruning settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Beam settings
    pub pruning: SearchConfig,

    /// Used when no dictionary is configured
    pub phone_loop: PhoneLoopConfig,

    /// Used with a dictionary
    pub word_loop: WordLoopConfig,
}

/// Recognizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Acoustic model (JSON)
    pub model_path: PathBuf,

    /// Pronunciation dictionary; decoding uses a phone loop without one
    pub dictionary_path: Option<PathBuf>,

    pub frontend: FrontendConfig,
    pub endpoint: EndpointConfig,
    pub acoustic: ModelConfig,
    pub search: SearchSection,
    pub training: TrainerConfig,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("senone");

        Self {
            config_path: Self::default_config_path(),
            model_path: data_dir.join("model.json"),
            dictionary_path: None,
            frontend: FrontendConfig::default(),
            endpoint: EndpointConfig::default(),
            acoustic: ModelConfig::default(),
            search: SearchSection::default(),
            training: TrainerConfig::default(),
        }
    }
}

impl RecognizerConfig {
    /// Load configuration from the default location, or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: RecognizerConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.config_path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `config_path`
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Check every section and the constraints between them
    pub fn validate(&self) -> Result<()> {
        self.frontend.validate().context("Invalid [frontend] section")?;
        self.endpoint.validate().context("Invalid [endpoint] section")?;
        self.acoustic.validate().context("Invalid [acoustic] section")?;
        self.search.pruning.validate().context("Invalid [search.pruning] section")?;
        self.search.phone_loop.validate().context("Invalid [search.phone_loop] section")?;
        self.search.word_loop.validate().context("Invalid [search.word_loop] section")?;
        self.training.validate().context("Invalid [training] section")?;

        if self.endpoint.frame_length_ms < self.frontend.frame_length_ms {
            bail!(
                "endpoint.frame_length_ms ({}) is shorter than the frames the frontend produces ({})",
                self.endpoint.frame_length_ms,
                self.frontend.frame_length_ms
            );
        }
        Ok(())
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("senone")
            .join("config.toml")
    }
}
