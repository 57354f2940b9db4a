use crate::models::ConvertConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment};
use std::collections::HashMap;
use std::fs;

/// Configuration file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "autochd.yaml";

/// Prefix of the environment variables that override the file (`AUTOCHD_JOBS`, ...)
pub const ENV_PREFIX: &str = "AUTOCHD";

/// Configuration manager for the layered run configuration.
///
/// Layers, lowest precedence first:
/// - built-in [`ConvertConfig`] defaults
/// - the YAML file (`autochd.yaml` unless another path is given)
/// - `AUTOCHD_*` environment variables
///
/// Command-line flags are applied on top by the binary.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: Utf8PathBuf,

    /// Replaces the process environment when set
    env_source: Option<HashMap<String, String>>,
}

impl ConfigManager {
    pub fn new<P: AsRef<Utf8Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            env_source: None,
        }
    }

    /// Read environment overrides from `vars` instead of the process environment
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Load only the YAML file.
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file doesn't exist
    pub fn load_file(&self) -> Result<ConvertConfig> {
        if !self.config_path.exists() {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Ok(ConvertConfig::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: ConvertConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Load the file and apply environment overrides on top
    pub fn load(&self) -> Result<ConvertConfig> {
        let file_config = self.load_file()?;

        let file_layer =
            Config::try_from(&file_config).context("Failed to convert file configuration")?;

        let env_layer = Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(self.env_source.clone());

        let layered = Config::builder()
            .add_source(file_layer)
            .add_source(env_layer)
            .build()
            .context("Failed to build layered configuration")?;

        layered
            .try_deserialize()
            .context("Invalid configuration in environment overrides")
    }

    /// Save the configuration as YAML.
    ///
    /// # Arguments
    /// * `config` - The ConvertConfig to save
    pub fn save(&self, config: &ConvertConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent))?;
            }
        }

        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}
