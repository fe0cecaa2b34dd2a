// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;
mod settings;

pub use models::*;
pub use settings::{Settings, SettingsPatch, SettingsStore, SettingsView};

use crate::error::{PilotError, Result};
use config::{Config, Environment, File};

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Config file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Same as [`AppConfig::load`] with an explicit config file path.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file if it exists
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (e.g. MARKPILOT_CACHE__ENABLED=false)
            .add_source(
                Environment::with_prefix("MARKPILOT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| PilotError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| PilotError::Config(e.to_string()))
    }

    pub fn default_config_path() -> String {
        models::home_path("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_config_file() {
        let config = AppConfig::load_from("/nonexistent/markpilot.toml").unwrap();
        assert_eq!(config.server.port, 8471);
        assert_eq!(config.completions.wait_ms, 500);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_entries, None);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[completions]\nprovider = \"openrouter\"\nmodel = \"openai/gpt-4o-mini\"\n\n[cache]\nenabled = false\nmax_entries = 50\n"
        )
        .unwrap();

        let config = AppConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.completions.provider, ProviderKind::OpenRouter);
        assert_eq!(config.completions.model, "openai/gpt-4o-mini");
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.max_entries, Some(50));
        assert_eq!(config.chat.provider, ProviderKind::OpenAi);
    }

    #[test]
    fn test_debug_output_redacts_api_keys() {
        let mut config = AppConfig::default();
        config.providers.openai = ProviderCredentials {
            api_key: Some("sk-supersecret999".to_string()),
            base_url: Some("http://localhost:9999/v1".to_string()),
        };

        let debug_str = format!("{:?}", config);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("http://localhost:9999/v1"));
        assert!(!debug_str.contains("supersecret999"));
    }
}
